//! TLS detector
//!
//! Recognises a TLS record header at the start of a flow. Looks at the record
//! content type, protocol version and record length, similar to how NGINX and
//! HAProxy sniff TLS on a shared port.

use log::trace;

use crate::common::Direction;
use crate::handler::SummaryHandler;
use crate::stream::FlowInfo;

use super::detector::{ProtocolDetector, ProtocolHandler};

/// Confidence for a well-formed TLS record header
pub const TLS_CONFIDENCE: u8 = 90;

/// Largest legal TLSCiphertext length (2^14 + 2048)
const MAX_RECORD_LEN: usize = 16384 + 2048;

/// TLS protocol detector
#[derive(Debug, Clone)]
pub struct TlsDetector {
    /// Minimum bytes required for detection
    min_bytes: usize,
}

impl Default for TlsDetector {
    fn default() -> Self {
        Self {
            min_bytes: 5, // record header
        }
    }
}

impl TlsDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether data starts with a plausible TLS record
    fn check_record(&self, data: &[u8]) -> bool {
        if data.len() < self.min_bytes {
            trace!("Not enough data to identify TLS: got {} bytes, need {}", data.len(), self.min_bytes);
            return false;
        }

        // change_cipher_spec, alert, handshake, application_data
        if !(0x14..=0x17).contains(&data[0]) {
            return false;
        }

        // SSLv3 through TLS 1.3 record versions
        let (major, minor) = (data[1], data[2]);
        if major != 0x03 || minor > 0x04 {
            trace!("Invalid TLS version: {}.{}", major, minor);
            return false;
        }

        let record_length = ((data[3] as usize) << 8) | (data[4] as usize);
        if record_length == 0 || record_length > MAX_RECORD_LEN {
            trace!("Invalid TLS record length: {}", record_length);
            return false;
        }

        true
    }

    /// Record-layer version name, e.g. "TLSv1.2"
    pub fn record_version(data: &[u8]) -> Option<&'static str> {
        if data.len() < 3 {
            return None;
        }
        match (data[1], data[2]) {
            (0x03, 0x00) => Some("SSLv3"),
            (0x03, 0x01) => Some("TLSv1.0"),
            (0x03, 0x02) => Some("TLSv1.1"),
            (0x03, 0x03) => Some("TLSv1.2"),
            (0x03, 0x04) => Some("TLSv1.3"),
            _ => None,
        }
    }
}

impl ProtocolDetector for TlsDetector {
    fn detect(&self, data: &[u8], _direction: Direction) -> u8 {
        if !self.check_record(data) {
            return 0;
        }
        // A flow should open with a handshake; other record types seen first
        // mean we joined mid-stream.
        if data[0] == 0x16 {
            TLS_CONFIDENCE
        } else {
            TLS_CONFIDENCE - 25
        }
    }

    fn name(&self) -> &str {
        "TLS"
    }

    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler> {
        Box::new(SummaryHandler::new("TLS", flow))
    }
}
