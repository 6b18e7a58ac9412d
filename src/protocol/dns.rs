//! DNS over TCP detector
//!
//! DNS messages on a stream carry a 2-byte big-endian length prefix
//! (RFC 1035 §4.2.2) followed by the 12-byte message header.

use log::trace;

use crate::common::Direction;
use crate::handler::SummaryHandler;
use crate::stream::FlowInfo;

use super::detector::{ProtocolDetector, ProtocolHandler};

/// Confidence for a complete, plausibly sized DNS message
pub const DNS_CONFIDENCE: u8 = 80;

/// Fixed DNS header size
const HEADER_LEN: usize = 12;

/// Length prefix size on TCP
const PREFIX_LEN: usize = 2;

/// Largest message accepted as classic DNS
const MAX_MESSAGE_LEN: usize = 512;

/// Detects DNS over TCP by its length prefix and header
#[derive(Debug, Clone, Default)]
pub struct DnsDetector;

impl DnsDetector {
    pub fn new() -> Self {
        Self
    }

    /// Declared message length, if the buffer holds the prefix
    pub fn message_len(data: &[u8]) -> Option<usize> {
        match data {
            [hi, lo, ..] => Some(((*hi as usize) << 8) | (*lo as usize)),
            _ => None,
        }
    }
}

impl ProtocolDetector for DnsDetector {
    fn detect(&self, data: &[u8], _direction: Direction) -> u8 {
        if data.len() < PREFIX_LEN + HEADER_LEN {
            return 0;
        }
        let Some(len) = Self::message_len(data) else {
            return 0;
        };
        if len == 0 || len > MAX_MESSAGE_LEN {
            trace!("Implausible DNS message length: {}", len);
            return 0;
        }
        // The whole message must be in the first delivery
        if data.len() < len + PREFIX_LEN {
            trace!("Truncated DNS message: have {} of {} bytes", data.len() - PREFIX_LEN, len);
            return 0;
        }
        DNS_CONFIDENCE
    }

    fn name(&self) -> &str {
        "DNS"
    }

    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler> {
        Box::new(SummaryHandler::new("DNS", flow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(declared: u16, body_len: usize) -> Vec<u8> {
        let mut data = declared.to_be_bytes().to_vec();
        data.extend(std::iter::repeat(0u8).take(body_len));
        data
    }

    #[test]
    fn test_minimal_query_header() {
        let detector = DnsDetector::new();
        let data = message(12, 12);
        assert_eq!(data.len(), 14);
        assert_eq!(detector.detect(&data, Direction::ClientToServer), DNS_CONFIDENCE);
        assert_eq!(detector.detect(&data, Direction::ServerToClient), DNS_CONFIDENCE);
    }

    #[test]
    fn test_length_bounds() {
        let detector = DnsDetector::new();
        assert_eq!(detector.detect(&message(0, 20), Direction::ClientToServer), 0);
        assert_eq!(detector.detect(&message(512, 512), Direction::ClientToServer), DNS_CONFIDENCE);
        assert_eq!(detector.detect(&message(513, 513), Direction::ClientToServer), 0);
    }

    #[test]
    fn test_truncated_message() {
        let detector = DnsDetector::new();
        assert_eq!(detector.detect(&message(40, 30), Direction::ClientToServer), 0);
        assert_eq!(detector.detect(&message(40, 40), Direction::ClientToServer), DNS_CONFIDENCE);
    }

    #[test]
    fn test_shorter_than_header() {
        let detector = DnsDetector::new();
        assert_eq!(detector.detect(&message(11, 11), Direction::ClientToServer), 0);
        assert_eq!(detector.detect(b"\x00", Direction::ClientToServer), 0);
        assert_eq!(DnsDetector::message_len(b"\x01\x02"), Some(258));
        assert_eq!(DnsDetector::message_len(b"\x01"), None);
    }

    #[test]
    fn test_http_is_not_dns() {
        let detector = DnsDetector::new();
        // "GE" declares 18245 bytes
        assert_eq!(detector.detect(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n", Direction::ClientToServer), 0);
    }
}
