//! Live interface capture through libpcap

use std::time::Duration;

use log::{debug, info};
use pcap::{Active, Capture};

use crate::common::{DispatchError, Result};
use crate::config::CaptureOptions;

use super::{LinkType, PacketSource, RawFrame};

/// Reads frames from a network interface
pub struct LiveSource {
    capture: Option<Capture<Active>>,
    link_type: LinkType,
}

impl LiveSource {
    /// Open `interface` with the snaplen, promiscuity, timeout and filter of
    /// `options`
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Capture`] - the device cannot be opened
    /// * [`DispatchError::Configuration`] - libpcap rejected the filter
    pub fn open(interface: &str, options: &CaptureOptions) -> Result<Self> {
        let mut capture = Capture::from_device(interface)
            .map_err(|e| DispatchError::Capture(format!("failed to find device {}: {}", interface, e)))?
            .snaplen(options.snaplen.min(i32::MAX as u32) as i32)
            .promisc(options.promiscuous)
            .timeout(options.timeout_ms.min(i32::MAX as u64) as i32)
            .open()
            .map_err(|e| DispatchError::Capture(format!("failed to open device {}: {}", interface, e)))?;

        if let Some(filter) = options.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            // The handle is dropped (and closed) on failure
            capture
                .filter(filter, true)
                .map_err(|e| DispatchError::Configuration(format!("invalid filter `{}`: {}", filter, e)))?;
            info!("Applied capture filter: {}", filter);
        }

        let link_type = match capture.get_datalink().0 {
            1 => LinkType::Ethernet,
            12 | 14 | 101 | 228 | 229 => LinkType::RawIp,
            113 => LinkType::LinuxSll,
            other => LinkType::Other(other as u32),
        };
        debug!("Capturing on {} (link type {:?})", interface, link_type);

        Ok(Self {
            capture: Some(capture),
            link_type,
        })
    }
}

impl PacketSource for LiveSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };
        match capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let timestamp = Duration::new(ts.tv_sec.max(0) as u64, (ts.tv_usec.max(0) as u32).saturating_mul(1000));
                Ok(Some(RawFrame::new(timestamp, packet.data.to_vec())))
            }
            Err(pcap::Error::TimeoutExpired) => Err(DispatchError::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(DispatchError::Capture(format!("failed to read packet: {}", e))),
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn close(&mut self) {
        self.capture.take();
    }
}
