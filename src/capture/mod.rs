//! Packet capture module
//!
//! Capture sources produce raw link-layer frames. Supported sources:
//! - pcap and pcapng file replay (pure Rust, always available)
//! - live interface capture through libpcap (`live` feature)
//!
//! Frames are decoded into [`TcpSegment`](crate::reassembly::TcpSegment)s by
//! [`decode_frame`] and optionally filtered with a [`PacketFilter`].

mod decode;
mod file;
mod filter;
#[cfg(feature = "live")]
mod live;

pub use decode::decode_frame;
pub use file::{FileFormat, FileSource};
pub use filter::PacketFilter;
#[cfg(feature = "live")]
pub use live::LiveSource;

use std::time::Duration;

use log::info;

use crate::common::{DispatchError, Result};
use crate::config::CaptureOptions;

/// Link-layer framing of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Ethernet II
    Ethernet,
    /// Bare IPv4 or IPv6 packets
    RawIp,
    /// Linux cooked capture (SLL), e.g. from the `any` device
    LinuxSll,
    /// Anything else, by its pcap link-type number
    Other(u32),
}

/// One captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Capture timestamp since the Unix epoch
    pub timestamp: Duration,
    pub data: Vec<u8>,
    /// Framing of this frame when it differs per frame (pcapng interfaces);
    /// `None` means the source's [`PacketSource::link_type`]
    pub link_type: Option<LinkType>,
}

impl RawFrame {
    pub fn new(timestamp: Duration, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            data,
            link_type: None,
        }
    }

    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = Some(link_type);
        self
    }
}

/// Source of raw frames
///
/// Read from a single blocking thread; implementations need not be `Sync`.
#[cfg_attr(test, mockall::automock)]
pub trait PacketSource: Send {
    /// Read the next frame
    ///
    /// # Returns
    ///
    /// `Ok(None)` at end of source. Live sources return
    /// [`DispatchError::Timeout`] when the read timeout expires without a
    /// packet.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Framing of every frame this source produces
    fn link_type(&self) -> LinkType;

    /// Release the underlying handle; later reads report end of source
    fn close(&mut self);
}

/// Open the capture source described by `options`
///
/// # Errors
///
/// * [`DispatchError::Configuration`] - neither or both sources set, or the
///   live filter was rejected
/// * [`DispatchError::Capture`] - the file or interface could not be opened
pub fn open_source(options: &CaptureOptions) -> Result<Box<dyn PacketSource>> {
    match (&options.interface, &options.file) {
        (None, Some(path)) => {
            info!("Opening capture file {}", path.display());
            Ok(Box::new(FileSource::open(path)?))
        }
        (Some(interface), None) => open_live(interface, options),
        (Some(_), Some(_)) => Err(DispatchError::Configuration(
            "both a capture interface and a capture file are set".to_string(),
        )),
        (None, None) => Err(DispatchError::Configuration(
            "no capture interface or capture file set".to_string(),
        )),
    }
}

#[cfg(feature = "live")]
fn open_live(interface: &str, options: &CaptureOptions) -> Result<Box<dyn PacketSource>> {
    info!("Opening live capture on {}", interface);
    Ok(Box::new(LiveSource::open(interface, options)?))
}

#[cfg(not(feature = "live"))]
fn open_live(_interface: &str, _options: &CaptureOptions) -> Result<Box<dyn PacketSource>> {
    Err(DispatchError::Capture(
        "live capture support not compiled in (enable the `live` feature)".to_string(),
    ))
}
