//! TCP stream reassembly
//!
//! The reassembler turns captured TCP segments into ordered per-direction
//! byte ranges and drives a [`ReassemblyStream`] per flow. The dispatch engine
//! depends only on the contract below: callbacks for one flow are never
//! delivered concurrently, flows are created through a [`StreamFactory`] and
//! forgotten once `on_complete` returns `true`.

mod assembler;

pub use assembler::{AssemblerConfig, TcpAssembler};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::common::Direction;
use crate::stream::FlowInfo;

/// One decoded TCP segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub seq: u32,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    /// Capture timestamp (since the Unix epoch)
    pub timestamp: Duration,
}

/// One ordered byte range delivered to a stream
#[derive(Debug, Clone, Copy)]
pub struct StreamChunk<'a> {
    pub data: &'a [u8],
    pub direction: Direction,
    /// First range delivered in this direction
    pub start: bool,
    /// Range ends where the sender's FIN was observed
    pub end: bool,
    /// Bytes missing immediately before this range; non-zero means data loss
    pub skipped: usize,
}

/// Per-flow callback set driven by the reassembler
pub trait ReassemblyStream: Send + Sync {
    /// Inspect a raw segment before it is reassembled; `false` drops it
    fn accept(&self, segment: &TcpSegment, direction: Direction) -> bool;

    /// Ordered data for one direction
    fn on_data(&self, chunk: &StreamChunk<'_>);

    /// The flow finished (FIN both ways, RST, idle flush or end of capture).
    /// Return `true` to let the reassembler forget the flow.
    fn on_complete(&self) -> bool;
}

/// Creates the callback set for each new flow
pub trait StreamFactory: Send + Sync {
    fn new_stream(&self, flow: &FlowInfo) -> Arc<dyn ReassemblyStream>;
}
