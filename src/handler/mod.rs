//! Ready-made protocol handlers
//!
//! - [`RawHandler`]: hex-preview logger, the usual default handler
//! - [`SummaryHandler`]: per-flow byte counts, used by the built-in detectors
//! - [`ChannelHandler`]: forwards a flow's bytes to an async consumer

mod channel;
mod raw;
mod summary;

pub use channel::{ChannelHandler, FlowChunk};
pub use raw::{RawHandler, PREVIEW_BYTES, RAW_PROTOCOL};
pub use summary::{FlowTotals, SummaryHandler};
