//! flowtap: passive TCP protocol detection and per-protocol dispatch
//!
//! flowtap reads packets from a pcap file or a live interface, reassembles
//! TCP flows and binds each flow to a protocol handler chosen by pluggable
//! detectors.
//!
//! # Main Features
//!
//! - Confidence-scored protocol detection with a pluggable registry
//! - Per-flow classification on the first payload, exactly once
//! - Default handler for flows no detector claims
//! - pcap file replay and optional live capture (`live` feature)
//! - Consistent packet, flow, unmatched and error counters
//!
//! # Example
//!
//! ```no_run
//! use flowtap::{Dispatcher, Result};
//! use flowtap::handler::{RawHandler, SummaryHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut dispatcher = Dispatcher::for_file("capture.pcap");
//!
//!     // Flows starting with "ECHO:" from the client go to an Echo handler
//!     dispatcher.register_pattern("Echo", b"ECHO:", b"", |flow| {
//!         Box::new(SummaryHandler::new("Echo", flow))
//!     })?;
//!     dispatcher.set_default_handler(RawHandler::factory())?;
//!
//!     dispatcher.start().await?;
//!     dispatcher.wait_finished().await;
//!     dispatcher.stop().await?;
//!
//!     println!("{:?}", dispatcher.stats());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod capture;
pub mod common;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod protocol;
pub mod reassembly;
pub mod stream;

// Re-export commonly used structures and functions for convenience
pub use common::{DispatchError, Result};
pub use config::{AppConfig, CaptureOptions, DispatchSettings};
pub use dispatch::{Dispatcher, StatsSnapshot};
pub use protocol::{ProtocolDetector, ProtocolHandler, ProtocolRegistry};
pub use stream::FlowInfo;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
