//! Protocol detection module
//!
//! Detectors examine the first payload of a flow and report a confidence
//! score; the [`ProtocolRegistry`] picks the winner and the winner creates the
//! handler that owns the flow.
//!
//! The module uses Rust's trait system to keep detection pluggable: anything
//! implementing [`ProtocolDetector`] can be registered.

mod detector;
mod dns;
mod http;
mod pattern;
mod registry;
mod tls;

pub use detector::{
    default_handler, DefaultHandlerFactory, HandlerFactory, ProtocolDetector, ProtocolHandler,
    DETECTION_THRESHOLD, MAX_CONFIDENCE,
};
pub use dns::{DnsDetector, DNS_CONFIDENCE};
pub use http::{HttpDetector, HTTP_CONFIDENCE};
pub use pattern::{FnDetector, PatternDetector, PATTERN_CONFIDENCE};
pub use registry::ProtocolRegistry;
pub use tls::{TlsDetector, TLS_CONFIDENCE};
