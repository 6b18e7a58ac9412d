//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the crate.

pub mod error;
pub mod log;
pub mod types;

// Re-export commonly used types and functions
pub use error::{DispatchError, Result};
pub use log::{init_logger, hex_preview};
pub use types::Direction;
