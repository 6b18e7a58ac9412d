//! Error handling module
//!
//! This module defines the error types and result type aliases used throughout flowtap.

use thiserror::Error;
use std::io;

/// flowtap error type
#[derive(Error, Debug)]
pub enum DispatchError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Conflicting or missing capture source, invalid filter, bad settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Capture source could not be opened or read
    #[error("Capture error: {0}")]
    Capture(String),

    /// A protocol handler failed while processing or closing a flow
    #[error("Handler error ({protocol}): {message}")]
    Handler {
        /// Protocol name reported by the failing handler
        protocol: String,
        /// Failure description
        message: String,
    },

    /// Live read returned without a packet; the caller may retry
    #[error("Capture read timed out")]
    Timeout,

    /// Fragmented IP packet that cannot be reassembled
    #[error("Fragment error: {0}")]
    Fragment(String),

    /// Malformed frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Detector registration attempted after capture started
    #[error("Protocol registry is locked: capture already started")]
    RegistryLocked,

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl DispatchError {
    /// Build a handler error for the given protocol
    pub fn handler(protocol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            protocol: protocol.into(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `DispatchError`.
pub type Result<T> = std::result::Result<T, DispatchError>;
