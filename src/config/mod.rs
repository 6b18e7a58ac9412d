//! Configuration module
//!
//! Capture options, dispatch tuning and the application config that bundles
//! them. Values are layered: defaults, then a JSON file, then `FLOWTAP__*`
//! environment variables, then command-line overrides.

pub mod defaults;
mod loader;
mod validator;

pub use loader::ConfigLoader;
pub use validator::ConfigValidator;

use std::path::PathBuf;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

/// Where and how packets are captured
///
/// Exactly one of `interface` and `file` must be set before capture starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureOptions {
    /// Network interface for live capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// pcap file to replay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Maximum bytes captured per frame (live capture)
    pub snaplen: u32,

    /// Put the interface in promiscuous mode (live capture)
    pub promiscuous: bool,

    /// Live read timeout in milliseconds; 0 blocks until a packet arrives
    pub timeout_ms: u64,

    /// BPF-style filter expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            interface: None,
            file: None,
            snaplen: defaults::snaplen(),
            promiscuous: defaults::promiscuous(),
            timeout_ms: defaults::timeout_ms(),
            filter: None,
        }
    }
}

impl CaptureOptions {
    /// Live capture on `interface` with default settings
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: Some(interface.into()),
            ..Self::default()
        }
    }

    /// Replay of the pcap file at `path`
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the filter expression
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Human-readable source description for logs
    pub fn source_name(&self) -> String {
        match (&self.interface, &self.file) {
            (Some(interface), _) => format!("interface {}", interface),
            (None, Some(file)) => format!("file {}", file.display()),
            (None, None) => "no source".to_string(),
        }
    }
}

/// Dispatch loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchSettings {
    pub maintenance_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub frame_queue: usize,
    pub max_buffered_bytes: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: defaults::maintenance_interval_secs(),
            idle_timeout_secs: defaults::idle_timeout_secs(),
            frame_queue: defaults::frame_queue(),
            max_buffered_bytes: defaults::max_buffered_bytes(),
        }
    }
}

impl DispatchSettings {
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureOptions,
    pub dispatch: DispatchSettings,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            dispatch: DispatchSettings::default(),
            log_level: defaults::log_level(),
        }
    }
}

/// Log the effective configuration
pub fn log_config(config: &AppConfig) {
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Configuration ===");
    info!("Capture:");
    info!("  Source: {}", config.capture.source_name());
    info!("  Snaplen: {}", config.capture.snaplen);
    info!("  Promiscuous: {}", config.capture.promiscuous);
    info!("  Read timeout: {} ms", config.capture.timeout_ms);
    if let Some(filter) = &config.capture.filter {
        info!("  Filter: {}", filter);
    }
    info!("Dispatch:");
    info!("  Maintenance interval: {} s", config.dispatch.maintenance_interval_secs);
    info!("  Idle timeout: {} s", config.dispatch.idle_timeout_secs);
    info!("  Frame queue: {}", config.dispatch.frame_queue);
    info!("  Max buffered bytes: {}", config.dispatch.max_buffered_bytes);
    info!("Log level: {}", config.log_level);
    info!("=====================");
}
