//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the CLI and the
//! dispatcher constructors.

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "FLOWTAP";

/// Separator between prefix and nested keys (`FLOWTAP__CAPTURE__SNAPLEN`)
pub const ENV_SEPARATOR: &str = "__";

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "FLOWTAP_CONFIG_FILE";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "flowtap.json";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default snapshot length
pub fn snaplen() -> u32 {
    65536
}

/// Promiscuous mode is on by default
pub fn promiscuous() -> bool {
    true
}

/// Default live read timeout in milliseconds
pub fn timeout_ms() -> u64 {
    30
}

/// Interval between idle-flow sweeps
pub fn maintenance_interval_secs() -> u64 {
    60
}

/// Flows idle for longer than this are completed by the sweep
pub fn idle_timeout_secs() -> u64 {
    120
}

/// Frames buffered between the capture reader and the dispatch loop
pub fn frame_queue() -> usize {
    1024
}

/// Out-of-order bytes buffered per direction (4 MiB)
pub fn max_buffered_bytes() -> usize {
    4 * 1024 * 1024
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
