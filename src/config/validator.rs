//! Configuration validator
//!
//! Hard errors stop the dispatcher from starting; warnings are only logged.

use crate::capture::PacketFilter;
use crate::common::{DispatchError, Result};

use super::{AppConfig, CaptureOptions, DispatchSettings};

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the dispatcher cannot run with
    fn validate(&self) -> Result<()>;

    /// Suspicious but usable settings
    fn check_warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

impl ConfigValidator for CaptureOptions {
    fn validate(&self) -> Result<()> {
        match (&self.interface, &self.file) {
            (Some(_), Some(_)) => {
                return Err(DispatchError::Configuration(
                    "both a capture interface and a capture file are set".to_string(),
                ));
            }
            (None, None) => {
                return Err(DispatchError::Configuration(
                    "no capture interface or capture file set".to_string(),
                ));
            }
            (Some(interface), None) if interface.trim().is_empty() => {
                return Err(DispatchError::Configuration("capture interface name is empty".to_string()));
            }
            _ => {}
        }

        if self.snaplen == 0 {
            return Err(DispatchError::Configuration("snaplen must be greater than 0".to_string()));
        }

        // Live filters are compiled by libpcap when the device opens
        if self.file.is_some() {
            if let Some(filter) = &self.filter {
                PacketFilter::compile(filter)?;
            }
        }

        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.interface.is_some() && self.timeout_ms == 0 {
            warnings.push("timeout_ms is 0: stopping waits for the next packet".to_string());
        }
        if self.snaplen < 128 {
            warnings.push(format!("snaplen {} truncates most TCP payloads", self.snaplen));
        }
        warnings
    }
}

impl ConfigValidator for DispatchSettings {
    fn validate(&self) -> Result<()> {
        if self.maintenance_interval_secs == 0 {
            return Err(DispatchError::Configuration(
                "maintenance_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.frame_queue == 0 {
            return Err(DispatchError::Configuration("frame_queue must be greater than 0".to_string()));
        }
        if self.max_buffered_bytes == 0 {
            return Err(DispatchError::Configuration(
                "max_buffered_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.idle_timeout_secs < self.maintenance_interval_secs {
            warnings.push(format!(
                "idle_timeout_secs ({}) is shorter than maintenance_interval_secs ({}); idle flows are swept late",
                self.idle_timeout_secs, self.maintenance_interval_secs
            ));
        }
        warnings
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        self.dispatch.validate()
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = self.capture.check_warnings();
        warnings.extend(self.dispatch.check_warnings());
        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => warnings.push(format!("Invalid log level '{}', using default 'info'", level)),
        }
        warnings
    }
}
