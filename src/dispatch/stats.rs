//! Dispatch counters
//!
//! All four counters live behind one lock so a snapshot is always
//! consistent. Every increment is mirrored to the `metrics` facade; without an
//! installed recorder those calls are no-ops.

use std::sync::Mutex;

use metrics::counter;
use serde::Serialize;

pub const PACKETS_METRIC: &str = "flowtap_packets_total";
pub const FLOWS_COMPLETED_METRIC: &str = "flowtap_flows_completed_total";
pub const UNMATCHED_FLOWS_METRIC: &str = "flowtap_unmatched_flows_total";
pub const ERRORS_METRIC: &str = "flowtap_errors_total";

/// Point-in-time copy of the dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames read from the capture source
    pub packets_seen: u64,
    /// Flows whose classifier reached `Closed`
    pub flows_completed: u64,
    /// Flows no detector claimed that went to the default handler
    pub unmatched_flows: u64,
    /// Handler, decode and capture errors
    pub errors: u64,
}

/// Shared, monotonically increasing dispatch counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    inner: Mutex<StatsSnapshot>,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self) {
        self.update(|s| s.packets_seen += 1);
        counter!(PACKETS_METRIC).increment(1);
    }

    pub fn record_flow_completed(&self) {
        self.update(|s| s.flows_completed += 1);
        counter!(FLOWS_COMPLETED_METRIC).increment(1);
    }

    pub fn record_unmatched(&self) {
        self.update(|s| s.unmatched_flows += 1);
        counter!(UNMATCHED_FLOWS_METRIC).increment(1);
    }

    pub fn record_error(&self) {
        self.update(|s| s.errors += 1);
        counter!(ERRORS_METRIC).increment(1);
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        match self.inner.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}
