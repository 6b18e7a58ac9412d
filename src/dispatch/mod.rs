//! Dispatch module
//!
//! The [`Dispatcher`] runs the capture pipeline and exposes lifecycle
//! control and counters; [`DispatchStats`] aggregates those counters.

mod dispatcher;
mod stats;

pub use dispatcher::Dispatcher;
pub use stats::{
    DispatchStats, StatsSnapshot, ERRORS_METRIC, FLOWS_COMPLETED_METRIC, PACKETS_METRIC, UNMATCHED_FLOWS_METRIC,
};
