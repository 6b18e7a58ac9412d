//! Per-flow stream handling
//!
//! Every reassembled TCP flow gets a [`StreamClassifier`] that binds it to a
//! protocol handler on first data and closes that handler when the flow ends.

mod classifier;
mod factory;
mod flow;

pub use classifier::{ClassifierState, StreamClassifier};
pub use factory::{ClassifierFactory, FlowTracker};
pub use flow::{FlowInfo, FlowKey};
