//! Stream factory and outstanding-flow tracking

use std::sync::Arc;

use log::trace;
use tokio::sync::watch;

use crate::dispatch::DispatchStats;
use crate::protocol::{DefaultHandlerFactory, ProtocolRegistry};
use crate::reassembly::{ReassemblyStream, StreamFactory};

use super::classifier::StreamClassifier;
use super::FlowInfo;

/// Counts classifiers that have not reached `Closed`
///
/// Cloning shares the same counter. Waiters are woken when it reaches zero.
#[derive(Clone)]
pub struct FlowTracker {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { outstanding: Arc::new(tx) }
    }

    pub fn begin(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    pub fn finish(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once no classifier is outstanding
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Creates a [`StreamClassifier`] for every new flow
pub struct ClassifierFactory {
    registry: Arc<ProtocolRegistry>,
    default_factory: Option<DefaultHandlerFactory>,
    stats: Arc<DispatchStats>,
    tracker: FlowTracker,
}

impl ClassifierFactory {
    pub fn new(
        registry: Arc<ProtocolRegistry>,
        default_factory: Option<DefaultHandlerFactory>,
        stats: Arc<DispatchStats>,
        tracker: FlowTracker,
    ) -> Self {
        Self {
            registry,
            default_factory,
            stats,
            tracker,
        }
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }
}

impl StreamFactory for ClassifierFactory {
    fn new_stream(&self, flow: &FlowInfo) -> Arc<dyn ReassemblyStream> {
        trace!("Creating classifier for {}", flow.ident);
        self.tracker.begin();
        Arc::new(StreamClassifier::new(
            flow.clone(),
            Arc::clone(&self.registry),
            self.default_factory.clone(),
            Arc::clone(&self.stats),
            self.tracker.clone(),
        ))
    }
}
