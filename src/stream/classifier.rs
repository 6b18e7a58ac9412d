//! Per-flow stream classifier
//!
//! Binds a flow to a protocol handler on its first non-empty delivery and
//! forwards every later delivery to that handler.
//!
//! ```text
//! Unclassified --first data--> Classified --complete--> Closed
//!       |                                                  ^
//!       +-------------------complete-----------------------+
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::common::Direction;
use crate::dispatch::DispatchStats;
use crate::protocol::{DefaultHandlerFactory, ProtocolHandler, ProtocolRegistry};
use crate::reassembly::{ReassemblyStream, StreamChunk, TcpSegment};

use super::factory::FlowTracker;
use super::FlowInfo;

/// Lifecycle state of a [`StreamClassifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    /// No data seen yet
    Unclassified,
    /// Detection ran; a handler may or may not be bound
    Classified,
    /// Flow completed and the handler was closed
    Closed,
}

struct Inner {
    state: ClassifierState,
    handler: Option<Box<dyn ProtocolHandler>>,
    protocol: Option<String>,
}

/// Reassembly callbacks for one flow
pub struct StreamClassifier {
    info: FlowInfo,
    registry: Arc<ProtocolRegistry>,
    default_factory: Option<DefaultHandlerFactory>,
    stats: Arc<DispatchStats>,
    tracker: FlowTracker,
    inner: Mutex<Inner>,
}

impl StreamClassifier {
    pub fn new(
        info: FlowInfo,
        registry: Arc<ProtocolRegistry>,
        default_factory: Option<DefaultHandlerFactory>,
        stats: Arc<DispatchStats>,
        tracker: FlowTracker,
    ) -> Self {
        Self {
            info,
            registry,
            default_factory,
            stats,
            tracker,
            inner: Mutex::new(Inner {
                state: ClassifierState::Unclassified,
                handler: None,
                protocol: None,
            }),
        }
    }

    pub fn info(&self) -> &FlowInfo {
        &self.info
    }

    pub fn state(&self) -> ClassifierState {
        self.lock().state
    }

    /// Name of the bound protocol, once classified with a handler
    pub fn protocol(&self) -> Option<String> {
        self.lock().protocol.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run detection once and bind a handler
    fn classify(&self, inner: &mut Inner, data: &[u8], direction: Direction) {
        inner.state = ClassifierState::Classified;

        if let Some(detector) = self.registry.detect(data, direction) {
            info!("Detected {} protocol for flow {}", detector.name(), self.info.ident);
            inner.protocol = Some(detector.name().to_string());
            inner.handler = Some(detector.create_handler(&self.info));
            return;
        }

        match &self.default_factory {
            Some(factory) => {
                self.stats.record_unmatched();
                let handler = factory(&self.info);
                debug!(
                    "No detector matched flow {}, using default {} handler",
                    self.info.ident,
                    handler.protocol_name()
                );
                inner.protocol = Some(handler.protocol_name().to_string());
                inner.handler = Some(handler);
            }
            None => debug!("No detector matched flow {}, discarding its data", self.info.ident),
        }
    }
}

impl ReassemblyStream for StreamClassifier {
    fn accept(&self, _segment: &TcpSegment, _direction: Direction) -> bool {
        true
    }

    fn on_data(&self, chunk: &StreamChunk<'_>) {
        if chunk.skipped != 0 {
            debug!(
                "Dropping {} bytes after a {} byte gap on flow {} ({})",
                chunk.data.len(),
                chunk.skipped,
                self.info.ident,
                chunk.direction
            );
            return;
        }
        if chunk.data.is_empty() {
            return;
        }

        let mut inner = self.lock();
        match inner.state {
            ClassifierState::Closed => return,
            ClassifierState::Unclassified => self.classify(&mut inner, chunk.data, chunk.direction),
            ClassifierState::Classified => {}
        }

        if let Some(handler) = inner.handler.as_mut() {
            if let Err(e) = handler.on_data(chunk.data, chunk.direction, chunk.start, chunk.end) {
                warn!("Handler error on flow {}: {}", self.info.ident, e);
                self.stats.record_error();
            }
        }
    }

    fn on_complete(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == ClassifierState::Closed {
            return true;
        }
        inner.state = ClassifierState::Closed;

        if let Some(mut handler) = inner.handler.take() {
            if let Err(e) = handler.close() {
                warn!("Failed to close {} handler for {}: {}", handler.protocol_name(), self.info.ident, e);
                self.stats.record_error();
            }
        }
        drop(inner);

        debug!("Flow {} completed", self.info.ident);
        self.stats.record_flow_completed();
        self.tracker.finish();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DispatchError, Result};
    use crate::protocol::default_handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Data(Vec<u8>, Direction, bool, bool),
        Close,
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct RecordingHandler {
        name: &'static str,
        log: Log,
        fail: bool,
    }

    impl ProtocolHandler for RecordingHandler {
        fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()> {
            self.log.lock().unwrap().push(Call::Data(data.to_vec(), direction, is_first, is_last));
            if self.fail {
                return Err(DispatchError::handler(self.name, "rejected"));
            }
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(Call::Close);
            Ok(())
        }
        fn protocol_name(&self) -> &str {
            self.name
        }
    }

    fn flow() -> FlowInfo {
        FlowInfo::new("10.0.0.1:40000".parse().unwrap(), "10.0.0.2:7".parse().unwrap())
    }

    fn chunk(data: &[u8], direction: Direction, start: bool) -> StreamChunk<'_> {
        StreamChunk {
            data,
            direction,
            start,
            end: false,
            skipped: 0,
        }
    }

    struct Fixture {
        registry: Arc<ProtocolRegistry>,
        stats: Arc<DispatchStats>,
        tracker: FlowTracker,
        log: Log,
        created: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn with_echo(fail: bool) -> Self {
            Self::with_echo_patterns(fail, b"")
        }

        fn with_echo_patterns(fail: bool, server_pattern: &'static [u8]) -> Self {
            let registry = Arc::new(ProtocolRegistry::new());
            let log: Log = Arc::default();
            let created = Arc::new(AtomicUsize::new(0));
            let (handler_log, handler_created) = (Arc::clone(&log), Arc::clone(&created));
            registry
                .register_pattern("Echo", b"ECHO:", server_pattern, move |_| {
                    handler_created.fetch_add(1, Ordering::SeqCst);
                    Box::new(RecordingHandler {
                        name: "Echo",
                        log: Arc::clone(&handler_log),
                        fail,
                    })
                })
                .unwrap();
            Self::new(registry, log, created)
        }

        fn empty() -> Self {
            Self::new(Arc::new(ProtocolRegistry::new()), Arc::default(), Arc::new(AtomicUsize::new(0)))
        }

        fn new(registry: Arc<ProtocolRegistry>, log: Log, created: Arc<AtomicUsize>) -> Self {
            Self {
                registry,
                stats: Arc::new(DispatchStats::new()),
                tracker: FlowTracker::new(),
                log,
                created,
            }
        }

        fn default_factory(&self) -> DefaultHandlerFactory {
            let log = Arc::clone(&self.log);
            default_handler(move |_| {
                Box::new(RecordingHandler {
                    name: "RAW",
                    log: Arc::clone(&log),
                    fail: false,
                })
            })
        }

        fn classifier(&self, default_factory: Option<DefaultHandlerFactory>) -> StreamClassifier {
            self.tracker.begin();
            StreamClassifier::new(
                flow(),
                Arc::clone(&self.registry),
                default_factory,
                Arc::clone(&self.stats),
                self.tracker.clone(),
            )
        }

        fn calls(&self) -> Vec<Call> {
            self.log.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_matched_flow_binds_detector_handler() {
        let fx = Fixture::with_echo(false);
        let classifier = fx.classifier(None);
        assert_eq!(classifier.state(), ClassifierState::Unclassified);

        classifier.on_data(&chunk(b"ECHO:hi", Direction::ClientToServer, true));
        assert_eq!(classifier.state(), ClassifierState::Classified);
        assert_eq!(classifier.protocol().as_deref(), Some("Echo"));

        assert!(classifier.on_complete());
        assert_eq!(classifier.state(), ClassifierState::Closed);
        assert_eq!(
            fx.calls(),
            vec![Call::Data(b"ECHO:hi".to_vec(), Direction::ClientToServer, true, false), Call::Close]
        );

        let stats = fx.stats.snapshot();
        assert_eq!(stats.unmatched_flows, 0);
        assert_eq!(stats.flows_completed, 1);
        assert_eq!(fx.tracker.outstanding(), 0);
    }

    #[test]
    fn test_unmatched_flow_uses_default_factory() {
        let fx = Fixture::empty();
        let classifier = fx.classifier(Some(fx.default_factory()));

        classifier.on_data(&chunk(b"XYZ", Direction::ClientToServer, true));
        classifier.on_complete();

        assert_eq!(classifier.protocol().as_deref(), Some("RAW"));
        assert_eq!(
            fx.calls(),
            vec![Call::Data(b"XYZ".to_vec(), Direction::ClientToServer, true, false), Call::Close]
        );
        assert_eq!(fx.stats.snapshot().unmatched_flows, 1);
    }

    #[test]
    fn test_unmatched_flow_without_default_discards_data() {
        let fx = Fixture::with_echo(false);
        let classifier = fx.classifier(None);

        classifier.on_data(&chunk(b"GET / HTTP/1.1", Direction::ClientToServer, true));
        classifier.on_data(&chunk(b"ECHO:late", Direction::ClientToServer, false));
        assert_eq!(classifier.state(), ClassifierState::Classified);
        assert_eq!(classifier.protocol(), None);
        assert!(classifier.on_complete());

        assert!(fx.calls().is_empty());
        assert_eq!(fx.created.load(Ordering::SeqCst), 0);
        // Only flows handed to a default handler count as unmatched
        assert_eq!(fx.stats.snapshot().unmatched_flows, 0);
        assert_eq!(fx.stats.snapshot().flows_completed, 1);
    }

    #[test]
    fn test_empty_registry_without_default_counts_nothing() {
        let fx = Fixture::empty();
        let classifier = fx.classifier(None);

        classifier.on_data(&chunk(b"XYZ", Direction::ClientToServer, true));
        assert!(classifier.on_complete());

        let stats = fx.stats.snapshot();
        assert_eq!(stats.unmatched_flows, 0);
        assert_eq!(stats.flows_completed, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_empty_and_gapped_chunks_are_ignored() {
        let fx = Fixture::with_echo(false);
        let classifier = fx.classifier(None);

        classifier.on_data(&chunk(b"", Direction::ClientToServer, true));
        classifier.on_data(&StreamChunk {
            skipped: 12,
            ..chunk(b"ECHO:lost", Direction::ClientToServer, false)
        });
        assert_eq!(classifier.state(), ClassifierState::Unclassified);

        classifier.on_data(&chunk(b"ECHO:ok", Direction::ClientToServer, false));
        assert_eq!(fx.calls().len(), 1);
    }

    #[test]
    fn test_handler_error_is_counted_and_flow_continues() {
        let fx = Fixture::with_echo(true);
        let classifier = fx.classifier(None);

        classifier.on_data(&chunk(b"ECHO:one", Direction::ClientToServer, true));
        classifier.on_data(&chunk(b"two", Direction::ServerToClient, true));
        classifier.on_complete();

        assert_eq!(fx.calls().len(), 3);
        assert_eq!(fx.stats.snapshot().errors, 2);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let fx = Fixture::with_echo(false);
        let classifier = fx.classifier(None);
        classifier.on_data(&chunk(b"ECHO:x", Direction::ClientToServer, true));

        assert!(classifier.on_complete());
        assert!(classifier.on_complete());
        classifier.on_data(&chunk(b"after", Direction::ClientToServer, false));

        assert_eq!(fx.calls().iter().filter(|c| **c == Call::Close).count(), 1);
        assert_eq!(fx.calls().len(), 2);
        assert_eq!(fx.stats.snapshot().flows_completed, 1);
        assert_eq!(fx.tracker.outstanding(), 0);
    }

    #[test]
    fn test_complete_before_any_data() {
        let fx = Fixture::empty();
        let classifier = fx.classifier(Some(fx.default_factory()));

        assert!(classifier.on_complete());
        assert!(fx.calls().is_empty());
        assert_eq!(fx.stats.snapshot().unmatched_flows, 0);
        assert_eq!(fx.stats.snapshot().flows_completed, 1);
    }

    #[test]
    fn test_concurrent_first_delivery_detects_once() {
        let fx = Fixture::with_echo_patterns(false, b"ECHO:");
        let classifier = Arc::new(fx.classifier(None));

        let handles: Vec<_> = [Direction::ClientToServer, Direction::ServerToClient]
            .into_iter()
            .map(|direction| {
                let classifier = Arc::clone(&classifier);
                thread::spawn(move || classifier.on_data(&chunk(b"ECHO:race", direction, true)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Both deliveries match; whichever ran first created the only handler
        assert_eq!(classifier.state(), ClassifierState::Classified);
        assert_eq!(fx.created.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.protocol().as_deref(), Some("Echo"));
        assert_eq!(fx.calls().len(), 2);
        assert_eq!(fx.stats.snapshot().unmatched_flows, 0);
    }
}
