//! Dispatch orchestrator
//!
//! Owns the protocol registry, the default-handler factory and the capture
//! pipeline:
//!
//! ```text
//! PacketSource --(blocking reader)--> mpsc --> capture loop --> TcpAssembler
//!                                                                  |
//!                                              StreamClassifier per flow
//! ```
//!
//! The capture loop is the only task that touches the reassembler, so
//! callbacks for one flow are never concurrent.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::capture::{decode_frame, open_source, LinkType, PacketFilter, PacketSource, RawFrame};
use crate::common::{DispatchError, Result};
use crate::config::{CaptureOptions, ConfigValidator, DispatchSettings};
use crate::protocol::{DefaultHandlerFactory, ProtocolDetector, ProtocolHandler, ProtocolRegistry};
use crate::reassembly::{AssemblerConfig, StreamFactory, TcpAssembler};
use crate::stream::{ClassifierFactory, FlowInfo, FlowTracker};

use super::stats::{DispatchStats, StatsSnapshot};

/// Handles of a started capture
struct Running {
    shutdown: Option<oneshot::Sender<()>>,
    stop_reader: Arc<AtomicBool>,
    capture: JoinHandle<Result<()>>,
    reader: JoinHandle<()>,
}

impl Running {
    fn signal_stop(&mut self) {
        self.stop_reader.store(true, Ordering::Release);
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already have exited at end of source
            let _ = shutdown.send(());
        }
    }
}

/// Protocol detection and dispatch engine
///
/// Register detectors (and optionally a default handler) first, then
/// [`start`](Self::start). Registration is rejected once started.
pub struct Dispatcher {
    options: CaptureOptions,
    settings: DispatchSettings,
    registry: Arc<ProtocolRegistry>,
    default_factory: Option<DefaultHandlerFactory>,
    stats: Arc<DispatchStats>,
    tracker: FlowTracker,
    finished: Arc<watch::Sender<bool>>,
    started: bool,
    running: Option<Running>,
}

impl Dispatcher {
    /// Create a dispatcher with default dispatch settings
    pub fn new(options: CaptureOptions) -> Self {
        Self::with_settings(options, DispatchSettings::default())
    }

    /// Create a dispatcher with explicit dispatch settings
    ///
    /// # Parameters
    ///
    /// * `options` - Capture source, snaplen, promiscuity, timeout and filter
    /// * `settings` - Maintenance interval, idle timeout and buffering limits
    pub fn with_settings(options: CaptureOptions, settings: DispatchSettings) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            options,
            settings,
            registry: Arc::new(ProtocolRegistry::new()),
            default_factory: None,
            stats: Arc::new(DispatchStats::new()),
            tracker: FlowTracker::new(),
            finished: Arc::new(finished),
            started: false,
            running: None,
        }
    }

    /// Dispatcher replaying a pcap file
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self::new(CaptureOptions::for_file(path))
    }

    /// Dispatcher capturing live on `interface`
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self::new(CaptureOptions::for_interface(interface))
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Register a protocol detector
    ///
    /// # Errors
    ///
    /// [`DispatchError::RegistryLocked`] once started.
    pub fn register_detector<D: ProtocolDetector + 'static>(&self, detector: D) -> Result<()> {
        self.registry.register(detector)
    }

    /// Register a direction-sensitive prefix detector (confidence 95)
    pub fn register_pattern<F>(&self, name: &str, client_pattern: &[u8], server_pattern: &[u8], factory: F) -> Result<()>
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        self.registry.register_pattern(name, client_pattern, server_pattern, factory)
    }

    /// Register a prefix detector matching in either direction (confidence 95)
    pub fn register_prefix<F>(&self, name: &str, pattern: &[u8], factory: F) -> Result<()>
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        self.registry.register_prefix(name, pattern, factory)
    }

    /// Handler factory for flows no detector claims
    ///
    /// # Errors
    ///
    /// [`DispatchError::RegistryLocked`] once started.
    pub fn set_default_handler(&mut self, factory: DefaultHandlerFactory) -> Result<()> {
        if self.started {
            return Err(DispatchError::RegistryLocked);
        }
        self.default_factory = Some(factory);
        Ok(())
    }

    /// Validate the options, open the configured source and start capturing
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Configuration`] - invalid options or already started
    /// * [`DispatchError::Capture`] - the source could not be opened
    pub async fn start(&mut self) -> Result<()> {
        self.ensure_not_started()?;
        self.options.validate()?;
        self.settings.validate()?;
        for warning in self.options.check_warnings().into_iter().chain(self.settings.check_warnings()) {
            warn!("{}", warning);
        }

        let filter = self.software_filter()?;
        // Opening a live device or reading a file header blocks
        let options = self.options.clone();
        let source = tokio::task::spawn_blocking(move || open_source(&options))
            .await
            .map_err(|e| DispatchError::Other(format!("capture open task failed: {}", e)))??;
        self.launch(source, filter)
    }

    /// Start capturing from an already opened source
    ///
    /// The configured filter is applied in software unless the options name a
    /// live interface.
    pub async fn start_with_source(&mut self, source: Box<dyn PacketSource>) -> Result<()> {
        self.ensure_not_started()?;
        self.settings.validate()?;
        let filter = self.software_filter()?;
        self.launch(source, filter)
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started {
            return Err(DispatchError::Configuration("dispatcher already started".to_string()));
        }
        Ok(())
    }

    fn software_filter(&self) -> Result<Option<PacketFilter>> {
        // libpcap filters live captures itself
        if self.options.interface.is_some() {
            return Ok(None);
        }
        self.options
            .filter
            .as_deref()
            .filter(|expr| !expr.trim().is_empty())
            .map(PacketFilter::compile)
            .transpose()
    }

    fn launch(&mut self, source: Box<dyn PacketSource>, filter: Option<PacketFilter>) -> Result<()> {
        self.registry.seal();
        self.started = true;

        let factory = ClassifierFactory::new(
            Arc::clone(&self.registry),
            self.default_factory.clone(),
            Arc::clone(&self.stats),
            self.tracker.clone(),
        );
        let assembler = TcpAssembler::with_config(
            factory,
            AssemblerConfig {
                max_buffered_bytes: self.settings.max_buffered_bytes,
            },
        );
        let capture_loop = CaptureLoop {
            assembler,
            link_type: source.link_type(),
            filter,
            stats: Arc::clone(&self.stats),
            settings: self.settings.clone(),
        };

        let (frames_tx, frames_rx) = mpsc::channel(self.settings.frame_queue);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stop_reader = Arc::new(AtomicBool::new(false));

        let reader = {
            let stop_reader = Arc::clone(&stop_reader);
            tokio::task::spawn_blocking(move || read_frames(source, frames_tx, stop_reader))
        };

        let finished = Arc::clone(&self.finished);
        let capture = tokio::spawn(async move {
            let result = capture_loop.run(frames_rx, shutdown_rx).await;
            finished.send_replace(true);
            result
        });

        info!(
            "Dispatcher started on {} with protocols {:?}{}",
            self.options.source_name(),
            self.registry.names(),
            if self.default_factory.is_some() { " and a default handler" } else { "" }
        );

        self.running = Some(Running {
            shutdown: Some(shutdown_tx),
            stop_reader,
            capture,
            reader,
        });
        Ok(())
    }

    /// Stop capturing and wait until every flow has been closed
    ///
    /// No-op when not running.
    ///
    /// # Errors
    ///
    /// The capture read error that ended the loop, if any.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        info!("Stopping dispatcher");
        running.signal_stop();

        let result = match running.capture.await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Other(format!("capture task failed: {}", e))),
        };
        if let Err(e) = running.reader.await {
            warn!("Capture reader failed: {}", e);
        }

        self.tracker.wait_idle().await;

        let stats = self.stats.snapshot();
        info!(
            "Dispatcher stopped: {} packets, {} flows completed, {} unmatched, {} errors",
            stats.packets_seen, stats.flows_completed, stats.unmatched_flows, stats.errors
        );
        result
    }

    /// Resolve once the capture loop has exited, e.g. at the end of a file
    ///
    /// Returns immediately when never started.
    pub async fn wait_finished(&self) {
        if !self.started {
            return;
        }
        let mut rx = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|finished| *finished).await;
    }

    /// Consistent snapshot of the counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Registered protocol names in registration order
    pub fn registered_protocols(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Classifiers not yet closed
    pub fn active_flows(&self) -> usize {
        self.tracker.outstanding()
    }

    /// Started, not stopped, and the capture loop still running
    pub fn is_running(&self) -> bool {
        self.running.is_some() && !*self.finished.borrow()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(running) = self.running.as_mut() {
            running.signal_stop();
        }
    }
}

/// Blocking side of the pipeline: pulls frames from the source until it ends,
/// fails, or the dispatcher stops
fn read_frames(mut source: Box<dyn PacketSource>, frames: mpsc::Sender<Result<RawFrame>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if frames.blocking_send(Ok(frame)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Capture source exhausted");
                break;
            }
            Err(DispatchError::Timeout) => continue,
            Err(e) => {
                let _ = frames.blocking_send(Err(e));
                break;
            }
        }
    }
    source.close();
}

struct CaptureLoop<F: StreamFactory> {
    assembler: TcpAssembler<F>,
    link_type: LinkType,
    filter: Option<PacketFilter>,
    stats: Arc<DispatchStats>,
    settings: DispatchSettings,
}

impl<F: StreamFactory> CaptureLoop<F> {
    async fn run(
        mut self,
        mut frames: mpsc::Receiver<Result<RawFrame>>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        let period = self.settings.maintenance_interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Capture loop received shutdown");
                    break Ok(());
                }

                _ = ticker.tick() => self.maintain(),

                frame = frames.recv() => match frame {
                    Some(Ok(frame)) => self.process_frame(frame),
                    Some(Err(e)) => {
                        error!("Capture read failed: {}", e);
                        self.stats.record_error();
                        break Err(e);
                    }
                    None => {
                        info!("Capture source finished");
                        break Ok(());
                    }
                },
            }
        };

        // Unblocks the reader if it is waiting on a full queue
        drop(frames);

        let flushed = self.assembler.flush_all();
        debug!("Completed {} remaining flows", flushed);
        result
    }

    fn process_frame(&mut self, frame: RawFrame) {
        self.stats.record_packet();

        let link_type = frame.link_type.unwrap_or(self.link_type);
        match decode_frame(&frame, link_type) {
            Ok(Some(segment)) => {
                if self.filter.as_ref().map_or(true, |filter| filter.matches(&segment)) {
                    self.assembler.ingest(segment);
                }
            }
            Ok(None) => {}
            Err(DispatchError::Fragment(msg)) => {
                debug!("Dropping fragment: {}", msg);
                self.stats.record_error();
            }
            Err(e) => debug!("Dropping undecodable frame: {}", e),
        }
    }

    fn maintain(&mut self) {
        let Some(cutoff) = Instant::now().checked_sub(self.settings.idle_timeout()) else {
            return;
        };
        let flushed = self.assembler.flush_older_than(cutoff);
        if flushed > 0 {
            info!("Flushed {} idle flows, {} still tracked", flushed, self.assembler.flow_count());
        }
    }
}
