//! Protocol registry
//!
//! Holds the ordered set of detectors and arbitrates between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, trace};

use crate::common::{Direction, DispatchError, Result};
use crate::stream::FlowInfo;

use super::detector::{ProtocolDetector, ProtocolHandler, DETECTION_THRESHOLD, MAX_CONFIDENCE};
use super::pattern::{FnDetector, PatternDetector};

/// Ordered collection of protocol detectors
///
/// Registration order matters: on equal confidence the earlier detector wins.
/// Once [`seal`](Self::seal)ed, further registrations are rejected.
#[derive(Default)]
pub struct ProtocolRegistry {
    detectors: RwLock<Vec<Arc<dyn ProtocolDetector>>>,
    sealed: AtomicBool,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryLocked`] after the registry was sealed.
    pub fn register<D: ProtocolDetector + 'static>(&self, detector: D) -> Result<()> {
        self.register_arc(Arc::new(detector))
    }

    /// Register an already shared detector
    pub fn register_arc(&self, detector: Arc<dyn ProtocolDetector>) -> Result<()> {
        if self.is_sealed() {
            return Err(DispatchError::RegistryLocked);
        }
        debug!("Registering protocol detector: {}", detector.name());
        self.write().push(detector);
        Ok(())
    }

    /// Register a direction-sensitive prefix detector
    ///
    /// An empty pattern never matches in its direction.
    pub fn register_pattern<F>(&self, name: &str, client_pattern: &[u8], server_pattern: &[u8], factory: F) -> Result<()>
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        self.register(PatternDetector::new(name, client_pattern, server_pattern, factory))
    }

    /// Register a detector matching `pattern` as a prefix in either direction
    pub fn register_prefix<F>(&self, name: &str, pattern: &[u8], factory: F) -> Result<()>
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        self.register(PatternDetector::prefix(name, pattern, factory))
    }

    /// Register a detector built from a scoring closure
    pub fn register_fn<D, F>(&self, name: &str, detect: D, factory: F) -> Result<()>
    where
        D: Fn(&[u8], Direction) -> u8 + Send + Sync + 'static,
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        self.register(FnDetector::new(name, detect, factory))
    }

    /// Find the best detector for a buffer
    ///
    /// Every detector is scored; the highest score wins and ties go to the
    /// earliest registration. The winner is returned only when its score is
    /// strictly above [`DETECTION_THRESHOLD`].
    pub fn detect(&self, data: &[u8], direction: Direction) -> Option<Arc<dyn ProtocolDetector>> {
        let detectors = self.read();

        let mut best: Option<&Arc<dyn ProtocolDetector>> = None;
        let mut best_confidence = 0u8;

        for detector in detectors.iter() {
            let confidence = detector.detect(data, direction).min(MAX_CONFIDENCE);
            trace!("Detector {} scored {} ({})", detector.name(), confidence, direction);
            if confidence > best_confidence {
                best_confidence = confidence;
                best = Some(detector);
            }
        }

        match best {
            Some(detector) if best_confidence > DETECTION_THRESHOLD => {
                debug!("Detected {} with confidence {}", detector.name(), best_confidence);
                Some(Arc::clone(detector))
            }
            _ => None,
        }
    }

    /// Registered protocol names in registration order
    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|d| d.name().to_string()).collect()
    }

    /// Create a handler through the detector registered under `name`
    pub fn create_handler_by_name(&self, name: &str, flow: &FlowInfo) -> Option<Box<dyn ProtocolHandler>> {
        self.read()
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.create_handler(flow))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Reject all further registrations
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn ProtocolDetector>>> {
        // Detectors never panic while the lock is held for writing, but a
        // poisoned lock still holds a valid list.
        self.detectors.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn ProtocolDetector>>> {
        self.detectors.write().unwrap_or_else(|e| e.into_inner())
    }
}
