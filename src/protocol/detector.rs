//! Protocol detector and handler contracts
//!
//! A detector scores how likely a buffer belongs to its protocol; the
//! registry picks the best score and asks the winning detector for a handler.
//! A handler then consumes the flow's ordered byte stream until the flow ends.

use std::sync::Arc;

use crate::common::{Direction, Result};
use crate::stream::FlowInfo;

/// Detectors must score strictly above this to be selected
pub const DETECTION_THRESHOLD: u8 = 50;

/// Highest confidence a detector may report
pub const MAX_CONFIDENCE: u8 = 100;

/// Protocol detector trait
///
/// Implementations are registered once before capture starts and are shared
/// by every flow, so `detect` must not rely on interior mutation.
pub trait ProtocolDetector: Send + Sync {
    /// Score the first payload of a flow
    ///
    /// # Parameters
    ///
    /// * `data` - First non-empty delivery of the flow
    /// * `direction` - Direction of that delivery
    ///
    /// # Returns
    ///
    /// Confidence in `0..=100`. Values above 100 are clamped by the registry.
    fn detect(&self, data: &[u8], direction: Direction) -> u8;

    /// Protocol name, unique within a registry
    fn name(&self) -> &str;

    /// Create the handler that will own the flow
    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler>;
}

/// Protocol handler trait
///
/// One instance per flow. Calls for a flow are never concurrent.
pub trait ProtocolHandler: Send {
    /// Consume one ordered delivery
    ///
    /// # Parameters
    ///
    /// * `data` - Payload bytes, never empty
    /// * `direction` - Direction of the delivery
    /// * `is_first` - First delivery in this direction
    /// * `is_last` - Delivery carried the end of this direction
    ///
    /// # Errors
    ///
    /// An error is logged and counted; the flow keeps flowing to this handler.
    fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()>;

    /// Release resources; called exactly once after the flow completes
    fn close(&mut self) -> Result<()>;

    /// Protocol name reported in logs and errors
    fn protocol_name(&self) -> &str;
}

/// Factory for the handler used when no detector matches
pub type DefaultHandlerFactory = Arc<dyn Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync>;

/// Factory used by convenience detectors to build their handlers
pub type HandlerFactory = Arc<dyn Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync>;

/// Wrap a closure as a [`DefaultHandlerFactory`]
pub fn default_handler<F>(factory: F) -> DefaultHandlerFactory
where
    F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
{
    Arc::new(factory)
}
