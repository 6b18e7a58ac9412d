//! Channel handler
//!
//! Pipes a flow's deliveries to an async consumer. The receiving side sees
//! every chunk in order and observes end of flow when the channel closes.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::common::{Direction, DispatchError, Result};
use crate::protocol::ProtocolHandler;
use crate::stream::FlowInfo;

/// One delivery forwarded through a [`ChannelHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowChunk {
    pub direction: Direction,
    pub data: Bytes,
    pub is_first: bool,
    pub is_last: bool,
}

/// Handler that forwards every delivery into an unbounded channel
pub struct ChannelHandler {
    protocol: String,
    sender: Option<mpsc::UnboundedSender<FlowChunk>>,
}

impl ChannelHandler {
    /// Create a handler and the receiver for its chunks
    pub fn channel(protocol: &str) -> (Self, mpsc::UnboundedReceiver<FlowChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                protocol: protocol.to_string(),
                sender: Some(tx),
            },
            rx,
        )
    }

    /// Handler factory that hands each new flow's receiver to `on_flow`
    pub fn factory<F>(protocol: &str, on_flow: F) -> impl Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static
    where
        F: Fn(&FlowInfo, mpsc::UnboundedReceiver<FlowChunk>) + Send + Sync + 'static,
    {
        let protocol = protocol.to_string();
        move |flow: &FlowInfo| {
            let (handler, rx) = ChannelHandler::channel(&protocol);
            on_flow(flow, rx);
            Box::new(handler) as Box<dyn ProtocolHandler>
        }
    }
}

impl ProtocolHandler for ChannelHandler {
    fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| DispatchError::handler(&self.protocol, "channel already closed"))?;

        sender
            .send(FlowChunk {
                direction,
                data: Bytes::copy_from_slice(data),
                is_first,
                is_last,
            })
            .map_err(|_| DispatchError::handler(&self.protocol, "stream consumer dropped"))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the sender ends the consumer's stream
        self.sender.take();
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        &self.protocol
    }
}
