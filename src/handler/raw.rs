//! Raw handler for flows no detector claimed
//!
//! Logs a hex preview of every delivery. Intended as the default handler.

use log::info;

use crate::common::{hex_preview, Direction, Result};
use crate::protocol::{default_handler, DefaultHandlerFactory, ProtocolHandler};
use crate::stream::FlowInfo;

/// Bytes shown per delivery
pub const PREVIEW_BYTES: usize = 32;

/// Protocol name reported by [`RawHandler`]
pub const RAW_PROTOCOL: &str = "RAW";

pub struct RawHandler {
    ident: String,
    deliveries: u64,
    total_bytes: u64,
    preview_bytes: usize,
}

impl RawHandler {
    pub fn new(flow: &FlowInfo) -> Self {
        Self::with_preview(flow, PREVIEW_BYTES)
    }

    pub fn with_preview(flow: &FlowInfo, preview_bytes: usize) -> Self {
        Self {
            ident: flow.ident.clone(),
            deliveries: 0,
            total_bytes: 0,
            preview_bytes,
        }
    }

    /// Default-handler factory producing [`RawHandler`]s
    pub fn factory() -> DefaultHandlerFactory {
        default_handler(|flow| Box::new(RawHandler::new(flow)))
    }
}

impl ProtocolHandler for RawHandler {
    fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()> {
        self.deliveries += 1;
        self.total_bytes += data.len() as u64;

        if is_first && self.deliveries == 1 {
            info!("[{}] New unknown protocol stream: {}", RAW_PROTOCOL, self.ident);
        }

        info!(
            "[{}] {} [{}] {} bytes: {}",
            RAW_PROTOCOL,
            self.ident,
            direction,
            data.len(),
            hex_preview(data, self.preview_bytes)
        );

        if is_last {
            info!(
                "[{}] Stream {} [{}] ended. Total: {} deliveries, {} bytes",
                RAW_PROTOCOL, self.ident, direction, self.deliveries, self.total_bytes
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!(
            "[{}] Closing stream {}. Final stats: {} deliveries, {} bytes",
            RAW_PROTOCOL, self.ident, self.deliveries, self.total_bytes
        );
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        RAW_PROTOCOL
    }
}
