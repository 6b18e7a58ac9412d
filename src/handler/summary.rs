//! Byte-counting handler used by the built-in detectors

use log::{debug, info};

use crate::common::{Direction, Result};
use crate::protocol::ProtocolHandler;
use crate::stream::FlowInfo;

/// Per-direction traffic counters for one flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowTotals {
    pub deliveries: u64,
    pub client_bytes: u64,
    pub server_bytes: u64,
}

/// Logs a one-line summary when a detected flow opens and closes
pub struct SummaryHandler {
    protocol: String,
    ident: String,
    totals: FlowTotals,
}

impl SummaryHandler {
    pub fn new(protocol: &str, flow: &FlowInfo) -> Self {
        Self {
            protocol: protocol.to_string(),
            ident: flow.ident.clone(),
            totals: FlowTotals::default(),
        }
    }

    pub fn totals(&self) -> FlowTotals {
        self.totals
    }
}

impl ProtocolHandler for SummaryHandler {
    fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()> {
        if is_first && self.totals.deliveries == 0 {
            info!("[{}] New stream: {}", self.protocol, self.ident);
        }

        self.totals.deliveries += 1;
        match direction {
            Direction::ClientToServer => self.totals.client_bytes += data.len() as u64,
            Direction::ServerToClient => self.totals.server_bytes += data.len() as u64,
        }

        debug!("[{}] {} [{}] {} bytes", self.protocol, self.ident, direction, data.len());
        if is_last {
            debug!("[{}] {} [{}] end of stream", self.protocol, self.ident, direction);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!(
            "[{}] Stream {} closed: {} deliveries, {} bytes C->S, {} bytes S->C",
            self.protocol, self.ident, self.totals.deliveries, self.totals.client_bytes, self.totals.server_bytes
        );
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        &self.protocol
    }
}
