//! Shared types module
//!
//! Data types used across the capture, reassembly and dispatch layers.

use std::fmt;

/// Direction of a delivery within a flow
///
/// Assigned by the reassembler from whichever endpoint opened the connection.
/// Detectors and handlers treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Initiator to responder
    ClientToServer,
    /// Responder to initiator
    ServerToClient,
}

impl Direction {
    /// The opposite direction
    pub fn reverse(self) -> Self {
        match self {
            Self::ClientToServer => Self::ServerToClient,
            Self::ServerToClient => Self::ClientToServer,
        }
    }

    /// Short arrow notation used in log lines
    pub fn as_arrow(self) -> &'static str {
        match self {
            Self::ClientToServer => "C->S",
            Self::ServerToClient => "S->C",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::ClientToServer => 0,
            Self::ServerToClient => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arrow())
    }
}
