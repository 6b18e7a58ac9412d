//! HTTP/1.x detector

use crate::common::Direction;
use crate::handler::SummaryHandler;
use crate::stream::FlowInfo;

use super::detector::{ProtocolDetector, ProtocolHandler};

/// Confidence for a recognised request or status line
pub const HTTP_CONFIDENCE: u8 = 90;

const METHODS: &[&[u8]] = &[
    b"GET ", b"POST ", b"PUT ", b"DELETE ", b"HEAD ", b"OPTIONS ", b"PATCH ", b"CONNECT ", b"TRACE ",
];

/// Detects HTTP/1.x by request method (client side) or status line (server side)
#[derive(Debug, Clone, Default)]
pub struct HttpDetector;

impl HttpDetector {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolDetector for HttpDetector {
    fn detect(&self, data: &[u8], direction: Direction) -> u8 {
        let matched = match direction {
            Direction::ClientToServer => METHODS.iter().any(|m| data.starts_with(m)),
            Direction::ServerToClient => data.starts_with(b"HTTP/1."),
        };
        if matched {
            HTTP_CONFIDENCE
        } else {
            0
        }
    }

    fn name(&self) -> &str {
        "HTTP"
    }

    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler> {
        Box::new(SummaryHandler::new("HTTP", flow))
    }
}
