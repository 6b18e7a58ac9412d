//! Flow identity
//!
//! A flow is one bidirectional TCP connection. [`FlowKey`] is the unordered
//! endpoint pair used for lookup; [`FlowInfo`] is the oriented view handed to
//! detectors and handlers.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Normalized endpoint pair (lower endpoint first) for direction-independent lookup.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct FlowKey {
    low: SocketAddr,
    high: SocketAddr,
}

impl FlowKey {
    /// Build the key for a packet travelling `src -> dst`.
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        if (src.ip(), src.port()) <= (dst.ip(), dst.port()) {
            Self { low: src, high: dst }
        } else {
            Self { low: dst, high: src }
        }
    }

    /// Endpoints in normalized order.
    pub fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        (self.low, self.high)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

/// Oriented description of a flow.
///
/// `client` is the endpoint the reassembler identified as the connection
/// initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowInfo {
    /// Initiator endpoint
    pub client: SocketAddr,
    /// Responder endpoint
    pub server: SocketAddr,
    /// Canonical identifier, `"<client> - <server>"`
    pub ident: String,
}

impl FlowInfo {
    pub fn new(client: SocketAddr, server: SocketAddr) -> Self {
        let ident = format!(
            "{}:{} - {}:{}",
            client.ip(),
            client.port(),
            server.ip(),
            server.port()
        );
        Self { client, server, ident }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.client, self.server)
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client.ip()
    }

    pub fn server_ip(&self) -> IpAddr {
        self.server.ip()
    }

    pub fn client_port(&self) -> u16 {
        self.client.port()
    }

    pub fn server_port(&self) -> u16 {
        self.server.port()
    }
}

impl fmt::Display for FlowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident)
    }
}
