//! Frame decoding
//!
//! Slices a captured frame with etherparse and extracts the TCP segment, if
//! any. IP fragments are reported instead of reassembled.

use std::net::{IpAddr, SocketAddr};

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::common::{DispatchError, Result};
use crate::reassembly::TcpSegment;

use super::{LinkType, RawFrame};

/// Decode one frame into a TCP segment
///
/// # Returns
///
/// `Ok(None)` for non-IP or non-TCP traffic.
///
/// # Errors
///
/// * [`DispatchError::Fragment`] - IPv4 or IPv6 fragment
/// * [`DispatchError::Decode`] - malformed headers or unsupported link type
pub fn decode_frame(frame: &RawFrame, link_type: LinkType) -> Result<Option<TcpSegment>> {
    let sliced = match link_type {
        LinkType::Ethernet => SlicedPacket::from_ethernet(&frame.data),
        LinkType::RawIp => SlicedPacket::from_ip(&frame.data),
        LinkType::LinuxSll => SlicedPacket::from_linux_sll(&frame.data),
        LinkType::Other(value) => {
            return Err(DispatchError::Decode(format!("unsupported link type {}", value)));
        }
    }
    .map_err(|e| DispatchError::Decode(e.to_string()))?;

    let (src_ip, dst_ip) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            if header.more_fragments() || header.fragments_offset().value() != 0 {
                return Err(DispatchError::Fragment(format!(
                    "IPv4 fragment id {} from {}",
                    header.identification(),
                    header.source_addr()
                )));
            }
            (IpAddr::from(header.source_addr()), IpAddr::from(header.destination_addr()))
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            if ipv6.is_payload_fragmented() {
                return Err(DispatchError::Fragment(format!(
                    "IPv6 fragment from {}",
                    header.source_addr()
                )));
            }
            (IpAddr::from(header.source_addr()), IpAddr::from(header.destination_addr()))
        }
        _ => return Ok(None),
    };

    let Some(TransportSlice::Tcp(tcp)) = &sliced.transport else {
        return Ok(None);
    };

    Ok(Some(TcpSegment {
        src: SocketAddr::new(src_ip, tcp.source_port()),
        dst: SocketAddr::new(dst_ip, tcp.destination_port()),
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        ack: tcp.ack(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: tcp.payload().to_vec(),
        timestamp: frame.timestamp,
    }))
}
