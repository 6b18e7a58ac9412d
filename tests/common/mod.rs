//! Shared helpers for integration tests
//!
//! Builds synthetic TCP conversations as Ethernet frames, records handler
//! calls and replays frames through an in-memory packet source.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use etherparse::PacketBuilder;
use pcap_file::pcap::{PcapPacket, PcapWriter};
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::InterfaceDescriptionBlock;
use pcap_file::pcapng::PcapNgWriter;
use pcap_file::DataLink;

use flowtap::capture::{LinkType, PacketSource, RawFrame};
use flowtap::common::{Direction, Result};
use flowtap::{FlowInfo, ProtocolHandler};

const CLIENT_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
const SERVER_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

#[derive(Clone, Copy, Default)]
struct Flags {
    syn: bool,
    ack: bool,
    fin: bool,
    rst: bool,
}

fn tcp_packet(from: SocketAddrV4, to: SocketAddrV4, seq: u32, flags: Flags, payload: &[u8]) -> Vec<u8> {
    let mut tcp = PacketBuilder::ethernet2(CLIENT_MAC, SERVER_MAC)
        .ipv4(from.ip().octets(), to.ip().octets(), 64)
        .tcp(from.port(), to.port(), seq, 65535);
    if flags.syn {
        tcp = tcp.syn();
    }
    if flags.ack {
        tcp = tcp.ack(1);
    }
    if flags.fin {
        tcp = tcp.fin();
    }
    if flags.rst {
        tcp = tcp.rst();
    }
    let mut out = Vec::with_capacity(tcp.size(payload.len()));
    tcp.write(&mut out, payload).expect("write synthetic packet");
    out
}

/// Synthetic TCP conversation between one client and one server
pub struct Conversation {
    client: SocketAddrV4,
    server: SocketAddrV4,
    client_seq: u32,
    server_seq: u32,
    packets: Vec<Vec<u8>>,
}

impl Conversation {
    pub fn new(client: &str, server: &str) -> Self {
        Self {
            client: client.parse().expect("client address"),
            server: server.parse().expect("server address"),
            client_seq: 1000,
            server_seq: 9000,
            packets: Vec::new(),
        }
    }

    /// SYN and SYN-ACK
    pub fn handshake(mut self) -> Self {
        let syn = Flags { syn: true, ..Flags::default() };
        let syn_ack = Flags { syn: true, ack: true, ..Flags::default() };
        self.packets.push(tcp_packet(self.client, self.server, self.client_seq, syn, b""));
        self.packets.push(tcp_packet(self.server, self.client, self.server_seq, syn_ack, b""));
        self.client_seq += 1;
        self.server_seq += 1;
        self
    }

    pub fn client_sends(mut self, payload: &[u8]) -> Self {
        let ack = Flags { ack: true, ..Flags::default() };
        self.packets.push(tcp_packet(self.client, self.server, self.client_seq, ack, payload));
        self.client_seq += payload.len() as u32;
        self
    }

    pub fn server_sends(mut self, payload: &[u8]) -> Self {
        let ack = Flags { ack: true, ..Flags::default() };
        self.packets.push(tcp_packet(self.server, self.client, self.server_seq, ack, payload));
        self.server_seq += payload.len() as u32;
        self
    }

    /// FIN from both sides
    pub fn close(mut self) -> Self {
        let fin = Flags { ack: true, fin: true, ..Flags::default() };
        self.packets.push(tcp_packet(self.client, self.server, self.client_seq, fin, b""));
        self.packets.push(tcp_packet(self.server, self.client, self.server_seq, fin, b""));
        self
    }

    /// RST from the server
    pub fn reset(mut self) -> Self {
        let rst = Flags { rst: true, ..Flags::default() };
        self.packets.push(tcp_packet(self.server, self.client, self.server_seq, rst, b""));
        self
    }

    pub fn packets(self) -> Vec<Vec<u8>> {
        self.packets
    }
}

/// Interleave the packets of several conversations round-robin
pub fn interleave(conversations: Vec<Vec<Vec<u8>>>) -> Vec<Vec<u8>> {
    let mut queues: Vec<VecDeque<Vec<u8>>> = conversations.into_iter().map(VecDeque::from).collect();
    let mut out = Vec::new();
    while queues.iter().any(|q| !q.is_empty()) {
        for queue in queues.iter_mut() {
            if let Some(packet) = queue.pop_front() {
                out.push(packet);
            }
        }
    }
    out
}

/// Write Ethernet packets into a pcap file
pub fn write_pcap(path: &Path, packets: &[Vec<u8>]) {
    let file = std::fs::File::create(path).expect("create pcap");
    let mut writer = PcapWriter::new(file).expect("pcap header");
    for (i, packet) in packets.iter().enumerate() {
        let timestamp = Duration::from_millis(1_700_000_000_000 + i as u64);
        writer
            .write_packet(&PcapPacket::new(timestamp, packet.len() as u32, packet))
            .expect("write packet");
    }
}

/// Write Ethernet frames as a single-interface pcapng file
pub fn write_pcapng(path: &Path, packets: &[Vec<u8>]) {
    let file = std::fs::File::create(path).expect("create pcapng");
    let mut writer = PcapNgWriter::new(file).expect("section header");
    writer
        .write_pcapng_block(InterfaceDescriptionBlock::new(DataLink::ETHERNET, 65535))
        .expect("interface description");
    for (i, packet) in packets.iter().enumerate() {
        let block = EnhancedPacketBlock {
            interface_id: 0,
            timestamp: Duration::from_millis(1_700_000_000_000 + i as u64),
            original_len: packet.len() as u32,
            data: packet.as_slice().into(),
            options: Vec::new(),
        };
        writer.write_pcapng_block(block).expect("write packet");
    }
}

/// In-memory packet source
pub struct VecSource {
    frames: VecDeque<RawFrame>,
    closed: Arc<AtomicBool>,
}

impl VecSource {
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        let frames = packets
            .into_iter()
            .map(|data| RawFrame::new(Duration::ZERO, data))
            .collect();
        Self {
            frames,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once the dispatcher closes the source
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl PacketSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One recorded handler call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Data {
        protocol: String,
        flow: String,
        direction: Direction,
        data: Vec<u8>,
        is_first: bool,
        is_last: bool,
    },
    Close {
        protocol: String,
        flow: String,
    },
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Handler that appends every call to a shared log
pub struct RecordingHandler {
    protocol: String,
    flow: String,
    log: EventLog,
}

impl ProtocolHandler for RecordingHandler {
    fn on_data(&mut self, data: &[u8], direction: Direction, is_first: bool, is_last: bool) -> Result<()> {
        self.log.lock().unwrap().push(Event::Data {
            protocol: self.protocol.clone(),
            flow: self.flow.clone(),
            direction,
            data: data.to_vec(),
            is_first,
            is_last,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().push(Event::Close {
            protocol: self.protocol.clone(),
            flow: self.flow.clone(),
        });
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        &self.protocol
    }
}

/// Handler factory producing [`RecordingHandler`]s for `protocol`
pub fn recording(protocol: &str, log: &EventLog) -> impl Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static {
    let protocol = protocol.to_string();
    let log = Arc::clone(log);
    move |flow: &FlowInfo| -> Box<dyn ProtocolHandler> {
        Box::new(RecordingHandler {
            protocol: protocol.clone(),
            flow: flow.ident.clone(),
            log: Arc::clone(&log),
        })
    }
}

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn count_closes(log: &EventLog) -> usize {
    events(log).iter().filter(|e| matches!(e, Event::Close { .. })).count()
}
