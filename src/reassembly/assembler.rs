use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace};

use crate::common::Direction;
use crate::config::defaults;
use crate::stream::{FlowInfo, FlowKey};

use super::{ReassemblyStream, StreamChunk, StreamFactory, TcpSegment};

/// Reassembler limits
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Out-of-order bytes buffered per direction before the oldest gap is skipped
    pub max_buffered_bytes: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: defaults::max_buffered_bytes(),
        }
    }
}

/// Range ready for delivery
struct Ready {
    data: Vec<u8>,
    start: bool,
    end: bool,
    skipped: usize,
}

/// One direction of a flow. Offsets are relative to the first byte seen.
#[derive(Default)]
struct HalfStream {
    base: Option<u32>,
    next: u64,
    pending: BTreeMap<u64, Vec<u8>>,
    pending_bytes: usize,
    delivered_any: bool,
    fin_offset: Option<u64>,
}

impl HalfStream {
    /// Sequence number of the SYN; data starts one past it
    fn set_isn(&mut self, seq: u32) {
        if self.base.is_none() {
            self.base = Some(seq.wrapping_add(1));
        }
    }

    /// Map a sequence number to a stream offset, tolerant of wraparound
    fn offset_of(&mut self, seq: u32) -> i64 {
        let base = *self.base.get_or_insert(seq);
        let expected = base.wrapping_add(self.next as u32);
        self.next as i64 + seq.wrapping_sub(expected) as i32 as i64
    }

    fn finished(&self) -> bool {
        matches!(self.fin_offset, Some(fin) if self.next >= fin)
    }

    fn push_ready(&mut self, data: Vec<u8>, skipped: usize, out: &mut Vec<Ready>) {
        let end_offset = self.next + data.len() as u64;
        let start = !self.delivered_any;
        self.delivered_any = true;
        self.next = end_offset;
        out.push(Ready {
            end: self.fin_offset == Some(end_offset),
            data,
            start,
            skipped,
        });
    }

    fn insert(&mut self, offset: i64, data: &[u8], max_buffered: usize, out: &mut Vec<Ready>) {
        let next = self.next as i64;
        let end = offset + data.len() as i64;
        if end <= next {
            trace!("Dropping retransmitted range at offset {}", offset);
            return;
        }

        let (offset, data) = if offset < next {
            (next, &data[(next - offset) as usize..])
        } else {
            (offset, data)
        };

        if offset == next {
            self.push_ready(data.to_vec(), 0, out);
            self.drain(out);
            return;
        }

        let offset = offset as u64;
        let replace = self.pending.get(&offset).map_or(true, |held| held.len() < data.len());
        if replace {
            if let Some(old) = self.pending.insert(offset, data.to_vec()) {
                self.pending_bytes -= old.len();
            }
            self.pending_bytes += data.len();
        }

        while self.pending_bytes > max_buffered {
            if !self.skip_gap(out) {
                break;
            }
        }
    }

    /// Deliver buffered ranges that became contiguous
    fn drain(&mut self, out: &mut Vec<Ready>) {
        while let Some((&offset, _)) = self.pending.iter().next() {
            if offset > self.next {
                break;
            }
            let data = self.take_pending(offset);
            let end = offset + data.len() as u64;
            if end > self.next {
                let trimmed = data[(self.next - offset) as usize..].to_vec();
                self.push_ready(trimmed, 0, out);
            }
        }
    }

    /// Give up on the gap before the oldest buffered range
    fn skip_gap(&mut self, out: &mut Vec<Ready>) -> bool {
        let Some((&offset, _)) = self.pending.iter().next() else {
            return false;
        };
        let data = self.take_pending(offset);
        let skipped = offset.saturating_sub(self.next) as usize;
        if offset + data.len() as u64 > self.next {
            let data = if offset < self.next {
                data[(self.next - offset) as usize..].to_vec()
            } else {
                data
            };
            self.next = self.next.max(offset);
            self.push_ready(data, skipped, out);
        }
        self.drain(out);
        true
    }

    /// Deliver everything still buffered, skipping over holes
    fn flush(&mut self, out: &mut Vec<Ready>) {
        while self.skip_gap(out) {}
    }

    fn take_pending(&mut self, offset: u64) -> Vec<u8> {
        let data = self.pending.remove(&offset).unwrap_or_default();
        self.pending_bytes -= data.len();
        data
    }
}

struct FlowEntry {
    info: FlowInfo,
    stream: Arc<dyn ReassemblyStream>,
    halves: [HalfStream; 2],
    last_seen: Instant,
}

impl FlowEntry {
    fn direction_of(&self, segment: &TcpSegment) -> Direction {
        if segment.src == self.info.client {
            Direction::ClientToServer
        } else {
            Direction::ServerToClient
        }
    }
}

/// Minimal TCP reassembler
///
/// Orders each direction by sequence number, trims retransmitted bytes and
/// completes flows on FIN from both sides or RST. Not a full TCP state
/// machine: windows, checksums and urgent data are ignored.
pub struct TcpAssembler<F: StreamFactory> {
    factory: F,
    flows: HashMap<FlowKey, FlowEntry>,
    config: AssemblerConfig,
}

impl<F: StreamFactory> TcpAssembler<F> {
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, AssemblerConfig::default())
    }

    pub fn with_config(factory: F, config: AssemblerConfig) -> Self {
        Self {
            factory,
            flows: HashMap::new(),
            config,
        }
    }

    /// Number of flows currently tracked
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Feed one segment
    pub fn ingest(&mut self, segment: TcpSegment) {
        self.ingest_at(segment, Instant::now());
    }

    pub(crate) fn ingest_at(&mut self, segment: TcpSegment, now: Instant) {
        let key = FlowKey::new(segment.src, segment.dst);

        let entry = match self.flows.entry(key) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                // Stray ACK/FIN/RST of a flow we never saw or already retired
                if !segment.syn && (segment.payload.is_empty() || segment.rst) {
                    return;
                }
                let (client, server) = if segment.syn && segment.ack {
                    (segment.dst, segment.src)
                } else {
                    (segment.src, segment.dst)
                };
                let info = FlowInfo::new(client, server);
                debug!("New flow {}", info.ident);
                let stream = self.factory.new_stream(&info);
                vacant.insert(FlowEntry {
                    info,
                    stream,
                    halves: [HalfStream::default(), HalfStream::default()],
                    last_seen: now,
                })
            }
        };

        entry.last_seen = now;
        let direction = entry.direction_of(&segment);
        if !entry.stream.accept(&segment, direction) {
            return;
        }

        let half = &mut entry.halves[direction.index()];
        if segment.syn {
            half.set_isn(segment.seq);
        }

        let mut ready = Vec::new();
        let data_seq = if segment.syn { segment.seq.wrapping_add(1) } else { segment.seq };
        if segment.fin || !segment.payload.is_empty() {
            let offset = half.offset_of(data_seq);
            if segment.fin {
                let fin = (offset + segment.payload.len() as i64).max(0) as u64;
                half.fin_offset.get_or_insert(fin);
            }
            if !segment.payload.is_empty() {
                half.insert(offset, &segment.payload, self.config.max_buffered_bytes, &mut ready);
            }
        }

        let stream = Arc::clone(&entry.stream);
        deliver(stream.as_ref(), direction, ready);

        let finished = entry.halves.iter().all(HalfStream::finished);
        if segment.rst || finished {
            trace!("Flow {} ended ({})", entry.info.ident, if segment.rst { "reset" } else { "fin" });
            self.complete(key);
        }
    }

    /// Complete flows idle since before `cutoff`
    ///
    /// # Returns
    ///
    /// Number of flows completed
    pub fn flush_older_than(&mut self, cutoff: Instant) -> usize {
        let stale: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, entry)| entry.last_seen < cutoff)
            .map(|(key, _)| *key)
            .collect();

        let count = stale.len();
        for key in stale {
            self.complete(key);
        }
        if count > 0 {
            debug!("Flushed {} idle flows", count);
        }
        count
    }

    /// Complete every tracked flow
    pub fn flush_all(&mut self) -> usize {
        let keys: Vec<FlowKey> = self.flows.keys().copied().collect();
        let count = keys.len();
        for key in keys {
            self.complete(key);
        }
        count
    }

    fn complete(&mut self, key: FlowKey) {
        let Some(entry) = self.flows.get_mut(&key) else {
            return;
        };

        let stream = Arc::clone(&entry.stream);
        for direction in [Direction::ClientToServer, Direction::ServerToClient] {
            let mut ready = Vec::new();
            entry.halves[direction.index()].flush(&mut ready);
            deliver(stream.as_ref(), direction, ready);
        }

        if stream.on_complete() {
            self.flows.remove(&key);
        } else {
            debug!("Stream for {} asked to be kept after completion", entry.info.ident);
        }
    }
}

fn deliver(stream: &dyn ReassemblyStream, direction: Direction, ready: Vec<Ready>) {
    for range in ready {
        stream.on_data(&StreamChunk {
            data: &range.data,
            direction,
            start: range.start,
            end: range.end,
            skipped: range.skipped,
        });
    }
}
