//! Capture file replay
//!
//! Reads classic pcap and pcapng files. The format is picked from the magic
//! number, not the file extension.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use log::{debug, trace};
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::{Block, PcapNgReader};
use pcap_file::DataLink;

use crate::common::{DispatchError, Result};

use super::{LinkType, PacketSource, RawFrame};

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// On-disk capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pcap,
    PcapNg,
}

impl FileFormat {
    /// Identify the format from the first four bytes of a file
    pub fn detect(magic: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = magic.get(..4)?.try_into().ok()?;
        if bytes == PCAPNG_MAGIC {
            return Some(Self::PcapNg);
        }
        let (le, be) = (u32::from_le_bytes(bytes), u32::from_be_bytes(bytes));
        [le, be]
            .iter()
            .any(|m| *m == PCAP_MAGIC_MICROS || *m == PCAP_MAGIC_NANOS)
            .then_some(Self::Pcap)
    }
}

enum FileReader {
    Pcap(PcapReader<BufReader<File>>),
    PcapNg(PcapNgReader<BufReader<File>>),
}

/// Replays frames from a pcap or pcapng file
pub struct FileSource {
    reader: Option<FileReader>,
    format: FileFormat,
    link_type: LinkType,
}

impl FileSource {
    /// Open a capture file
    ///
    /// # Errors
    ///
    /// [`DispatchError::Capture`] if the file cannot be opened, is neither
    /// pcap nor pcapng, or its (first) interface uses a link type other than
    /// Ethernet, raw IP or Linux cooked capture.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DispatchError::Capture(format!("failed to open {}: {}", path.display(), e)))?;
        let mut buffered = BufReader::new(file);
        let magic = buffered
            .fill_buf()
            .map_err(|e| DispatchError::Capture(format!("failed to read {}: {}", path.display(), e)))?;
        let format = FileFormat::detect(magic)
            .ok_or_else(|| DispatchError::Capture(format!("{} is not a pcap or pcapng file", path.display())))?;

        let (reader, link_type) = match format {
            FileFormat::Pcap => open_pcap(buffered, path)?,
            FileFormat::PcapNg => open_pcapng(buffered, path)?,
        };

        if let LinkType::Other(value) = link_type {
            return Err(DispatchError::Capture(format!(
                "unsupported link type {} in {}",
                value,
                path.display()
            )));
        }
        debug!("Opened {} ({:?}, link type {:?})", path.display(), format, link_type);

        Ok(Self {
            reader: Some(reader),
            format,
            link_type,
        })
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

fn open_pcap(buffered: BufReader<File>, path: &Path) -> Result<(FileReader, LinkType)> {
    let reader = PcapReader::new(buffered)
        .map_err(|e| DispatchError::Capture(format!("failed to read pcap header of {}: {}", path.display(), e)))?;
    let header = reader.header();
    trace!("pcap header of {}: snaplen {}", path.display(), header.snaplen);
    let link_type = link_type_of(header.datalink);
    Ok((FileReader::Pcap(reader), link_type))
}

/// The section header is read eagerly; blocks up to the first interface
/// description are consumed to learn the default link type.
fn open_pcapng(buffered: BufReader<File>, path: &Path) -> Result<(FileReader, LinkType)> {
    let mut reader = PcapNgReader::new(buffered)
        .map_err(|e| DispatchError::Capture(format!("failed to read pcapng header of {}: {}", path.display(), e)))?;

    let mut link_type = LinkType::Ethernet;
    while let Some(block) = reader.next_block() {
        let block =
            block.map_err(|e| DispatchError::Capture(format!("failed to read {}: {}", path.display(), e)))?;
        if let Block::InterfaceDescription(interface) = block {
            link_type = link_type_of(interface.linktype);
            break;
        }
    }
    Ok((FileReader::PcapNg(reader), link_type))
}

fn link_type_of(datalink: DataLink) -> LinkType {
    match datalink {
        DataLink::ETHERNET => LinkType::Ethernet,
        DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => LinkType::RawIp,
        DataLink::LINUX_SLL => LinkType::LinuxSll,
        other => LinkType::Other(u32::from(other)),
    }
}

fn read_error(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Capture(format!("failed to read packet: {}", e))
}

/// Next packet block of a pcapng file, tagged with its interface's link type
fn next_pcapng_frame(reader: &mut PcapNgReader<BufReader<File>>) -> Result<Option<RawFrame>> {
    loop {
        let packet = match reader.next_block() {
            None => return Ok(None),
            Some(Err(e)) => return Err(read_error(e)),
            Some(Ok(Block::EnhancedPacket(packet))) => {
                Some((Some(packet.interface_id), packet.timestamp, packet.data.into_owned()))
            }
            Some(Ok(Block::SimplePacket(packet))) => Some((None, Duration::ZERO, packet.data.into_owned())),
            Some(Ok(_)) => None,
        };
        let Some((interface_id, timestamp, data)) = packet else {
            continue;
        };

        // Simple packet blocks always belong to the first interface
        let interface = interface_id.unwrap_or(0) as usize;
        let link_type = reader
            .interfaces()
            .get(interface)
            .map(|idb| link_type_of(idb.linktype))
            .ok_or_else(|| read_error(format!("packet references unknown interface {}", interface)))?;
        return Ok(Some(RawFrame::new(timestamp, data).with_link_type(link_type)));
    }
}

impl PacketSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match self.reader.as_mut() {
            None => Ok(None),
            Some(FileReader::Pcap(reader)) => match reader.next_packet() {
                None => Ok(None),
                Some(Ok(packet)) => Ok(Some(RawFrame::new(packet.timestamp, packet.data.into_owned()))),
                Some(Err(e)) => Err(read_error(e)),
            },
            Some(FileReader::PcapNg(reader)) => next_pcapng_frame(reader),
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn close(&mut self) {
        self.reader.take();
    }
}
