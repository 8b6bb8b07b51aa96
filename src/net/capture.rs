//! 抓包
//!
//! Writes pcapng files for selected devices. Every tapped device gets its own
//! file with a single raw-IPv4 interface. A promiscuous tap on a segment sees
//! every frame sent on that segment; a plain tap sees only the frames its
//! device sends or receives.
//!
//! Packets carry no payload bytes in the simulation, so the capture holds
//! real IPv4/UDP/TCP headers followed by zero padding up to the packet size.

use pcap_file::pcapng::PcapNgWriter;
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::InterfaceDescriptionBlock;
use pcap_file::pcapng::blocks::section_header::SectionHeaderBlock;
use pcap_file::{DataLink, Endianness};
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::{self, MutableIpv4Packet};
use pnet_packet::tcp::{self, MutableTcpPacket, TcpFlags};
use pnet_packet::udp::{self, MutableUdpPacket};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::id::{IfIndex, LinkId, NodeId};
use super::packet::Packet;
use super::transport::{TcpSegment, Transport};
use crate::error::Result;
use crate::sim::SimTime;
use crate::topo::Topology;

const IPV4_HEADER_BYTES: usize = 20;
const SNAPLEN: u32 = 65535;

/// A device that can be tapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapturePoint {
    pub link: LinkId,
    pub node: NodeId,
    pub interface: IfIndex,
    pub promiscuous: bool,
}

struct Tap {
    point: CapturePoint,
    path: PathBuf,
    writer: Option<PcapNgWriter<BufWriter<File>>>,
    packets: u64,
}

impl Tap {
    fn write(&mut self, t: SimTime, pkt: &Packet) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let data = encode(pkt);
        let block = EnhancedPacketBlock {
            interface_id: 0,
            timestamp: pcap_timestamp(t),
            original_len: pkt.size_bytes,
            data: data.into(),
            options: Vec::new(),
        };
        if let Err(e) = writer.write_pcapng_block(block) {
            warn!(path = %self.path.display(), error = %e, "⚠️ capture write failed, tap disabled");
            self.writer = None;
            return;
        }
        self.packets += 1;
    }
}

/// Open capture files, one per tapped device.
#[derive(Default)]
pub struct CaptureSet {
    taps: Vec<Tap>,
}

impl std::fmt::Debug for CaptureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.taps.iter().map(|t| &t.path))
            .finish()
    }
}

impl CaptureSet {
    /// Create `<dir>/<prefix>-<link>-<node>-<if>.pcapng` for every point.
    pub fn open(dir: &Path, prefix: &str, points: &[CapturePoint], topo: &Topology) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut taps = Vec::with_capacity(points.len());
        for p in points {
            let link = topo.link(p.link).map(|l| l.name.as_str()).unwrap_or("link");
            let node = topo.node(p.node).map(|n| n.label()).unwrap_or("node");
            let path = dir.join(format!("{prefix}-{link}-{node}-{}.pcapng", p.interface.0));

            let file = File::create(&path)?;
            let mut writer = PcapNgWriter::with_section_header(
                BufWriter::new(file),
                SectionHeaderBlock {
                    endianness: Endianness::Big,
                    major_version: 1,
                    minor_version: 0,
                    section_length: -1,
                    options: vec![],
                },
            )?;
            writer.write_pcapng_block(InterfaceDescriptionBlock {
                linktype: DataLink::IPV4,
                snaplen: SNAPLEN,
                options: vec![],
            })?;
            debug!(path = %path.display(), promiscuous = p.promiscuous, "📼 capture opened");
            taps.push(Tap {
                point: *p,
                path,
                writer: Some(writer),
                packets: 0,
            });
        }
        Ok(Self { taps })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.taps.iter().map(|t| t.path.as_path())
    }

    /// Packets written so far, per file.
    pub fn counts(&self) -> Vec<(&Path, u64)> {
        self.taps
            .iter()
            .map(|t| (t.path.as_path(), t.packets))
            .collect()
    }

    /// A frame starts transmission on `link` from `from`.
    pub(crate) fn on_tx(&mut self, link: LinkId, from: NodeId, t: SimTime, pkt: &Packet) {
        for tap in self
            .taps
            .iter_mut()
            .filter(|tap| tap.point.link == link && (tap.point.promiscuous || tap.point.node == from))
        {
            tap.write(t, pkt);
        }
    }

    /// A frame arrives at `at` over `link`.
    pub(crate) fn on_rx(&mut self, link: LinkId, at: NodeId, t: SimTime, pkt: &Packet) {
        for tap in self
            .taps
            .iter_mut()
            .filter(|tap| tap.point.link == link && !tap.point.promiscuous && tap.point.node == at)
        {
            tap.write(t, pkt);
        }
    }

    pub fn flush(&mut self) {
        for tap in &mut self.taps {
            if let Some(w) = tap.writer.as_mut() {
                if let Err(e) = w.get_mut().flush() {
                    warn!(path = %tap.path.display(), error = %e, "⚠️ capture flush failed");
                    tap.writer = None;
                }
            }
        }
    }
}

// The pcapng writer stores nanoseconds under the default microsecond
// resolution, so timestamps are scaled down before writing.
fn pcap_timestamp(t: SimTime) -> Duration {
    Duration::from_nanos(t.0 / 1_000)
}

/// Build the IPv4 bytes of `pkt`.
fn encode(pkt: &Packet) -> Vec<u8> {
    let transport_header = match pkt.transport {
        Transport::Udp(_) => 8,
        Transport::Tcp { .. } => 20,
    };
    let total = (pkt.size_bytes as usize)
        .max(IPV4_HEADER_BYTES + transport_header)
        .min(SNAPLEN as usize);
    let mut buffer = vec![0u8; total];
    let segment_len = total - IPV4_HEADER_BYTES;

    match pkt.transport {
        Transport::Udp(_) => {
            if let Some(mut udp_writer) = MutableUdpPacket::new(&mut buffer[IPV4_HEADER_BYTES..]) {
                udp_writer.set_source(pkt.src_port);
                udp_writer.set_destination(pkt.dst_port);
                udp_writer.set_length(segment_len as u16);
                let checksum = udp::ipv4_checksum(&udp_writer.to_immutable(), &pkt.src, &pkt.dst);
                udp_writer.set_checksum(checksum);
            }
        }
        Transport::Tcp { seg, .. } => {
            if let Some(mut tcp_writer) = MutableTcpPacket::new(&mut buffer[IPV4_HEADER_BYTES..]) {
                // Sequence numbers start at 1 after the SYN.
                let (seq, ack) = match seg {
                    TcpSegment::Syn => (0, 0),
                    TcpSegment::SynAck => (0, 1),
                    TcpSegment::Data { seq, .. } => (seq.wrapping_add(1), 1),
                    TcpSegment::Ack { ack } => (1, ack.wrapping_add(1)),
                };
                tcp_writer.set_source(pkt.src_port);
                tcp_writer.set_destination(pkt.dst_port);
                tcp_writer.set_sequence(seq as u32);
                tcp_writer.set_acknowledgement(ack as u32);
                tcp_writer.set_data_offset(5);
                tcp_writer.set_flags(match seg {
                    TcpSegment::Syn => TcpFlags::SYN,
                    TcpSegment::SynAck => TcpFlags::SYN | TcpFlags::ACK,
                    TcpSegment::Data { .. } => TcpFlags::PSH | TcpFlags::ACK,
                    TcpSegment::Ack { .. } => TcpFlags::ACK,
                });
                tcp_writer.set_window(u16::MAX);
                let checksum = tcp::ipv4_checksum(&tcp_writer.to_immutable(), &pkt.src, &pkt.dst);
                tcp_writer.set_checksum(checksum);
            }
        }
    }

    if let Some(mut ip_writer) = MutableIpv4Packet::new(&mut buffer) {
        ip_writer.set_version(4);
        ip_writer.set_header_length(5);
        ip_writer.set_dscp(0);
        ip_writer.set_identification((pkt.id & 0xffff) as u16);
        ip_writer.set_flags(0b010);
        ip_writer.set_fragment_offset(0);
        ip_writer.set_ttl(pkt.ttl);
        ip_writer.set_next_level_protocol(IpNextHeaderProtocol::new(pkt.protocol().number()));
        ip_writer.set_source(pkt.src);
        ip_writer.set_destination(pkt.dst);
        ip_writer.set_total_length(total as u16);
        let checksum = ipv4::checksum(&ip_writer.to_immutable());
        ip_writer.set_checksum(checksum);
    }
    buffer
}
