//! 网络运行时
//!
//! `Network` owns the finished topology and the runtime state layered on top
//! of it: per-channel busy times, statistics, applications, the TCP stack and
//! the optional measurement collaborators. Forwarding is hop by hop through
//! each node's routing table.

use std::net::Ipv4Addr;
use std::path::Path;

use super::capture::{CapturePoint, CaptureSet};
use super::deliver_packet::DeliverPacket;
use super::flow_monitor::FlowMonitor;
use super::id::{LinkId, NodeId};
use super::link::LinkKind;
use super::packet::{DEFAULT_TTL, Packet};
use super::stats::{DropReason, Stats};
use super::transport::Transport;
use crate::error::Result;
use crate::proto::Applications;
use crate::proto::tcp::TcpStack;
use crate::sim::{SimTime, Simulator};
use crate::topo::Topology;
use crate::viz::VizLogger;
use tracing::{debug, trace, warn};

/// Default per-channel backlog: 100 full-size frames.
pub const DEFAULT_QUEUE_LIMIT_BYTES: u64 = 100 * 1500;

/// 网络
pub struct Network {
    topo: Topology,
    /// busy-until per link and channel (see `Link::channel_of`).
    channels: Vec<[SimTime; 2]>,
    queue_limit_bytes: u64,
    next_pkt_id: u64,
    pub stats: Stats,
    pub(crate) flow_monitor: Option<FlowMonitor>,
    pub(crate) apps: Applications,
    pub(crate) tcp: TcpStack,
    pub(crate) captures: Option<CaptureSet>,
    pub(crate) viz: Option<VizLogger>,
}

impl Network {
    pub fn new(topo: Topology) -> Self {
        let channels = vec![[SimTime::ZERO; 2]; topo.links().len()];
        Self {
            topo,
            channels,
            queue_limit_bytes: DEFAULT_QUEUE_LIMIT_BYTES,
            next_pkt_id: 0,
            stats: Stats::default(),
            flow_monitor: None,
            apps: Applications::default(),
            tcp: TcpStack::default(),
            captures: None,
            viz: None,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    pub fn set_queue_limit_bytes(&mut self, bytes: u64) {
        self.queue_limit_bytes = bytes;
    }

    pub fn apps(&self) -> &Applications {
        &self.apps
    }

    pub(crate) fn apps_mut(&mut self) -> &mut Applications {
        &mut self.apps
    }

    pub fn tcp(&self) -> &TcpStack {
        &self.tcp
    }

    pub fn flow_monitor(&self) -> Option<&FlowMonitor> {
        self.flow_monitor.as_ref()
    }

    /// Attach a flow monitor probing every addressed node.
    pub fn install_flow_monitor(&mut self) {
        self.flow_monitor = Some(FlowMonitor::install_all(&self.topo));
    }

    /// Tappable devices: the first member device of every segment (in
    /// promiscuous mode) and both devices of every trunk.
    pub fn capture_points(&self) -> Vec<CapturePoint> {
        let mut out = Vec::new();
        for link in self.topo.links() {
            match &link.kind {
                LinkKind::Segment { .. } => {
                    if let Some(a) = link.attachments.get(1) {
                        out.push(CapturePoint {
                            link: link.id,
                            node: a.node,
                            interface: a.interface,
                            promiscuous: true,
                        });
                    }
                }
                LinkKind::Trunk { .. } => {
                    out.extend(link.attachments.iter().map(|a| CapturePoint {
                        link: link.id,
                        node: a.node,
                        interface: a.interface,
                        promiscuous: false,
                    }));
                }
                LinkKind::Radio { .. } => {}
            }
        }
        out
    }

    /// Open pcap files for every capture point. Returns how many were opened.
    pub fn enable_captures(&mut self, dir: &Path, prefix: &str) -> Result<usize> {
        let points = self.capture_points();
        let set = CaptureSet::open(dir, prefix, &points, &self.topo)?;
        self.captures = Some(set);
        Ok(points.len())
    }

    pub fn captures(&self) -> Option<&CaptureSet> {
        self.captures.as_ref()
    }

    /// 创建数据包
    pub(crate) fn make_packet(
        &mut self,
        flow_id: u64,
        (src, src_port): (Ipv4Addr, u16),
        (dst, dst_port): (Ipv4Addr, u16),
        size_bytes: u32,
        transport: Transport,
    ) -> Packet {
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        Packet {
            id,
            flow_id,
            src,
            dst,
            src_port,
            dst_port,
            size_bytes,
            ttl: DEFAULT_TTL,
            transport,
            sent_at: SimTime::ZERO,
            hops_taken: 0,
        }
    }

    /// Originate `pkt` at `node`.
    #[tracing::instrument(skip(self, pkt, sim), fields(pkt_id = pkt.id, flow_id = pkt.flow_id))]
    pub(crate) fn send_from(&mut self, node: NodeId, mut pkt: Packet, sim: &mut Simulator) {
        let now = sim.now();
        pkt.sent_at = now;
        self.stats.originated_pkts += 1;
        if let Some(fm) = &mut self.flow_monitor {
            fm.record_tx(node, &pkt, now);
        }
        trace!(src = %pkt.src, dst = %pkt.dst, size = pkt.size_bytes, "📤 packet originated");

        let local = self.topo.node(node).is_some_and(|n| n.owns(pkt.dst));
        if local {
            sim.schedule(now, DeliverPacket { to: node, via: None, pkt });
        } else {
            self.forward_from(node, pkt, sim);
        }
    }

    /// 从指定节点转发数据包
    pub(crate) fn forward_from(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator) {
        let Some(route) = self
            .topo
            .routing_table(from)
            .and_then(|t| t.lookup(pkt.dst))
            .cloned()
        else {
            self.drop_packet(from, pkt, DropReason::NoRoute, sim.now());
            return;
        };

        let next_ip = route.next_hop.unwrap_or(pkt.dst);
        let resolved = self
            .topo
            .node(from)
            .and_then(|n| n.interface(route.interface))
            .and_then(|iface| self.topo.link(iface.link))
            .and_then(|link| {
                link.attachments
                    .iter()
                    .filter(|a| a.node != from)
                    .find(|a| {
                        self.topo
                            .node(a.node)
                            .and_then(|n| n.interface(a.interface))
                            .is_some_and(|i| i.address == Some(next_ip))
                    })
                    .map(|a| (link.id, a.node))
            });

        let Some((link, to)) = resolved else {
            debug!(%from, dst = %pkt.dst, %next_ip, "next hop not on link");
            self.drop_packet(from, pkt, DropReason::Unresolved, sim.now());
            return;
        };
        trace!(%from, %to, %link, origin = ?route.origin, "🔀 route selected");
        self.transmit(from, link, to, pkt, sim);
    }

    /// Queue `pkt` on `link` towards `to`.
    fn transmit(&mut self, from: NodeId, link_id: LinkId, to: NodeId, pkt: Packet, sim: &mut Simulator) {
        let Some(link) = self.topo.link(link_id) else {
            self.drop_packet(from, pkt, DropReason::Unresolved, sim.now());
            return;
        };
        let now = sim.now();
        let ch = link.channel_of(from);
        let busy = self.channels[link_id.0][ch];
        let start = now.max(busy);

        let backlog_bytes =
            (u128::from(start.saturating_sub(now).0) * u128::from(link.bandwidth_bps) / 8_000_000_000) as u64;
        if backlog_bytes + u64::from(pkt.size_bytes) > self.queue_limit_bytes {
            self.drop_packet(from, pkt, DropReason::QueueFull, now);
            return;
        }

        let tx_time = link.tx_time(pkt.size_bytes);
        let depart = start.saturating_add(tx_time);
        let arrive = depart
            .saturating_add(link.latency)
            .saturating_add(link.backhaul_latency);
        let is_radio = matches!(link.kind, LinkKind::Radio { .. });
        self.channels[link_id.0][ch] = depart;

        trace!(
            now = ?now,
            start = ?start,
            tx_time = ?tx_time,
            depart = ?depart,
            arrive = ?arrive,
            "计算传输时间"
        );

        if let Some(c) = &mut self.captures {
            c.on_tx(link_id, from, start, &pkt);
        }
        self.viz_tx_start(now, &pkt, link_id, from, to, depart, arrive);
        if is_radio {
            self.viz_radio_relay(now, &pkt, from, to);
        }
        sim.schedule(
            arrive,
            DeliverPacket {
                to,
                via: Some(link_id),
                pkt,
            },
        );
    }

    /// 将数据包交付给节点处理
    #[tracing::instrument(skip(self, pkt, sim), fields(pkt_id = pkt.id, flow_id = pkt.flow_id))]
    pub(crate) fn deliver(&mut self, to: NodeId, via: Option<LinkId>, mut pkt: Packet, sim: &mut Simulator) {
        let now = sim.now();
        if let (Some(link), Some(c)) = (via, self.captures.as_mut()) {
            c.on_rx(link, to, now, &pkt);
        }
        self.viz_arrive_node(now, &pkt, to);

        if self.topo.node(to).is_some_and(|n| n.owns(pkt.dst)) {
            self.on_delivered(to, pkt, sim);
            return;
        }
        if !pkt.advance() {
            warn!(node = %to, pkt_id = pkt.id, "⏱️ TTL expired");
            self.drop_packet(to, pkt, DropReason::TtlExpired, now);
            return;
        }
        self.stats.forwarded_pkts += 1;
        self.forward_from(to, pkt, sim);
    }

    pub(crate) fn drop_packet(&mut self, at: NodeId, pkt: Packet, reason: DropReason, now: SimTime) {
        debug!(node = %at, pkt_id = pkt.id, dst = %pkt.dst, ?reason, "🗑️ packet dropped");
        self.stats.record_drop(reason);
        if let Some(fm) = &mut self.flow_monitor {
            fm.record_drop(&pkt);
        }
        self.viz_drop(now, &pkt, at, reason);
    }

    /// Flush and close measurement outputs.
    pub(crate) fn finish(&mut self) {
        if let Some(c) = &mut self.captures {
            c.flush();
        }
    }
}
