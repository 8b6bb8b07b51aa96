//! Visualization hooks for the network.

use crate::sim::SimTime;
use crate::viz::{
    VizEvent, VizEventKind, VizLinkInfo, VizLogger, VizNodeInfo, VizPacketKind, VizTcp,
};

use super::stats::DropReason;
use super::{LinkId, Network, NodeId, Packet, TcpSegment, Transport};

impl Network {
    pub(crate) fn pkt_kind(pkt: &Packet) -> VizPacketKind {
        match &pkt.transport {
            Transport::Tcp {
                seg: TcpSegment::Ack { .. },
                ..
            } => VizPacketKind::Ack,
            Transport::Tcp {
                seg: TcpSegment::Syn | TcpSegment::SynAck,
                ..
            } => VizPacketKind::Control,
            _ => VizPacketKind::Data,
        }
    }

    fn viz_push(&mut self, ev: VizEvent) {
        if let Some(v) = &mut self.viz {
            v.push(ev);
        }
    }

    fn viz_pkt(&mut self, t: SimTime, pkt: &Packet, kind: VizEventKind) {
        if self.viz.is_none() {
            return;
        }
        self.viz_push(VizEvent {
            t_ns: t.0,
            pkt_id: Some(pkt.id),
            flow_id: Some(pkt.flow_id),
            pkt_bytes: Some(pkt.size_bytes),
            pkt_kind: Some(Self::pkt_kind(pkt)),
            kind,
        });
    }

    /// Start recording the animation trace; the topology snapshot becomes the
    /// first event.
    pub fn enable_viz(&mut self) {
        self.viz = Some(VizLogger::default());
        self.emit_viz_meta();
    }

    pub fn viz(&self) -> Option<&VizLogger> {
        self.viz.as_ref()
    }

    fn emit_viz_meta(&mut self) {
        let nodes = self
            .topology()
            .animation_nodes()
            .into_iter()
            .map(|n| VizNodeInfo {
                id: n.id.0,
                label: n.label,
                role: n.role,
                x: n.position.map(|p| p.x),
                y: n.position.map(|p| p.y),
            })
            .collect::<Vec<_>>();
        let links = self
            .topology()
            .links()
            .iter()
            .map(|l| VizLinkInfo {
                id: l.id.0,
                name: l.name.clone(),
                kind: l.kind.as_str().to_string(),
                nodes: l.attachments.iter().map(|a| a.node.0).collect(),
                bandwidth_bps: l.bandwidth_bps,
                latency_ns: l.latency.saturating_add(l.backhaul_latency).0,
                subnet: l.subnet.map(|s| s.to_string()),
            })
            .collect::<Vec<_>>();
        self.viz_push(VizEvent {
            t_ns: 0,
            pkt_id: None,
            flow_id: None,
            pkt_bytes: None,
            pkt_kind: None,
            kind: VizEventKind::Meta { nodes, links },
        });
    }

    pub(crate) fn viz_tx_start(
        &mut self,
        t: SimTime,
        pkt: &Packet,
        link: LinkId,
        from: NodeId,
        to: NodeId,
        depart: SimTime,
        arrive: SimTime,
    ) {
        self.viz_pkt(
            t,
            pkt,
            VizEventKind::TxStart {
                link: link.0,
                from: from.0,
                to: to.0,
                depart_ns: depart.0,
                arrive_ns: arrive.0,
            },
        );
    }

    pub(crate) fn viz_radio_relay(&mut self, t: SimTime, pkt: &Packet, from: NodeId, to: NodeId) {
        if self.viz.is_none() {
            return;
        }
        let base_station = self.topology().radio().and_then(|cell| {
            let subscriber = if cell.subscribers.contains(&from) { from } else { to };
            cell.attached_base_station(subscriber)
        });
        self.viz_pkt(
            t,
            pkt,
            VizEventKind::RadioRelay {
                from: from.0,
                to: to.0,
                base_station: base_station.map(|b| b.0),
            },
        );
    }

    pub(crate) fn viz_arrive_node(&mut self, t: SimTime, pkt: &Packet, node: NodeId) {
        self.viz_pkt(t, pkt, VizEventKind::ArriveNode { node: node.0 });
    }

    pub(crate) fn viz_delivered(&mut self, t: SimTime, pkt: &Packet, node: NodeId) {
        self.viz_pkt(t, pkt, VizEventKind::Delivered { node: node.0 });
    }

    pub(crate) fn viz_drop(&mut self, t: SimTime, pkt: &Packet, node: NodeId, reason: DropReason) {
        self.viz_pkt(t, pkt, VizEventKind::Drop { node: node.0, reason });
    }

    pub(crate) fn viz_app(&mut self, t: SimTime, app: usize, node: NodeId, app_kind: &str, start: bool) {
        let app_kind = app_kind.to_string();
        let kind = if start {
            VizEventKind::AppStart {
                app,
                node: node.0,
                app_kind,
            }
        } else {
            VizEventKind::AppStop {
                app,
                node: node.0,
                app_kind,
            }
        };
        self.viz_push(VizEvent {
            t_ns: t.0,
            pkt_id: None,
            flow_id: None,
            pkt_bytes: None,
            pkt_kind: None,
            kind,
        });
    }

    fn viz_tcp(&mut self, t: SimTime, tcp: VizTcp, pkt_kind: VizPacketKind, kind: fn(VizTcp) -> VizEventKind) {
        if self.viz.is_none() {
            return;
        }
        self.viz_push(VizEvent {
            t_ns: t.0,
            pkt_id: None,
            flow_id: Some(tcp.conn_id),
            pkt_bytes: None,
            pkt_kind: Some(pkt_kind),
            kind: kind(tcp),
        });
    }

    pub(crate) fn viz_tcp_send_data(&mut self, t: SimTime, conn_id: u64, seq: u64, len: u32, retrans: bool) {
        let tcp = VizTcp {
            conn_id,
            seq: Some(seq),
            len: Some(len),
            retrans: retrans.then_some(true),
            ..Default::default()
        };
        self.viz_tcp(t, tcp, VizPacketKind::Data, VizEventKind::TcpSendData);
    }

    pub(crate) fn viz_tcp_send_ack(&mut self, t: SimTime, conn_id: u64, ack: u64) {
        let tcp = VizTcp {
            conn_id,
            ack: Some(ack),
            ..Default::default()
        };
        self.viz_tcp(t, tcp, VizPacketKind::Ack, VizEventKind::TcpSendAck);
    }

    pub(crate) fn viz_tcp_recv_ack(&mut self, t: SimTime, conn_id: u64, ack: u64) {
        let tcp = VizTcp {
            conn_id,
            ack: Some(ack),
            ..Default::default()
        };
        self.viz_tcp(t, tcp, VizPacketKind::Ack, VizEventKind::TcpRecvAck);
    }

    pub(crate) fn viz_tcp_rto(&mut self, t: SimTime, conn_id: u64, seq: u64) {
        let tcp = VizTcp {
            conn_id,
            seq: Some(seq),
            ..Default::default()
        };
        self.viz_tcp(t, tcp, VizPacketKind::Data, VizEventKind::TcpRto);
    }
}
