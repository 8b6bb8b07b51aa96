//! UDP echo
//!
//! The client sends `max_packets` requests of `packet_size` payload bytes, one
//! every `interval`, starting at its start time. The server returns every
//! request to its sender unchanged.

use tracing::info;

use super::{AppId, AppTimer, Endpoint};
use crate::net::{Network, NodeId, Packet, Transport, UDP_OVERHEAD_BYTES, UdpPayload};
use crate::sim::{SimTime, Simulator};

#[derive(Debug, Clone)]
pub struct EchoServer {
    pub port: u16,
    pub flow_id: u64,
    pub requests: u64,
}

impl EchoServer {
    pub fn new(port: u16, flow_id: u64) -> Self {
        Self {
            port,
            flow_id,
            requests: 0,
        }
    }

    pub(crate) fn on_datagram(
        &mut self,
        at: NodeId,
        pkt: &Packet,
        payload: UdpPayload,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let UdpPayload::EchoRequest { seq } = payload else {
            return;
        };
        self.requests += 1;
        let bytes = pkt.size_bytes.saturating_sub(UDP_OVERHEAD_BYTES);
        info!(now = %sim.now(), bytes, from = %pkt.src, port = pkt.src_port, "Received {bytes} bytes from {}", pkt.src);

        let reply = net.make_packet(
            self.flow_id,
            (pkt.dst, pkt.dst_port),
            (pkt.src, pkt.src_port),
            pkt.size_bytes,
            Transport::Udp(UdpPayload::EchoReply { seq }),
        );
        info!(now = %sim.now(), bytes, to = %pkt.src, "Echoing packet");
        net.send_from(at, reply, sim);
    }
}

#[derive(Debug, Clone)]
pub struct EchoClient {
    pub remote: Endpoint,
    pub flow_id: u64,
    pub max_packets: u32,
    pub interval: SimTime,
    pub packet_size: u32,
    local: Option<Endpoint>,
    sent_at: Vec<SimTime>,
    /// Round-trip time per reply, in reception order.
    rtts: Vec<SimTime>,
}

impl EchoClient {
    pub fn new(remote: Endpoint, flow_id: u64, max_packets: u32, interval: SimTime, packet_size: u32) -> Self {
        Self {
            remote,
            flow_id,
            max_packets,
            interval,
            packet_size,
            local: None,
            sent_at: Vec::new(),
            rtts: Vec::new(),
        }
    }

    pub fn sent(&self) -> usize {
        self.sent_at.len()
    }

    pub fn replies(&self) -> usize {
        self.rtts.len()
    }

    pub fn rtts(&self) -> &[SimTime] {
        &self.rtts
    }

    pub(crate) fn start(&mut self, id: AppId, node: NodeId, local: Endpoint, sim: &mut Simulator, net: &mut Network) {
        self.local = Some(local);
        self.send(id, node, sim, net);
    }

    pub(crate) fn on_timer(&mut self, id: AppId, node: NodeId, sim: &mut Simulator, net: &mut Network) {
        self.send(id, node, sim, net);
    }

    fn send(&mut self, id: AppId, node: NodeId, sim: &mut Simulator, net: &mut Network) {
        let Some(local) = self.local else {
            return;
        };
        if self.sent_at.len() >= self.max_packets as usize {
            return;
        }
        let seq = self.sent_at.len() as u32;
        let pkt = net.make_packet(
            self.flow_id,
            local,
            self.remote,
            self.packet_size + UDP_OVERHEAD_BYTES,
            Transport::Udp(UdpPayload::EchoRequest { seq }),
        );
        let now = sim.now();
        info!(%now, bytes = self.packet_size, to = %self.remote.0, port = self.remote.1, "Sent {} bytes to {}", self.packet_size, self.remote.0);
        self.sent_at.push(now);
        net.send_from(node, pkt, sim);

        if self.sent_at.len() < self.max_packets as usize {
            sim.schedule_in(self.interval, AppTimer { app: id });
        }
    }

    pub(crate) fn on_datagram(&mut self, pkt: &Packet, payload: UdpPayload, sim: &mut Simulator) {
        let UdpPayload::EchoReply { seq } = payload else {
            return;
        };
        let now = sim.now();
        if let Some(sent) = self.sent_at.get(seq as usize) {
            self.rtts.push(now.saturating_sub(*sent));
        }
        info!(%now, bytes = pkt.size_bytes.saturating_sub(UDP_OVERHEAD_BYTES), from = %pkt.src, "Received {} bytes from {}", pkt.size_bytes.saturating_sub(UDP_OVERHEAD_BYTES), pkt.src);
    }
}
