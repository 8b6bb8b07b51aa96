//! On/off UDP source
//!
//! While "on" the source emits `packet_size`-byte datagrams at `rate_bps`;
//! it then stays silent for `off_time`. With a zero off time it sends at a
//! constant rate until stopped.

use super::{AppId, AppTimer, Endpoint};
use crate::net::{Network, NodeId, Transport, UDP_OVERHEAD_BYTES, UdpPayload};
use crate::sim::{SimTime, Simulator};

#[derive(Debug, Clone)]
pub struct OnOffApp {
    pub remote: Endpoint,
    pub flow_id: u64,
    pub rate_bps: u64,
    pub packet_size: u32,
    pub on_time: SimTime,
    pub off_time: SimTime,
    local: Option<Endpoint>,
    on_until: SimTime,
    sent_pkts: u64,
    sent_bytes: u64,
    first_tx: Option<SimTime>,
    last_tx: Option<SimTime>,
}

impl OnOffApp {
    pub fn new(
        remote: Endpoint,
        flow_id: u64,
        rate_bps: u64,
        packet_size: u32,
        on_time: SimTime,
        off_time: SimTime,
    ) -> Self {
        Self {
            remote,
            flow_id,
            rate_bps,
            packet_size,
            on_time,
            off_time,
            local: None,
            on_until: SimTime::ZERO,
            sent_pkts: 0,
            sent_bytes: 0,
            first_tx: None,
            last_tx: None,
        }
    }

    /// Gap between packets while on, rounded up to whole nanoseconds and
    /// never zero.
    pub fn interval(&self) -> SimTime {
        let bits = u128::from(self.packet_size) * 8;
        let rate = u128::from(self.rate_bps.max(1));
        let ns = (bits * 1_000_000_000).div_ceil(rate).max(1);
        SimTime(u64::try_from(ns).unwrap_or(u64::MAX))
    }

    pub fn sent_pkts(&self) -> u64 {
        self.sent_pkts
    }

    /// Payload bytes sent.
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    pub fn first_tx(&self) -> Option<SimTime> {
        self.first_tx
    }

    pub fn last_tx(&self) -> Option<SimTime> {
        self.last_tx
    }

    pub(crate) fn start(&mut self, id: AppId, node: NodeId, local: Endpoint, sim: &mut Simulator, net: &mut Network) {
        self.local = Some(local);
        self.on_until = sim.now().saturating_add(self.on_time);
        self.on_timer(id, node, sim, net);
    }

    pub(crate) fn on_timer(&mut self, id: AppId, node: NodeId, sim: &mut Simulator, net: &mut Network) {
        let Some(local) = self.local else {
            return;
        };
        let now = sim.now();
        let pkt = net.make_packet(
            self.flow_id,
            local,
            self.remote,
            self.packet_size + UDP_OVERHEAD_BYTES,
            Transport::Udp(UdpPayload::Data { seq: self.sent_pkts }),
        );
        self.sent_pkts += 1;
        self.sent_bytes += u64::from(self.packet_size);
        self.first_tx.get_or_insert(now);
        self.last_tx = Some(now);
        net.send_from(node, pkt, sim);

        let mut next = now.saturating_add(self.interval());
        if next >= self.on_until {
            // The on period ends before the next packet: resume after the off
            // period.
            next = next.max(self.on_until.saturating_add(self.off_time));
            self.on_until = next.saturating_add(self.on_time);
        }
        sim.schedule(next, AppTimer { app: id });
    }
}
