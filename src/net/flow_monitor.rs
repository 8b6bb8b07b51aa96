//! 流量监控
//!
//! Per-flow counters keyed by the IPv4 5-tuple. Probes sit on every node with
//! at least one addressed interface; a packet is counted as sent where it is
//! originated and as received where it is delivered.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::Path;

use super::id::NodeId;
use super::packet::Packet;
use super::transport::IpProtocol;
use crate::error::Result;
use crate::sim::SimTime;
use crate::topo::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FiveTuple {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: IpProtocol,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    pub fn of(pkt: &Packet) -> Self {
        Self {
            src: pkt.src,
            dst: pkt.dst,
            protocol: pkt.protocol(),
            src_port: pkt.src_port,
            dst_port: pkt.dst_port,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FlowRecord {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub delay_sum_ns: u64,
    pub times_forwarded: u64,
    pub first_tx_ns: Option<u64>,
    pub last_tx_ns: Option<u64>,
    pub first_rx_ns: Option<u64>,
    pub last_rx_ns: Option<u64>,
}

impl FlowRecord {
    pub fn mean_delay(&self) -> Option<SimTime> {
        (self.rx_packets > 0).then(|| SimTime(self.delay_sum_ns / self.rx_packets))
    }

    /// Received goodput between first and last reception.
    pub fn rx_throughput_bps(&self) -> f64 {
        match (self.first_rx_ns, self.last_rx_ns) {
            (Some(a), Some(b)) if b > a => self.rx_bytes as f64 * 8.0 / ((b - a) as f64 / 1e9),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FlowEntry<'a> {
    flow_id: usize,
    #[serde(flatten)]
    tuple: &'a FiveTuple,
    #[serde(flatten)]
    record: &'a FlowRecord,
    mean_delay_s: Option<f64>,
    rx_throughput_bps: f64,
}

#[derive(Debug, Default, Clone)]
pub struct FlowMonitor {
    probes: BTreeSet<NodeId>,
    flows: BTreeMap<FiveTuple, FlowRecord>,
}

impl FlowMonitor {
    /// Probe every node that has an addressed interface.
    pub fn install_all(topo: &Topology) -> Self {
        let probes = topo
            .nodes()
            .iter()
            .filter(|n| n.interfaces().iter().any(|i| i.address.is_some()))
            .map(|n| n.id())
            .collect();
        Self {
            probes,
            flows: BTreeMap::new(),
        }
    }

    pub fn probes(&self) -> &BTreeSet<NodeId> {
        &self.probes
    }

    pub fn flows(&self) -> &BTreeMap<FiveTuple, FlowRecord> {
        &self.flows
    }

    pub fn flow(&self, tuple: &FiveTuple) -> Option<&FlowRecord> {
        self.flows.get(tuple)
    }

    pub(crate) fn record_tx(&mut self, at: NodeId, pkt: &Packet, now: SimTime) {
        if !self.probes.contains(&at) {
            return;
        }
        let r = self.flows.entry(FiveTuple::of(pkt)).or_default();
        r.tx_packets += 1;
        r.tx_bytes += u64::from(pkt.size_bytes);
        r.first_tx_ns.get_or_insert(now.0);
        r.last_tx_ns = Some(now.0);
    }

    pub(crate) fn record_rx(&mut self, at: NodeId, pkt: &Packet, now: SimTime) {
        if !self.probes.contains(&at) {
            return;
        }
        let r = self.flows.entry(FiveTuple::of(pkt)).or_default();
        r.rx_packets += 1;
        r.rx_bytes += u64::from(pkt.size_bytes);
        r.delay_sum_ns += now.saturating_sub(pkt.sent_at).0;
        r.times_forwarded += u64::from(pkt.hops_taken);
        r.first_rx_ns.get_or_insert(now.0);
        r.last_rx_ns = Some(now.0);
    }

    pub(crate) fn record_drop(&mut self, pkt: &Packet) {
        if let Some(r) = self.flows.get_mut(&FiveTuple::of(pkt)) {
            r.lost_packets += 1;
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries: Vec<FlowEntry<'_>> = self
            .flows
            .iter()
            .enumerate()
            .map(|(i, (tuple, record))| FlowEntry {
                flow_id: i + 1,
                tuple,
                record,
                mean_delay_s: record.mean_delay().map(SimTime::as_secs_f64),
                rx_throughput_bps: record.rx_throughput_bps(),
            })
            .collect();
        serde_json::to_string_pretty(&entries)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
