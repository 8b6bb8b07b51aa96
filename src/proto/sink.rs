//! Packet sink: counts whatever arrives on its port.

use crate::net::IpProtocol;
use crate::sim::SimTime;

#[derive(Debug, Clone)]
pub struct PacketSink {
    pub protocol: IpProtocol,
    pub port: u16,
    received_bytes: u64,
    received_packets: u64,
    first_rx: Option<SimTime>,
    last_rx: Option<SimTime>,
}

impl PacketSink {
    pub fn new(protocol: IpProtocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            received_bytes: 0,
            received_packets: 0,
            first_rx: None,
            last_rx: None,
        }
    }

    /// Application payload bytes received.
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Datagrams for UDP, in-order deliveries for TCP.
    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    pub fn first_rx(&self) -> Option<SimTime> {
        self.first_rx
    }

    pub fn last_rx(&self) -> Option<SimTime> {
        self.last_rx
    }

    /// Mean goodput between the first and last reception.
    pub fn goodput_bps(&self) -> f64 {
        match (self.first_rx, self.last_rx) {
            (Some(a), Some(b)) if b > a => self.received_bytes as f64 * 8.0 / b.saturating_sub(a).as_secs_f64(),
            _ => 0.0,
        }
    }

    pub(crate) fn on_receive(&mut self, bytes: u32, now: SimTime) {
        self.received_bytes += u64::from(bytes);
        self.received_packets += 1;
        self.first_rx.get_or_insert(now);
        self.last_rx = Some(now);
    }
}
