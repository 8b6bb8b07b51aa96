//! Flow declarations
//!
//! A flow names its endpoints by node label and its timing in seconds, so a
//! workload can be written as JSON next to the city config.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScenarioError};
use crate::net::IpProtocol;
use crate::sim::SimTime;

/// Largest UDP payload that fits one IPv4 datagram.
pub const MAX_UDP_PAYLOAD: u32 = 65_507;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowKind {
    /// UDP echo: `max_packets` requests, one every `interval_s`.
    Echo {
        max_packets: u32,
        interval_s: f64,
        packet_size: u32,
    },
    /// UDP on/off source into a packet sink.
    OnOff {
        rate_bps: u64,
        packet_size: u32,
        on_time_s: f64,
        #[serde(default)]
        off_time_s: f64,
    },
    /// TCP bulk transfer into a packet sink; `max_bytes == 0` never ends.
    Bulk {
        #[serde(default)]
        max_bytes: u64,
        send_size: u32,
    },
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Echo { .. } => "echo",
            FlowKind::OnOff { .. } => "on_off",
            FlowKind::Bulk { .. } => "bulk",
        }
    }

    /// Protocol the server side binds.
    pub fn protocol(&self) -> IpProtocol {
        match self {
            FlowKind::Echo { .. } | FlowKind::OnOff { .. } => IpProtocol::Udp,
            FlowKind::Bulk { .. } => IpProtocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    /// Client node label.
    pub source: String,
    /// Server node label; traffic goes to its LAN address.
    pub destination: String,
    pub port: u16,
    pub traffic: FlowKind,
    pub sink_start_s: f64,
    pub client_start_s: f64,
    /// Defaults to the scenario horizon.
    #[serde(default)]
    pub stop_s: Option<f64>,
}

impl FlowSpec {
    fn invalid(&self, reason: impl Into<String>) -> ScenarioError {
        ScenarioError::InvalidFlow {
            flow: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Stop time with the horizon filled in.
    pub fn stop_or(&self, horizon_s: f64) -> f64 {
        self.stop_s.unwrap_or(horizon_s)
    }

    /// `0 <= sink_start < client_start < stop <= horizon` plus non-zero
    /// parameters.
    pub fn validate(&self, horizon_s: f64) -> Result<()> {
        if self.name.is_empty() {
            return Err(ScenarioError::EmptyElement("flow name".to_string()));
        }
        if self.source == self.destination {
            return Err(self.invalid("source and destination are the same node"));
        }
        if self.port == 0 {
            return Err(self.invalid("port must be non-zero"));
        }
        let stop = self.stop_or(horizon_s);
        for (what, t) in [
            ("sink_start_s", self.sink_start_s),
            ("client_start_s", self.client_start_s),
            ("stop_s", stop),
        ] {
            if !t.is_finite() || t < 0.0 {
                return Err(self.invalid(format!("{what} must be a non-negative number, got {t}")));
            }
        }
        // Ordering is checked on the clock values the scheduler will use.
        let sink_start = SimTime::from_secs_f64(self.sink_start_s);
        let client_start = SimTime::from_secs_f64(self.client_start_s);
        let stop_at = SimTime::from_secs_f64(stop);
        if sink_start >= client_start {
            return Err(self.invalid(format!(
                "sink must start before the client ({sink_start} >= {client_start})"
            )));
        }
        if client_start >= stop_at {
            return Err(self.invalid(format!(
                "client must start before the stop time ({client_start} >= {stop_at})"
            )));
        }
        if stop_at > SimTime::from_secs_f64(horizon_s) {
            return Err(self.invalid(format!("stop time {stop} is past the horizon {horizon_s}")));
        }

        match &self.traffic {
            FlowKind::Echo {
                max_packets,
                interval_s,
                packet_size,
            } => {
                if *max_packets == 0 {
                    return Err(self.invalid("max_packets must be non-zero"));
                }
                if !interval_s.is_finite() || *interval_s <= 0.0 {
                    return Err(self.invalid("interval_s must be positive"));
                }
                check_udp_size(self, *packet_size)?;
            }
            FlowKind::OnOff {
                rate_bps,
                packet_size,
                on_time_s,
                off_time_s,
            } => {
                if *rate_bps == 0 {
                    return Err(self.invalid("rate_bps must be non-zero"));
                }
                check_udp_size(self, *packet_size)?;
                if u128::from(*packet_size) * 8 * 1_000_000_000 < u128::from(*rate_bps) {
                    return Err(self.invalid(format!(
                        "rate_bps {rate_bps} sends {packet_size}-byte packets less than 1 ns apart"
                    )));
                }
                if !on_time_s.is_finite() || *on_time_s <= 0.0 {
                    return Err(self.invalid("on_time_s must be positive"));
                }
                if !off_time_s.is_finite() || *off_time_s < 0.0 {
                    return Err(self.invalid("off_time_s must not be negative"));
                }
            }
            FlowKind::Bulk { send_size, .. } => {
                if *send_size == 0 {
                    return Err(self.invalid("send_size must be non-zero"));
                }
            }
        }
        Ok(())
    }
}

fn check_udp_size(flow: &FlowSpec, size: u32) -> Result<()> {
    if size == 0 || size > MAX_UDP_PAYLOAD {
        return Err(flow.invalid(format!("packet_size must be in 1..={MAX_UDP_PAYLOAD}, got {size}")));
    }
    Ok(())
}

/// Flow names are unique, and two servers never hold the same
/// `(node, protocol, port)` at overlapping times.
pub fn validate_flows(flows: &[FlowSpec], horizon_s: f64) -> Result<()> {
    for (i, f) in flows.iter().enumerate() {
        f.validate(horizon_s)?;
        for g in &flows[..i] {
            if g.name == f.name {
                return Err(f.invalid("duplicate flow name"));
            }
            let same_socket = g.destination == f.destination
                && g.port == f.port
                && g.traffic.protocol() == f.traffic.protocol();
            let at = SimTime::from_secs_f64;
            let overlap = at(f.sink_start_s) < at(g.stop_or(horizon_s))
                && at(g.sink_start_s) < at(f.stop_or(horizon_s));
            if same_socket && overlap {
                return Err(f.invalid(format!(
                    "port {} on {} is already served by flow `{}`",
                    f.port, f.destination, g.name
                )));
            }
        }
    }
    Ok(())
}
