//! 流量调度
//!
//! Turns flow declarations into installed applications and start/stop
//! events on a routed topology. Every name and address is resolved before
//! the clock starts; once scheduled, the topology is handed to the runtime.

use std::net::Ipv4Addr;

use serde::Serialize;
use tracing::info;

use super::flow::{FlowKind, FlowSpec, validate_flows};
use crate::error::{Result, ScenarioError};
use crate::net::{IpProtocol, NetWorld, Network, NodeId};
use crate::proto::onoff::OnOffApp;
use crate::proto::sink::PacketSink;
use crate::proto::tcp::BulkSend;
use crate::proto::udp_echo::{EchoClient, EchoServer};
use crate::proto::{App, AppId, AppStart, AppStop};
use crate::sim::{SimTime, Simulator};
use crate::topo::{RoutedTopology, SetupStep, Topology};

/// A flow after resolution.
#[derive(Debug, Clone)]
pub struct ScheduledFlow {
    pub name: String,
    pub flow_id: u64,
    pub traffic: FlowKind,
    pub source: NodeId,
    pub destination: NodeId,
    pub destination_addr: Ipv4Addr,
    pub port: u16,
    pub server: AppId,
    pub client: AppId,
    pub sink_start: SimTime,
    pub client_start: SimTime,
    pub stop: SimTime,
}

/// What one flow achieved, as printed by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub name: String,
    pub kind: &'static str,
    pub source: String,
    pub destination: String,
    pub sent_packets: u64,
    pub sent_bytes: u64,
    pub received_packets: u64,
    pub received_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_rtt_ms: Option<f64>,
}

/// A ready-to-run scenario: the world plus its schedule.
pub struct Scenario {
    world: NetWorld,
    flows: Vec<ScheduledFlow>,
    horizon: SimTime,
}

impl Scenario {
    pub fn network(&self) -> &Network {
        &self.world.net
    }

    /// For attaching measurement collaborators before the run.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.world.net
    }

    pub fn world_mut(&mut self) -> &mut NetWorld {
        &mut self.world
    }

    pub fn flows(&self) -> &[ScheduledFlow] {
        &self.flows
    }

    pub fn flow(&self, name: &str) -> Option<&ScheduledFlow> {
        self.flows.iter().find(|f| f.name == name)
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    /// Run to the horizon and tear down. Returns how many pending events the
    /// teardown discarded.
    pub fn run(&mut self, sim: &mut Simulator) -> usize {
        sim.run_until(self.horizon, &mut self.world);
        sim.teardown(&mut self.world)
    }

    pub fn report(&self) -> Vec<FlowReport> {
        let net = self.network();
        let apps = net.apps();
        let label = |id: NodeId| {
            net.topology()
                .node(id)
                .map(|n| n.label().to_string())
                .unwrap_or_default()
        };
        self.flows
            .iter()
            .map(|f| {
                let mut r = FlowReport {
                    name: f.name.clone(),
                    kind: f.traffic.as_str(),
                    source: label(f.source),
                    destination: label(f.destination),
                    sent_packets: 0,
                    sent_bytes: 0,
                    received_packets: 0,
                    received_bytes: 0,
                    mean_rtt_ms: None,
                };
                match apps.get(f.client) {
                    Some(App::EchoClient(c)) => {
                        r.sent_packets = c.sent() as u64;
                        r.sent_bytes = r.sent_packets * u64::from(c.packet_size);
                        r.received_packets = c.replies() as u64;
                        r.received_bytes = r.received_packets * u64::from(c.packet_size);
                        if !c.rtts().is_empty() {
                            let sum: f64 = c.rtts().iter().map(|t| t.as_secs_f64()).sum();
                            r.mean_rtt_ms = Some(sum * 1e3 / c.rtts().len() as f64);
                        }
                    }
                    Some(App::OnOff(o)) => {
                        r.sent_packets = o.sent_pkts();
                        r.sent_bytes = o.sent_bytes();
                    }
                    Some(App::Bulk(b)) => {
                        r.sent_bytes = b.bytes_acked(net.tcp());
                    }
                    _ => {}
                }
                if let Some(App::Sink(s)) = apps.get(f.server) {
                    r.received_packets = s.received_packets();
                    r.received_bytes = s.received_bytes();
                }
                r
            })
            .collect()
    }
}

fn resolve(topo: &Topology, label: &str) -> Result<NodeId> {
    topo.node_by_label(label)
        .ok_or_else(|| ScenarioError::UnknownLabel(label.to_string()))
}

/// 调度流量：validate, resolve, install apps and schedule start/stop events.
#[tracing::instrument(skip_all, fields(flows = flows.len(), horizon = %horizon))]
pub fn schedule_traffic(
    mut routed: RoutedTopology,
    flows: &[FlowSpec],
    horizon: SimTime,
    sim: &mut Simulator,
) -> Result<Scenario> {
    let horizon_s = horizon.as_secs_f64();
    validate_flows(flows, horizon_s)?;

    let mut resolved = Vec::with_capacity(flows.len());
    for f in flows {
        let topo = routed.topology();
        let source = resolve(topo, &f.source)?;
        let destination = resolve(topo, &f.destination)?;
        if topo.node(source).and_then(|n| n.primary_address()).is_none() {
            return Err(ScenarioError::InvalidFlow {
                flow: f.name.clone(),
                reason: format!("source {} has no address", f.source),
            });
        }
        let destination_addr = topo
            .node(destination)
            .and_then(|n| n.lan_address())
            .ok_or_else(|| ScenarioError::InvalidFlow {
                flow: f.name.clone(),
                reason: format!("destination {} has no LAN address", f.destination),
            })?;
        resolved.push((source, destination, destination_addr));
    }

    for f in flows {
        routed.topology_mut().record(SetupStep::FlowScheduled {
            flow: f.name.clone(),
            sink_start_s: f.sink_start_s,
            client_start_s: f.client_start_s,
            stop_s: f.stop_or(horizon_s),
        });
    }

    let mut net = Network::new(routed.into_topology());
    let mut scheduled = Vec::with_capacity(flows.len());
    for (i, (f, (source, destination, destination_addr))) in flows.iter().zip(resolved).enumerate() {
        let flow_id = i as u64 + 1;
        let remote = (destination_addr, f.port);
        let (server, client) = match &f.traffic {
            FlowKind::Echo {
                max_packets,
                interval_s,
                packet_size,
            } => (
                App::EchoServer(EchoServer::new(f.port, flow_id)),
                App::EchoClient(EchoClient::new(
                    remote,
                    flow_id,
                    *max_packets,
                    SimTime::from_secs_f64(*interval_s),
                    *packet_size,
                )),
            ),
            FlowKind::OnOff {
                rate_bps,
                packet_size,
                on_time_s,
                off_time_s,
            } => (
                App::Sink(PacketSink::new(IpProtocol::Udp, f.port)),
                App::OnOff(OnOffApp::new(
                    remote,
                    flow_id,
                    *rate_bps,
                    *packet_size,
                    SimTime::from_secs_f64(*on_time_s),
                    SimTime::from_secs_f64(*off_time_s),
                )),
            ),
            FlowKind::Bulk {
                max_bytes,
                send_size,
            } => (
                App::Sink(PacketSink::new(IpProtocol::Tcp, f.port)),
                App::Bulk(BulkSend::new(remote, flow_id, *max_bytes, *send_size)),
            ),
        };
        let server = net.apps_mut().install(destination, server);
        let client = net.apps_mut().install(source, client);

        let sink_start = SimTime::from_secs_f64(f.sink_start_s);
        let client_start = SimTime::from_secs_f64(f.client_start_s);
        let stop = SimTime::from_secs_f64(f.stop_or(horizon_s));
        sim.schedule(sink_start, AppStart { app: server });
        sim.schedule(client_start, AppStart { app: client });
        sim.schedule(stop, AppStop { app: client });
        sim.schedule(stop, AppStop { app: server });

        info!(
            flow = %f.name,
            kind = f.traffic.as_str(),
            src = %f.source,
            dst = %destination_addr,
            port = f.port,
            %sink_start,
            %client_start,
            %stop,
            "🗓️ flow scheduled"
        );
        scheduled.push(ScheduledFlow {
            name: f.name.clone(),
            flow_id,
            traffic: f.traffic.clone(),
            source,
            destination,
            destination_addr,
            port: f.port,
            server,
            client,
            sink_start,
            client_start,
            stop,
        });
    }

    Ok(Scenario {
        world: NetWorld::new(net),
        flows: scheduled,
        horizon,
    })
}
