//! 城市拓扑
//!
//! Four districts around one core router: home, office, university and IoT.
//! Each district is a LAN behind its own gateway. The first `subscribers`
//! districts reach the core over the cellular bridge (their gateway becomes
//! a radio subscriber); the rest get a wired trunk to the core. The packet
//! gateway (anchor) always has its own trunk to the core.
//!
//! ```text
//!   H1 H2 ─ Home-UE ~~~ gNB ~~~ PGW ── CORE ── Office-GW ─ O1 O2
//!                                       │  \
//!                              IoT-GW ──┘   Uni-GW ─ U1 U2
//!                              I1 I2
//! ```

use tracing::info;

use super::address_plan::AddressPolicy;
use super::fabric::{FabricSpec, SegmentSpec, TrunkSpec};
use super::pipeline::{BuiltTopology, RoutedTopology};
use super::radio::{RadioAccess, RadioSpec};
use super::topology::Topology;
use crate::config::CityConfig;
use crate::error::Result;
use crate::net::{LinkCategory, NodeId, NodeRole, Position};
use crate::sim::{SimTime, Simulator};
use crate::traffic::{FlowKind, FlowSpec, Scenario, schedule_traffic};

/// Static description of one district.
#[derive(Debug, Clone, Copy)]
pub struct District {
    pub name: &'static str,
    /// Label stem of the gateway ("Home" → "Home-GW" / "Home-UE").
    pub title: &'static str,
    pub host_prefix: char,
    pub gateway_at: Position,
    /// Host `i` sits at `(host_x0 + 8 i, host_y)`.
    pub host_x0: f64,
    pub host_y: f64,
    /// Extra base stations are placed here.
    pub cell_site: Position,
}

pub const DISTRICTS: [District; 4] = [
    District {
        name: "home",
        title: "Home",
        host_prefix: 'H',
        gateway_at: Position { x: 10.0, y: 60.0, height: 0.0 },
        host_x0: 5.0,
        host_y: 70.0,
        cell_site: Position { x: 20.0, y: 55.0, height: 0.0 },
    },
    District {
        name: "office",
        title: "Office",
        host_prefix: 'O',
        gateway_at: Position { x: 90.0, y: 60.0, height: 0.0 },
        host_x0: 85.0,
        host_y: 70.0,
        cell_site: Position { x: 80.0, y: 55.0, height: 0.0 },
    },
    District {
        name: "uni",
        title: "Uni",
        host_prefix: 'U',
        gateway_at: Position { x: 90.0, y: 20.0, height: 0.0 },
        host_x0: 85.0,
        host_y: 10.0,
        cell_site: Position { x: 80.0, y: 25.0, height: 0.0 },
    },
    District {
        name: "iot",
        title: "IoT",
        host_prefix: 'I',
        gateway_at: Position { x: 10.0, y: 20.0, height: 0.0 },
        host_x0: 5.0,
        host_y: 10.0,
        cell_site: Position { x: 20.0, y: 25.0, height: 0.0 },
    },
];

pub const CORE_POSITION: Position = Position { x: 50.0, y: 40.0, height: 0.0 };
pub const ANCHOR_POSITION: Position = Position { x: 50.0, y: 50.0, height: 0.0 };
pub const FIRST_BASE_STATION: Position = Position { x: 40.0, y: 40.0, height: 0.0 };

/// Base station sites: the first next to the core, the others near the
/// districts in order.
pub fn base_station_sites(count: usize) -> Vec<Position> {
    (0..count)
        .map(|i| match i {
            0 => FIRST_BASE_STATION,
            i => DISTRICTS[(i - 1) % DISTRICTS.len()].cell_site,
        })
        .collect()
}

/// Nodes the city builder created, for callers that want ids rather than
/// labels.
#[derive(Debug, Clone)]
pub struct CityNodes {
    pub core: NodeId,
    pub anchor: NodeId,
    pub gateways: Vec<NodeId>,
    pub hosts: Vec<Vec<NodeId>>,
    pub subscribers: Vec<NodeId>,
}

/// Create the wired nodes and the fabric declaration for them.
pub fn city_fabric(cfg: &CityConfig) -> (Topology, FabricSpec, CityNodes) {
    let mut topo = Topology::new();
    let core = topo.add_node_at("CORE", NodeRole::CoreRouter, CORE_POSITION);
    let anchor = topo.add_node_at("PGW", NodeRole::Anchor, ANCHOR_POSITION);
    let mut nodes = CityNodes {
        core,
        anchor,
        gateways: Vec::with_capacity(DISTRICTS.len()),
        hosts: Vec::with_capacity(DISTRICTS.len()),
        subscribers: Vec::new(),
    };

    let lan_delay = SimTime::from_micros(cfg.lan_delay_us);
    let trunk_delay = SimTime::from_micros(cfg.trunk_delay_us);
    let mut spec = FabricSpec::default();

    for (k, d) in DISTRICTS.iter().enumerate() {
        let cellular = k < cfg.subscribers;
        let suffix = if cellular { "UE" } else { "GW" };
        let gateway = topo.add_node_at(format!("{}-{suffix}", d.title), NodeRole::Gateway, d.gateway_at);
        let hosts = (0..cfg.hosts_per_district)
            .map(|i| {
                let at = Position::new(d.host_x0 + 8.0 * i as f64, d.host_y);
                topo.add_node_at(format!("{}{}", d.host_prefix, i + 1), NodeRole::Host, at)
            })
            .collect::<Vec<_>>();

        spec.segments.push(SegmentSpec {
            name: format!("{}-lan", d.name),
            category: LinkCategory::DistrictLan(k as u8 + 1),
            gateway,
            members: hosts.clone(),
            bandwidth_bps: cfg.lan_rate_bps,
            delay: lan_delay,
        });
        if cellular {
            nodes.subscribers.push(gateway);
        } else {
            spec.trunks.push(TrunkSpec {
                name: format!("{}-core", d.name),
                category: LinkCategory::CoreTrunk,
                a: gateway,
                b: core,
                bandwidth_bps: cfg.trunk_rate_bps,
                delay: trunk_delay,
            });
        }
        nodes.gateways.push(gateway);
        nodes.hosts.push(hosts);
    }

    spec.trunks.push(TrunkSpec {
        name: "pgw-core".to_string(),
        category: LinkCategory::AnchorTrunk,
        a: anchor,
        b: core,
        bandwidth_bps: cfg.trunk_rate_bps,
        delay: trunk_delay,
    });
    (topo, spec, nodes)
}

/// 构建城市拓扑：fabric → addresses → radio → static routes → global routes.
#[tracing::instrument(skip_all, fields(hosts = cfg.hosts_per_district, subscribers = cfg.subscribers, base_stations = cfg.base_stations))]
pub fn build_city(cfg: &CityConfig, radio: &mut dyn RadioAccess) -> Result<RoutedTopology> {
    cfg.validate()?;
    let (topo, fabric, nodes) = city_fabric(cfg);
    let policy = AddressPolicy::city(DISTRICTS.len() as u8, vec![radio.pool()])?;
    let radio_spec = RadioSpec {
        anchor: nodes.anchor,
        subscribers: nodes.subscribers.clone(),
        base_stations: base_station_sites(cfg.base_stations),
        carrier: cfg.carrier,
    };

    let routed = BuiltTopology::build(topo, &fabric)?
        .assign_addresses(&policy)?
        .bridge_radio(radio, &radio_spec)?
        .inject_routes()?
        .populate_routes()?;

    let topo = routed.topology();
    info!(
        nodes = topo.nodes().len(),
        links = topo.links().len(),
        "🏙️ city topology ready"
    );
    Ok(routed)
}

/// Build the city and schedule `cfg.flows` on it.
pub fn city_scenario(
    cfg: &CityConfig,
    radio: &mut dyn RadioAccess,
    sim: &mut Simulator,
) -> Result<Scenario> {
    let routed = build_city(cfg, radio)?;
    let mut scenario = schedule_traffic(routed, &cfg.flows, cfg.horizon(), sim)?;
    scenario.network_mut().set_queue_limit_bytes(cfg.queue_limit_bytes);
    Ok(scenario)
}

/// The city workload: an echo exchange home → university, a constant-rate
/// UDP stream IoT → home and a bulk TCP transfer office → university.
/// `stop_s` is left open so every flow runs to the horizon.
pub fn default_flows() -> Vec<FlowSpec> {
    vec![
        FlowSpec {
            name: "echo".to_string(),
            source: "H1".to_string(),
            destination: "U1".to_string(),
            port: 9,
            traffic: FlowKind::Echo {
                max_packets: 6,
                interval_s: 1.0,
                packet_size: 512,
            },
            sink_start_s: 1.0,
            client_start_s: 2.0,
            stop_s: None,
        },
        FlowSpec {
            name: "onoff".to_string(),
            source: "I1".to_string(),
            destination: "H2".to_string(),
            port: 4000,
            traffic: FlowKind::OnOff {
                rate_bps: 2_000_000,
                packet_size: 300,
                on_time_s: 1.0,
                off_time_s: 0.0,
            },
            sink_start_s: 1.0,
            client_start_s: 3.0,
            stop_s: None,
        },
        FlowSpec {
            name: "bulk".to_string(),
            source: "O1".to_string(),
            destination: "U2".to_string(),
            port: 5001,
            traffic: FlowKind::Bulk {
                max_bytes: 0,
                send_size: 1024,
            },
            sink_start_s: 1.0,
            client_start_s: 4.0,
            stop_s: None,
        },
    ]
}
