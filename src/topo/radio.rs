//! 蜂窝接入桥接
//!
//! Bridges district gateways onto the wired core through a cellular access
//! network. The radio side is a collaborator behind [`RadioAccess`]: it owns
//! the subscriber pool, places base stations, picks attachments and hands out
//! subscriber addresses. The air interface itself is opaque; the runtime sees
//! one fixed-rate, fixed-delay link relayed through the attached base station.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use tracing::{debug, info};

use super::topology::Topology;
use super::trace::SetupStep;
use crate::error::{Result, ScenarioError};
use crate::net::{
    Attachment, IfIndex, Ipv4Subnet, Link, LinkCategory, LinkId, LinkKind, NodeId, NodeRole,
    Position, Realm, Route, RouteOrigin,
};
use crate::sim::SimTime;

/// Carrier settings. Passed through to the radio collaborator untouched; only
/// their ranges are checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    pub center_frequency_hz: f64,
    pub bandwidth_hz: f64,
    /// Subcarrier spacing is 15 kHz × 2^numerology.
    pub numerology: u8,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            center_frequency_hz: 3.5e9,
            bandwidth_hz: 20e6,
            numerology: 1,
        }
    }
}

impl CarrierConfig {
    pub fn validate(&self) -> Result<()> {
        if !(410e6..=52.6e9).contains(&self.center_frequency_hz) {
            return Err(ScenarioError::invalid(
                "center_frequency_hz",
                format!("{} Hz is outside 410 MHz..52.6 GHz", self.center_frequency_hz),
            ));
        }
        if !(self.bandwidth_hz > 0.0 && self.bandwidth_hz <= 400e6) {
            return Err(ScenarioError::invalid(
                "bandwidth_hz",
                format!("{} Hz is outside (0, 400 MHz]", self.bandwidth_hz),
            ));
        }
        if self.numerology > 4 {
            return Err(ScenarioError::invalid(
                "numerology",
                format!("{} is outside 0..=4", self.numerology),
            ));
        }
        Ok(())
    }

    pub fn subcarrier_spacing_hz(&self) -> f64 {
        15e3 * f64::from(1u32 << self.numerology)
    }
}

/// How the runtime models the air hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirProfile {
    pub rate_bps: u64,
    pub air_delay: SimTime,
    /// Base station ↔ anchor delay behind the air hop.
    pub backhaul_delay: SimTime,
}

/// What the composer asks of the radio bridge.
#[derive(Debug, Clone)]
pub struct RadioSpec {
    pub anchor: NodeId,
    pub subscribers: Vec<NodeId>,
    pub base_stations: Vec<Position>,
    pub carrier: CarrierConfig,
}

/// One subscriber's attachment decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadioAttachment {
    pub subscriber: NodeId,
    pub base_station: NodeId,
    pub distance: f64,
}

/// The bridged cell after composition.
#[derive(Debug, Clone, Serialize)]
pub struct RadioCell {
    pub link: LinkId,
    pub anchor: NodeId,
    pub base_stations: Vec<NodeId>,
    pub subscribers: Vec<NodeId>,
    pub attachments: Vec<RadioAttachment>,
    pub carrier: CarrierConfig,
    pub pool: Ipv4Subnet,
    pub gateway: Ipv4Addr,
}

impl RadioCell {
    pub fn attached_base_station(&self, subscriber: NodeId) -> Option<NodeId> {
        self.attachments
            .iter()
            .find(|a| a.subscriber == subscriber)
            .map(|a| a.base_station)
    }
}

/// Boundary of the radio collaborator.
pub trait RadioAccess {
    /// Subscriber address pool owned by the radio core.
    fn pool(&self) -> Ipv4Subnet;

    /// Pool address of the anchor; every subscriber's default next hop.
    fn gateway_address(&self) -> Ipv4Addr;

    fn air_profile(&self) -> AirProfile;

    /// Give the anchor its interface on the radio link.
    fn install_anchor(&mut self, topo: &mut Topology, anchor: NodeId, link: LinkId) -> Result<IfIndex>;

    /// Place base stations. Returns their ids in input order.
    fn install_base_stations(
        &mut self,
        topo: &mut Topology,
        positions: &[Position],
    ) -> Result<Vec<NodeId>>;

    /// Install subscriber devices on the radio link.
    fn install_subscribers(
        &mut self,
        topo: &mut Topology,
        subscribers: &[NodeId],
        link: LinkId,
    ) -> Result<Vec<IfIndex>>;

    /// Attach every subscriber to its nearest base station; ties go to the
    /// lowest index.
    fn attach_to_closest(
        &mut self,
        topo: &Topology,
        subscribers: &[NodeId],
        base_stations: &[NodeId],
    ) -> Result<Vec<RadioAttachment>> {
        let mut out = Vec::with_capacity(subscribers.len());
        for &sub in subscribers {
            let node = topo.require_node(sub)?;
            let fail = |reason: &str| ScenarioError::AttachmentFailed {
                subscriber: node.label().to_string(),
                reason: reason.to_string(),
            };
            if base_stations.is_empty() {
                return Err(fail("no base stations installed"));
            }
            let here = node.position().ok_or_else(|| fail("subscriber has no position"))?;

            let mut best: Option<RadioAttachment> = None;
            for &bs in base_stations {
                let Some(pos) = topo.require_node(bs)?.position() else {
                    continue;
                };
                let distance = here.distance(&pos);
                if best.is_none_or(|b| distance < b.distance) {
                    best = Some(RadioAttachment {
                        subscriber: sub,
                        base_station: bs,
                        distance,
                    });
                }
            }
            out.push(best.ok_or_else(|| fail("no base station has a position"))?);
        }
        Ok(out)
    }

    /// Hand out pool addresses and install the collaborator's own routes.
    fn assign_subscriber_addresses(
        &mut self,
        topo: &mut Topology,
        subscribers: &[NodeId],
        link: LinkId,
    ) -> Result<Vec<Ipv4Addr>>;
}

/// Default radio core: pool `7.0.0.0/8`, anchor at `7.0.0.1`, subscribers
/// numbered from `7.0.0.2`.
#[derive(Debug, Clone)]
pub struct EpcRadioCore {
    pool: Ipv4Subnet,
    next_host: u32,
    air: AirProfile,
}

impl Default for EpcRadioCore {
    fn default() -> Self {
        Self {
            pool: Ipv4Subnet::new(Ipv4Addr::new(7, 0, 0, 0), 8).unwrap_or(Ipv4Subnet::DEFAULT_ROUTE),
            next_host: 2,
            air: AirProfile {
                rate_bps: 100_000_000,
                air_delay: SimTime::from_millis(1),
                backhaul_delay: SimTime::from_micros(500),
            },
        }
    }
}

impl EpcRadioCore {
    pub fn new(pool: Ipv4Subnet, air: AirProfile) -> Self {
        Self {
            pool,
            next_host: 2,
            air,
        }
    }

    fn attach(topo: &mut Topology, link: LinkId, node: NodeId, interface: IfIndex) {
        if let Some(l) = topo.link_mut(link) {
            l.attachments.push(Attachment { node, interface });
        }
    }
}

impl RadioAccess for EpcRadioCore {
    fn pool(&self) -> Ipv4Subnet {
        self.pool
    }

    fn gateway_address(&self) -> Ipv4Addr {
        self.pool.host(1).unwrap_or(self.pool.network())
    }

    fn air_profile(&self) -> AirProfile {
        self.air
    }

    fn install_anchor(&mut self, topo: &mut Topology, anchor: NodeId, link: LinkId) -> Result<IfIndex> {
        let gw = self.gateway_address();
        let pool = self.pool;
        let node = topo.node_mut(anchor)?;
        let interface = node.add_interface(Realm::Radio, link);
        node.assign(interface, gw, pool);
        topo.routing_table_mut(anchor)?.add(Route {
            destination: pool,
            next_hop: None,
            interface,
            origin: RouteOrigin::Connected,
        });
        Self::attach(topo, link, anchor, interface);
        Ok(interface)
    }

    fn install_base_stations(
        &mut self,
        topo: &mut Topology,
        positions: &[Position],
    ) -> Result<Vec<NodeId>> {
        Ok(positions
            .iter()
            .enumerate()
            .map(|(i, pos)| {
                let label = if i == 0 {
                    "gNB".to_string()
                } else {
                    format!("gNB-{}", i + 1)
                };
                topo.add_node_at(label, NodeRole::BaseStation, *pos)
            })
            .collect())
    }

    fn install_subscribers(
        &mut self,
        topo: &mut Topology,
        subscribers: &[NodeId],
        link: LinkId,
    ) -> Result<Vec<IfIndex>> {
        let mut out = Vec::with_capacity(subscribers.len());
        for &sub in subscribers {
            let node = topo.node_mut(sub)?;
            node.mark_subscriber();
            let interface = node.add_interface(Realm::Radio, link);
            Self::attach(topo, link, sub, interface);
            out.push(interface);
        }
        Ok(out)
    }

    fn assign_subscriber_addresses(
        &mut self,
        topo: &mut Topology,
        subscribers: &[NodeId],
        link: LinkId,
    ) -> Result<Vec<Ipv4Addr>> {
        let gw = self.gateway_address();
        let mut out = Vec::with_capacity(subscribers.len());
        for &sub in subscribers {
            let address = self
                .pool
                .host(self.next_host)
                .ok_or(ScenarioError::AddressExhausted {
                    range: self.pool,
                    link: "radio".to_string(),
                })?;
            self.next_host += 1;

            let node = topo.node_mut(sub)?;
            let interface = node
                .interface_on(link)
                .map(|i| i.index)
                .ok_or_else(|| ScenarioError::AttachmentFailed {
                    subscriber: node.label().to_string(),
                    reason: "no radio device installed".to_string(),
                })?;
            node.assign(interface, address, self.pool);

            let table = topo.routing_table_mut(sub)?;
            table.add(Route {
                destination: self.pool,
                next_hop: None,
                interface,
                origin: RouteOrigin::Connected,
            });
            table.add(Route {
                destination: Ipv4Subnet::DEFAULT_ROUTE,
                next_hop: Some(gw),
                interface,
                origin: RouteOrigin::Radio,
            });
            out.push(address);
        }
        Ok(out)
    }
}

/// The segment a node is the gateway of.
fn home_segment(topo: &Topology, node: NodeId) -> Option<&Link> {
    topo.links()
        .iter()
        .find(|l| matches!(&l.kind, LinkKind::Segment { gateway, .. } if *gateway == node))
}

fn is_trunk_endpoint(topo: &Topology, node: NodeId) -> bool {
    topo.links()
        .iter()
        .any(|l| matches!(l.kind, LinkKind::Trunk { a, b } if a == node || b == node))
}

fn check_subscribers(topo: &Topology, subscribers: &[NodeId]) -> Result<()> {
    if subscribers.is_empty() {
        return Err(ScenarioError::EmptyElement("subscriber list".to_string()));
    }
    for (i, &sub) in subscribers.iter().enumerate() {
        let node = topo.require_node(sub)?;
        let incompatible = |reason: &str| ScenarioError::IncompatibleRole {
            node: sub,
            label: node.label().to_string(),
            role: "subscriber",
            reason: reason.to_string(),
        };
        if subscribers[..i].contains(&sub) {
            return Err(incompatible("listed twice"));
        }
        if home_segment(topo, sub).is_none() {
            return Err(incompatible("not the gateway of any segment"));
        }
        if is_trunk_endpoint(topo, sub) {
            return Err(incompatible("already terminates a wired trunk"));
        }
    }
    Ok(())
}

/// Core-side trunk address of the anchor trunk.
pub(crate) fn anchor_trunk(topo: &Topology, anchor: NodeId) -> Result<(LinkId, NodeId)> {
    topo.links()
        .iter()
        .filter(|l| l.category == LinkCategory::AnchorTrunk && l.subnet.is_some())
        .find_map(|l| match l.kind {
            LinkKind::Trunk { a, b } if a == anchor || b == anchor => {
                let other = if a == anchor { b } else { a };
                topo.node(other)
                    .filter(|n| n.role() == NodeRole::CoreRouter)
                    .map(|_| (l.id, other))
            }
            _ => None,
        })
        .ok_or(ScenarioError::MissingRole("addressed anchor trunk to the core router"))
}

/// Compose the radio bridge onto an addressed topology.
#[tracing::instrument(skip_all, fields(subscribers = spec.subscribers.len(), base_stations = spec.base_stations.len()))]
pub fn bridge(topo: &mut Topology, radio: &mut dyn RadioAccess, spec: &RadioSpec) -> Result<()> {
    spec.carrier.validate()?;

    let anchor = topo.require_node(spec.anchor)?;
    if anchor.role() != NodeRole::Anchor {
        return Err(ScenarioError::IncompatibleRole {
            node: spec.anchor,
            label: anchor.label().to_string(),
            role: "anchor",
            reason: format!("node is a {}", anchor.role().as_str()),
        });
    }
    anchor_trunk(topo, spec.anchor)?;

    let pool = radio.pool();
    for (_, s) in topo.plan().assignments() {
        if s.overlaps(&pool) {
            return Err(ScenarioError::AddressConflict { a: *s, b: pool });
        }
    }

    check_subscribers(topo, &spec.subscribers)?;
    if spec.base_stations.is_empty() {
        let label = topo
            .node(spec.subscribers[0])
            .map(|n| n.label().to_string())
            .unwrap_or_default();
        return Err(ScenarioError::AttachmentFailed {
            subscriber: label,
            reason: "no base stations configured".to_string(),
        });
    }

    let base_stations = radio.install_base_stations(topo, &spec.base_stations)?;
    for &bs in &base_stations {
        let label = topo.require_node(bs)?.label().to_string();
        debug!(node = %bs, %label, "📡 base station installed");
        topo.record(SetupStep::BaseStationInstalled { node: bs, label });
    }

    let air = radio.air_profile();
    let id = topo.next_link_id();
    let mut link = Link::new(
        id,
        "radio",
        LinkCategory::Radio,
        LinkKind::Radio {
            anchor: spec.anchor,
            base_stations: base_stations.clone(),
            subscribers: spec.subscribers.clone(),
        },
        air.rate_bps,
        air.air_delay,
    );
    link.backhaul_latency = air.backhaul_delay;
    link.subnet = Some(pool);
    topo.push_link(link);

    let anchor_if = radio.install_anchor(topo, spec.anchor, id)?;
    radio.install_subscribers(topo, &spec.subscribers, id)?;
    topo.record(SetupStep::LinkBuilt {
        link: id,
        name: "radio".to_string(),
        kind: "radio",
        nodes: topo
            .link(id)
            .map(|l| l.attachments.iter().map(|a| a.node).collect())
            .unwrap_or_default(),
    });

    let attachments = radio.attach_to_closest(topo, &spec.subscribers, &base_stations)?;
    for a in &attachments {
        debug!(subscriber = %a.subscriber, base_station = %a.base_station, distance = a.distance, "📶 subscriber attached");
        topo.record(SetupStep::SubscriberAttached {
            subscriber: a.subscriber,
            base_station: a.base_station,
            distance: a.distance,
        });
    }

    let addresses = radio.assign_subscriber_addresses(topo, &spec.subscribers, id)?;
    for (&sub, &address) in spec.subscribers.iter().zip(&addresses) {
        topo.record(SetupStep::SubscriberAddressed {
            subscriber: sub,
            address,
        });

        // Framed route: the subscriber's home LAN is reached through its
        // pool address.
        let Some(home) = home_segment(topo, sub).and_then(|l| l.subnet) else {
            continue;
        };
        topo.routing_table_mut(spec.anchor)?.add(Route {
            destination: home,
            next_hop: Some(address),
            interface: anchor_if,
            origin: RouteOrigin::Radio,
        });
    }

    topo.plan_mut().reserve(pool);
    topo.set_radio(RadioCell {
        link: id,
        anchor: spec.anchor,
        base_stations,
        subscribers: spec.subscribers.clone(),
        attachments,
        carrier: spec.carrier,
        pool,
        gateway: radio.gateway_address(),
    });
    info!(%pool, "✅ radio bridge composed");
    Ok(())
}

/// Home LAN subnet of a subscriber.
pub(crate) fn home_subnet(topo: &Topology, subscriber: NodeId) -> Option<Ipv4Subnet> {
    home_segment(topo, subscriber).and_then(|l| l.subnet)
}
