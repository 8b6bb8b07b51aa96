//! 路由协调
//!
//! Global population walks the wired graph only, so on its own it can never
//! see the subscriber pool behind the anchor. The core router first gets
//! static routes for the pool and for every subscriber's home LAN; population
//! then redistributes those static prefixes from the core like any on-link
//! subnet.

use std::net::Ipv4Addr;

use tracing::{debug, info};

use super::radio::{anchor_trunk, home_subnet};
use super::topology::Topology;
use super::trace::SetupStep;
use crate::error::{Result, ScenarioError};
use crate::net::{
    Adjacency, Ipv4Subnet, LinkKind, NodeId, NodeRole, Route, RouteOrigin, hop_distances,
    next_hop_towards,
};

/// Install the core router's static routes towards the radio side.
#[tracing::instrument(skip_all)]
pub fn inject_static_routes(topo: &mut Topology) -> Result<()> {
    let cell = topo
        .radio()
        .cloned()
        .ok_or(ScenarioError::MissingRole("radio cell"))?;
    let (trunk, core) = anchor_trunk(topo, cell.anchor)?;
    let link = topo
        .link(trunk)
        .ok_or(ScenarioError::MissingRole("anchor trunk"))?;

    let next_hop = topo
        .require_node(cell.anchor)?
        .interface_on(trunk)
        .and_then(|i| i.address)
        .ok_or(ScenarioError::MissingRole("anchor trunk address"))?;
    let interface = link
        .attached(core)
        .ok_or(ScenarioError::MissingRole("core trunk interface"))?;

    let mut destinations = vec![cell.pool];
    destinations.extend(cell.subscribers.iter().filter_map(|&s| home_subnet(topo, s)));

    for destination in destinations {
        topo.routing_table_mut(core)?.add(Route {
            destination,
            next_hop: Some(next_hop),
            interface,
            origin: RouteOrigin::Static,
        });
        debug!(node = %core, %destination, %next_hop, %interface, "📌 static route installed");
        topo.record(SetupStep::StaticRouteInstalled {
            node: core,
            destination,
            next_hop,
            interface,
        });
    }
    Ok(())
}

/// Wired adjacency: trunks join their two ends, segments are a full mesh.
fn wired_adjacency(topo: &Topology) -> Vec<Vec<Adjacency>> {
    let mut adj: Vec<Vec<Adjacency>> = vec![Vec::new(); topo.nodes().len()];
    for link in topo.links().iter().filter(|l| l.is_wired()) {
        for u in &link.attachments {
            for v in &link.attachments {
                if u.node == v.node {
                    continue;
                }
                let Some(neighbor_addr) = topo
                    .node(v.node)
                    .and_then(|n| n.interface(v.interface))
                    .and_then(|i| i.address)
                else {
                    continue;
                };
                adj[u.node.0].push(Adjacency {
                    neighbor: v.node,
                    link: link.id,
                    local_if: u.interface,
                    neighbor_addr,
                });
            }
        }
    }
    adj
}

/// Prefixes to distribute and the nodes they originate from, in a fixed
/// order: wired subnets by link, then static prefixes by owning node.
fn destinations(topo: &Topology) -> Vec<(Ipv4Subnet, Vec<NodeId>)> {
    let mut out: Vec<(Ipv4Subnet, Vec<NodeId>)> = Vec::new();
    let mut add = |prefix: Ipv4Subnet, origin: NodeId| {
        match out.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, origins)) => {
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
            None => out.push((prefix, vec![origin])),
        }
    };

    for link in topo.links().iter().filter(|l| l.is_wired()) {
        let Some(subnet) = link.subnet else {
            continue;
        };
        for a in &link.attachments {
            add(subnet, a.node);
        }
    }
    for node in topo.nodes() {
        let Some(table) = topo.routing_table(node.id()) else {
            continue;
        };
        for r in table.routes().iter().filter(|r| r.origin == RouteOrigin::Static) {
            add(r.destination, node.id());
        }
    }
    out
}

/// Compute `Global` routes over the wired graph. Existing entries for a
/// prefix are never touched. Returns the number of routes installed.
#[tracing::instrument(skip_all, fields(nodes = topo.nodes().len()))]
pub fn populate_global_routes(topo: &mut Topology) -> Result<usize> {
    let adj = wired_adjacency(topo);
    let mut pending: Vec<(NodeId, Route)> = Vec::new();

    for (prefix, origins) in destinations(topo) {
        let dist = hop_distances(&adj, &origins);
        for node in topo.nodes() {
            let id = node.id();
            let known = topo.routing_table(id).is_some_and(|t| t.has_prefix(&prefix));
            if known {
                continue;
            }
            let Some(hop) = next_hop_towards(&adj, &dist, id) else {
                continue;
            };
            pending.push((
                id,
                Route {
                    destination: prefix,
                    next_hop: Some(hop.neighbor_addr),
                    interface: hop.local_if,
                    origin: RouteOrigin::Global,
                },
            ));
        }
    }

    // Segment members leave through their gateway for anything else.
    for link in topo.links() {
        let LinkKind::Segment { gateway, members } = &link.kind else {
            continue;
        };
        let Some(gw_addr): Option<Ipv4Addr> = link
            .attached(*gateway)
            .and_then(|i| topo.node(*gateway).and_then(|n| n.interface(i)))
            .and_then(|i| i.address)
        else {
            continue;
        };
        for &m in members {
            let is_host = topo.node(m).is_some_and(|n| n.role() == NodeRole::Host);
            let has_default = topo
                .routing_table(m)
                .is_some_and(|t| t.has_prefix(&Ipv4Subnet::DEFAULT_ROUTE));
            let Some(interface) = link.attached(m) else {
                continue;
            };
            if is_host && !has_default {
                pending.push((
                    m,
                    Route {
                        destination: Ipv4Subnet::DEFAULT_ROUTE,
                        next_hop: Some(gw_addr),
                        interface,
                        origin: RouteOrigin::Global,
                    },
                ));
            }
        }
    }

    let installed = pending.len();
    for (node, route) in pending {
        topo.routing_table_mut(node)?.add(route);
    }
    topo.record(SetupStep::RoutesPopulated { installed });
    info!(installed, "✅ global routes populated");
    Ok(installed)
}
