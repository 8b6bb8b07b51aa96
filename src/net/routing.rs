//! 路由表
//!
//! Per-node IPv4 forwarding tables with longest-prefix match, plus the
//! breadth-first hop counting used by global route population.
//!
//! Routes are never removed or rewritten: setup installs them once and the
//! runtime only reads them.

use serde::Serialize;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

use super::addr::Ipv4Subnet;
use super::id::{IfIndex, LinkId, NodeId};

/// Who installed a route. Also the tie-break order between equally specific
/// routes (earlier variants win).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOrigin {
    /// On-link subnet of an addressed interface.
    Connected,
    /// Explicit entry injected during route reconciliation.
    Static,
    /// Installed by the radio core for its own address realm.
    Radio,
    /// Computed by global route population.
    Global,
}

/// One forwarding entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: Ipv4Subnet,
    /// `None` means the destination is on-link.
    pub next_hop: Option<Ipv4Addr>,
    pub interface: IfIndex,
    pub origin: RouteOrigin,
}

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub(crate) fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn has_prefix(&self, destination: &Ipv4Subnet) -> bool {
        self.routes.iter().any(|r| r.destination == *destination)
    }

    /// Entries for exactly `destination`.
    pub fn routes_to(&self, destination: Ipv4Subnet) -> impl Iterator<Item = &Route> + '_ {
        self.routes
            .iter()
            .filter(move |r| r.destination == destination)
    }

    /// Longest-prefix match; ties go to the preferred origin, then to the
    /// earliest installed entry.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&Route> {
        let mut best: Option<&Route> = None;
        for r in self.routes.iter().filter(|r| r.destination.contains(dst)) {
            best = match best {
                None => Some(r),
                Some(b) => {
                    let better = r.destination.prefix_len() > b.destination.prefix_len()
                        || (r.destination.prefix_len() == b.destination.prefix_len()
                            && r.origin < b.origin);
                    if better { Some(r) } else { Some(b) }
                }
            };
        }
        best
    }
}

/// An edge of the wired adjacency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub neighbor: NodeId,
    pub link: LinkId,
    /// Our interface on the shared link.
    pub local_if: IfIndex,
    /// The neighbor's address on the shared link.
    pub neighbor_addr: Ipv4Addr,
}

/// Hop distance from the nearest of `origins` to every node (multi-source
/// BFS). `None` marks unreachable nodes.
pub fn hop_distances(adj: &[Vec<Adjacency>], origins: &[NodeId]) -> Vec<Option<u32>> {
    let mut dist: Vec<Option<u32>> = vec![None; adj.len()];
    let mut q: VecDeque<NodeId> = VecDeque::new();

    for &o in origins {
        if o.0 < adj.len() && dist[o.0].is_none() {
            dist[o.0] = Some(0);
            q.push_back(o);
        }
    }

    while let Some(v) = q.pop_front() {
        let Some(dv) = dist[v.0] else {
            continue;
        };
        for a in &adj[v.0] {
            if dist[a.neighbor.0].is_none() {
                dist[a.neighbor.0] = Some(dv.saturating_add(1));
                q.push_back(a.neighbor);
            }
        }
    }
    dist
}

/// The neighbor one hop closer to the origins, lowest node id on ties.
pub fn next_hop_towards<'a>(
    adj: &'a [Vec<Adjacency>],
    dist: &[Option<u32>],
    from: NodeId,
) -> Option<&'a Adjacency> {
    let df = dist.get(from.0).copied().flatten()?;
    if df == 0 {
        return None;
    }
    adj[from.0]
        .iter()
        .filter(|a| dist[a.neighbor.0] == Some(df - 1))
        .min_by_key(|a| (a.neighbor, a.link))
}
