//! 链路构建
//!
//! Turns declarative segment and trunk specs into links plus interface records.
//! Links are created in declaration order (all segments, then all trunks).
//! Within a segment the gateway is attached first, then members in input
//! order, so a host's LAN interface is always `if0`.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::topology::Topology;
use super::trace::SetupStep;
use crate::error::{Result, ScenarioError};
use crate::net::{Attachment, Link, LinkCategory, LinkKind, NodeId, NodeRole, Realm};
use crate::sim::SimTime;

/// A broadcast segment: one gateway plus member hosts.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub name: String,
    pub category: LinkCategory,
    pub gateway: NodeId,
    pub members: Vec<NodeId>,
    pub bandwidth_bps: u64,
    pub delay: SimTime,
}

/// A point-to-point trunk.
#[derive(Debug, Clone)]
pub struct TrunkSpec {
    pub name: String,
    pub category: LinkCategory,
    pub a: NodeId,
    pub b: NodeId,
    pub bandwidth_bps: u64,
    pub delay: SimTime,
}

#[derive(Debug, Clone, Default)]
pub struct FabricSpec {
    pub segments: Vec<SegmentSpec>,
    pub trunks: Vec<TrunkSpec>,
}

fn incompatible(topo: &Topology, node: NodeId, role: &'static str, reason: String) -> ScenarioError {
    ScenarioError::IncompatibleRole {
        node,
        label: topo
            .node(node)
            .map(|n| n.label().to_string())
            .unwrap_or_default(),
        role,
        reason,
    }
}

fn check_bandwidth(name: &str, bandwidth_bps: u64) -> Result<()> {
    if bandwidth_bps == 0 {
        return Err(ScenarioError::invalid(
            "bandwidth_bps",
            format!("link `{name}` has zero bandwidth"),
        ));
    }
    Ok(())
}

impl FabricSpec {
    /// Reject every configuration error before anything is built.
    pub fn validate(&self, topo: &Topology) -> Result<()> {
        let mut segment_of: HashMap<NodeId, &str> = HashMap::new();

        for seg in &self.segments {
            check_bandwidth(&seg.name, seg.bandwidth_bps)?;
            if seg.members.is_empty() {
                return Err(ScenarioError::EmptyElement(format!(
                    "member list of segment `{}`",
                    seg.name
                )));
            }

            let gw = topo.require_node(seg.gateway)?;
            if matches!(gw.role(), NodeRole::Anchor | NodeRole::BaseStation) {
                return Err(incompatible(
                    topo,
                    seg.gateway,
                    "segment gateway",
                    format!("a {} cannot join a segment", gw.role().as_str()),
                ));
            }

            let mut seen = HashSet::new();
            for &m in &seg.members {
                let node = topo.require_node(m)?;
                if m == seg.gateway {
                    return Err(incompatible(
                        topo,
                        m,
                        "segment member",
                        format!("already the gateway of `{}`", seg.name),
                    ));
                }
                if !seen.insert(m) {
                    return Err(ScenarioError::invalid(
                        "members",
                        format!("{} listed twice on segment `{}`", node.label(), seg.name),
                    ));
                }
                if matches!(node.role(), NodeRole::Anchor | NodeRole::BaseStation) {
                    return Err(incompatible(
                        topo,
                        m,
                        "segment member",
                        format!("a {} cannot join a segment", node.role().as_str()),
                    ));
                }
            }

            for n in std::iter::once(seg.gateway).chain(seg.members.iter().copied()) {
                if let Some(other) = segment_of.insert(n, &seg.name) {
                    return Err(incompatible(
                        topo,
                        n,
                        "segment member",
                        format!("already attached to segment `{other}`"),
                    ));
                }
            }
        }

        for trunk in &self.trunks {
            check_bandwidth(&trunk.name, trunk.bandwidth_bps)?;
            for end in [trunk.a, trunk.b] {
                let node = topo.require_node(end)?;
                if matches!(node.role(), NodeRole::Host | NodeRole::BaseStation) {
                    return Err(incompatible(
                        topo,
                        end,
                        "trunk endpoint",
                        format!("a {} cannot terminate a trunk", node.role().as_str()),
                    ));
                }
            }
            if trunk.a == trunk.b {
                return Err(incompatible(
                    topo,
                    trunk.a,
                    "trunk endpoint",
                    format!("trunk `{}` connects a node to itself", trunk.name),
                ));
            }
        }
        Ok(())
    }
}

/// Create every link and interface in `spec`.
#[tracing::instrument(skip_all, fields(segments = spec.segments.len(), trunks = spec.trunks.len()))]
pub fn build_fabric(topo: &mut Topology, spec: &FabricSpec) -> Result<()> {
    spec.validate(topo)?;

    for seg in &spec.segments {
        let id = topo.next_link_id();
        let mut link = Link::new(
            id,
            seg.name.clone(),
            seg.category,
            LinkKind::Segment {
                gateway: seg.gateway,
                members: seg.members.clone(),
            },
            seg.bandwidth_bps,
            seg.delay,
        );
        for n in std::iter::once(seg.gateway).chain(seg.members.iter().copied()) {
            let interface = topo.node_mut(n)?.add_interface(Realm::Lan, id);
            link.attachments.push(Attachment { node: n, interface });
        }
        debug!(link = %id, name = %seg.name, devices = link.attachments.len(), "🔗 segment built");
        finish_link(topo, link);
    }

    for trunk in &spec.trunks {
        let id = topo.next_link_id();
        let mut link = Link::new(
            id,
            trunk.name.clone(),
            trunk.category,
            LinkKind::Trunk {
                a: trunk.a,
                b: trunk.b,
            },
            trunk.bandwidth_bps,
            trunk.delay,
        );
        for n in [trunk.a, trunk.b] {
            let interface = topo.node_mut(n)?.add_interface(Realm::Trunk, id);
            link.attachments.push(Attachment { node: n, interface });
        }
        debug!(link = %id, name = %trunk.name, "🔗 trunk built");
        finish_link(topo, link);
    }

    info!(links = topo.links().len(), "✅ link fabric built");
    Ok(())
}

fn finish_link(topo: &mut Topology, link: Link) {
    let step = SetupStep::LinkBuilt {
        link: link.id,
        name: link.name.clone(),
        kind: link.kind.as_str(),
        nodes: link.attachments.iter().map(|a| a.node).collect(),
    };
    topo.push_link(link);
    topo.record(step);
}
