//! 拓扑上下文
//!
//! `Topology` is the context object every construction stage threads through:
//! nodes, links, the address plan, per-node routing tables, the radio cell and
//! the setup trace. Stages mutate it; once the traffic scheduler hands it to
//! the runtime `Network` it is only read.

use serde::Serialize;
use std::net::Ipv4Addr;

use super::address_plan::AddressPlan;
use super::radio::RadioCell;
use super::trace::{SetupStep, SetupTrace};
use crate::error::{Result, ScenarioError};
use crate::net::{Link, LinkId, Node, NodeId, NodeRole, Position, RoutingTable};

/// A node as the animation trace sees it.
#[derive(Debug, Clone, Serialize)]
pub struct AnimationNode {
    pub id: NodeId,
    pub label: String,
    pub role: NodeRole,
    pub position: Option<Position>,
}

#[derive(Debug, Default, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    plan: AddressPlan,
    tables: Vec<RoutingTable>,
    radio: Option<RadioCell>,
    trace: SetupTrace,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点
    pub fn add_node(&mut self, label: impl Into<String>, role: NodeRole) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, label, role));
        self.tables.push(RoutingTable::default());
        id
    }

    /// Add a node placed at `position`.
    pub fn add_node_at(
        &mut self,
        label: impl Into<String>,
        role: NodeRole,
        position: Position,
    ) -> NodeId {
        let id = self.add_node(label, role);
        self.nodes[id.0].set_position(position);
        id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Like [`Topology::node`], failing with `UnknownNode`.
    pub fn require_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(ScenarioError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(ScenarioError::UnknownNode(id))
    }

    pub fn node_by_label(&self, label: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.label() == label).map(|n| n.id())
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(move |n| n.role() == role)
    }

    /// The node whose interface carries `addr`.
    pub fn owner_of(&self, addr: Ipv4Addr) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.owns(addr)).map(|n| n.id())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id.0)
    }

    pub fn link_by_name(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    pub(crate) fn next_link_id(&self) -> LinkId {
        LinkId(self.links.len())
    }

    pub(crate) fn push_link(&mut self, link: Link) -> LinkId {
        let id = link.id;
        self.links.push(link);
        id
    }

    pub fn plan(&self) -> &AddressPlan {
        &self.plan
    }

    pub(crate) fn plan_mut(&mut self) -> &mut AddressPlan {
        &mut self.plan
    }

    pub fn routing_table(&self, id: NodeId) -> Option<&RoutingTable> {
        self.tables.get(id.0)
    }

    pub(crate) fn routing_table_mut(&mut self, id: NodeId) -> Result<&mut RoutingTable> {
        self.tables.get_mut(id.0).ok_or(ScenarioError::UnknownNode(id))
    }

    pub fn radio(&self) -> Option<&RadioCell> {
        self.radio.as_ref()
    }

    pub(crate) fn set_radio(&mut self, cell: RadioCell) {
        self.radio = Some(cell);
    }

    pub fn trace(&self) -> &SetupTrace {
        &self.trace
    }

    pub(crate) fn record(&mut self, step: SetupStep) {
        self.trace.record(step);
    }

    /// Labels, roles and positions for the animation trace, in node order.
    pub fn animation_nodes(&self) -> Vec<AnimationNode> {
        self.nodes
            .iter()
            .map(|n| AnimationNode {
                id: n.id(),
                label: n.label().to_string(),
                role: n.role(),
                position: n.position(),
            })
            .collect()
    }
}
