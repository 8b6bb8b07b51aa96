//! 节点类型
//!
//! A node is a plain record: identity, role, placement and an ordered list of
//! interfaces. A node can hold several address realms at once (a district
//! gateway that is also a cellular subscriber has both a LAN and a radio
//! address), so addresses live on interfaces, never on the node itself.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::addr::Ipv4Subnet;
use super::id::{IfIndex, LinkId, NodeId};

/// What a node does in the city topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Host,
    Gateway,
    BaseStation,
    Anchor,
    CoreRouter,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Host => "host",
            NodeRole::Gateway => "gateway",
            NodeRole::BaseStation => "base station",
            NodeRole::Anchor => "anchor",
            NodeRole::CoreRouter => "core router",
        }
    }
}

/// Address realm of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    /// Broadcast segment (district LAN).
    Lan,
    /// Point-to-point trunk.
    Trunk,
    /// Cellular access, addressed from the radio core's pool.
    Radio,
}

/// Placement used for attachment distance and the animation trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub height: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, height: 0.0 }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.height - other.height;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Nodes never move in this scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mobility {
    #[default]
    Fixed,
}

/// One network interface of a node.
#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    pub index: IfIndex,
    pub realm: Realm,
    pub link: LinkId,
    pub address: Option<Ipv4Addr>,
    pub subnet: Option<Ipv4Subnet>,
}

/// 网络节点
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    label: String,
    role: NodeRole,
    position: Option<Position>,
    mobility: Mobility,
    subscriber: bool,
    interfaces: Vec<Interface>,
}

impl Node {
    pub fn new(id: NodeId, label: impl Into<String>, role: NodeRole) -> Self {
        Self {
            id,
            label: label.into(),
            role,
            position: None,
            mobility: Mobility::Fixed,
            subscriber: false,
            interfaces: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn mobility(&self) -> Mobility {
        self.mobility
    }

    /// True once the radio bridge gave this node a subscriber identity.
    pub fn is_subscriber(&self) -> bool {
        self.subscriber
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: IfIndex) -> Option<&Interface> {
        self.interfaces.get(index.0)
    }

    /// The interface attaching this node to `link`.
    pub fn interface_on(&self, link: LinkId) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.link == link)
    }

    /// First assigned address in `realm`.
    pub fn address_in(&self, realm: Realm) -> Option<Ipv4Addr> {
        self.interfaces
            .iter()
            .filter(|i| i.realm == realm)
            .find_map(|i| i.address)
    }

    /// The segment-facing (host) address.
    pub fn lan_address(&self) -> Option<Ipv4Addr> {
        self.address_in(Realm::Lan)
    }

    /// Source address for locally originated traffic: LAN first, then any.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.lan_address()
            .or_else(|| self.interfaces.iter().find_map(|i| i.address))
    }

    pub fn owns(&self, addr: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.address == Some(addr))
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub(crate) fn mark_subscriber(&mut self) {
        self.subscriber = true;
    }

    pub(crate) fn add_interface(&mut self, realm: Realm, link: LinkId) -> IfIndex {
        let index = IfIndex(self.interfaces.len());
        self.interfaces.push(Interface {
            index,
            realm,
            link,
            address: None,
            subnet: None,
        });
        index
    }

    pub(crate) fn assign(&mut self, index: IfIndex, address: Ipv4Addr, subnet: Ipv4Subnet) {
        if let Some(iface) = self.interfaces.get_mut(index.0) {
            iface.address = Some(address);
            iface.subnet = Some(subnet);
        }
    }
}
