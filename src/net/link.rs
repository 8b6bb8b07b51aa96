//! 链路类型
//!
//! Three link shapes share one record: broadcast segments, point-to-point
//! trunks and the cellular access link. Segment and trunk addressing comes from
//! the wired address plan; the radio link is addressed by the radio core.

use serde::{Deserialize, Serialize};

use super::addr::Ipv4Subnet;
use super::id::{IfIndex, LinkId, NodeId};
use crate::sim::SimTime;

/// Address-plan category a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    /// District LAN number `k` (1-based).
    DistrictLan(u8),
    /// Gateway ↔ core router trunks.
    CoreTrunk,
    /// Radio anchor ↔ core router trunk.
    AnchorTrunk,
    /// Cellular access; never allocated from the wired plan.
    Radio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    Segment {
        gateway: NodeId,
        members: Vec<NodeId>,
    },
    Trunk {
        a: NodeId,
        b: NodeId,
    },
    Radio {
        anchor: NodeId,
        base_stations: Vec<NodeId>,
        subscribers: Vec<NodeId>,
    },
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Segment { .. } => "segment",
            LinkKind::Trunk { .. } => "trunk",
            LinkKind::Radio { .. } => "radio",
        }
    }
}

/// A device handle: one node's interface on one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub node: NodeId,
    pub interface: IfIndex,
}

/// 网络链路
#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub category: LinkCategory,
    pub kind: LinkKind,
    pub bandwidth_bps: u64,
    pub latency: SimTime,
    /// Extra one-way delay behind the radio hop (base station → anchor).
    pub backhaul_latency: SimTime,
    pub subnet: Option<Ipv4Subnet>,
    /// Devices in attachment order (gateway first for segments).
    pub attachments: Vec<Attachment>,
}

impl Link {
    pub fn new(
        id: LinkId,
        name: impl Into<String>,
        category: LinkCategory,
        kind: LinkKind,
        bandwidth_bps: u64,
        latency: SimTime,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            kind,
            bandwidth_bps,
            latency,
            backhaul_latency: SimTime::ZERO,
            subnet: None,
            attachments: Vec::new(),
        }
    }

    /// Wired links take part in global route population; the radio link is
    /// opaque to it.
    pub fn is_wired(&self) -> bool {
        !matches!(self.kind, LinkKind::Radio { .. })
    }

    pub fn attached(&self, node: NodeId) -> Option<IfIndex> {
        self.attachments
            .iter()
            .find(|a| a.node == node)
            .map(|a| a.interface)
    }

    /// Transmission channel used by a frame sent from `from`.
    ///
    /// Segments are half-duplex shared media (one channel); trunks and the
    /// radio link are full duplex (one channel per direction).
    pub(crate) fn channel_of(&self, from: NodeId) -> usize {
        match &self.kind {
            LinkKind::Segment { .. } => 0,
            LinkKind::Trunk { a, .. } => usize::from(*a != from),
            LinkKind::Radio { subscribers, .. } => usize::from(!subscribers.contains(&from)),
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: u32) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.bandwidth_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = u128::from(bytes).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128) + (self.bandwidth_bps as u128 - 1))
            / self.bandwidth_bps as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}
