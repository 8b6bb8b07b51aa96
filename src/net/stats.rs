//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a packet left the network without reaching an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No routing entry matched the destination.
    NoRoute,
    /// The next hop address is not attached to the outgoing link.
    Unresolved,
    /// The outgoing channel's backlog was full.
    QueueFull,
    TtlExpired,
    /// Nothing bound to the destination port.
    NoListener,
}

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub originated_pkts: u64,
    pub forwarded_pkts: u64,
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    pub dropped: BTreeMap<DropReason, u64>,
}

impl Stats {
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub(crate) fn record_drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }
}
