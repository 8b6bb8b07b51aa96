//! 网络世界实现
//!
//! 定义网络仿真的世界（World）实现，持有网络运行时。

use super::network::Network;
use crate::proto::Applications;
use crate::proto::tcp::TcpStack;
use crate::sim::{Simulator, World};
use std::any::Any;
use tracing::{error, info};

/// 网络世界：持有 Network。
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self { net }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_teardown(&mut self, sim: &Simulator) {
        self.net.apps.stop_all();
        self.net.finish();
        info!(
            now = %sim.now(),
            delivered = self.net.stats.delivered_pkts,
            dropped = self.net.stats.total_dropped(),
            "📊 网络拆除"
        );
    }
}

/// Run `f` against the network held by `world`.
pub(crate) fn with_network<F, R>(world: &mut dyn World, f: F) -> Option<R>
where
    F: FnOnce(&mut Network) -> R,
{
    let Some(w) = world.as_any_mut().downcast_mut::<NetWorld>() else {
        error!("world must be NetWorld");
        return None;
    };
    Some(f(&mut w.net))
}

/// Run `f` with the application table taken out of the network, so both can
/// be borrowed mutably.
pub(crate) fn with_apps<F, R>(net: &mut Network, f: F) -> R
where
    F: FnOnce(&mut Network, &mut Applications) -> R,
{
    let mut apps = std::mem::take(&mut net.apps);
    let result = f(net, &mut apps);
    net.apps = apps;
    result
}

/// Run `f` with both the TCP stack and the application table taken out.
pub(crate) fn with_tcp_stack<F, R>(net: &mut Network, f: F) -> R
where
    F: FnOnce(&mut Network, &mut TcpStack, &mut Applications) -> R,
{
    let mut tcp = std::mem::take(&mut net.tcp);
    let mut apps = std::mem::take(&mut net.apps);
    let result = f(net, &mut tcp, &mut apps);
    net.tcp = tcp;
    net.apps = apps;
    result
}
