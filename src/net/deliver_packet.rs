//! 数据包交付事件
//!
//! 定义网络模拟中的数据包交付事件。

use super::id::{LinkId, NodeId};
use super::net_world::with_network;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：把一个 packet 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    /// Link the packet arrived over; `None` for locally looped packets.
    pub via: Option<LinkId>,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    #[tracing::instrument(skip(self, sim, world), fields(pkt_id = self.pkt.id, flow_id = self.pkt.flow_id, to = %self.to))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, via, pkt } = *self;
        trace!(
            dst = %pkt.dst,
            hops_taken = pkt.hops_taken,
            now = ?sim.now(),
            "📨 数据包到达节点"
        );
        with_network(world, |net| net.deliver(to, via, pkt, sim));
    }
}
