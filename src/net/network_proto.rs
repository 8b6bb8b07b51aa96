//! Protocol dispatch hooks for the network.

use crate::sim::Simulator;
use tracing::trace;

use super::net_world::{with_apps, with_tcp_stack};
use super::stats::DropReason;
use super::{Network, NodeId, Packet, Transport};

impl Network {
    /// 数据包送达目的地时的处理
    ///
    /// Hands the packet to the transport layer first; a packet nobody is
    /// listening for is dropped rather than counted as delivered.
    pub(crate) fn on_delivered(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        let handled = match pkt.transport {
            Transport::Udp(_) => with_apps(self, |net, apps| apps.on_udp(at, &pkt, sim, net)),
            // 传输层处理（TCP：目的端产生 ACK、源端处理 ACK 驱动继续发送）
            Transport::Tcp { .. } => with_tcp_stack(self, |net, tcp, apps| {
                tcp.on_segment(at, &pkt, sim, net, apps)
            }),
        };
        if !handled {
            self.drop_packet(at, pkt, DropReason::NoListener, sim.now());
            return;
        }

        let now = sim.now();
        self.viz_delivered(now, &pkt, at);
        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += u64::from(pkt.size_bytes);
        if let Some(fm) = &mut self.flow_monitor {
            fm.record_rx(at, &pkt, now);
        }
        trace!(
            pkt_id = pkt.id,
            delivered_pkts = self.stats.delivered_pkts,
            "✅ 数据包送达目的地"
        );
    }
}
