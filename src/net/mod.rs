//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件，如节点、链路、地址、路由、数据包和网络运行时。

// 子模块声明
mod addr;
mod capture;
mod deliver_packet;
mod flow_monitor;
mod id;
mod link;
mod net_world;
mod network;
mod network_proto;
mod network_viz;
mod node;
mod packet;
mod routing;
mod stats;
mod transport;

// 重新导出公共接口
pub use addr::Ipv4Subnet;
pub use capture::{CapturePoint, CaptureSet};
pub use deliver_packet::DeliverPacket;
pub use flow_monitor::{FiveTuple, FlowMonitor, FlowRecord};
pub use id::{IfIndex, LinkId, NodeId};
pub use link::{Attachment, Link, LinkCategory, LinkKind};
pub use net_world::NetWorld;
pub(crate) use net_world::{with_apps, with_network, with_tcp_stack};
pub use network::{DEFAULT_QUEUE_LIMIT_BYTES, Network};
pub use node::{Interface, Mobility, Node, NodeRole, Position, Realm};
pub use packet::{DEFAULT_TTL, Packet};
pub use routing::{Adjacency, Route, RouteOrigin, RoutingTable, hop_distances, next_hop_towards};
pub use stats::{DropReason, Stats};
pub use transport::{
    IpProtocol, TCP_OVERHEAD_BYTES, TcpConnId, TcpSegment, Transport, UDP_OVERHEAD_BYTES,
    UdpPayload,
};
