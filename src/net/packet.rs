//! 数据包类型
//!
//! 定义网络数据包及其相关操作。

use std::net::Ipv4Addr;

use super::transport::{IpProtocol, Transport};
use crate::sim::SimTime;

/// Initial time-to-live of originated packets.
pub const DEFAULT_TTL: u8 = 64;

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    /// Scenario flow the packet belongs to (0 when untagged).
    pub flow_id: u64,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Size on the wire, IP header included.
    pub size_bytes: u32,
    pub ttl: u8,
    pub transport: Transport,
    /// When the packet left its source (stamped by the network).
    pub sent_at: SimTime,
    pub hops_taken: u32,
}

impl Packet {
    pub fn protocol(&self) -> IpProtocol {
        self.transport.protocol()
    }

    /// 前进到下一跳。Returns false (leaving the packet untouched) once the
    /// TTL is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.ttl <= 1 {
            return false;
        }
        self.ttl -= 1;
        self.hops_taken += 1;
        true
    }
}
