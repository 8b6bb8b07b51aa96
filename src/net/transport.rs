//! Transport-layer tags carried by packets.
//!
//! `Packet` is a network-layer carrier; transport tags let the application
//! layer and the TCP stack run without the network knowing about them.

use serde::{Deserialize, Serialize};

/// TCP 连接标识
pub type TcpConnId = u64;

/// IPv4 + UDP header bytes.
pub const UDP_OVERHEAD_BYTES: u32 = 28;
/// IPv4 + TCP header bytes (no options).
pub const TCP_OVERHEAD_BYTES: u32 = 40;

/// IP protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpProtocol {
    Tcp,
    Udp,
}

impl IpProtocol {
    pub fn number(&self) -> u8 {
        match self {
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
        }
    }
}

/// Packet transport metadata.
#[derive(Debug, Clone)]
pub enum Transport {
    Udp(UdpPayload),
    Tcp { conn: TcpConnId, seg: TcpSegment },
}

impl Transport {
    pub fn protocol(&self) -> IpProtocol {
        match self {
            Transport::Udp(_) => IpProtocol::Udp,
            Transport::Tcp { .. } => IpProtocol::Tcp,
        }
    }
}

/// What a UDP datagram carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpPayload {
    EchoRequest { seq: u32 },
    EchoReply { seq: u32 },
    /// On/off source datagram.
    Data { seq: u64 },
}

/// TCP segment (minimal fields for simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpSegment {
    /// SYN
    Syn,
    /// SYN-ACK
    SynAck,
    /// Data segment: `seq` is byte sequence number, `len` is payload bytes.
    Data { seq: u64, len: u32 },
    /// ACK segment: `ack` is next expected byte (cumulative).
    Ack { ack: u64 },
}
