use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::net::{DropReason, NodeRole};

/// 可视化事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VizEventKind {
    /// 仿真/拓扑元信息（作为 t=0 的第一条事件）
    Meta {
        nodes: Vec<VizNodeInfo>,
        links: Vec<VizLinkInfo>,
    },
    /// packet 开始在链路上发送
    TxStart {
        link: usize,
        from: usize,
        to: usize,
        depart_ns: u64,
        arrive_ns: u64,
    },
    /// packet 经基站中继穿过空口
    RadioRelay {
        from: usize,
        to: usize,
        base_station: Option<usize>,
    },
    /// packet 在某节点“到达事件”触发（DeliverPacket）
    ArriveNode { node: usize },
    /// packet 在目的节点被交给上层
    Delivered { node: usize },
    Drop { node: usize, reason: DropReason },
    AppStart {
        app: usize,
        node: usize,
        app_kind: String,
    },
    AppStop {
        app: usize,
        node: usize,
        app_kind: String,
    },
    /// TCP：发送数据段
    TcpSendData(VizTcp),
    /// TCP：发送 ACK
    TcpSendAck(VizTcp),
    /// TCP：收到 ACK（用于驱动 cwnd/继续发送）
    TcpRecvAck(VizTcp),
    /// TCP：RTO 超时触发重传
    TcpRto(VizTcp),
}

/// packet 的类别（便于可视化上色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizPacketKind {
    Data,
    Ack,
    /// Handshake segments.
    Control,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizNodeInfo {
    pub id: usize,
    pub label: String,
    pub role: NodeRole,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizLinkInfo {
    pub id: usize,
    pub name: String,
    pub kind: String,
    pub nodes: Vec<usize>,
    pub bandwidth_bps: u64,
    /// 单向传播时延（ns）
    pub latency_ns: u64,
    pub subnet: Option<String>,
}

/// 与 TCP 有关的字段（用于展示 seq/ack 等）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VizTcp {
    pub conn_id: u64,
    pub seq: Option<u64>,
    pub len: Option<u32>,
    pub ack: Option<u64>,
    /// 是否为重传（RTO/快速重传触发的 resend）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrans: Option<bool>,
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    pub pkt_id: Option<u64>,
    pub flow_id: Option<u64>,
    pub pkt_bytes: Option<u32>,
    pub pkt_kind: Option<VizPacketKind>,
    #[serde(flatten)]
    pub kind: VizEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct VizLogger {
    pub events: Vec<VizEvent>,
}

impl VizLogger {
    pub fn push(&mut self, ev: VizEvent) {
        self.events.push(ev);
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, &self.events)?;
        Ok(())
    }
}
