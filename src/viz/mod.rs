//! 可视化事件记录（用于离线回放）
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **空间**：Meta 事件带节点坐标与标签，对应城市布局
//! - **可回放**：支持时间轴播放、单步、过滤（pkt/flow）

mod types;

pub use types::{
    VizEvent, VizEventKind, VizLinkInfo, VizLogger, VizNodeInfo, VizPacketKind, VizTcp,
};
