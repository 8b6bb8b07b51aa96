//! 流量场景模块
//!
//! Flow declarations and the scheduler that installs them on a routed
//! topology.

mod flow;
mod scheduler;

pub use flow::{FlowKind, FlowSpec, MAX_UDP_PAYLOAD, validate_flows};
pub use scheduler::{FlowReport, Scenario, ScheduledFlow, schedule_traffic};
