//! Scenario setup errors
//!
//! Every error here is raised before the virtual clock starts. None of them is
//! retried and no partially built topology survives one.

use thiserror::Error;

use crate::net::{Ipv4Subnet, NodeId};

/// Configuration, addressing and attachment failures.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown node label `{0}`")]
    UnknownLabel(String),

    #[error("node {label} ({node}) cannot act as {role}: {reason}")]
    IncompatibleRole {
        node: NodeId,
        label: String,
        role: &'static str,
        reason: String,
    },

    #[error("{0} must not be empty")]
    EmptyElement(String),

    #[error("address conflict: {a} overlaps {b}")]
    AddressConflict { a: Ipv4Subnet, b: Ipv4Subnet },

    #[error("address range {range} exhausted while allocating link `{link}`")]
    AddressExhausted { range: Ipv4Subnet, link: String },

    #[error("no address range configured for link `{0}`")]
    NoAddressRange(String),

    #[error("subscriber {subscriber} could not attach: {reason}")]
    AttachmentFailed { subscriber: String, reason: String },

    #[error("flow `{flow}`: {reason}")]
    InvalidFlow { flow: String, reason: String },

    #[error("topology has no {0}")]
    MissingRole(&'static str),

    #[error("capture: {0}")]
    Capture(#[from] pcap_file::PcapError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ScenarioError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ScenarioError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ScenarioError> = std::result::Result<T, E>;
