//! Setup trace
//!
//! An ordered record of what each construction stage did. Tests use it to
//! check stage ordering; the binary can dump it as JSON.

use serde::Serialize;
use std::net::Ipv4Addr;

use crate::net::{IfIndex, Ipv4Subnet, LinkId, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SetupStep {
    LinkBuilt {
        link: LinkId,
        name: String,
        kind: &'static str,
        nodes: Vec<NodeId>,
    },
    SubnetAssigned {
        link: LinkId,
        name: String,
        subnet: Ipv4Subnet,
    },
    BaseStationInstalled {
        node: NodeId,
        label: String,
    },
    SubscriberAttached {
        subscriber: NodeId,
        base_station: NodeId,
        distance: f64,
    },
    SubscriberAddressed {
        subscriber: NodeId,
        address: Ipv4Addr,
    },
    StaticRouteInstalled {
        node: NodeId,
        destination: Ipv4Subnet,
        next_hop: Ipv4Addr,
        interface: IfIndex,
    },
    RoutesPopulated {
        installed: usize,
    },
    FlowScheduled {
        flow: String,
        sink_start_s: f64,
        client_start_s: f64,
        stop_s: f64,
    },
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct SetupTrace {
    steps: Vec<SetupStep>,
}

impl SetupTrace {
    pub(crate) fn record(&mut self, step: SetupStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[SetupStep] {
        &self.steps
    }

    /// Index of the first step matching `pred`.
    pub fn position(&self, pred: impl Fn(&SetupStep) -> bool) -> Option<usize> {
        self.steps.iter().position(pred)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
