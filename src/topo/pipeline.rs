//! 构建流水线
//!
//! Each construction stage consumes the previous stage's value, so the only
//! way to reach a routed topology is build → address → bridge → inject →
//! populate. In particular, global population cannot run before the static
//! routes towards the radio side exist.

use super::address_plan::{AddressPolicy, allocate};
use super::fabric::{FabricSpec, build_fabric};
use super::radio::{RadioAccess, RadioSpec, bridge};
use super::reconcile::{inject_static_routes, populate_global_routes};
use super::topology::Topology;
use crate::error::Result;

/// Links and interfaces exist; nothing is addressed.
#[derive(Debug)]
pub struct BuiltTopology(Topology);

/// Every wired link has a subnet and connected routes.
#[derive(Debug)]
pub struct AddressedTopology(Topology);

/// Subscribers are attached and addressed from the radio pool.
#[derive(Debug)]
pub struct BridgedTopology(Topology);

/// The core router has static routes towards the radio side.
#[derive(Debug)]
pub struct ReconciledTopology(Topology);

/// Global routes are in place; ready for traffic.
#[derive(Debug)]
pub struct RoutedTopology(Topology);

impl BuiltTopology {
    pub fn build(mut topo: Topology, fabric: &FabricSpec) -> Result<Self> {
        build_fabric(&mut topo, fabric)?;
        Ok(Self(topo))
    }

    pub fn topology(&self) -> &Topology {
        &self.0
    }

    pub fn assign_addresses(self, policy: &AddressPolicy) -> Result<AddressedTopology> {
        let mut topo = self.0;
        allocate(&mut topo, policy)?;
        Ok(AddressedTopology(topo))
    }
}

impl AddressedTopology {
    pub fn topology(&self) -> &Topology {
        &self.0
    }

    pub fn bridge_radio(
        self,
        radio: &mut dyn RadioAccess,
        spec: &RadioSpec,
    ) -> Result<BridgedTopology> {
        let mut topo = self.0;
        bridge(&mut topo, radio, spec)?;
        Ok(BridgedTopology(topo))
    }
}

impl BridgedTopology {
    pub fn topology(&self) -> &Topology {
        &self.0
    }

    pub fn inject_routes(self) -> Result<ReconciledTopology> {
        let mut topo = self.0;
        inject_static_routes(&mut topo)?;
        Ok(ReconciledTopology(topo))
    }
}

impl ReconciledTopology {
    pub fn topology(&self) -> &Topology {
        &self.0
    }

    pub fn populate_routes(self) -> Result<RoutedTopology> {
        let mut topo = self.0;
        populate_global_routes(&mut topo)?;
        Ok(RoutedTopology(topo))
    }
}

impl RoutedTopology {
    pub fn topology(&self) -> &Topology {
        &self.0
    }

    pub(crate) fn topology_mut(&mut self) -> &mut Topology {
        &mut self.0
    }

    pub fn into_topology(self) -> Topology {
        self.0
    }
}
