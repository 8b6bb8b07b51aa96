//! 拓扑构建模块
//!
//! Construction stages for the city internetwork, leaf first: link fabric,
//! address plan, radio bridge, route reconciliation. `pipeline` strings them
//! together in the only order that type-checks; `city` is the concrete
//! four-district layout.

pub mod address_plan;
pub mod city;
pub mod fabric;
pub mod pipeline;
pub mod radio;
pub mod reconcile;
pub mod topology;
pub mod trace;

pub use address_plan::{AddressPlan, AddressPolicy, CategoryRange, allocate};
pub use city::{CityNodes, build_city, city_fabric, city_scenario, default_flows};
pub use fabric::{FabricSpec, SegmentSpec, TrunkSpec, build_fabric};
pub use pipeline::{
    AddressedTopology, BridgedTopology, BuiltTopology, ReconciledTopology, RoutedTopology,
};
pub use radio::{
    AirProfile, CarrierConfig, EpcRadioCore, RadioAccess, RadioAttachment, RadioCell, RadioSpec,
};
pub use reconcile::{inject_static_routes, populate_global_routes};
pub use topology::{AnimationNode, Topology};
pub use trace::{SetupStep, SetupTrace};
