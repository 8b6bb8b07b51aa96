mod address_plan;
mod measurement;
mod radio;
mod reconcile;
mod scenario;
mod simulator;
mod tcp;

use crate::config::CityConfig;
use crate::topo::{EpcRadioCore, RoutedTopology, build_city};

/// The reference city, routed.
fn city() -> RoutedTopology {
    build_city(&CityConfig::default(), &mut EpcRadioCore::default()).expect("build city")
}
