use std::net::Ipv4Addr;

use super::city;
use crate::config::CityConfig;
use crate::error::ScenarioError;
use crate::net::{NodeRole, Position, Realm, RouteOrigin};
use crate::topo::city::{base_station_sites, city_fabric};
use crate::topo::{
    AddressPolicy, BuiltTopology, CarrierConfig, EpcRadioCore, RadioAccess, RadioSpec, SetupStep,
    Topology, build_city,
};

fn bridged(cfg: &CityConfig, tweak: impl FnOnce(&mut RadioSpec, &Topology)) -> Result<Topology, ScenarioError> {
    let (topo, fabric, nodes) = city_fabric(cfg);
    let mut radio = EpcRadioCore::default();
    let policy = AddressPolicy::city(4, vec![radio.pool()])?;
    let addressed = BuiltTopology::build(topo, &fabric)?.assign_addresses(&policy)?;
    let mut spec = RadioSpec {
        anchor: nodes.anchor,
        subscribers: nodes.subscribers.clone(),
        base_stations: base_station_sites(cfg.base_stations),
        carrier: cfg.carrier,
    };
    tweak(&mut spec, addressed.topology());
    Ok(addressed.bridge_radio(&mut radio, &spec)?.topology().clone())
}

#[test]
fn home_gateway_is_dual_homed() {
    let routed = city();
    let topo = routed.topology();
    let ue = topo.node(topo.node_by_label("Home-UE").unwrap()).unwrap();

    assert!(ue.is_subscriber());
    assert_eq!(ue.address_in(Realm::Lan), Some(Ipv4Addr::new(10, 1, 1, 1)));
    assert_eq!(ue.address_in(Realm::Radio), Some(Ipv4Addr::new(7, 0, 0, 2)));

    let pgw = topo.node(topo.node_by_label("PGW").unwrap()).unwrap();
    assert_eq!(pgw.address_in(Realm::Radio), Some(Ipv4Addr::new(7, 0, 0, 1)));

    // The subscriber leaves through the anchor for everything it does not own.
    let table = topo.routing_table(ue.id()).unwrap();
    let out = table.lookup(Ipv4Addr::new(10, 1, 3, 2)).unwrap();
    assert_eq!(out.origin, RouteOrigin::Radio);
    assert_eq!(out.next_hop, Some(Ipv4Addr::new(7, 0, 0, 1)));
}

#[test]
fn cell_records_the_attachment() {
    let routed = city();
    let topo = routed.topology();
    let cell = topo.radio().unwrap();
    let ue = topo.node_by_label("Home-UE").unwrap();
    let gnb = topo.node_by_label("gNB").unwrap();

    assert_eq!(topo.node(gnb).unwrap().role(), NodeRole::BaseStation);
    assert_eq!(cell.subscribers, vec![ue]);
    assert_eq!(cell.attached_base_station(ue), Some(gnb));
    assert_eq!(cell.gateway, Ipv4Addr::new(7, 0, 0, 1));
    assert_eq!(cell.pool.to_string(), "7.0.0.0/8");

    let steps = topo.trace().steps();
    let attached = steps
        .iter()
        .position(|s| matches!(s, SetupStep::SubscriberAttached { .. }))
        .unwrap();
    let addressed = steps
        .iter()
        .position(|s| matches!(s, SetupStep::SubscriberAddressed { .. }))
        .unwrap();
    assert!(attached < addressed);
}

#[test]
fn subscribers_pick_the_nearest_site() {
    let cfg = CityConfig {
        subscribers: 2,
        base_stations: 3,
        ..CityConfig::default()
    };
    let routed = build_city(&cfg, &mut EpcRadioCore::default()).unwrap();
    let topo = routed.topology();
    let cell = topo.radio().unwrap();
    let id = |l: &str| topo.node_by_label(l).unwrap();

    assert_eq!(cell.base_stations.len(), 3);
    assert_eq!(cell.attached_base_station(id("Home-UE")), Some(id("gNB-2")));
    assert_eq!(cell.attached_base_station(id("Office-UE")), Some(id("gNB-3")));
    assert!(topo.link_by_name("office-core").is_none());

    let office = topo.node(id("Office-UE")).unwrap();
    assert_eq!(office.address_in(Realm::Radio), Some(Ipv4Addr::new(7, 0, 0, 3)));
}

#[test]
fn equal_distance_goes_to_the_first_listed_station() {
    let mut topo = Topology::new();
    let sub = topo.add_node_at("UE", NodeRole::Gateway, Position::new(0.0, 0.0));
    let east = topo.add_node_at("east", NodeRole::BaseStation, Position::new(5.0, 0.0));
    let west = topo.add_node_at("west", NodeRole::BaseStation, Position::new(-5.0, 0.0));

    let mut radio = EpcRadioCore::default();
    let picks = radio.attach_to_closest(&topo, &[sub], &[west, east]).unwrap();
    assert_eq!(picks[0].base_station, west);
    assert_eq!(picks[0].distance, 5.0);

    let picks = radio.attach_to_closest(&topo, &[sub], &[east, west]).unwrap();
    assert_eq!(picks[0].base_station, east);
}

#[test]
fn zero_base_stations_is_a_config_error() {
    let cfg = CityConfig {
        base_stations: 0,
        ..CityConfig::default()
    };
    assert!(matches!(
        cfg.validate(),
        Err(ScenarioError::InvalidParameter { name: "base_stations", .. })
    ));
    assert!(matches!(
        build_city(&cfg, &mut EpcRadioCore::default()),
        Err(ScenarioError::InvalidParameter { name: "base_stations", .. })
    ));
}

#[test]
fn no_base_station_fails_attachment() {
    let err = bridged(&CityConfig::default(), |spec, _| spec.base_stations.clear()).unwrap_err();
    match err {
        ScenarioError::AttachmentFailed { subscriber, .. } => assert_eq!(subscriber, "Home-UE"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn wired_gateway_cannot_be_a_subscriber() {
    let err = bridged(&CityConfig::default(), |spec, topo| {
        spec.subscribers.push(topo.node_by_label("Office-GW").unwrap());
    })
    .unwrap_err();
    match err {
        ScenarioError::IncompatibleRole { label, role, .. } => {
            assert_eq!(label, "Office-GW");
            assert_eq!(role, "subscriber");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn host_and_core_roles_are_checked() {
    let err = bridged(&CityConfig::default(), |spec, topo| {
        spec.subscribers = vec![topo.node_by_label("H1").unwrap()];
    })
    .unwrap_err();
    assert!(matches!(err, ScenarioError::IncompatibleRole { .. }), "{err}");

    let err = bridged(&CityConfig::default(), |spec, topo| {
        spec.anchor = topo.node_by_label("CORE").unwrap();
    })
    .unwrap_err();
    assert!(matches!(err, ScenarioError::IncompatibleRole { role: "anchor", .. }), "{err}");

    let err = bridged(&CityConfig::default(), |spec, _| spec.subscribers.clear()).unwrap_err();
    assert!(matches!(err, ScenarioError::EmptyElement(_)), "{err}");
}

#[test]
fn carrier_ranges_are_checked() {
    let bad = [
        CarrierConfig {
            center_frequency_hz: 100e6,
            ..CarrierConfig::default()
        },
        CarrierConfig {
            bandwidth_hz: 0.0,
            ..CarrierConfig::default()
        },
        CarrierConfig {
            numerology: 7,
            ..CarrierConfig::default()
        },
    ];
    for carrier in bad {
        assert!(matches!(
            carrier.validate(),
            Err(ScenarioError::InvalidParameter { .. })
        ));
    }
    assert_eq!(CarrierConfig::default().subcarrier_spacing_hz(), 30e3);

    let err = bridged(&CityConfig::default(), |spec, _| spec.carrier.numerology = 9).unwrap_err();
    assert!(matches!(err, ScenarioError::InvalidParameter { name: "numerology", .. }));
}
