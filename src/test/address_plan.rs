use std::net::Ipv4Addr;

use super::city;
use crate::config::CityConfig;
use crate::error::ScenarioError;
use crate::net::{Ipv4Subnet, LinkCategory, NodeRole, RouteOrigin};
use crate::sim::SimTime;
use crate::topo::city::city_fabric;
use crate::topo::{AddressPolicy, BuiltTopology, FabricSpec, SegmentSpec, Topology};

fn net(s: &str) -> Ipv4Subnet {
    s.parse().unwrap()
}

fn addr_of(topo: &Topology, label: &str, link: &str) -> Ipv4Addr {
    let link = topo.link_by_name(link).unwrap().id;
    let node = topo.node(topo.node_by_label(label).unwrap()).unwrap();
    node.interface_on(link).and_then(|i| i.address).unwrap()
}

#[test]
fn city_plan_matches_the_reference_layout() {
    let routed = city();
    let topo = routed.topology();

    let subnet = |name: &str| topo.link_by_name(name).unwrap().subnet.unwrap();
    assert_eq!(subnet("home-lan"), net("10.1.1.0/24"));
    assert_eq!(subnet("office-lan"), net("10.1.2.0/24"));
    assert_eq!(subnet("uni-lan"), net("10.1.3.0/24"));
    assert_eq!(subnet("iot-lan"), net("10.1.4.0/24"));
    assert_eq!(subnet("office-core"), net("10.255.0.0/30"));
    assert_eq!(subnet("uni-core"), net("10.255.0.4/30"));
    assert_eq!(subnet("iot-core"), net("10.255.0.8/30"));
    assert_eq!(subnet("pgw-core"), net("10.255.100.0/30"));

    // Gateway first, then hosts in order.
    assert_eq!(addr_of(topo, "Home-UE", "home-lan"), Ipv4Addr::new(10, 1, 1, 1));
    assert_eq!(addr_of(topo, "H1", "home-lan"), Ipv4Addr::new(10, 1, 1, 2));
    assert_eq!(addr_of(topo, "H2", "home-lan"), Ipv4Addr::new(10, 1, 1, 3));
    assert_eq!(addr_of(topo, "PGW", "pgw-core"), Ipv4Addr::new(10, 255, 100, 1));
    assert_eq!(addr_of(topo, "CORE", "pgw-core"), Ipv4Addr::new(10, 255, 100, 2));
    assert_eq!(addr_of(topo, "Uni-GW", "uni-core"), Ipv4Addr::new(10, 255, 0, 5));
}

#[test]
fn subnets_are_disjoint_and_clear_of_the_pool() {
    let routed = city();
    let plan = routed.topology().plan();
    assert_eq!(plan.first_conflict(), None);
    assert!(plan.reserved().contains(&net("7.0.0.0/8")));
    for (_, s) in plan.assignments() {
        assert!(!s.overlaps(&net("7.0.0.0/8")), "{s} overlaps the pool");
    }
}

#[test]
fn every_addressed_interface_has_a_connected_route() {
    let routed = city();
    let topo = routed.topology();
    for node in topo.nodes() {
        let table = topo.routing_table(node.id()).unwrap();
        for iface in node.interfaces() {
            let Some(subnet) = iface.subnet else {
                continue;
            };
            assert!(
                table
                    .routes_to(subnet)
                    .any(|r| r.origin == RouteOrigin::Connected && r.next_hop.is_none()),
                "{} lacks a connected route for {subnet}",
                node.label()
            );
        }
    }
}

#[test]
fn allocation_is_deterministic() {
    let plan = || {
        let (topo, fabric, _) = city_fabric(&CityConfig::default());
        let policy = AddressPolicy::city(4, vec![net("7.0.0.0/8")]).unwrap();
        let addressed = BuiltTopology::build(topo, &fabric)
            .unwrap()
            .assign_addresses(&policy)
            .unwrap();
        addressed.topology().plan().assignments().to_vec()
    };
    assert_eq!(plan(), plan());
}

#[test]
fn big_segments_get_a_bigger_block() {
    let mut topo = Topology::new();
    let gw = topo.add_node("GW", NodeRole::Gateway);
    let hosts: Vec<_> = (0..6)
        .map(|i| topo.add_node(format!("h{i}"), NodeRole::Host))
        .collect();
    let fabric = FabricSpec {
        segments: vec![SegmentSpec {
            name: "lan".to_string(),
            category: LinkCategory::DistrictLan(1),
            gateway: gw,
            members: hosts,
            bandwidth_bps: 1_000_000,
            delay: SimTime::ZERO,
        }],
        trunks: vec![],
    };
    let mut policy = AddressPolicy::city(1, vec![]).unwrap();
    // A /29 holds six hosts; the gateway plus six hosts need a /28.
    policy.ranges[0].natural_prefix = 29;
    let addressed = BuiltTopology::build(topo, &fabric)
        .unwrap()
        .assign_addresses(&policy)
        .unwrap();
    assert_eq!(addressed.topology().links()[0].subnet, Some(net("10.1.1.0/28")));
}

#[test]
fn exhausted_range_fails() {
    let (topo, fabric, _) = city_fabric(&CityConfig::default());
    let mut policy = AddressPolicy::city(4, vec![]).unwrap();
    for r in &mut policy.ranges {
        if r.category == LinkCategory::CoreTrunk {
            // Room for one /30 only; the city has three gateway trunks.
            r.range = net("10.255.0.0/30");
        }
    }
    let err = BuiltTopology::build(topo, &fabric)
        .unwrap()
        .assign_addresses(&policy)
        .unwrap_err();
    match err {
        ScenarioError::AddressExhausted { link, .. } => assert_eq!(link, "uni-core"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn pool_inside_a_category_range_is_a_conflict() {
    let (topo, fabric, _) = city_fabric(&CityConfig::default());
    let policy = AddressPolicy::city(4, vec![net("10.1.2.0/23")]).unwrap();
    let err = BuiltTopology::build(topo, &fabric)
        .unwrap()
        .assign_addresses(&policy)
        .unwrap_err();
    assert!(matches!(err, ScenarioError::AddressConflict { .. }), "{err}");
}
