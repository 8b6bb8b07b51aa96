use std::net::Ipv4Addr;

use super::city;
use crate::net::{IfIndex, Ipv4Subnet, RouteOrigin};
use crate::topo::SetupStep;

fn net(s: &str) -> Ipv4Subnet {
    s.parse().unwrap()
}

#[test]
fn core_gets_one_static_route_per_radio_prefix() {
    let routed = city();
    let topo = routed.topology();
    let core = topo.node_by_label("CORE").unwrap();
    let table = topo.routing_table(core).unwrap();

    let pool: Vec<_> = table.routes_to(net("7.0.0.0/8")).collect();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].origin, RouteOrigin::Static);
    assert_eq!(pool[0].next_hop, Some(Ipv4Addr::new(10, 255, 100, 1)));
    assert_eq!(pool[0].interface, IfIndex(3));

    let home: Vec<_> = table.routes_to(net("10.1.1.0/24")).collect();
    assert_eq!(home.len(), 1);
    assert_eq!(home[0].origin, RouteOrigin::Static);

    let statics = table
        .routes()
        .iter()
        .filter(|r| r.origin == RouteOrigin::Static)
        .count();
    assert_eq!(statics, 2);
}

#[test]
fn static_routes_are_recorded_before_population() {
    let routed = city();
    let trace = routed.topology().trace();
    let first_static = trace
        .position(|s| matches!(s, SetupStep::StaticRouteInstalled { .. }))
        .unwrap();
    let populated = trace
        .position(|s| matches!(s, SetupStep::RoutesPopulated { .. }))
        .unwrap();
    let last_static = trace
        .steps()
        .iter()
        .rposition(|s| matches!(s, SetupStep::StaticRouteInstalled { .. }))
        .unwrap();
    assert!(first_static < populated);
    assert!(last_static < populated);
    assert!(matches!(
        trace.steps().last(),
        Some(SetupStep::RoutesPopulated { installed }) if *installed > 0
    ));
}

#[test]
fn wired_districts_reach_the_radio_side_through_the_core() {
    let routed = city();
    let topo = routed.topology();
    for gw in ["Office-GW", "Uni-GW", "IoT-GW"] {
        let table = topo.routing_table(topo.node_by_label(gw).unwrap()).unwrap();
        for dst in [Ipv4Addr::new(10, 1, 1, 2), Ipv4Addr::new(7, 0, 0, 2)] {
            let route = table.lookup(dst).unwrap();
            assert_eq!(route.origin, RouteOrigin::Global, "{gw} → {dst}");
        }
    }
    let office = topo.routing_table(topo.node_by_label("Office-GW").unwrap()).unwrap();
    assert_eq!(
        office.lookup(Ipv4Addr::new(10, 1, 1, 2)).unwrap().next_hop,
        Some(Ipv4Addr::new(10, 255, 0, 2))
    );

    // Hosts behind a wired gateway use their default route.
    let o1 = topo.routing_table(topo.node_by_label("O1").unwrap()).unwrap();
    let out = o1.lookup(Ipv4Addr::new(10, 1, 1, 2)).unwrap();
    assert_eq!(out.next_hop, Some(Ipv4Addr::new(10, 1, 2, 1)));
}

#[test]
fn population_never_overwrites_existing_entries() {
    let routed = city();
    let topo = routed.topology();

    let pgw = topo.routing_table(topo.node_by_label("PGW").unwrap()).unwrap();
    let home: Vec<_> = pgw.routes_to(net("10.1.1.0/24")).collect();
    assert_eq!(home.len(), 1);
    assert_eq!(home[0].origin, RouteOrigin::Radio);
    assert_eq!(home[0].next_hop, Some(Ipv4Addr::new(7, 0, 0, 2)));

    let pool: Vec<_> = pgw.routes_to(net("7.0.0.0/8")).collect();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].origin, RouteOrigin::Connected);

    for node in topo.nodes() {
        let table = topo.routing_table(node.id()).unwrap();
        let mut prefixes: Vec<_> = table.routes().iter().map(|r| r.destination).collect();
        let total = prefixes.len();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), total, "{} has duplicate prefixes", node.label());
    }
}

#[test]
fn core_forwards_to_every_district() {
    let routed = city();
    let topo = routed.topology();
    let core = topo.routing_table(topo.node_by_label("CORE").unwrap()).unwrap();
    let cases = [
        (Ipv4Addr::new(10, 1, 1, 3), Some(Ipv4Addr::new(10, 255, 100, 1))),
        (Ipv4Addr::new(10, 1, 2, 2), Some(Ipv4Addr::new(10, 255, 0, 1))),
        (Ipv4Addr::new(10, 1, 3, 3), Some(Ipv4Addr::new(10, 255, 0, 5))),
        (Ipv4Addr::new(10, 1, 4, 2), Some(Ipv4Addr::new(10, 255, 0, 9))),
        (Ipv4Addr::new(10, 255, 0, 5), None),
    ];
    for (dst, hop) in cases {
        assert_eq!(core.lookup(dst).map(|r| r.next_hop), Some(hop), "{dst}");
    }
    assert!(core.lookup(Ipv4Addr::new(192, 168, 0, 1)).is_none());
}
