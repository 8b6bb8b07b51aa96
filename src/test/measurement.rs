use serde_json::Value;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CityConfig;
use crate::net::IpProtocol;
use crate::sim::Simulator;
use crate::topo::{EpcRadioCore, city_scenario};
use crate::traffic::Scenario;
use crate::viz::VizEventKind;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    std::env::temp_dir().join(format!("city-netsim-{prefix}-{}-{nanos}", std::process::id()))
}

fn default_city(sim: &mut Simulator) -> Scenario {
    city_scenario(&CityConfig::default(), &mut EpcRadioCore::default(), sim).expect("scenario")
}

#[test]
fn viz_trace_starts_with_the_topology_snapshot() {
    let mut sim = Simulator::default();
    let mut scenario = default_city(&mut sim);
    scenario.network_mut().enable_viz();
    scenario.run(&mut sim);

    let viz = scenario.network().viz().unwrap();
    let VizEventKind::Meta { nodes, links } = &viz.events[0].kind else {
        panic!("first event is not meta");
    };
    assert_eq!(nodes.len(), 15);
    assert_eq!(links.len(), 9);
    assert!(links.iter().any(|l| l.kind == "radio" && l.nodes.len() == 2));
    assert!(nodes.iter().any(|n| n.label == "gNB" && n.x == Some(40.0)));

    assert!(viz.events.iter().any(|e| matches!(e.kind, VizEventKind::RadioRelay { .. })));
    assert!(viz.events.iter().any(|e| matches!(e.kind, VizEventKind::TcpSendData(_))));

    let v: Value = serde_json::to_value(&viz.events[..2]).unwrap();
    assert_eq!(v[0]["kind"].as_str(), Some("meta"));
    assert_eq!(v[0]["t_ns"].as_u64(), Some(0));
}

#[test]
fn taps_write_one_pcapng_file_per_device() {
    let dir = unique_temp_dir("pcap");
    let mut sim = Simulator::default();
    let mut scenario = default_city(&mut sim);

    let points = scenario.network().capture_points();
    // One promiscuous tap per segment, both ends of every trunk.
    assert_eq!(points.len(), 4 + 2 * 4);
    assert_eq!(points.iter().filter(|p| p.promiscuous).count(), 4);

    let opened = scenario.network_mut().enable_captures(&dir, "city").unwrap();
    assert_eq!(opened, 12);
    scenario.run(&mut sim);

    let captures = scenario.network().captures().unwrap();
    for path in captures.paths() {
        let bytes = fs::read(path).unwrap();
        // Section header block type.
        assert_eq!(&bytes[..4], &[0x0a, 0x0d, 0x0d, 0x0a], "{}", path.display());
    }
    let counts = captures.counts();
    let count_of = |name: &str| {
        counts
            .iter()
            .find(|(p, _)| p.file_name().and_then(|f| f.to_str()) == Some(name))
            .map(|(_, n)| *n)
            .unwrap_or_else(|| panic!("no capture named {name}"))
    };
    // The home LAN carries the echo requests and the on/off stream.
    assert!(count_of("city-home-lan-H1-0.pcapng") > 7_000);
    assert!(count_of("city-pgw-core-CORE-3.pcapng") > 0);
    assert!(count_of("city-office-core-Office-GW-1.pcapng") > 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn flow_monitor_tracks_each_direction() {
    let mut sim = Simulator::default();
    let mut scenario = default_city(&mut sim);
    scenario.network_mut().install_flow_monitor();
    scenario.run(&mut sim);

    let fm = scenario.network().flow_monitor().unwrap();
    assert_eq!(fm.probes().len(), 14);

    let (tuple, stream) = fm
        .flows()
        .iter()
        .find(|(t, _)| t.dst_port == 4000)
        .unwrap();
    assert_eq!(tuple.protocol, IpProtocol::Udp);
    assert_eq!(tuple.src, Ipv4Addr::new(10, 1, 4, 2));
    assert_eq!(tuple.dst, Ipv4Addr::new(10, 1, 1, 3));
    assert!(stream.tx_packets >= 7_499);
    assert!(stream.rx_packets <= stream.tx_packets);
    assert!(stream.mean_delay().is_some());

    let echo_replies = fm
        .flows()
        .iter()
        .find(|(t, _)| t.src_port == 9)
        .map(|(_, r)| r.rx_packets);
    assert_eq!(echo_replies, Some(6));

    let v: Value = serde_json::from_str(&fm.to_json().unwrap()).unwrap();
    let entries = v.as_array().unwrap();
    assert_eq!(entries.len(), fm.flows().len());
    assert_eq!(entries[0]["flow_id"].as_u64(), Some(1));
}
