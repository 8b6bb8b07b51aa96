use crate::config::CityConfig;
use crate::net::DropReason;
use crate::proto::tcp::{TcpConn, TcpState};
use crate::proto::{AppStart, AppStop};
use crate::sim::{SimTime, Simulator};
use crate::topo::{EpcRadioCore, city_scenario};
use crate::traffic::{FlowKind, FlowSpec, Scenario};

fn bulk_only(max_bytes: u64, horizon_s: f64) -> CityConfig {
    CityConfig {
        horizon_s,
        flows: vec![FlowSpec {
            name: "bulk".to_string(),
            source: "O1".to_string(),
            destination: "U2".to_string(),
            port: 5001,
            traffic: FlowKind::Bulk {
                max_bytes,
                send_size: 1024,
            },
            sink_start_s: 1.0,
            client_start_s: 2.0,
            stop_s: None,
        }],
        ..CityConfig::default()
    }
}

fn build(cfg: &CityConfig) -> (Scenario, Simulator) {
    let mut sim = Simulator::default();
    let scenario = city_scenario(cfg, &mut EpcRadioCore::default(), &mut sim).expect("scenario");
    (scenario, sim)
}

fn only_conn(scenario: &Scenario) -> &TcpConn {
    let tcp = scenario.network().tcp();
    assert_eq!(tcp.len(), 1);
    tcp.conns().next().unwrap()
}

#[test]
fn bounded_transfer_completes_and_reaches_the_sink() {
    let (mut scenario, mut sim) = build(&bulk_only(200_000, 6.0));
    scenario.run(&mut sim);

    let conn = only_conn(&scenario);
    assert!(conn.is_done());
    assert_eq!(conn.state(), TcpState::Done);
    assert_eq!(conn.bytes_acked(), 200_000);
    assert_eq!(conn.bytes_received(), 200_000);
    assert_eq!(conn.retransmits(), 0);
    assert_eq!(conn.flow_id(), 1);

    let established = conn.established_time().unwrap();
    let done = conn.done_time().unwrap();
    assert!(conn.start_time() == SimTime::from_secs(2));
    assert!(established > conn.start_time() && done > established);
    assert!(conn.srtt().is_some());

    let flow = scenario.flow("bulk").unwrap();
    let sink = scenario
        .network()
        .apps()
        .get(flow.server)
        .and_then(|a| a.as_sink())
        .unwrap();
    assert_eq!(sink.received_bytes(), 200_000);
    assert!(sink.goodput_bps() > 0.0);
}

#[test]
fn syn_is_retried_until_the_sink_comes_back() {
    let (mut scenario, mut sim) = build(&bulk_only(50_000, 10.0));
    let server = scenario.flow("bulk").unwrap().server;
    sim.schedule(SimTime::from_millis(1_500), AppStop { app: server });
    sim.schedule(SimTime::from_millis(3_500), AppStart { app: server });
    scenario.run(&mut sim);

    let conn = only_conn(&scenario);
    // SYNs at 2 s and 3 s find nothing; the backed-off retry at 5 s does.
    assert_eq!(conn.timeouts(), 2);
    let established = conn.established_time().unwrap();
    assert!(established > SimTime::from_secs(5) && established < SimTime::from_millis(5_100));
    assert!(conn.is_done());
    assert_eq!(scenario.network().stats.dropped(DropReason::NoListener), 2);
}

#[test]
fn losses_are_repaired_by_retransmission() {
    let mut cfg = bulk_only(50_000, 20.0);
    cfg.queue_limit_bytes = 3_000;
    let (mut scenario, mut sim) = build(&cfg);
    scenario.run(&mut sim);

    assert!(scenario.network().stats.dropped(DropReason::QueueFull) > 0);
    let conn = only_conn(&scenario);
    assert!(conn.retransmits() > 0);
    assert!(conn.is_done(), "acked {} of 50000", conn.bytes_acked());
    assert_eq!(conn.bytes_received(), 50_000);
    assert!(conn.rto() >= SimTime::from_millis(200));
}

#[test]
fn stopping_the_client_freezes_the_connection() {
    let mut cfg = bulk_only(0, 8.0);
    cfg.flows[0].stop_s = Some(4.0);
    let (mut scenario, mut sim) = build(&cfg);
    scenario.run(&mut sim);

    let conn = only_conn(&scenario);
    assert_eq!(conn.state(), TcpState::Stopped);
    assert!(conn.bytes_acked() > 0);
    assert!(conn.bytes_received() >= conn.bytes_acked());
}
