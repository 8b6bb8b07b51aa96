use crate::config::CityConfig;
use crate::net::DropReason;
use crate::sim::{SimTime, Simulator};
use crate::topo::{EpcRadioCore, city_scenario};
use crate::traffic::{FlowKind, FlowReport, FlowSpec, Scenario};

fn scenario(cfg: &CityConfig) -> (Scenario, Simulator) {
    let mut sim = Simulator::default();
    let scenario = city_scenario(cfg, &mut EpcRadioCore::default(), &mut sim).expect("scenario");
    (scenario, sim)
}

fn report(reports: &[FlowReport], name: &str) -> FlowReport {
    reports
        .iter()
        .find(|r| r.name == name)
        .cloned()
        .unwrap_or_else(|| panic!("no report for {name}"))
}

#[test]
fn echo_crosses_the_radio_bridge_and_comes_back() {
    let (mut scenario, mut sim) = scenario(&CityConfig::default());
    scenario.run(&mut sim);
    let reports = scenario.report();
    let echo = report(&reports, "echo");

    assert_eq!(echo.kind, "echo");
    assert_eq!(echo.source, "H1");
    assert_eq!(echo.destination, "U1");
    assert_eq!(echo.sent_packets, 6);
    assert_eq!(echo.received_packets, 6);
    assert_eq!(echo.sent_bytes, 6 * 512);

    // Two LAN hops, two trunks and the air hop each way, plus whatever the
    // bulk transfer queues on the university trunk.
    let rtt = echo.mean_rtt_ms.unwrap();
    assert!(rtt > 10.0 && rtt < 40.0, "rtt {rtt} ms");
}

#[test]
fn constant_rate_stream_runs_until_the_horizon() {
    let (mut scenario, mut sim) = scenario(&CityConfig::default());
    scenario.run(&mut sim);
    let reports = scenario.report();
    let onoff = report(&reports, "onoff");

    // 2 Mb/s of 300-byte datagrams is one every 1.2 ms over [3 s, 12 s).
    assert!((7_499..=7_501).contains(&onoff.sent_packets), "{}", onoff.sent_packets);
    assert_eq!(onoff.sent_bytes, onoff.sent_packets * 300);
    assert!(onoff.received_packets <= onoff.sent_packets);
    assert!(onoff.received_packets + 20 >= onoff.sent_packets, "{}", onoff.received_packets);
    assert_eq!(onoff.received_bytes, onoff.received_packets * 300);
}

#[test]
fn bulk_transfer_keeps_making_progress() {
    let (mut scenario, mut sim) = scenario(&CityConfig::default());
    sim.run_until(SimTime::from_secs(6), scenario.world_mut());

    let bulk = scenario.flow("bulk").unwrap().client;
    let acked_at = |s: &Scenario| {
        s.network()
            .apps()
            .get(bulk)
            .and_then(|a| a.as_bulk())
            .map(|b| b.bytes_acked(s.network().tcp()))
            .unwrap()
    };
    let early = acked_at(&scenario);
    assert!(early > 0);

    scenario.run(&mut sim);
    let late = acked_at(&scenario);
    assert!(late > early, "{late} <= {early}");

    let reports = scenario.report();
    let r = report(&reports, "bulk");
    assert_eq!(r.sent_bytes, late);
    assert!(r.received_bytes >= late);
    assert_eq!(scenario.network().stats.dropped(DropReason::NoRoute), 0);
}

#[test]
fn bulk_stopped_early_delivers_less() {
    let run = |cfg: &CityConfig| {
        let (mut scenario, mut sim) = scenario(cfg);
        scenario.run(&mut sim);
        report(&scenario.report(), "bulk").received_bytes
    };
    let full = run(&CityConfig::default());

    let mut cfg = CityConfig::default();
    let bulk = cfg.flows.iter_mut().find(|f| f.name == "bulk").unwrap();
    bulk.stop_s = Some(6.0);
    let early = run(&cfg);

    assert!(early > 0);
    assert!(early < full, "{early} >= {full}");
}

#[test]
fn off_periods_pause_the_source() {
    let cfg = CityConfig {
        horizon_s: 3.0,
        flows: vec![FlowSpec {
            name: "blink".to_string(),
            source: "I2".to_string(),
            destination: "O2".to_string(),
            port: 6000,
            // 1000 bytes at 800 kb/s is one packet every 10 ms.
            traffic: FlowKind::OnOff {
                rate_bps: 800_000,
                packet_size: 1_000,
                on_time_s: 0.1,
                off_time_s: 0.1,
            },
            sink_start_s: 0.5,
            client_start_s: 1.0,
            stop_s: Some(2.0),
        }],
        ..CityConfig::default()
    };
    let (mut scenario, mut sim) = scenario(&cfg);
    scenario.run(&mut sim);

    let blink = scenario.flow("blink").unwrap().client;
    let app = scenario.network().apps().get(blink).and_then(|a| a.as_onoff()).unwrap();
    assert_eq!(app.interval(), SimTime::from_millis(10));
    assert_eq!(app.sent_pkts(), 50);
    assert_eq!(app.first_tx(), Some(SimTime::from_secs(1)));
    assert_eq!(app.last_tx(), Some(SimTime::from_millis(1_890)));
}

#[test]
fn identical_inputs_give_identical_runs() {
    let run = || {
        let (mut scenario, mut sim) = scenario(&CityConfig::default());
        let discarded = scenario.run(&mut sim);
        let stats = serde_json::to_string(&scenario.network().stats).unwrap();
        let reports = serde_json::to_string(&scenario.report()).unwrap();
        (discarded, sim.executed(), stats, reports)
    };
    assert_eq!(run(), run());
}

#[test]
fn every_app_is_stopped_after_the_run() {
    let (mut scenario, mut sim) = scenario(&CityConfig::default());
    scenario.run(&mut sim);
    let apps = scenario.network().apps();
    assert_eq!(apps.len(), 6);
    assert!(apps.iter().all(|(id, _, _)| !apps.is_running(id)));
    assert_eq!(sim.pending(), 0);
    assert_eq!(sim.now(), scenario.horizon());
}
