use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "city-sim-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn flow_lines(stdout: &str) -> Vec<&str> {
    stdout.lines().filter(|l| l.starts_with("flow ")).collect()
}

#[test]
fn city_sim_prints_flows_and_writes_outputs() {
    let dir = unique_temp_dir("outputs");
    let viz = dir.join("viz.json");
    let flows = dir.join("flows.json");
    let trace = dir.join("setup.json");

    let output = Command::new(env!("CARGO_BIN_EXE_city_sim"))
        .args([
            "--horizon-s",
            "4.5",
            "--viz-json",
            viz.to_str().unwrap(),
            "--flow-json",
            flows.to_str().unwrap(),
            "--setup-trace",
            trace.to_str().unwrap(),
        ])
        .output()
        .expect("run city_sim");
    assert!(
        output.status.success(),
        "city_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines = flow_lines(&stdout);
    assert_eq!(lines.len(), 3, "stdout={stdout}");
    assert!(lines[0].starts_with("flow echo kind=echo src=H1 dst=U1 "));
    assert!(lines[1].starts_with("flow onoff kind=on_off src=I1 dst=H2 "));
    assert!(lines[2].starts_with("flow bulk kind=bulk src=O1 dst=U2 "));
    // Echo requests at 2, 3 and 4 s fit before the horizon.
    assert!(lines[0].contains(" sent_pkts=3 "), "{}", lines[0]);
    assert!(stdout.lines().any(|l| l.starts_with("stats originated=")));

    let v: Value = serde_json::from_str(&fs::read_to_string(&viz).expect("read viz")).expect("parse viz");
    let arr = v.as_array().expect("viz json must be an array");
    assert_eq!(arr[0].get("kind").and_then(|k| k.as_str()), Some("meta"));

    let v: Value = serde_json::from_str(&fs::read_to_string(&flows).expect("read flows")).expect("parse flows");
    assert!(!v.as_array().expect("flow json must be an array").is_empty());

    let v: Value = serde_json::from_str(&fs::read_to_string(&trace).expect("read trace")).expect("parse trace");
    let steps = v.as_array().expect("setup trace must be an array");
    let step = |s: &Value| s.get("step").and_then(|k| k.as_str()).map(str::to_string);
    let kinds: Vec<String> = steps.iter().filter_map(step).collect();
    let first_static = kinds.iter().position(|k| k == "static_route_installed");
    let populated = kinds.iter().position(|k| k == "routes_populated");
    assert!(first_static.is_some() && first_static < populated, "{kinds:?}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn city_sim_writes_captures_on_request() {
    let dir = unique_temp_dir("pcap");
    let pcap = dir.join("pcap");

    let output = Command::new(env!("CARGO_BIN_EXE_city_sim"))
        .args(["--horizon-s", "2.5", "--pcap-dir", pcap.to_str().unwrap()])
        .output()
        .expect("run city_sim");
    assert!(
        output.status.success(),
        "city_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let files: Vec<String> = fs::read_dir(&pcap)
        .expect("read pcap dir")
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    assert_eq!(files.len(), 12, "{files:?}");
    assert!(files.iter().all(|f| f.starts_with("city-") && f.ends_with(".pcapng")));
    assert!(files.iter().any(|f| f == "city-home-lan-H1-0.pcapng"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn city_sim_reads_a_config_file() {
    let dir = unique_temp_dir("config");
    let config = dir.join("city.json");
    fs::write(
        &config,
        r#"{
    "hosts_per_district": 3,
    "horizon_s": 3.0,
    "flows": [
        {
            "name": "ping",
            "source": "O3",
            "destination": "H3",
            "port": 7,
            "traffic": { "kind": "echo", "max_packets": 2, "interval_s": 0.5, "packet_size": 64 },
            "sink_start_s": 0.5,
            "client_start_s": 1.0
        }
    ]
}"#,
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_city_sim"))
        .args(["--config", config.to_str().unwrap()])
        .output()
        .expect("run city_sim");
    assert!(
        output.status.success(),
        "city_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines = flow_lines(&stdout);
    assert_eq!(lines.len(), 1, "stdout={stdout}");
    assert!(lines[0].contains(" sent_pkts=2 ") && lines[0].contains(" rx_pkts=2 "), "{}", lines[0]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn city_sim_rejects_a_city_without_base_stations() {
    let output = Command::new(env!("CARGO_BIN_EXE_city_sim"))
        .args(["--base-stations", "0"])
        .output()
        .expect("run city_sim");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("city-sim:"), "stderr={stderr}");
    assert!(stderr.contains("base_stations"), "stderr={stderr}");
    assert!(flow_lines(&String::from_utf8_lossy(&output.stdout)).is_empty());
}

#[test]
fn city_sim_rejects_a_flow_past_the_horizon() {
    let dir = unique_temp_dir("bad-flow");
    let config = dir.join("city.json");
    fs::write(
        &config,
        r#"{
    "horizon_s": 5.0,
    "flows": [
        {
            "name": "late",
            "source": "O1",
            "destination": "U1",
            "port": 5001,
            "traffic": { "kind": "bulk", "send_size": 512 },
            "sink_start_s": 1.0,
            "client_start_s": 2.0,
            "stop_s": 9.0
        }
    ]
}"#,
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_city_sim"))
        .args(["--config", config.to_str().unwrap()])
        .output()
        .expect("run city_sim");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("flow `late`"), "stderr={stderr}");

    let _ = fs::remove_dir_all(&dir);
}
