//! 城市网络场景
//!
//! Builds the four-district city with its cellular bridge, runs the workload
//! to the horizon and prints one line per flow. Captures, the animation
//! trace, flow statistics and the setup trace are written on request.

use city_netsim::config::CityConfig;
use city_netsim::error::Result;
use city_netsim::sim::Simulator;
use city_netsim::topo::{EpcRadioCore, city_scenario};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "city-sim", about = "City network scenario: four district LANs, a cellular bridge and a mixed workload")]
struct Args {
    /// Scenario config (JSON); flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    hosts_per_district: Option<usize>,

    /// Districts (home first) that reach the core over the radio bridge
    #[arg(long)]
    subscribers: Option<usize>,

    #[arg(long)]
    base_stations: Option<usize>,

    #[arg(long)]
    center_frequency_hz: Option<f64>,

    #[arg(long)]
    bandwidth_hz: Option<f64>,

    #[arg(long)]
    numerology: Option<u8>,

    /// Simulation horizon (seconds)
    #[arg(long)]
    horizon_s: Option<f64>,

    /// Log application activity at info level (RUST_LOG still wins)
    #[arg(long)]
    logging: bool,

    /// Write pcap files for every tap into this directory
    #[arg(long)]
    pcap_dir: Option<PathBuf>,

    /// Output viz JSON file
    #[arg(long)]
    viz_json: Option<PathBuf>,

    /// Output per-flow statistics JSON file
    #[arg(long)]
    flow_json: Option<PathBuf>,

    /// Output the setup trace JSON file
    #[arg(long)]
    setup_trace: Option<PathBuf>,
}

impl Args {
    fn city_config(&self) -> Result<CityConfig> {
        let mut cfg = match &self.config {
            Some(path) => CityConfig::from_json_file(path)?,
            None => CityConfig::default(),
        };
        if let Some(v) = self.hosts_per_district {
            cfg.hosts_per_district = v;
        }
        if let Some(v) = self.subscribers {
            cfg.subscribers = v;
        }
        if let Some(v) = self.base_stations {
            cfg.base_stations = v;
        }
        if let Some(v) = self.center_frequency_hz {
            cfg.carrier.center_frequency_hz = v;
        }
        if let Some(v) = self.bandwidth_hz {
            cfg.carrier.bandwidth_hz = v;
        }
        if let Some(v) = self.numerology {
            cfg.carrier.numerology = v;
        }
        if let Some(v) = self.horizon_s {
            cfg.horizon_s = v;
        }
        Ok(cfg)
    }
}

fn run(args: &Args) -> Result<()> {
    let cfg = args.city_config()?;
    let mut sim = Simulator::default();
    let mut radio = EpcRadioCore::default();
    let mut scenario = city_scenario(&cfg, &mut radio, &mut sim)?;

    if let Some(path) = &args.setup_trace {
        fs::write(path, scenario.network().topology().trace().to_json()?)?;
    }
    let net = scenario.network_mut();
    net.install_flow_monitor();
    if args.viz_json.is_some() {
        net.enable_viz();
    }
    if let Some(dir) = &args.pcap_dir {
        fs::create_dir_all(dir)?;
        let taps = net.enable_captures(dir, "city")?;
        info!(taps, dir = %dir.display(), "📼 captures enabled");
    }

    scenario.run(&mut sim);

    for r in scenario.report() {
        let rtt = r
            .mean_rtt_ms
            .map(|ms| format!(" mean_rtt_ms={ms:.3}"))
            .unwrap_or_default();
        println!(
            "flow {} kind={} src={} dst={} sent_pkts={} sent_bytes={} rx_pkts={} rx_bytes={}{rtt}",
            r.name,
            r.kind,
            r.source,
            r.destination,
            r.sent_packets,
            r.sent_bytes,
            r.received_packets,
            r.received_bytes,
        );
    }
    let net = scenario.network();
    println!(
        "stats originated={} forwarded={} delivered={} dropped={} events={}",
        net.stats.originated_pkts,
        net.stats.forwarded_pkts,
        net.stats.delivered_pkts,
        net.stats.total_dropped(),
        sim.executed(),
    );

    if let (Some(path), Some(viz)) = (&args.viz_json, net.viz()) {
        viz.write_json(path)?;
        info!(path = %path.display(), events = viz.events.len(), "viz written");
    }
    if let (Some(path), Some(fm)) = (&args.flow_json, net.flow_monitor()) {
        fm.write_json(path)?;
        info!(path = %path.display(), flows = fm.flows().len(), "flow stats written");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.logging { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("city-sim: {e}");
            ExitCode::from(2)
        }
    }
}
