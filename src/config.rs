//! 场景配置
//!
//! `CityConfig` is the whole scenario in one serde value: layout size, radio
//! carrier, link defaults, horizon and the workload. Missing JSON fields take
//! the defaults of the reference city.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ScenarioError};
use crate::net::DEFAULT_QUEUE_LIMIT_BYTES;
use crate::sim::SimTime;
use crate::topo::CarrierConfig;
use crate::topo::city::{DISTRICTS, default_flows};
use crate::traffic::FlowSpec;

/// Hosts per district LAN at most; keeps every district inside its /24.
pub const MAX_HOSTS_PER_DISTRICT: usize = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityConfig {
    pub hosts_per_district: usize,
    /// How many districts (home first) reach the core over the radio bridge.
    pub subscribers: usize,
    pub base_stations: usize,
    pub carrier: CarrierConfig,
    pub horizon_s: f64,
    pub lan_rate_bps: u64,
    pub lan_delay_us: u64,
    pub trunk_rate_bps: u64,
    pub trunk_delay_us: u64,
    pub queue_limit_bytes: u64,
    pub flows: Vec<FlowSpec>,
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            hosts_per_district: 2,
            subscribers: 1,
            base_stations: 1,
            carrier: CarrierConfig::default(),
            horizon_s: 12.0,
            lan_rate_bps: 100_000_000,
            lan_delay_us: 500,
            trunk_rate_bps: 50_000_000,
            trunk_delay_us: 2_000,
            queue_limit_bytes: DEFAULT_QUEUE_LIMIT_BYTES,
            flows: default_flows(),
        }
    }
}

impl CityConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn horizon(&self) -> SimTime {
        SimTime::from_secs_f64(self.horizon_s)
    }

    /// Range checks. Flow timing is checked by the scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.hosts_per_district == 0 || self.hosts_per_district > MAX_HOSTS_PER_DISTRICT {
            return Err(ScenarioError::invalid(
                "hosts_per_district",
                format!(
                    "must be in 1..={MAX_HOSTS_PER_DISTRICT}, got {}",
                    self.hosts_per_district
                ),
            ));
        }
        if self.subscribers == 0 || self.subscribers > DISTRICTS.len() {
            return Err(ScenarioError::invalid(
                "subscribers",
                format!("must be in 1..={}, got {}", DISTRICTS.len(), self.subscribers),
            ));
        }
        if self.base_stations == 0 {
            return Err(ScenarioError::invalid("base_stations", "at least one base station is required"));
        }
        if !self.horizon_s.is_finite() || self.horizon_s <= 0.0 {
            return Err(ScenarioError::invalid(
                "horizon_s",
                format!("must be positive, got {}", self.horizon_s),
            ));
        }
        for (name, rate) in [("lan_rate_bps", self.lan_rate_bps), ("trunk_rate_bps", self.trunk_rate_bps)] {
            if rate == 0 {
                return Err(ScenarioError::invalid(name, "must be non-zero"));
            }
        }
        if self.queue_limit_bytes == 0 {
            return Err(ScenarioError::invalid("queue_limit_bytes", "must be non-zero"));
        }
        self.carrier.validate()
    }
}
