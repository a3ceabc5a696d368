use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::domain::{
    ChannelRole, ChannelSpec, CopPoint, HeatPumpParams, Layout, MarketType, SeasonalStorageMode, StorageParams,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub node: NodeConfig,
    #[validate(nested)]
    pub planner: PlannerConfig,
    #[validate(nested)]
    pub bid: BidConfig,
    #[validate(nested)]
    pub contract: ContractConfig,
    #[validate(nested)]
    pub controller: ControllerConfig,
    #[validate(nested)]
    pub dispatcher: DispatcherConfig,
    #[validate(nested)]
    pub reporter: ReporterConfig,
    #[validate(nested)]
    pub sensors: SensorsConfig,
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NodeConfig {
    #[validate(length(min = 1))]
    pub alias: String,
    pub storage_mode: SeasonalStorageMode,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlannerConfig {
    #[validate(range(min = 1, max = 168))]
    pub horizon_hours: usize,
    #[validate(range(min = 1))]
    pub interval_seconds: u64,
    /// JSON forecast envelope; a flat synthetic forecast is used when unset
    pub forecast_file: Option<String>,
    /// "reachable-level" or "on-off"
    pub edge_policy: String,
    #[validate(nested)]
    pub storage: StorageParams,
    #[validate(nested)]
    pub heat_pump: HeatPumpParams,
    /// Flat forecast values used without a forecast file
    pub flat_price_usd_per_mwh: f64,
    #[validate(range(min = 0.0))]
    pub flat_load_kwh: f64,
    pub flat_outside_temp_c: f64,
}

impl PlannerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BidConfig {
    pub market_type: MarketType,
    #[validate(range(min = 2, max = 1000))]
    pub ladder_points: usize,
    pub price_floor_usd_per_mwh: Option<f64>,
    pub price_cap_usd_per_mwh: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContractConfig {
    #[validate(range(min = 1))]
    pub grace_period_seconds: u64,
    #[validate(range(min = 1))]
    pub min_duration_minutes: u32,
    #[validate(range(min = 1))]
    pub max_duration_minutes: u32,
    #[validate(range(exclusive_min = 0.0))]
    pub max_avg_power_watts: f64,
    /// Acknowledge and confirm valid proposals without operator input
    pub auto_accept: bool,
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,
}

impl ContractConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ControllerConfig {
    /// Buffer energy below which the buffer is recharged (kWh)
    #[validate(range(min = 0.0))]
    pub buffer_low_kwh: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub buffer_full_kwh: f64,
    #[validate(range(min = 0.0))]
    pub store_low_kwh: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub store_full_kwh: f64,
    #[validate(range(min = 1))]
    pub stale_after_seconds: u64,
    #[validate(range(min = 1))]
    pub tick_seconds: u64,
    /// Electrical draw assumed while the heat pump runs, for contract budgets
    #[validate(range(exclusive_min = 0.0))]
    pub hp_rated_power_watts: f64,
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,
}

impl ControllerConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_seconds as i64)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispatcherConfig {
    #[validate(range(min = 1))]
    pub command_timeout_ms: u64,
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,
    #[validate(range(min = 1))]
    pub max_backoff_ms: u64,
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,
}

impl DispatcherConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReporterConfig {
    #[validate(range(min = 1))]
    pub flush_interval_seconds: u64,
    #[validate(range(min = 1))]
    pub flush_threshold: usize,
    #[validate(range(min = 1))]
    pub max_buffered_reports: usize,
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,
}

impl ReporterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SensorsConfig {
    #[validate(length(min = 1))]
    pub buffer_energy_channel: String,
    pub store_energy_channel: Option<String>,
    #[serde(default)]
    pub extra_channels: Vec<String>,
}

/// Tank plant stand-in driven by the simulated relay bank
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationConfig {
    #[validate(range(min = 1))]
    pub step_seconds: u64,
    #[validate(range(exclusive_min = 0.0))]
    pub buffer_capacity_kwh: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub store_capacity_kwh: f64,
    #[validate(range(min = 0.0))]
    pub initial_buffer_kwh: f64,
    #[validate(range(min = 0.0))]
    pub initial_store_kwh: f64,
    /// Thermal output while the heat pump runs (kW)
    #[validate(range(exclusive_min = 0.0))]
    pub heat_pump_output_kw: f64,
    /// Store to buffer transfer rate while discharging (kW)
    #[validate(range(min = 0.0))]
    pub store_transfer_kw: f64,
    #[validate(range(min = 0.0))]
    pub load_kw: f64,
    #[validate(range(min = 0.0))]
    pub load_std_dev_kw: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_seconds: 10,
            buffer_capacity_kwh: 10.0,
            store_capacity_kwh: 35.0,
            initial_buffer_kwh: 4.0,
            initial_store_kwh: 12.0,
            heat_pump_output_kw: 12.0,
            store_transfer_kw: 8.0,
            load_kw: 3.0,
            load_std_dev_kw: 0.5,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("TD__").split("__"));
        Self::from_figment(figment)
    }

    /// Extract and validate from an already assembled provider stack
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Channel and ownership registry for this node
    pub fn layout(&self) -> Result<Layout> {
        let mut channels = vec![ChannelSpec {
            name: self.sensors.buffer_energy_channel.clone(),
            role: ChannelRole::BufferEnergy,
            unit: "kWh".to_string(),
        }];
        if let Some(store) = &self.sensors.store_energy_channel {
            channels.push(ChannelSpec {
                name: store.clone(),
                role: ChannelRole::StoreEnergy,
                unit: "kWh".to_string(),
            });
        }
        channels.extend(self.sensors.extra_channels.iter().map(|name| ChannelSpec {
            name: name.clone(),
            role: ChannelRole::Other,
            unit: String::new(),
        }));
        Ok(Layout::new(
            self.node.alias.clone(),
            self.node.storage_mode,
            channels,
            Layout::default_owners(),
        )?)
    }
}
