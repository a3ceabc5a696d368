#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use figment::providers::{Format, Toml};
use figment::Figment;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use thermal_dispatch::config::Config;
use thermal_dispatch::contract::ContractMessage;
use thermal_dispatch::controller::{spawn_actors, Actors, Collaborators};
use thermal_dispatch::dispatch::{Actuator, LogReportSink, RelayBankHandle, SimulatedRelayBank};
use thermal_dispatch::domain::{
    ActorClass, CopPoint, Envelope, ForecastInput, HeatPumpParams, SeasonalStorageMode, StorageParams,
};
use thermal_dispatch::forecast::FlatForecastProvider;
use thermal_dispatch::market::LogBidSink;

/// The shipped defaults, read without touching the environment
pub fn config() -> Config {
    Config::from_figment(Figment::from(Toml::string(include_str!("../../config/default.toml"))))
        .expect("default config is valid")
}

/// Flat 100 USD/MWh, 1 kWh/h load, COP 3 at the fixed outside temperature
pub fn forecast(horizon_hours: usize) -> ForecastInput {
    ForecastInput {
        start: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        horizon_hours,
        price_usd_per_mwh: vec![100.0; horizon_hours],
        load_kwh: vec![1.0; horizon_hours],
        outside_temp_c: vec![0.0; horizon_hours],
        storage: StorageParams {
            capacity_kwh: 30.0,
            step_kwh: 1.0,
            initial_kwh: 0.0,
            loss_fraction_per_hour: 0.0,
        },
        heat_pump: HeatPumpParams {
            max_heat_kwh_per_hour: 30.0,
            cop_curve: vec![
                CopPoint { outside_temp_c: -10.0, cop: 2.0 },
                CopPoint { outside_temp_c: 10.0, cop: 4.0 },
            ],
            cycle_penalty_usd: 0.0,
        },
    }
}

/// Every actor running against a simulated relay bank, with the ATN side
/// of the contract link exposed to the test
pub struct Stack {
    pub actors: Actors,
    pub relays: RelayBankHandle,
    pub atn: mpsc::Receiver<Envelope<ContractMessage>>,
}

pub fn spawn_stack(mut config: Config, mode: SeasonalStorageMode) -> Stack {
    config.node.storage_mode = mode;
    if mode == SeasonalStorageMode::BufferOnly {
        config.sensors.store_energy_channel = None;
    }
    let layout = Arc::new(config.layout().expect("layout"));

    let (bank, relays) = SimulatedRelayBank::new(32);
    tokio::spawn(bank.run());
    let actuator: Arc<dyn Actuator> = Arc::new(relays.clone());
    let (atn_outbound, atn) = mpsc::channel(32);

    let collaborators = Collaborators {
        forecasts: Arc::new(FlatForecastProvider::from_config(&config.planner)),
        bids: Arc::new(LogBidSink),
        reports: Arc::new(LogReportSink),
        actuators: HashMap::from([(ActorClass::HpBoss, actuator.clone()), (ActorClass::Relay, actuator)]),
        atn_outbound,
    };
    let actors = spawn_actors(&config, layout, collaborators).expect("actors start");
    Stack { actors, relays, atn }
}
