use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, NormalError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::controller::HierarchyHandle;
use crate::dispatch::{RelayBankHandle, RelayBankSnapshot};
use crate::domain::{
    ActuatorAction, ActuatorTarget, ChannelRole, HeatPumpControl, Layout, RelayChange, RelayName, SensorBatch,
    SensorReading,
};
use crate::mailbox::MailboxClosed;

/// Tank aquastat band used while the heat pump is on failsafe control
const AQUASTAT_ON_FRACTION: f64 = 0.3;
const AQUASTAT_OFF_FRACTION: f64 = 0.9;

/// Relay positions the plant reacts to
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlantInputs {
    pub hp_relay_closed: bool,
    pub hp_on_scada: bool,
    pub store_charging: bool,
    pub store_pump_on: bool,
}

impl PlantInputs {
    pub fn from_snapshot(snapshot: &RelayBankSnapshot) -> Self {
        let closed = |relay| {
            matches!(
                snapshot.action_for(ActuatorTarget::Relay(relay)),
                Some(ActuatorAction::ChangeRelayState {
                    change: RelayChange::CloseRelay,
                    ..
                })
            )
        };
        Self {
            hp_relay_closed: closed(RelayName::HpScadaOps),
            hp_on_scada: matches!(
                snapshot.action_for(ActuatorTarget::HeatPumpControl),
                Some(ActuatorAction::ChangeHeatPumpControl {
                    to: HeatPumpControl::SwitchToScada
                })
            ),
            store_charging: closed(RelayName::StoreChargeDischarge),
            store_pump_on: closed(RelayName::StorePump),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantState {
    pub buffer_kwh: f64,
    pub store_kwh: f64,
    pub hp_running: bool,
    pub load_kw: f64,
}

/// Buffer and store energy balance.
///
/// The heat pump feeds the buffer, or the store while it charges with the
/// store pump on. A discharging store moves heat into the buffer. The house
/// load always draws from the buffer.
pub struct TankPlant {
    config: SimulationConfig,
    state: PlantState,
    load: Normal<f64>,
    rng: rand::rngs::StdRng,
}

impl TankPlant {
    pub fn new(config: SimulationConfig) -> Result<Self, NormalError> {
        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        let load = Normal::new(config.load_kw, config.load_std_dev_kw)?;
        let state = PlantState {
            buffer_kwh: config.initial_buffer_kwh.min(config.buffer_capacity_kwh),
            store_kwh: config.initial_store_kwh.min(config.store_capacity_kwh),
            hp_running: false,
            load_kw: config.load_kw,
        };
        Ok(Self {
            config,
            state,
            load,
            rng,
        })
    }

    pub fn state(&self) -> &PlantState {
        &self.state
    }

    fn heat_pump_on(&self, inputs: &PlantInputs) -> bool {
        if inputs.hp_on_scada {
            return inputs.hp_relay_closed;
        }
        // Failsafe: the tank aquastat runs the heat pump with hysteresis
        let fill = self.state.buffer_kwh / self.config.buffer_capacity_kwh;
        if self.state.hp_running {
            fill < AQUASTAT_OFF_FRACTION
        } else {
            fill < AQUASTAT_ON_FRACTION
        }
    }

    /// Advance the plant by `dt` with the given relay positions
    pub fn step(&mut self, inputs: &PlantInputs, dt: Duration) -> PlantState {
        let hours = dt.as_secs_f64() / 3600.0;
        let hp_running = self.heat_pump_on(inputs);
        let load_kw = self.load.sample(&mut self.rng).max(0.0);

        let hp_kwh = if hp_running {
            self.config.heat_pump_output_kw * hours
        } else {
            0.0
        };
        let mut to_buffer = hp_kwh;
        let mut store = self.state.store_kwh;
        if inputs.store_pump_on {
            let transfer = self.config.store_transfer_kw * hours;
            if inputs.store_charging {
                let room = self.config.store_capacity_kwh - store;
                let moved = hp_kwh.min(transfer).min(room).max(0.0);
                store += moved;
                to_buffer -= moved;
            } else {
                let moved = transfer.min(store);
                store -= moved;
                to_buffer += moved;
            }
        }

        let buffer = (self.state.buffer_kwh + to_buffer - load_kw * hours).clamp(0.0, self.config.buffer_capacity_kwh);
        self.state = PlantState {
            buffer_kwh: buffer,
            store_kwh: store.clamp(0.0, self.config.store_capacity_kwh),
            hp_running,
            load_kw,
        };
        self.state
    }
}

/// Steps a [`TankPlant`] against the relay bank and reports the tank
/// energies to the control hierarchy until either side goes away
pub struct PlantSimulator {
    plant: TankPlant,
    step: Duration,
    relays: RelayBankHandle,
    hierarchy: HierarchyHandle,
    buffer_channel: Option<String>,
    store_channel: Option<String>,
}

impl PlantSimulator {
    pub fn new(
        config: SimulationConfig,
        layout: &Layout,
        relays: RelayBankHandle,
        hierarchy: HierarchyHandle,
    ) -> Result<Self, NormalError> {
        let channel = |role| layout.channel_for_role(role).map(|spec| spec.name.clone());
        Ok(Self {
            step: config.step(),
            plant: TankPlant::new(config)?,
            relays,
            hierarchy,
            buffer_channel: channel(ChannelRole::BufferEnergy),
            store_channel: channel(ChannelRole::StoreEnergy),
        })
    }

    fn batch(&self, state: &PlantState, now: DateTime<Utc>) -> SensorBatch {
        let reading = |channel: &Option<String>, value| {
            channel.as_ref().map(|name| SensorReading {
                channel: name.clone(),
                value,
                timestamp: now,
            })
        };
        SensorBatch {
            readings: [
                reading(&self.buffer_channel, state.buffer_kwh),
                reading(&self.store_channel, state.store_kwh),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }

    async fn tick(&mut self) -> Result<(), MailboxClosed> {
        let snapshot = self.relays.snapshot().await?;
        let inputs = PlantInputs::from_snapshot(&snapshot);
        let state = self.plant.step(&inputs, self.step);
        debug!(
            buffer_kwh = state.buffer_kwh,
            store_kwh = state.store_kwh,
            hp = state.hp_running,
            load_kw = state.load_kw,
            "plant stepped"
        );
        self.hierarchy.sensors(self.batch(&state, Utc::now())).await
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.step);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(step_secs = self.step.as_secs(), "plant simulator started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                info!(reason = %e, "plant simulator stopped");
                break;
            }
        }
    }
}
