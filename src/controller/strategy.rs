//! Chooses the next storage-mode event from sensor readings, the current
//! plan hour and, under a contract, the remaining energy budget.
//!
//! Pure functions only. The hierarchy actor feeds the chosen event to the
//! machines, so every rule here can be tested without a runtime.

use super::all_tanks::AllTanksState;
use super::buffer_only::BufferOnlyState;
use super::fsm::ControlEvent;
use super::hierarchy::MainAutoState;
use super::mode::ModeState;
use crate::config::ControllerConfig;
use crate::optimizer::{PlanEntry, StorageAction};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub buffer_kwh: f64,
    pub store_kwh: Option<f64>,
}

/// Electrical energy the active contract allows up to now, and what the
/// heat pump has drawn against it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractBudget {
    pub allowed_kwh: f64,
    pub used_kwh: f64,
    pub oil_boiler_on: bool,
}

impl ContractBudget {
    pub fn exhausted(&self) -> bool {
        self.used_kwh >= self.allowed_kwh
    }
}

/// Plan hint for the current hour
#[derive(Debug, Clone, Copy, Default)]
struct PlanHint {
    charge_store: bool,
    heat_pump_on: bool,
}

impl PlanHint {
    fn from_entry(entry: Option<&PlanEntry>) -> Option<Self> {
        entry.map(|e| Self {
            charge_store: e.action == StorageAction::Charge,
            heat_pump_on: e.heat_pump_on,
        })
    }
}

pub fn next_event(
    top: MainAutoState,
    sub: ModeState,
    readings: Readings,
    plan_hour: Option<&PlanEntry>,
    budget: Option<&ContractBudget>,
    limits: &ControllerConfig,
) -> Option<ControlEvent> {
    if sub.is_dormant() {
        return None;
    }
    match top {
        MainAutoState::Dormant => None,
        MainAutoState::LocalControl => {
            if sub.on_oil_boiler() {
                return Some(ControlEvent::StopHackOil);
            }
            let hint = PlanHint::from_entry(plan_hour);
            match sub {
                ModeState::BufferOnly(state) => local_buffer_only(state, readings, limits),
                ModeState::AllTanks(state) => local_all_tanks(state, readings, hint, limits),
            }
        }
        MainAutoState::LeafTransactiveNode => {
            // Without a budget there is nothing to spend
            let budget = budget.copied().unwrap_or(ContractBudget {
                allowed_kwh: 0.0,
                used_kwh: 0.0,
                oil_boiler_on: false,
            });
            match (budget.oil_boiler_on, sub.on_oil_boiler()) {
                (true, false) => return Some(ControlEvent::StartHackOil),
                (false, true) => return Some(ControlEvent::StopHackOil),
                (true, true) => return None,
                (false, false) => {}
            }
            match sub {
                ModeState::BufferOnly(state) => leaf_buffer_only(state, readings, &budget, limits),
                ModeState::AllTanks(state) => leaf_all_tanks(state, readings, &budget, limits),
            }
        }
    }
}

fn local_buffer_only(state: BufferOnlyState, r: Readings, limits: &ControllerConfig) -> Option<ControlEvent> {
    use BufferOnlyState::*;

    let low = r.buffer_kwh <= limits.buffer_low_kwh;
    let full = r.buffer_kwh >= limits.buffer_full_kwh;
    match state {
        Initializing if low => Some(ControlEvent::ChargeBuffer),
        Initializing if full => Some(ControlEvent::BufferFull),
        Initializing => Some(ControlEvent::NoMoreElec),
        HpOn if full => Some(ControlEvent::BufferFull),
        HpOff if low => Some(ControlEvent::ChargeBuffer),
        _ => None,
    }
}

fn local_all_tanks(
    state: AllTanksState,
    r: Readings,
    hint: Option<PlanHint>,
    limits: &ControllerConfig,
) -> Option<ControlEvent> {
    use AllTanksState::*;

    let store = r.store_kwh.unwrap_or_default();
    let buffer_low = r.buffer_kwh <= limits.buffer_low_kwh;
    let buffer_full = r.buffer_kwh >= limits.buffer_full_kwh;
    let store_low = store <= limits.store_low_kwh;
    let store_full = store >= limits.store_full_kwh;
    let charge_store = hint.is_some_and(|h| h.charge_store) && !store_full;
    // No plan means the heat pump is free to run
    let hp_allowed = hint.map_or(true, |h| h.heat_pump_on);

    match state {
        Initializing if buffer_low => Some(ControlEvent::ChargeBuffer),
        Initializing if charge_store => Some(ControlEvent::ChargeStorage),
        Initializing if buffer_full => Some(ControlEvent::BufferFull),
        Initializing => Some(ControlEvent::NoMoreElec),

        HpOnStoreOff if buffer_full && charge_store => Some(ControlEvent::ChargeStorage),
        HpOnStoreOff if buffer_full => Some(ControlEvent::BufferFull),

        HpOnStoreCharge if store_full => Some(ControlEvent::StorageFull),
        HpOnStoreCharge if buffer_low => Some(ControlEvent::ChargeBuffer),
        HpOnStoreCharge if !hp_allowed => Some(ControlEvent::NoMoreElec),

        HpOffStoreOff if buffer_low && !hp_allowed && !store_low => Some(ControlEvent::DischargeStorage),
        HpOffStoreOff if buffer_low => Some(ControlEvent::ChargeBuffer),
        HpOffStoreOff if charge_store => Some(ControlEvent::ChargeStorage),

        HpOffStoreDischarge if buffer_full => Some(ControlEvent::BufferFull),
        HpOffStoreDischarge if store_low => Some(ControlEvent::ChargeBuffer),
        _ => None,
    }
}

fn leaf_buffer_only(
    state: BufferOnlyState,
    r: Readings,
    budget: &ContractBudget,
    limits: &ControllerConfig,
) -> Option<ControlEvent> {
    use BufferOnlyState::*;

    let full = r.buffer_kwh >= limits.buffer_full_kwh;
    if budget.exhausted() {
        return match state {
            Initializing | HpOn => Some(ControlEvent::NoMoreElec),
            _ => None,
        };
    }
    match state {
        Initializing if full => Some(ControlEvent::BufferFull),
        Initializing | HpOff if !full => Some(ControlEvent::ChargeBuffer),
        HpOn if full => Some(ControlEvent::BufferFull),
        _ => None,
    }
}

fn leaf_all_tanks(
    state: AllTanksState,
    r: Readings,
    budget: &ContractBudget,
    limits: &ControllerConfig,
) -> Option<ControlEvent> {
    use AllTanksState::*;

    let store = r.store_kwh.unwrap_or_default();
    let buffer_low = r.buffer_kwh <= limits.buffer_low_kwh;
    let buffer_full = r.buffer_kwh >= limits.buffer_full_kwh;
    let store_low = store <= limits.store_low_kwh;
    let store_full = store >= limits.store_full_kwh;

    if budget.exhausted() {
        return match state {
            Initializing | HpOnStoreOff | HpOnStoreCharge => Some(ControlEvent::NoMoreElec),
            HpOffStoreOff if buffer_low && !store_low => Some(ControlEvent::DischargeStorage),
            HpOffStoreDischarge if buffer_full || store_low => Some(ControlEvent::BufferFull),
            _ => None,
        };
    }

    // Buffer first, then the store, then stop
    match state {
        HpOnStoreOff if !buffer_full => None,
        _ if !buffer_full => Some(ControlEvent::ChargeBuffer),
        HpOnStoreCharge if !store_full => None,
        _ if !store_full => Some(ControlEvent::ChargeStorage),
        HpOnStoreCharge => Some(ControlEvent::StorageFull),
        Initializing | HpOnStoreOff | HpOffStoreDischarge => Some(ControlEvent::BufferFull),
        _ => None,
    }
}
