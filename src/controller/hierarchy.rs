//! Top-level authority machine and the control state it owns.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, warn};

use super::fsm::{ControlEvent, Step};
use super::mode::ModeState;
use crate::dispatch::{ActuatorCommand, FsmAtomicReport};
use crate::domain::{ActuatorAction, AquastatControl, EnumMeta, HeatPumpControl, SeasonalStorageMode};

pub const TOP_MACHINE: &str = "auto";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum MainAutoState {
    #[default]
    LocalControl,
    LeafTransactiveNode,
    Dormant,
}

impl EnumMeta for MainAutoState {
    const ENUM_NAME: &'static str = "main.auto.state";
    const VERSION: &'static str = "000";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TopEvent {
    ContractActive,
    /// Grace expiry, release or any terminal contract outcome
    AuthorityLost,
    GoDormant,
    WakeUp { contract_active: bool },
}

/// `LocalControl <-> LeafTransactiveNode` follows authority, either goes
/// `Dormant`, and waking picks the side the contract dictates. Authority
/// changes while dormant are ignored here; the caller remembers the contract.
pub fn apply_top(state: MainAutoState, event: TopEvent) -> Step<MainAutoState> {
    use MainAutoState::*;

    let to = match (state, event) {
        (LocalControl, TopEvent::ContractActive) => LeafTransactiveNode,
        (LeafTransactiveNode, TopEvent::AuthorityLost) => LocalControl,
        (LocalControl | LeafTransactiveNode, TopEvent::GoDormant) => Dormant,
        (Dormant, TopEvent::WakeUp { contract_active: true }) => LeafTransactiveNode,
        (Dormant, TopEvent::WakeUp { contract_active: false }) => LocalControl,
        _ => return Step::Ignored,
    };
    Step::moved(to, vec![])
}

/// Everything the hierarchy actor mutates, changed only through the
/// transition methods below
#[derive(Debug, Clone)]
pub struct ControlState {
    pub top: MainAutoState,
    pub sub: ModeState,
    pub last_transition: DateTime<Utc>,
    /// Commands queued by transitions and not yet acknowledged
    pub pending_actions: VecDeque<ActuatorCommand>,
    /// Heat pump and aquastat were handed to their failsafe controllers and
    /// have to be taken back before the next operating state means anything
    pub failsafe_legs: bool,
}

impl ControlState {
    pub fn new(mode: SeasonalStorageMode, now: DateTime<Utc>) -> Self {
        Self {
            top: MainAutoState::default_value(),
            sub: ModeState::initial(mode),
            last_transition: now,
            pending_actions: VecDeque::new(),
            failsafe_legs: false,
        }
    }

    pub fn apply_top(&mut self, event: TopEvent, now: DateTime<Utc>) -> Option<FsmAtomicReport> {
        match apply_top(self.top, event) {
            Step::Moved { to, .. } => {
                let report = FsmAtomicReport::new(TOP_MACHINE, self.top, event, to, &[]);
                debug!(from = %self.top, %to, %event, "top-level transition");
                self.top = to;
                self.last_transition = now;
                Some(report)
            }
            Step::Ignored => {
                debug!(state = %self.top, %event, "top-level event has no effect");
                None
            }
        }
    }

    /// Apply one event to the storage-mode machine, stamping its actions
    /// into commands and queueing them.
    ///
    /// Going dormant drops undelivered commands and leaves every relay where
    /// it is: the node is handed to an operator, so a running heat pump keeps
    /// running until someone else switches it.
    pub fn apply_sub(
        &mut self,
        event: ControlEvent,
        now: DateTime<Utc>,
        mut stamp: impl FnMut(ActuatorAction) -> ActuatorCommand,
    ) -> Option<FsmAtomicReport> {
        let machine = self.sub.machine_name();
        match self.sub.apply(event) {
            Step::Moved { to, mut actions } => {
                if to.is_dormant() {
                    self.pending_actions.clear();
                } else if self.failsafe_legs {
                    let mut reclaim = vec![ActuatorAction::ChangeHeatPumpControl {
                        to: HeatPumpControl::SwitchToScada,
                    }];
                    if !to.on_oil_boiler() {
                        reclaim.push(ActuatorAction::ChangeAquastatControl {
                            to: AquastatControl::SwitchToScada,
                        });
                    }
                    reclaim.append(&mut actions);
                    actions = reclaim;
                    self.failsafe_legs = false;
                }
                let commands: Vec<ActuatorCommand> = actions.into_iter().map(&mut stamp).collect();
                let report = FsmAtomicReport::new(machine, self.sub, event, to, &commands);
                debug!(machine, from = %self.sub, %to, %event, actions = commands.len(), "transition");
                self.pending_actions.extend(commands);
                self.sub = to;
                self.last_transition = now;
                Some(report)
            }
            Step::Ignored => {
                warn!(machine, state = %self.sub, %event, "UnrecognizedFsmEvent: no transition defined, ignoring");
                None
            }
        }
    }

    /// Drop whatever was queued, move to the heat-pump-off sub-state and
    /// queue the failsafe actions
    pub fn force_safe(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
        stamp: impl FnMut(ActuatorAction) -> ActuatorCommand,
    ) -> FsmAtomicReport {
        let safe = ModeState::safe_default(self.sub.mode());
        let commands: Vec<ActuatorCommand> = ActuatorAction::failsafe_set().into_iter().map(stamp).collect();
        let report = FsmAtomicReport::new(self.sub.machine_name(), self.sub, reason, safe, &commands);
        self.pending_actions.clear();
        self.pending_actions.extend(commands);
        self.sub = safe;
        self.failsafe_legs = true;
        self.last_transition = now;
        report
    }
}
