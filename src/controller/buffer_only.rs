//! Heat pump control when only the buffer tank is active storage.
//!
//! | from                        | event                   | to                          |
//! |-----------------------------|-------------------------|-----------------------------|
//! | Initializing                | ChargeBuffer            | HpOn                        |
//! | Initializing                | BufferFull, NoMoreElec  | HpOff                       |
//! | HpOn                        | BufferFull, NoMoreElec  | HpOff                       |
//! | HpOff                       | ChargeBuffer            | HpOn                        |
//! | Initializing, HpOn, HpOff   | StartHackOil            | HpOffOilBoilerTankAquastat  |
//! | HpOffOilBoilerTankAquastat  | StopHackOil             | HpOff                       |
//! | any but Dormant             | GoDormant               | Dormant                     |
//! | Dormant                     | WakeUp                  | Initializing                |
//!
//! Every other pair is ignored, including storage events this mode has no
//! store for.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::fsm::{ControlEvent, Step};
use crate::domain::{ActuatorAction, AquastatControl, HeatPumpControl, RelayName};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum BufferOnlyState {
    #[default]
    Initializing,
    HpOn,
    HpOff,
    HpOffOilBoilerTankAquastat,
    Dormant,
}

impl BufferOnlyState {
    pub fn heat_pump_on(&self) -> bool {
        matches!(self, Self::HpOn)
    }
}

pub fn apply(state: BufferOnlyState, event: ControlEvent) -> Step<BufferOnlyState> {
    use BufferOnlyState::*;
    use ControlEvent as E;

    let to = match (state, event) {
        (Dormant, E::WakeUp) => return Step::moved(Initializing, vec![]),
        (Dormant, _) | (_, E::WakeUp) => return Step::Ignored,
        (_, E::GoDormant) => return Step::moved(Dormant, vec![]),

        (Initializing, E::ChargeBuffer) | (HpOff, E::ChargeBuffer) => HpOn,
        (Initializing, E::BufferFull | E::NoMoreElec) | (HpOn, E::BufferFull | E::NoMoreElec) => HpOff,
        (Initializing | HpOn | HpOff, E::StartHackOil) => HpOffOilBoilerTankAquastat,
        (HpOffOilBoilerTankAquastat, E::StopHackOil) => HpOff,
        _ => return Step::Ignored,
    };

    let mut actions = Vec::new();
    if state == Initializing {
        actions.push(ActuatorAction::ChangeHeatPumpControl {
            to: HeatPumpControl::SwitchToScada,
        });
    }
    if state == HpOffOilBoilerTankAquastat {
        actions.push(ActuatorAction::ChangeAquastatControl {
            to: AquastatControl::SwitchToScada,
        });
    }
    actions.extend(entry_actions(to));
    Step::moved(to, actions)
}

fn entry_actions(state: BufferOnlyState) -> Vec<ActuatorAction> {
    match state {
        BufferOnlyState::HpOn => vec![ActuatorAction::close(RelayName::HpScadaOps)],
        BufferOnlyState::HpOff => vec![ActuatorAction::open(RelayName::HpScadaOps)],
        BufferOnlyState::HpOffOilBoilerTankAquastat => vec![
            ActuatorAction::open(RelayName::HpScadaOps),
            ActuatorAction::ChangeAquastatControl {
                to: AquastatControl::SwitchToBoiler,
            },
        ],
        BufferOnlyState::Initializing | BufferOnlyState::Dormant => vec![],
    }
}
