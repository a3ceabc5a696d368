//! Heat pump and store control when every tank is active storage.
//!
//! Relay positions: `HpScadaOps` closed runs the heat pump,
//! `StoreChargeDischarge` closed charges the store and open discharges it,
//! `StorePump` closed circulates the store loop.
//!
//! | from                 | event                         | to                          |
//! |----------------------|-------------------------------|-----------------------------|
//! | Initializing         | ChargeBuffer                  | HpOnStoreOff                |
//! | Initializing         | ChargeStorage                 | HpOnStoreCharge             |
//! | Initializing         | BufferFull, NoMoreElec        | HpOffStoreOff               |
//! | Initializing         | DischargeStorage              | HpOffStoreDischarge         |
//! | HpOnStoreOff         | BufferFull, NoMoreElec        | HpOffStoreOff               |
//! | HpOnStoreOff         | ChargeStorage                 | HpOnStoreCharge             |
//! | HpOnStoreCharge      | StorageFull, NoMoreElec       | HpOffStoreOff               |
//! | HpOnStoreCharge      | ChargeBuffer                  | HpOnStoreOff                |
//! | HpOffStoreOff        | ChargeBuffer                  | HpOnStoreOff                |
//! | HpOffStoreOff        | ChargeStorage                 | HpOnStoreCharge             |
//! | HpOffStoreOff        | DischargeStorage              | HpOffStoreDischarge         |
//! | HpOffStoreDischarge  | BufferFull                    | HpOffStoreOff               |
//! | HpOffStoreDischarge  | ChargeBuffer                  | HpOnStoreOff                |
//! | HpOffStoreDischarge  | ChargeStorage                 | HpOnStoreCharge             |
//! | any operating state  | StartHackOil                  | HpOffOilBoilerTankAquastat  |
//! | HpOffOilBoiler...    | StopHackOil                   | HpOffStoreOff               |
//! | any but Dormant      | GoDormant                     | Dormant                     |
//! | Dormant              | WakeUp                        | Initializing                |
//!
//! Every other pair is ignored.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::fsm::{ControlEvent, Step};
use crate::domain::{ActuatorAction, AquastatControl, HeatPumpControl, PrimaryPumpControl, RelayName};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum AllTanksState {
    #[default]
    Initializing,
    HpOnStoreOff,
    HpOnStoreCharge,
    HpOffStoreOff,
    HpOffStoreDischarge,
    HpOffOilBoilerTankAquastat,
    Dormant,
}

impl AllTanksState {
    pub fn heat_pump_on(&self) -> bool {
        matches!(self, Self::HpOnStoreOff | Self::HpOnStoreCharge)
    }
}

pub fn apply(state: AllTanksState, event: ControlEvent) -> Step<AllTanksState> {
    use AllTanksState::*;
    use ControlEvent as E;

    let to = match (state, event) {
        (Dormant, E::WakeUp) => return Step::moved(Initializing, vec![]),
        (Dormant, _) | (_, E::WakeUp) => return Step::Ignored,
        (_, E::GoDormant) => return Step::moved(Dormant, vec![]),

        (Initializing | HpOffStoreOff | HpOffStoreDischarge, E::ChargeBuffer) => HpOnStoreOff,
        (HpOnStoreCharge, E::ChargeBuffer) => HpOnStoreOff,
        (Initializing | HpOnStoreOff | HpOffStoreOff | HpOffStoreDischarge, E::ChargeStorage) => HpOnStoreCharge,
        (Initializing | HpOnStoreOff, E::BufferFull | E::NoMoreElec) => HpOffStoreOff,
        (HpOnStoreCharge, E::StorageFull | E::NoMoreElec) => HpOffStoreOff,
        (HpOffStoreDischarge, E::BufferFull) => HpOffStoreOff,
        (Initializing | HpOffStoreOff, E::DischargeStorage) => HpOffStoreDischarge,
        (HpOffOilBoilerTankAquastat, E::StopHackOil) => HpOffStoreOff,
        (HpOffOilBoilerTankAquastat, _) => return Step::Ignored,
        (_, E::StartHackOil) => HpOffOilBoilerTankAquastat,
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

fn entry_actions(state: AllTanksState) -> Vec<ActuatorAction> {
    use AllTanksState::*;

    match state {
        HpOnStoreOff => vec![
            ActuatorAction::close(RelayName::HpScadaOps),
            ActuatorAction::open(RelayName::StorePump),
            ActuatorAction::ChangePrimaryPumpControl {
                to: PrimaryPumpControl::SwitchToHeatPump,
            },
        ],
        HpOnStoreCharge => vec![
            ActuatorAction::close(RelayName::HpScadaOps),
            ActuatorAction::close(RelayName::StoreChargeDischarge),
            ActuatorAction::close(RelayName::StorePump),
            ActuatorAction::ChangePrimaryPumpControl {
                to: PrimaryPumpControl::SwitchToHeatPump,
            },
        ],
        HpOffStoreOff => vec![
            ActuatorAction::open(RelayName::HpScadaOps),
            ActuatorAction::open(RelayName::StorePump),
        ],
        HpOffStoreDischarge => vec![
            ActuatorAction::open(RelayName::HpScadaOps),
            ActuatorAction::open(RelayName::StoreChargeDischarge),
            ActuatorAction::close(RelayName::StorePump),
            ActuatorAction::ChangePrimaryPumpControl {
                to: PrimaryPumpControl::SwitchToScada,
            },
        ],
        HpOffOilBoilerTankAquastat => vec![
            ActuatorAction::open(RelayName::HpScadaOps),
            ActuatorAction::open(RelayName::StorePump),
            ActuatorAction::ChangeAquastatControl {
                to: AquastatControl::SwitchToBoiler,
            },
        ],
        Initializing | Dormant => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;
    use AllTanksState::*;

    #[rstest]
    #[case(Initializing, ControlEvent::ChargeBuffer, HpOnStoreOff)]
    #[case(Initializing, ControlEvent::ChargeStorage, HpOnStoreCharge)]
    #[case(Initializing, ControlEvent::NoMoreElec, HpOffStoreOff)]
    #[case(Initializing, ControlEvent::DischargeStorage, HpOffStoreDischarge)]
    #[case(HpOnStoreOff, ControlEvent::BufferFull, HpOffStoreOff)]
    #[case(HpOnStoreOff, ControlEvent::ChargeStorage, HpOnStoreCharge)]
    #[case(HpOnStoreCharge, ControlEvent::StorageFull, HpOffStoreOff)]
    #[case(HpOnStoreCharge, ControlEvent::NoMoreElec, HpOffStoreOff)]
    #[case(HpOnStoreCharge, ControlEvent::ChargeBuffer, HpOnStoreOff)]
    #[case(HpOffStoreOff, ControlEvent::ChargeBuffer, HpOnStoreOff)]
    #[case(HpOffStoreOff, ControlEvent::DischargeStorage, HpOffStoreDischarge)]
    #[case(HpOffStoreDischarge, ControlEvent::BufferFull, HpOffStoreOff)]
    #[case(HpOffStoreDischarge, ControlEvent::ChargeStorage, HpOnStoreCharge)]
    #[case(HpOnStoreCharge, ControlEvent::StartHackOil, HpOffOilBoilerTankAquastat)]
    #[case(HpOffOilBoilerTankAquastat, ControlEvent::StopHackOil, HpOffStoreOff)]
    #[case(HpOffStoreDischarge, ControlEvent::GoDormant, Dormant)]
    #[case(Dormant, ControlEvent::WakeUp, Initializing)]
    fn test_defined_transitions(#[case] from: AllTanksState, #[case] event: ControlEvent, #[case] to: AllTanksState) {
        match apply(from, event) {
            Step::Moved { to: reached, .. } => assert_eq!(reached, to),
            Step::Ignored => panic!("{from} + {event} should be defined"),
        }
    }

    #[rstest]
    #[case(HpOnStoreOff, ControlEvent::DischargeStorage)]
    #[case(HpOnStoreCharge, ControlEvent::ChargeStorage)]
    #[case(HpOffStoreOff, ControlEvent::BufferFull)]
    #[case(HpOffStoreDischarge, ControlEvent::NoMoreElec)]
    #[case(HpOffOilBoilerTankAquastat, ControlEvent::ChargeBuffer)]
    #[case(HpOffOilBoilerTankAquastat, ControlEvent::StartHackOil)]
    fn test_documented_noops(#[case] from: AllTanksState, #[case] event: ControlEvent) {
        assert!(apply(from, event).is_ignored());
    }

    #[test]
    fn test_store_discharge_actions() {
        let Step::Moved { actions, .. } = apply(HpOffStoreOff, ControlEvent::DischargeStorage) else {
            panic!("expected transition");
        };
        assert!(actions.contains(&ActuatorAction::open(RelayName::StoreChargeDischarge)));
        assert!(actions.contains(&ActuatorAction::close(RelayName::StorePump)));
        assert!(actions.contains(&ActuatorAction::open(RelayName::HpScadaOps)));
    }

    #[test]
    fn test_leaving_oil_boiler_returns_aquastat_to_scada() {
        let Step::Moved { actions, .. } = apply(HpOffOilBoilerTankAquastat, ControlEvent::StopHackOil) else {
            panic!("expected transition");
        };
        assert_eq!(
            actions[0],
            ActuatorAction::ChangeAquastatControl { to: AquastatControl::SwitchToScada }
        );
    }

    #[test]
    fn test_no_state_leaves_heat_pump_relay_unset() {
        for state in AllTanksState::iter() {
            for event in ControlEvent::iter() {
                if let Step::Moved { to, actions } = apply(state, event) {
                    if !matches!(to, Dormant | Initializing) {
                        let relay_set = actions.iter().any(|a| {
                            matches!(a, ActuatorAction::ChangeRelayState { relay: RelayName::HpScadaOps, .. })
                        });
                        assert!(relay_set, "{state} + {event} -> {to} leaves HpScadaOps untouched");
                    }
                }
            }
        }
    }
}
