use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::enums::{AquastatControl, HeatPumpControl, HeatcallSource, PrimaryPumpControl, RelayChange};

/// Relays switched directly by the control hierarchy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum RelayName {
    /// Closed: heat pump runs. Open: heat pump off.
    HpScadaOps,
    /// Closed: store charges from the heat pump loop. Open: store discharges.
    StoreChargeDischarge,
    /// Closed: store pump runs
    StorePump,
}

/// Physical control point an action changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActuatorTarget {
    Relay(RelayName),
    AquastatControl,
    HeatPumpControl,
    PrimaryPumpControl,
    HeatcallSource,
}

impl ActuatorTarget {
    pub fn all() -> Vec<ActuatorTarget> {
        RelayName::iter()
            .map(ActuatorTarget::Relay)
            .chain([
                ActuatorTarget::AquastatControl,
                ActuatorTarget::HeatPumpControl,
                ActuatorTarget::PrimaryPumpControl,
                ActuatorTarget::HeatcallSource,
            ])
            .collect()
    }
}

impl fmt::Display for ActuatorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay(relay) => write!(f, "relay:{relay}"),
            Self::AquastatControl => write!(f, "aquastat-ctrl"),
            Self::HeatPumpControl => write!(f, "hp-failsafe"),
            Self::PrimaryPumpControl => write!(f, "primary-pump-failsafe"),
            Self::HeatcallSource => write!(f, "heatcall-source"),
        }
    }
}

/// The closed vocabulary of actuator changes a transition may queue.
///
/// Every action is idempotent: applying it twice leaves the target in the
/// same position as applying it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum ActuatorAction {
    ChangeRelayState { relay: RelayName, change: RelayChange },
    ChangeAquastatControl { to: AquastatControl },
    ChangeHeatPumpControl { to: HeatPumpControl },
    ChangePrimaryPumpControl { to: PrimaryPumpControl },
    ChangeHeatcallSource { to: HeatcallSource },
}

impl ActuatorAction {
    pub fn open(relay: RelayName) -> Self {
        Self::ChangeRelayState {
            relay,
            change: RelayChange::OpenRelay,
        }
    }

    pub fn close(relay: RelayName) -> Self {
        Self::ChangeRelayState {
            relay,
            change: RelayChange::CloseRelay,
        }
    }

    pub fn target(&self) -> ActuatorTarget {
        match self {
            Self::ChangeRelayState { relay, .. } => ActuatorTarget::Relay(*relay),
            Self::ChangeAquastatControl { .. } => ActuatorTarget::AquastatControl,
            Self::ChangeHeatPumpControl { .. } => ActuatorTarget::HeatPumpControl,
            Self::ChangePrimaryPumpControl { .. } => ActuatorTarget::PrimaryPumpControl,
            Self::ChangeHeatcallSource { .. } => ActuatorTarget::HeatcallSource,
        }
    }

    /// Actions that hand the plant back to its hard-wired failsafe controls
    /// with the heat pump off
    pub fn failsafe_set() -> Vec<ActuatorAction> {
        vec![
            Self::open(RelayName::HpScadaOps),
            Self::open(RelayName::StorePump),
            Self::ChangeHeatPumpControl {
                to: HeatPumpControl::SwitchToTankAquastat,
            },
            Self::ChangeHeatcallSource {
                to: HeatcallSource::SwitchToWallThermostat,
            },
            Self::ChangeAquastatControl {
                to: AquastatControl::SwitchToBoiler,
            },
        ]
    }
}

impl fmt::Display for ActuatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangeRelayState { relay, change } => write!(f, "{relay}:{change}"),
            Self::ChangeAquastatControl { to } => write!(f, "AquastatCtrl:{to}"),
            Self::ChangeHeatPumpControl { to } => write!(f, "HpFailsafe:{to}"),
            Self::ChangePrimaryPumpControl { to } => write!(f, "PrimaryPumpFailsafe:{to}"),
            Self::ChangeHeatcallSource { to } => write!(f, "HeatcallSource:{to}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_action_has_a_known_target() {
        let targets: HashSet<_> = ActuatorTarget::all().into_iter().collect();
        for action in ActuatorAction::failsafe_set() {
            assert!(targets.contains(&action.target()));
        }
    }

    #[test]
    fn test_failsafe_turns_heat_pump_off() {
        assert!(ActuatorAction::failsafe_set().contains(&ActuatorAction::open(RelayName::HpScadaOps)));
    }

    #[test]
    fn test_action_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ActuatorAction::close(RelayName::StorePump)).unwrap();
        assert_eq!(
            json,
            r#"{"Kind":"ChangeRelayState","relay":"StorePump","change":"CloseRelay"}"#
        );
    }
}
