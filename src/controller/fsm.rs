use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::domain::ActuatorAction;

/// Events understood by the storage-mode machines. Each machine documents
/// which pairs it ignores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ControlEvent {
    NoMoreElec,
    BufferFull,
    ChargeBuffer,
    ChargeStorage,
    StorageFull,
    DischargeStorage,
    StartHackOil,
    StopHackOil,
    GoDormant,
    WakeUp,
}

/// Outcome of feeding one event to a machine
#[derive(Debug, Clone, PartialEq)]
pub enum Step<S> {
    Moved { to: S, actions: Vec<ActuatorAction> },
    /// Undefined `(state, event)` pair; nothing changes
    Ignored,
}

impl<S> Step<S> {
    pub fn moved(to: S, actions: Vec<ActuatorAction>) -> Self {
        Step::Moved { to, actions }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Step::Ignored)
    }

    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Step<T> {
        match self {
            Step::Moved { to, actions } => Step::Moved { to: f(to), actions },
            Step::Ignored => Step::Ignored,
        }
    }
}
