use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{ContractEvent, ContractOutcome, ContractStatus, ContractTerms, Party};
use crate::domain::Versioned;

/// Contract traffic between SCADA and the ATN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum ContractMessage {
    Propose {
        contract_id: Uuid,
        terms: ContractTerms,
        sent_at: DateTime<Utc>,
    },
    Acknowledge {
        contract_id: Uuid,
        sent_at: DateTime<Utc>,
    },
    Confirm {
        contract_id: Uuid,
        sent_at: DateTime<Utc>,
    },
    /// ATN heartbeat for an active contract
    Renew {
        contract_id: Uuid,
        sent_at: DateTime<Utc>,
    },
    Terminate {
        contract_id: Uuid,
        by: Party,
        sent_at: DateTime<Utc>,
    },
    Complete {
        contract_id: Uuid,
        outcome: ContractOutcome,
        observer: Party,
        sent_at: DateTime<Utc>,
    },
}

impl Versioned for ContractMessage {
    const TYPE_NAME: &'static str = "slow.dispatch.contract.message";
    const VERSION: &'static str = "000";
}

impl ContractMessage {
    pub fn contract_id(&self) -> Uuid {
        match self {
            Self::Propose { contract_id, .. }
            | Self::Acknowledge { contract_id, .. }
            | Self::Confirm { contract_id, .. }
            | Self::Renew { contract_id, .. }
            | Self::Terminate { contract_id, .. }
            | Self::Complete { contract_id, .. } => *contract_id,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Self::Propose { sent_at, .. }
            | Self::Acknowledge { sent_at, .. }
            | Self::Confirm { sent_at, .. }
            | Self::Renew { sent_at, .. }
            | Self::Terminate { sent_at, .. }
            | Self::Complete { sent_at, .. } => *sent_at,
        }
    }

    /// Lifecycle event carried by this message, `None` for proposals
    pub fn event(&self) -> Option<ContractEvent> {
        match self {
            Self::Propose { .. } => None,
            Self::Acknowledge { .. } => Some(ContractEvent::Acknowledge),
            Self::Confirm { .. } => Some(ContractEvent::Confirm),
            Self::Renew { .. } => Some(ContractEvent::Renew),
            Self::Terminate { by, .. } => Some(ContractEvent::Terminate { by: *by }),
            Self::Complete { outcome, observer, .. } => Some(ContractEvent::Complete {
                outcome: *outcome,
                observer: *observer,
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Propose { .. } => "Propose",
            Self::Acknowledge { .. } => "Acknowledge",
            Self::Confirm { .. } => "Confirm",
            Self::Renew { .. } => "Renew",
            Self::Terminate { .. } => "Terminate",
            Self::Complete { .. } => "Complete",
        }
    }
}

/// Snapshot of the contract the control hierarchy follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveContract {
    pub contract_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub avg_power_watts: f64,
    pub oil_boiler_on: bool,
}

/// Authority changes pushed to the control hierarchy
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorityEvent {
    ContractActive(ActiveContract),
    ContractEnded { contract_id: Uuid, status: ContractStatus },
    /// No message arrived before the grace deadline
    GraceExpired { contract_id: Uuid, status: ContractStatus },
}

impl AuthorityEvent {
    pub fn contract_id(&self) -> Uuid {
        match self {
            Self::ContractActive(active) => active.contract_id,
            Self::ContractEnded { contract_id, .. } | Self::GraceExpired { contract_id, .. } => *contract_id,
        }
    }
}
