//! Dispatch contract lifecycle.
//!
//! ```text
//! Created -> Received -> Confirmed -> Active -> Completed* | Terminated*
//! ```
//!
//! Terminal statuses never change again. The grace deadline moves forward on
//! every accepted event and is what lets SCADA close a contract on its own
//! when the ATN goes silent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::EnumMeta;

#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("Contract {contract_id} is already terminal ({status})")]
    AlreadyTerminal {
        contract_id: Uuid,
        status: ContractStatus,
    },
    #[error("Contract {contract_id}: {event} not allowed while {status}")]
    ProtocolViolation {
        contract_id: Uuid,
        status: ContractStatus,
        event: String,
    },
    #[error("Unknown contract {0}")]
    UnknownContract(Uuid),
    #[error("Contract {contract_id} rejected: {reason}")]
    InvalidTerms { contract_id: Uuid, reason: String },
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ContractStatus {
    #[default]
    Created,
    Received,
    Confirmed,
    Active,
    TerminatedByLtn,
    TerminatedByScada,
    CompletedSuccess,
    CompletedFailureByScada,
    CompletedFailureByLtn,
    CompletedUnknownOutcome,
}

impl EnumMeta for ContractStatus {
    const ENUM_NAME: &'static str = "slow.dispatch.contract.status";
    const VERSION: &'static str = "000";
}

impl ContractStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Received | Self::Confirmed | Self::Active)
    }
}

/// Which side of the contract acted or observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Party {
    Atn,
    Scada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ContractOutcome {
    Success,
    Failure,
}

/// Terms proposed by the ATN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Average electrical power the heat pump may draw over the contract
    pub avg_power_watts: f64,
    /// Run on the oil boiler instead of the heat pump for the contract
    #[serde(default)]
    pub oil_boiler_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ContractEvent {
    Acknowledge,
    Confirm,
    Start,
    Renew,
    Terminate { by: Party },
    Complete { outcome: ContractOutcome, observer: Party },
    GraceExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchContract {
    pub contract_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ContractStatus,
    pub grace_end_time: DateTime<Utc>,
    pub terms: ContractTerms,
    pub last_message_at: DateTime<Utc>,
}

impl DispatchContract {
    pub fn new(contract_id: Uuid, terms: ContractTerms, now: DateTime<Utc>, grace_period: Duration) -> Self {
        Self {
            contract_id,
            created_at: now,
            status: ContractStatus::Created,
            grace_end_time: now + grace_period,
            terms,
            last_message_at: now,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.terms.start_time + Duration::minutes(self.terms.duration_minutes as i64)
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// A confirmed contract expects no traffic before it starts, so its
    /// grace period counts from the start time
    fn grace_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.status {
            ContractStatus::Confirmed => now.max(self.terms.start_time),
            _ => now,
        }
    }

    /// Apply one lifecycle event. On success the grace deadline is pushed
    /// `grace_period` past the event (or past the start time while
    /// confirmed); on error nothing changes.
    pub fn apply(
        &mut self,
        event: ContractEvent,
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> Result<ContractStatus, ContractError> {
        let next = next_status(self.contract_id, self.status, event)?;
        self.status = next;
        self.last_message_at = now;
        self.grace_end_time = self.grace_from(now) + grace_period;
        Ok(next)
    }
}

/// The lifecycle transition table
pub fn next_status(
    contract_id: Uuid,
    status: ContractStatus,
    event: ContractEvent,
) -> Result<ContractStatus, ContractError> {
    use ContractStatus::*;

    if status.is_terminal() {
        return Err(ContractError::AlreadyTerminal { contract_id, status });
    }

    let next = match (status, event) {
        (Created, ContractEvent::Acknowledge) => Received,
        (Received, ContractEvent::Confirm) => Confirmed,
        (Confirmed, ContractEvent::Start) => Active,
        (Active, ContractEvent::Renew) => Active,
        (_, ContractEvent::Terminate { by: Party::Atn }) => TerminatedByLtn,
        (_, ContractEvent::Terminate { by: Party::Scada }) => TerminatedByScada,
        (Active, ContractEvent::Complete { outcome: ContractOutcome::Success, .. }) => CompletedSuccess,
        (
            Active,
            ContractEvent::Complete {
                outcome: ContractOutcome::Failure,
                observer: Party::Scada,
            },
        ) => CompletedFailureByScada,
        (
            Active,
            ContractEvent::Complete {
                outcome: ContractOutcome::Failure,
                observer: Party::Atn,
            },
        ) => CompletedFailureByLtn,
        (Active, ContractEvent::GraceExpired) => CompletedUnknownOutcome,
        (_, ContractEvent::GraceExpired) => TerminatedByScada,
        (status, event) => {
            return Err(ContractError::ProtocolViolation {
                contract_id,
                status,
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}
