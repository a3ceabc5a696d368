//! Dispatch contracts between SCADA and the ATN: the lifecycle machine, its
//! wire messages, and the actor that runs the one contract in force.

pub mod manager;
pub mod messages;
pub mod state;
pub mod timer;

pub use manager::{ContractCommand, ContractHandle, ContractManager};
pub use messages::{ActiveContract, AuthorityEvent, ContractMessage};
pub use state::{
    next_status, ContractError, ContractEvent, ContractOutcome, ContractStatus, ContractTerms, DispatchContract, Party,
};
pub use timer::DeadlineTimer;
