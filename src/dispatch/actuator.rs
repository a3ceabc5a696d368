use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::{ActorClass, ActuatorAction, ActuatorTarget, UnixMs};
use crate::mailbox::MailboxClosed;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Actuator command {trigger_id} timed out after {after_ms} ms")]
    CommandTimeout { trigger_id: u64, after_ms: u64 },
    #[error("Actuator rejected command {trigger_id}: {reason}")]
    Rejected { trigger_id: u64, reason: String },
    #[error("No actuator registered for {target} (owner {owner:?})")]
    NoActuator {
        target: ActuatorTarget,
        owner: Option<ActorClass>,
    },
    #[error("Actuator channel closed: {0}")]
    ChannelClosed(#[from] MailboxClosed),
}

impl DispatchError {
    /// Routing errors will not go away by trying again
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoActuator { .. })
    }
}

/// One outbound actuator instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub trigger_id: u64,
    pub action: ActuatorAction,
    pub issued_at: UnixMs,
}

/// Hardware-facing collaborator that carries out actuator commands
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn execute(&self, command: ActuatorCommand) -> Result<(), DispatchError>;
}

// ============================================================================
// Simulated relay bank
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RelayBankSnapshot {
    /// Last applied action per target
    pub state: HashMap<ActuatorTarget, ActuatorAction>,
    /// Applied commands in arrival order
    pub applied: Vec<ActuatorCommand>,
    pub duplicates: u64,
}

impl RelayBankSnapshot {
    pub fn action_for(&self, target: ActuatorTarget) -> Option<&ActuatorAction> {
        self.state.get(&target)
    }
}

enum RelayBankMessage {
    Execute {
        command: ActuatorCommand,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    SetRejecting(bool),
    Snapshot(oneshot::Sender<RelayBankSnapshot>),
    Shutdown,
}

/// In-process stand-in for the relay and heat pump boss drivers
pub struct SimulatedRelayBank {
    mailbox: mpsc::Receiver<RelayBankMessage>,
    snapshot: RelayBankSnapshot,
    last_trigger: HashMap<ActuatorTarget, u64>,
    rejecting: bool,
}

#[derive(Clone)]
pub struct RelayBankHandle {
    tx: mpsc::Sender<RelayBankMessage>,
}

impl std::fmt::Debug for RelayBankHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayBankHandle").finish_non_exhaustive()
    }
}

impl SimulatedRelayBank {
    pub fn new(capacity: usize) -> (Self, RelayBankHandle) {
        let (tx, mailbox) = mpsc::channel(capacity);
        let bank = Self {
            mailbox,
            snapshot: RelayBankSnapshot::default(),
            last_trigger: HashMap::new(),
            rejecting: false,
        };
        (bank, RelayBankHandle { tx })
    }

    pub async fn run(mut self) {
        info!("simulated relay bank started");
        while let Some(message) = self.mailbox.recv().await {
            match message {
                RelayBankMessage::Execute { command, reply } => {
                    let result = self.apply(command);
                    let _ = reply.send(result);
                }
                RelayBankMessage::SetRejecting(rejecting) => self.rejecting = rejecting,
                RelayBankMessage::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot.clone());
                }
                RelayBankMessage::Shutdown => break,
            }
        }
        info!("simulated relay bank stopped");
    }

    fn apply(&mut self, command: ActuatorCommand) -> Result<(), DispatchError> {
        if self.rejecting {
            return Err(DispatchError::Rejected {
                trigger_id: command.trigger_id,
                reason: "relay bank offline".to_string(),
            });
        }
        let target = command.action.target();
        if let Some(last) = self.last_trigger.get(&target) {
            if command.trigger_id <= *last {
                debug!(trigger_id = command.trigger_id, %target, "duplicate trigger ignored");
                self.snapshot.duplicates += 1;
                return Ok(());
            }
        }
        debug!(trigger_id = command.trigger_id, action = %command.action, "actuator command applied");
        self.last_trigger.insert(target, command.trigger_id);
        self.snapshot.state.insert(target, command.action);
        self.snapshot.applied.push(command);
        Ok(())
    }
}

impl RelayBankHandle {
    pub async fn snapshot(&self) -> Result<RelayBankSnapshot, MailboxClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayBankMessage::Snapshot(reply))
            .await
            .map_err(|_| MailboxClosed("relay bank"))?;
        rx.await.map_err(|_| MailboxClosed("relay bank"))
    }

    /// Make every following command fail until switched back
    pub async fn set_rejecting(&self, rejecting: bool) -> Result<(), MailboxClosed> {
        self.tx
            .send(RelayBankMessage::SetRejecting(rejecting))
            .await
            .map_err(|_| MailboxClosed("relay bank"))
    }

    pub async fn shutdown(&self) {
        if self.tx.send(RelayBankMessage::Shutdown).await.is_err() {
            warn!("relay bank already stopped");
        }
    }
}

#[async_trait]
impl Actuator for RelayBankHandle {
    async fn execute(&self, command: ActuatorCommand) -> Result<(), DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayBankMessage::Execute { command, reply })
            .await
            .map_err(|_| MailboxClosed("relay bank"))?;
        rx.await.map_err(|_| MailboxClosed("relay bank"))?
    }
}
