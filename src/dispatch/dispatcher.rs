use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use super::actuator::{Actuator, ActuatorCommand, DispatchError};
use crate::config::DispatcherConfig;
use crate::domain::{ActorClass, ActuatorAction, Layout, UnixMs};

/// Sends queued actuator commands to whichever collaborator owns each
/// target, one at a time, oldest first.
pub struct ActionDispatcher {
    config: DispatcherConfig,
    layout: Arc<Layout>,
    actuators: HashMap<ActorClass, Arc<dyn Actuator>>,
    next_trigger_id: u64,
}

impl ActionDispatcher {
    pub fn new(
        config: DispatcherConfig,
        layout: Arc<Layout>,
        actuators: HashMap<ActorClass, Arc<dyn Actuator>>,
    ) -> Self {
        Self {
            config,
            layout,
            actuators,
            next_trigger_id: 1,
        }
    }

    /// Wrap an action in a command carrying the next trigger id
    pub fn stamp(&mut self, action: ActuatorAction) -> ActuatorCommand {
        let trigger_id = self.next_trigger_id;
        self.next_trigger_id += 1;
        ActuatorCommand {
            trigger_id,
            action,
            issued_at: UnixMs::now(),
        }
    }

    /// Send every pending command in FIFO order. A command leaves the queue
    /// only once acknowledged; on escalation it and everything behind it
    /// stay queued and the error is returned.
    pub async fn drain(&self, pending: &mut VecDeque<ActuatorCommand>) -> Result<Vec<u64>, DispatchError> {
        let mut acknowledged = Vec::with_capacity(pending.len());
        while let Some(command) = pending.front() {
            self.send_with_retry(command).await?;
            acknowledged.push(command.trigger_id);
            pending.pop_front();
        }
        Ok(acknowledged)
    }

    async fn send_with_retry(&self, command: &ActuatorCommand) -> Result<(), DispatchError> {
        let target = command.action.target();
        let owner = self.layout.owner_of(target);
        let actuator = owner
            .and_then(|class| self.actuators.get(&class))
            .ok_or(DispatchError::NoActuator { target, owner })?;

        let mut attempt = 1;
        loop {
            let result = match timeout(self.config.command_timeout(), actuator.execute(command.clone())).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::CommandTimeout {
                    trigger_id: command.trigger_id,
                    after_ms: self.config.command_timeout_ms,
                }),
            };

            match result {
                Ok(()) => {
                    debug!(trigger_id = command.trigger_id, action = %command.action, attempt, "actuator command acknowledged");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        trigger_id = command.trigger_id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "actuator command failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        trigger_id = command.trigger_id,
                        action = %command.action,
                        attempts = attempt,
                        error = %e,
                        "ActuatorCommandTimeout: giving up on actuator command"
                    );
                    return Err(e);
                }
            }
        }
    }
}
