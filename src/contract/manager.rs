use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{ActiveContract, AuthorityEvent, ContractMessage};
use super::state::{ContractError, ContractEvent, ContractOutcome, ContractStatus, ContractTerms, DispatchContract, Party};
use super::timer::{self, DeadlineTimer};
use crate::config::ContractConfig;
use crate::controller::HierarchyHandle;
use crate::domain::Envelope;
use crate::mailbox::MailboxClosed;

pub enum ContractCommand {
    Inbound(Envelope<ContractMessage>),
    Acknowledge(Uuid),
    Confirm(Uuid),
    /// SCADA gives up the current contract
    Release,
    Current(oneshot::Sender<Option<DispatchContract>>),
    Shutdown,
}

#[derive(Clone)]
pub struct ContractHandle {
    tx: mpsc::Sender<ContractCommand>,
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle").finish_non_exhaustive()
    }
}

impl ContractHandle {
    async fn send(&self, command: ContractCommand) -> Result<(), MailboxClosed> {
        self.tx.send(command).await.map_err(|_| MailboxClosed("contracts"))
    }

    pub async fn deliver(&self, message: ContractMessage) -> Result<(), MailboxClosed> {
        self.deliver_envelope(Envelope::seal(message)).await
    }

    pub async fn deliver_envelope(&self, envelope: Envelope<ContractMessage>) -> Result<(), MailboxClosed> {
        self.send(ContractCommand::Inbound(envelope)).await
    }

    pub async fn acknowledge(&self, contract_id: Uuid) -> Result<(), MailboxClosed> {
        self.send(ContractCommand::Acknowledge(contract_id)).await
    }

    pub async fn confirm(&self, contract_id: Uuid) -> Result<(), MailboxClosed> {
        self.send(ContractCommand::Confirm(contract_id)).await
    }

    pub async fn release(&self) -> Result<(), MailboxClosed> {
        self.send(ContractCommand::Release).await
    }

    pub async fn current(&self) -> Result<Option<DispatchContract>, MailboxClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(ContractCommand::Current(reply)).await?;
        rx.await.map_err(|_| MailboxClosed("contracts"))
    }

    pub async fn shutdown(&self) {
        if self.send(ContractCommand::Shutdown).await.is_err() {
            warn!("contract manager already stopped");
        }
    }
}

/// Tokio instant matching a wall-clock time, clamped to now for the past
fn instant_at(at: DateTime<Utc>) -> Instant {
    let now = Instant::now();
    match (at - Utc::now()).to_std() {
        Ok(ahead) => now + ahead,
        Err(_) => now,
    }
}

/// Runs the lifecycle of the one contract SCADA may hold at a time and
/// tells the control hierarchy whenever authority changes hands.
pub struct ContractManager {
    config: ContractConfig,
    hierarchy: HierarchyHandle,
    outbound: mpsc::Sender<Envelope<ContractMessage>>,
    current: Option<DispatchContract>,
    start: DeadlineTimer,
    end: DeadlineTimer,
    grace: DeadlineTimer,
    mailbox: mpsc::Receiver<ContractCommand>,
}

impl ContractManager {
    pub fn new(
        config: ContractConfig,
        hierarchy: HierarchyHandle,
        outbound: mpsc::Sender<Envelope<ContractMessage>>,
    ) -> (Self, ContractHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity);
        let manager = Self {
            config,
            hierarchy,
            outbound,
            current: None,
            start: DeadlineTimer::default(),
            end: DeadlineTimer::default(),
            grace: DeadlineTimer::default(),
            mailbox,
        };
        (manager, ContractHandle { tx })
    }

    fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.grace_period_seconds as i64)
    }

    pub async fn run(mut self) {
        info!(
            grace_seconds = self.config.grace_period_seconds,
            auto_accept = self.config.auto_accept,
            "contract manager started"
        );
        loop {
            let (end_at, grace_at, start_at) = (self.end.deadline(), self.grace.deadline(), self.start.deadline());
            tokio::select! {
                biased;
                _ = timer::until(end_at) => {
                    if self.end.fire() {
                        self.on_end().await;
                    }
                }
                _ = timer::until(grace_at) => {
                    if self.grace.fire() {
                        self.on_grace_expired().await;
                    }
                }
                _ = timer::until(start_at) => {
                    if self.start.fire() {
                        self.on_start().await;
                    }
                }
                command = self.mailbox.recv() => match command {
                    Some(ContractCommand::Shutdown) | None => break,
                    Some(command) => {
                        if let Err(e) = self.handle(command).await {
                            warn!(error = %e, "contract command rejected");
                        }
                    }
                },
            }
        }
        if let Some(contract) = self.current.as_ref().filter(|c| !c.status.is_terminal()) {
            warn!(contract_id = %contract.contract_id, status = %contract.status, "stopping with a live contract");
        }
        info!("contract manager stopped");
    }

    async fn handle(&mut self, command: ContractCommand) -> Result<(), ContractError> {
        match command {
            ContractCommand::Inbound(envelope) => match envelope.open() {
                Ok(message) => self.on_inbound(message).await,
                Err(e) => {
                    warn!(error = %e, "malformed contract message dropped");
                    Ok(())
                }
            },
            ContractCommand::Acknowledge(id) => self.acknowledge(id).await,
            ContractCommand::Confirm(id) => self.confirm(id).await,
            ContractCommand::Release => {
                let Some(id) = self.live_contract_id() else {
                    debug!("release with no live contract");
                    return Ok(());
                };
                self.apply(id, ContractEvent::Terminate { by: Party::Scada }).await?;
                self.send_outbound(ContractMessage::Terminate {
                    contract_id: id,
                    by: Party::Scada,
                    sent_at: Utc::now(),
                })
                .await;
                Ok(())
            }
            ContractCommand::Current(reply) => {
                let _ = reply.send(self.current.clone());
                Ok(())
            }
            ContractCommand::Shutdown => Ok(()),
        }
    }

    fn live_contract_id(&self) -> Option<Uuid> {
        self.current
            .as_ref()
            .filter(|c| !c.status.is_terminal())
            .map(|c| c.contract_id)
    }

    async fn on_inbound(&mut self, message: ContractMessage) -> Result<(), ContractError> {
        debug!(kind = message.kind(), contract_id = %message.contract_id(), "contract message");
        match message {
            ContractMessage::Propose { contract_id, terms, .. } => self.on_propose(contract_id, terms).await,
            other => match other.event() {
                Some(event) => self.apply(other.contract_id(), event).await.map(|_| ()),
                None => Ok(()),
            },
        }
    }

    async fn on_propose(&mut self, contract_id: Uuid, terms: ContractTerms) -> Result<(), ContractError> {
        if let Some(live) = self.current.as_ref().filter(|c| !c.status.is_terminal()) {
            return Err(ContractError::ProtocolViolation {
                contract_id,
                status: live.status,
                event: format!("Propose while {} is live", live.contract_id),
            });
        }

        let now = Utc::now();
        let mut contract = DispatchContract::new(contract_id, terms, now, self.grace_period());
        if let Err(reason) = self.check_terms(&contract, now) {
            contract.apply(ContractEvent::Terminate { by: Party::Scada }, now, self.grace_period())?;
            self.current = Some(contract);
            self.send_outbound(ContractMessage::Terminate {
                contract_id,
                by: Party::Scada,
                sent_at: now,
            })
            .await;
            return Err(ContractError::InvalidTerms { contract_id, reason });
        }

        info!(
            %contract_id,
            start = %contract.terms.start_time,
            minutes = contract.terms.duration_minutes,
            avg_power_watts = contract.terms.avg_power_watts,
            "contract proposed"
        );
        self.current = Some(contract);
        self.grace.arm(Instant::now() + self.config.grace_period());

        if self.config.auto_accept {
            self.acknowledge(contract_id).await?;
            self.confirm(contract_id).await?;
        }
        Ok(())
    }

    async fn acknowledge(&mut self, contract_id: Uuid) -> Result<(), ContractError> {
        self.apply(contract_id, ContractEvent::Acknowledge).await?;
        self.send_outbound(ContractMessage::Acknowledge {
            contract_id,
            sent_at: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn confirm(&mut self, contract_id: Uuid) -> Result<(), ContractError> {
        self.apply(contract_id, ContractEvent::Confirm).await?;
        self.send_outbound(ContractMessage::Confirm {
            contract_id,
            sent_at: Utc::now(),
        })
        .await;
        Ok(())
    }

    fn check_terms(&self, contract: &DispatchContract, now: DateTime<Utc>) -> Result<(), String> {
        let terms = &contract.terms;
        let (min, max) = (self.config.min_duration_minutes, self.config.max_duration_minutes);
        if terms.duration_minutes < min || terms.duration_minutes > max {
            return Err(format!("duration {} min outside [{min}, {max}]", terms.duration_minutes));
        }
        if !(terms.avg_power_watts > 0.0 && terms.avg_power_watts <= self.config.max_avg_power_watts) {
            return Err(format!(
                "average power {} W outside (0, {}]",
                terms.avg_power_watts, self.config.max_avg_power_watts
            ));
        }
        if contract.end_time() <= now {
            return Err(format!("contract ended at {}", contract.end_time()));
        }
        Ok(())
    }

    /// Apply an event to the current contract and follow up on the status it
    /// lands in
    async fn apply(&mut self, contract_id: Uuid, event: ContractEvent) -> Result<ContractStatus, ContractError> {
        let grace = self.grace_period();
        let contract = self
            .current
            .as_mut()
            .filter(|c| c.contract_id == contract_id)
            .ok_or(ContractError::UnknownContract(contract_id))?;
        let was_active = contract.is_active();
        let status = contract.apply(event, Utc::now(), grace)?;
        debug!(%contract_id, %event, %status, "contract event applied");

        if status.is_terminal() {
            self.close(contract_id, status, was_active, event == ContractEvent::GraceExpired)
                .await;
            return Ok(status);
        }

        if let Some(contract) = self.current.as_ref() {
            self.grace.arm(instant_at(contract.grace_end_time));
        }
        match status {
            ContractStatus::Confirmed if event == ContractEvent::Confirm => {
                let start_time = self.current.as_ref().map(|c| c.terms.start_time).unwrap_or_else(Utc::now);
                self.start.arm(instant_at(start_time));
            }
            ContractStatus::Active if event == ContractEvent::Start => {
                if let Some(contract) = self.current.as_ref() {
                    self.end.arm(instant_at(contract.end_time()));
                    let active = ActiveContract {
                        contract_id,
                        started_at: Utc::now(),
                        ends_at: contract.end_time(),
                        avg_power_watts: contract.terms.avg_power_watts,
                        oil_boiler_on: contract.terms.oil_boiler_on,
                    };
                    info!(%contract_id, ends_at = %active.ends_at, "contract active");
                    self.notify(AuthorityEvent::ContractActive(active)).await;
                }
            }
            _ => {}
        }
        Ok(status)
    }

    async fn close(&mut self, contract_id: Uuid, status: ContractStatus, was_active: bool, grace_expired: bool) {
        self.start.cancel();
        self.end.cancel();
        self.grace.cancel();
        if grace_expired {
            warn!(%contract_id, %status, was_active, "no contract traffic within the grace period");
            self.notify(AuthorityEvent::GraceExpired { contract_id, status }).await;
        } else {
            info!(%contract_id, %status, was_active, "contract closed");
            self.notify(AuthorityEvent::ContractEnded { contract_id, status }).await;
        }
    }

    async fn on_start(&mut self) {
        let Some(id) = self.live_contract_id() else { return };
        if let Err(e) = self.apply(id, ContractEvent::Start).await {
            warn!(error = %e, "contract could not start");
        }
    }

    async fn on_end(&mut self) {
        let Some(id) = self.live_contract_id() else { return };
        let event = ContractEvent::Complete {
            outcome: ContractOutcome::Success,
            observer: Party::Scada,
        };
        match self.apply(id, event).await {
            Ok(_) => {
                self.send_outbound(ContractMessage::Complete {
                    contract_id: id,
                    outcome: ContractOutcome::Success,
                    observer: Party::Scada,
                    sent_at: Utc::now(),
                })
                .await
            }
            Err(e) => warn!(error = %e, "contract could not complete"),
        }
    }

    async fn on_grace_expired(&mut self) {
        let Some(id) = self.live_contract_id() else { return };
        if let Err(e) = self.apply(id, ContractEvent::GraceExpired).await {
            warn!(error = %e, "grace expiry not applied");
        }
    }

    async fn notify(&self, event: AuthorityEvent) {
        if let Err(e) = self.hierarchy.authority(event).await {
            warn!(error = %e, "authority change not delivered");
        }
    }

    async fn send_outbound(&self, message: ContractMessage) {
        let kind = message.kind();
        if self.outbound.send(Envelope::seal(message)).await.is_err() {
            warn!(kind, "ATN link closed, contract message dropped");
        }
    }
}
