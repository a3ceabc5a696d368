use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::fsm::ControlEvent;
use super::hierarchy::{ControlState, MainAutoState, TopEvent};
use super::mode::ModeState;
use super::strategy::{self, ContractBudget, Readings};
use crate::config::ControllerConfig;
use crate::contract::{ActiveContract, AuthorityEvent};
use crate::dispatch::{ActionDispatcher, FsmAtomicReport, ReporterHandle};
use crate::domain::{ChannelRole, Layout, SensorBatch, SensorSnapshot, SeasonalStorageMode};
use crate::mailbox::MailboxClosed;
use crate::optimizer::DispatchPlan;

const MS_PER_HOUR: f64 = 3_600_000.0;

pub enum HierarchyMessage {
    Sensor(SensorBatch),
    Authority(AuthorityEvent),
    PlanUpdated(Arc<DispatchPlan>),
    /// Operator-issued storage-mode event, applied as is
    Control(ControlEvent),
    GoDormant,
    WakeUp,
    Tick,
    Query(oneshot::Sender<HierarchyView>),
    Shutdown,
}

/// Read-only copy of the hierarchy's state
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyView {
    pub top: MainAutoState,
    pub sub: ModeState,
    pub pending: usize,
    pub contract_id: Option<Uuid>,
    pub last_transition: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HierarchyHandle {
    tx: mpsc::Sender<HierarchyMessage>,
}

impl std::fmt::Debug for HierarchyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyHandle").finish_non_exhaustive()
    }
}

impl HierarchyHandle {
    async fn send(&self, message: HierarchyMessage) -> Result<(), MailboxClosed> {
        self.tx.send(message).await.map_err(|_| MailboxClosed("hierarchy"))
    }

    pub async fn sensors(&self, batch: SensorBatch) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::Sensor(batch)).await
    }

    pub async fn authority(&self, event: AuthorityEvent) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::Authority(event)).await
    }

    pub async fn plan(&self, plan: Arc<DispatchPlan>) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::PlanUpdated(plan)).await
    }

    pub async fn control(&self, event: ControlEvent) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::Control(event)).await
    }

    pub async fn go_dormant(&self) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::GoDormant).await
    }

    pub async fn wake_up(&self) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::WakeUp).await
    }

    /// Force an evaluation without waiting for the next tick
    pub async fn tick(&self) -> Result<(), MailboxClosed> {
        self.send(HierarchyMessage::Tick).await
    }

    pub async fn view(&self) -> Result<HierarchyView, MailboxClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HierarchyMessage::Query(reply)).await?;
        rx.await.map_err(|_| MailboxClosed("hierarchy"))
    }

    pub async fn shutdown(&self) {
        if self.send(HierarchyMessage::Shutdown).await.is_err() {
            warn!("hierarchy already stopped");
        }
    }
}

#[cfg(test)]
impl HierarchyHandle {
    /// Handle whose messages land in the returned receiver instead of an actor
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<HierarchyMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Energy drawn against the contract currently in force
#[derive(Debug, Clone)]
struct ContractUsage {
    contract: ActiveContract,
    used_kwh: f64,
    last_update: DateTime<Utc>,
}

impl ContractUsage {
    fn new(contract: ActiveContract, now: DateTime<Utc>) -> Self {
        Self {
            contract,
            used_kwh: 0.0,
            last_update: now,
        }
    }

    fn accrue(&mut self, now: DateTime<Utc>, heat_pump_on: bool, rated_kw: f64) {
        let hours = (now - self.last_update).num_milliseconds().max(0) as f64 / MS_PER_HOUR;
        if heat_pump_on {
            self.used_kwh += rated_kw * hours;
        }
        self.last_update = now;
    }

    /// Allowance up to one tick ahead, capped at the contract's total
    fn budget(&self, now: DateTime<Utc>, lookahead: chrono::Duration) -> ContractBudget {
        let total = self.contract.ends_at - self.contract.started_at;
        let elapsed = (now - self.contract.started_at + lookahead).min(total);
        let hours = elapsed.num_milliseconds().max(0) as f64 / MS_PER_HOUR;
        ContractBudget {
            allowed_kwh: self.contract.avg_power_watts / 1000.0 * hours,
            used_kwh: self.used_kwh,
            oil_boiler_on: self.contract.oil_boiler_on,
        }
    }
}

/// Owns the control state. Every transition, authority change and actuator
/// command passes through this task, one message at a time.
pub struct HierarchyActor {
    config: ControllerConfig,
    layout: Arc<Layout>,
    state: ControlState,
    sensors: SensorSnapshot,
    plan: Option<Arc<DispatchPlan>>,
    usage: Option<ContractUsage>,
    dispatcher: ActionDispatcher,
    reporter: ReporterHandle,
    failsafe_engaged: bool,
    mailbox: mpsc::Receiver<HierarchyMessage>,
}

impl HierarchyActor {
    pub fn new(
        config: ControllerConfig,
        layout: Arc<Layout>,
        dispatcher: ActionDispatcher,
        reporter: ReporterHandle,
    ) -> (Self, HierarchyHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity);
        let actor = Self {
            state: ControlState::new(layout.storage_mode(), Utc::now()),
            config,
            layout,
            sensors: SensorSnapshot::new(),
            plan: None,
            usage: None,
            dispatcher,
            reporter,
            failsafe_engaged: false,
            mailbox,
        };
        (actor, HierarchyHandle { tx })
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(
            node = self.layout.node_alias(),
            mode = %self.layout.storage_mode(),
            "control hierarchy started"
        );

        loop {
            tokio::select! {
                message = self.mailbox.recv() => match message {
                    Some(HierarchyMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message).await,
                },
                _ = ticker.tick() => self.evaluate(Utc::now()).await,
            }
            self.flush_actions().await;
        }

        if !self.state.pending_actions.is_empty() {
            warn!(pending = self.state.pending_actions.len(), "stopping with undelivered actuator commands");
        }
        info!("control hierarchy stopped");
    }

    async fn handle(&mut self, message: HierarchyMessage) {
        let now = Utc::now();
        self.accrue(now);
        match message {
            HierarchyMessage::Sensor(batch) => {
                let stats = self.sensors.ingest(&self.layout, &batch);
                debug!(accepted = stats.accepted, ignored = stats.ignored, unknown = stats.unknown, "sensor batch");
                if stats.accepted > 0 {
                    self.evaluate(now).await;
                }
            }
            HierarchyMessage::Authority(event) => self.on_authority(event, now).await,
            HierarchyMessage::PlanUpdated(plan) => {
                info!(plan_id = %plan.id, hours = plan.entries.len(), total_cost = %plan.total_cost, "plan updated");
                self.plan = Some(plan);
                self.evaluate(now).await;
            }
            HierarchyMessage::Control(event) => self.apply_sub(event, now).await,
            HierarchyMessage::GoDormant => {
                self.apply_top(TopEvent::GoDormant, now).await;
                self.apply_sub(ControlEvent::GoDormant, now).await;
            }
            HierarchyMessage::WakeUp => {
                let contract_active = self.usage.is_some();
                self.apply_top(TopEvent::WakeUp { contract_active }, now).await;
                self.apply_sub(ControlEvent::WakeUp, now).await;
                self.evaluate(now).await;
            }
            HierarchyMessage::Tick => self.evaluate(now).await,
            HierarchyMessage::Query(reply) => {
                let _ = reply.send(self.view());
            }
            // Handled by the run loop
            HierarchyMessage::Shutdown => {}
        }
    }

    async fn on_authority(&mut self, event: AuthorityEvent, now: DateTime<Utc>) {
        match event {
            AuthorityEvent::ContractActive(active) => {
                info!(contract_id = %active.contract_id, ends_at = %active.ends_at, "contract active, following ATN");
                self.usage = Some(ContractUsage::new(active, now));
                self.apply_top(TopEvent::ContractActive, now).await;
                self.evaluate(now).await;
            }
            AuthorityEvent::ContractEnded { contract_id, status }
            | AuthorityEvent::GraceExpired { contract_id, status } => {
                if self.usage.as_ref().map(|u| u.contract.contract_id) != Some(contract_id) {
                    debug!(%contract_id, %status, "authority change for a contract not in force");
                    return;
                }
                if let Some(usage) = self.usage.take() {
                    info!(
                        %contract_id,
                        %status,
                        used_kwh = usage.used_kwh,
                        "contract no longer in force, returning to local control"
                    );
                }
                self.apply_top(TopEvent::AuthorityLost, now).await;
                self.evaluate(now).await;
            }
        }
    }

    fn accrue(&mut self, now: DateTime<Utc>) {
        let heat_pump_on = self.state.sub.heat_pump_on();
        let rated_kw = self.config.hp_rated_power_watts / 1000.0;
        if let Some(usage) = self.usage.as_mut() {
            usage.accrue(now, heat_pump_on, rated_kw);
        }
    }

    fn readings(&self, now: DateTime<Utc>) -> Option<Readings> {
        let max_age = self.config.stale_after();
        let buffer_kwh = self
            .sensors
            .fresh_value(&self.layout, ChannelRole::BufferEnergy, now, max_age)?;
        let store_kwh = self
            .sensors
            .fresh_value(&self.layout, ChannelRole::StoreEnergy, now, max_age);
        if self.state.sub.mode() == SeasonalStorageMode::AllTanks && store_kwh.is_none() {
            return None;
        }
        Some(Readings { buffer_kwh, store_kwh })
    }

    async fn evaluate(&mut self, now: DateTime<Utc>) {
        if self.state.top == MainAutoState::Dormant || self.state.sub.is_dormant() {
            return;
        }
        self.accrue(now);
        let Some(readings) = self.readings(now) else {
            warn!(state = %self.state.sub, "sensor data missing or stale, holding state");
            return;
        };
        let lookahead = chrono::Duration::seconds(self.config.tick_seconds as i64);
        let budget = self.usage.as_ref().map(|u| u.budget(now, lookahead));
        let plan_hour = self.plan.as_ref().and_then(|p| p.entry_at(now));
        let event = strategy::next_event(
            self.state.top,
            self.state.sub,
            readings,
            plan_hour,
            budget.as_ref(),
            &self.config,
        );
        if let Some(event) = event {
            self.apply_sub(event, now).await;
        }
    }

    async fn apply_top(&mut self, event: TopEvent, now: DateTime<Utc>) {
        if let Some(report) = self.state.apply_top(event, now) {
            info!(from = %report.from_state, to = %report.to_state, %event, "authority level changed");
            self.report(report).await;
        }
    }

    async fn apply_sub(&mut self, event: ControlEvent, now: DateTime<Utc>) {
        let dispatcher = &mut self.dispatcher;
        if let Some(report) = self.state.apply_sub(event, now, |action| dispatcher.stamp(action)) {
            self.report(report).await;
        }
    }

    async fn report(&self, report: FsmAtomicReport) {
        if let Err(e) = self.reporter.record(report).await {
            warn!(error = %e, "transition report dropped");
        }
    }

    /// Deliver queued commands. The first escalation forces the failsafe
    /// state; if even that cannot be delivered the commands stay queued for
    /// the next pass.
    async fn flush_actions(&mut self) {
        if self.state.pending_actions.is_empty() {
            return;
        }
        let err = match self.dispatcher.drain(&mut self.state.pending_actions).await {
            Ok(acked) => {
                debug!(count = acked.len(), "actuator commands acknowledged");
                self.failsafe_engaged = false;
                return;
            }
            Err(e) => e,
        };

        if self.failsafe_engaged {
            error!(error = %err, pending = self.state.pending_actions.len(), "failsafe commands still undelivered");
            return;
        }

        error!(error = %err, state = %self.state.sub, "actuator escalation, forcing failsafe");
        self.failsafe_engaged = true;
        let dispatcher = &mut self.dispatcher;
        let report = self
            .state
            .force_safe("ActuatorCommandTimeout", Utc::now(), |action| dispatcher.stamp(action));
        self.report(report).await;

        match self.dispatcher.drain(&mut self.state.pending_actions).await {
            Ok(acked) => {
                info!(count = acked.len(), "failsafe commands acknowledged");
                self.failsafe_engaged = false;
            }
            Err(e) => error!(
                error = %e,
                pending = self.state.pending_actions.len(),
                "failsafe commands undelivered, will retry"
            ),
        }
    }

    fn view(&self) -> HierarchyView {
        HierarchyView {
            top: self.state.top,
            sub: self.state.sub,
            pending: self.state.pending_actions.len(),
            contract_id: self.usage.as_ref().map(|u| u.contract.contract_id),
            last_transition: self.state.last_transition,
        }
    }
}
