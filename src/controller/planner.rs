use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::actor::HierarchyHandle;
use crate::config::PlannerConfig;
use crate::forecast::ForecastProvider;
use crate::mailbox::MailboxClosed;
use crate::market::BidSink;
use crate::optimizer::{BidRecommender, DispatchOptimizer, DispatchPlan, PlanningError};

/// Run counters of the planning task
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_plan_id: Option<Uuid>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

pub enum PlannerMessage {
    Replan,
    Status(oneshot::Sender<TaskStatus>),
    Shutdown,
}

#[derive(Clone)]
pub struct PlannerHandle {
    tx: mpsc::Sender<PlannerMessage>,
}

impl std::fmt::Debug for PlannerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerHandle").finish_non_exhaustive()
    }
}

impl PlannerHandle {
    /// Run a planning cycle now instead of at the next interval
    pub async fn replan(&self) -> Result<(), MailboxClosed> {
        self.tx
            .send(PlannerMessage::Replan)
            .await
            .map_err(|_| MailboxClosed("planner"))
    }

    pub async fn status(&self) -> Result<TaskStatus, MailboxClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlannerMessage::Status(reply))
            .await
            .map_err(|_| MailboxClosed("planner"))?;
        rx.await.map_err(|_| MailboxClosed("planner"))
    }

    pub async fn shutdown(&self) {
        if self.tx.send(PlannerMessage::Shutdown).await.is_err() {
            warn!("planner already stopped");
        }
    }
}

/// Periodic forecast, solve, bid and publish cycle. A failed cycle leaves
/// the hierarchy on the previous plan.
pub struct Planner {
    config: PlannerConfig,
    optimizer: Arc<DispatchOptimizer>,
    recommender: Arc<BidRecommender>,
    forecasts: Arc<dyn ForecastProvider>,
    bids: Arc<dyn BidSink>,
    hierarchy: HierarchyHandle,
    status: TaskStatus,
    mailbox: mpsc::Receiver<PlannerMessage>,
}

impl Planner {
    pub fn new(
        config: PlannerConfig,
        optimizer: DispatchOptimizer,
        recommender: BidRecommender,
        forecasts: Arc<dyn ForecastProvider>,
        bids: Arc<dyn BidSink>,
        hierarchy: HierarchyHandle,
    ) -> (Self, PlannerHandle) {
        let (tx, mailbox) = mpsc::channel(8);
        let planner = Self {
            config,
            optimizer: Arc::new(optimizer),
            recommender: Arc::new(recommender),
            forecasts,
            bids,
            hierarchy,
            status: TaskStatus::default(),
            mailbox,
        };
        (planner, PlannerHandle { tx })
    }

    pub async fn run(mut self) {
        // First tick fires immediately, so a plan exists right after start
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            policy = self.optimizer.policy_name(),
            horizon = self.config.horizon_hours,
            every_secs = self.config.interval_seconds,
            "planner started"
        );

        loop {
            tokio::select! {
                message = self.mailbox.recv() => match message {
                    Some(PlannerMessage::Replan) => self.run_cycle().await,
                    Some(PlannerMessage::Status(reply)) => {
                        let _ = reply.send(self.status.clone());
                    }
                    Some(PlannerMessage::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.run_cycle().await,
            }
        }
        info!(runs = self.status.run_count, errors = self.status.error_count, "planner stopped");
    }

    async fn run_cycle(&mut self) {
        let now = Utc::now();
        self.status.last_run = Some(now);
        self.status.run_count += 1;

        match self.replan(now).await {
            Ok(plan) => {
                self.status.last_success = Some(now);
                self.status.last_plan_id = Some(plan.id);
                self.status.success_count += 1;
                self.status.last_error = None;
                info!(
                    plan_id = %plan.id,
                    total_cost = %plan.total_cost,
                    electricity = %plan.total_electricity(),
                    "planning cycle completed"
                );
            }
            Err(e) => {
                self.status.error_count += 1;
                self.status.last_error = Some(format!("{e:#}"));
                error!(error = %format!("{e:#}"), "planning cycle failed, keeping previous plan");
            }
        }
    }

    async fn replan(&self, now: DateTime<Utc>) -> Result<Arc<DispatchPlan>> {
        let input = self
            .forecasts
            .forecast(now)
            .await
            .context("forecast unavailable")?;

        let optimizer = self.optimizer.clone();
        let recommender = self.recommender.clone();
        let (plan, bid) = tokio::task::spawn_blocking(move || -> Result<_, PlanningError> {
            let plan = optimizer.plan(&input)?.plan();
            let bid = recommender.recommend(&optimizer, &input)?;
            Ok((plan, bid))
        })
        .await
        .context("planning task aborted")??;

        let plan = Arc::new(plan);
        if let Err(e) = self.bids.submit(bid).await {
            warn!(error = %e, "bid not submitted");
        }
        self.hierarchy.plan(plan.clone()).await?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::test_config;
    use crate::controller::HierarchyMessage;
    use crate::domain::forecast::fixtures::flat_forecast;
    use crate::domain::MarketType;
    use crate::forecast::{ForecastSourceError, MockForecastProvider};
    use crate::market::{MarketError, MockBidSink};

    fn planner(
        forecasts: MockForecastProvider,
        bids: MockBidSink,
    ) -> (Planner, PlannerHandle, mpsc::Receiver<HierarchyMessage>) {
        let (hierarchy, rx) = HierarchyHandle::detached(8);
        let recommender = BidRecommender::new(MarketType::Rt60Gate5, "test.scada", 5);
        let (planner, handle) = Planner::new(
            test_config().planner,
            DispatchOptimizer::default(),
            recommender,
            Arc::new(forecasts),
            Arc::new(bids),
            hierarchy,
        );
        (planner, handle, rx)
    }

    #[tokio::test]
    async fn test_cycle_publishes_plan_and_bid() {
        let mut forecasts = MockForecastProvider::new();
        forecasts.expect_forecast().returning(|_| Ok(flat_forecast(6)));
        let mut bids = MockBidSink::new();
        bids.expect_submit()
            .withf(|bid| bid.bidder_alias == "test.scada" && !bid.pq_pairs.is_empty())
            .times(1)
            .returning(|_| Ok(()));

        let (mut planner, _handle, mut rx) = planner(forecasts, bids);
        planner.run_cycle().await;

        assert_eq!(planner.status.success_count, 1);
        match rx.recv().await {
            Some(HierarchyMessage::PlanUpdated(plan)) => {
                assert_eq!(plan.entries.len(), 6);
                assert_eq!(planner.status.last_plan_id, Some(plan.id));
            }
            _ => panic!("expected a plan"),
        }
    }

    #[tokio::test]
    async fn test_forecast_failure_keeps_previous_plan() {
        let mut forecasts = MockForecastProvider::new();
        forecasts
            .expect_forecast()
            .returning(|_| Err(ForecastSourceError::Io(std::io::Error::other("gone"))));
        let mut bids = MockBidSink::new();
        bids.expect_submit().never();

        let (mut planner, _handle, mut rx) = planner(forecasts, bids);
        planner.run_cycle().await;

        assert_eq!(planner.status.error_count, 1);
        assert!(planner.status.last_error.as_deref().unwrap().contains("forecast unavailable"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bid_sink_failure_still_publishes_plan() {
        let mut forecasts = MockForecastProvider::new();
        forecasts.expect_forecast().returning(|_| Ok(flat_forecast(4)));
        let mut bids = MockBidSink::new();
        bids.expect_submit()
            .returning(|_| Err(MarketError::Unavailable("down".to_string())));

        let (mut planner, _handle, mut rx) = planner(forecasts, bids);
        planner.run_cycle().await;

        assert_eq!(planner.status.success_count, 1);
        assert!(matches!(rx.recv().await, Some(HierarchyMessage::PlanUpdated(_))));
    }

    #[tokio::test]
    async fn test_handle_reports_status() {
        let mut forecasts = MockForecastProvider::new();
        forecasts.expect_forecast().returning(|_| Ok(flat_forecast(4)));
        let mut bids = MockBidSink::new();
        bids.expect_submit().returning(|_| Ok(()));

        let (planner, handle, _rx) = planner(forecasts, bids);
        tokio::spawn(planner.run());
        handle.replan().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.run_count >= 1);
        handle.shutdown().await;
    }
}
