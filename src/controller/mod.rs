//! Control hierarchy: authority and storage-mode machines, the actor that
//! runs them, and the planner feeding it.

pub mod actor;
pub mod all_tanks;
pub mod buffer_only;
pub mod fsm;
pub mod hierarchy;
pub mod mode;
pub mod planner;
pub mod strategy;

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use actor::{HierarchyActor, HierarchyHandle, HierarchyMessage, HierarchyView};
pub use all_tanks::AllTanksState;
pub use buffer_only::BufferOnlyState;
pub use fsm::{ControlEvent, Step};
pub use hierarchy::{ControlState, MainAutoState, TopEvent};
pub use mode::ModeState;
pub use planner::{Planner, PlannerHandle, TaskStatus};

use crate::config::Config;
use crate::contract::{ContractHandle, ContractManager, ContractMessage};
use crate::dispatch::{ActionDispatcher, Actuator, ReportSink, Reporter, ReporterHandle};
use crate::domain::{ActorClass, Envelope, Layout};
use crate::forecast::ForecastProvider;
use crate::market::BidSink;
use crate::optimizer::{policy_by_name, BidRecommender, DispatchOptimizer, PriceBounds};

/// Everything outside the core the actors talk to
pub struct Collaborators {
    pub forecasts: Arc<dyn ForecastProvider>,
    pub bids: Arc<dyn BidSink>,
    pub reports: Arc<dyn ReportSink>,
    pub actuators: HashMap<ActorClass, Arc<dyn Actuator>>,
    pub atn_outbound: mpsc::Sender<Envelope<ContractMessage>>,
}

/// Handles to the running actors
pub struct Actors {
    pub hierarchy: HierarchyHandle,
    pub contracts: ContractHandle,
    pub planner: PlannerHandle,
    pub reporter: ReporterHandle,
    tasks: ActorTasks,
}

struct ActorTasks {
    reporter: JoinHandle<()>,
    hierarchy: JoinHandle<()>,
    contracts: JoinHandle<()>,
    planner: JoinHandle<()>,
}

async fn join(name: &'static str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        warn!(actor = name, error = %e, "actor task ended abnormally");
    }
}

pub fn spawn_actors(config: &Config, layout: Arc<Layout>, collaborators: Collaborators) -> Result<Actors> {
    let policy = policy_by_name(&config.planner.edge_policy)
        .ok_or_else(|| anyhow!("unknown edge policy {:?}", config.planner.edge_policy))?;
    let optimizer = DispatchOptimizer::new(policy);
    let bounds = PriceBounds::with_overrides(
        config.bid.market_type,
        config.bid.price_floor_usd_per_mwh,
        config.bid.price_cap_usd_per_mwh,
    );
    if bounds.floor > bounds.cap {
        return Err(anyhow!("bid price floor {} above cap {}", bounds.floor, bounds.cap));
    }
    let recommender = BidRecommender::new(config.bid.market_type, config.node.alias.clone(), config.bid.ladder_points)
        .with_bounds(bounds);

    let (reporter, reporter_handle) =
        Reporter::new(config.reporter.clone(), config.node.alias.clone(), collaborators.reports);
    let dispatcher = ActionDispatcher::new(config.dispatcher.clone(), layout.clone(), collaborators.actuators);
    let (hierarchy, hierarchy_handle) =
        HierarchyActor::new(config.controller.clone(), layout, dispatcher, reporter_handle.clone());
    let (contracts, contract_handle) = ContractManager::new(
        config.contract.clone(),
        hierarchy_handle.clone(),
        collaborators.atn_outbound,
    );
    let (planner, planner_handle) = Planner::new(
        config.planner.clone(),
        optimizer,
        recommender,
        collaborators.forecasts,
        collaborators.bids,
        hierarchy_handle.clone(),
    );

    let tasks = ActorTasks {
        reporter: tokio::spawn(reporter.run()),
        hierarchy: tokio::spawn(hierarchy.run()),
        contracts: tokio::spawn(contracts.run()),
        planner: tokio::spawn(planner.run()),
    };
    info!(node = %config.node.alias, mode = %config.node.storage_mode, "actors started");

    Ok(Actors {
        hierarchy: hierarchy_handle,
        contracts: contract_handle,
        planner: planner_handle,
        reporter: reporter_handle,
        tasks,
    })
}

impl Actors {
    /// Stop producers before consumers so the reporter sees the last
    /// transitions
    pub async fn shutdown(self) {
        self.planner.shutdown().await;
        join("planner", self.tasks.planner).await;
        self.contracts.shutdown().await;
        join("contracts", self.tasks.contracts).await;
        self.hierarchy.shutdown().await;
        join("hierarchy", self.tasks.hierarchy).await;
        self.reporter.shutdown().await;
        join("reporter", self.tasks.reporter).await;
        info!("actors stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::test_config;
    use crate::dispatch::{LogReportSink, SimulatedRelayBank};
    use crate::domain::layout::fixtures::test_layout;
    use crate::forecast::FlatForecastProvider;
    use crate::market::LogBidSink;

    fn collaborators(config: &Config) -> (Collaborators, mpsc::Receiver<Envelope<ContractMessage>>) {
        let (bank, relays) = SimulatedRelayBank::new(16);
        tokio::spawn(bank.run());
        let actuator: Arc<dyn Actuator> = Arc::new(relays);
        let (atn_outbound, atn) = mpsc::channel(16);
        let collaborators = Collaborators {
            forecasts: Arc::new(FlatForecastProvider::from_config(&config.planner)),
            bids: Arc::new(LogBidSink),
            reports: Arc::new(LogReportSink),
            actuators: HashMap::from([(ActorClass::HpBoss, actuator.clone()), (ActorClass::Relay, actuator)]),
            atn_outbound,
        };
        (collaborators, atn)
    }

    #[tokio::test]
    async fn test_unknown_policy_is_rejected() {
        let mut config = test_config();
        config.planner.edge_policy = "greedy".to_string();
        let (collaborators, _atn) = collaborators(&config);
        let layout = Arc::new(test_layout(config.node.storage_mode));
        assert!(spawn_actors(&config, layout, collaborators).is_err());
    }

    #[tokio::test]
    async fn test_actors_start_plan_and_stop() {
        let config = test_config();
        let (collaborators, _atn) = collaborators(&config);
        let layout = Arc::new(test_layout(config.node.storage_mode));
        let actors = spawn_actors(&config, layout, collaborators).unwrap();

        actors.planner.replan().await.unwrap();
        let status = actors.planner.status().await.unwrap();
        assert!(status.success_count >= 1);
        let view = actors.hierarchy.view().await.unwrap();
        assert_eq!(view.top, MainAutoState::LocalControl);

        actors.shutdown().await;
    }
}
