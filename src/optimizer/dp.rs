use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::graph::{EnergyStateGraph, EnergyTransition, NodeId};
use super::policy::{EdgePolicy, ReachableLevelPolicy};
use super::types::{DispatchPlan, PlanEntry, PlanningError};
use crate::domain::{Cost, Energy, ForecastInput, Price};

/// Costs closer than this are treated as equal
pub const COST_TIE_EPSILON: f64 = 1e-9;

/// Backward dynamic program over the time-expanded energy graph
pub struct DispatchOptimizer {
    policy: Box<dyn EdgePolicy>,
}

impl Default for DispatchOptimizer {
    fn default() -> Self {
        Self::new(Box::new(ReachableLevelPolicy))
    }
}

impl DispatchOptimizer {
    pub fn new(policy: Box<dyn EdgePolicy>) -> Self {
        Self { policy }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn build_graph(&self, input: &ForecastInput) -> Result<EnergyStateGraph, PlanningError> {
        EnergyStateGraph::build(input, self.policy.as_ref())
    }

    /// Build a fresh graph for `input` and solve it
    pub fn plan(&self, input: &ForecastInput) -> Result<SolvedGraph, PlanningError> {
        let graph = self.build_graph(input)?;
        self.solve(graph)
    }

    /// Relax every node from `t = H-1` down to `t = 0`.
    ///
    /// On equal cost the head with more stored energy wins, then the first
    /// edge in policy order, so repeated runs pick the same path.
    pub fn solve(&self, mut graph: EnergyStateGraph) -> Result<SolvedGraph, PlanningError> {
        let horizon = graph.horizon();
        let levels = graph.level_count();

        for t in (0..horizon).rev() {
            for level in 0..levels {
                let id = NodeId { time_slice: t, level };
                let best = best_edge(&graph, id);
                if let Some((index, head, cost)) = best {
                    let node = graph.node_mut(id);
                    node.path_cost = cost;
                    node.next = Some(head);
                    node.next_edge = Some(index);
                }
            }
        }

        if let Some(node) = graph.nodes_at(0).iter().find(|n| !n.path_cost.is_finite()) {
            return Err(PlanningError::Infeasible {
                level: node.id.level,
                stored_kwh: node.stored_energy_kwh,
            });
        }

        debug!(
            horizon,
            levels,
            policy = graph.policy_name(),
            "dispatch graph solved"
        );
        Ok(SolvedGraph { graph })
    }
}

fn best_edge(graph: &EnergyStateGraph, id: NodeId) -> Option<(usize, NodeId, f64)> {
    let mut best: Option<(usize, NodeId, f64)> = None;
    for (index, edge) in graph.edges_from(id).iter().enumerate() {
        let candidate = edge.cost + graph.node(edge.head).path_cost;
        if !candidate.is_finite() {
            continue;
        }
        best = match best {
            None => Some((index, edge.head, candidate)),
            Some((_, _, cost)) if candidate < cost - COST_TIE_EPSILON => Some((index, edge.head, candidate)),
            Some((_, head, cost))
                if (candidate - cost).abs() <= COST_TIE_EPSILON && edge.head.level > head.level =>
            {
                Some((index, edge.head, candidate))
            }
            keep => keep,
        };
    }
    best
}

/// A graph whose `t = 0` nodes all carry finite optimal costs
#[derive(Debug, Clone)]
pub struct SolvedGraph {
    graph: EnergyStateGraph,
}

impl SolvedGraph {
    pub fn graph(&self) -> &EnergyStateGraph {
        &self.graph
    }

    /// Level nearest to the forecast's initial stored energy
    pub fn initial_level(&self) -> usize {
        let storage = &self.graph.input().storage;
        storage.level_for(storage.initial_kwh)
    }

    pub fn path_cost(&self, level: usize) -> f64 {
        self.graph.node(NodeId { time_slice: 0, level }).path_cost()
    }

    /// Optimal edges from `(0, level)` to the boundary, one per hour
    pub fn chain_from(&self, level: usize) -> Vec<&EnergyTransition> {
        let mut chain = Vec::with_capacity(self.graph.horizon());
        let mut id = NodeId { time_slice: 0, level };
        while id.time_slice < self.graph.horizon() {
            let Some(index) = self.graph.node(id).next_edge else {
                break;
            };
            let edge = &self.graph.edges_from(id)[index];
            chain.push(edge);
            id = edge.head;
        }
        chain
    }

    pub fn plan(&self) -> DispatchPlan {
        self.plan_from(self.initial_level())
    }

    pub fn plan_from(&self, level: usize) -> DispatchPlan {
        let input = self.graph.input();
        let entries = self
            .chain_from(level)
            .into_iter()
            .map(|edge| {
                let t = edge.tail.time_slice;
                PlanEntry {
                    hour_start: input.hour_start(t),
                    storage_before: Energy::kilowatt_hours(input.storage.level_energy_kwh(edge.tail.level)),
                    storage_after: Energy::kilowatt_hours(input.storage.level_energy_kwh(edge.head.level)),
                    heat: Energy::kilowatt_hours(edge.heat_kwh),
                    electricity: Energy::kilowatt_hours(edge.electricity_kwh),
                    price: Price::usd_per_mwh(input.price_usd_per_mwh[t]),
                    cost: Cost::usd(edge.cost),
                    action: edge.action,
                    heat_pump_on: edge.heat_pump_on(),
                }
            })
            .collect();

        DispatchPlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            start: input.start,
            policy: self.graph.policy_name().to_string(),
            total_cost: Cost::usd(self.path_cost(level)),
            entries,
        }
    }

    /// Electricity drawn during the first hour when starting at `level`
    pub fn first_hour_electricity(&self, level: usize) -> Energy {
        self.chain_from(level)
            .first()
            .map(|e| Energy::kilowatt_hours(e.electricity_kwh))
            .unwrap_or(Energy::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::fixtures::flat_forecast;
    use crate::optimizer::policy::OnOffPolicy;
    use crate::optimizer::types::StorageAction;

    #[test]
    fn test_every_initial_level_has_full_chain() {
        let solved = DispatchOptimizer::default().plan(&flat_forecast(12)).unwrap();
        for level in 0..solved.graph().level_count() {
            assert!(solved.path_cost(level).is_finite());
            let chain = solved.chain_from(level);
            assert_eq!(chain.len(), 12);
            let last = chain.last().unwrap().head;
            assert_eq!(last.time_slice, 12);
            assert_eq!(solved.graph().node(last).path_cost(), 0.0);
        }
    }

    #[test]
    fn test_path_cost_is_sum_of_chain() {
        let mut input = flat_forecast(8);
        input.price_usd_per_mwh = vec![50.0, 200.0, 30.0, 300.0, 80.0, 20.0, 250.0, 90.0];
        let solved = DispatchOptimizer::default().plan(&input).unwrap();
        let level = solved.initial_level();
        let sum: f64 = solved.chain_from(level).iter().map(|e| e.cost).sum();
        assert!((sum - solved.path_cost(level)).abs() < 1e-9);
    }

    #[test]
    fn test_cheap_hour_is_used_for_expensive_hour() {
        let mut input = flat_forecast(2);
        input.storage.initial_kwh = 0.0;
        input.price_usd_per_mwh = vec![10.0, 1000.0];
        let plan = DispatchOptimizer::default().plan(&input).unwrap().plan();
        assert_eq!(plan.entries.len(), 2);
        // buy both hours of load in the first hour
        assert!((plan.entries[0].heat.as_kwh() - 4.0).abs() < 1e-9);
        assert_eq!(plan.entries[0].action, StorageAction::Charge);
        assert_eq!(plan.entries[1].heat, Energy::ZERO);
        assert!(!plan.entries[1].heat_pump_on);
    }

    #[test]
    fn test_tie_prefers_more_stored_energy() {
        // Flat prices make charging early and charging late cost the same
        let mut input = flat_forecast(3);
        input.storage.initial_kwh = 0.0;
        let solved = DispatchOptimizer::default().plan(&input).unwrap();
        let first = solved.chain_from(0)[0];
        // level 0 -> the largest level still drained by the end: 4 kWh covers hours 1 and 2
        assert_eq!(first.head.level, 4);
    }

    #[test]
    fn test_solve_is_deterministic() {
        let mut input = flat_forecast(24);
        input.price_usd_per_mwh = (0..24).map(|h| 40.0 + (h % 5) as f64 * 10.0).collect();
        let optimizer = DispatchOptimizer::new(Box::new(OnOffPolicy));
        let a = optimizer.plan(&input).unwrap().plan();
        let b = optimizer.plan(&input).unwrap().plan();
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.total_cost, b.total_cost);
    }

    #[test]
    fn test_empty_level_infeasible_when_heat_pump_too_small() {
        let mut input = flat_forecast(2);
        input.heat_pump.max_heat_kwh_per_hour = 1.0;
        let err = DispatchOptimizer::default().plan(&input).unwrap_err();
        assert!(matches!(err, PlanningError::Infeasible { level: 0, .. }));
    }
}
