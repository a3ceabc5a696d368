//! Time-expanded graph of admissible storage states.
//!
//! Node `(t, level)` is the system at the start of hour `t` holding
//! `level * step_kwh` of usable thermal energy. Edges only connect hour `t`
//! to hour `t + 1`, so the graph is a DAG over time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::policy::EdgePolicy;
use super::types::{PlanningError, StorageAction};
use crate::domain::ForecastInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub time_slice: usize,
    pub level: usize,
}

#[derive(Debug, Clone)]
pub struct EnergyNode {
    pub id: NodeId,
    pub stored_energy_kwh: f64,
    pub(crate) path_cost: f64,
    pub(crate) next: Option<NodeId>,
    pub(crate) next_edge: Option<usize>,
}

impl EnergyNode {
    fn new(id: NodeId, stored_energy_kwh: f64, horizon: usize) -> Self {
        Self {
            id,
            stored_energy_kwh,
            path_cost: if id.time_slice == horizon { 0.0 } else { f64::INFINITY },
            next: None,
            next_edge: None,
        }
    }

    /// Cumulative cost from this node to the horizon boundary
    pub fn path_cost(&self) -> f64 {
        self.path_cost
    }

    /// Successor on the optimal path, `None` until solved and at the boundary
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn is_boundary(&self, horizon: usize) -> bool {
        self.id.time_slice == horizon
    }
}

/// One operating choice for one hour. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyTransition {
    pub tail: NodeId,
    pub head: NodeId,
    /// Marginal cost of the choice (USD)
    pub cost: f64,
    /// Heat pump thermal output over the hour (kWh)
    pub heat_kwh: f64,
    /// Heat pump electrical input over the hour (kWh)
    pub electricity_kwh: f64,
    pub action: StorageAction,
}

impl EnergyTransition {
    pub fn heat_pump_on(&self) -> bool {
        self.heat_kwh > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct EnergyStateGraph {
    input: ForecastInput,
    policy: &'static str,
    nodes: Vec<Vec<EnergyNode>>,
    edges: Vec<Vec<Vec<EnergyTransition>>>,
}

impl EnergyStateGraph {
    /// Enumerate every node and every admissible edge for the forecast.
    /// Pure: identical inputs give identical graphs.
    pub fn build(input: &ForecastInput, policy: &dyn EdgePolicy) -> Result<Self, PlanningError> {
        input.check()?;

        let horizon = input.horizon_hours;
        let levels = input.storage.level_count();

        let nodes: Vec<Vec<EnergyNode>> = (0..=horizon)
            .map(|t| {
                (0..levels)
                    .map(|level| {
                        EnergyNode::new(
                            NodeId { time_slice: t, level },
                            input.storage.level_energy_kwh(level),
                            horizon,
                        )
                    })
                    .collect()
            })
            .collect();

        let edges: Vec<Vec<Vec<EnergyTransition>>> = (0..horizon)
            .map(|t| (0..levels).map(|level| policy.edges(input, t, level)).collect())
            .collect();

        let graph = Self {
            input: input.clone(),
            policy: policy.name(),
            nodes,
            edges,
        };

        if !graph.any_initial_level_reaches_boundary() {
            return Err(PlanningError::InfeasibleHorizon { horizon });
        }

        debug!(
            horizon,
            levels,
            edges = graph.edge_count(),
            policy = graph.policy,
            "energy state graph built"
        );
        Ok(graph)
    }

    fn any_initial_level_reaches_boundary(&self) -> bool {
        let levels = self.level_count();
        let mut reaches = vec![true; levels];
        for t in (0..self.horizon()).rev() {
            reaches = (0..levels)
                .map(|level| self.edges[t][level].iter().any(|e| reaches[e.head.level]))
                .collect();
        }
        reaches.iter().any(|r| *r)
    }

    pub fn input(&self) -> &ForecastInput {
        &self.input
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy
    }

    pub fn horizon(&self) -> usize {
        self.input.horizon_hours
    }

    pub fn level_count(&self) -> usize {
        self.nodes[0].len()
    }

    pub fn node(&self, id: NodeId) -> &EnergyNode {
        &self.nodes[id.time_slice][id.level]
    }

    pub fn nodes_at(&self, t: usize) -> &[EnergyNode] {
        &self.nodes[t]
    }

    pub fn edges_from(&self, id: NodeId) -> &[EnergyTransition] {
        &self.edges[id.time_slice][id.level]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().flatten().map(Vec::len).sum()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut EnergyNode {
        &mut self.nodes[id.time_slice][id.level]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::fixtures::flat_forecast;
    use crate::optimizer::policy::{OnOffPolicy, ReachableLevelPolicy};

    #[test]
    fn test_boundary_nodes_start_at_zero() {
        let graph = EnergyStateGraph::build(&flat_forecast(6), &ReachableLevelPolicy).unwrap();
        for node in graph.nodes_at(6) {
            assert_eq!(node.path_cost(), 0.0);
            assert!(node.next().is_none());
        }
        for node in graph.nodes_at(0) {
            assert!(node.path_cost().is_infinite());
        }
    }

    #[test]
    fn test_edges_connect_consecutive_slices() {
        let graph = EnergyStateGraph::build(&flat_forecast(4), &ReachableLevelPolicy).unwrap();
        for t in 0..4 {
            for node in graph.nodes_at(t) {
                for edge in graph.edges_from(node.id) {
                    assert_eq!(edge.tail, node.id);
                    assert_eq!(edge.head.time_slice, t + 1);
                    assert!(edge.cost >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let input = flat_forecast(8);
        let a = EnergyStateGraph::build(&input, &OnOffPolicy).unwrap();
        let b = EnergyStateGraph::build(&input, &OnOffPolicy).unwrap();
        assert_eq!(a.edge_count(), b.edge_count());
        for t in 0..8 {
            for node in a.nodes_at(t) {
                assert_eq!(a.edges_from(node.id), b.edges_from(node.id));
            }
        }
    }

    #[test]
    fn test_wrong_series_length_is_invalid_forecast() {
        let mut input = flat_forecast(24);
        input.price_usd_per_mwh.truncate(12);
        let err = EnergyStateGraph::build(&input, &ReachableLevelPolicy).unwrap_err();
        assert!(matches!(err, PlanningError::InvalidForecast(_)));
    }

    #[test]
    fn test_unreachable_boundary_is_infeasible_horizon() {
        let mut input = flat_forecast(4);
        // Load far above what storage plus heat pump can ever cover
        input.load_kwh = vec![100.0; 4];
        let err = EnergyStateGraph::build(&input, &ReachableLevelPolicy).unwrap_err();
        assert!(matches!(err, PlanningError::InfeasibleHorizon { horizon: 4 }));
    }
}
