//! Edge generation policies.
//!
//! A policy decides which operating choices exist at a node. The graph and
//! the optimizer only see the resulting transitions.

use super::graph::{EnergyTransition, NodeId};
use super::types::StorageAction;
use crate::domain::ForecastInput;

const ENERGY_EPSILON_KWH: f64 = 1e-9;

pub trait EdgePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Outgoing transitions of node `(t, level)`, in a stable order
    fn edges(&self, input: &ForecastInput, t: usize, level: usize) -> Vec<EnergyTransition>;
}

/// Policy registered under `name`
pub fn policy_by_name(name: &str) -> Option<Box<dyn EdgePolicy>> {
    match name {
        "reachable-level" => Some(Box::new(ReachableLevelPolicy)),
        "on-off" => Some(Box::new(OnOffPolicy)),
        _ => None,
    }
}

/// Variable-speed heat pump: every storage level reachable with an output
/// between zero and the hourly maximum is a choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachableLevelPolicy;

impl EdgePolicy for ReachableLevelPolicy {
    fn name(&self) -> &'static str {
        "reachable-level"
    }

    fn edges(&self, input: &ForecastInput, t: usize, level: usize) -> Vec<EnergyTransition> {
        let storage = &input.storage;
        let retained = storage.level_energy_kwh(level) * (1.0 - storage.loss_fraction_per_hour);
        let load = input.load_kwh[t];
        let max_heat = input.heat_pump.max_heat_kwh_per_hour;

        (0..storage.level_count())
            .filter_map(|head_level| {
                let heat = storage.level_energy_kwh(head_level) - retained + load;
                if heat < -ENERGY_EPSILON_KWH || heat > max_heat + ENERGY_EPSILON_KWH {
                    return None;
                }
                Some(transition(input, t, level, head_level, heat.clamp(0.0, max_heat)))
            })
            .collect()
    }
}

/// Fixed-speed heat pump: off, or on at full output for the hour
#[derive(Debug, Clone, Copy, Default)]
pub struct OnOffPolicy;

impl EdgePolicy for OnOffPolicy {
    fn name(&self) -> &'static str {
        "on-off"
    }

    fn edges(&self, input: &ForecastInput, t: usize, level: usize) -> Vec<EnergyTransition> {
        let storage = &input.storage;
        let retained = storage.level_energy_kwh(level) * (1.0 - storage.loss_fraction_per_hour);
        let load = input.load_kwh[t];
        let top = storage.level_energy_kwh(storage.level_count() - 1);

        [0.0, input.heat_pump.max_heat_kwh_per_hour]
            .into_iter()
            .filter_map(|heat| {
                let after = retained + heat - load;
                if after < -ENERGY_EPSILON_KWH || after > top + storage.step_kwh / 2.0 {
                    return None;
                }
                Some(transition(input, t, level, storage.level_for(after), heat))
            })
            .collect()
    }
}

fn transition(input: &ForecastInput, t: usize, level: usize, head_level: usize, heat_kwh: f64) -> EnergyTransition {
    let electricity_kwh = heat_kwh / input.cop(t);
    let mut cost = electricity_kwh * input.price_usd_per_mwh[t] / 1000.0;
    if heat_kwh > 0.0 {
        cost += input.heat_pump.cycle_penalty_usd;
    }
    let action = match head_level.cmp(&level) {
        std::cmp::Ordering::Greater => StorageAction::Charge,
        std::cmp::Ordering::Less => StorageAction::Discharge,
        std::cmp::Ordering::Equal => StorageAction::Idle,
    };
    EnergyTransition {
        tail: NodeId { time_slice: t, level },
        head: NodeId {
            time_slice: t + 1,
            level: head_level,
        },
        cost,
        heat_kwh,
        electricity_kwh,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::fixtures::flat_forecast;

    #[test]
    fn test_reachable_levels_respect_heat_limit() {
        let input = flat_forecast(2);
        // level 4 (4 kWh), load 2, max heat 10: heads 2..=12
        let edges = ReachableLevelPolicy.edges(&input, 0, 4);
        let heads: Vec<usize> = edges.iter().map(|e| e.head.level).collect();
        assert_eq!(heads, (2..=12).collect::<Vec<_>>());
        assert_eq!(edges[0].heat_kwh, 0.0);
        assert_eq!(edges[0].action, StorageAction::Discharge);
        assert_eq!(edges[2].action, StorageAction::Idle);
        assert_eq!(edges.last().unwrap().action, StorageAction::Charge);
    }

    #[test]
    fn test_edge_cost_uses_cop_and_price() {
        let input = flat_forecast(2);
        // 3 kWh of heat at COP 3 is 1 kWh electric at 100 $/MWh
        let edge = ReachableLevelPolicy
            .edges(&input, 0, 4)
            .into_iter()
            .find(|e| e.head.level == 5)
            .unwrap();
        assert!((edge.heat_kwh - 3.0).abs() < 1e-9);
        assert!((edge.electricity_kwh - 1.0).abs() < 1e-9);
        assert!((edge.cost - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_on_off_has_at_most_two_choices() {
        let input = flat_forecast(2);
        for level in 0..input.storage.level_count() {
            let edges = OnOffPolicy.edges(&input, 0, level);
            assert!(edges.len() <= 2);
        }
        // empty storage cannot idle through a 2 kWh load
        let edges = OnOffPolicy.edges(&input, 0, 0);
        assert_eq!(edges.len(), 1);
        assert!(edges[0].heat_pump_on());
    }

    #[test]
    fn test_cycle_penalty_only_when_running() {
        let mut input = flat_forecast(2);
        input.heat_pump.cycle_penalty_usd = 0.5;
        let edges = ReachableLevelPolicy.edges(&input, 0, 4);
        assert_eq!(edges[0].cost, 0.0);
        assert!(edges[1].cost > 0.5);
    }

    #[test]
    fn test_policies_resolve_by_name() {
        assert_eq!(policy_by_name("on-off").map(|p| p.name()), Some("on-off"));
        assert_eq!(policy_by_name("reachable-level").map(|p| p.name()), Some("reachable-level"));
        assert!(policy_by_name("greedy").is_none());
    }
}
