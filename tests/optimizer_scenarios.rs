mod common;

use proptest::prelude::*;
use thermal_dispatch::domain::{Energy, MarketType};
use thermal_dispatch::optimizer::{
    BidRecommender, DispatchOptimizer, OnOffPolicy, PlanningError, StorageAction,
};

#[test]
fn test_single_cheap_hour_covers_the_day() {
    // 5 kWh in store covers hours 0..5, hour 5 is the cheapest of the day
    let mut input = common::forecast(24);
    input.storage.initial_kwh = 5.0;
    input.price_usd_per_mwh[5] = 20.0;

    let solved = DispatchOptimizer::default().plan(&input).unwrap();
    let plan = solved.plan();
    assert_eq!(plan.entries.len(), 24);

    for (t, entry) in plan.entries.iter().enumerate() {
        if t == 5 {
            // this hour's load plus the 18 hours after it
            assert!((entry.heat.as_kwh() - 19.0).abs() < 1e-9);
            assert_eq!(entry.action, StorageAction::Charge);
            assert!(entry.heat_pump_on);
        } else {
            assert_eq!(entry.heat, Energy::ZERO, "hour {t} should not run the heat pump");
        }
    }
    assert_eq!(plan.entries.last().unwrap().storage_after, Energy::ZERO);

    // Every hour bought at the flat price, less what the cheap hour saves
    let cop = 3.0;
    let flat_cost: f64 = (0..19).map(|_| 1.0 / cop * 100.0 / 1000.0).sum();
    let savings = 19.0 / cop * (100.0 - 20.0) / 1000.0;
    let path_cost = solved.path_cost(solved.initial_level());
    assert!((path_cost - (flat_cost - savings)).abs() < 1e-9);
    assert!((plan.total_cost.as_usd() - path_cost).abs() < 1e-9);
}

#[test]
fn test_policies_agree_when_output_is_all_or_nothing() {
    // Heat pump sized to exactly one hour of load: both policies see the same choices
    let mut input = common::forecast(6);
    input.heat_pump.max_heat_kwh_per_hour = 1.0;
    input.storage.capacity_kwh = 1.0;
    let variable = DispatchOptimizer::default().plan(&input).unwrap();
    let fixed = DispatchOptimizer::new(Box::new(OnOffPolicy)).plan(&input).unwrap();
    assert!((variable.path_cost(0) - fixed.path_cost(0)).abs() < 1e-9);
}

#[test]
fn test_heat_pump_too_small_for_load_is_infeasible() {
    let mut input = common::forecast(4);
    input.load_kwh = vec![40.0; 4];
    let err = DispatchOptimizer::default().plan(&input).unwrap_err();
    assert!(matches!(
        err,
        PlanningError::InfeasibleHorizon { .. } | PlanningError::Infeasible { .. }
    ));
}

#[test]
fn test_malformed_forecast_rejected() {
    let mut input = common::forecast(4);
    input.outside_temp_c.push(1.0);
    assert!(matches!(
        DispatchOptimizer::default().plan(&input),
        Err(PlanningError::InvalidForecast(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_plan_respects_physics(
        prices in prop::collection::vec(-50.0f64..500.0, 8),
        loads in prop::collection::vec(0.0f64..6.0, 8),
        initial in 0.0f64..30.0,
    ) {
        let mut input = common::forecast(8);
        input.price_usd_per_mwh = prices;
        input.load_kwh = loads.iter().map(|l| l.round()).collect();
        input.storage.initial_kwh = initial;

        let plan = DispatchOptimizer::default().plan(&input).unwrap().plan();
        prop_assert_eq!(plan.entries.len(), 8);
        for (t, entry) in plan.entries.iter().enumerate() {
            let balance = entry.storage_before.as_kwh() + entry.heat.as_kwh() - input.load_kwh[t];
            prop_assert!((balance - entry.storage_after.as_kwh()).abs() < 1e-6);
            prop_assert!(entry.heat.as_kwh() <= input.heat_pump.max_heat_kwh_per_hour + 1e-9);
            prop_assert!(entry.storage_after.as_kwh() <= input.storage.capacity_kwh + 1e-9);
        }
        for pair in plan.entries.windows(2) {
            prop_assert_eq!(pair[0].storage_after, pair[1].storage_before);
        }
    }

    #[test]
    fn prop_bid_quantity_never_rises_with_price(
        prices in prop::collection::vec(0.0f64..400.0, 6),
    ) {
        let mut input = common::forecast(6);
        input.price_usd_per_mwh = prices;
        let recommender = BidRecommender::new(MarketType::Rt60Gate5, "hw1.scada", 9);
        let bid = recommender.recommend(&DispatchOptimizer::default(), &input).unwrap();
        for w in bid.pq_pairs.windows(2) {
            prop_assert!(w[1].price > w[0].price);
            prop_assert!(w[1].quantity <= w[0].quantity);
        }
    }

    #[test]
    fn prop_solve_is_deterministic(
        prices in prop::collection::vec(0.0f64..300.0, 12),
    ) {
        let mut input = common::forecast(12);
        input.price_usd_per_mwh = prices;
        let optimizer = DispatchOptimizer::default();
        let a = optimizer.plan(&input).unwrap().plan();
        let b = optimizer.plan(&input).unwrap().plan();
        prop_assert_eq!(a.entries, b.entries);
    }
}
