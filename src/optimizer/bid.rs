//! Market bid construction from the optimizer's price response.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::dp::DispatchOptimizer;
use super::types::PlanningError;
use crate::domain::{Cost, Energy, ForecastInput, MarketType, Price, Versioned};

#[derive(Debug, Error, PartialEq)]
pub enum BidError {
    #[error("Bid has no price/quantity pairs")]
    Empty,
    #[error("Quantity increases with price at pair {index}")]
    NonMonotonic { index: usize },
    #[error("Price {price} at pair {index} outside [{floor}, {cap}]")]
    PriceOutOfBounds {
        index: usize,
        price: Price,
        floor: Price,
        cap: Price,
    },
    #[error("Prices not strictly increasing at pair {index}")]
    UnsortedPrices { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PqPair {
    pub price: Price,
    /// Electrical energy bought over the slot
    pub quantity: Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSlot {
    pub market_type: MarketType,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub floor: Price,
    pub cap: Price,
}

impl PriceBounds {
    pub fn for_market(market_type: MarketType) -> Self {
        Self {
            floor: Price::usd_per_mwh(market_type.price_floor_usd_per_mwh()),
            cap: Price::usd_per_mwh(market_type.price_cap_usd_per_mwh()),
        }
    }

    /// Market defaults with optional per-side overrides
    pub fn with_overrides(market_type: MarketType, floor: Option<f64>, cap: Option<f64>) -> Self {
        let defaults = Self::for_market(market_type);
        Self {
            floor: floor.map(Price::usd_per_mwh).unwrap_or(defaults.floor),
            cap: cap.map(Price::usd_per_mwh).unwrap_or(defaults.cap),
        }
    }

    pub fn contains(&self, price: Price) -> bool {
        price >= self.floor && price <= self.cap
    }
}

/// Price-sensitive demand bid for one market slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub bid_id: Uuid,
    pub bidder_alias: String,
    pub market_slot: MarketSlot,
    pub created_at: DateTime<Utc>,
    pub pq_pairs: Vec<PqPair>,
    /// Plan cost at the forecast price
    pub expected_cost: Cost,
}

impl Versioned for Bid {
    const TYPE_NAME: &'static str = "bid";
    const VERSION: &'static str = "002";
}

impl Bid {
    /// Checks that prices are strictly increasing and inside `bounds`, and
    /// that quantity never increases with price.
    pub fn new(
        bidder_alias: impl Into<String>,
        market_slot: MarketSlot,
        pq_pairs: Vec<PqPair>,
        bounds: PriceBounds,
        expected_cost: Cost,
    ) -> Result<Self, BidError> {
        if pq_pairs.is_empty() {
            return Err(BidError::Empty);
        }
        for (index, pair) in pq_pairs.iter().enumerate() {
            if !bounds.contains(pair.price) {
                return Err(BidError::PriceOutOfBounds {
                    index,
                    price: pair.price,
                    floor: bounds.floor,
                    cap: bounds.cap,
                });
            }
        }
        for (index, (a, b)) in pq_pairs.iter().tuple_windows().enumerate() {
            if b.price <= a.price {
                return Err(BidError::UnsortedPrices { index: index + 1 });
            }
            if b.quantity > a.quantity {
                return Err(BidError::NonMonotonic { index: index + 1 });
            }
        }

        Ok(Self {
            bid_id: Uuid::new_v4(),
            bidder_alias: bidder_alias.into(),
            market_slot,
            created_at: Utc::now(),
            pq_pairs,
            expected_cost,
        })
    }

    /// Quantity the bid commits to at a clearing price
    pub fn quantity_at(&self, price: Price) -> Energy {
        self.pq_pairs
            .iter()
            .take_while(|p| p.price <= price)
            .last()
            .or_else(|| self.pq_pairs.first())
            .map(|p| p.quantity)
            .unwrap_or(Energy::ZERO)
    }
}

pub struct BidRecommender {
    market_type: MarketType,
    bidder_alias: String,
    ladder_points: usize,
    bounds: PriceBounds,
}

impl BidRecommender {
    pub fn new(market_type: MarketType, bidder_alias: impl Into<String>, ladder_points: usize) -> Self {
        Self {
            market_type,
            bidder_alias: bidder_alias.into(),
            ladder_points,
            bounds: PriceBounds::for_market(market_type),
        }
    }

    pub fn with_bounds(mut self, bounds: PriceBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    /// Sorted, deduplicated prices at which the first hour is re-solved
    pub fn price_ladder(&self, input: &ForecastInput) -> Vec<f64> {
        let floor = self.bounds.floor.as_usd_per_mwh();
        let cap = self.bounds.cap.as_usd_per_mwh();
        let mut ladder: BTreeSet<OrderedFloat<f64>> = BTreeSet::new();
        ladder.insert(OrderedFloat(floor));
        ladder.insert(OrderedFloat(cap));
        for price in &input.price_usd_per_mwh {
            if (floor..=cap).contains(price) {
                ladder.insert(OrderedFloat(*price));
            }
        }
        if self.ladder_points > 1 {
            let step = (cap - floor) / (self.ladder_points - 1) as f64;
            for i in 0..self.ladder_points {
                ladder.insert(OrderedFloat(floor + step * i as f64));
            }
        }
        ladder.into_iter().map(|p| p.into_inner()).collect()
    }

    /// Re-solve with each ladder price in the first hour and record the
    /// first-hour electricity of the plan from the initial storage level.
    pub fn recommend(&self, optimizer: &DispatchOptimizer, input: &ForecastInput) -> Result<Bid, PlanningError> {
        let baseline = optimizer.plan(input)?;
        let expected_cost = Cost::usd(baseline.path_cost(baseline.initial_level()));

        let mut pq_pairs = Vec::new();
        let mut running_min = f64::INFINITY;
        let mut clamped = 0usize;
        for price in self.price_ladder(input) {
            let solved = optimizer.plan(&input.with_price_at(0, price))?;
            let quantity = solved.first_hour_electricity(solved.initial_level()).as_kwh();
            if quantity > running_min {
                debug!(price, quantity, clamped_to = running_min, "bid quantity clamped to keep ladder monotonic");
                clamped += 1;
            }
            running_min = running_min.min(quantity);
            pq_pairs.push(PqPair {
                price: Price::usd_per_mwh(price),
                quantity: Energy::kilowatt_hours(running_min),
            });
        }

        let slot = MarketSlot {
            market_type: self.market_type,
            start: input.start,
        };
        let bid = Bid::new(self.bidder_alias.clone(), slot, pq_pairs, self.bounds, expected_cost)?;
        info!(
            bid_id = %bid.bid_id,
            market = %self.market_type,
            pairs = bid.pq_pairs.len(),
            clamped,
            expected_cost = %bid.expected_cost,
            "bid recommended"
        );
        Ok(bid)
    }
}
