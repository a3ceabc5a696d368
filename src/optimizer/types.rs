use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::bid::BidError;
use crate::domain::{Cost, Energy, ForecastError, Price};

/// Planning-time errors. Each one is fatal to the planning cycle that hit it.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Invalid forecast: {0}")]
    InvalidForecast(#[from] ForecastError),
    #[error("Infeasible horizon: no path from any initial storage level reaches hour {horizon}")]
    InfeasibleHorizon { horizon: usize },
    #[error("Infeasible: storage level {level} ({stored_kwh} kWh) at hour 0 has no path to the boundary")]
    Infeasible { level: usize, stored_kwh: f64 },
    #[error("Bid rejected: {0}")]
    Bid(#[from] BidError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageAction {
    Charge,
    Discharge,
    Idle,
}

impl std::fmt::Display for StorageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageAction::Charge => write!(f, "charge"),
            StorageAction::Discharge => write!(f, "discharge"),
            StorageAction::Idle => write!(f, "idle"),
        }
    }
}

/// One hour of the recommended operating plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub hour_start: DateTime<Utc>,
    pub storage_before: Energy,
    pub storage_after: Energy,
    /// Thermal output of the heat pump over the hour
    pub heat: Energy,
    /// Electrical energy drawn by the heat pump over the hour
    pub electricity: Energy,
    pub price: Price,
    pub cost: Cost,
    pub action: StorageAction,
    pub heat_pump_on: bool,
}

impl PlanEntry {
    pub fn hour_end(&self) -> DateTime<Utc> {
        self.hour_start + Duration::hours(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub policy: String,
    pub total_cost: Cost,
    pub entries: Vec<PlanEntry>,
}

impl DispatchPlan {
    pub fn entry_at(&self, t: DateTime<Utc>) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| t >= e.hour_start && t < e.hour_end())
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.entries.last().map(|e| e.hour_end()).unwrap_or(self.start)
    }

    pub fn total_electricity(&self) -> Energy {
        self.entries.iter().fold(Energy::ZERO, |acc, e| acc + e.electricity)
    }
}
