use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{hour_floor, ForecastProvider, ForecastSourceError};
use crate::config::PlannerConfig;
use crate::domain::{ForecastInput, HeatPumpParams, StorageParams};

/// Constant price, load and temperature over the whole horizon. Stands in
/// for a real forecast service in simulation and first-boot setups.
#[derive(Debug, Clone)]
pub struct FlatForecastProvider {
    horizon_hours: usize,
    price_usd_per_mwh: f64,
    load_kwh: f64,
    outside_temp_c: f64,
    storage: StorageParams,
    heat_pump: HeatPumpParams,
}

impl FlatForecastProvider {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            horizon_hours: config.horizon_hours,
            price_usd_per_mwh: config.flat_price_usd_per_mwh,
            load_kwh: config.flat_load_kwh,
            outside_temp_c: config.flat_outside_temp_c,
            storage: config.storage.clone(),
            heat_pump: config.heat_pump.clone(),
        }
    }
}

#[async_trait]
impl ForecastProvider for FlatForecastProvider {
    async fn forecast(&self, now: DateTime<Utc>) -> Result<ForecastInput, ForecastSourceError> {
        let h = self.horizon_hours;
        let input = ForecastInput {
            start: hour_floor(now),
            horizon_hours: h,
            price_usd_per_mwh: vec![self.price_usd_per_mwh; h],
            load_kwh: vec![self.load_kwh; h],
            outside_temp_c: vec![self.outside_temp_c; h],
            storage: self.storage.clone(),
            heat_pump: self.heat_pump.clone(),
        };
        input.check()?;
        Ok(input)
    }
}
