use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::versioned::Versioned;

/// Forecast input errors
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Series {series} has {found} entries, horizon is {expected}")]
    SeriesLength {
        series: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Series {series} has a non-finite value at hour {index}")]
    NonFinite { series: &'static str, index: usize },
    #[error("Series {series} has a negative value at hour {index}")]
    Negative { series: &'static str, index: usize },
    #[error("COP curve must be sorted by outside temperature with positive COP values")]
    BadCopCurve,
    #[error("Storage step {step_kwh} kWh does not fit capacity {capacity_kwh} kWh")]
    BadQuantization { step_kwh: f64, capacity_kwh: f64 },
    #[error("Invalid parameters: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Thermal storage physical parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageParams {
    /// Usable thermal capacity (kWh)
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    /// Quantization step of the storage axis (kWh)
    #[validate(range(exclusive_min = 0.0))]
    pub step_kwh: f64,
    /// Stored energy at the start of the horizon (kWh)
    #[validate(range(min = 0.0))]
    pub initial_kwh: f64,
    /// Fraction of stored energy lost per hour
    #[validate(range(min = 0.0, max = 1.0))]
    pub loss_fraction_per_hour: f64,
}

impl StorageParams {
    /// Number of quantized levels, including the empty level
    pub fn level_count(&self) -> usize {
        (self.capacity_kwh / self.step_kwh).floor() as usize + 1
    }

    pub fn level_energy_kwh(&self, level: usize) -> f64 {
        level as f64 * self.step_kwh
    }

    /// Nearest level for an energy value, clamped into range
    pub fn level_for(&self, energy_kwh: f64) -> usize {
        let max_level = self.level_count() - 1;
        let level = (energy_kwh.max(0.0) / self.step_kwh).round() as usize;
        level.min(max_level)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CopPoint {
    pub outside_temp_c: f64,
    pub cop: f64,
}

/// Heat pump physical parameters and performance curve
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HeatPumpParams {
    /// Maximum thermal output over one hour (kWh)
    #[validate(range(exclusive_min = 0.0))]
    pub max_heat_kwh_per_hour: f64,
    /// COP as a function of outside temperature, sorted by temperature
    #[validate(length(min = 1))]
    pub cop_curve: Vec<CopPoint>,
    /// Fixed wear cost added to every hour the heat pump runs (USD)
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub cycle_penalty_usd: f64,
}

impl HeatPumpParams {
    /// Linear interpolation of the COP curve, clamped at both ends
    pub fn cop_at(&self, outside_temp_c: f64) -> f64 {
        let first = self.cop_curve[0];
        let last = self.cop_curve[self.cop_curve.len() - 1];
        if outside_temp_c <= first.outside_temp_c {
            return first.cop;
        }
        if outside_temp_c >= last.outside_temp_c {
            return last.cop;
        }
        for pair in self.cop_curve.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if outside_temp_c <= hi.outside_temp_c {
                let span = hi.outside_temp_c - lo.outside_temp_c;
                if span <= 0.0 {
                    return hi.cop;
                }
                let frac = (outside_temp_c - lo.outside_temp_c) / span;
                return lo.cop + frac * (hi.cop - lo.cop);
            }
        }
        last.cop
    }

    fn curve_is_valid(&self) -> bool {
        self.cop_curve.iter().all(|p| p.cop.is_finite() && p.cop > 0.0 && p.outside_temp_c.is_finite())
            && self
                .cop_curve
                .windows(2)
                .all(|w| w[0].outside_temp_c <= w[1].outside_temp_c)
    }
}

/// Hourly price and heating-load forecast over a fixed horizon
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForecastInput {
    pub start: DateTime<Utc>,
    #[validate(range(min = 1, max = 168))]
    pub horizon_hours: usize,
    pub price_usd_per_mwh: Vec<f64>,
    /// Projected heating load per hour (thermal kWh)
    pub load_kwh: Vec<f64>,
    pub outside_temp_c: Vec<f64>,
    #[validate(nested)]
    pub storage: StorageParams,
    #[validate(nested)]
    pub heat_pump: HeatPumpParams,
}

impl Versioned for ForecastInput {
    const TYPE_NAME: &'static str = "dispatch.forecast";
    const VERSION: &'static str = "001";
}

impl ForecastInput {
    /// Full schema check: field ranges, series lengths and physical sanity
    pub fn check(&self) -> Result<(), ForecastError> {
        self.validate()?;
        let h = self.horizon_hours;
        for (series, values) in [
            ("price_usd_per_mwh", &self.price_usd_per_mwh),
            ("load_kwh", &self.load_kwh),
            ("outside_temp_c", &self.outside_temp_c),
        ] {
            if values.len() != h {
                return Err(ForecastError::SeriesLength {
                    series,
                    expected: h,
                    found: values.len(),
                });
            }
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(ForecastError::NonFinite { series, index });
            }
        }
        if let Some(index) = self.load_kwh.iter().position(|v| *v < 0.0) {
            return Err(ForecastError::Negative {
                series: "load_kwh",
                index,
            });
        }
        if !self.heat_pump.curve_is_valid() {
            return Err(ForecastError::BadCopCurve);
        }
        if self.storage.step_kwh > self.storage.capacity_kwh {
            return Err(ForecastError::BadQuantization {
                step_kwh: self.storage.step_kwh,
                capacity_kwh: self.storage.capacity_kwh,
            });
        }
        Ok(())
    }

    pub fn hour_start(&self, t: usize) -> DateTime<Utc> {
        self.start + Duration::hours(t as i64)
    }

    pub fn cop(&self, t: usize) -> f64 {
        self.heat_pump.cop_at(self.outside_temp_c[t])
    }

    /// Copy of this forecast with the price of hour `t` replaced
    pub fn with_price_at(&self, t: usize, price_usd_per_mwh: f64) -> Self {
        let mut input = self.clone();
        if let Some(p) = input.price_usd_per_mwh.get_mut(t) {
            *p = price_usd_per_mwh;
        }
        input
    }
}
