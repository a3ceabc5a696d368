pub mod file;
pub mod flat;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PlannerConfig;
use crate::domain::{EnvelopeError, ForecastError};

pub use file::FileForecastProvider;
pub use flat::FlatForecastProvider;

#[derive(Debug, Error)]
pub enum ForecastSourceError {
    #[error("Forecast file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("Forecast envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("Forecast invalid: {0}")]
    Invalid(#[from] ForecastError),
    #[error("Forecast ended at {ended}, nothing left to plan")]
    Stale { ended: DateTime<Utc> },
}

/// Source of the hourly forecast a planning cycle runs on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(&self, now: DateTime<Utc>) -> Result<crate::domain::ForecastInput, ForecastSourceError>;
}

/// Start of the hour containing `now`
pub fn hour_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(chrono::Duration::hours(1)).unwrap_or(now)
}

pub fn provider_from_config(config: &PlannerConfig) -> Arc<dyn ForecastProvider> {
    match &config.forecast_file {
        Some(path) => Arc::new(FileForecastProvider::new(path)),
        None => Arc::new(FlatForecastProvider::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_floor() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 13, 47, 12).unwrap();
        assert_eq!(hour_floor(now), Utc.with_ymd_and_hms(2026, 1, 15, 13, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_config_without_file_plans_flat() {
        let config = crate::config::fixtures::test_config().planner;
        let provider = provider_from_config(&config);
        let input = provider.forecast(Utc::now()).await.unwrap();
        assert_eq!(input.horizon_hours, config.horizon_hours);
        assert!(input.price_usd_per_mwh.iter().all(|p| *p == config.flat_price_usd_per_mwh));
    }
}
