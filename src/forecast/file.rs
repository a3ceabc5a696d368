use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

use super::{hour_floor, ForecastProvider, ForecastSourceError};
use crate::domain::{Envelope, ForecastInput};

/// Reads a `dispatch.forecast` envelope from disk on every cycle, so an
/// external job can drop in a fresh file between runs
#[derive(Debug, Clone)]
pub struct FileForecastProvider {
    path: PathBuf,
}

impl FileForecastProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Drop the hours that already ended before `now`
fn skip_elapsed(mut input: ForecastInput, now: DateTime<Utc>) -> Result<ForecastInput, ForecastSourceError> {
    let elapsed = (hour_floor(now) - input.start).num_hours().max(0) as usize;
    if elapsed == 0 {
        return Ok(input);
    }
    if elapsed >= input.horizon_hours {
        return Err(ForecastSourceError::Stale {
            ended: input.hour_start(input.horizon_hours),
        });
    }
    input.start = input.hour_start(elapsed);
    input.horizon_hours -= elapsed;
    input.price_usd_per_mwh.drain(..elapsed);
    input.load_kwh.drain(..elapsed);
    input.outside_temp_c.drain(..elapsed);
    Ok(input)
}

#[async_trait]
impl ForecastProvider for FileForecastProvider {
    async fn forecast(&self, now: DateTime<Utc>) -> Result<ForecastInput, ForecastSourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let input = Envelope::<ForecastInput>::from_json(&raw)?;
        input.check()?;
        debug!(path = %self.path.display(), start = %input.start, hours = input.horizon_hours, "forecast loaded");
        skip_elapsed(input, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::fixtures::flat_forecast;
    use chrono::Duration;

    #[test]
    fn test_elapsed_hours_are_dropped() {
        let mut input = flat_forecast(6);
        input.price_usd_per_mwh = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let now = input.start + Duration::minutes(150);
        let trimmed = skip_elapsed(input.clone(), now).unwrap();
        assert_eq!(trimmed.start, input.start + Duration::hours(2));
        assert_eq!(trimmed.horizon_hours, 4);
        assert_eq!(trimmed.price_usd_per_mwh, vec![3.0, 4.0, 5.0, 6.0]);
        trimmed.check().unwrap();
    }

    #[test]
    fn test_fully_elapsed_forecast_is_stale() {
        let input = flat_forecast(3);
        let now = input.start + Duration::hours(5);
        assert!(matches!(skip_elapsed(input, now), Err(ForecastSourceError::Stale { .. })));
    }

    #[tokio::test]
    async fn test_reads_envelope_from_disk() {
        let input = flat_forecast(4);
        let path = std::env::temp_dir().join(format!("forecast-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, Envelope::seal(input.clone()).to_json().unwrap()).unwrap();

        let provider = FileForecastProvider::new(&path);
        let loaded = provider.forecast(input.start).await.unwrap();
        assert_eq!(loaded.horizon_hours, 4);
        assert_eq!(loaded.start, input.start);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let provider = FileForecastProvider::new("/nonexistent/forecast.json");
        assert!(matches!(
            provider.forecast(Utc::now()).await,
            Err(ForecastSourceError::Io(_))
        ));
    }
}
