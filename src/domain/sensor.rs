use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::layout::{ChannelRole, Layout};
use super::versioned::Versioned;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ordered batch of readings from a hardware collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorBatch {
    pub readings: Vec<SensorReading>,
}

impl Versioned for SensorBatch {
    const TYPE_NAME: &'static str = "sensor.batch";
    const VERSION: &'static str = "000";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome counters of one ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub ignored: usize,
    pub unknown: usize,
}

/// Latest reading per channel.
///
/// Ingestion is idempotent: a reading whose timestamp is not newer than the
/// stored one for its channel is ignored, so replays, duplicates and late
/// arrivals never move a channel backwards.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    latest: HashMap<String, Sample>,
}

impl SensorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, layout: &Layout, batch: &SensorBatch) -> IngestStats {
        let mut stats = IngestStats::default();
        for reading in &batch.readings {
            if layout.channel(&reading.channel).is_none() {
                warn!(channel = %reading.channel, "reading for unknown channel ignored");
                stats.unknown += 1;
                continue;
            }
            if !reading.value.is_finite() {
                warn!(channel = %reading.channel, "non-finite reading ignored");
                stats.ignored += 1;
                continue;
            }
            match self.latest.get(&reading.channel) {
                Some(existing) if existing.timestamp >= reading.timestamp => {
                    stats.ignored += 1;
                }
                _ => {
                    self.latest.insert(
                        reading.channel.clone(),
                        Sample {
                            value: reading.value,
                            timestamp: reading.timestamp,
                        },
                    );
                    stats.accepted += 1;
                }
            }
        }
        stats
    }

    pub fn latest(&self, channel: &str) -> Option<Sample> {
        self.latest.get(channel).copied()
    }

    /// Latest value of the channel with `role` if it is younger than `max_age`
    pub fn fresh_value(&self, layout: &Layout, role: ChannelRole, now: DateTime<Utc>, max_age: Duration) -> Option<f64> {
        let spec = layout.channel_for_role(role)?;
        let sample = self.latest(&spec.name)?;
        if now - sample.timestamp > max_age {
            None
        } else {
            Some(sample.value)
        }
    }
}
