//! Bounded per-metric sample store backing windowed threshold conditions.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;

use crate::clock::to_chrono;

/// Reduction applied to the samples inside a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Sum,
    Count,
    Last,
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" | "average" | "mean" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "last" => Ok(Self::Last),
            _ => Err(format!("unknown aggregation: {s}")),
        }
    }
}

impl Aggregation {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                Aggregation::Count => Some(0.0),
                _ => None,
            };
        }
        let value = match self {
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Count => values.len() as f64,
            Aggregation::Last => *values.last()?,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    at: DateTime<Utc>,
    value: f64,
}

#[derive(Debug)]
pub struct MetricStore {
    retention: Duration,
    max_samples: usize,
    series: RwLock<HashMap<String, VecDeque<Sample>>>,
}

impl MetricStore {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            retention,
            max_samples: max_samples.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Record a sample, trimming by count and retention in the same step
    pub fn record(&self, metric: &str, value: f64, at: DateTime<Utc>) {
        let mut series = self.series.write();
        let samples = series.entry(metric.to_string()).or_default();
        samples.push_back(Sample { at, value });

        while samples.len() > self.max_samples {
            samples.pop_front();
        }
        let cutoff = at - to_chrono(self.retention);
        while let Some(front) = samples.front() {
            if front.at < cutoff {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Values recorded within `window` before `now`, oldest first
    pub fn window(&self, metric: &str, window: Duration, now: DateTime<Utc>) -> Vec<f64> {
        let cutoff = now - to_chrono(window);
        self.series
            .read()
            .get(metric)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.at >= cutoff && s.at <= now)
                    .map(|s| s.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn aggregate(
        &self,
        metric: &str,
        aggregation: Aggregation,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        aggregation.apply(&self.window(metric, window, now))
    }

    pub fn latest(&self, metric: &str) -> Option<f64> {
        self.series
            .read()
            .get(metric)
            .and_then(|s| s.back())
            .map(|s| s.value)
    }

    /// Drop samples older than the retention period across all metrics
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - to_chrono(self.retention);
        let mut removed = 0;
        let mut series = self.series.write();
        for samples in series.values_mut() {
            while let Some(front) = samples.front() {
                if front.at < cutoff {
                    samples.pop_front();
                    removed += 1;
                } else {
                    break;
                }
            }
        }
        series.retain(|_, samples| !samples.is_empty());
        removed
    }
}
