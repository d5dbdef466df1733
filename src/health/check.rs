//! Health check definitions, results and classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::alerting::AlertSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Resource,
    Performance,
    Service,
    System,
    DataIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
    Timeout,
    Unknown,
}

impl HealthStatus {
    /// Ordering used to pick the worst status across checks
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Warning => 2,
            HealthStatus::Timeout => 3,
            HealthStatus::Unhealthy => 4,
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            HealthStatus::Healthy => AlertSeverity::Info,
            HealthStatus::Warning | HealthStatus::Unknown => AlertSeverity::Warning,
            HealthStatus::Timeout | HealthStatus::Unhealthy => AlertSeverity::Critical,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Timeout => write!(f, "timeout"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTrend {
    Improving,
    Stable,
    Degrading,
    Unknown,
}

/// Which way a reading gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Higher is worse, e.g. memory utilization
    #[default]
    AscendingBad,
    /// Lower is worse, e.g. a performance score
    DescendingBad,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub healthy: f64,
    pub warning: f64,
    pub critical: f64,
    #[serde(default)]
    pub direction: ThresholdDirection,
}

impl HealthThresholds {
    pub fn ascending(healthy: f64, warning: f64, critical: f64) -> Self {
        Self {
            healthy,
            warning,
            critical,
            direction: ThresholdDirection::AscendingBad,
        }
    }

    pub fn descending(healthy: f64, warning: f64, critical: f64) -> Self {
        Self {
            healthy,
            warning,
            critical,
            direction: ThresholdDirection::DescendingBad,
        }
    }

    pub fn classify(&self, value: f64) -> HealthStatus {
        match self.direction {
            ThresholdDirection::AscendingBad => {
                if value >= self.critical {
                    HealthStatus::Unhealthy
                } else if value >= self.warning {
                    HealthStatus::Warning
                } else {
                    HealthStatus::Healthy
                }
            }
            ThresholdDirection::DescendingBad => {
                if value <= self.critical {
                    HealthStatus::Unhealthy
                } else if value <= self.warning {
                    HealthStatus::Warning
                } else {
                    HealthStatus::Healthy
                }
            }
        }
    }

    /// True when the threshold ordering agrees with the declared direction
    pub fn is_consistent(&self) -> bool {
        match self.direction {
            ThresholdDirection::AscendingBad => {
                self.healthy <= self.warning && self.warning <= self.critical
            }
            ThresholdDirection::DescendingBad => {
                self.healthy >= self.warning && self.warning >= self.critical
            }
        }
    }
}

/// Trend of `value` against the mean of `previous` readings.
/// Changes within `tolerance` (relative to that mean) count as stable.
pub fn derive_trend(
    value: f64,
    previous: &[f64],
    direction: ThresholdDirection,
    tolerance: f64,
) -> HealthTrend {
    if previous.is_empty() {
        return HealthTrend::Unknown;
    }
    let mean = previous.iter().sum::<f64>() / previous.len() as f64;
    let change = if mean.abs() > f64::EPSILON {
        (value - mean) / mean.abs()
    } else {
        value - mean
    };

    if change.abs() <= tolerance {
        return HealthTrend::Stable;
    }
    let rising = change > 0.0;
    match (direction, rising) {
        (ThresholdDirection::AscendingBad, true) | (ThresholdDirection::DescendingBad, false) => {
            HealthTrend::Degrading
        }
        _ => HealthTrend::Improving,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: HealthCategory,
    pub interval: Duration,
    pub timeout: Duration,
    #[serde(default)]
    pub retries: u32,
    pub thresholds: HealthThresholds,
    #[serde(default)]
    pub auto_heal: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl HealthCheckConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: HealthCategory,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retries: 0,
            thresholds,
            auto_heal: false,
            enabled: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_auto_heal(mut self, auto_heal: bool) -> Self {
        self.auto_heal = auto_heal;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Reading returned by a health sampler
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthSample {
    pub value: f64,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HealthSample {
    pub fn new(value: f64, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check_id: String,
    pub status: HealthStatus,
    /// Absent when sampling failed or timed out
    pub value: Option<f64>,
    pub message: String,
    pub trend: HealthTrend,
    pub severity: AlertSeverity,
    pub duration: Duration,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}
