use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::analysis::{AnomalyConfig, TrendConfig};
use crate::error::{VigilError, VigilResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub alerting: AlertingConfig,
    pub analysis: AnalysisConfig,
    pub health: HealthConfig,
    pub healing: HealingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertingConfig {
    pub max_history: usize,
    pub history_retention_secs: u64,
    pub escalation_check_interval_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub notification_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub anomaly: AnomalyConfig,
    pub trend: TrendConfig,
    pub metric_retention_secs: u64,
    pub max_samples_per_metric: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub max_history_per_check: usize,
    /// Number of previous results averaged when deriving a trend
    pub trend_lookback: usize,
    /// Relative change against that average treated as noise
    pub trend_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealingConfig {
    pub enabled: bool,
    pub max_history: usize,
    pub rate_window_secs: u64,
    pub rate_reset_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
    pub file_path: Option<String>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            history_retention_secs: 7 * 24 * 3600, // 7 days
            escalation_check_interval_secs: 60,
            expiry_sweep_interval_secs: 60,
            cleanup_interval_secs: 3600,
            notification_timeout_ms: 5000,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anomaly: AnomalyConfig::default(),
            trend: TrendConfig::default(),
            metric_retention_secs: 3600,
            max_samples_per_metric: 1000,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_per_check: 100,
            trend_lookback: 5,
            trend_tolerance: 0.05,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history: 500,
            rate_window_secs: 3600,
            rate_reset_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_path: None,
        }
    }
}

impl AlertingConfig {
    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }

    pub fn escalation_check_interval(&self) -> Duration {
        Duration::from_secs(self.escalation_check_interval_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

impl AnalysisConfig {
    pub fn metric_retention(&self) -> Duration {
        Duration::from_secs(self.metric_retention_secs)
    }
}

impl HealingConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn rate_reset_interval(&self) -> Duration {
        Duration::from_secs(self.rate_reset_interval_secs)
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> VigilResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "json" {
            return Err(VigilError::Configuration(format!(
                "Unsupported config extension: {}",
                ext
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Defaults with `VIGIL_*` environment overrides applied
    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `VIGIL_*` environment variables, returning the overridden keys
    pub fn apply_env_overrides(&mut self) -> HashMap<String, String> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("VIGIL_"))
            .collect();
        self.apply_overrides(&vars)
    }

    fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> HashMap<String, String> {
        let mut applied = HashMap::new();

        if let Some(level) = vars.get("VIGIL_LOG_LEVEL") {
            self.logging.level = level.clone();
            applied.insert("logging.level".to_string(), level.clone());
        }

        if let Some(path) = vars.get("VIGIL_LOG_FILE") {
            self.logging.file_path = Some(path.clone());
            applied.insert("logging.file_path".to_string(), path.clone());
        }

        if let Some(threshold) = vars.get("VIGIL_ANOMALY_THRESHOLD") {
            if let Ok(value) = threshold.parse::<f64>() {
                self.analysis.anomaly.threshold = value;
                applied.insert("analysis.anomaly.threshold".to_string(), threshold.clone());
            }
        }

        if let Some(max_history) = vars.get("VIGIL_MAX_ALERT_HISTORY") {
            if let Ok(value) = max_history.parse::<usize>() {
                self.alerting.max_history = value;
                applied.insert("alerting.max_history".to_string(), max_history.clone());
            }
        }

        if let Some(timeout) = vars.get("VIGIL_NOTIFICATION_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.alerting.notification_timeout_ms = value;
                applied.insert("alerting.notification_timeout_ms".to_string(), timeout.clone());
            }
        }

        if let Some(enabled) = vars.get("VIGIL_HEALING_ENABLED") {
            if let Ok(value) = enabled.parse::<bool>() {
                self.healing.enabled = value;
                applied.insert("healing.enabled".to_string(), enabled.clone());
            }
        }

        applied
    }

    /// Validation with detailed error reporting
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.alerting.max_history == 0 {
            errors.push("Alert history capacity must be greater than zero".to_string());
        }
        if self.alerting.escalation_check_interval_secs == 0 {
            errors.push("Escalation check interval must be at least one second".to_string());
        }
        if self.alerting.expiry_sweep_interval_secs == 0 {
            errors.push("Expiry sweep interval must be at least one second".to_string());
        }
        if self.alerting.notification_timeout_ms == 0 {
            errors.push("Notification timeout must be greater than zero".to_string());
        }

        if self.analysis.anomaly.threshold <= 0.0 {
            errors.push("Anomaly threshold must be positive".to_string());
        }
        if self.analysis.anomaly.min_samples < 2 {
            errors.push("Anomaly detection needs at least two samples".to_string());
        }
        if self.analysis.anomaly.window_size < self.analysis.anomaly.min_samples {
            errors.push("Anomaly window is smaller than the minimum sample count".to_string());
        }
        if self.analysis.trend.window_size < self.analysis.trend.min_samples {
            errors.push("Trend window is smaller than the minimum sample count".to_string());
        }
        if self.analysis.trend.min_samples < 2 {
            errors.push("Trend analysis needs at least two samples".to_string());
        }

        if self.health.max_history_per_check == 0 {
            errors.push("Health check history capacity must be greater than zero".to_string());
        }
        if self.health.trend_tolerance < 0.0 {
            errors.push("Health trend tolerance cannot be negative".to_string());
        }

        if self.healing.rate_window_secs == 0 {
            errors.push("Self-healing rate window must be at least one second".to_string());
        }

        if log_level_filter(&self.logging.level).is_none() {
            errors.push(format!("Unknown log level: {}", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parse a textual log level
pub fn log_level_filter(level: &str) -> Option<log::LevelFilter> {
    match level.to_lowercase().as_str() {
        "off" => Some(log::LevelFilter::Off),
        "error" => Some(log::LevelFilter::Error),
        "warn" | "warning" => Some(log::LevelFilter::Warn),
        "info" => Some(log::LevelFilter::Info),
        "debug" => Some(log::LevelFilter::Debug),
        "trace" => Some(log::LevelFilter::Trace),
        _ => None,
    }
}
