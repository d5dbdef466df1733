//! Least-squares trend detection over a rolling window of samples.

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub window_size: usize,
    pub min_samples: usize,
    pub slope_threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_samples: 10,
            slope_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub metric: String,
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination of the fit, 0.0..=1.0
    pub confidence: f64,
    pub direction: TrendDirection,
    pub significant: bool,
    pub samples: usize,
}

/// Fitted line over (index, value) pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares with the sample index as x
pub fn linear_regression(values: &[f64]) -> Option<LinearFit> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;

    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for (i, y) in values.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_tot += (y - mean_y).powi(2);
        ss_res += (y - predicted).powi(2);
    }
    // A flat series is fitted exactly
    let r_squared = if ss_tot < f64::EPSILON {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Per-metric rolling trend analyzer
#[derive(Debug, Default)]
pub struct TrendAnalyzer {
    config: TrendConfig,
    series: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Append a sample and analyze the updated window
    pub fn record(&self, metric: &str, value: f64) -> Option<TrendReport> {
        let snapshot: Vec<f64> = {
            let mut series = self.series.write();
            let values = series.entry(metric.to_string()).or_default();
            values.push_back(value);
            while values.len() > self.config.window_size.max(2) {
                values.pop_front();
            }
            values.iter().copied().collect()
        };
        self.report(metric, &snapshot)
    }

    /// Analyze the current window without adding a sample
    pub fn analyze(&self, metric: &str) -> Option<TrendReport> {
        let snapshot: Vec<f64> = self.series.read().get(metric)?.iter().copied().collect();
        self.report(metric, &snapshot)
    }

    pub fn reset(&self, metric: &str) {
        self.series.write().remove(metric);
    }

    fn report(&self, metric: &str, values: &[f64]) -> Option<TrendReport> {
        if values.len() < self.config.min_samples {
            return None;
        }
        let fit = linear_regression(values)?;

        let direction = if fit.slope > 0.0 {
            TrendDirection::Increasing
        } else if fit.slope < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        let significant = fit.slope.abs() > self.config.slope_threshold;

        if significant {
            debug!(
                "Significant {} trend in {}: slope={:.4} r2={:.3}",
                direction, metric, fit.slope, fit.r_squared
            );
        }

        Some(TrendReport {
            metric: metric.to_string(),
            slope: fit.slope,
            intercept: fit.intercept,
            confidence: fit.r_squared,
            direction,
            significant,
            samples: values.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regression_on_perfect_line() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let fit = linear_regression(&values).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 3.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_requires_min_samples() {
        let analyzer = TrendAnalyzer::new(TrendConfig::default());
        for i in 0..9 {
            assert!(analyzer.record("tasks_pending", i as f64).is_none());
        }
        let report = analyzer.record("tasks_pending", 9.0).unwrap();
        assert_eq!(report.direction, TrendDirection::Increasing);
        assert!(report.significant);
        assert_eq!(report.samples, 10);
    }

    #[test]
    fn test_shallow_slope_is_not_significant() {
        let analyzer = TrendAnalyzer::new(TrendConfig::default());
        let mut report = None;
        for i in 0..20 {
            report = analyzer.record("latency", 50.0 - 0.05 * i as f64);
        }
        let report = report.unwrap();
        assert_eq!(report.direction, TrendDirection::Decreasing);
        assert!(!report.significant);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let analyzer = TrendAnalyzer::new(TrendConfig::default());
        for _ in 0..12 {
            analyzer.record("errors", 4.0);
        }
        let report = analyzer.analyze("errors").unwrap();
        assert_eq!(report.direction, TrendDirection::Stable);
        assert!(!report.significant);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn test_window_keeps_recent_samples() {
        let analyzer = TrendAnalyzer::new(TrendConfig::default());
        for i in 0..40 {
            analyzer.record("m", i as f64);
        }
        // Recent history flattens out; the early climb falls out of the window
        for _ in 0..50 {
            analyzer.record("m", 40.0);
        }
        let report = analyzer.analyze("m").unwrap();
        assert_eq!(report.samples, 50);
        assert_eq!(report.direction, TrendDirection::Stable);
    }
}
