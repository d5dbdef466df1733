//! Rolling z-score anomaly detection.
//!
//! Each metric keeps the last `window_size` samples. Once `min_samples`
//! samples exist, a new value is anomalous when it lies more than
//! `threshold` population standard deviations from the rolling mean (the
//! new value included).

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Anomaly detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub window_size: usize,
    pub min_samples: usize,
    pub threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_samples: 10,
            threshold: 2.0,
        }
    }
}

/// Outcome of testing one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub metric: String,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
    pub samples: usize,
    pub is_anomaly: bool,
}

#[derive(Debug, Default)]
struct MetricWindow {
    values: VecDeque<f64>,
    mean: f64,
    std_dev: f64,
    last: Option<AnomalyVerdict>,
}

impl MetricWindow {
    fn push(&mut self, value: f64, cap: usize) {
        self.values.push_back(value);
        while self.values.len() > cap {
            self.values.pop_front();
        }

        let n = self.values.len() as f64;
        self.mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|x| (x - self.mean).powi(2))
            .sum::<f64>()
            / n;
        self.std_dev = variance.sqrt();
    }

    fn verdict(&self, metric: &str, value: f64, threshold: f64, min_samples: usize) -> AnomalyVerdict {
        let samples = self.values.len();
        let deviation = (value - self.mean).abs();
        let z_score = if self.std_dev > 0.0 {
            deviation / self.std_dev
        } else {
            0.0
        };
        let is_anomaly = samples >= min_samples && deviation > threshold * self.std_dev;

        AnomalyVerdict {
            metric: metric.to_string(),
            value,
            mean: self.mean,
            std_dev: self.std_dev,
            z_score,
            threshold,
            samples,
            is_anomaly,
        }
    }
}

/// Per-metric rolling anomaly detector
#[derive(Debug, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    series: RwLock<HashMap<String, MetricWindow>>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Append a sample and test it against the updated statistics
    pub fn observe(&self, metric: &str, value: f64) -> AnomalyVerdict {
        let mut series = self.series.write();
        let window = series.entry(metric.to_string()).or_default();
        window.push(value, self.config.window_size.max(1));

        let verdict = window.verdict(metric, value, self.config.threshold, self.config.min_samples);
        if verdict.is_anomaly {
            debug!(
                "Anomaly in {}: value={} mean={:.3} std_dev={:.3} z={:.2}",
                metric, value, verdict.mean, verdict.std_dev, verdict.z_score
            );
        }
        window.last = Some(verdict.clone());
        verdict
    }

    /// Append a sample and report whether it is anomalous
    pub fn detect_anomaly(&self, metric: &str, value: f64) -> bool {
        self.observe(metric, value).is_anomaly
    }

    /// Test a value against the current statistics without recording it.
    /// `threshold` overrides the configured multiplier.
    pub fn evaluate(&self, metric: &str, value: f64, threshold: Option<f64>) -> bool {
        let series = self.series.read();
        match series.get(metric) {
            Some(window) => {
                let threshold = threshold.unwrap_or(self.config.threshold);
                window
                    .verdict(metric, value, threshold, self.config.min_samples)
                    .is_anomaly
            }
            None => false,
        }
    }

    /// Verdict for the most recent observed sample
    pub fn last_verdict(&self, metric: &str) -> Option<AnomalyVerdict> {
        self.series.read().get(metric).and_then(|w| w.last.clone())
    }

    /// Current (mean, std_dev, sample count) for a metric
    pub fn stats(&self, metric: &str) -> Option<(f64, f64, usize)> {
        self.series
            .read()
            .get(metric)
            .map(|w| (w.mean, w.std_dev, w.values.len()))
    }

    pub fn reset(&self, metric: &str) {
        self.series.write().remove(metric);
    }

    pub fn tracked_metrics(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_never_flags() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        for i in 0..9 {
            let value = if i % 2 == 0 { 1.0 } else { 1_000_000.0 };
            assert!(!detector.detect_anomaly("latency", value), "sample {} flagged", i + 1);
        }
    }

    #[test]
    fn test_flags_outlier_after_warmup() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        for i in 0..20 {
            let value = 100.0 + (i % 3) as f64;
            assert!(!detector.detect_anomaly("latency", value));
        }
        let verdict = detector.observe("latency", 500.0);
        assert!(verdict.is_anomaly);
        assert!(verdict.z_score > 2.0);
        assert_eq!(verdict.samples, 21);
    }

    #[test]
    fn test_tenth_sample_can_flag() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        for _ in 0..9 {
            detector.detect_anomaly("queue", 10.0);
        }
        // mean = 19, std_dev = 27; |100 - 19| = 81 > 54
        assert!(detector.detect_anomaly("queue", 100.0));
    }

    #[test]
    fn test_window_is_capped() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            window_size: 5,
            ..AnomalyConfig::default()
        });
        for i in 0..50 {
            detector.observe("m", i as f64);
        }
        let (mean, _, samples) = detector.stats("m").unwrap();
        assert_eq!(samples, 5);
        assert_eq!(mean, 47.0);
    }

    #[test]
    fn test_evaluate_does_not_record() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        for i in 0..12 {
            detector.observe("m", 10.0 + (i % 2) as f64);
        }
        assert!(detector.evaluate("m", 50.0, None));
        assert!(!detector.evaluate("m", 50.0, Some(1_000.0)));
        assert_eq!(detector.stats("m").unwrap().2, 12);
        assert!(!detector.evaluate("unknown", 50.0, None));
    }
}
