//! Prometheus instrumentation for the monitoring core.
//!
//! Metrics live on an instance-owned [`Registry`] so several monitors can run
//! in one process (and in one test binary) without name collisions.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::error::{VigilError, VigilResult};

#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    registry: Registry,

    // Alert metrics
    pub alerts_raised_total: IntCounterVec,
    pub alerts_rejected_total: IntCounterVec,
    pub alerts_escalated_total: IntCounterVec,
    pub alerts_resolved_total: IntCounterVec,
    pub alerts_active: IntGauge,
    pub notifications_total: IntCounterVec,

    // Ingest metrics
    pub samples_ingested_total: IntCounterVec,
    pub anomalies_detected_total: IntCounterVec,
    pub trends_detected_total: IntCounterVec,

    // Health metrics
    pub health_checks_total: IntCounterVec,

    // Self-healing metrics
    pub healing_executions_total: IntCounterVec,
    pub healing_skipped_total: IntCounterVec,
    pub healing_duration: Histogram,
}

impl MonitorMetrics {
    pub fn new() -> VigilResult<Self> {
        let registry = Registry::new_custom(Some("vigil".to_string()), None)?;

        let alerts_raised_total = IntCounterVec::new(
            Opts::new("alerts_raised_total", "Alerts created, by severity"),
            &["severity"],
        )?;
        let alerts_rejected_total = IntCounterVec::new(
            Opts::new(
                "alerts_rejected_total",
                "Alert attempts rejected by suppression, cooldown or throttle",
            ),
            &["reason"],
        )?;
        let alerts_escalated_total = IntCounterVec::new(
            Opts::new("alerts_escalated_total", "Escalations applied, by level"),
            &["level"],
        )?;
        let alerts_resolved_total = IntCounterVec::new(
            Opts::new("alerts_resolved_total", "Alerts resolved, by severity"),
            &["severity"],
        )?;
        let alerts_active = IntGauge::new("alerts_active", "Alerts not yet resolved")?;
        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notification attempts, by channel and outcome"),
            &["channel", "outcome"],
        )?;

        let samples_ingested_total = IntCounterVec::new(
            Opts::new("samples_ingested_total", "Metric samples and events ingested"),
            &["kind"],
        )?;
        let anomalies_detected_total = IntCounterVec::new(
            Opts::new("anomalies_detected_total", "Anomalous samples, by metric"),
            &["metric"],
        )?;

        let trends_detected_total = IntCounterVec::new(
            Opts::new("trends_detected_total", "Significant trends, by metric and direction"),
            &["metric", "direction"],
        )?;

        let health_checks_total = IntCounterVec::new(
            Opts::new("health_checks_total", "Health check runs, by check and status"),
            &["check", "status"],
        )?;

        let healing_executions_total = IntCounterVec::new(
            Opts::new("healing_executions_total", "Self-healing executions, by action and status"),
            &["action", "status"],
        )?;
        let healing_skipped_total = IntCounterVec::new(
            Opts::new("healing_skipped_total", "Self-healing attempts skipped, by reason"),
            &["reason"],
        )?;
        let healing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "healing_duration_seconds",
                "Duration of self-healing executions",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )?;

        registry.register(Box::new(alerts_raised_total.clone()))?;
        registry.register(Box::new(alerts_rejected_total.clone()))?;
        registry.register(Box::new(alerts_escalated_total.clone()))?;
        registry.register(Box::new(alerts_resolved_total.clone()))?;
        registry.register(Box::new(alerts_active.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(samples_ingested_total.clone()))?;
        registry.register(Box::new(anomalies_detected_total.clone()))?;
        registry.register(Box::new(trends_detected_total.clone()))?;
        registry.register(Box::new(health_checks_total.clone()))?;
        registry.register(Box::new(healing_executions_total.clone()))?;
        registry.register(Box::new(healing_skipped_total.clone()))?;
        registry.register(Box::new(healing_duration.clone()))?;

        Ok(Self {
            registry,
            alerts_raised_total,
            alerts_rejected_total,
            alerts_escalated_total,
            alerts_resolved_total,
            alerts_active,
            notifications_total,
            samples_ingested_total,
            anomalies_detected_total,
            trends_detected_total,
            health_checks_total,
            healing_executions_total,
            healing_skipped_total,
            healing_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn export(&self) -> VigilResult<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| VigilError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_do_not_collide() {
        let first = MonitorMetrics::new().unwrap();
        let second = MonitorMetrics::new().unwrap();

        first.alerts_raised_total.with_label_values(&["critical"]).inc();
        assert_eq!(
            first.alerts_raised_total.with_label_values(&["critical"]).get(),
            1
        );
        assert_eq!(
            second.alerts_raised_total.with_label_values(&["critical"]).get(),
            0
        );
    }

    #[test]
    fn test_export_contains_prefixed_names() {
        let metrics = MonitorMetrics::new().unwrap();
        metrics.alerts_active.set(3);
        metrics
            .healing_executions_total
            .with_label_values(&["memory_pressure_relief", "success"])
            .inc();

        let text = metrics.export().unwrap();
        assert!(text.contains("vigil_alerts_active 3"));
        assert!(text.contains("vigil_healing_executions_total"));
    }
}
