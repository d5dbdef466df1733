//! Facade wiring every monitoring component around one scheduler.

use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::alerting::{
    Alert, AlertManager, AlertOutcome, AlertRequest, AlertRule, AlertStatistics,
    ConditionEvaluator, RuleRegistry, SuppressionRule,
};
use crate::analysis::{AnomalyDetector, MetricStore, TrendAnalyzer};
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::context::EvaluationContext;
use crate::defaults::{default_alert_rules, default_healing_actions};
use crate::error::{VigilError, VigilResult};
use crate::healing::{
    ActionExecutor, HealingOutcome, LogExecutor, SelfHealingAction, SelfHealingOrchestrator,
};
use crate::health::{HealthCheckConfig, HealthCheckResult, HealthMonitor, HealthSampler, HealthSummary};
use crate::ingest::{MetricSample, PlatformEvent};
use crate::metrics::MonitorMetrics;
use crate::notify::{LogDispatcher, NotificationDispatcher};
use crate::observer::{MonitorEvent, ObserverRegistry};
use crate::scheduler::{Scheduler, TaskHandle};

/// Builder for [`Monitor`]
pub struct MonitorBuilder {
    config: MonitorConfig,
    clock: Option<Arc<dyn Clock>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    install_defaults: bool,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            clock: None,
            dispatcher: None,
            executor: None,
            install_defaults: false,
        }
    }

    /// Time source, the system clock by default
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Notification transport, log-only by default
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Remediation step runner, log-only by default
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Register the built-in alert rules and self-healing actions
    pub fn with_defaults(mut self) -> Self {
        self.install_defaults = true;
        self
    }

    pub fn build(self) -> VigilResult<Monitor> {
        if let Err(errors) = self.config.validate() {
            return Err(VigilError::Configuration(errors.join("; ")));
        }
        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(LogDispatcher));
        let executor = self.executor.unwrap_or_else(|| Arc::new(LogExecutor));

        let scheduler = Arc::new(Scheduler::new());
        let registry = Arc::new(RuleRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let metrics = Arc::new(MonitorMetrics::new()?);

        let store = Arc::new(MetricStore::new(
            config.analysis.metric_retention(),
            config.analysis.max_samples_per_metric,
        ));
        let anomaly = Arc::new(AnomalyDetector::new(config.analysis.anomaly.clone()));
        let trends = Arc::new(TrendAnalyzer::new(config.analysis.trend.clone()));
        let evaluator = ConditionEvaluator::new(anomaly.clone(), store.clone(), clock.clone());

        let alerts = Arc::new(
            AlertManager::new(
                config.alerting.clone(),
                registry.clone(),
                dispatcher,
                clock.clone(),
            )
            .with_observers(observers.clone())
            .with_metrics(metrics.clone())
            .with_scheduler(scheduler.clone()),
        );
        let healing = Arc::new(
            SelfHealingOrchestrator::new(config.healing.clone(), executor, clock.clone())
                .with_observers(observers.clone())
                .with_metrics(metrics.clone())
                .with_alert_manager(alerts.clone()),
        );
        let health = Arc::new(
            HealthMonitor::new(config.health.clone(), registry.clone(), clock.clone())
                .with_orchestrator(healing.clone())
                .with_observers(observers.clone())
                .with_metrics(metrics.clone()),
        );

        if self.install_defaults {
            for rule in default_alert_rules() {
                registry.register_rule(rule)?;
            }
            for action in default_healing_actions() {
                healing.register_action(action)?;
            }
        }

        Ok(Monitor {
            config,
            clock,
            scheduler,
            registry,
            observers,
            metrics,
            store,
            anomaly,
            trends,
            evaluator,
            alerts,
            health,
            healing,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Alerting, analysis, health checks and self-healing behind one handle
pub struct Monitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<Scheduler>,
    registry: Arc<RuleRegistry>,
    observers: Arc<ObserverRegistry>,
    metrics: Arc<MonitorMetrics>,
    store: Arc<MetricStore>,
    anomaly: Arc<AnomalyDetector>,
    trends: Arc<TrendAnalyzer>,
    evaluator: ConditionEvaluator,
    alerts: Arc<AlertManager>,
    health: Arc<HealthMonitor>,
    healing: Arc<SelfHealingOrchestrator>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl Monitor {
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    /// Schedule every periodic task. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Monitor already started");
            return;
        }

        tasks.extend(self.alerts.start(&self.scheduler));
        tasks.extend(self.health.start(&self.scheduler));
        if self.config.healing.enabled {
            tasks.extend(self.healing.start(&self.scheduler));
        }

        let store = self.store.clone();
        let clock = self.clock.clone();
        tasks.push(self.scheduler.every(
            "metric-store-eviction",
            self.config.alerting.expiry_sweep_interval(),
            move || {
                let store = store.clone();
                let clock = clock.clone();
                async move {
                    store.evict_expired(clock.now());
                }
            },
        ));

        info!("Monitor started with {} periodic tasks", tasks.len());
    }

    /// Cancel periodic tasks and pending escalation timers
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.cancel();
        }
        self.health.stop();
        self.alerts.shutdown();
        self.scheduler.shutdown();
        info!("Monitor shut down");
    }

    /// Feed a metric sample to the store, the analyzers and rule evaluation
    pub async fn on_metric(&self, sample: MetricSample) -> Vec<AlertOutcome> {
        self.metrics
            .samples_ingested_total
            .with_label_values(&["metric"])
            .inc();
        self.store.record(&sample.name, sample.value, sample.timestamp);

        let verdict = self.anomaly.observe(&sample.name, sample.value);
        if verdict.is_anomaly {
            self.metrics
                .anomalies_detected_total
                .with_label_values(&[sample.name.as_str()])
                .inc();
            self.observers.notify(&MonitorEvent::AnomalyDetected(verdict));
        }

        if let Some(report) = self.trends.record(&sample.name, sample.value) {
            if report.significant {
                self.metrics
                    .trends_detected_total
                    .with_label_values(&[sample.name.as_str(), report.direction.to_string().as_str()])
                    .inc();
                self.observers.notify(&MonitorEvent::TrendDetected(report));
            }
        }

        self.evaluate_rules(&sample.to_context()).await
    }

    /// Evaluate rules against a platform event and raise its dedicated alert
    pub async fn on_event(&self, event: PlatformEvent) -> Vec<AlertOutcome> {
        self.metrics
            .samples_ingested_total
            .with_label_values(&["event"])
            .inc();
        let ctx = event.to_context();
        let mut outcomes = self.evaluate_rules(&ctx).await;

        if let Some(rule_id) = event.dedicated_rule() {
            match self.alerts.raise(AlertRequest::new(rule_id, ctx)).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Could not raise {} for {}: {}", rule_id, event.event_type, e),
            }
        }
        outcomes
    }

    async fn evaluate_rules(&self, ctx: &EvaluationContext) -> Vec<AlertOutcome> {
        let mut outcomes = Vec::new();
        for rule in self.registry.rules() {
            if !self.evaluator.matches_rule(&rule, ctx) {
                continue;
            }
            match self
                .alerts
                .raise(AlertRequest::new(rule.id.clone(), ctx.clone()))
                .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Failed to raise alert for rule {}: {}", rule.id, e),
            }
        }
        outcomes
    }

    pub fn register_rule(&self, rule: AlertRule) -> VigilResult<()> {
        self.registry.register_rule(rule).map(|_| ())
    }

    pub fn update_rule(&self, rule: AlertRule) -> VigilResult<()> {
        self.registry.update_rule(rule).map(|_| ())
    }

    pub fn delete_rule(&self, id: &str) -> VigilResult<()> {
        self.registry.delete_rule(id).map(|_| ())
    }

    pub fn register_action(&self, action: SelfHealingAction) -> VigilResult<()> {
        self.healing.register_action(action).map(|_| ())
    }

    pub fn update_action(&self, action: SelfHealingAction) -> VigilResult<()> {
        self.healing.update_action(action)
    }

    /// Register a check and, once started, begin polling it
    pub fn register_check(
        &self,
        config: HealthCheckConfig,
        sampler: Arc<dyn HealthSampler>,
    ) -> VigilResult<()> {
        let id = config.id.clone();
        let enabled = config.enabled;
        self.health.register_check(config, sampler)?;
        if enabled && self.config.health.enabled && !self.tasks.lock().is_empty() {
            let handle = self.health.schedule_check(&self.scheduler, &id)?;
            self.tasks.lock().push(handle);
        }
        Ok(())
    }

    pub fn acknowledge(&self, id: Uuid, actor: &str, note: Option<&str>) -> VigilResult<Alert> {
        self.alerts.acknowledge(id, actor, note)
    }

    pub fn resolve(&self, id: Uuid, actor: &str, note: Option<&str>) -> VigilResult<Alert> {
        self.alerts.resolve(id, actor, note)
    }

    pub fn suppress(
        &self,
        pattern: &str,
        duration: Duration,
        reason: Option<&str>,
    ) -> VigilResult<SuppressionRule> {
        self.alerts.suppress(pattern, duration, reason)
    }

    /// Sample a health check now
    pub async fn run_check(&self, id: &str) -> VigilResult<HealthCheckResult> {
        self.health.run_check(id).await
    }

    /// Run a self-healing action now, subject to its cooldown and rate cap
    pub async fn trigger_healing(&self, action_id: &str, reason: &str) -> VigilResult<HealingOutcome> {
        self.healing.trigger_manual(action_id, reason).await
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active_alerts()
    }

    pub fn alert_statistics(&self) -> AlertStatistics {
        self.alerts.statistics()
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health.summary()
    }

    /// Prometheus text exposition of this monitor's metrics
    pub fn export_metrics(&self) -> VigilResult<String> {
        self.metrics.export()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn healing(&self) -> &Arc<SelfHealingOrchestrator> {
        &self.healing
    }

    pub fn anomaly_detector(&self) -> &Arc<AnomalyDetector> {
        &self.anomaly
    }

    pub fn metric_store(&self) -> &Arc<MetricStore> {
        &self.store
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertCategory, AlertSeverity};
    use crate::clock::ManualClock;
    use crate::defaults::{HIGH_CPU_RULE, SECURITY_EVENT_RULE};

    fn monitor() -> (Monitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let monitor = Monitor::builder(MonitorConfig::default())
            .with_clock(clock.clone())
            .with_defaults()
            .build()
            .unwrap();
        (monitor, clock)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = MonitorConfig::default();
        config.alerting.max_history = 0;
        assert!(matches!(
            Monitor::builder(config).build(),
            Err(VigilError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_cpu_alert_is_throttled_for_fifteen_minutes() {
        let (monitor, clock) = monitor();
        let outcomes = monitor
            .on_metric(MetricSample::new("cpu_usage", 0.85, clock.now()))
            .await;
        assert_eq!(outcomes.len(), 1);
        let alert = outcomes[0].alert().unwrap();
        assert_eq!(alert.rule_id, HIGH_CPU_RULE);
        assert_eq!(alert.severity, AlertSeverity::Warning);

        clock.advance(Duration::from_secs(60));
        let outcomes = monitor
            .on_metric(MetricSample::new("cpu_usage", 0.9, clock.now()))
            .await;
        assert!(matches!(outcomes[0], AlertOutcome::Throttled { .. }));
        assert_eq!(monitor.active_alerts().len(), 1);

        let quiet = monitor
            .on_metric(MetricSample::new("cpu_usage", 0.4, clock.now()))
            .await;
        assert!(quiet.is_empty());
    }

    #[tokio::test]
    async fn test_critical_security_event_raises_dedicated_alert() {
        let (monitor, clock) = monitor();
        let event = PlatformEvent::new(
            "privilege_escalation",
            AlertCategory::Security,
            AlertSeverity::Critical,
            clock.now(),
        )
        .with_actor("agent-17");
        let outcomes = monitor.on_event(event).await;
        assert_eq!(outcomes.len(), 1);
        let alert = outcomes[0].alert().unwrap();
        assert_eq!(alert.rule_id, SECURITY_EVENT_RULE);
        assert_eq!(alert.title, "Security event: privilege_escalation by agent-17");
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (monitor, _) = monitor();
        monitor.start();
        assert!(monitor.scheduler.active_tasks() > 0);

        monitor.shutdown();
        assert_eq!(monitor.scheduler.active_tasks(), 0);
        assert!(monitor.export_metrics().unwrap().contains("vigil_alerts_active"));
    }
}
