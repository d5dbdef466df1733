//! Periodic health sampling, classification and history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::alerting::RuleRegistry;
use crate::clock::Clock;
use crate::config::HealthConfig;
use crate::error::{VigilError, VigilResult};
use crate::healing::SelfHealingOrchestrator;
use crate::metrics::MonitorMetrics;
use crate::observer::{MonitorEvent, ObserverRegistry};
use crate::scheduler::{Scheduler, TaskHandle};

use super::check::{HealthCheckConfig, HealthCheckResult, HealthSample, HealthStatus, HealthTrend, derive_trend};

/// Source of readings for one health check
#[async_trait]
pub trait HealthSampler: Send + Sync {
    async fn sample(&self) -> VigilResult<HealthSample>;
}

/// Adapts an async closure into a [`HealthSampler`]
pub struct FnSampler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> HealthSampler for FnSampler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = VigilResult<HealthSample>> + Send,
{
    async fn sample(&self) -> VigilResult<HealthSample> {
        (self.f)().await
    }
}

pub fn sampler_fn<F, Fut>(f: F) -> Arc<dyn HealthSampler>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = VigilResult<HealthSample>> + Send + 'static,
{
    Arc::new(FnSampler { f })
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    /// Worst latest status across checks, healthy when nothing has run
    pub overall: HealthStatus,
    pub checks: HashMap<String, HealthStatus>,
    pub failing: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct HealthMonitor {
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<RuleRegistry>,
    samplers: RwLock<HashMap<String, Arc<dyn HealthSampler>>>,
    history: RwLock<HashMap<String, VecDeque<HealthCheckResult>>>,
    orchestrator: Option<Arc<SelfHealingOrchestrator>>,
    observers: Arc<ObserverRegistry>,
    metrics: Option<Arc<MonitorMetrics>>,
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, registry: Arc<RuleRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            registry,
            samplers: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            orchestrator: None,
            observers: Arc::new(ObserverRegistry::new()),
            metrics: None,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Forward results of `auto_heal` checks to `orchestrator`
    pub fn with_orchestrator(mut self, orchestrator: Arc<SelfHealingOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register (or replace) a check definition together with its sampler
    pub fn register_check(&self, config: HealthCheckConfig, sampler: Arc<dyn HealthSampler>) -> VigilResult<()> {
        let id = config.id.clone();
        self.registry.register_health_check(config)?;
        self.samplers.write().insert(id.clone(), sampler);
        info!(check = %id, "Registered health check");
        Ok(())
    }

    pub fn remove_check(&self, id: &str) -> VigilResult<()> {
        self.registry.remove_health_check(id)?;
        self.samplers.write().remove(id);
        self.history.write().remove(id);
        if let Some(handle) = self.tasks.lock().remove(id) {
            handle.cancel();
        }
        Ok(())
    }

    /// Sample, classify and record one check now
    pub async fn run_check(&self, id: &str) -> VigilResult<HealthCheckResult> {
        let config = self
            .registry
            .get_health_check(id)
            .ok_or_else(|| VigilError::HealthCheckNotFound(id.to_string()))?;
        let sampler = self
            .samplers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VigilError::HealthCheckNotFound(format!("{} has no sampler", id)))?;

        let span = info_span!("health_check", check = %id);
        let result = self.sample_and_classify(&config, sampler).instrument(span).await;

        let recent = self.record(result.clone());
        if let Some(metrics) = &self.metrics {
            let status = result.status.to_string();
            metrics
                .health_checks_total
                .with_label_values(&[id, status.as_str()])
                .inc();
        }
        self.observers.notify(&MonitorEvent::HealthChecked(result.clone()));

        if config.auto_heal {
            if let Some(orchestrator) = &self.orchestrator {
                orchestrator.handle_health_result(&result, &recent).await;
            }
        }
        Ok(result)
    }

    async fn sample_and_classify(
        &self,
        config: &HealthCheckConfig,
        sampler: Arc<dyn HealthSampler>,
    ) -> HealthCheckResult {
        let started = tokio::time::Instant::now();
        let mut attempts = 0;
        let mut outcome: Result<HealthSample, (HealthStatus, String)> =
            Err((HealthStatus::Unknown, "not sampled".to_string()));

        while attempts <= config.retries {
            attempts += 1;
            outcome = match tokio::time::timeout(config.timeout, sampler.sample()).await {
                Ok(Ok(sample)) => Ok(sample),
                Ok(Err(e)) => Err((HealthStatus::Unknown, format!("Health check failed: {}", e))),
                Err(_) => Err((
                    HealthStatus::Timeout,
                    format!("Health check timed out after {:?}", config.timeout),
                )),
            };
            if outcome.is_ok() {
                break;
            }
            debug!(attempt = attempts, "Health sample attempt failed");
        }

        let duration = started.elapsed();
        let timestamp = self.clock.now();
        match outcome {
            Ok(sample) => {
                let status = config.thresholds.classify(sample.value);
                let previous = self.previous_values(&config.id);
                let trend = derive_trend(
                    sample.value,
                    &previous,
                    config.thresholds.direction,
                    self.config.trend_tolerance,
                );
                if status.is_failure() {
                    warn!(value = sample.value, status = %status, "Health check degraded");
                } else {
                    debug!(value = sample.value, "Health check passed");
                }
                HealthCheckResult {
                    check_id: config.id.clone(),
                    status,
                    value: Some(sample.value),
                    message: sample.message,
                    trend,
                    severity: status.severity(),
                    duration,
                    attempts,
                    timestamp,
                    metadata: sample.metadata,
                }
            }
            Err((status, message)) => {
                warn!(status = %status, error = %message, "Health check could not be sampled");
                HealthCheckResult {
                    check_id: config.id.clone(),
                    status,
                    value: None,
                    message,
                    trend: HealthTrend::Unknown,
                    severity: status.severity(),
                    duration,
                    attempts,
                    timestamp,
                    metadata: HashMap::new(),
                }
            }
        }
    }

    /// Values of the last few sampled results, oldest first
    fn previous_values(&self, id: &str) -> Vec<f64> {
        let history = self.history.read();
        let Some(results) = history.get(id) else {
            return Vec::new();
        };
        let mut values: Vec<f64> = results
            .iter()
            .rev()
            .filter_map(|r| r.value)
            .take(self.config.trend_lookback.max(1))
            .collect();
        values.reverse();
        values
    }

    /// Append to the bounded history and return it, oldest first
    fn record(&self, result: HealthCheckResult) -> Vec<HealthCheckResult> {
        let mut history = self.history.write();
        let results = history.entry(result.check_id.clone()).or_default();
        results.push_back(result);
        while results.len() > self.config.max_history_per_check.max(1) {
            results.pop_front();
        }
        results.iter().cloned().collect()
    }

    pub fn latest(&self, id: &str) -> Option<HealthCheckResult> {
        self.history.read().get(id).and_then(|r| r.back().cloned())
    }

    /// Most recent results first
    pub fn history(&self, id: &str, limit: usize) -> Vec<HealthCheckResult> {
        self.history
            .read()
            .get(id)
            .map(|r| r.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> HealthSummary {
        let history = self.history.read();
        let mut checks = HashMap::new();
        let mut overall = HealthStatus::Healthy;
        let mut failing = Vec::new();

        for (id, results) in history.iter() {
            if let Some(latest) = results.back() {
                if latest.status.rank() > overall.rank() {
                    overall = latest.status;
                }
                if latest.status.is_failure() {
                    failing.push(id.clone());
                }
                checks.insert(id.clone(), latest.status);
            }
        }
        failing.sort();

        HealthSummary {
            overall,
            checks,
            failing,
            checked_at: self.clock.now(),
        }
    }

    /// Start polling one check on its interval, replacing any running poller
    pub fn schedule_check(self: &Arc<Self>, scheduler: &Scheduler, id: &str) -> VigilResult<TaskHandle> {
        let config = self
            .registry
            .get_health_check(id)
            .ok_or_else(|| VigilError::HealthCheckNotFound(id.to_string()))?;

        let weak: Weak<Self> = Arc::downgrade(self);
        let check_id = config.id.clone();
        let handle = scheduler.every(format!("health:{}", config.id), config.interval, move || {
            let weak = weak.clone();
            let check_id = check_id.clone();
            async move {
                if let Some(monitor) = weak.upgrade() {
                    if let Err(e) = monitor.run_check(&check_id).await {
                        warn!(check = %check_id, error = %e, "Scheduled health check failed");
                    }
                }
            }
        });

        if let Some(previous) = self.tasks.lock().insert(config.id.clone(), handle.clone()) {
            previous.cancel();
        }
        Ok(handle)
    }

    /// Poll every enabled check that has a sampler
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Vec<TaskHandle> {
        if !self.config.enabled {
            info!("Health monitoring disabled");
            return Vec::new();
        }
        let ids: Vec<String> = {
            let samplers = self.samplers.read();
            self.registry
                .health_checks()
                .into_iter()
                .filter(|c| c.enabled && samplers.contains_key(&c.id))
                .map(|c| c.id.clone())
                .collect()
        };

        ids.iter()
            .filter_map(|id| match self.schedule_check(scheduler, id) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(check = %id, error = %e, "Could not schedule health check");
                    None
                }
            })
            .collect()
    }

    pub fn stop(&self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.cancel();
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("samplers", &self.samplers.read().len())
            .field("scheduled", &self.tasks.lock().len())
            .finish()
    }
}
