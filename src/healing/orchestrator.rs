//! Trigger matching, gating and sequential execution of self-healing actions.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::alerting::{AlertManager, AlertRequest};
use crate::clock::{Clock, elapsed_between, to_chrono};
use crate::config::HealingConfig;
use crate::context::EvaluationContext;
use crate::error::{VigilError, VigilResult};
use crate::health::HealthCheckResult;
use crate::metrics::MonitorMetrics;
use crate::observer::{MonitorEvent, ObserverRegistry};
use crate::scheduler::{Scheduler, TaskHandle};

use super::action::{
    ExecutionStatus, HealingOutcome, SelfHealingAction, SelfHealingExecutionResult, SkipReason,
    StepOutcome,
};
use super::executor::{ActionExecutor, HealingContext};

/// Rule raised through the alert manager when a run fails
pub const HEALING_FAILURE_RULE: &str = "self_healing_failure";

#[derive(Debug, Default)]
struct ActionState {
    last_executed: Option<DateTime<Utc>>,
    /// Completion times inside the rate window, oldest first
    completions: VecDeque<DateTime<Utc>>,
    running: bool,
}

/// Holds an action's `running` flag for the lifetime of one run.
///
/// Dropping the guard without [`RunGuard::complete`] (the run's future was
/// cancelled) clears the flag without recording a completion.
struct RunGuard<'a> {
    state: &'a Mutex<HashMap<String, ActionState>>,
    action_id: String,
    armed: bool,
}

impl RunGuard<'_> {
    fn complete(mut self, completed_at: DateTime<Utc>) {
        self.armed = false;
        let mut states = self.state.lock();
        let state = states.entry(self.action_id.clone()).or_default();
        state.running = false;
        state.last_executed = Some(completed_at);
        state.completions.push_back(completed_at);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(state) = self.state.lock().get_mut(&self.action_id) {
            state.running = false;
        }
        warn!(action = %self.action_id, "Self-healing run cancelled before completion");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealingStatistics {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub by_action: HashMap<String, usize>,
}

pub struct SelfHealingOrchestrator {
    config: HealingConfig,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn ActionExecutor>,
    actions: RwLock<HashMap<String, Arc<SelfHealingAction>>>,
    state: Mutex<HashMap<String, ActionState>>,
    history: Mutex<VecDeque<SelfHealingExecutionResult>>,
    observers: Arc<ObserverRegistry>,
    metrics: Option<Arc<MonitorMetrics>>,
    alerts: Option<Arc<AlertManager>>,
}

impl SelfHealingOrchestrator {
    pub fn new(config: HealingConfig, executor: Arc<dyn ActionExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            executor,
            actions: RwLock::new(HashMap::new()),
            state: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            observers: Arc::new(ObserverRegistry::new()),
            metrics: None,
            alerts: None,
        }
    }

    pub fn with_observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Raise an alert through `alerts` whenever a run fails
    pub fn with_alert_manager(mut self, alerts: Arc<AlertManager>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    fn validate(action: &SelfHealingAction) -> VigilResult<()> {
        if action.steps.is_empty() {
            return Err(VigilError::Configuration(format!(
                "self-healing action {} has no steps",
                action.id
            )));
        }
        if action.max_executions == 0 {
            return Err(VigilError::Configuration(format!(
                "self-healing action {} must allow at least one execution",
                action.id
            )));
        }
        Ok(())
    }

    /// Insert or replace an action definition
    pub fn register_action(&self, action: SelfHealingAction) -> VigilResult<Option<Arc<SelfHealingAction>>> {
        Self::validate(&action)?;
        info!(action = %action.id, "Registered self-healing action");
        Ok(self.actions.write().insert(action.id.clone(), Arc::new(action)))
    }

    pub fn update_action(&self, action: SelfHealingAction) -> VigilResult<()> {
        Self::validate(&action)?;
        let mut actions = self.actions.write();
        if !actions.contains_key(&action.id) {
            return Err(VigilError::ActionNotFound(action.id));
        }
        actions.insert(action.id.clone(), Arc::new(action));
        Ok(())
    }

    pub fn remove_action(&self, id: &str) -> VigilResult<Arc<SelfHealingAction>> {
        self.state.lock().remove(id);
        self.actions
            .write()
            .remove(id)
            .ok_or_else(|| VigilError::ActionNotFound(id.to_string()))
    }

    pub fn get_action(&self, id: &str) -> Option<Arc<SelfHealingAction>> {
        self.actions.read().get(id).cloned()
    }

    pub fn actions(&self) -> Vec<Arc<SelfHealingAction>> {
        let mut actions: Vec<Arc<SelfHealingAction>> = self.actions.read().values().cloned().collect();
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions
    }

    /// Run every enabled action whose trigger fires for `result`.
    ///
    /// `recent` is the check's history, oldest first, ending with `result`.
    /// Matching actions run concurrently; outcomes are returned highest
    /// priority first.
    pub async fn handle_health_result(
        &self,
        result: &HealthCheckResult,
        recent: &[HealthCheckResult],
    ) -> Vec<HealingOutcome> {
        let mut matched: Vec<(Arc<SelfHealingAction>, Vec<String>)> = self
            .actions
            .read()
            .values()
            .filter(|action| action.enabled)
            .filter_map(|action| {
                let reasons: Vec<String> = action
                    .triggers
                    .iter()
                    .filter(|t| t.fires(result, recent))
                    .map(|t| match t.consecutive_failures {
                        Some(n) if n > 1 => format!(
                            "{} reported {} {} times in a row",
                            t.health_check_id, t.status, n
                        ),
                        _ => format!("{} reported {}", t.health_check_id, t.status),
                    })
                    .collect();
                if reasons.is_empty() {
                    None
                } else {
                    Some((action.clone(), reasons))
                }
            })
            .collect();

        if matched.is_empty() {
            return Vec::new();
        }
        matched.sort_by(|a, b| b.0.priority.cmp(&a.0.priority).then_with(|| a.0.id.cmp(&b.0.id)));
        debug!(
            check = %result.check_id,
            status = %result.status,
            matched = matched.len(),
            "Health result matched self-healing actions"
        );

        join_all(
            matched
                .into_iter()
                .map(|(action, reasons)| self.execute(action, reasons, Some(result.clone()))),
        )
        .await
    }

    /// Run an action outside automatic matching. Cooldown and rate gates still apply.
    pub async fn trigger_manual(&self, action_id: &str, reason: &str) -> VigilResult<HealingOutcome> {
        let action = self
            .get_action(action_id)
            .ok_or_else(|| VigilError::ActionNotFound(action_id.to_string()))?;
        Ok(self
            .execute(action, vec![format!("manual: {}", reason)], None)
            .await)
    }

    fn admit(&self, action: &SelfHealingAction, now: DateTime<Utc>) -> Result<RunGuard<'_>, SkipReason> {
        if !action.enabled {
            return Err(SkipReason::Disabled);
        }

        let mut states = self.state.lock();
        let state = states.entry(action.id.clone()).or_default();
        if state.running {
            return Err(SkipReason::AlreadyRunning);
        }
        if let Some(last) = state.last_executed {
            let elapsed = elapsed_between(last, now);
            if elapsed < action.cooldown {
                return Err(SkipReason::CoolingDown {
                    remaining: action.cooldown - elapsed,
                });
            }
        }

        let cutoff = now - to_chrono(self.config.rate_window());
        while state.completions.front().is_some_and(|t| *t <= cutoff) {
            state.completions.pop_front();
        }
        let executions = state.completions.len() as u32;
        if executions >= action.max_executions {
            return Err(SkipReason::RateLimited {
                executions,
                max: action.max_executions,
            });
        }

        state.running = true;
        Ok(RunGuard {
            state: &self.state,
            action_id: action.id.clone(),
            armed: true,
        })
    }

    fn skip(&self, action: &SelfHealingAction, reason: SkipReason) -> HealingOutcome {
        info!(action = %action.id, reason = reason.label(), "Skipping self-healing action");
        if let Some(metrics) = &self.metrics {
            metrics
                .healing_skipped_total
                .with_label_values(&[reason.label()])
                .inc();
        }
        self.observers.notify(&MonitorEvent::HealingSkipped {
            action_id: action.id.clone(),
            reason: reason.clone(),
        });
        HealingOutcome::Skipped {
            action_id: action.id.clone(),
            reason,
        }
    }

    async fn execute(
        &self,
        action: Arc<SelfHealingAction>,
        trigger_reasons: Vec<String>,
        result: Option<HealthCheckResult>,
    ) -> HealingOutcome {
        let started_at = self.clock.now();
        let guard = match self.admit(&action, started_at) {
            Ok(guard) => guard,
            Err(reason) => return self.skip(&action, reason),
        };

        let ctx = HealingContext {
            action_id: action.id.clone(),
            trigger_reasons: trigger_reasons.clone(),
            result,
        };
        let span = info_span!("self_healing", action = %action.id);
        let started = tokio::time::Instant::now();
        let (status, steps) = self.run_steps(&action, &ctx).instrument(span).await;
        let duration = started.elapsed();
        let completed_at = self.clock.now();

        guard.complete(completed_at);

        let execution = SelfHealingExecutionResult {
            id: Uuid::new_v4(),
            action_id: action.id.clone(),
            action_name: action.name.clone(),
            status,
            steps,
            trigger_reasons,
            started_at,
            completed_at,
            duration,
        };
        self.record(execution.clone());

        match status {
            ExecutionStatus::Success => {
                info!(action = %action.id, ?duration, "Self-healing action succeeded")
            }
            ExecutionStatus::Failure => {
                error!(action = %action.id, ?duration, "Self-healing action failed");
                self.raise_failure_alert(&execution).await;
            }
        }
        if let Some(metrics) = &self.metrics {
            let status_label = status.to_string();
            metrics
                .healing_executions_total
                .with_label_values(&[action.id.as_str(), status_label.as_str()])
                .inc();
            metrics.healing_duration.observe(duration.as_secs_f64());
        }
        self.observers
            .notify(&MonitorEvent::HealingExecuted(execution.clone()));

        HealingOutcome::Executed(execution)
    }

    async fn run_steps(
        &self,
        action: &SelfHealingAction,
        ctx: &HealingContext,
    ) -> (ExecutionStatus, Vec<StepOutcome>) {
        let mut outcomes = Vec::with_capacity(action.steps.len());
        let mut status = ExecutionStatus::Success;

        for step in &action.steps {
            let started = tokio::time::Instant::now();
            let outcome = match tokio::time::timeout(step.timeout, self.executor.execute(step, ctx)).await {
                Ok(Ok(message)) => StepOutcome {
                    kind: step.kind.clone(),
                    success: true,
                    timed_out: false,
                    message: Some(message),
                    error: None,
                    duration: started.elapsed(),
                },
                Ok(Err(e)) => StepOutcome {
                    kind: step.kind.clone(),
                    success: false,
                    timed_out: false,
                    message: None,
                    error: Some(e.to_string()),
                    duration: started.elapsed(),
                },
                Err(_) => StepOutcome {
                    kind: step.kind.clone(),
                    success: false,
                    timed_out: true,
                    message: None,
                    error: Some(format!("step timed out after {:?}", step.timeout)),
                    duration: started.elapsed(),
                },
            };

            let failed = !outcome.success;
            if failed {
                warn!(
                    step = %step.kind,
                    retryable = step.retryable,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "Self-healing step failed"
                );
            } else {
                debug!(step = %step.kind, "Self-healing step completed");
            }
            outcomes.push(outcome);

            if failed && !step.retryable {
                status = ExecutionStatus::Failure;
                break;
            }
        }

        (status, outcomes)
    }

    fn record(&self, execution: SelfHealingExecutionResult) {
        let mut history = self.history.lock();
        history.push_back(execution);
        while history.len() > self.config.max_history.max(1) {
            history.pop_front();
        }
    }

    async fn raise_failure_alert(&self, execution: &SelfHealingExecutionResult) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        let failed_step = execution
            .steps
            .iter()
            .rfind(|s| !s.success)
            .map(|s| s.kind.to_string())
            .unwrap_or_default();
        let ctx = EvaluationContext::new()
            .with("action_id", execution.action_id.clone())
            .with("action_name", execution.action_name.clone())
            .with("failed_step", failed_step)
            .with("trigger_reasons", execution.trigger_reasons.clone());
        let request = AlertRequest::new(HEALING_FAILURE_RULE, ctx);

        match alerts.raise(request).await {
            Ok(outcome) => debug!(outcome = outcome.reason(), "Self-healing failure alert"),
            Err(VigilError::RuleNotFound(_)) => {
                debug!("No {} rule registered", HEALING_FAILURE_RULE)
            }
            Err(e) => warn!(error = %e, "Failed to raise self-healing failure alert"),
        }
    }

    /// Drop completion timestamps that left the rate window
    pub fn prune_rate_windows(&self) -> usize {
        let cutoff = self.clock.now() - to_chrono(self.config.rate_window());
        let mut removed = 0;
        for state in self.state.lock().values_mut() {
            while state.completions.front().is_some_and(|t| *t <= cutoff) {
                state.completions.pop_front();
                removed += 1;
            }
        }
        removed
    }

    /// Completed executions of `action_id` inside the current rate window
    pub fn executions_in_window(&self, action_id: &str) -> usize {
        let cutoff = self.clock.now() - to_chrono(self.config.rate_window());
        self.state
            .lock()
            .get(action_id)
            .map(|s| s.completions.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0)
    }

    pub fn last_executed(&self, action_id: &str) -> Option<DateTime<Utc>> {
        self.state.lock().get(action_id).and_then(|s| s.last_executed)
    }

    /// Most recent executions first
    pub fn history(&self, limit: usize) -> Vec<SelfHealingExecutionResult> {
        self.history.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn statistics(&self) -> HealingStatistics {
        let history = self.history.lock();
        let mut stats = HealingStatistics {
            total: history.len(),
            ..HealingStatistics::default()
        };
        for execution in history.iter() {
            match execution.status {
                ExecutionStatus::Success => stats.successes += 1,
                ExecutionStatus::Failure => stats.failures += 1,
            }
            *stats.by_action.entry(execution.action_id.clone()).or_insert(0) += 1;
        }
        stats
    }

    /// Schedule the periodic rate-window reset
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Vec<TaskHandle> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = scheduler.every(
            "healing-rate-reset",
            self.config.rate_reset_interval(),
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(orchestrator) = weak.upgrade() {
                        let removed = orchestrator.prune_rate_windows();
                        if removed > 0 {
                            debug!(removed, "Pruned self-healing rate windows");
                        }
                    }
                }
            },
        );
        vec![handle]
    }
}

impl std::fmt::Debug for SelfHealingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfHealingOrchestrator")
            .field("actions", &self.actions.read().len())
            .field("history", &self.history.lock().len())
            .finish()
    }
}
