//! Alert lifecycle: gating, creation, notification, escalation and resolution.
//!
//! Suppression, cooldown and throttle are checked and recorded under the same
//! lock that inserts the new alert, so two concurrent attempts for one rule
//! can never both pass the gate. Notification dispatch happens after the lock
//! is released and is bounded by the configured timeout.

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::clock::{Clock, elapsed_between, to_chrono};
use crate::config::AlertingConfig;
use crate::error::{VigilError, VigilResult};
use crate::metrics::MonitorMetrics;
use crate::notify::{Delivery, NotificationDispatcher};
use crate::observer::{MonitorEvent, ObserverRegistry};
use crate::scheduler::{Scheduler, TaskHandle};

use super::alert::{Alert, AlertNote, AlertOutcome, AlertRequest, AlertStatus, NotificationAttempt};
use super::gate::{GateDecision, RuleGate};
use super::registry::RuleRegistry;
use super::rule::{AlertCategory, AlertRule, AlertSeverity, EscalationLevel, RuleAction};
use super::suppression::{SuppressionList, SuppressionRule};

#[derive(Debug, Default)]
struct LifecycleState {
    active: HashMap<Uuid, Alert>,
    history: VecDeque<Alert>,
    gates: HashMap<String, RuleGate>,
    suppressions: SuppressionList,
}

impl LifecycleState {
    fn missing(&self, id: Uuid) -> VigilError {
        if self.history.iter().any(|a| a.id == id) {
            VigilError::InvalidTransition(format!("alert {} is already resolved", id))
        } else {
            VigilError::AlertNotFound(id.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertStatistics {
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_severity: HashMap<AlertSeverity, usize>,
    pub by_category: HashMap<AlertCategory, usize>,
    pub suppressions: usize,
    pub mean_time_to_resolve: Option<Duration>,
}

pub struct AlertManager {
    config: AlertingConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<RuleRegistry>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    observers: Arc<ObserverRegistry>,
    metrics: Option<Arc<MonitorMetrics>>,
    scheduler: Option<Arc<Scheduler>>,
    state: Mutex<LifecycleState>,
    timers: Mutex<HashMap<Uuid, Vec<TaskHandle>>>,
}

impl AlertManager {
    pub fn new(
        config: AlertingConfig,
        registry: Arc<RuleRegistry>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            clock,
            registry,
            dispatcher,
            observers: Arc::new(ObserverRegistry::new()),
            metrics: None,
            scheduler: None,
            state: Mutex::new(LifecycleState::default()),
            timers: Mutex::new(HashMap::new()),
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

    /// Arm a delayed escalation check per level when an alert is created.
    /// Without a scheduler only the periodic sweep escalates.
    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Raise an alert for a registered rule
    pub async fn raise(self: &Arc<Self>, request: AlertRequest) -> VigilResult<AlertOutcome> {
        let rule = self
            .registry
            .get_rule(&request.rule_id)
            .ok_or_else(|| VigilError::RuleNotFound(request.rule_id.clone()))?;

        let outcome = self.admit(&rule, request);
        let alert = match &outcome {
            AlertOutcome::Created(alert) => alert.clone(),
            rejected => {
                debug!("Alert for rule {} not created: {}", rule.id, rejected.reason());
                if let Some(metrics) = &self.metrics {
                    metrics
                        .alerts_rejected_total
                        .with_label_values(&[rejected.reason()])
                        .inc();
                }
                self.observers.notify(&MonitorEvent::AlertRejected {
                    rule_id: rule.id.clone(),
                    reason: rejected.reason().to_string(),
                });
                return Ok(outcome);
            }
        };

        info!(
            "Alert {} created: [{}] {} (rule {})",
            alert.id, alert.severity, alert.title, rule.id
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .alerts_raised_total
                .with_label_values(&[alert.severity.to_string().as_str()])
                .inc();
        }
        self.observers.notify(&MonitorEvent::AlertCreated(alert.clone()));
        self.schedule_escalations(&alert, &rule);
        self.dispatch(&alert, &rule.actions, 0).await;

        Ok(AlertOutcome::Created(
            self.get_alert(alert.id).unwrap_or(alert),
        ))
    }

    fn admit(&self, rule: &AlertRule, request: AlertRequest) -> AlertOutcome {
        if !rule.enabled {
            return AlertOutcome::RuleDisabled {
                rule_id: rule.id.clone(),
            };
        }

        let now = self.clock.now();
        let title = match (&request.title, &rule.title_template) {
            (Some(title), _) => title.clone(),
            (None, Some(template)) => request.context.render(template),
            (None, None) => rule.name.clone(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(suppression) = state.suppressions.matching(&title, now) {
            return AlertOutcome::Suppressed {
                rule_id: rule.id.clone(),
                title,
                pattern: suppression.pattern.clone(),
            };
        }

        let gate = state.gates.entry(rule.id.clone()).or_default();
        match gate.try_pass(rule, now) {
            GateDecision::Open => {}
            GateDecision::CoolingDown { remaining } => {
                return AlertOutcome::CoolingDown {
                    rule_id: rule.id.clone(),
                    remaining,
                };
            }
            GateDecision::Throttled { count, window } => {
                return AlertOutcome::Throttled {
                    rule_id: rule.id.clone(),
                    count,
                    window,
                };
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            category: rule.category,
            severity: request.severity.unwrap_or(rule.severity),
            title,
            description: request
                .description
                .unwrap_or_else(|| rule.description.clone()),
            status: AlertStatus::Active,
            escalation_level: 0,
            context: request.context.to_value(),
            tags: rule.tags.clone(),
            notes: Vec::new(),
            notifications: Vec::new(),
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        };
        state.active.insert(alert.id, alert.clone());

        for action in &rule.actions {
            if let RuleAction::Suppress { pattern, duration } = action {
                if let Err(e) =
                    state
                        .suppressions
                        .add(pattern, *duration, Some(format!("rule {}", rule.id)), now)
                {
                    warn!("Rule {} has an invalid suppression pattern: {}", rule.id, e);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.alerts_active.set(state.active.len() as i64);
        }
        AlertOutcome::Created(alert)
    }

    async fn dispatch(&self, alert: &Alert, actions: &[RuleAction], level: u32) {
        let mut attempts = Vec::new();

        for action in actions {
            let Some((channel, recipients, template)) = action.delivery() else {
                continue;
            };
            let delivery = Delivery {
                channel,
                recipients,
                template,
                escalation_level: level,
            };

            let result = match tokio::time::timeout(
                self.config.notification_timeout(),
                self.dispatcher.send(alert, &delivery),
            )
            .await
            {
                Ok(result) => result,
                Err(elapsed) => Err(VigilError::from(elapsed)),
            };

            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        "Notification for alert {} via {} failed: {}",
                        alert.id, delivery.channel, e
                    );
                    Some(e.to_string())
                }
            };
            if let Some(metrics) = &self.metrics {
                let outcome = if error.is_none() { "success" } else { "failure" };
                metrics
                    .notifications_total
                    .with_label_values(&[delivery.channel.as_str(), outcome])
                    .inc();
            }
            attempts.push(NotificationAttempt {
                channel: delivery.channel,
                recipients: delivery.recipients,
                escalation_level: level,
                success: error.is_none(),
                error,
                at: self.clock.now(),
            });
        }

        if attempts.is_empty() {
            return;
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(stored) = state.active.get_mut(&alert.id) {
            stored.notifications.extend(attempts);
        } else if let Some(stored) = state.history.iter_mut().find(|a| a.id == alert.id) {
            stored.notifications.extend(attempts);
        }
    }

    fn schedule_escalations(self: &Arc<Self>, alert: &Alert, rule: &AlertRule) {
        let (Some(scheduler), Some(policy)) = (&self.scheduler, &rule.escalation) else {
            return;
        };

        let handles: Vec<TaskHandle> = policy
            .levels
            .iter()
            .map(|level| {
                let weak: Weak<Self> = Arc::downgrade(self);
                let id = alert.id;
                scheduler.after(
                    format!("escalation:{}:{}", id, level.level),
                    level.delay,
                    move || async move {
                        if let Some(manager) = weak.upgrade() {
                            manager.check_escalation(id).await;
                        }
                    },
                )
            })
            .collect();

        if !handles.is_empty() {
            self.timers.lock().insert(alert.id, handles);
        }
    }

    fn cancel_escalations(&self, id: Uuid) {
        if let Some(handles) = self.timers.lock().remove(&id) {
            for handle in handles {
                handle.cancel();
            }
        }
    }

    /// Advance `alert` to its next due level, at most one level per call
    fn apply_escalation(
        registry: &RuleRegistry,
        alert: &mut Alert,
        now: chrono::DateTime<Utc>,
    ) -> Option<(Alert, EscalationLevel)> {
        if alert.status != AlertStatus::Active {
            return None;
        }
        let rule = registry.get_rule(&alert.rule_id)?;
        let policy = rule.escalation.as_ref()?;
        let elapsed = elapsed_between(alert.created_at, now);
        let level = policy.next_level(alert.escalation_level, elapsed)?.clone();
        alert.escalation_level = level.level;
        Some((alert.clone(), level))
    }

    async fn after_escalation(&self, alert: Alert, level: EscalationLevel) {
        warn!(
            "Alert {} escalated to level {}: {}",
            alert.id, level.level, alert.title
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .alerts_escalated_total
                .with_label_values(&[level.level.to_string().as_str()])
                .inc();
        }
        self.observers.notify(&MonitorEvent::AlertEscalated {
            alert: alert.clone(),
            level: level.level,
        });
        self.dispatch(&alert, &level.actions, level.level).await;
    }

    /// Escalate one alert if its next level is due. A resolved, acknowledged
    /// or unknown alert is left alone.
    pub async fn check_escalation(&self, id: Uuid) -> Option<u32> {
        let now = self.clock.now();
        let (alert, level) = {
            let mut state = self.state.lock();
            let alert = state.active.get_mut(&id)?;
            Self::apply_escalation(&self.registry, alert, now)?
        };
        let applied = level.level;
        self.after_escalation(alert, level).await;
        Some(applied)
    }

    /// Escalate every active alert whose next level is due
    pub async fn escalation_sweep(&self) -> Vec<(Uuid, u32)> {
        let now = self.clock.now();
        let due: Vec<(Alert, EscalationLevel)> = {
            let mut state = self.state.lock();
            state
                .active
                .values_mut()
                .filter_map(|alert| Self::apply_escalation(&self.registry, alert, now))
                .collect()
        };

        let mut applied = Vec::with_capacity(due.len());
        for (alert, level) in due {
            applied.push((alert.id, level.level));
            self.after_escalation(alert, level).await;
        }
        applied
    }

    pub fn acknowledge(&self, id: Uuid, actor: &str, note: Option<&str>) -> VigilResult<Alert> {
        let now = self.clock.now();
        let alert = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(alert) = state.active.get_mut(&id) else {
                return Err(state.missing(id));
            };
            if alert.status != AlertStatus::Active {
                return Err(VigilError::InvalidTransition(format!(
                    "alert {} is {}",
                    id, alert.status
                )));
            }
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(now);
            alert.acknowledged_by = Some(actor.to_string());
            if let Some(note) = note {
                alert.notes.push(AlertNote {
                    author: actor.to_string(),
                    message: note.to_string(),
                    at: now,
                });
            }
            alert.clone()
        };

        self.cancel_escalations(id);
        info!("Alert {} acknowledged by {}", id, actor);
        self.observers
            .notify(&MonitorEvent::AlertAcknowledged(alert.clone()));
        Ok(alert)
    }

    pub fn resolve(&self, id: Uuid, actor: &str, note: Option<&str>) -> VigilResult<Alert> {
        let now = self.clock.now();
        let (alert, active) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(mut alert) = state.active.remove(&id) else {
                return Err(state.missing(id));
            };
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(now);
            alert.resolved_by = Some(actor.to_string());
            if let Some(note) = note {
                alert.notes.push(AlertNote {
                    author: actor.to_string(),
                    message: note.to_string(),
                    at: now,
                });
            }

            state.history.push_back(alert.clone());
            while state.history.len() > self.config.max_history.max(1) {
                state.history.pop_front();
            }
            (alert, state.active.len())
        };

        self.cancel_escalations(id);
        info!("Alert {} resolved by {}", id, actor);
        if let Some(metrics) = &self.metrics {
            metrics
                .alerts_resolved_total
                .with_label_values(&[alert.severity.to_string().as_str()])
                .inc();
            metrics.alerts_active.set(active as i64);
        }
        self.observers.notify(&MonitorEvent::AlertResolved(alert.clone()));
        Ok(alert)
    }

    pub fn add_note(&self, id: Uuid, author: &str, message: &str) -> VigilResult<()> {
        let note = AlertNote {
            author: author.to_string(),
            message: message.to_string(),
            at: self.clock.now(),
        };
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(alert) = state.active.get_mut(&id) {
            alert.notes.push(note);
            return Ok(());
        }
        match state.history.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.notes.push(note);
                Ok(())
            }
            None => Err(VigilError::AlertNotFound(id.to_string())),
        }
    }

    /// Suppress alerts whose title matches `pattern` for `duration`
    pub fn suppress(
        &self,
        pattern: &str,
        duration: Duration,
        reason: Option<&str>,
    ) -> VigilResult<SuppressionRule> {
        let now = self.clock.now();
        let rule = self
            .state
            .lock()
            .suppressions
            .add(pattern, duration, reason.map(str::to_string), now)?;
        info!(
            "Suppressing alerts matching '{}' until {}",
            rule.pattern, rule.expires_at
        );
        Ok(rule)
    }

    pub fn lift_suppression(&self, id: Uuid) -> bool {
        self.state.lock().suppressions.remove(id)
    }

    pub fn suppressions(&self) -> Vec<SuppressionRule> {
        let now = self.clock.now();
        self.state.lock().suppressions.active(now)
    }

    /// Drop expired suppressions and reset elapsed throttle windows.
    /// Returns (suppressions purged, throttle windows reset).
    pub fn expire_sweep(&self) -> (usize, usize) {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let purged = state.suppressions.purge_expired(now);

        let mut reset = 0;
        state.gates.retain(|rule_id, gate| match self.registry.get_rule(rule_id) {
            Some(rule) => {
                if gate.expire(rule.throttle.as_ref(), now) {
                    reset += 1;
                }
                true
            }
            None => false,
        });

        if purged > 0 || reset > 0 {
            debug!(
                "Expiry sweep purged {} suppressions and reset {} throttle windows",
                purged, reset
            );
        }
        (purged, reset)
    }

    /// Drop resolved alerts older than the retention period
    pub fn cleanup_history(&self) -> usize {
        let cutoff = self.clock.now() - to_chrono(self.config.history_retention());
        let mut state = self.state.lock();
        let before = state.history.len();
        state
            .history
            .retain(|a| a.resolved_at.is_none_or(|resolved| resolved >= cutoff));
        before - state.history.len()
    }

    pub fn get_alert(&self, id: Uuid) -> Option<Alert> {
        let state = self.state.lock();
        state
            .active
            .get(&id)
            .or_else(|| state.history.iter().find(|a| a.id == id))
            .cloned()
    }

    /// Open alerts, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.state.lock().active.values().cloned().collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    pub fn alerts_for_rule(&self, rule_id: &str) -> Vec<Alert> {
        self.active_alerts()
            .into_iter()
            .filter(|a| a.rule_id == rule_id)
            .collect()
    }

    /// Resolved alerts, most recent first
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        self.state
            .lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> AlertStatistics {
        let now = self.clock.now();
        let state = self.state.lock();
        let mut stats = AlertStatistics {
            resolved: state.history.len(),
            suppressions: state.suppressions.active(now).len(),
            ..AlertStatistics::default()
        };

        for alert in state.active.values() {
            match alert.status {
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                _ => stats.active += 1,
            }
            *stats.by_severity.entry(alert.severity).or_insert(0) += 1;
            *stats.by_category.entry(alert.category).or_insert(0) += 1;
        }

        let resolve_times: Vec<Duration> =
            state.history.iter().filter_map(Alert::time_to_resolve).collect();
        if !resolve_times.is_empty() {
            let total: Duration = resolve_times.iter().sum();
            stats.mean_time_to_resolve = Some(total / resolve_times.len() as u32);
        }
        stats
    }

    /// Schedule the escalation sweep, the expiry sweep and history cleanup
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Vec<TaskHandle> {
        let escalation = {
            let weak = Arc::downgrade(self);
            scheduler.every(
                "alert-escalation-sweep",
                self.config.escalation_check_interval(),
                move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            manager.escalation_sweep().await;
                        }
                    }
                },
            )
        };
        let expiry = {
            let weak = Arc::downgrade(self);
            scheduler.every(
                "alert-expiry-sweep",
                self.config.expiry_sweep_interval(),
                move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            manager.expire_sweep();
                        }
                    }
                },
            )
        };
        let cleanup = {
            let weak = Arc::downgrade(self);
            scheduler.every(
                "alert-history-cleanup",
                self.config.cleanup_interval(),
                move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            let removed = manager.cleanup_history();
                            if removed > 0 {
                                info!("Removed {} expired alerts from history", removed);
                            }
                        }
                    }
                },
            )
        };
        vec![escalation, expiry, cleanup]
    }

    /// Cancel every pending escalation timer
    pub fn shutdown(&self) {
        for (_, handles) in self.timers.lock().drain() {
            for handle in handles {
                handle.cancel();
            }
        }
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AlertManager")
            .field("active", &state.active.len())
            .field("history", &state.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{Condition, EscalationLevel};
    use crate::clock::ManualClock;
    use crate::context::EvaluationContext;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(Uuid, String, u32)>>,
        fail_channel: Option<String>,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(&self, alert: &Alert, delivery: &Delivery) -> VigilResult<()> {
            if self.fail_channel.as_deref() == Some(delivery.channel.as_str()) {
                return Err(VigilError::Dispatch("smtp down".to_string()));
            }
            self.sent
                .lock()
                .push((alert.id, delivery.channel.clone(), delivery.escalation_level));
            Ok(())
        }
    }

    struct Fixture {
        manager: Arc<AlertManager>,
        registry: Arc<RuleRegistry>,
        dispatcher: Arc<RecordingDispatcher>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(dispatcher: RecordingDispatcher) -> Fixture {
        let registry = Arc::new(RuleRegistry::new());
        let dispatcher = Arc::new(dispatcher);
        let clock = Arc::new(ManualClock::default());
        let manager = Arc::new(AlertManager::new(
            AlertingConfig::default(),
            registry.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        Fixture {
            manager,
            registry,
            dispatcher,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingDispatcher::default())
    }

    fn rule(id: &str) -> AlertRule {
        AlertRule::new(id, "Task Blocked", AlertCategory::Task, AlertSeverity::Warning)
            .with_condition(Condition::pattern("task.status", "blocked"))
            .with_action(RuleAction::notify("email", &["ops@example.com"]))
    }

    fn request(rule_id: &str) -> AlertRequest {
        AlertRequest::new(rule_id, EvaluationContext::new().with("task_id", "task-42"))
    }

    #[tokio::test]
    async fn test_create_dispatches_and_records_attempts() {
        let f = fixture();
        f.registry
            .register_rule(rule("task_blocked").with_title("Task Blocked: {task_id}"))
            .unwrap();

        let outcome = f.manager.raise(request("task_blocked")).await.unwrap();
        let alert = outcome.alert().unwrap();
        assert_eq!(alert.title, "Task Blocked: task-42");
        assert_eq!(alert.notifications.len(), 1);
        assert!(alert.notifications[0].success);
        assert_eq!(f.dispatcher.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_rules() {
        let f = fixture();
        assert!(matches!(
            f.manager.raise(request("missing")).await,
            Err(VigilError::RuleNotFound(_))
        ));

        f.registry.register_rule(rule("off").disabled()).unwrap();
        let outcome = f.manager.raise(request("off")).await.unwrap();
        assert!(matches!(outcome, AlertOutcome::RuleDisabled { .. }));
    }

    #[tokio::test]
    async fn test_failed_channel_does_not_block_others() {
        let f = fixture_with(RecordingDispatcher {
            fail_channel: Some("email".to_string()),
            ..RecordingDispatcher::default()
        });
        f.registry
            .register_rule(rule("r").with_action(RuleAction::notify("slack", &["#ops"])))
            .unwrap();

        let alert = f.manager.raise(request("r")).await.unwrap().into_alert().unwrap();
        assert_eq!(alert.notifications.len(), 2);
        assert!(!alert.notifications[0].success);
        assert!(alert.notifications[1].success);
        assert_eq!(f.dispatcher.sent.lock()[0].1, "slack");
    }

    #[tokio::test]
    async fn test_cooldown_rejects_until_elapsed() {
        let f = fixture();
        f.registry
            .register_rule(rule("r").with_cooldown(Duration::from_secs(300)))
            .unwrap();

        assert!(f.manager.raise(request("r")).await.unwrap().is_created());
        f.clock.advance(Duration::from_secs(120));
        assert!(matches!(
            f.manager.raise(request("r")).await.unwrap(),
            AlertOutcome::CoolingDown { .. }
        ));
        f.clock.advance(Duration::from_secs(180));
        assert!(f.manager.raise(request("r")).await.unwrap().is_created());
    }

    #[tokio::test]
    async fn test_suppression_action_silences_follow_ups() {
        let f = fixture();
        f.registry
            .register_rule(rule("r").with_action(RuleAction::Suppress {
                pattern: "^Task Blocked".to_string(),
                duration: Duration::from_secs(600),
            }))
            .unwrap();

        assert!(f.manager.raise(request("r")).await.unwrap().is_created());
        assert!(matches!(
            f.manager.raise(request("r")).await.unwrap(),
            AlertOutcome::Suppressed { .. }
        ));
        f.clock.advance(Duration::from_secs(600));
        f.manager.expire_sweep();
        assert!(f.manager.suppressions().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let f = fixture();
        f.registry.register_rule(rule("r")).unwrap();
        let alert = f.manager.raise(request("r")).await.unwrap().into_alert().unwrap();

        let acked = f.manager.acknowledge(alert.id, "alice", Some("looking")).unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert!(matches!(
            f.manager.acknowledge(alert.id, "bob", None),
            Err(VigilError::InvalidTransition(_))
        ));

        f.manager.add_note(alert.id, "alice", "restarted worker").unwrap();
        let resolved = f.manager.resolve(alert.id, "alice", None).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.notes.len(), 2);

        assert!(matches!(
            f.manager.resolve(alert.id, "alice", None),
            Err(VigilError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.manager.acknowledge(alert.id, "alice", None),
            Err(VigilError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.manager.acknowledge(Uuid::new_v4(), "alice", None),
            Err(VigilError::AlertNotFound(_))
        ));
        assert_eq!(f.manager.history(10).len(), 1);
        assert!(f.manager.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_escalates_one_level_at_a_time() {
        let f = fixture();
        f.registry
            .register_rule(rule("r").with_escalation(vec![
                EscalationLevel {
                    level: 1,
                    delay: Duration::from_secs(30 * 60),
                    actions: vec![RuleAction::notify("pager", &["oncall"])],
                },
                EscalationLevel {
                    level: 2,
                    delay: Duration::from_secs(60 * 60),
                    actions: vec![RuleAction::Escalation {
                        recipients: vec!["manager".to_string()],
                    }],
                },
            ]))
            .unwrap();
        let alert = f.manager.raise(request("r")).await.unwrap().into_alert().unwrap();

        assert!(f.manager.escalation_sweep().await.is_empty());
        f.clock.advance(Duration::from_secs(90 * 60));
        assert_eq!(f.manager.escalation_sweep().await, vec![(alert.id, 1)]);
        assert_eq!(f.manager.escalation_sweep().await, vec![(alert.id, 2)]);
        assert!(f.manager.escalation_sweep().await.is_empty());

        let levels: Vec<u32> = f.dispatcher.sent.lock().iter().map(|s| s.2).collect();
        assert_eq!(levels, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_statistics_and_retention() {
        let f = fixture();
        f.registry.register_rule(rule("r")).unwrap();
        let first = f.manager.raise(request("r")).await.unwrap().into_alert().unwrap();
        f.manager.raise(request("r")).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        f.manager.resolve(first.id, "ops", None).unwrap();

        let stats = f.manager.statistics();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.by_severity.get(&AlertSeverity::Warning), Some(&1));
        assert_eq!(stats.mean_time_to_resolve, Some(Duration::from_secs(60)));

        f.clock.advance(Duration::from_secs(8 * 24 * 3600));
        assert_eq!(f.manager.cleanup_history(), 1);
        assert!(f.manager.history(10).is_empty());
    }
}
