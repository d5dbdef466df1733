//! Metric samples and platform events accepted by the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::alerting::{AlertCategory, AlertSeverity};
use crate::context::EvaluationContext;
use crate::defaults::{COMPLIANCE_RULE, SECURITY_EVENT_RULE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: None,
            category: None,
            tags: HashMap::new(),
            timestamp,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The value under its own name, plus the full sample under `metric`
    pub fn to_context(&self) -> EvaluationContext {
        EvaluationContext::new()
            .with(self.name.clone(), self.value)
            .with(
                "metric",
                json!({
                    "name": self.name,
                    "value": self.value,
                    "unit": self.unit,
                    "category": self.category,
                    "timestamp": self.timestamp.to_rfc3339(),
                }),
            )
            .with("tags", json!(self.tags))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
    #[default]
    Unknown,
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutcome::Success => write!(f, "success"),
            EventOutcome::Failure => write!(f, "failure"),
            EventOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Something that happened on the platform: a task state change, an access
/// decision, a compliance control result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub event_type: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    #[serde(default)]
    pub outcome: EventOutcome,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(
        event_type: impl Into<String>,
        category: AlertCategory,
        severity: AlertSeverity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            category,
            outcome: EventOutcome::Unknown,
            actor: None,
            target: None,
            timestamp,
        }
    }

    pub fn with_outcome(mut self, outcome: EventOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn to_context(&self) -> EvaluationContext {
        EvaluationContext::new().with(
            "event",
            json!({
                "type": self.event_type,
                "severity": self.severity.to_string(),
                "category": self.category.to_string(),
                "outcome": self.outcome.to_string(),
                "actor": self.actor.clone().map_or(Value::Null, Value::String),
                "target": self.target.clone().map_or(Value::Null, Value::String),
                "timestamp": self.timestamp.to_rfc3339(),
            }),
        )
    }

    /// Rule raised for this event regardless of rule conditions
    pub fn dedicated_rule(&self) -> Option<&'static str> {
        match (self.category, self.outcome) {
            (AlertCategory::Security, _) if self.severity == AlertSeverity::Critical => {
                Some(SECURITY_EVENT_RULE)
            }
            (AlertCategory::Compliance, EventOutcome::Failure) => Some(COMPLIANCE_RULE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_context_exposes_value_by_name() {
        let sample = MetricSample::new("cpu_usage", 0.85, Utc::now())
            .with_unit("ratio")
            .with_tag("host", "worker-3");
        let ctx = sample.to_context();
        assert_eq!(ctx.number("cpu_usage"), Some(0.85));
        assert_eq!(ctx.text("metric.unit"), Some("ratio"));
        assert_eq!(ctx.text("tags.host"), Some("worker-3"));
    }

    #[test]
    fn test_dedicated_rules() {
        let now = Utc::now();
        let breach = PlatformEvent::new("auth.bruteforce", AlertCategory::Security, AlertSeverity::Critical, now);
        assert_eq!(breach.dedicated_rule(), Some(SECURITY_EVENT_RULE));

        let noisy = PlatformEvent::new("auth.failed", AlertCategory::Security, AlertSeverity::Warning, now);
        assert_eq!(noisy.dedicated_rule(), None);

        let paged = PlatformEvent::new("auth.lockout", AlertCategory::Security, AlertSeverity::Emergency, now);
        assert_eq!(paged.dedicated_rule(), None);

        let audit = PlatformEvent::new("retention.check", AlertCategory::Compliance, AlertSeverity::Info, now);
        assert_eq!(audit.dedicated_rule(), None);
        assert_eq!(
            audit.with_outcome(EventOutcome::Failure).dedicated_rule(),
            Some(COMPLIANCE_RULE)
        );
    }

    #[test]
    fn test_event_context_paths() {
        let event = PlatformEvent::new("task.blocked", AlertCategory::Task, AlertSeverity::Warning, Utc::now())
            .with_target("task-7");
        let ctx = event.to_context();
        assert_eq!(ctx.text("event.type"), Some("task.blocked"));
        assert_eq!(ctx.text("event.target"), Some("task-7"));
        assert_eq!(ctx.text("event.category"), Some("task"));
    }
}
