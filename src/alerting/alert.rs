//! Alert instances and their lifecycle record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::context::EvaluationContext;

use super::rule::{AlertCategory, AlertSeverity};

/// Alert state. `Suppressed` is reported for rejected attempts and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Suppressed => write!(f, "suppressed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNote {
    pub author: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub channel: String,
    pub recipients: Vec<String>,
    pub escalation_level: u32,
    pub success: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub rule_id: String,
    pub rule_name: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub status: AlertStatus,
    /// Highest escalation level applied, 0 before any escalation
    pub escalation_level: u32,
    pub context: serde_json::Value,
    pub tags: Vec<String>,
    pub notes: Vec<AlertNote>,
    pub notifications: Vec<NotificationAttempt>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        matches!(self.status, AlertStatus::Active | AlertStatus::Acknowledged)
    }

    /// Creation-to-resolution time for resolved alerts
    pub fn time_to_resolve(&self) -> Option<Duration> {
        self.resolved_at
            .and_then(|resolved| (resolved - self.created_at).to_std().ok())
    }
}

/// Request to raise an alert for a registered rule
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub rule_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub context: EvaluationContext,
}

impl AlertRequest {
    pub fn new(rule_id: impl Into<String>, context: EvaluationContext) -> Self {
        Self {
            rule_id: rule_id.into(),
            title: None,
            description: None,
            severity: None,
            context,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Result of an alert attempt
#[derive(Debug, Clone)]
pub enum AlertOutcome {
    Created(Alert),
    Suppressed {
        rule_id: String,
        title: String,
        pattern: String,
    },
    CoolingDown {
        rule_id: String,
        remaining: Duration,
    },
    Throttled {
        rule_id: String,
        count: u32,
        window: Duration,
    },
    RuleDisabled {
        rule_id: String,
    },
}

impl AlertOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            AlertOutcome::Created(alert) => Some(alert),
            _ => None,
        }
    }

    pub fn into_alert(self) -> Option<Alert> {
        match self {
            AlertOutcome::Created(alert) => Some(alert),
            _ => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AlertOutcome::Created(_))
    }

    /// Short label used for logging and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AlertOutcome::Created(_) => "created",
            AlertOutcome::Suppressed { .. } => "suppressed",
            AlertOutcome::CoolingDown { .. } => "cooldown",
            AlertOutcome::Throttled { .. } => "throttled",
            AlertOutcome::RuleDisabled { .. } => "disabled",
        }
    }
}
