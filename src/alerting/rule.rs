//! Alert rule definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::condition::Condition;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
            AlertSeverity::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Performance,
    Task,
    Agent,
    Security,
    Compliance,
    Health,
    System,
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCategory::Performance => write!(f, "performance"),
            AlertCategory::Task => write!(f, "task"),
            AlertCategory::Agent => write!(f, "agent"),
            AlertCategory::Security => write!(f, "security"),
            AlertCategory::Compliance => write!(f, "compliance"),
            AlertCategory::Health => write!(f, "health"),
            AlertCategory::System => write!(f, "system"),
        }
    }
}

/// Side effect attached to a rule or an escalation level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    Notification {
        channel: String,
        recipients: Vec<String>,
        #[serde(default)]
        template: Option<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        template: Option<String>,
    },
    /// Page the listed recipients on the escalation channel
    Escalation { recipients: Vec<String> },
    /// Suppress follow-up alerts whose title matches `pattern`
    Suppress { pattern: String, duration: Duration },
}

impl RuleAction {
    pub fn notify(channel: impl Into<String>, recipients: &[&str]) -> Self {
        RuleAction::Notification {
            channel: channel.into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            template: None,
        }
    }

    /// Channel, recipients and template for actions that deliver a message
    pub fn delivery(&self) -> Option<(String, Vec<String>, Option<String>)> {
        match self {
            RuleAction::Notification {
                channel,
                recipients,
                template,
            } => Some((channel.clone(), recipients.clone(), template.clone())),
            RuleAction::Webhook { url, template } => {
                Some(("webhook".to_string(), vec![url.clone()], template.clone()))
            }
            RuleAction::Escalation { recipients } => {
                Some(("escalation".to_string(), recipients.clone(), None))
            }
            RuleAction::Suppress { .. } => None,
        }
    }
}

/// At most `max_alerts` alerts per rule inside each `window`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub window: Duration,
    pub max_alerts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    pub level: u32,
    /// Time after alert creation at which this level applies
    pub delay: Duration,
    pub actions: Vec<RuleAction>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub levels: Vec<EscalationLevel>,
}

impl EscalationPolicy {
    pub fn new(mut levels: Vec<EscalationLevel>) -> Self {
        levels.sort_by_key(|l| l.level);
        Self { levels }
    }

    /// First level above `current` whose delay has elapsed
    pub fn next_level(&self, current: u32, elapsed: Duration) -> Option<&EscalationLevel> {
        let mut levels: Vec<&EscalationLevel> = self.levels.iter().collect();
        levels.sort_by_key(|l| l.level);
        levels
            .into_iter()
            .find(|l| l.level > current && elapsed >= l.delay)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Every condition must match for the rule to fire
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,
    #[serde(default)]
    pub cooldown: Duration,
    #[serde(default)]
    pub escalation: Option<EscalationPolicy>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Title with `{path}` placeholders filled from the evaluation context
    #[serde(default)]
    pub title_template: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: AlertCategory,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            severity,
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
            throttle: None,
            cooldown: Duration::ZERO,
            escalation: None,
            tags: Vec::new(),
            title_template: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_throttle(mut self, window: Duration, max_alerts: u32) -> Self {
        self.throttle = Some(ThrottleConfig { window, max_alerts });
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_escalation(mut self, levels: Vec<EscalationLevel>) -> Self {
        self.escalation = Some(EscalationPolicy::new(levels));
        self
    }

    pub fn with_title(mut self, template: impl Into<String>) -> Self {
        self.title_template = Some(template.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
