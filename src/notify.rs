//! Notification dispatch boundary.
//!
//! The alert manager hands every delivering [`RuleAction`](crate::alerting::RuleAction)
//! to a [`NotificationDispatcher`]. Transports live outside this crate; the
//! built-in [`LogDispatcher`] writes deliveries to the log.

use async_trait::async_trait;
use log::info;
use serde_json::Value;

use crate::alerting::Alert;
use crate::context::EvaluationContext;
use crate::error::VigilResult;

/// One message to deliver for an alert
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub channel: String,
    pub recipients: Vec<String>,
    pub template: Option<String>,
    /// 0 for the initial notification, otherwise the escalation level
    pub escalation_level: u32,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver a notification for the alert.
    ///
    /// # Errors
    ///
    /// Returns an error when the delivery could not be completed. The caller
    /// records the failure on the alert and never retries inline.
    async fn send(&self, alert: &Alert, delivery: &Delivery) -> VigilResult<()>;
}

/// Render a delivery body.
///
/// Templates may reference `{title}`, `{severity}`, `{status}`, `{rule}`,
/// `{description}`, `{escalation_level}` and any path in the alert context.
/// Without a template the title and severity are used.
pub fn render_message(alert: &Alert, delivery: &Delivery) -> String {
    let template = match &delivery.template {
        Some(template) => template.as_str(),
        None => "[{severity}] {title}",
    };

    let mut ctx = match &alert.context {
        Value::Object(map) => EvaluationContext::from(map.clone()),
        _ => EvaluationContext::new(),
    };
    ctx.insert("title", alert.title.clone());
    ctx.insert("severity", alert.severity.to_string());
    ctx.insert("status", alert.status.to_string());
    ctx.insert("rule", alert.rule_name.clone());
    ctx.insert("description", alert.description.clone());
    ctx.insert("escalation_level", delivery.escalation_level);
    ctx.render(template)
}

/// Dispatcher that logs every delivery
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, alert: &Alert, delivery: &Delivery) -> VigilResult<()> {
        info!(
            "Notify {} via {} (level {}): {}",
            delivery.recipients.join(","),
            delivery.channel,
            delivery.escalation_level,
            render_message(alert, delivery)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertCategory, AlertSeverity, AlertStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            rule_id: "high_cpu_usage".to_string(),
            rule_name: "High CPU Usage".to_string(),
            category: AlertCategory::Performance,
            severity: AlertSeverity::Critical,
            title: "High CPU Usage".to_string(),
            description: String::new(),
            status: AlertStatus::Active,
            escalation_level: 0,
            context: serde_json::json!({"cpu_usage": 0.92, "host": {"name": "worker-3"}}),
            tags: vec![],
            notes: vec![],
            notifications: vec![],
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn test_default_message() {
        let delivery = Delivery {
            channel: "email".to_string(),
            recipients: vec!["ops@example.com".to_string()],
            template: None,
            escalation_level: 0,
        };
        assert_eq!(render_message(&alert(), &delivery), "[critical] High CPU Usage");
    }

    #[test]
    fn test_template_reads_alert_context() {
        let delivery = Delivery {
            channel: "slack".to_string(),
            recipients: vec!["#ops".to_string()],
            template: Some("{host.name} at {cpu_usage} (L{escalation_level})".to_string()),
            escalation_level: 2,
        };
        assert_eq!(render_message(&alert(), &delivery), "worker-3 at 0.92 (L2)");
    }

    #[tokio::test]
    async fn test_log_dispatcher_succeeds() {
        let delivery = Delivery {
            channel: "log".to_string(),
            recipients: vec![],
            template: None,
            escalation_level: 0,
        };
        assert!(LogDispatcher.send(&alert(), &delivery).await.is_ok());
    }
}
