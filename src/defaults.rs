//! Built-in alert rules, health checks and self-healing actions.
//!
//! Rules without conditions are never matched by metric evaluation. They are
//! raised directly: the event ingest raises the security and compliance rules
//! and the orchestrator raises the self-healing failure rule.

use std::time::Duration;

use crate::alerting::{
    AlertCategory, AlertRule, AlertSeverity, ComparisonOperator, Condition, EscalationLevel,
    RuleAction,
};
use crate::healing::{
    ActionStep, HEALING_FAILURE_RULE, HealingTrigger, SelfHealingAction, StepKind,
};
use crate::health::{HealthCategory, HealthCheckConfig, HealthStatus, HealthThresholds};

pub const HIGH_CPU_RULE: &str = "high_cpu_usage";
pub const TASK_BLOCKED_RULE: &str = "task_blocked";
pub const AGENT_ERROR_ANOMALY_RULE: &str = "agent_error_anomaly";
pub const SECURITY_EVENT_RULE: &str = "security_critical_event";
pub const COMPLIANCE_RULE: &str = "compliance_violation";

pub const MEMORY_CHECK: &str = "system_memory_usage";
pub const CPU_CHECK: &str = "system_cpu_usage";
pub const PERFORMANCE_CHECK: &str = "performance_score";
pub const TASK_QUEUE_CHECK: &str = "task_queue_depth";

const MINUTE: u64 = 60;

pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            HIGH_CPU_RULE,
            "High CPU Usage",
            AlertCategory::Performance,
            AlertSeverity::Warning,
        )
        .with_description("CPU usage above 80%")
        .with_condition(Condition::threshold(
            "cpu_usage",
            ComparisonOperator::GreaterThan,
            0.8,
        ))
        .with_title("High CPU usage: {cpu_usage}")
        .with_action(RuleAction::notify("email", &["ops-team"]))
        .with_throttle(Duration::from_secs(15 * MINUTE), 1)
        .with_escalation(vec![EscalationLevel {
            level: 1,
            delay: Duration::from_secs(30 * MINUTE),
            actions: vec![RuleAction::notify("pager", &["on-call"])],
        }])
        .with_tags(&["performance", "cpu"]),
        AlertRule::new(
            TASK_BLOCKED_RULE,
            "Task Blocked",
            AlertCategory::Task,
            AlertSeverity::Warning,
        )
        .with_description("A task reported itself as blocked")
        .with_condition(Condition::pattern("event.type", r"^task[._]blocked$"))
        .with_title("Task Blocked: {event.target}")
        .with_action(RuleAction::notify("slack", &["#agent-ops"]))
        .with_cooldown(Duration::from_secs(5 * MINUTE))
        .with_tags(&["task"]),
        AlertRule::new(
            AGENT_ERROR_ANOMALY_RULE,
            "Agent Error Rate Anomaly",
            AlertCategory::Agent,
            AlertSeverity::Warning,
        )
        .with_description("Agent error rate deviates from its recent baseline")
        .with_condition(Condition::anomaly("agent_error_rate"))
        .with_title("Anomalous agent error rate: {agent_error_rate}")
        .with_action(RuleAction::notify("slack", &["#agent-ops"]))
        .with_cooldown(Duration::from_secs(10 * MINUTE))
        .with_tags(&["agent", "anomaly"]),
        AlertRule::new(
            SECURITY_EVENT_RULE,
            "Critical Security Event",
            AlertCategory::Security,
            AlertSeverity::Critical,
        )
        .with_description("Critical security event reported by the platform")
        .with_title("Security event: {event.type} by {event.actor}")
        .with_action(RuleAction::notify("email", &["security-team"]))
        .with_action(RuleAction::notify("pager", &["security-on-call"]))
        .with_escalation(vec![EscalationLevel {
            level: 1,
            delay: Duration::from_secs(15 * MINUTE),
            actions: vec![RuleAction::Escalation {
                recipients: vec!["ciso".to_string()],
            }],
        }])
        .with_tags(&["security"]),
        AlertRule::new(
            COMPLIANCE_RULE,
            "Compliance Violation",
            AlertCategory::Compliance,
            AlertSeverity::Critical,
        )
        .with_description("An operation failed a compliance control")
        .with_title("Compliance violation: {event.type} on {event.target}")
        .with_action(RuleAction::notify("email", &["compliance-team"]))
        .with_tags(&["compliance"]),
        AlertRule::new(
            HEALING_FAILURE_RULE,
            "Self-Healing Failure",
            AlertCategory::System,
            AlertSeverity::Warning,
        )
        .with_description("A self-healing action did not complete")
        .with_title("Self-healing failed: {action_name}")
        .with_action(RuleAction::notify("slack", &["#agent-ops"]))
        .with_cooldown(Duration::from_secs(5 * MINUTE))
        .with_tags(&["self-healing"]),
    ]
}

pub fn default_health_checks() -> Vec<HealthCheckConfig> {
    vec![
        HealthCheckConfig::new(
            MEMORY_CHECK,
            "System Memory Usage",
            HealthCategory::Resource,
            HealthThresholds::ascending(70.0, 85.0, 95.0),
        )
        .with_description("Resident memory as a percentage of the host total")
        .with_auto_heal(true),
        HealthCheckConfig::new(
            CPU_CHECK,
            "System CPU Usage",
            HealthCategory::Resource,
            HealthThresholds::ascending(70.0, 85.0, 95.0),
        )
        .with_description("CPU utilisation percentage"),
        HealthCheckConfig::new(
            PERFORMANCE_CHECK,
            "Performance Score",
            HealthCategory::Performance,
            HealthThresholds::descending(90.0, 70.0, 50.0),
        )
        .with_description("Composite score where lower is worse")
        .with_interval(Duration::from_secs(MINUTE)),
        HealthCheckConfig::new(
            TASK_QUEUE_CHECK,
            "Task Queue Depth",
            HealthCategory::Service,
            HealthThresholds::ascending(100.0, 500.0, 1000.0),
        )
        .with_description("Pending tasks waiting for an agent")
        .with_retries(1)
        .with_auto_heal(true),
    ]
}

pub fn default_healing_actions() -> Vec<SelfHealingAction> {
    vec![
        SelfHealingAction::new("memory_pressure_relief", "Memory Pressure Relief")
            .with_description("Clear caches and force collection under sustained memory pressure")
            .with_trigger(HealingTrigger::new(MEMORY_CHECK, HealthStatus::Unhealthy).consecutive(2))
            .with_step(ActionStep::new(StepKind::ClearCache, Duration::from_secs(30)).retryable())
            .with_step(ActionStep::new(StepKind::ForceGc, Duration::from_secs(30)))
            .with_cooldown(Duration::from_millis(300_000))
            .with_max_executions(3)
            .with_priority(10),
        SelfHealingAction::new("stalled_task_recovery", "Stalled Task Recovery")
            .with_description("Reassign queued work and restart the task scheduler")
            .with_trigger(
                HealingTrigger::new(TASK_QUEUE_CHECK, HealthStatus::Unhealthy).consecutive(3),
            )
            .with_step(ActionStep::new(StepKind::ReassignTasks, Duration::from_secs(60)))
            .with_step(
                ActionStep::new(StepKind::RestartService, Duration::from_secs(120))
                    .with_parameter("service", "task_scheduler"),
            )
            .with_cooldown(Duration::from_secs(10 * MINUTE))
            .with_max_executions(2)
            .with_priority(5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::RuleRegistry;
    use crate::health::ThresholdDirection;

    #[test]
    fn test_default_rules_register() {
        let registry = RuleRegistry::new();
        for rule in default_alert_rules() {
            registry.register_rule(rule).unwrap();
        }
        assert_eq!(registry.rule_count(), 6);

        let cpu = registry.get_rule(HIGH_CPU_RULE).unwrap();
        let throttle = cpu.throttle.as_ref().unwrap();
        assert_eq!(throttle.max_alerts, 1);
        assert_eq!(throttle.window, Duration::from_secs(900));
    }

    #[test]
    fn test_default_checks_are_consistent() {
        let checks = default_health_checks();
        assert!(checks.iter().all(|c| c.thresholds.is_consistent()));

        let perf = checks.iter().find(|c| c.id == PERFORMANCE_CHECK).unwrap();
        assert_eq!(perf.thresholds.direction, ThresholdDirection::DescendingBad);
        assert_eq!(perf.thresholds.classify(40.0), HealthStatus::Unhealthy);

        let memory = checks.iter().find(|c| c.id == MEMORY_CHECK).unwrap();
        assert_eq!(memory.thresholds.classify(96.0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_memory_relief_steps() {
        let actions = default_healing_actions();
        let relief = &actions[0];
        let kinds: Vec<&StepKind> = relief.steps.iter().map(|s| &s.kind).collect();
        assert_eq!(kinds, vec![&StepKind::ClearCache, &StepKind::ForceGc]);
        assert_eq!(relief.cooldown, Duration::from_millis(300_000));
        assert_eq!(relief.triggers[0].consecutive_failures, Some(2));
    }
}
