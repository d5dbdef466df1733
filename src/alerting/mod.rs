//! Rule evaluation and the alert lifecycle
pub mod alert;
pub mod condition;
pub mod gate;
pub mod manager;
pub mod registry;
pub mod rule;
pub mod suppression;

pub use alert::{Alert, AlertNote, AlertOutcome, AlertRequest, AlertStatus, NotificationAttempt};
pub use condition::{ComparisonOperator, Condition, ConditionEvaluator, LogicalOperator};
pub use gate::{GateDecision, RuleGate, ThrottleState};
pub use manager::{AlertManager, AlertStatistics};
pub use registry::RuleRegistry;
pub use rule::{
    AlertCategory, AlertRule, AlertSeverity, EscalationLevel, EscalationPolicy, RuleAction,
    ThrottleConfig,
};
pub use suppression::{SuppressionList, SuppressionRule};
