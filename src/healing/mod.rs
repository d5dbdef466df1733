//! Automatic remediation bound to health check outcomes
pub mod action;
pub mod executor;
pub mod orchestrator;

pub use action::{
    ActionStep, ExecutionStatus, HealingOutcome, HealingTrigger, SelfHealingAction,
    SelfHealingExecutionResult, SkipReason, StepKind, StepOutcome,
};
pub use executor::{ActionExecutor, HealingContext, LogExecutor};
pub use orchestrator::{HEALING_FAILURE_RULE, HealingStatistics, SelfHealingOrchestrator};
