//! Boundary for running remediation steps.

use async_trait::async_trait;
use log::info;

use crate::error::VigilResult;
use crate::health::HealthCheckResult;

use super::action::ActionStep;

/// What a step is running on behalf of
#[derive(Debug, Clone)]
pub struct HealingContext {
    pub action_id: String,
    pub trigger_reasons: Vec<String>,
    /// Health result that triggered the run, absent for manual runs
    pub result: Option<HealthCheckResult>,
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run one step and describe what was done.
    ///
    /// The orchestrator races this future against the step timeout.
    async fn execute(&self, step: &ActionStep, ctx: &HealingContext) -> VigilResult<String>;
}

/// Executor that only logs each step
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExecutor;

#[async_trait]
impl ActionExecutor for LogExecutor {
    async fn execute(&self, step: &ActionStep, ctx: &HealingContext) -> VigilResult<String> {
        info!(
            "Executing {} for action {} ({})",
            step.kind,
            ctx.action_id,
            ctx.trigger_reasons.join("; ")
        );
        Ok(format!("{} completed", step.kind))
    }
}
