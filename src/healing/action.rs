//! Self-healing action definitions and execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::health::{HealthCheckResult, HealthStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ClearCache,
    ForceGc,
    RestartService,
    ReassignTasks,
    ScaleResources,
    Custom(String),
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::ClearCache => write!(f, "clear_cache"),
            StepKind::ForceGc => write!(f, "force_gc"),
            StepKind::RestartService => write!(f, "restart_service"),
            StepKind::ReassignTasks => write!(f, "reassign_tasks"),
            StepKind::ScaleResources => write!(f, "scale_resources"),
            StepKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub kind: StepKind,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub timeout: Duration,
    /// A failing retryable step is recorded and the run continues
    #[serde(default)]
    pub retryable: bool,
}

impl ActionStep {
    pub fn new(kind: StepKind, timeout: Duration) -> Self {
        Self {
            kind,
            parameters: HashMap::new(),
            timeout,
            retryable: false,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Binds an action to a health check outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingTrigger {
    pub health_check_id: String,
    pub status: HealthStatus,
    /// Require this many consecutive matching results, the current one included
    #[serde(default)]
    pub consecutive_failures: Option<u32>,
}

impl HealingTrigger {
    pub fn new(health_check_id: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            health_check_id: health_check_id.into(),
            status,
            consecutive_failures: None,
        }
    }

    pub fn consecutive(mut self, count: u32) -> Self {
        self.consecutive_failures = Some(count);
        self
    }

    /// `recent` is the check's history, oldest first, ending with `result`
    pub fn fires(&self, result: &HealthCheckResult, recent: &[HealthCheckResult]) -> bool {
        if result.check_id != self.health_check_id || result.status != self.status {
            return false;
        }
        match self.consecutive_failures {
            None | Some(0) | Some(1) => true,
            Some(n) => {
                let n = n as usize;
                recent.len() >= n
                    && recent[recent.len() - n..]
                        .iter()
                        .all(|r| r.status == self.status)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfHealingAction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub triggers: Vec<HealingTrigger>,
    pub steps: Vec<ActionStep>,
    pub cooldown: Duration,
    /// Completed executions allowed inside the rolling rate window
    pub max_executions: u32,
    /// Higher runs first when several actions match one result
    #[serde(default)]
    pub priority: u32,
}

fn default_enabled() -> bool {
    true
}

impl SelfHealingAction {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            triggers: Vec::new(),
            steps: Vec::new(),
            cooldown: Duration::ZERO,
            max_executions: u32::MAX,
            priority: 0,
        }
    }

    pub fn with_trigger(mut self, trigger: HealingTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_step(mut self, step: ActionStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_max_executions(mut self, max_executions: u32) -> Self {
        self.max_executions = max_executions;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub kind: StepKind,
    pub success: bool,
    pub timed_out: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfHealingExecutionResult {
    pub id: Uuid,
    pub action_id: String,
    pub action_name: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepOutcome>,
    pub trigger_reasons: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    AlreadyRunning,
    CoolingDown { remaining: Duration },
    RateLimited { executions: u32, max: u32 },
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::AlreadyRunning => "already_running",
            SkipReason::CoolingDown { .. } => "cooldown",
            SkipReason::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug, Clone)]
pub enum HealingOutcome {
    Executed(SelfHealingExecutionResult),
    Skipped { action_id: String, reason: SkipReason },
}

impl HealingOutcome {
    pub fn execution(&self) -> Option<&SelfHealingExecutionResult> {
        match self {
            HealingOutcome::Executed(result) => Some(result),
            HealingOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, HealingOutcome::Executed(_))
    }

    pub fn action_id(&self) -> &str {
        match self {
            HealingOutcome::Executed(result) => &result.action_id,
            HealingOutcome::Skipped { action_id, .. } => action_id,
        }
    }
}
