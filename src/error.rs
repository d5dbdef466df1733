use thiserror::Error;

/// Errors surfaced by the monitoring core
#[derive(Error, Debug, Clone)]
pub enum VigilError {
    #[error("Alert rule not found: {0}")]
    RuleNotFound(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("Invalid alert transition: {0}")]
    InvalidTransition(String),

    #[error("Health check not found: {0}")]
    HealthCheckNotFound(String),

    #[error("Self-healing action not found: {0}")]
    ActionNotFound(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Action step failed: {0}")]
    ActionFailed(String),

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type VigilResult<T> = Result<T, VigilError>;

impl From<std::io::Error> for VigilError {
    fn from(error: std::io::Error) -> Self {
        VigilError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(error: serde_json::Error) -> Self {
        VigilError::Json(error.to_string())
    }
}

impl From<regex::Error> for VigilError {
    fn from(error: regex::Error) -> Self {
        VigilError::InvalidPattern(error.to_string())
    }
}

impl From<prometheus::Error> for VigilError {
    fn from(error: prometheus::Error) -> Self {
        VigilError::Metrics(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for VigilError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        VigilError::Timeout(error.to_string())
    }
}

impl VigilError {
    /// Check if a retry of the failed operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            VigilError::Timeout(_) => true,
            VigilError::Sampling(_) => true,
            VigilError::Dispatch(_) => true,
            VigilError::Io(_) => true,
            VigilError::ActionFailed(_) => false,
            VigilError::RuleNotFound(_)
            | VigilError::AlertNotFound(_)
            | VigilError::InvalidTransition(_)
            | VigilError::HealthCheckNotFound(_)
            | VigilError::ActionNotFound(_)
            | VigilError::InvalidPattern(_)
            | VigilError::Evaluation(_)
            | VigilError::Configuration(_)
            | VigilError::Metrics(_)
            | VigilError::Json(_) => false,
        }
    }

    /// Get the error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            VigilError::RuleNotFound(_) => "not_found",
            VigilError::AlertNotFound(_) => "not_found",
            VigilError::HealthCheckNotFound(_) => "not_found",
            VigilError::ActionNotFound(_) => "not_found",
            VigilError::InvalidTransition(_) => "lifecycle",
            VigilError::InvalidPattern(_) => "validation",
            VigilError::Evaluation(_) => "evaluation",
            VigilError::Sampling(_) => "sampling",
            VigilError::ActionFailed(_) => "remediation",
            VigilError::Dispatch(_) => "notification",
            VigilError::Timeout(_) => "timeout",
            VigilError::Configuration(_) => "configuration",
            VigilError::Metrics(_) => "metrics",
            VigilError::Json(_) => "serialization",
            VigilError::Io(_) => "io",
        }
    }
}
