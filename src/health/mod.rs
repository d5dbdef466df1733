//! Health checks: definitions, classification and periodic sampling
pub mod check;
pub mod monitor;

pub use check::{
    HealthCategory, HealthCheckConfig, HealthCheckResult, HealthSample, HealthStatus,
    HealthThresholds, HealthTrend, ThresholdDirection, derive_trend,
};
pub use monitor::{FnSampler, HealthMonitor, HealthSampler, HealthSummary, sampler_fn};
