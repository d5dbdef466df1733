#![allow(clippy::needless_doctest_main)]
//! # vigil
//!
//! Vigil is the alerting, anomaly-detection and self-healing core of an agent
//! task platform. It ingests metric samples and platform events, evaluates
//! them against alert rules, runs periodic health checks and executes
//! remediation actions when checks keep failing.
//!
//! ## Features
//!
//! - Rule conditions over thresholds, windowed aggregates, regex patterns,
//!   statistical anomalies and AND/OR/NOT combinations
//! - Per-rule cooldown and throttle, title-pattern suppression
//! - Time-based multi-level escalation, cancelled on acknowledge or resolve
//! - Rolling z-score anomaly detection and least-squares trend analysis
//! - Health checks with retries, timeouts and threshold direction per check
//! - Self-healing actions gated by cooldown and an hourly execution cap
//! - Observer registry for every lifecycle event
//! - Prometheus metrics on an instance-owned registry
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use vigil::config::MonitorConfig;
//! use vigil::ingest::MetricSample;
//! use vigil::monitor::Monitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vigil::VigilError> {
//!     let monitor = Monitor::builder(MonitorConfig::load_from_env())
//!         .with_defaults()
//!         .build()?;
//!     monitor.start();
//!
//!     let outcomes = monitor
//!         .on_metric(MetricSample::new("cpu_usage", 0.92, Utc::now()))
//!         .await;
//!     for outcome in outcomes {
//!         println!("{}", outcome.reason());
//!     }
//!
//!     monitor.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ### Bench
//!
//! ```bash
//! cargo bench
//! ```

pub mod alerting;
pub mod analysis;
pub mod clock;
pub mod config;
pub mod context;
pub mod defaults;
pub mod error;
pub mod healing;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod observer;
pub mod scheduler;

pub use error::{VigilError, VigilResult};
pub use monitor::{Monitor, MonitorBuilder};

pub mod prelude {
    pub use crate::alerting::{
        Alert, AlertCategory, AlertOutcome, AlertRule, AlertSeverity, AlertStatus, Condition,
        RuleAction,
    };
    pub use crate::config::MonitorConfig;
    pub use crate::error::{VigilError, VigilResult};
    pub use crate::healing::{ActionExecutor, SelfHealingAction};
    pub use crate::health::{HealthCheckConfig, HealthSampler, HealthStatus};
    pub use crate::ingest::{MetricSample, PlatformEvent};
    pub use crate::monitor::Monitor;
    pub use crate::notify::NotificationDispatcher;
    pub use crate::observer::MonitorEvent;
}
