/// Integration tests for health checks, anomaly detection and self-healing
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingExecutor, init_logging};
use vigil::analysis::{AnomalyConfig, AnomalyDetector};
use vigil::clock::{Clock, ManualClock};
use vigil::config::{HealingConfig, MonitorConfig};
use vigil::defaults::{MEMORY_CHECK, default_health_checks};
use vigil::healing::{
    ActionStep, HealingOutcome, SelfHealingAction, SelfHealingOrchestrator, SkipReason, StepKind,
};
use vigil::health::{HealthCheckConfig, HealthSample, HealthStatus, sampler_fn};
use vigil::ingest::MetricSample;
use vigil::{Monitor, VigilError};

fn memory_check() -> HealthCheckConfig {
    default_health_checks()
        .into_iter()
        .find(|c| c.id == MEMORY_CHECK)
        .unwrap()
}

#[tokio::test]
async fn test_sustained_memory_pressure_runs_relief_once() {
    init_logging();
    let executor = RecordingExecutor::new();
    let clock = Arc::new(ManualClock::default());
    let monitor = Monitor::builder(MonitorConfig::default())
        .with_clock(clock.clone())
        .with_executor(executor.clone())
        .with_defaults()
        .build()
        .unwrap();
    monitor
        .register_check(
            memory_check(),
            sampler_fn(|| async { Ok(HealthSample::new(96.0, "resident memory")) }),
        )
        .unwrap();

    let first = monitor.run_check(MEMORY_CHECK).await.unwrap();
    assert_eq!(first.status, HealthStatus::Unhealthy);
    assert!(executor.steps().is_empty());

    clock.advance(Duration::from_secs(30));
    monitor.run_check(MEMORY_CHECK).await.unwrap();
    assert_eq!(executor.steps(), vec![StepKind::ClearCache, StepKind::ForceGc]);
    assert_eq!(
        monitor.healing().last_executed("memory_pressure_relief"),
        Some(clock.now())
    );

    clock.advance(Duration::from_secs(30));
    monitor.run_check(MEMORY_CHECK).await.unwrap();
    assert_eq!(executor.steps().len(), 2);
    assert_eq!(monitor.healing().statistics().total, 1);
    assert_eq!(monitor.health_summary().overall, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_sampler_error_reports_unknown() {
    let monitor = Monitor::builder(MonitorConfig::default()).build().unwrap();
    monitor
        .register_check(
            memory_check(),
            sampler_fn(|| async { Err(VigilError::Sampling("procfs unavailable".to_string())) }),
        )
        .unwrap();

    let result = monitor.run_check(MEMORY_CHECK).await.unwrap();
    assert_eq!(result.status, HealthStatus::Unknown);
    assert!(result.value.is_none());
    assert!(result.message.contains("procfs unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_sampler_reports_timeout_after_retries() {
    let monitor = Monitor::builder(MonitorConfig::default()).build().unwrap();
    let check = memory_check()
        .with_timeout(Duration::from_millis(100))
        .with_retries(2);
    monitor
        .register_check(
            check,
            sampler_fn(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(HealthSample::new(10.0, "late"))
            }),
        )
        .unwrap();

    let result = monitor.run_check(MEMORY_CHECK).await.unwrap();
    assert_eq!(result.status, HealthStatus::Timeout);
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn test_rate_cap_allows_three_of_five() {
    let executor = RecordingExecutor::new();
    let clock = Arc::new(ManualClock::default());
    let orchestrator = SelfHealingOrchestrator::new(
        HealingConfig::default(),
        executor.clone(),
        clock.clone(),
    );
    orchestrator
        .register_action(
            SelfHealingAction::new("restart_worker", "Restart Worker")
                .with_step(ActionStep::new(StepKind::RestartService, Duration::from_secs(10)))
                .with_max_executions(3),
        )
        .unwrap();

    let mut executed = 0;
    let mut limited = 0;
    for _ in 0..5 {
        match orchestrator.trigger_manual("restart_worker", "operator request").await.unwrap() {
            HealingOutcome::Executed(_) => executed += 1,
            HealingOutcome::Skipped {
                reason: SkipReason::RateLimited { executions, max },
                ..
            } => {
                assert_eq!((executions, max), (3, 3));
                limited += 1;
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        clock.advance(Duration::from_secs(60));
    }
    assert_eq!((executed, limited), (3, 2));

    clock.advance(Duration::from_secs(3600));
    orchestrator.prune_rate_windows();
    assert!(
        orchestrator
            .trigger_manual("restart_worker", "operator request")
            .await
            .unwrap()
            .is_executed()
    );
}

#[test]
fn test_anomaly_cold_start() {
    let detector = AnomalyDetector::new(AnomalyConfig::default());
    for value in [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1000.0] {
        assert!(!detector.detect_anomaly("agent_error_rate", value));
    }
    for _ in 0..20 {
        detector.detect_anomaly("latency", 10.0);
    }
    assert!(detector.detect_anomaly("latency", 100.0));
}

#[tokio::test]
async fn test_agent_error_spike_raises_anomaly_alert() {
    let clock = Arc::new(ManualClock::default());
    let monitor = Monitor::builder(MonitorConfig::default())
        .with_clock(clock.clone())
        .with_defaults()
        .build()
        .unwrap();

    for _ in 0..9 {
        let outcomes = monitor
            .on_metric(MetricSample::new("agent_error_rate", 0.01, clock.now()))
            .await;
        assert!(outcomes.is_empty());
        clock.advance(Duration::from_secs(10));
    }

    let outcomes = monitor
        .on_metric(MetricSample::new("agent_error_rate", 0.5, clock.now()))
        .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].alert().unwrap().rule_id, "agent_error_anomaly");
}
