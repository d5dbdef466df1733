/// Integration tests for the alert lifecycle through the monitor facade
mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use common::{RecordingDispatcher, init_logging};
use vigil::alerting::{
    AlertCategory, AlertOutcome, AlertRequest, AlertRule, AlertSeverity, AlertStatus,
    ComparisonOperator, Condition, EscalationLevel, RuleAction,
};
use tokio::sync::Barrier;
use vigil::clock::{Clock, ManualClock, TokioClock};
use vigil::config::MonitorConfig;
use vigil::context::EvaluationContext;
use vigil::ingest::{MetricSample, PlatformEvent};
use vigil::observer::MonitorEvent;
use vigil::{Monitor, VigilError};

fn manual_monitor(dispatcher: Arc<RecordingDispatcher>) -> (Monitor, Arc<ManualClock>) {
    init_logging();
    let clock = Arc::new(ManualClock::default());
    let monitor = Monitor::builder(MonitorConfig::default())
        .with_clock(clock.clone())
        .with_dispatcher(dispatcher)
        .with_defaults()
        .build()
        .unwrap();
    (monitor, clock)
}

fn blocked_task(clock: &ManualClock, task: &str) -> PlatformEvent {
    PlatformEvent::new("task.blocked", AlertCategory::Task, AlertSeverity::Warning, clock.now())
        .with_target(task)
}

fn latency_rule() -> AlertRule {
    AlertRule::new(
        "db_latency",
        "Database Latency",
        AlertCategory::Performance,
        AlertSeverity::Critical,
    )
    .with_condition(Condition::threshold(
        "db_latency_ms",
        ComparisonOperator::GreaterThan,
        500.0,
    ))
    .with_action(RuleAction::notify("email", &["dba"]))
    .with_escalation(vec![
        EscalationLevel {
            level: 1,
            delay: Duration::from_secs(30 * 60),
            actions: vec![RuleAction::notify("pager", &["on-call"])],
        },
        EscalationLevel {
            level: 2,
            delay: Duration::from_secs(60 * 60),
            actions: vec![RuleAction::Escalation {
                recipients: vec!["engineering-manager".to_string()],
            }],
        },
    ])
}

#[tokio::test]
async fn test_suppression_window_for_blocked_tasks() {
    let dispatcher = RecordingDispatcher::new();
    let (monitor, clock) = manual_monitor(dispatcher.clone());

    monitor
        .suppress("Task Blocked.*", Duration::from_secs(600), Some("maintenance"))
        .unwrap();

    let outcomes = monitor.on_event(blocked_task(&clock, "task-1")).await;
    assert!(matches!(outcomes[0], AlertOutcome::Suppressed { .. }));
    assert!(dispatcher.sent().is_empty());

    clock.advance(Duration::from_secs(600));
    monitor.alerts().expire_sweep();

    let outcomes = monitor.on_event(blocked_task(&clock, "task-1")).await;
    let alert = outcomes[0].alert().unwrap();
    assert_eq!(alert.title, "Task Blocked: task-1");
    assert_eq!(dispatcher.sent().len(), 1);
}

#[tokio::test]
async fn test_task_blocked_cooldown() {
    let (monitor, clock) = manual_monitor(RecordingDispatcher::new());

    assert!(monitor.on_event(blocked_task(&clock, "task-1")).await[0].is_created());

    clock.advance(Duration::from_secs(60));
    let outcomes = monitor.on_event(blocked_task(&clock, "task-2")).await;
    match &outcomes[0] {
        AlertOutcome::CoolingDown { remaining, .. } => {
            assert_eq!(*remaining, Duration::from_secs(240))
        }
        other => panic!("expected cooldown, got {:?}", other),
    }

    clock.advance(Duration::from_secs(240));
    assert!(monitor.on_event(blocked_task(&clock, "task-2")).await[0].is_created());
}

#[tokio::test]
async fn test_acknowledge_then_resolve_lands_in_history_once() {
    let (monitor, clock) = manual_monitor(RecordingDispatcher::new());
    monitor.register_rule(latency_rule()).unwrap();

    let outcomes = monitor
        .on_metric(MetricSample::new("db_latency_ms", 900.0, clock.now()))
        .await;
    let alert = outcomes[0].alert().unwrap().clone();

    let acked = monitor.acknowledge(alert.id, "alice", None).unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(monitor.alert_statistics().acknowledged, 1);

    clock.advance(Duration::from_secs(300));
    let resolved = monitor.resolve(alert.id, "alice", Some("index rebuilt")).unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    let history = monitor.alerts().history(100);
    assert_eq!(history.iter().filter(|a| a.id == alert.id).count(), 1);
    assert!(monitor.active_alerts().is_empty());
    assert!(matches!(
        monitor.resolve(alert.id, "bob", None),
        Err(VigilError::InvalidTransition(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_escalation_levels_fire_in_order() {
    init_logging();
    let dispatcher = RecordingDispatcher::new();
    let monitor = Monitor::builder(MonitorConfig::default())
        .with_clock(Arc::new(TokioClock::new()))
        .with_dispatcher(dispatcher.clone())
        .build()
        .unwrap();
    monitor.register_rule(latency_rule()).unwrap();

    let alert = monitor
        .alerts()
        .raise(AlertRequest::new("db_latency", EvaluationContext::new()))
        .await
        .unwrap()
        .into_alert()
        .unwrap();

    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    assert_eq!(dispatcher.levels(), vec![0]);

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(dispatcher.levels(), vec![0, 1]);

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(dispatcher.levels(), vec![0, 1, 2]);
    assert_eq!(
        monitor.alerts().get_alert(alert.id).unwrap().escalation_level,
        2
    );
    monitor.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_acknowledge_prevents_later_levels() {
    init_logging();
    let dispatcher = RecordingDispatcher::new();
    let monitor = Monitor::builder(MonitorConfig::default())
        .with_clock(Arc::new(TokioClock::new()))
        .with_dispatcher(dispatcher.clone())
        .build()
        .unwrap();
    monitor.register_rule(latency_rule()).unwrap();

    let alert = monitor
        .alerts()
        .raise(AlertRequest::new("db_latency", EvaluationContext::new()))
        .await
        .unwrap()
        .into_alert()
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31 * 60)).await;
    assert_eq!(dispatcher.levels(), vec![0, 1]);

    monitor.acknowledge(alert.id, "on-call", None).unwrap();
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;

    assert_eq!(dispatcher.levels(), vec![0, 1]);
    assert!(monitor.alerts().escalation_sweep().await.is_empty());
    assert_eq!(
        monitor.alerts().get_alert(alert.id).unwrap().escalation_level,
        1
    );
    monitor.shutdown();
}

#[tokio::test]
async fn test_observers_see_creation_and_rejection_in_order() {
    let (monitor, clock) = manual_monitor(RecordingDispatcher::new());
    let (_, mut events) = monitor.observers().subscribe_channel(16);

    let sample = || MetricSample::new("cpu_usage", 0.95, Utc::now());
    monitor.on_metric(sample()).await;
    clock.advance(Duration::from_secs(60));
    monitor.on_metric(sample()).await;

    match events.recv().await.unwrap() {
        MonitorEvent::AlertCreated(alert) => assert_eq!(alert.rule_id, "high_cpu_usage"),
        other => panic!("unexpected event {:?}", other.kind()),
    }
    match events.recv().await.unwrap() {
        MonitorEvent::AlertRejected { reason, .. } => assert_eq!(reason, "throttled"),
        other => panic!("unexpected event {:?}", other.kind()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_raises_pass_the_throttle_once() {
    const ATTEMPTS: usize = 16;
    let dispatcher = RecordingDispatcher::new();
    let (monitor, _clock) = manual_monitor(dispatcher.clone());
    monitor
        .register_rule(
            AlertRule::new(
                "queue_saturated",
                "Queue Saturated",
                AlertCategory::Performance,
                AlertSeverity::Warning,
            )
            .with_action(RuleAction::notify("email", &["ops"]))
            .with_throttle(Duration::from_secs(15 * 60), 1),
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(ATTEMPTS));
    let mut handles = Vec::with_capacity(ATTEMPTS);
    for _ in 0..ATTEMPTS {
        let alerts = monitor.alerts().clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            alerts
                .raise(AlertRequest::new("queue_saturated", EvaluationContext::new()))
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    let mut throttled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            AlertOutcome::Created(_) => created += 1,
            AlertOutcome::Throttled { count, .. } => {
                assert_eq!(count, 1);
                throttled += 1;
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!((created, throttled), (1, ATTEMPTS - 1));
    assert_eq!(monitor.active_alerts().len(), 1);
    assert_eq!(dispatcher.sent().len(), 1);
}
