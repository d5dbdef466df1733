//! Event fan-out to registered listeners.
//!
//! Listeners are called synchronously in registration order. A panicking
//! listener is logged and skipped; the remaining listeners still run.

use log::{error, warn};
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::alerting::Alert;
use crate::analysis::{AnomalyVerdict, TrendReport};
use crate::healing::{SelfHealingExecutionResult, SkipReason};
use crate::health::HealthCheckResult;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    AlertCreated(Alert),
    AlertRejected {
        rule_id: String,
        reason: String,
    },
    AlertEscalated {
        alert: Alert,
        level: u32,
    },
    AlertAcknowledged(Alert),
    AlertResolved(Alert),
    AnomalyDetected(AnomalyVerdict),
    TrendDetected(TrendReport),
    HealthChecked(HealthCheckResult),
    HealingExecuted(SelfHealingExecutionResult),
    HealingSkipped {
        action_id: String,
        reason: SkipReason,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::AlertCreated(_) => "alert_created",
            MonitorEvent::AlertRejected { .. } => "alert_rejected",
            MonitorEvent::AlertEscalated { .. } => "alert_escalated",
            MonitorEvent::AlertAcknowledged(_) => "alert_acknowledged",
            MonitorEvent::AlertResolved(_) => "alert_resolved",
            MonitorEvent::AnomalyDetected(_) => "anomaly_detected",
            MonitorEvent::TrendDetected(_) => "trend_detected",
            MonitorEvent::HealthChecked(_) => "health_checked",
            MonitorEvent::HealingExecuted(_) => "healing_executed",
            MonitorEvent::HealingSkipped { .. } => "healing_skipped",
        }
    }
}

pub trait MonitorObserver: Send + Sync {
    fn on_event(&self, event: &MonitorEvent);
}

impl<F> MonitorObserver for F
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: &MonitorEvent) {
        self(event)
    }
}

/// Forwards events into a bounded channel, dropping them when it is full
pub struct ChannelObserver {
    sender: mpsc::Sender<MonitorEvent>,
}

impl MonitorObserver for ChannelObserver {
    fn on_event(&self, event: &MonitorEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            warn!("Dropping {} event for channel observer: {}", event.kind(), e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, Arc<dyn MonitorObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn MonitorObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn subscribe_fn<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Subscribe a bounded channel and return its receiving end
    pub fn subscribe_channel(&self, capacity: usize) -> (ObserverId, mpsc::Receiver<MonitorEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = self.subscribe(Arc::new(ChannelObserver { sender }));
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn notify(&self, event: &MonitorEvent) {
        // Snapshot so a listener may subscribe or unsubscribe while being called
        let observers: Vec<Arc<dyn MonitorObserver>> =
            self.observers.read().iter().map(|(_, o)| o.clone()).collect();

        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer.on_event(event))).is_err() {
                error!("Observer panicked while handling {} event", event.kind());
            }
        }
    }
}
