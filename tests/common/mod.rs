//! Shared test doubles for the integration suites
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use vigil::alerting::Alert;
use vigil::healing::{ActionExecutor, ActionStep, HealingContext, StepKind};
use vigil::notify::{Delivery, NotificationDispatcher};
use vigil::VigilResult;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One delivered notification
#[derive(Debug, Clone)]
pub struct Sent {
    pub title: String,
    pub channel: String,
    pub escalation_level: u32,
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn levels(&self) -> Vec<u32> {
        self.sent.lock().iter().map(|s| s.escalation_level).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, alert: &Alert, delivery: &Delivery) -> VigilResult<()> {
        self.sent.lock().push(Sent {
            title: alert.title.clone(),
            channel: delivery.channel.clone(),
            escalation_level: delivery.escalation_level,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingExecutor {
    steps: Mutex<Vec<StepKind>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn steps(&self) -> Vec<StepKind> {
        self.steps.lock().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, step: &ActionStep, _ctx: &HealingContext) -> VigilResult<String> {
        self.steps.lock().push(step.kind.clone());
        Ok(format!("{} done", step.kind))
    }
}
