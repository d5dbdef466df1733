//! Read-mostly store of alert rules and health check definitions.
//!
//! Entries are held as `Arc` snapshots, so replacing or deleting a rule never
//! disturbs an evaluation already holding the previous version.

use log::{info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{VigilError, VigilResult};
use crate::health::HealthCheckConfig;

use super::rule::AlertRule;

#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Arc<AlertRule>>>,
    health_checks: RwLock<HashMap<String, Arc<HealthCheckConfig>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_rule(rule: &AlertRule) -> VigilResult<()> {
        if rule.id.trim().is_empty() {
            return Err(VigilError::Configuration("rule id cannot be empty".to_string()));
        }
        for condition in &rule.conditions {
            condition.validate()?;
        }
        if let Some(throttle) = &rule.throttle {
            if throttle.max_alerts == 0 {
                return Err(VigilError::Configuration(format!(
                    "rule {} throttle must allow at least one alert",
                    rule.id
                )));
            }
        }
        Ok(())
    }

    /// Insert or replace a rule, returning the previous definition
    pub fn register_rule(&self, rule: AlertRule) -> VigilResult<Option<Arc<AlertRule>>> {
        Self::validate_rule(&rule)?;
        let id = rule.id.clone();
        let previous = self.rules.write().insert(id.clone(), Arc::new(rule));
        if previous.is_some() {
            info!("Replaced alert rule {}", id);
        } else {
            info!("Registered alert rule {}", id);
        }
        Ok(previous)
    }

    /// Replace an existing rule
    pub fn update_rule(&self, rule: AlertRule) -> VigilResult<Arc<AlertRule>> {
        Self::validate_rule(&rule)?;
        let mut rules = self.rules.write();
        if !rules.contains_key(&rule.id) {
            return Err(VigilError::RuleNotFound(rule.id));
        }
        let rule = Arc::new(rule);
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    pub fn delete_rule(&self, id: &str) -> VigilResult<Arc<AlertRule>> {
        let removed = self
            .rules
            .write()
            .remove(id)
            .ok_or_else(|| VigilError::RuleNotFound(id.to_string()))?;
        info!("Deleted alert rule {}", id);
        Ok(removed)
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> VigilResult<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| VigilError::RuleNotFound(id.to_string()))?;
        Arc::make_mut(rule).enabled = enabled;
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Option<Arc<AlertRule>> {
        self.rules.read().get(id).cloned()
    }

    /// Point-in-time copy of every rule, ordered by id
    pub fn rules(&self) -> Vec<Arc<AlertRule>> {
        let mut rules: Vec<Arc<AlertRule>> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Insert or replace a health check definition
    pub fn register_health_check(&self, check: HealthCheckConfig) -> VigilResult<()> {
        if check.id.trim().is_empty() {
            return Err(VigilError::Configuration(
                "health check id cannot be empty".to_string(),
            ));
        }
        if !check.thresholds.is_consistent() {
            warn!(
                "Health check {} thresholds ({}/{}/{}) disagree with direction {:?}",
                check.id,
                check.thresholds.healthy,
                check.thresholds.warning,
                check.thresholds.critical,
                check.thresholds.direction
            );
        }
        self.health_checks
            .write()
            .insert(check.id.clone(), Arc::new(check));
        Ok(())
    }

    pub fn remove_health_check(&self, id: &str) -> VigilResult<Arc<HealthCheckConfig>> {
        self.health_checks
            .write()
            .remove(id)
            .ok_or_else(|| VigilError::HealthCheckNotFound(id.to_string()))
    }

    pub fn get_health_check(&self, id: &str) -> Option<Arc<HealthCheckConfig>> {
        self.health_checks.read().get(id).cloned()
    }

    pub fn health_checks(&self) -> Vec<Arc<HealthCheckConfig>> {
        let mut checks: Vec<Arc<HealthCheckConfig>> =
            self.health_checks.read().values().cloned().collect();
        checks.sort_by(|a, b| a.id.cmp(&b.id));
        checks
    }
}
