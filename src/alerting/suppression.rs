//! Time-limited suppression of alerts by title pattern.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::to_chrono;
use crate::error::VigilResult;

#[derive(Debug, Clone)]
pub struct SuppressionRule {
    pub id: Uuid,
    pub pattern: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    regex: Regex,
}

impl SuppressionRule {
    pub fn matches(&self, title: &str) -> bool {
        self.regex.is_match(title)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct SuppressionList {
    rules: Vec<SuppressionRule>,
}

impl SuppressionList {
    pub fn add(
        &mut self,
        pattern: &str,
        duration: Duration,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> VigilResult<SuppressionRule> {
        let rule = SuppressionRule {
            id: Uuid::new_v4(),
            pattern: pattern.to_string(),
            reason,
            created_at: now,
            expires_at: now + to_chrono(duration),
            regex: Regex::new(pattern)?,
        };
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// First unexpired rule matching the title
    pub fn matching(&self, title: &str, now: DateTime<Utc>) -> Option<&SuppressionRule> {
        self.rules
            .iter()
            .find(|r| !r.is_expired(now) && r.matches(title))
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !r.is_expired(now));
        before - self.rules.len()
    }

    pub fn active(&self, now: DateTime<Utc>) -> Vec<SuppressionRule> {
        self.rules
            .iter()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
