//! Rule conditions and their evaluation against an [`EvaluationContext`].
//!
//! Evaluation never fails outward: a missing field, a non-numeric value or a
//! malformed pattern makes the condition not match and is logged.

use log::{debug, warn};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{Aggregation, AnomalyDetector, MetricStore};
use crate::clock::Clock;
use crate::context::EvaluationContext;
use crate::error::{VigilError, VigilResult};

use super::rule::AlertRule;

/// Comparison operators for threshold conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "gt", alias = ">")]
    GreaterThan,
    #[serde(rename = "gte", alias = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "lt", alias = "<")]
    LessThan,
    #[serde(rename = "lte", alias = "<=")]
    LessThanOrEqual,
    #[serde(rename = "eq", alias = "==")]
    Equal,
    #[serde(rename = "ne", alias = "!=")]
    NotEqual,
}

impl ComparisonOperator {
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::GreaterThanOrEqual => value >= threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::LessThanOrEqual => value <= threshold,
            ComparisonOperator::Equal => (value - threshold).abs() < f64::EPSILON,
            ComparisonOperator::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "gt" => Ok(Self::GreaterThan),
            ">=" | "gte" => Ok(Self::GreaterThanOrEqual),
            "<" | "lt" => Ok(Self::LessThan),
            "<=" | "lte" => Ok(Self::LessThanOrEqual),
            "==" | "eq" => Ok(Self::Equal),
            "!=" | "ne" => Ok(Self::NotEqual),
            _ => Err(format!("unknown operator: {s}")),
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    /// Negates the first child; further children are ignored
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare a numeric context value (or its windowed aggregate) to a threshold
    Threshold {
        metric: String,
        operator: ComparisonOperator,
        threshold: f64,
        #[serde(default)]
        aggregation: Option<Aggregation>,
        #[serde(default)]
        window: Option<Duration>,
    },
    /// Case-insensitive regular expression over the stringified field
    Pattern { field: String, pattern: String },
    /// Value is anomalous against the metric's rolling statistics
    Anomaly {
        metric: String,
        #[serde(default)]
        threshold: Option<f64>,
    },
    Combination {
        operator: LogicalOperator,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn threshold(metric: impl Into<String>, operator: ComparisonOperator, threshold: f64) -> Self {
        Condition::Threshold {
            metric: metric.into(),
            operator,
            threshold,
            aggregation: None,
            window: None,
        }
    }

    pub fn windowed(
        metric: impl Into<String>,
        operator: ComparisonOperator,
        threshold: f64,
        aggregation: Aggregation,
        window: Duration,
    ) -> Self {
        Condition::Threshold {
            metric: metric.into(),
            operator,
            threshold,
            aggregation: Some(aggregation),
            window: Some(window),
        }
    }

    pub fn pattern(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Pattern {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn anomaly(metric: impl Into<String>) -> Self {
        Condition::Anomaly {
            metric: metric.into(),
            threshold: None,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::Combination {
            operator: LogicalOperator::And,
            conditions,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Combination {
            operator: LogicalOperator::Or,
            conditions,
        }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Combination {
            operator: LogicalOperator::Not,
            conditions: vec![condition],
        }
    }

    /// Compile every pattern in the tree, reporting the first malformed one
    pub fn validate(&self) -> VigilResult<()> {
        match self {
            Condition::Pattern { pattern, .. } => {
                compile_pattern(pattern)?;
                Ok(())
            }
            Condition::Combination { conditions, .. } => {
                conditions.iter().try_for_each(Condition::validate)
            }
            Condition::Threshold { .. } | Condition::Anomaly { .. } => Ok(()),
        }
    }
}

fn compile_pattern(pattern: &str) -> VigilResult<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Stateless evaluator over shared analysis state
pub struct ConditionEvaluator {
    anomaly: Arc<AnomalyDetector>,
    store: Arc<MetricStore>,
    clock: Arc<dyn Clock>,
    patterns: Mutex<HashMap<String, Regex>>,
}

impl ConditionEvaluator {
    pub fn new(anomaly: Arc<AnomalyDetector>, store: Arc<MetricStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            anomaly,
            store,
            clock,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// True when every condition of an enabled rule matches.
    /// A rule without conditions never matches.
    pub fn matches_rule(&self, rule: &AlertRule, ctx: &EvaluationContext) -> bool {
        rule.enabled
            && !rule.conditions.is_empty()
            && rule.conditions.iter().all(|c| self.evaluate(c, ctx))
    }

    pub fn evaluate(&self, condition: &Condition, ctx: &EvaluationContext) -> bool {
        match self.try_evaluate(condition, ctx) {
            Ok(matched) => matched,
            Err(VigilError::Evaluation(msg)) => {
                debug!("Condition not evaluable: {}", msg);
                false
            }
            Err(e) => {
                warn!("Condition evaluation failed: {}", e);
                false
            }
        }
    }

    fn try_evaluate(&self, condition: &Condition, ctx: &EvaluationContext) -> VigilResult<bool> {
        match condition {
            Condition::Threshold {
                metric,
                operator,
                threshold,
                aggregation,
                window,
            } => {
                let value = self.threshold_value(metric, *aggregation, *window, ctx)?;
                Ok(operator.compare(value, *threshold))
            }
            Condition::Pattern { field, pattern } => {
                let text = match ctx.resolve(field) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => {
                        return Err(VigilError::Evaluation(format!("field {field} is missing")));
                    }
                    Some(other) => {
                        return Err(VigilError::Evaluation(format!(
                            "field {field} is not a string: {other}"
                        )));
                    }
                };
                let regex = self.regex(pattern)?;
                Ok(regex.is_match(&text))
            }
            Condition::Anomaly { metric, threshold } => {
                let value = ctx
                    .number(metric)
                    .ok_or_else(|| VigilError::Evaluation(format!("metric {metric} is missing")))?;
                Ok(self.anomaly.evaluate(metric, value, *threshold))
            }
            Condition::Combination {
                operator,
                conditions,
            } => {
                if conditions.is_empty() {
                    return Ok(false);
                }
                let results: Vec<bool> = conditions.iter().map(|c| self.evaluate(c, ctx)).collect();
                Ok(match operator {
                    LogicalOperator::And => results.iter().all(|r| *r),
                    LogicalOperator::Or => results.iter().any(|r| *r),
                    LogicalOperator::Not => !results[0],
                })
            }
        }
    }

    fn threshold_value(
        &self,
        metric: &str,
        aggregation: Option<Aggregation>,
        window: Option<Duration>,
        ctx: &EvaluationContext,
    ) -> VigilResult<f64> {
        let raw = ctx
            .resolve(metric)
            .ok_or_else(|| VigilError::Evaluation(format!("metric {metric} is missing")))?;

        match (aggregation, window) {
            (Some(aggregation), Some(window)) => self
                .store
                .aggregate(metric, aggregation, window, self.clock.now())
                .ok_or_else(|| VigilError::Evaluation(format!("no samples for {metric} in window"))),
            (Some(aggregation), None) => {
                let values: Vec<f64> = match raw {
                    serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_f64()).collect(),
                    other => other.as_f64().into_iter().collect(),
                };
                aggregation
                    .apply(&values)
                    .ok_or_else(|| VigilError::Evaluation(format!("no values for {metric}")))
            }
            _ => raw
                .as_f64()
                .ok_or_else(|| VigilError::Evaluation(format!("metric {metric} is not numeric"))),
        }
    }

    fn regex(&self, pattern: &str) -> VigilResult<Regex> {
        let mut cache = self.patterns.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = compile_pattern(pattern)?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}
