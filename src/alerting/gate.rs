//! Per-rule cooldown and throttle bookkeeping.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::clock::elapsed_between;

use super::rule::{AlertRule, ThrottleConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleState {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Open,
    CoolingDown { remaining: Duration },
    Throttled { count: u32, window: Duration },
}

#[derive(Debug, Clone, Default)]
pub struct RuleGate {
    last_triggered: Option<DateTime<Utc>>,
    throttle: Option<ThrottleState>,
}

impl RuleGate {
    pub fn last_triggered(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
    }

    pub fn throttle_state(&self) -> Option<ThrottleState> {
        self.throttle
    }

    /// Decide without changing state; cooldown is checked before throttle
    pub fn check(&self, rule: &AlertRule, now: DateTime<Utc>) -> GateDecision {
        if let Some(last) = self.last_triggered {
            let elapsed = elapsed_between(last, now);
            if elapsed < rule.cooldown {
                return GateDecision::CoolingDown {
                    remaining: rule.cooldown - elapsed,
                };
            }
        }

        if let (Some(config), Some(state)) = (&rule.throttle, &self.throttle) {
            let in_window = elapsed_between(state.window_start, now) < config.window;
            if in_window && state.count >= config.max_alerts {
                return GateDecision::Throttled {
                    count: state.count,
                    window: config.window,
                };
            }
        }

        GateDecision::Open
    }

    /// Record an admitted alert
    pub fn record(&mut self, rule: &AlertRule, now: DateTime<Utc>) {
        self.last_triggered = Some(now);

        if let Some(config) = &rule.throttle {
            self.throttle = match self.throttle {
                Some(state) if elapsed_between(state.window_start, now) < config.window => {
                    Some(ThrottleState {
                        count: state.count + 1,
                        window_start: state.window_start,
                    })
                }
                _ => Some(ThrottleState {
                    count: 1,
                    window_start: now,
                }),
            };
        }
    }

    /// Check and, when open, record in one step
    pub fn try_pass(&mut self, rule: &AlertRule, now: DateTime<Utc>) -> GateDecision {
        let decision = self.check(rule, now);
        if decision == GateDecision::Open {
            self.record(rule, now);
        }
        decision
    }

    /// Reset an elapsed throttle window. Returns true when state was cleared.
    pub fn expire(&mut self, throttle: Option<&ThrottleConfig>, now: DateTime<Utc>) -> bool {
        match (throttle, self.throttle) {
            (Some(config), Some(state)) if elapsed_between(state.window_start, now) >= config.window => {
                self.throttle = None;
                true
            }
            (None, Some(_)) => {
                self.throttle = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rule::{AlertCategory, AlertSeverity};
    use crate::clock::to_chrono;

    fn rule() -> AlertRule {
        AlertRule::new("r", "Rule", AlertCategory::Performance, AlertSeverity::Warning)
    }

    #[test]
    fn test_cooldown_blocks_until_elapsed() {
        let rule = rule().with_cooldown(Duration::from_secs(300));
        let mut gate = RuleGate::default();
        let t0 = Utc::now();

        assert_eq!(gate.try_pass(&rule, t0), GateDecision::Open);
        assert_eq!(
            gate.try_pass(&rule, t0 + to_chrono(Duration::from_secs(60))),
            GateDecision::CoolingDown {
                remaining: Duration::from_secs(240)
            }
        );
        assert_eq!(
            gate.try_pass(&rule, t0 + to_chrono(Duration::from_secs(300))),
            GateDecision::Open
        );
    }

    #[test]
    fn test_throttle_caps_alerts_per_window() {
        let rule = rule().with_throttle(Duration::from_secs(600), 2);
        let mut gate = RuleGate::default();
        let t0 = Utc::now();
        let at = |secs: u64| t0 + to_chrono(Duration::from_secs(secs));

        assert_eq!(gate.try_pass(&rule, at(0)), GateDecision::Open);
        assert_eq!(gate.try_pass(&rule, at(10)), GateDecision::Open);
        assert!(matches!(
            gate.try_pass(&rule, at(20)),
            GateDecision::Throttled { count: 2, .. }
        ));
        // Rejections do not extend the window
        assert_eq!(gate.try_pass(&rule, at(600)), GateDecision::Open);
        assert_eq!(gate.throttle_state().unwrap().count, 1);
    }

    #[test]
    fn test_expire_clears_elapsed_window() {
        let rule = rule().with_throttle(Duration::from_secs(60), 1);
        let mut gate = RuleGate::default();
        let t0 = Utc::now();
        gate.record(&rule, t0);

        assert!(!gate.expire(rule.throttle.as_ref(), t0 + to_chrono(Duration::from_secs(30))));
        assert!(gate.expire(rule.throttle.as_ref(), t0 + to_chrono(Duration::from_secs(61))));
        assert!(gate.throttle_state().is_none());
    }
}
