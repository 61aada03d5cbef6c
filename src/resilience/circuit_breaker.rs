//! Per-tier circuit breaker.
//!
//! `Closed` counts consecutive failures; reaching the threshold opens the
//! circuit until the cool-down elapses, after which one trial call is let
//! through in `HalfOpen` while every other caller is still turned away. A
//! successful trial closes the circuit, a failed one reopens it. A trial
//! that never reports back (its caller was dropped) goes stale after another
//! cool-down and a new trial is granted.

use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_since: Instant },
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a call may go through now. Moves an expired `Open` to
    /// `HalfOpen` and hands the trial to this caller.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if now >= until => {
                self.state = BreakerState::HalfOpen { trial_since: now };
                true
            }
            BreakerState::HalfOpen { trial_since } if now >= trial_since + self.cooldown => {
                self.state = BreakerState::HalfOpen { trial_since: now };
                true
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen { .. } => false,
        }
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Returns `true` when this failure opened the circuit.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    self.state = BreakerState::Open {
                        until: now + self.cooldown,
                    };
                    true
                } else {
                    self.state = BreakerState::Closed { failures };
                    false
                }
            }
            BreakerState::HalfOpen { .. } => {
                self.state = BreakerState::Open {
                    until: now + self.cooldown,
                };
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    pub fn reset(&mut self) {
        self.record_success();
    }

    pub fn report(&self, now: Instant) -> BreakerReport {
        match self.state {
            BreakerState::Closed { failures } => BreakerReport {
                state: "closed",
                consecutive_failures: failures,
                retry_in_secs: None,
            },
            BreakerState::Open { until } => BreakerReport {
                state: "open",
                consecutive_failures: self.threshold,
                retry_in_secs: Some(until.saturating_duration_since(now).as_secs()),
            },
            BreakerState::HalfOpen { .. } => BreakerReport {
                state: "half_open",
                consecutive_failures: self.threshold,
                retry_in_secs: None,
            },
        }
    }
}

/// Serializable breaker view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerReport {
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub retry_in_secs: Option<u64>,
}
