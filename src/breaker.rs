// src/breaker.rs
//! Per-dependency circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Open blocks
//! calls until `recovery_secs` have passed, then lets one trial call through
//! (HalfOpen). A successful trial closes the breaker; a failed one re-opens it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_secs() -> u64 {
    60
}

/// Upper bound accepted from configuration (one day).
pub const MAX_RECOVERY_SECS: u64 = 86_400;

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_secs: default_recovery_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// May a call go through at `now`? Moves Open → HalfOpen once the
    /// recovery window has elapsed.
    pub fn allow(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                // Out-of-range windows keep the circuit open.
                let recovery = i64::try_from(self.settings.recovery_secs)
                    .ok()
                    .and_then(Duration::try_seconds);
                let ready = match (self.opened_at, recovery) {
                    (None, _) => true,
                    (Some(t), Some(recovery)) => now - t >= recovery,
                    (Some(_), None) => false,
                };
                if ready {
                    self.state = BreakerState::HalfOpen;
                    info!(target: "breaker", name = %self.name, "circuit half-open; allowing trial call");
                }
                ready
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            info!(target: "breaker", name = %self.name, "circuit closed");
        }
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let trip = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => {
                self.consecutive_failures >= self.settings.failure_threshold.max(1)
            }
            BreakerState::Open => false,
        };
        if trip {
            self.state = BreakerState::Open;
            self.opened_at = Some(now);
            warn!(
                target: "breaker",
                name = %self.name,
                failures = self.consecutive_failures,
                recovery_secs = self.settings.recovery_secs,
                "circuit opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerSettings {
                failure_threshold: 3,
                recovery_secs: 60,
            },
        )
    }

    #[test]
    fn opens_after_threshold_and_blocks() {
        let t0 = Utc::now();
        let mut b = breaker();
        b.record_failure(t0);
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow(t0));
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(t0 + Duration::seconds(30)));
    }

    #[test]
    fn half_open_trial_closes_or_reopens() {
        let t0 = Utc::now();
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let later = t0 + Duration::seconds(61);
        assert!(b.allow(later));
        assert_eq!(b.state(), BreakerState::HalfOpen);

        // failed trial re-opens with a fresh window
        b.record_failure(later);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(later + Duration::seconds(10)));

        let much_later = later + Duration::seconds(61);
        assert!(b.allow(much_later));
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn oversized_recovery_window_stays_open() {
        let t0 = Utc::now();
        let mut b = CircuitBreaker::new(
            "huge",
            BreakerSettings {
                failure_threshold: 1,
                recovery_secs: u64::MAX,
            },
        );
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(t0 + Duration::days(365)));
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn success_resets_failure_streak() {
        let t0 = Utc::now();
        let mut b = breaker();
        b.record_failure(t0);
        b.record_failure(t0);
        b.record_success();
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
