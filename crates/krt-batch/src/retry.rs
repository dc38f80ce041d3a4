//! Retry state machine for external extractor calls
//!
//! ```text
//! Attempting(n) --ok--------------------------> Succeeded
//! Attempting(n) --err, n < max----------------> BackingOff(n, delay)
//! BackingOff(n) --delay elapsed---------------> Attempting(n + 1)
//! Attempting(n) --err, n == max, fallback-----> FallingBack
//! Attempting(n) --err, n == max, no fallback--> Failed
//! ```
//!
//! The machine holds no timers. The orchestrator sleeps for the delay the
//! machine hands out, which keeps the budget and fallback decision
//! testable without a runtime.

use std::time::Duration;

use krt_core::{BatchConfig, ExtractionError};

/// Attempt budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub fallback: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            fallback: config.fallback_to_patterns,
        }
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Delay after the given failed attempt (1-based), capped at `max_backoff`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Where a retried call currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    Attempting {
        attempt: u32,
    },
    BackingOff {
        attempt: u32,
        delay: Duration,
        last_error: ExtractionError,
    },
    Succeeded {
        attempts: u32,
    },
    /// Budget exhausted, pattern fallback requested
    FallingBack {
        attempts: u32,
        last_error: ExtractionError,
    },
    /// Budget exhausted, no fallback
    Failed {
        attempts: u32,
        last_error: ExtractionError,
    },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::FallingBack { .. } | Self::Failed { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The current attempt succeeded
    pub fn record_success(&mut self) -> &RetryState {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = RetryState::Succeeded { attempts: attempt };
        }
        &self.state
    }

    /// The current attempt failed
    pub fn record_failure(&mut self, error: ExtractionError) -> &RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return &self.state;
        };

        self.state = if attempt < self.policy.max_attempts {
            RetryState::BackingOff {
                attempt,
                delay: self.policy.delay_after(attempt),
                last_error: error,
            }
        } else if self.policy.fallback {
            RetryState::FallingBack {
                attempts: attempt,
                last_error: error,
            }
        } else {
            RetryState::Failed {
                attempts: attempt,
                last_error: error,
            }
        };
        &self.state
    }

    /// The backoff delay has elapsed
    pub fn backoff_elapsed(&mut self) -> &RetryState {
        if let RetryState::BackingOff { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, fallback: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3_000),
            multiplier: 2.0,
            fallback,
        }
    }

    #[test]
    fn test_backoff_curve_is_capped() {
        let p = policy(10, false);
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1_000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2_000));
        assert_eq!(p.delay_after(4), Duration::from_millis(3_000));
        assert_eq!(p.delay_after(40), Duration::from_millis(3_000));
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut machine = RetryMachine::new(policy(3, false));
        assert_eq!(
            machine.record_success(),
            &RetryState::Succeeded { attempts: 1 }
        );
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_retry_then_succeed() {
        let mut machine = RetryMachine::new(policy(3, false));
        let state = machine.record_failure(ExtractionError::timeout("slow"));
        assert!(matches!(
            state,
            RetryState::BackingOff { attempt: 1, delay, .. } if *delay == Duration::from_millis(500)
        ));

        assert_eq!(
            machine.backoff_elapsed(),
            &RetryState::Attempting { attempt: 2 }
        );
        assert_eq!(
            machine.record_success(),
            &RetryState::Succeeded { attempts: 2 }
        );
    }

    #[test]
    fn test_exhaustion_fails_with_last_error() {
        let mut machine = RetryMachine::new(policy(2, false));
        machine.record_failure(ExtractionError::timeout("first"));
        machine.backoff_elapsed();
        let state = machine.record_failure(ExtractionError::provider("second"));

        match state {
            RetryState::Failed {
                attempts,
                last_error,
            } => {
                assert_eq!(*attempts, 2);
                assert_eq!(last_error.message, "second");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_exhaustion_falls_back_when_enabled() {
        let mut machine = RetryMachine::new(policy(1, true));
        let state = machine.record_failure(ExtractionError::malformed("prose"));
        assert!(matches!(state, RetryState::FallingBack { attempts: 1, .. }));
    }

    #[test]
    fn test_terminal_states_ignore_events() {
        let mut machine = RetryMachine::new(policy(1, false));
        machine.record_failure(ExtractionError::rate_limited("429"));
        let before = machine.state().clone();

        machine.record_success();
        machine.backoff_elapsed();
        machine.record_failure(ExtractionError::timeout("late"));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_policy_from_config_clamps() {
        let config = BatchConfig {
            max_attempts: 0,
            backoff_multiplier: 0.5,
            fallback_to_patterns: true,
            ..Default::default()
        };
        let p = RetryPolicy::from_config(&config);
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.multiplier, 1.0);
        assert!(p.fallback);
    }
}
