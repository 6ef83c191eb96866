//! Retry policy and the retry state machine.
//!
//! The executor drives a [`RetryState`] with [`RetryEvent`]s; every
//! transition lives in [`RetryState::on`] so the retry contract can be
//! checked without any I/O or timers.

use std::time::Duration;

use promext_core::ExtensionConfig;

/// First backoff delay.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Upper bound for any single backoff delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Delay sequence between attempts. All variants are non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// base, 2·base, 3·base, 5·base, 8·base, ... capped at `max`.
    Fibonacci { base: Duration, max: Duration },
    /// base, 2·base, 4·base, ... capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// Same delay every time.
    Fixed(Duration),
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fibonacci {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match *self {
            Backoff::Fibonacci { base, max } => {
                if base.is_zero() {
                    return Duration::ZERO;
                }
                let (mut prev, mut curr) = (1u32, 1u32);
                for _ in 1..retry {
                    if base.saturating_mul(curr) >= max {
                        return max;
                    }
                    let next = prev.saturating_add(curr);
                    prev = curr;
                    curr = next;
                }
                base.saturating_mul(curr).min(max)
            }
            Backoff::Exponential { base, max } => {
                let shift = (retry - 1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
            Backoff::Fixed(delay) => delay,
        }
    }
}

/// How many times a failed query is retried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt. 0 means fail on first error.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self::new(config.query_retries)
    }

    /// Attempts made before giving up, first attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum RetryEvent<T, E> {
    AttemptSucceeded(T),
    AttemptFailed(E),
    BackoffElapsed,
    CancelRequested,
}

/// Where a retried operation currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState<T, E> {
    /// Attempt number `attempt` (1-based) is in flight.
    Attempting { attempt: u32 },
    /// Waiting `delay` before attempt `next_attempt`.
    Backoff {
        next_attempt: u32,
        delay: Duration,
        last_error: E,
    },
    Succeeded { attempts: u32, value: T },
    ExhaustedFailed { attempts: u32, last_error: E },
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<T, E> RetryState<T, E> {
    /// Initial state: first attempt in flight.
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Apply `event`. Terminal states absorb every event, and events that
    /// do not apply to the current state leave it unchanged.
    pub fn on(self, event: RetryEvent<T, E>, policy: &RetryPolicy) -> Self {
        match (self, event) {
            (RetryState::Attempting { attempt }, RetryEvent::AttemptSucceeded(value)) => {
                RetryState::Succeeded {
                    attempts: attempt,
                    value,
                }
            }
            (RetryState::Attempting { attempt }, RetryEvent::AttemptFailed(last_error)) => {
                if attempt <= policy.max_retries {
                    RetryState::Backoff {
                        next_attempt: attempt + 1,
                        delay: policy.backoff.delay(attempt),
                        last_error,
                    }
                } else {
                    RetryState::ExhaustedFailed {
                        attempts: attempt,
                        last_error,
                    }
                }
            }
            (RetryState::Attempting { attempt }, RetryEvent::CancelRequested) => {
                RetryState::Cancelled {
                    attempts: attempt,
                    last_error: None,
                }
            }
            (RetryState::Backoff { next_attempt, .. }, RetryEvent::BackoffElapsed) => {
                RetryState::Attempting {
                    attempt: next_attempt,
                }
            }
            (
                RetryState::Backoff {
                    next_attempt,
                    last_error,
                    ..
                },
                RetryEvent::CancelRequested,
            ) => RetryState::Cancelled {
                attempts: next_attempt - 1,
                last_error: Some(last_error),
            },
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. }
                | RetryState::ExhaustedFailed { .. }
                | RetryState::Cancelled { .. }
        )
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryState::Attempting { attempt } => *attempt,
            RetryState::Backoff { next_attempt, .. } => next_attempt - 1,
            RetryState::Succeeded { attempts, .. }
            | RetryState::ExhaustedFailed { attempts, .. }
            | RetryState::Cancelled { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type State = RetryState<&'static str, &'static str>;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fibonacci_sequence() {
        let backoff = Backoff::default();
        let delays: Vec<Duration> = (1..=6).map(|n| backoff.delay(n)).collect();
        assert_eq!(delays, vec![ms(50), ms(100), ms(150), ms(250), ms(400), ms(650)]);
    }

    #[test]
    fn fibonacci_caps_at_max() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(20), DEFAULT_BACKOFF_MAX);
        assert_eq!(backoff.delay(u32::MAX), DEFAULT_BACKOFF_MAX);
    }

    #[test]
    fn exponential_sequence() {
        let backoff = Backoff::Exponential {
            base: ms(50),
            max: ms(1000),
        };
        let delays: Vec<Duration> = (1..=6).map(|n| backoff.delay(n)).collect();
        assert_eq!(delays, vec![ms(50), ms(100), ms(200), ms(400), ms(800), ms(1000)]);
        assert_eq!(backoff.delay(100), ms(1000));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        for backoff in [
            Backoff::default(),
            Backoff::Exponential {
                base: ms(10),
                max: ms(5000),
            },
            Backoff::Fixed(ms(25)),
        ] {
            let mut prev = Duration::ZERO;
            for retry in 1..64 {
                let delay = backoff.delay(retry);
                assert!(delay >= prev, "{backoff:?} decreased at retry {retry}");
                prev = delay;
            }
        }
    }

    #[test]
    fn zero_retries_fails_on_first_error() {
        let policy = RetryPolicy::none();
        let state = State::start().on(RetryEvent::AttemptFailed("boom"), &policy);
        assert_eq!(
            state,
            RetryState::ExhaustedFailed {
                attempts: 1,
                last_error: "boom",
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn retries_until_exhausted() {
        let policy = RetryPolicy::new(2);
        let mut state = State::start();
        let mut delays = Vec::new();

        loop {
            state = state.on(RetryEvent::AttemptFailed("boom"), &policy);
            match state {
                RetryState::Backoff { delay, .. } => {
                    delays.push(delay);
                    state = state.on(RetryEvent::BackoffElapsed, &policy);
                }
                _ => break,
            }
        }

        assert_eq!(delays, vec![ms(50), ms(100)]);
        assert_eq!(
            state,
            RetryState::ExhaustedFailed {
                attempts: 3,
                last_error: "boom",
            }
        );
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn success_after_retry() {
        let policy = RetryPolicy::new(1);
        let state = State::start()
            .on(RetryEvent::AttemptFailed("boom"), &policy)
            .on(RetryEvent::BackoffElapsed, &policy);
        assert_eq!(state, RetryState::Attempting { attempt: 2 });

        let state = state.on(RetryEvent::AttemptSucceeded("ok"), &policy);
        assert_eq!(
            state,
            RetryState::Succeeded {
                attempts: 2,
                value: "ok",
            }
        );
    }

    #[test]
    fn cancel_during_backoff_keeps_last_error() {
        let policy = RetryPolicy::new(5);
        let state = State::start().on(RetryEvent::AttemptFailed("boom"), &policy);
        assert_eq!(state.attempts(), 1);

        let state = state.on(RetryEvent::CancelRequested, &policy);
        assert_eq!(
            state,
            RetryState::Cancelled {
                attempts: 1,
                last_error: Some("boom"),
            }
        );
    }

    #[test]
    fn cancel_during_attempt() {
        let policy = RetryPolicy::new(5);
        let state = State::start().on(RetryEvent::CancelRequested, &policy);
        assert_eq!(
            state,
            RetryState::Cancelled {
                attempts: 1,
                last_error: None,
            }
        );
    }

    #[test]
    fn terminal_states_absorb_events() {
        let policy = RetryPolicy::new(5);
        let done = State::start().on(RetryEvent::AttemptSucceeded("ok"), &policy);
        let after = done
            .clone()
            .on(RetryEvent::AttemptFailed("late"), &policy)
            .on(RetryEvent::CancelRequested, &policy);
        assert_eq!(after, done);
    }

    #[test]
    fn mismatched_events_are_ignored() {
        let policy = RetryPolicy::new(5);
        let state = State::start().on(RetryEvent::BackoffElapsed, &policy);
        assert_eq!(state, RetryState::Attempting { attempt: 1 });
    }

    #[test]
    fn policy_from_config() {
        let config = ExtensionConfig {
            query_retries: 4,
            ..ExtensionConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.backoff, Backoff::default());
    }
}
