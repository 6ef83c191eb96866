//! Retrying range-query executor.
//!
//! Queries the window `[timestamp - step, timestamp]` rather than the
//! instant `timestamp`: an instant query rarely lands exactly on a scrape,
//! while the short range returns whatever was resolved during the last
//! polling interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use promext_core::DEFAULT_STEP;

use crate::client::{QueryClient, QueryResponse, RangeWindow};
use crate::error::{QueryError, TransportError};
use crate::retry::{RetryEvent, RetryPolicy, RetryState};
use crate::wire::{MatrixSeries, QueryValue};

/// Runs one range query with retries, honouring a cancellation token.
#[derive(Debug, Clone, Copy)]
pub struct RangeQueryExecutor {
    policy: RetryPolicy,
    step: Duration,
}

impl RangeQueryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            step: DEFAULT_STEP,
        }
    }

    /// Override the window width / resolution.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Query `query` over the window ending at `at` and return the matrix.
    ///
    /// Transport failures are retried per the policy. A non-matrix result
    /// fails immediately. Cancelling `cancel` aborts the in-flight attempt
    /// or backoff sleep and returns [`QueryError::Cancelled`].
    pub async fn execute<C>(
        &self,
        client: &C,
        instance: &str,
        query: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MatrixSeries>, QueryError>
    where
        C: QueryClient + ?Sized,
    {
        let window = RangeWindow::ending_at(at, self.step);
        let mut state: RetryState<QueryResponse, TransportError> = RetryState::start();

        loop {
            let event = match state {
                RetryState::Attempting { attempt } => {
                    debug!(instance, query, attempt, %window, "executing range query");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => RetryEvent::CancelRequested,
                        result = client.query_range(query, window) => match result {
                            Ok(response) => RetryEvent::AttemptSucceeded(response),
                            Err(error) => {
                                warn!(instance, query, attempt, %error, "range query attempt failed");
                                RetryEvent::AttemptFailed(error)
                            }
                        },
                    }
                }
                RetryState::Backoff {
                    next_attempt,
                    delay,
                    ..
                } => {
                    debug!(
                        instance,
                        next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "backing off before retry"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => RetryEvent::CancelRequested,
                        _ = tokio::time::sleep(delay) => RetryEvent::BackoffElapsed,
                    }
                }
                RetryState::Succeeded { attempts, value } => {
                    debug!(instance, attempts, "range query succeeded");
                    return accept(instance, query, value);
                }
                RetryState::ExhaustedFailed {
                    attempts,
                    last_error,
                } => {
                    return Err(QueryError::Exhausted {
                        instance: instance.to_string(),
                        query: query.to_string(),
                        window,
                        attempts,
                        source: last_error,
                    });
                }
                RetryState::Cancelled { attempts, last_error } => {
                    info!(
                        instance,
                        query,
                        attempts,
                        last_error = ?last_error,
                        "range query cancelled"
                    );
                    return Err(QueryError::Cancelled {
                        instance: instance.to_string(),
                        query: query.to_string(),
                        window,
                        attempts,
                    });
                }
            };

            state = state.on(event, &self.policy);
        }
    }
}

/// Log backend warnings and require a matrix.
fn accept(instance: &str, query: &str, response: QueryResponse) -> Result<Vec<MatrixSeries>, QueryError> {
    for warning in &response.warnings {
        warn!(instance, query, %warning, "Prometheus reported a warning");
    }

    match response.value {
        QueryValue::Matrix(series) => Ok(series),
        other => Err(QueryError::ResultShape {
            instance: instance.to_string(),
            query: query.to_string(),
            found: other.type_name(),
        }),
    }
}
