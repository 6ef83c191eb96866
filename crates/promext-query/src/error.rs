//! Query path error types.

use serde::Serialize;
use thiserror::Error;

use crate::client::RangeWindow;

/// Failure of a single range-query attempt. Always eligible for retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("backend error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(error_chain(&err))
        }
    }
}

/// Render an error with its sources, `outer: inner: root`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

/// Failure to build a client for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid auth header {0:?}")]
    InvalidHeader(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Machine-readable classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller or configuration error (unknown instance, missing query).
    Configuration,
    /// The client for the instance could not be built.
    Connection,
    /// Every attempt failed with a transient error.
    TransientQuery,
    /// The backend answered with something other than a matrix.
    ResultShape,
    /// The caller cancelled or the deadline fired.
    Cancellation,
}

/// Errors surfaced by the query path.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to find Prometheus instance named '{0}'")]
    InstanceNotFound(String),

    #[error("no PromQL query defined")]
    MissingQuery,

    #[error("failed to initialize Prometheus API client for instance '{instance}': {source}")]
    Connection {
        instance: String,
        source: ConnectionError,
    },

    #[error(
        "failed to execute Prometheus query against instance '{instance}' for window {window} \
         with query '{query}' after {attempts} attempt(s): {source}"
    )]
    Exhausted {
        instance: String,
        query: String,
        window: RangeWindow,
        attempts: u32,
        source: TransportError,
    },

    #[error(
        "PromQL query '{query}' against instance '{instance}' returned a {found} result, \
         only matrix results are supported"
    )]
    ResultShape {
        instance: String,
        query: String,
        found: &'static str,
    },

    #[error(
        "Prometheus query against instance '{instance}' for window {window} with query \
         '{query}' was cancelled after {attempts} attempt(s)"
    )]
    Cancelled {
        instance: String,
        query: String,
        window: RangeWindow,
        attempts: u32,
    },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::InstanceNotFound(_) | QueryError::MissingQuery => ErrorKind::Configuration,
            QueryError::Connection { .. } => ErrorKind::Connection,
            QueryError::Exhausted { .. } => ErrorKind::TransientQuery,
            QueryError::ResultShape { .. } => ErrorKind::ResultShape,
            QueryError::Cancelled { .. } => ErrorKind::Cancellation,
        }
    }

    /// Number of query attempts made, where the error came from the executor.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            QueryError::Exhausted { attempts, .. } | QueryError::Cancelled { attempts, .. } => {
                Some(*attempts)
            }
            QueryError::ResultShape { .. } => Some(1),
            _ => None,
        }
    }
}
