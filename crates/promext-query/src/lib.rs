//! promext-query: the metric query path.
//!
//! Resolves a named instance, builds an HTTP client for it, runs a short
//! range query with bounded retries, and flattens the resulting matrix
//! into [`promext_core::Sample`]s.
//!
//! # Architecture
//!
//! ```text
//! MetricQueryService::query_metrics(request, cancel)
//!   ├── InstanceRegistry::find_by_name()       → ConfigurationError
//!   ├── ClientFactory::build(instance)         → ConnectionError
//!   ├── RangeQueryExecutor::execute()
//!   │   ├── window = [ts - step, ts], step
//!   │   ├── RetryState machine
//!   │   │     Attempting ─ok──────────────→ Succeeded
//!   │   │     Attempting ─err─(retries left)→ Backoff ─elapsed→ Attempting
//!   │   │     Attempting ─err─(none left)──→ ExhaustedFailed
//!   │   │     Attempting/Backoff ─cancel──→ Cancelled
//!   │   └── matrix shape check               → ResultShapeError
//!   └── normalize(matrix) → Vec<Sample>
//! ```
//!
//! Only the query call itself is retried. Lookup, client construction, and
//! shape errors are terminal.

pub mod client;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod retry;
pub mod service;
pub mod wire;

pub use client::{ClientFactory, ClientSettings, PrometheusClient, QueryClient, QueryFuture, QueryResponse, RangeWindow};
pub use error::{ConnectionError, ErrorKind, QueryError, TransportError};
pub use executor::RangeQueryExecutor;
pub use normalize::normalize;
pub use retry::{Backoff, RetryEvent, RetryPolicy, RetryState};
pub use service::MetricQueryService;
pub use wire::{MatrixSeries, QueryValue, SamplePair};
