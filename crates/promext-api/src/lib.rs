//! promext-api: HTTP surface consumed by the host platform.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Extension index |
//! | GET | `/prometheus/metrics` | Metric check description |
//! | POST | `/prometheus/metrics/prepare` | No-op |
//! | POST | `/prometheus/metrics/start` | No-op |
//! | POST | `/prometheus/metrics/query` | Run a PromQL range query |
//! | GET | `/prometheus/instance/discovery` | Discovery description |
//! | GET | `/prometheus/instance/discovery/target-description` | Target type description |
//! | GET | `/prometheus/instance/discovery/attribute-descriptions` | Attribute descriptions |
//! | GET | `/prometheus/instance/discovery/discovered-targets` | Cached target list |
//! | GET | `/health/liveness` | Liveness probe |
//! | GET | `/health/readiness` | Readiness probe |

pub mod discovery_handlers;
pub mod error;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use promext_discovery::CachedDiscovery;
use promext_query::MetricQueryService;

pub use error::ApiError;

/// Upper bound on a single metric query, retries included.
pub const DEFAULT_QUERY_DEADLINE: Duration = Duration::from_secs(10);

/// Shared state for API handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: MetricQueryService,
    pub discovery: CachedDiscovery,
    /// Cancelled on daemon shutdown; every query runs under a child token.
    pub shutdown: CancellationToken,
    pub query_deadline: Duration,
}

impl AppState {
    pub fn new(service: MetricQueryService, discovery: CachedDiscovery) -> Self {
        Self {
            service,
            discovery,
            shutdown: CancellationToken::new(),
            query_deadline: DEFAULT_QUERY_DEADLINE,
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_query_deadline(mut self, deadline: Duration) -> Self {
        self.query_deadline = deadline;
        self
    }
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(handlers::METRIC_CHECK_PATH, get(handlers::describe_metric_check))
        .route("/prometheus/metrics/prepare", post(handlers::noop))
        .route("/prometheus/metrics/start", post(handlers::noop))
        .route(handlers::METRIC_QUERY_PATH, post(handlers::query_metrics))
        .route(discovery_handlers::DISCOVERY_PATH, get(discovery_handlers::describe))
        .route(
            discovery_handlers::TARGET_DESCRIPTION_PATH,
            get(discovery_handlers::describe_target),
        )
        .route(
            discovery_handlers::ATTRIBUTE_DESCRIPTIONS_PATH,
            get(discovery_handlers::describe_attributes),
        )
        .route(
            promext_discovery::DISCOVERED_TARGETS_PATH,
            get(discovery_handlers::discovered_targets),
        )
        .route("/health/liveness", get(handlers::liveness))
        .route("/health/readiness", get(handlers::readiness))
        .with_state(state)
}
