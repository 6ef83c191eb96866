//! Metric check and health handlers.

use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use promext_core::{DEFAULT_STEP, INSTANCE_TARGET_TYPE, QueryRequest, Sample};

use crate::discovery_handlers::{ATTRIBUTE_DESCRIPTIONS_PATH, DISCOVERY_PATH, TARGET_DESCRIPTION_PATH};
use crate::{ApiError, AppState};

pub const METRIC_CHECK_PATH: &str = "/prometheus/metrics";
pub const METRIC_QUERY_PATH: &str = "/prometheus/metrics/query";

fn endpoint(method: &str, path: &str) -> Value {
    json!({ "method": method, "path": path })
}

/// GET /
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "actions": [endpoint("GET", METRIC_CHECK_PATH)],
        "discoveries": [endpoint("GET", DISCOVERY_PATH)],
        "targetTypes": [endpoint("GET", TARGET_DESCRIPTION_PATH)],
        "targetAttributes": [endpoint("GET", ATTRIBUTE_DESCRIPTIONS_PATH)],
    }))
}

/// GET /prometheus/metrics
///
/// The query call interval is the range-query window width, so each poll
/// covers exactly the samples resolved since the previous one.
pub async fn describe_metric_check() -> impl IntoResponse {
    Json(json!({
        "id": format!("{INSTANCE_TARGET_TYPE}.metrics"),
        "label": "Prometheus metrics",
        "description": "Gather and check on Prometheus metrics",
        "version": env!("CARGO_PKG_VERSION"),
        "targetType": INSTANCE_TARGET_TYPE,
        "category": "monitoring",
        "kind": "check",
        "timeControl": "external",
        "parameters": [{
            "label": "Duration",
            "name": "duration",
            "type": "duration",
            "advanced": false,
            "required": true,
            "defaultValue": "30s",
        }],
        "prepare": endpoint("POST", "/prometheus/metrics/prepare"),
        "start": endpoint("POST", "/prometheus/metrics/start"),
        "metrics": {
            "query": {
                "endpoint": {
                    "method": "POST",
                    "path": METRIC_QUERY_PATH,
                    "callInterval": format!("{}s", DEFAULT_STEP.as_secs()),
                },
                "parameters": [{
                    "name": "query",
                    "label": "PromQL Query",
                    "required": true,
                    "type": "string",
                }],
            },
        },
    }))
}

/// POST /prometheus/metrics/prepare and /start
pub async fn noop() -> impl IntoResponse {
    Json(json!({}))
}

#[derive(Debug, Deserialize)]
pub struct QueryTarget {
    pub name: String,
}

/// Body of a metric query call.
#[derive(Debug, Deserialize)]
pub struct QueryMetricsBody {
    pub target: QueryTarget,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl QueryMetricsBody {
    fn into_request(self) -> QueryRequest {
        let query = self
            .config
            .get("query")
            .and_then(Value::as_str)
            .map(str::to_string);
        QueryRequest::new(self.target.name, query, self.timestamp)
    }
}

#[derive(Debug, Serialize)]
pub struct QueryMetricsResult {
    pub metrics: Vec<Sample>,
}

/// POST /prometheus/metrics/query
pub async fn query_metrics(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryMetricsResult>, ApiError> {
    let body: QueryMetricsBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("failed to parse request body", e))?;
    let request = body.into_request();

    let cancel = state.shutdown.child_token();
    let result = with_deadline(
        &cancel,
        state.query_deadline,
        state.service.query_metrics(&request, &cancel),
    )
    .await;

    match result {
        Ok(metrics) => {
            debug!(instance = %request.instance, samples = metrics.len(), "metric query served");
            Ok(Json(QueryMetricsResult { metrics }))
        }
        Err(err) => {
            warn!(instance = %request.instance, kind = ?err.kind(), error = %err, "metric query failed");
            Err(err.into())
        }
    }
}

/// Drive `fut` to completion, cancelling `cancel` once `deadline` passes.
///
/// The timer lives inside the returned future, so dropping it (client
/// disconnect) drops the timer too.
async fn with_deadline<F: Future>(
    cancel: &CancellationToken,
    deadline: Duration,
    fut: F,
) -> F::Output {
    tokio::pin!(fut);
    tokio::select! {
        output = &mut fut => output,
        _ = tokio::time::sleep(deadline) => {
            debug!(deadline_ms = deadline.as_millis() as u64, "query deadline reached");
            cancel.cancel();
            fut.await
        }
    }
}

/// GET /health/liveness
pub async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /health/readiness
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "instances": state.service.registry().len(),
    }))
}
