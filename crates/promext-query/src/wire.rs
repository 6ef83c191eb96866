//! Prometheus HTTP API response model.
//!
//! Covers the envelope returned by `/api/v1/query_range`:
//!
//! ```json
//! {
//!   "status": "success",
//!   "data": { "resultType": "matrix", "result": [ { "metric": {..}, "values": [[1435781451.781, "1"]] } ] },
//!   "warnings": ["..."]
//! }
//! ```
//!
//! Errors carry `"status": "error"`, `errorType`, and `error` instead of
//! `data`.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::client::QueryResponse;
use crate::error::TransportError;

/// Longest body excerpt kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Raw response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryValue>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// The `data` section of a query response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryValue {
    Matrix(Vec<MatrixSeries>),
    Vector(Vec<VectorSample>),
    Scalar(SamplePair),
    String(StringPair),
}

impl QueryValue {
    /// Result type name as reported by Prometheus.
    pub fn type_name(&self) -> &'static str {
        match self {
            QueryValue::Matrix(_) => "matrix",
            QueryValue::Vector(_) => "vector",
            QueryValue::Scalar(_) => "scalar",
            QueryValue::String(_) => "string",
        }
    }
}

/// One time series of a matrix result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatrixSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

/// One element of a vector result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: SamplePair,
}

/// `[<unix seconds>, "<value>"]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "(f64, String)")]
pub struct SamplePair {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TryFrom<(f64, String)> for SamplePair {
    type Error = String;

    fn try_from((secs, raw): (f64, String)) -> Result<Self, Self::Error> {
        // Accepts "NaN", "+Inf", "-Inf" as rendered by Prometheus.
        let value = raw
            .parse::<f64>()
            .map_err(|_| format!("invalid sample value {raw:?}"))?;
        Ok(Self {
            timestamp: parse_timestamp(secs)?,
            value,
        })
    }
}

/// `[<unix seconds>, "<string>"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "(f64, String)")]
pub struct StringPair {
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

impl TryFrom<(f64, String)> for StringPair {
    type Error = String;

    fn try_from((secs, value): (f64, String)) -> Result<Self, Self::Error> {
        Ok(Self {
            timestamp: parse_timestamp(secs)?,
            value,
        })
    }
}

/// Prometheus timestamps are float seconds with millisecond precision.
fn parse_timestamp(secs: f64) -> Result<DateTime<Utc>, String> {
    if !secs.is_finite() {
        return Err(format!("invalid timestamp {secs}"));
    }
    let millis = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| format!("timestamp out of range: {secs}"))
}

/// Classify an HTTP response from the query endpoint.
pub(crate) fn decode_response(status: StatusCode, body: &[u8]) -> Result<QueryResponse, TransportError> {
    let parsed: ApiResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => return Err(TransportError::Decode(e.to_string())),
        Err(_) => {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: excerpt(body),
            });
        }
    };

    if parsed.status != "success" || !status.is_success() {
        return Err(match (parsed.error_type, parsed.error) {
            (error_type, Some(message)) => TransportError::Backend {
                error_type: error_type.unwrap_or_else(|| "unknown".to_string()),
                message,
            },
            _ => TransportError::Status {
                status: status.as_u16(),
                body: excerpt(body),
            },
        });
    }

    let value = parsed
        .data
        .ok_or_else(|| TransportError::Decode("response has no data".to_string()))?;

    Ok(QueryResponse {
        value,
        warnings: parsed.warnings,
    })
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}
