//! Error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use promext_query::{ErrorKind, QueryError};

/// JSON error body: `{title, detail?, kind}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub kind: ErrorKind,
}

impl ApiError {
    /// Request body could not be parsed.
    pub fn bad_request(title: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            title: title.into(),
            detail: Some(detail.to_string()),
            kind: ErrorKind::Configuration,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Configuration => StatusCode::BAD_REQUEST,
        ErrorKind::Connection | ErrorKind::TransientQuery | ErrorKind::ResultShape => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Cancellation => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<QueryError> for ApiError {
    /// The title is the full error message, which already ends with the
    /// underlying cause, so `detail` stays empty.
    fn from(err: QueryError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            title: err.to_string(),
            detail: None,
            kind,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
