use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::db::executor::StoreError;
use crate::db::query::QueryError;

/// Unified error type for hub API responses.
#[derive(Debug)]
pub enum HubError {
    /// The caller's input was rejected.
    BadRequest(String),
    /// The backing store failed.
    Store(String),
    Internal(String),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "validation_error: {msg}"),
            Self::Store(msg) => write!(f, "store_error: {msg}"),
            Self::Internal(msg) => write!(f, "internal_error: {msg}"),
        }
    }
}

impl std::error::Error for HubError {}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl From<QueryError> for HubError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Validation(msg) => Self::BadRequest(msg),
            QueryError::Store(e) => Self::Store(e.0),
        }
    }
}

impl From<StoreError> for HubError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.0)
    }
}

impl From<tokio::task::JoinError> for HubError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
