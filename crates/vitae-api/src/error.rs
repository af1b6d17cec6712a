//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {message}")]
  Conflict {
    message:  String,
    expected: i64,
    actual:   i64,
  },

  #[error("match lookup failed: {0}")]
  Upstream(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<vitae_core::Error> for ApiError {
  fn from(e: vitae_core::Error) -> Self {
    use vitae_core::Error as E;
    match e {
      E::Validation(_) | E::UnknownField { .. } | E::Serialization(_) => {
        ApiError::BadRequest(e.to_string())
      }
      E::EntityNotFound { .. } => ApiError::NotFound(e.to_string()),
      E::Conflict { expected, actual, .. } => ApiError::Conflict {
        message: e.to_string(),
        expected,
        actual,
      },
      E::MatchLookup(m) => ApiError::Upstream(m),
      E::Storage(m) => ApiError::Internal(m),
    }
  }
}

/// Fold a backend error through the domain error into an API error.
pub(crate) fn store_err<E: Into<vitae_core::Error>>(e: E) -> ApiError {
  ApiError::from(e.into())
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict { .. } => StatusCode::CONFLICT,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match &self {
      ApiError::Conflict { message, expected, actual } => json!({
        "error":            message,
        "expected_version": expected,
        "actual_version":   actual,
      }),
      other => json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}
