//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use finch_core::summarize::SummarizeError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<finch_core::Error> for ApiError {
  fn from(e: finch_core::Error) -> Self {
    use finch_core::Error as E;
    match e {
      E::NotFound(_) | E::UnknownCompany(_) => Self::NotFound(e.to_string()),
      E::Conflict(_) => Self::Conflict(e.to_string()),
      E::InvalidIdentity(_) => Self::BadRequest(e.to_string()),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl From<finch_ingest::Error> for ApiError {
  fn from(e: finch_ingest::Error) -> Self {
    use finch_ingest::Error as E;
    match e {
      E::Core(core) => core.into(),
      E::NoAdapter(_) => Self::Unavailable(e.to_string()),
      E::BatchInProgress => Self::Conflict(e.to_string()),
      E::NoSummarizer | E::Summarize(SummarizeError::Unavailable(_)) => Self::Unavailable(e.to_string()),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Internal(e) => {
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
