//! Error type for `finch-sources`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] finch_core::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} returned {status}")]
  Status {
    url:    String,
    status: reqwest::StatusCode,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid url {url}: {reason}")]
  Url { url: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
