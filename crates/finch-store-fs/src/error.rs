//! Error type for `finch-store-fs`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] finch_core::Error),

  #[error("i/o error at {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Bytes or sidecar missing for an identity.
  #[error("artifact not found: {0}")]
  NotFound(String),
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound(_) | Self::Core(finch_core::Error::NotFound(_)))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
