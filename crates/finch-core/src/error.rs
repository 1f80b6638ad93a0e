//! Error types for `finch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Identity absent from the index or the artifact store.
  #[error("not found: {0}")]
  NotFound(String),

  /// A summary was generated for content that has since changed.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unknown company: {0}")]
  UnknownCompany(String),

  #[error("invalid identity: {0}")]
  InvalidIdentity(String),

  /// A single candidate failed during collection.
  #[error("adapter item failure: {0}")]
  AdapterItemFailure(String),

  #[error("store write failure: {0}")]
  StoreWriteFailure(String),

  #[error("index snapshot corrupt: {0}")]
  SnapshotCorrupt(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
