//! Error type for `finch-ingest`.

use finch_core::artifact::Source;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] finch_core::Error),

  #[error("snapshot error: {0}")]
  Snapshot(#[from] finch_store_fs::Error),

  #[error("no adapter configured for source {0}")]
  NoAdapter(Source),

  #[error("a batch is already running")]
  BatchInProgress,

  #[error("no summarizer configured")]
  NoSummarizer,

  #[error(transparent)]
  Summarize(#[from] finch_core::summarize::SummarizeError),

  /// Reading an artifact back from the store failed.
  #[error("artifact store error: {0}")]
  Store(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
