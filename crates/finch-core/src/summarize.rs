//! The `Summarizer` capability.

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::DocumentType;

/// A summary before it is bound to an identity and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDraft {
  pub text:       String,
  pub key_points: Vec<String>,
  pub model:      Option<String>,
}

/// Summarizer failures. All of them are recoverable: the artifact simply
/// stays unsummarized until the next attempt.
#[derive(Debug, Error)]
pub enum SummarizeError {
  /// The summarizer is not configured (e.g. no API key).
  #[error("summarizer unavailable: {0}")]
  Unavailable(String),

  /// No usable text could be extracted from the bytes.
  #[error("text extraction failed: {0}")]
  Extraction(String),

  #[error("upstream error: {0}")]
  Upstream(String),
}

/// Generates a summary of an artifact's bytes.
#[async_trait]
pub trait Summarizer: Send + Sync {
  async fn summarize(
    &self,
    bytes: &[u8],
    document_type: &DocumentType,
  ) -> Result<SummaryDraft, SummarizeError>;
}
