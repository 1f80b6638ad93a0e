//! The `SourceAdapter` capability.
//!
//! An adapter turns a company and a document-type filter into a lazy,
//! finite stream of candidates. Adapters own their own throttling; the
//! coordinator pulls one candidate at a time and never retries.

use std::collections::BTreeSet;

use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::{
  artifact::{DocumentType, Source},
  company::CompanyRecord,
};

/// One fetched document, not yet reconciled against the index.
#[derive(Debug, Clone)]
pub struct Candidate {
  /// Path below `<ticker>/<source>/<document_type>/`, stable across fetches.
  pub relative_path: String,
  pub document_type: DocumentType,
  pub bytes:         Bytes,
  pub origin_url:    Option<String>,
  pub content_type:  Option<String>,
}

/// A candidate the adapter located but could not produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{locator}: {reason}")]
pub struct CandidateError {
  /// URL or other handle identifying what was being fetched.
  pub locator: String,
  pub reason:  String,
}

impl CandidateError {
  pub fn new(locator: impl Into<String>, reason: impl ToString) -> Self {
    Self { locator: locator.into(), reason: reason.to_string() }
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Which document types a collection should produce. An empty filter means
/// "the adapter's defaults".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTypeFilter {
  types: BTreeSet<DocumentType>,
}

impl DocumentTypeFilter {
  pub fn any() -> Self { Self::default() }

  pub fn only(types: impl IntoIterator<Item = DocumentType>) -> Self {
    Self { types: types.into_iter().collect() }
  }

  pub fn is_unrestricted(&self) -> bool { self.types.is_empty() }

  pub fn allows(&self, document_type: &DocumentType) -> bool {
    self.types.is_empty() || self.types.contains(document_type)
  }

  pub fn types(&self) -> impl Iterator<Item = &DocumentType> { self.types.iter() }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A source of candidate artifacts for one company.
pub trait SourceAdapter: Send + Sync {
  /// The namespace every candidate from this adapter belongs to.
  fn source(&self) -> Source;

  /// Lazily enumerate and fetch candidates for `company`.
  ///
  /// An `Err` item describes one candidate that failed; the stream continues
  /// after it unless the adapter cannot go on (e.g. its listing request
  /// failed), in which case it ends.
  fn candidates<'a>(
    &'a self,
    company: &'a CompanyRecord,
    filter: &'a DocumentTypeFilter,
  ) -> BoxStream<'a, Result<Candidate, CandidateError>>;
}
