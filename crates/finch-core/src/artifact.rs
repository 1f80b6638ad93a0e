//! Artifact types, the unit of ingestion.
//!
//! An artifact is one fetched document, named by an [`ArtifactIdentity`] and
//! tracked in the collection index as an [`ArtifactRecord`]. Identities are
//! validated on construction so that every identity can be mapped onto a
//! filesystem location without escaping the store root.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, fingerprint::Fingerprint};

// ─── Source ──────────────────────────────────────────────────────────────────

/// Where an artifact came from. IR and SEC form disjoint identity namespaces.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  /// A company's investor-relations web pages.
  Ir,
  /// The SEC EDGAR filings API.
  Sec,
}

impl Source {
  pub const ALL: [Source; 2] = [Source::Ir, Source::Sec];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ir => "ir",
      Self::Sec => "sec",
    }
  }
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Source {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "ir" => Ok(Self::Ir),
      "sec" => Ok(Self::Sec),
      other => Err(Error::InvalidIdentity(format!("unknown source: {other:?}"))),
    }
  }
}

// ─── DocumentType ────────────────────────────────────────────────────────────

/// A document type label such as `10-K` or `Presentation`.
///
/// Always a single path segment: no separators, not `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentType(String);

impl DocumentType {
  pub fn new(value: impl Into<String>) -> Result<Self> {
    let value = value.into();
    let trimmed = value.trim();
    if !is_safe_segment(trimmed) {
      return Err(Error::InvalidIdentity(format!("invalid document type: {value:?}")));
    }
    Ok(Self(trimmed.to_owned()))
  }

  /// Build a document type from a free-form label, replacing characters that
  /// cannot appear in a path segment (`10-K/A` becomes `10-K_A`).
  pub fn sanitized(label: &str) -> Result<Self> {
    let cleaned: String = label
      .trim()
      .chars()
      .map(|c| if c == '/' || c == '\\' || c == ' ' || c.is_control() { '_' } else { c })
      .collect();
    Self::new(cleaned)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DocumentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for DocumentType {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl From<DocumentType> for String {
  fn from(value: DocumentType) -> Self { value.0 }
}

fn is_safe_segment(s: &str) -> bool {
  !s.is_empty()
    && s != "."
    && s != ".."
    && !s.contains(['/', '\\', '\0'])
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// The composite key naming a tracked artifact:
/// `(company_ticker, source, document_type, relative_path)`.
///
/// Immutable once constructed. Ordering follows field order, which is what
/// [`crate::index::CollectionIndex::list`] uses to break timestamp ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityParts")]
pub struct ArtifactIdentity {
  ticker:        String,
  source:        Source,
  document_type: DocumentType,
  relative_path: String,
}

/// Unvalidated wire form of an [`ArtifactIdentity`].
#[derive(Deserialize)]
struct IdentityParts {
  ticker:        String,
  source:        Source,
  document_type: DocumentType,
  relative_path: String,
}

impl TryFrom<IdentityParts> for ArtifactIdentity {
  type Error = Error;

  fn try_from(p: IdentityParts) -> Result<Self> {
    Self::new(&p.ticker, p.source, p.document_type, &p.relative_path)
  }
}

impl ArtifactIdentity {
  /// Validate and build an identity. The ticker is upper-cased.
  pub fn new(
    ticker: &str,
    source: Source,
    document_type: DocumentType,
    relative_path: &str,
  ) -> Result<Self> {
    let ticker = normalize_ticker(ticker)?;
    validate_relative_path(relative_path)?;
    Ok(Self {
      ticker,
      source,
      document_type,
      relative_path: relative_path.to_owned(),
    })
  }

  pub fn ticker(&self) -> &str { &self.ticker }

  pub fn source(&self) -> Source { self.source }

  pub fn document_type(&self) -> &DocumentType { &self.document_type }

  pub fn relative_path(&self) -> &str { &self.relative_path }

  /// Path segments below the store root, in order.
  pub fn segments(&self) -> impl Iterator<Item = &str> {
    [self.ticker.as_str(), self.source.as_str(), self.document_type.as_str()]
      .into_iter()
      .chain(self.relative_path.split('/'))
  }
}

impl fmt::Display for ArtifactIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{}/{}",
      self.ticker, self.source, self.document_type, self.relative_path
    )
  }
}

/// Upper-case and validate a ticker symbol (`brk.b` → `BRK.B`).
pub fn normalize_ticker(ticker: &str) -> Result<String> {
  let t = ticker.trim();
  let valid = !t.is_empty()
    && t.len() <= 16
    && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    && t != "."
    && t != "..";
  if !valid {
    return Err(Error::InvalidIdentity(format!("invalid ticker: {ticker:?}")));
  }
  Ok(t.to_ascii_uppercase())
}

fn validate_relative_path(path: &str) -> Result<()> {
  if path.is_empty() || path.starts_with('/') {
    return Err(Error::InvalidIdentity(format!("invalid relative path: {path:?}")));
  }
  if !path.split('/').all(is_safe_segment) {
    return Err(Error::InvalidIdentity(format!("invalid relative path: {path:?}")));
  }
  Ok(())
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// A generated summary bound to the exact content it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
  pub text:               String,
  pub key_points:         Vec<String>,
  pub generated_at:       DateTime<Utc>,
  pub source_identity:    ArtifactIdentity,
  /// Fingerprint of the bytes the summary was generated from.
  pub source_fingerprint: Fingerprint,
  /// Model or engine that produced the summary, if known.
  #[serde(default)]
  pub model:              Option<String>,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// Everything the index knows about one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
  pub identity:     ArtifactIdentity,
  pub fingerprint:  Fingerprint,
  pub origin_url:   Option<String>,
  pub fetched_at:   DateTime<Utc>,
  /// Location of the bytes in the artifact store.
  pub storage_path: String,
  #[serde(default)]
  pub size_bytes:   u64,
  #[serde(default)]
  pub summary:      Option<SummaryRecord>,
}

impl ArtifactRecord {
  /// `true` if a summary exists and describes the current content.
  pub fn has_current_summary(&self) -> bool {
    self
      .summary
      .as_ref()
      .is_some_and(|s| s.source_fingerprint == self.fingerprint)
  }
}
