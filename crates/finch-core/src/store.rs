//! The `ArtifactStore` trait and the metadata stored beside each artifact.
//!
//! The trait is implemented by storage backends (e.g. `finch-store-fs`).
//! The coordinator and the summary worker depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{artifact::ArtifactIdentity, fingerprint::Fingerprint};

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Provenance persisted alongside an artifact's bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
  pub identity:     ArtifactIdentity,
  pub fingerprint:  Fingerprint,
  pub origin_url:   Option<String>,
  pub fetched_at:   DateTime<Utc>,
  pub size_bytes:   u64,
  #[serde(default)]
  pub content_type: Option<String>,
}

/// Bytes and metadata read back from a store.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
  pub bytes:    Bytes,
  pub metadata: ArtifactMetadata,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Durable storage for artifact bytes, addressed by identity.
///
/// Locations are derived deterministically from the identity, so a
/// replacement overwrites the previous bytes in place. Implementations must
/// make each write atomic: a reader never observes a partially written file.
///
/// All methods return `Send` futures so the store can be shared across tokio
/// tasks.
pub trait ArtifactStore: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Write `bytes` and `metadata` for `identity`, replacing anything already
  /// there. Returns the storage path recorded in the index.
  fn put<'a>(
    &'a self,
    identity: &'a ArtifactIdentity,
    bytes: Bytes,
    metadata: &'a ArtifactMetadata,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Read the bytes and metadata for `identity`. Fails with a not-found error
  /// if either is absent.
  fn get<'a>(
    &'a self,
    identity: &'a ArtifactIdentity,
  ) -> impl Future<Output = Result<StoredArtifact, Self::Error>> + Send + 'a;

  /// Whether bytes exist for `identity`.
  fn contains<'a>(
    &'a self,
    identity: &'a ArtifactIdentity,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
