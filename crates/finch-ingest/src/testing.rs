//! In-memory fakes for exercising the engine without network or disk.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};

use finch_core::{
  Error,
  artifact::{ArtifactIdentity, DocumentType, Source},
  company::{CompanyRecord, Roster},
  source::{Candidate, CandidateError, DocumentTypeFilter, SourceAdapter},
  store::{ArtifactMetadata, ArtifactStore, StoredArtifact},
  summarize::{SummarizeError, Summarizer, SummaryDraft},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

/// Roster with `ACME` (CIK 42) and `BETA` (no CIK).
pub fn acme_roster() -> Roster {
  Roster::new(vec![
    CompanyRecord::new("ACME", Some("42"), "Acme Corp"),
    CompanyRecord::new("BETA", None, "Beta Industries"),
  ])
  .expect("valid roster")
}

/// A candidate with a synthetic origin URL.
pub fn candidate(document_type: &str, relative_path: &str, bytes: &[u8]) -> Candidate {
  Candidate {
    relative_path: relative_path.to_owned(),
    document_type: DocumentType::new(document_type).expect("valid document type"),
    bytes:         Bytes::copy_from_slice(bytes),
    origin_url:    Some(format!("https://example.com/{relative_path}")),
    content_type:  None,
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Artifact store backed by a map, with write counting and injectable
/// failures.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
  files:   Mutex<HashMap<ArtifactIdentity, StoredArtifact>>,
  failing: Mutex<HashSet<String>>,
  writes:  AtomicUsize,
}

impl MemoryArtifactStore {
  /// Make every write whose relative path is `relative_path` fail.
  pub fn fail_writes_to(&self, relative_path: &str) {
    lock(&self.failing).insert(relative_path.to_owned());
  }

  /// Number of successful `put` calls.
  pub fn write_count(&self) -> usize { self.writes.load(Ordering::SeqCst) }

  /// Overwrite stored bytes without touching the index, as a concurrent
  /// collector would between its store write and its upsert.
  pub fn overwrite(&self, identity: &ArtifactIdentity, bytes: &[u8]) {
    if let Some(stored) = lock(&self.files).get_mut(identity) {
      stored.bytes = Bytes::copy_from_slice(bytes);
    }
  }
}

impl ArtifactStore for MemoryArtifactStore {
  type Error = Error;

  async fn put(
    &self,
    identity: &ArtifactIdentity,
    bytes: Bytes,
    metadata: &ArtifactMetadata,
  ) -> Result<String, Error> {
    if lock(&self.failing).contains(identity.relative_path()) {
      return Err(Error::StoreWriteFailure(format!("injected failure for {identity}")));
    }
    // Give concurrent collectors a chance to interleave, as real I/O would.
    tokio::task::yield_now().await;
    lock(&self.files).insert(identity.clone(), StoredArtifact {
      bytes,
      metadata: metadata.clone(),
    });
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(format!("mem://{identity}"))
  }

  async fn get(&self, identity: &ArtifactIdentity) -> Result<StoredArtifact, Error> {
    lock(&self.files)
      .get(identity)
      .cloned()
      .ok_or_else(|| Error::NotFound(identity.to_string()))
  }

  async fn contains(&self, identity: &ArtifactIdentity) -> Result<bool, Error> {
    Ok(lock(&self.files).contains_key(identity))
  }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

/// Adapter that replays a fixed script of candidates and failures.
#[derive(Debug)]
pub struct ScriptedAdapter {
  source:        Source,
  items:         Vec<Result<Candidate, CandidateError>>,
  calls:         AtomicUsize,
  ignore_filter: bool,
}

impl ScriptedAdapter {
  pub fn new(source: Source) -> Self {
    Self { source, items: Vec::new(), calls: AtomicUsize::new(0), ignore_filter: false }
  }

  /// Yield every scripted item regardless of the requested document types.
  pub fn ignoring_filter(mut self) -> Self {
    self.ignore_filter = true;
    self
  }

  pub fn with(mut self, candidate: Candidate) -> Self {
    self.items.push(Ok(candidate));
    self
  }

  pub fn with_failure(mut self, locator: &str, reason: &str) -> Self {
    self.items.push(Err(CandidateError::new(locator, reason)));
    self
  }

  /// How many times `candidates` was called.
  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl SourceAdapter for ScriptedAdapter {
  fn source(&self) -> Source { self.source }

  fn candidates<'a>(
    &'a self,
    _company: &'a CompanyRecord,
    filter: &'a DocumentTypeFilter,
  ) -> BoxStream<'a, Result<Candidate, CandidateError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let items: Vec<_> = self
      .items
      .iter()
      .filter(|item| {
        self.ignore_filter || item.as_ref().map_or(true, |c| filter.allows(&c.document_type))
      })
      .cloned()
      .collect();
    Box::pin(stream::iter(items))
  }
}

// ─── Summarizer ──────────────────────────────────────────────────────────────

/// Summarizer that describes the bytes it was given.
#[derive(Debug, Default)]
pub struct FakeSummarizer {
  unavailable: bool,
  calls:       AtomicUsize,
}

impl FakeSummarizer {
  pub fn unavailable() -> Self { Self { unavailable: true, ..Self::default() } }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
  async fn summarize(
    &self,
    bytes: &[u8],
    document_type: &DocumentType,
  ) -> Result<SummaryDraft, SummarizeError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.unavailable {
      return Err(SummarizeError::Unavailable("fake summarizer disabled".into()));
    }
    let text = String::from_utf8_lossy(bytes);
    Ok(SummaryDraft {
      text:       format!("{document_type}: {text}"),
      key_points: vec![format!("{} bytes", bytes.len())],
      model:      Some("fake".into()),
    })
  }
}
