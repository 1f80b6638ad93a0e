//! [`Engine`]: shared state and the operations driven by the API and the
//! scheduler.
//!
//! Lifecycle: construct → [`restore`](Engine::restore) → serve (collect,
//! batches, queries) → [`persist`](Engine::persist) → drop.

use std::{
  collections::BTreeSet,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use finch_core::{
  Error as CoreError,
  artifact::{ArtifactIdentity, Source, SummaryRecord},
  company::Roster,
  fingerprint::fingerprint,
  index::CollectionIndex,
  report::CollectionReport,
  source::{DocumentTypeFilter, SourceAdapter},
  store::ArtifactStore,
  summarize::Summarizer,
};
use finch_store_fs::{LoadedSnapshot, PersistedIndex, SnapshotFile};

use crate::{
  Error, Result,
  coordinator::Coordinator,
  scheduler::{BatchReport, CompanyFailure},
  summary::{BindOutcome, SummaryQueue, SummaryRequest, bind_summary},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
  Idle,
  Running,
}

/// Point-in-time overview of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
  pub tracked_companies:  usize,
  pub artifacts:          usize,
  pub summaries:          usize,
  pub last_batch_at:      Option<DateTime<Utc>>,
  pub batch_state:        BatchState,
  /// Collections in progress, as `TICKER/source`.
  pub active_collections: Vec<String>,
  pub sources:            Vec<Source>,
}

/// Clears a flag or a set entry when dropped, so state is restored even if
/// the holder's future is cancelled.
struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::SeqCst); }
}

struct ActiveGuard<'a> {
  active: &'a Mutex<BTreeSet<String>>,
  key:    String,
}

impl Drop for ActiveGuard<'_> {
  fn drop(&mut self) { lock(self.active).remove(&self.key); }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S> {
  index:         Arc<CollectionIndex>,
  store:         Arc<S>,
  roster:        Arc<Roster>,
  coordinator:   Coordinator<S>,
  adapters:      Vec<Arc<dyn SourceAdapter>>,
  summaries:     SummaryQueue,
  summarizer:    Option<Arc<dyn Summarizer>>,
  snapshots:     Option<SnapshotFile>,
  batch_running: AtomicBool,
  last_batch_at: Mutex<Option<DateTime<Utc>>>,
  active:        Mutex<BTreeSet<String>>,
}

impl<S: ArtifactStore> Engine<S> {
  /// An engine with an empty index and no adapters.
  pub fn new(store: Arc<S>, roster: Arc<Roster>, summaries: SummaryQueue) -> Self {
    let index = Arc::new(CollectionIndex::new());
    Self {
      coordinator: Coordinator::new(index.clone(), store.clone(), roster.clone()),
      index,
      store,
      roster,
      adapters: Vec::new(),
      summaries,
      summarizer: None,
      snapshots: None,
      batch_running: AtomicBool::new(false),
      last_batch_at: Mutex::new(None),
      active: Mutex::new(BTreeSet::new()),
    }
  }

  /// Register an adapter. A later adapter for the same source replaces the
  /// earlier one.
  pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
    self.adapters.retain(|a| a.source() != adapter.source());
    self.adapters.push(adapter);
    self
  }

  /// Summarizer used by [`summarize_now`](Self::summarize_now).
  pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
    self.summarizer = Some(summarizer);
    self
  }

  /// Persist the index to `file` after every batch and on
  /// [`persist`](Self::persist).
  pub fn with_snapshot_file(mut self, file: SnapshotFile) -> Self {
    self.snapshots = Some(file);
    self
  }

  pub fn index(&self) -> &Arc<CollectionIndex> { &self.index }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn roster(&self) -> &Arc<Roster> { &self.roster }

  pub fn summary_queue(&self) -> &SummaryQueue { &self.summaries }

  pub fn last_batch_at(&self) -> Option<DateTime<Utc>> { *lock(&self.last_batch_at) }

  pub fn adapter(&self, source: Source) -> Result<Arc<dyn SourceAdapter>> {
    self
      .adapters
      .iter()
      .find(|a| a.source() == source)
      .cloned()
      .ok_or(Error::NoAdapter(source))
  }

  /// Load the snapshot file, if any, into the index. A missing or corrupt
  /// snapshot leaves the index empty.
  pub async fn restore(&self) -> Result<()> {
    let Some(file) = &self.snapshots else { return Ok(()) };
    match file.load().await? {
      LoadedSnapshot::Missing => info!(path = %file.path().display(), "no snapshot; starting empty"),
      LoadedSnapshot::Restored(persisted) => {
        *lock(&self.last_batch_at) = persisted.last_batch_at;
        self.index.restore(persisted.into_snapshot());
        info!(artifacts = self.index.len(), "index restored");
      }
      LoadedSnapshot::Quarantined { moved_to, .. } => {
        error!(moved_to = %moved_to.display(), "snapshot was corrupt; starting empty");
      }
      LoadedSnapshot::Unreadable { reason } => {
        error!(reason = %reason, "snapshot could not be read; starting empty");
      }
    }
    Ok(())
  }

  /// Write the current index to the snapshot file, if one is configured.
  pub async fn persist(&self) -> Result<()> {
    let Some(file) = &self.snapshots else { return Ok(()) };
    let persisted = PersistedIndex::new(self.index.snapshot(), self.last_batch_at());
    file.save(&persisted).await?;
    Ok(())
  }

  /// Collect one company from one source and queue summaries for whatever
  /// changed.
  pub async fn collect(
    &self,
    ticker: &str,
    source: Source,
    filter: &DocumentTypeFilter,
  ) -> Result<CollectionReport> {
    let adapter = self.adapter(source)?;
    let company = self.roster.get(ticker)?;

    let key = format!("{}/{source}", company.ticker);
    lock(&self.active).insert(key.clone());
    let _active = ActiveGuard { active: &self.active, key };

    let report = self
      .coordinator
      .collect(&company.ticker, adapter.as_ref(), filter)
      .await?;
    self.enqueue_summaries(&report);
    Ok(report)
  }

  /// Run every adapter for every company in the roster, then persist the
  /// index. Fails with [`Error::BatchInProgress`] if a batch is running.
  pub async fn run_batch(&self) -> Result<BatchReport> {
    if self
      .batch_running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return Err(Error::BatchInProgress);
    }
    let _running = BatchGuard(&self.batch_running);

    let mut batch = BatchReport::new(Utc::now());
    let companies = self.roster.all();
    info!(companies = companies.len(), adapters = self.adapters.len(), "batch started");

    for company in &companies {
      for adapter in &self.adapters {
        let source = adapter.source();
        match self.collect(&company.ticker, source, &DocumentTypeFilter::any()).await {
          Ok(report) => {
            batch.summaries_enqueued += report.created.len() + report.replaced.len();
            batch.collections.push(report);
          }
          Err(e) => {
            warn!(ticker = %company.ticker, source = %source, error = %e, "company collection failed");
            batch.failures.push(CompanyFailure {
              ticker: company.ticker.clone(),
              source,
              error: e.to_string(),
            });
          }
        }
      }
    }

    batch.finished_at = Utc::now();
    *lock(&self.last_batch_at) = Some(batch.finished_at);
    if let Err(e) = self.persist().await {
      error!(error = %e, "could not persist index after batch");
    }
    info!(
      created = batch.created_count(),
      replaced = batch.replaced_count(),
      unchanged = batch.unchanged_count(),
      failed_items = batch.failed_item_count(),
      failed_companies = batch.failures.len(),
      "batch finished"
    );
    Ok(batch)
  }

  /// Summarize one stored artifact right away, bind the summary to its
  /// record and persist the index.
  ///
  /// Fails with `NotFound` for an unknown identity, [`Error::NoSummarizer`]
  /// or [`Error::Summarize`] when no summary could be produced, and
  /// `Conflict` if the content changed underneath.
  pub async fn summarize_now(&self, identity: &ArtifactIdentity) -> Result<SummaryRecord> {
    let summarizer = self.summarizer.as_ref().ok_or(Error::NoSummarizer)?;
    let record = self.index.get(identity)?;
    let stored = self
      .store
      .get(identity)
      .await
      .map_err(|e| Error::Store(e.to_string()))?;

    let read_fingerprint = fingerprint(&stored.bytes);
    if read_fingerprint != record.fingerprint {
      return Err(CoreError::Conflict(format!("stored bytes of {identity} are being replaced")).into());
    }

    let draft = summarizer.summarize(&stored.bytes, identity.document_type()).await?;
    let summary = SummaryRecord {
      text:               draft.text,
      key_points:         draft.key_points,
      generated_at:       Utc::now(),
      source_identity:    identity.clone(),
      source_fingerprint: read_fingerprint,
      model:              draft.model,
    };

    match bind_summary(&self.index, &self.summaries, summary.clone()) {
      BindOutcome::Attached => {}
      BindOutcome::Stale { .. } => {
        return Err(CoreError::Conflict(format!("{identity} changed while it was summarized")).into());
      }
      BindOutcome::Dropped => return Err(CoreError::NotFound(identity.to_string()).into()),
    }
    info!(identity = %identity, "summary generated on demand");
    if let Err(e) = self.persist().await {
      error!(error = %e, "could not persist index after summary");
    }
    Ok(summary)
  }

  pub fn status(&self) -> SystemStatus {
    SystemStatus {
      tracked_companies:  self.roster.len(),
      artifacts:          self.index.len(),
      summaries:          self.index.summary_count(),
      last_batch_at:      self.last_batch_at(),
      batch_state:        if self.batch_running.load(Ordering::SeqCst) {
        BatchState::Running
      } else {
        BatchState::Idle
      },
      active_collections: lock(&self.active).iter().cloned().collect(),
      sources:            self.adapters.iter().map(|a| a.source()).collect(),
    }
  }

  fn enqueue_summaries(&self, report: &CollectionReport) {
    for identity in report.changed() {
      let Some(fingerprint) = self.index.current_fingerprint(identity) else { continue };
      self.summaries.enqueue(SummaryRequest { identity: identity.clone(), fingerprint });
    }
  }
}

#[cfg(test)]
mod tests {
  use finch_core::{artifact::DocumentType, summarize::SummarizeError};

  use super::*;
  use crate::{
    summary::SummaryReceiver,
    testing::{FakeSummarizer, MemoryArtifactStore, ScriptedAdapter, acme_roster, candidate},
  };

  fn engine() -> (Engine<MemoryArtifactStore>, SummaryReceiver) {
    let (queue, receiver) = SummaryQueue::new();
    let engine = Engine::new(
      Arc::new(MemoryArtifactStore::default()),
      Arc::new(acme_roster()),
      queue,
    )
    .with_adapter(Arc::new(
      ScriptedAdapter::new(Source::Sec)
        .with(candidate("10-K", "x.html", b"annual"))
        .with(candidate("10-Q", "y.html", b"quarterly")),
    ))
    .with_adapter(Arc::new(
      ScriptedAdapter::new(Source::Ir).with(candidate("Presentation", "deck.pdf", b"deck")),
    ));
    (engine, receiver)
  }

  #[tokio::test]
  async fn collect_queues_summaries_for_changes_only() {
    let (engine, mut rx) = engine();
    let report = engine
      .collect("acme", Source::Sec, &DocumentTypeFilter::any())
      .await
      .unwrap();
    assert_eq!(report.created.len(), 2);
    assert!(rx.try_recv().is_some());
    assert!(rx.try_recv().is_some());
    assert!(rx.try_recv().is_none());

    engine.collect("ACME", Source::Sec, &DocumentTypeFilter::any()).await.unwrap();
    assert!(rx.try_recv().is_none());
    assert!(engine.status().active_collections.is_empty());
  }

  #[tokio::test]
  async fn collect_honours_the_filter() {
    let (engine, _rx) = engine();
    let only_10k = DocumentTypeFilter::only([DocumentType::new("10-K").unwrap()]);
    let report = engine.collect("ACME", Source::Sec, &only_10k).await.unwrap();
    assert_eq!(report.created.len(), 1);
  }

  #[tokio::test]
  async fn unknown_ticker_and_missing_adapter() {
    let (queue, _rx) = SummaryQueue::new();
    let bare = Engine::new(Arc::new(MemoryArtifactStore::default()), Arc::new(acme_roster()), queue);
    assert!(matches!(
      bare.collect("ACME", Source::Sec, &DocumentTypeFilter::any()).await,
      Err(Error::NoAdapter(Source::Sec))
    ));

    let (engine, _rx) = engine();
    assert!(matches!(
      engine.collect("NOPE", Source::Sec, &DocumentTypeFilter::any()).await,
      Err(Error::Core(CoreError::UnknownCompany(_)))
    ));
  }

  #[tokio::test]
  async fn batch_covers_every_company_and_source() {
    let (engine, _rx) = engine();
    let batch = engine.run_batch().await.unwrap();
    // ACME and BETA, each with SEC and IR.
    assert_eq!(batch.collections.len(), 4);
    assert!(batch.failures.is_empty());
    assert_eq!(batch.created_count(), 6);
    assert_eq!(batch.summaries_enqueued, 6);
    assert_eq!(engine.index().len(), 6);

    let status = engine.status();
    assert_eq!(status.batch_state, BatchState::Idle);
    assert_eq!(status.last_batch_at, Some(batch.finished_at));
    assert_eq!(status.artifacts, 6);
    assert_eq!(status.tracked_companies, 2);

    let again = engine.run_batch().await.unwrap();
    assert_eq!(again.created_count(), 0);
    assert_eq!(again.unchanged_count(), 6);
  }

  #[tokio::test]
  async fn concurrent_batch_is_rejected() {
    let (engine, _rx) = engine();
    engine.batch_running.store(true, Ordering::SeqCst);
    assert!(matches!(engine.run_batch().await, Err(Error::BatchInProgress)));
    assert_eq!(engine.status().batch_state, BatchState::Running);
  }

  #[tokio::test]
  async fn persist_and_restore_through_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _rx) = engine();
    let engine = engine.with_snapshot_file(SnapshotFile::in_dir(dir.path()));
    let batch = engine.run_batch().await.unwrap();

    let (queue, _rx2) = SummaryQueue::new();
    let restored = Engine::new(Arc::new(MemoryArtifactStore::default()), Arc::new(acme_roster()), queue)
      .with_snapshot_file(SnapshotFile::in_dir(dir.path()));
    restored.restore().await.unwrap();

    assert_eq!(restored.index().snapshot(), engine.index().snapshot());
    assert_eq!(restored.last_batch_at(), Some(batch.finished_at));
  }

  #[tokio::test]
  async fn unreadable_snapshot_starts_empty_and_can_be_saved_again() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("index.json")).unwrap();
    std::fs::write(dir.path().join("index.json").join("x"), b"x").unwrap();
    let (engine, _rx) = engine();
    let engine = engine.with_snapshot_file(SnapshotFile::in_dir(dir.path()));

    engine.restore().await.unwrap();
    assert!(engine.index().is_empty());
    engine.run_batch().await.unwrap();
    assert!(dir.path().join("index.json").is_file());
  }

  #[tokio::test]
  async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.json"), b"garbage").unwrap();
    let (engine, _rx) = engine();
    let engine = engine.with_snapshot_file(SnapshotFile::in_dir(dir.path()));
    engine.restore().await.unwrap();
    assert!(engine.index().is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn overlapping_collects_record_each_identity_once() {
    let (engine, mut rx) = engine();
    let engine = Arc::new(engine);
    let any = DocumentTypeFilter::any();

    let (a, b) = tokio::join!(
      {
        let engine = engine.clone();
        let any = any.clone();
        tokio::spawn(async move { engine.collect("ACME", Source::Sec, &any).await })
      },
      {
        let engine = engine.clone();
        let any = any.clone();
        tokio::spawn(async move { engine.collect("ACME", Source::Sec, &any).await })
      }
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    // Two SEC candidates, each seen by both collectors.
    assert_eq!(a.created.len() + b.created.len(), 2);
    assert_eq!(a.created.len() + a.unchanged_count + b.created.len() + b.unchanged_count, 4);
    assert!(a.replaced.is_empty() && b.replaced.is_empty());
    assert_eq!(engine.index().len(), 2);

    let mut queued = 0;
    while rx.try_recv().is_some() {
      queued += 1;
    }
    assert_eq!(queued, 2);
    assert!(engine.status().active_collections.is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn collect_overlapping_a_batch_stays_idempotent() {
    let (engine, _rx) = engine();
    let engine = Arc::new(engine);

    let batch = {
      let engine = engine.clone();
      tokio::spawn(async move { engine.run_batch().await })
    };
    let single = {
      let engine = engine.clone();
      tokio::spawn(async move { engine.collect("ACME", Source::Ir, &DocumentTypeFilter::any()).await })
    };
    let batch = batch.await.unwrap().unwrap();
    let single = single.await.unwrap().unwrap();

    assert_eq!(batch.created_count() + single.created.len(), 6);
    assert_eq!(engine.index().len(), 6);

    let again = engine.run_batch().await.unwrap();
    assert_eq!(again.created_count() + again.replaced_count(), 0);
    assert_eq!(again.unchanged_count(), 6);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn snapshots_taken_during_collection_are_consistent() {
    let (engine, _rx) = engine();
    let engine = Arc::new(engine);
    let collecting = {
      let engine = engine.clone();
      tokio::spawn(async move {
        for _ in 0..20 {
          engine.run_batch().await.ok();
        }
      })
    };

    while !collecting.is_finished() {
      let snapshot = engine.index().snapshot();
      let mut identities: Vec<_> = snapshot.records.iter().map(|r| r.identity.clone()).collect();
      let count = identities.len();
      identities.sort();
      identities.dedup();
      assert_eq!(identities.len(), count);
      for record in &snapshot.records {
        assert_eq!(engine.index().get(&record.identity).unwrap().fingerprint, record.fingerprint);
      }
      tokio::task::yield_now().await;
    }
    collecting.await.unwrap();
    assert_eq!(engine.index().snapshot().records.len(), 6);
  }

  #[tokio::test]
  async fn summarize_now_binds_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _rx) = engine();
    let summarizer = Arc::new(FakeSummarizer::default());
    let engine = engine
      .with_summarizer(summarizer.clone())
      .with_snapshot_file(SnapshotFile::in_dir(dir.path()));
    let report = engine.collect("ACME", Source::Sec, &DocumentTypeFilter::any()).await.unwrap();
    let x = report.created[0].clone();

    let summary = engine.summarize_now(&x).await.unwrap();
    assert_eq!(summary.source_fingerprint, engine.index().get(&x).unwrap().fingerprint);
    assert!(engine.index().get(&x).unwrap().has_current_summary());
    assert_eq!(summarizer.calls(), 1);

    let persisted = std::fs::read_to_string(dir.path().join("index.json")).unwrap();
    assert!(persisted.contains(&summary.text));
  }

  #[tokio::test]
  async fn summarize_now_failures() {
    let (engine, _rx) = engine();
    let report = engine.collect("ACME", Source::Sec, &DocumentTypeFilter::any()).await.unwrap();
    let x = report.created[0].clone();
    assert!(matches!(engine.summarize_now(&x).await, Err(Error::NoSummarizer)));

    let engine = engine.with_summarizer(Arc::new(FakeSummarizer::unavailable()));
    assert!(matches!(
      engine.summarize_now(&x).await,
      Err(Error::Summarize(SummarizeError::Unavailable(_)))
    ));
    assert_eq!(engine.index().summary_count(), 0);

    let unknown =
      ArtifactIdentity::new("ACME", Source::Sec, DocumentType::new("10-K").unwrap(), "nope.html").unwrap();
    assert!(matches!(
      engine.summarize_now(&unknown).await,
      Err(Error::Core(CoreError::NotFound(_)))
    ));
  }
}
