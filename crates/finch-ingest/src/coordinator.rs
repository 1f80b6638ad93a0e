//! The ingestion coordinator: reconciles an adapter's candidates against the
//! collection index and the artifact store.
//!
//! For every candidate, in stream order:
//!
//! 1. drop candidates whose document type the filter excludes;
//! 2. fingerprint the bytes and derive the identity;
//! 3. classify against the index (index lock held only for the lookup);
//! 4. if new or changed, write bytes and sidecar to the store with no index
//!    lock held;
//! 5. upsert the record into the index and note the outcome.
//!
//! Steps 3 to 5 run under a per-identity async lock, so two collectors that
//! fetch different content for one identity cannot leave the store holding
//! one version and the index the other. Different identities proceed in
//! parallel. The index is only ever updated after a successful store write,
//! so a crash can leave unreferenced bytes on disk but never a record without
//! bytes. Failures are confined to the candidate that caused them.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use finch_core::{
  Result,
  artifact::{ArtifactIdentity, ArtifactRecord, Source},
  company::{CompanyRecord, Roster},
  fingerprint::{Fingerprint, fingerprint},
  index::{CollectionIndex, UpsertOutcome},
  report::{CollectionReport, FailedCandidate, FailureKind},
  source::{Candidate, DocumentTypeFilter, SourceAdapter},
  store::{ArtifactMetadata, ArtifactStore},
};

// ─── Identity locks ──────────────────────────────────────────────────────────

/// One async lock per identity currently being written. Entries are removed
/// once nobody holds or waits for them.
#[derive(Debug, Default)]
struct IdentityLocks {
  slots: Mutex<HashMap<ArtifactIdentity, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
  fn slot(&self, identity: &ArtifactIdentity) -> Arc<AsyncMutex<()>> {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots.entry(identity.clone()).or_default().clone()
  }

  fn release(&self, identity: &ArtifactIdentity, slot: Arc<AsyncMutex<()>>) {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    drop(slot);
    if slots.get(identity).is_some_and(|s| Arc::strong_count(s) == 1) {
      slots.remove(identity);
    }
  }

  #[cfg(test)]
  fn len(&self) -> usize { self.slots.lock().unwrap_or_else(PoisonError::into_inner).len() }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct Coordinator<S> {
  index:  Arc<CollectionIndex>,
  store:  Arc<S>,
  roster: Arc<Roster>,
  locks:  Arc<IdentityLocks>,
}

impl<S> Clone for Coordinator<S> {
  fn clone(&self) -> Self {
    Self {
      index:  self.index.clone(),
      store:  self.store.clone(),
      roster: self.roster.clone(),
      locks:  self.locks.clone(),
    }
  }
}

impl<S: ArtifactStore> Coordinator<S> {
  pub fn new(index: Arc<CollectionIndex>, store: Arc<S>, roster: Arc<Roster>) -> Self {
    Self { index, store, roster, locks: Arc::default() }
  }

  /// Pull every candidate `adapter` produces for `ticker` and record it.
  ///
  /// Fails only with [`finch_core::Error::UnknownCompany`], before the
  /// adapter is consulted; everything else ends up in the report.
  pub async fn collect(
    &self,
    ticker: &str,
    adapter: &dyn SourceAdapter,
    filter: &DocumentTypeFilter,
  ) -> Result<CollectionReport> {
    let company = self.roster.get(ticker)?;
    let source = adapter.source();
    let mut report = CollectionReport::new(&company.ticker, source, Utc::now());
    debug!(ticker = %company.ticker, source = %source, "collection started");

    let mut candidates = adapter.candidates(&company, filter);
    while let Some(item) = candidates.next().await {
      match item {
        Ok(candidate) if !filter.allows(&candidate.document_type) => {
          debug!(
            ticker = %company.ticker,
            document_type = %candidate.document_type,
            path = %candidate.relative_path,
            "candidate outside filter; skipped"
          );
        }
        Ok(candidate) => self.reconcile(&company, source, candidate, &mut report).await,
        Err(e) => {
          warn!(ticker = %company.ticker, source = %source, error = %e, "candidate failed");
          report.failed.push(FailedCandidate {
            identity: None,
            locator:  e.locator,
            kind:     FailureKind::AdapterItem,
            reason:   e.reason,
          });
        }
      }
    }

    report.finished_at = Utc::now();
    info!(
      ticker = %company.ticker,
      source = %source,
      created = report.created.len(),
      replaced = report.replaced.len(),
      unchanged = report.unchanged_count,
      failed = report.failed.len(),
      "collection finished"
    );
    Ok(report)
  }

  async fn reconcile(
    &self,
    company: &CompanyRecord,
    source: Source,
    candidate: Candidate,
    report: &mut CollectionReport,
  ) {
    let locator = candidate
      .origin_url
      .clone()
      .unwrap_or_else(|| candidate.relative_path.clone());
    let fp = fingerprint(&candidate.bytes);

    let identity = match ArtifactIdentity::new(
      &company.ticker,
      source,
      candidate.document_type.clone(),
      &candidate.relative_path,
    ) {
      Ok(identity) => identity,
      Err(e) => {
        warn!(locator = %locator, error = %e, "candidate has no valid identity");
        report.failed.push(FailedCandidate {
          identity: None,
          locator,
          kind: FailureKind::InvalidIdentity,
          reason: e.to_string(),
        });
        return;
      }
    };

    let slot = self.locks.slot(&identity);
    let guard = slot.lock().await;
    self.record(identity.clone(), fp, locator, candidate, report).await;
    drop(guard);
    self.locks.release(&identity, slot);
  }

  /// Classify, store and upsert one candidate. Caller holds the identity's
  /// lock.
  async fn record(
    &self,
    identity: ArtifactIdentity,
    fp: Fingerprint,
    locator: String,
    candidate: Candidate,
    report: &mut CollectionReport,
  ) {
    if self.index.classify(&identity, &fp) == UpsertOutcome::Unchanged {
      debug!(identity = %identity, "unchanged");
      report.unchanged_count += 1;
      return;
    }

    let fetched_at = Utc::now();
    let size_bytes = candidate.bytes.len() as u64;
    let metadata = ArtifactMetadata {
      identity: identity.clone(),
      fingerprint: fp.clone(),
      origin_url: candidate.origin_url.clone(),
      fetched_at,
      size_bytes,
      content_type: candidate.content_type.clone(),
    };

    let storage_path = match self.store.put(&identity, candidate.bytes, &metadata).await {
      Ok(path) => path,
      Err(e) => {
        warn!(identity = %identity, error = %e, "store write failed");
        report.failed.push(FailedCandidate {
          identity: Some(identity),
          locator,
          kind: FailureKind::StoreWrite,
          reason: e.to_string(),
        });
        return;
      }
    };

    let record = ArtifactRecord {
      identity: identity.clone(),
      fingerprint: fp,
      origin_url: candidate.origin_url,
      fetched_at,
      storage_path,
      size_bytes,
      summary: None,
    };
    match self.index.upsert(record) {
      UpsertOutcome::Created => {
        debug!(identity = %identity, "created");
        report.created.push(identity);
      }
      UpsertOutcome::Replaced => {
        debug!(identity = %identity, "replaced");
        report.replaced.push(identity);
      }
      // Another collector recorded the same content first.
      UpsertOutcome::Unchanged => report.unchanged_count += 1,
    }
  }
}

#[cfg(test)]
mod tests {
  use finch_core::{
    Error,
    artifact::DocumentType,
    index::ListFilter,
    store::ArtifactStore as _,
  };

  use super::*;
  use crate::testing::{MemoryArtifactStore, ScriptedAdapter, acme_roster, candidate};

  fn coordinator() -> (Coordinator<MemoryArtifactStore>, Arc<CollectionIndex>, Arc<MemoryArtifactStore>) {
    let index = Arc::new(CollectionIndex::new());
    let store = Arc::new(MemoryArtifactStore::default());
    let c = Coordinator::new(index.clone(), store.clone(), Arc::new(acme_roster()));
    (c, index, store)
  }

  fn doc(t: &str) -> DocumentType { DocumentType::new(t).unwrap() }

  #[tokio::test]
  async fn acme_scenario() {
    let (c, index, store) = coordinator();
    let all = DocumentTypeFilter::any();

    // Run 1: two new filings.
    let adapter = ScriptedAdapter::new(Source::Sec)
      .with(candidate("10-K", "x.html", b"annual v1"))
      .with(candidate("10-Q", "y.html", b"quarterly v1"));
    let r1 = c.collect("ACME", &adapter, &all).await.unwrap();
    assert_eq!(r1.created.len(), 2);
    assert!(r1.replaced.is_empty());
    assert_eq!(r1.unchanged_count, 0);
    assert_eq!(store.write_count(), 2);

    // Run 2: same bytes.
    let r2 = c.collect("ACME", &adapter, &all).await.unwrap();
    assert!(r2.created.is_empty());
    assert!(r2.replaced.is_empty());
    assert_eq!(r2.unchanged_count, 2);
    assert_eq!(store.write_count(), 2);

    // Run 3: x.html changed.
    let adapter = ScriptedAdapter::new(Source::Sec)
      .with(candidate("10-K", "x.html", b"annual v2"))
      .with(candidate("10-Q", "y.html", b"quarterly v1"));
    let r3 = c.collect("ACME", &adapter, &all).await.unwrap();
    assert!(r3.created.is_empty());
    assert_eq!(r3.replaced.len(), 1);
    assert_eq!(r3.replaced[0].relative_path(), "x.html");
    assert_eq!(r3.unchanged_count, 1);

    let x = &r3.replaced[0];
    assert_eq!(index.get(x).unwrap().fingerprint, fingerprint(b"annual v2"));
    assert_eq!(&store.get(x).await.unwrap().bytes[..], b"annual v2");
    assert_eq!(index.len(), 2);
  }

  #[tokio::test]
  async fn one_failing_item_does_not_stop_the_rest() {
    let (c, index, _) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Ir)
      .with(candidate("Presentation", "a.pdf", b"a"))
      .with(candidate("Presentation", "b.pdf", b"b"))
      .with_failure("https://ir.acme.com/c.pdf", "HTTP 500")
      .with(candidate("Presentation", "d.pdf", b"d"))
      .with(candidate("Presentation", "e.pdf", b"e"));

    let report = c.collect("ACME", &adapter, &DocumentTypeFilter::any()).await.unwrap();
    assert_eq!(report.created.len(), 4);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::AdapterItem);
    assert_eq!(report.failed[0].locator, "https://ir.acme.com/c.pdf");
    assert_eq!(report.total(), 5);
    assert_eq!(index.len(), 4);
  }

  #[tokio::test]
  async fn store_failure_leaves_index_untouched() {
    let (c, index, store) = coordinator();
    store.fail_writes_to("broken.html");
    let adapter = ScriptedAdapter::new(Source::Sec)
      .with(candidate("10-K", "broken.html", b"x"))
      .with(candidate("10-K", "fine.html", b"y"));

    let report = c.collect("ACME", &adapter, &DocumentTypeFilter::any()).await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::StoreWrite);
    let broken = report.failed[0].identity.clone().unwrap();
    assert!(index.get(&broken).unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn invalid_identity_is_reported() {
    let (c, index, _) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "../escape.html", b"x"));
    let report = c.collect("ACME", &adapter, &DocumentTypeFilter::any()).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::InvalidIdentity);
    assert!(index.is_empty());
  }

  #[tokio::test]
  async fn unknown_ticker_fails_before_the_adapter_runs() {
    let (c, index, store) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", b"x"));
    let err = c
      .collect("DOESNOTEXIST", &adapter, &DocumentTypeFilter::any())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::UnknownCompany(_)));
    assert_eq!(adapter.calls(), 0);
    assert!(index.is_empty());
    assert_eq!(store.write_count(), 0);
  }

  #[tokio::test]
  async fn empty_adapter_gives_empty_report() {
    let (c, _, _) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Sec);
    let report = c.collect("acme", &adapter, &DocumentTypeFilter::any()).await.unwrap();
    assert_eq!(report.company, "ACME");
    assert_eq!(report.total(), 0);
    assert!(report.finished_at >= report.started_at);
  }

  #[tokio::test]
  async fn duplicates_within_a_run_see_earlier_candidates() {
    let (c, _, store) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Sec)
      .with(candidate("10-K", "x.html", b"v1"))
      .with(candidate("10-K", "x.html", b"v1"))
      .with(candidate("10-K", "x.html", b"v2"));
    let report = c.collect("ACME", &adapter, &DocumentTypeFilter::any()).await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.unchanged_count, 1);
    assert_eq!(report.replaced.len(), 1);
    assert_eq!(store.write_count(), 2);
  }

  #[tokio::test]
  async fn sources_are_disjoint_namespaces() {
    let (c, index, _) = coordinator();
    let all = DocumentTypeFilter::any();
    let sec = ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", b"same"));
    let ir = ScriptedAdapter::new(Source::Ir).with(candidate("10-K", "x.html", b"same"));
    c.collect("ACME", &sec, &all).await.unwrap();
    let report = c.collect("ACME", &ir, &all).await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(index.list(&ListFilter::company("ACME")).len(), 2);
    assert_eq!(
      index
        .list(&ListFilter::company("ACME").with_document_type(doc("10-K")).with_source(Source::Ir))
        .len(),
      1
    );
  }

  #[tokio::test]
  async fn filter_is_enforced_even_if_the_adapter_ignores_it() {
    let (c, index, store) = coordinator();
    let adapter = ScriptedAdapter::new(Source::Sec)
      .ignoring_filter()
      .with(candidate("10-K", "x.html", b"annual"))
      .with(candidate("8-K", "y.html", b"current"));

    let report = c
      .collect("ACME", &adapter, &DocumentTypeFilter::only([doc("10-K")]))
      .await
      .unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].document_type(), &doc("10-K"));
    assert_eq!(report.total(), 1);
    assert_eq!(index.len(), 1);
    assert_eq!(store.write_count(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn racing_collectors_keep_store_and_index_in_step() {
    let (c, index, store) = coordinator();
    let x = ArtifactIdentity::new("ACME", Source::Sec, doc("10-K"), "x.html").unwrap();

    for round in 0..50 {
      let a = Arc::new(
        ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", format!("a{round}").as_bytes())),
      );
      let b = Arc::new(
        ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", format!("b{round}").as_bytes())),
      );
      let (ca, cb) = (c.clone(), c.clone());
      let ta = tokio::spawn(async move { ca.collect("ACME", a.as_ref(), &DocumentTypeFilter::any()).await });
      let tb = tokio::spawn(async move { cb.collect("ACME", b.as_ref(), &DocumentTypeFilter::any()).await });
      let (ra, rb) = (ta.await.unwrap().unwrap(), tb.await.unwrap().unwrap());

      assert!(ra.failed.is_empty() && rb.failed.is_empty());
      let stored = store.get(&x).await.unwrap();
      assert_eq!(index.get(&x).unwrap().fingerprint, fingerprint(&stored.bytes), "round {round}");
      assert_eq!(stored.metadata.fingerprint, fingerprint(&stored.bytes));
    }
    assert_eq!(index.len(), 1);
    assert_eq!(c.locks.len(), 0);
  }

  #[tokio::test]
  async fn failed_sidecar_write_keeps_bytes_and_index_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(finch_store_fs::FsArtifactStore::open(dir.path()).await.unwrap());
    let index = Arc::new(CollectionIndex::new());
    let c = Coordinator::new(index.clone(), store.clone(), Arc::new(acme_roster()));
    let all = DocumentTypeFilter::any();

    let v1 = ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", b"v1"));
    let first = c.collect("ACME", &v1, &all).await.unwrap();
    let x = first.created[0].clone();

    let sidecar = store.layout().sidecar_path(&x);
    std::fs::remove_file(&sidecar).unwrap();
    std::fs::create_dir(&sidecar).unwrap();
    std::fs::write(sidecar.join("blocker"), b"x").unwrap();

    let v2 = ScriptedAdapter::new(Source::Sec).with(candidate("10-K", "x.html", b"v2"));
    let report = c.collect("ACME", &v2, &all).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::StoreWrite);
    assert_eq!(index.get(&x).unwrap().fingerprint, fingerprint(b"v1"));
    assert_eq!(std::fs::read(store.layout().bytes_path(&x)).unwrap(), b"v1");
  }
}
