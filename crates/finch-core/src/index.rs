//! The collection index, the authoritative registry of every known artifact.
//!
//! One [`CollectionIndex`] is constructed per process (empty or from a
//! snapshot) and shared by reference with the coordinator, the scheduler and
//! the API. Every operation takes the internal lock for the duration of an
//! in-memory map operation only; callers must never perform I/O while holding
//! a guard, and no guard is ever exposed.
//!
//! Records keep their insertion order; [`CollectionIndex::list`] sorts by
//! `fetched_at` with identity as the tie-breaker, so listings are
//! deterministic.

use std::{
  collections::HashMap,
  sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  artifact::{ArtifactIdentity, ArtifactRecord, DocumentType, Source, SummaryRecord},
  fingerprint::Fingerprint,
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// The result of reconciling content against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// The identity was not known.
  Created,
  /// The identity is known with the same fingerprint; nothing changed.
  Unchanged,
  /// The identity is known with a different fingerprint; the record was
  /// replaced and any summary dropped.
  Replaced,
}

impl UpsertOutcome {
  /// Whether this outcome requires the bytes to be (re)written.
  pub fn is_new_content(&self) -> bool { !matches!(self, Self::Unchanged) }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Parameters for [`CollectionIndex::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListFilter {
  pub ticker:        Option<String>,
  pub source:        Option<Source>,
  pub document_type: Option<DocumentType>,
}

impl ListFilter {
  pub fn company(ticker: &str) -> Self {
    Self { ticker: Some(ticker.to_owned()), ..Self::default() }
  }

  pub fn with_source(mut self, source: Source) -> Self {
    self.source = Some(source);
    self
  }

  pub fn with_document_type(mut self, document_type: DocumentType) -> Self {
    self.document_type = Some(document_type);
    self
  }

  fn matches(&self, id: &ArtifactIdentity) -> bool {
    self
      .ticker
      .as_deref()
      .is_none_or(|t| t.eq_ignore_ascii_case(id.ticker()))
      && self.source.is_none_or(|s| s == id.source())
      && self.document_type.as_ref().is_none_or(|d| d == id.document_type())
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Serialisable point-in-time copy of the index, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
  #[serde(default)]
  pub records: Vec<ArtifactRecord>,
}

// ─── Index ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Table {
  records:   Vec<ArtifactRecord>,
  positions: HashMap<ArtifactIdentity, usize>,
}

impl Table {
  fn from_records(records: Vec<ArtifactRecord>) -> Self {
    let mut table = Table::default();
    for record in records {
      match table.positions.get(&record.identity) {
        Some(&pos) => table.records[pos] = record,
        None => {
          table.positions.insert(record.identity.clone(), table.records.len());
          table.records.push(record);
        }
      }
    }
    table
  }

  fn find(&self, id: &ArtifactIdentity) -> Option<&ArtifactRecord> {
    self.positions.get(id).map(|&pos| &self.records[pos])
  }

  fn find_mut(&mut self, id: &ArtifactIdentity) -> Option<&mut ArtifactRecord> {
    self.positions.get(id).map(|&pos| &mut self.records[pos])
  }
}

/// In-memory registry of [`ArtifactRecord`]s keyed by [`ArtifactIdentity`].
#[derive(Debug, Default)]
pub struct CollectionIndex {
  table: RwLock<Table>,
}

impl CollectionIndex {
  /// An empty index.
  pub fn new() -> Self { Self::default() }

  /// An index populated from a snapshot.
  pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
    Self { table: RwLock::new(Table::from_records(snapshot.records)) }
  }

  /// Report what [`upsert`](Self::upsert) would return for this content,
  /// without mutating anything.
  pub fn classify(&self, id: &ArtifactIdentity, fingerprint: &Fingerprint) -> UpsertOutcome {
    match self.read().find(id) {
      None => UpsertOutcome::Created,
      Some(existing) if &existing.fingerprint == fingerprint => UpsertOutcome::Unchanged,
      Some(_) => UpsertOutcome::Replaced,
    }
  }

  /// Insert or replace a record.
  ///
  /// - unknown identity → inserted, [`UpsertOutcome::Created`];
  /// - same fingerprint → untouched, [`UpsertOutcome::Unchanged`];
  /// - different fingerprint → replaced in place, prior summary dropped,
  ///   [`UpsertOutcome::Replaced`].
  ///
  /// A summary carried by `record` is kept only if it matches the record's
  /// own fingerprint.
  pub fn upsert(&self, mut record: ArtifactRecord) -> UpsertOutcome {
    if !record.has_current_summary() {
      record.summary = None;
    }

    let mut table = self.write();
    match table.find_mut(&record.identity) {
      Some(existing) if existing.fingerprint == record.fingerprint => UpsertOutcome::Unchanged,
      Some(existing) => {
        *existing = record;
        UpsertOutcome::Replaced
      }
      None => {
        let pos = table.records.len();
        table.positions.insert(record.identity.clone(), pos);
        table.records.push(record);
        UpsertOutcome::Created
      }
    }
  }

  pub fn get(&self, id: &ArtifactIdentity) -> Result<ArtifactRecord> {
    self
      .read()
      .find(id)
      .cloned()
      .ok_or_else(|| Error::NotFound(id.to_string()))
  }

  /// The fingerprint currently recorded for `id`, if any.
  pub fn current_fingerprint(&self, id: &ArtifactIdentity) -> Option<Fingerprint> {
    self.read().find(id).map(|r| r.fingerprint.clone())
  }

  /// Records matching `filter`, oldest `fetched_at` first.
  pub fn list(&self, filter: &ListFilter) -> Vec<ArtifactRecord> {
    let mut out: Vec<ArtifactRecord> = self
      .read()
      .records
      .iter()
      .filter(|r| filter.matches(&r.identity))
      .cloned()
      .collect();
    out.sort_by(|a, b| {
      a.fetched_at
        .cmp(&b.fetched_at)
        .then_with(|| a.identity.cmp(&b.identity))
    });
    out
  }

  /// Bind a summary to the record it was generated for.
  ///
  /// Fails with [`Error::NotFound`] for an unknown identity and with
  /// [`Error::Conflict`] when the summary was generated for other content
  /// (the record's fingerprint moved on, or the summary names another
  /// identity).
  pub fn attach_summary(&self, id: &ArtifactIdentity, summary: SummaryRecord) -> Result<()> {
    let mut table = self.write();
    let record = table
      .find_mut(id)
      .ok_or_else(|| Error::NotFound(id.to_string()))?;

    if &summary.source_identity != id {
      return Err(Error::Conflict(format!(
        "summary for {} cannot be attached to {id}",
        summary.source_identity
      )));
    }
    if summary.source_fingerprint != record.fingerprint {
      return Err(Error::Conflict(format!(
        "summary of {id} describes content {} but current content is {}",
        summary.source_fingerprint.short(),
        record.fingerprint.short()
      )));
    }

    record.summary = Some(summary);
    Ok(())
  }

  /// A consistent point-in-time copy of every record.
  pub fn snapshot(&self) -> IndexSnapshot {
    IndexSnapshot { records: self.read().records.clone() }
  }

  /// Replace the whole contents with `snapshot`. Duplicate identities in the
  /// snapshot resolve to the last occurrence.
  pub fn restore(&self, snapshot: IndexSnapshot) {
    *self.write() = Table::from_records(snapshot.records);
  }

  pub fn len(&self) -> usize { self.read().records.len() }

  pub fn is_empty(&self) -> bool { self.read().records.is_empty() }

  /// Number of records carrying a summary of their current content.
  pub fn summary_count(&self) -> usize {
    self
      .read()
      .records
      .iter()
      .filter(|r| r.has_current_summary())
      .count()
  }

  fn read(&self) -> RwLockReadGuard<'_, Table> {
    self.table.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Table> {
    self.table.write().unwrap_or_else(PoisonError::into_inner)
  }
}
