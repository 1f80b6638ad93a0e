//! Summary generation and binding.
//!
//! Collection enqueues a [`SummaryRequest`] for every created or replaced
//! artifact. A [`SummaryWorker`] drains the queue in the background: it reads
//! the bytes back from the store, asks the summarizer for a draft, and binds
//! the result to the record with [`bind_summary`]. A summary is only ever
//! attached to the exact content it was generated from; if the content moved
//! on in the meantime, the summary is discarded and a new request is queued
//! for the current content. A request whose stored bytes no longer match its
//! fingerprint is skipped without calling the summarizer.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use finch_core::{
  Error,
  artifact::{ArtifactIdentity, SummaryRecord},
  fingerprint::{Fingerprint, fingerprint},
  index::CollectionIndex,
  store::ArtifactStore,
  summarize::{SummarizeError, Summarizer},
};

// ─── Queue ───────────────────────────────────────────────────────────────────

/// Ask for a summary of `identity` as of `fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
  pub identity:    ArtifactIdentity,
  pub fingerprint: Fingerprint,
}

/// Sending half of the summary queue. Cheap to clone; enqueueing never
/// blocks.
#[derive(Debug, Clone)]
pub struct SummaryQueue {
  tx: mpsc::UnboundedSender<SummaryRequest>,
}

/// Receiving half, owned by the [`SummaryWorker`].
#[derive(Debug)]
pub struct SummaryReceiver {
  rx: mpsc::UnboundedReceiver<SummaryRequest>,
}

impl SummaryQueue {
  pub fn new() -> (Self, SummaryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, SummaryReceiver { rx })
  }

  /// Queue a request. Returns `false` if no worker is listening any more.
  pub fn enqueue(&self, request: SummaryRequest) -> bool {
    match self.tx.send(request) {
      Ok(()) => true,
      Err(e) => {
        debug!(identity = %e.0.identity, "summary queue closed; request dropped");
        false
      }
    }
  }
}

impl SummaryReceiver {
  pub async fn recv(&mut self) -> Option<SummaryRequest> { self.rx.recv().await }

  /// A request that is already queued, without waiting.
  pub fn try_recv(&mut self) -> Option<SummaryRequest> { self.rx.try_recv().ok() }
}

// ─── Binding ─────────────────────────────────────────────────────────────────

/// What happened to a summary handed to [`bind_summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
  Attached,
  /// The content changed since the summary was generated. The summary was
  /// discarded and, if `requeued`, a request for the current content queued.
  Stale { requeued: bool },
  /// The identity is no longer in the index.
  Dropped,
}

/// Attach `summary` to its record, or discard it and request a fresh one if
/// the record's content has changed since.
pub fn bind_summary(
  index: &CollectionIndex,
  queue: &SummaryQueue,
  summary: SummaryRecord,
) -> BindOutcome {
  let identity = summary.source_identity.clone();
  let stale_fingerprint = summary.source_fingerprint.clone();
  match index.attach_summary(&identity, summary) {
    Ok(()) => {
      debug!(identity = %identity, "summary attached");
      BindOutcome::Attached
    }
    Err(Error::Conflict(reason)) => {
      info!(identity = %identity, reason = %reason, "stale summary discarded");
      let requeued = index
        .current_fingerprint(&identity)
        .filter(|current| *current != stale_fingerprint)
        .is_some_and(|fingerprint| {
          queue.enqueue(SummaryRequest { identity: identity.clone(), fingerprint })
        });
      BindOutcome::Stale { requeued }
    }
    Err(e) => {
      warn!(identity = %identity, error = %e, "summary dropped");
      BindOutcome::Dropped
    }
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// What the worker did with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
  Bound(BindOutcome),
  /// The request no longer matches the indexed content.
  Superseded,
  /// The artifact disappeared from the index.
  Missing,
  /// Reading the bytes or summarizing failed; nothing was recorded.
  Failed,
}

/// Background consumer of the summary queue.
pub struct SummaryWorker<S> {
  index:      Arc<CollectionIndex>,
  store:      Arc<S>,
  summarizer: Arc<dyn Summarizer>,
  queue:      SummaryQueue,
  receiver:   SummaryReceiver,
}

impl<S: ArtifactStore> SummaryWorker<S> {
  pub fn new(
    index: Arc<CollectionIndex>,
    store: Arc<S>,
    summarizer: Arc<dyn Summarizer>,
    queue: SummaryQueue,
    receiver: SummaryReceiver,
  ) -> Self {
    Self { index, store, summarizer, queue, receiver }
  }

  /// Process requests until the queue closes or `shutdown` flips to `true`.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    info!("summary worker started");
    loop {
      tokio::select! {
        request = self.receiver.recv() => match request {
          Some(request) => { self.process(request).await; }
          None => break,
        },
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!("summary worker stopped");
  }

  /// Drain whatever is queued right now. Used by tests and one-shot runs.
  pub async fn drain(&mut self) -> Vec<WorkOutcome> {
    let mut outcomes = Vec::new();
    while let Some(request) = self.receiver.try_recv() {
      outcomes.push(self.process(request).await);
    }
    outcomes
  }

  pub async fn process(&self, request: SummaryRequest) -> WorkOutcome {
    let SummaryRequest { identity, fingerprint: requested } = request;

    match self.index.current_fingerprint(&identity) {
      None => return WorkOutcome::Missing,
      Some(current) if current != requested => {
        debug!(identity = %identity, "summary request superseded");
        return WorkOutcome::Superseded;
      }
      Some(_) => {}
    }

    let stored = match self.store.get(&identity).await {
      Ok(stored) => stored,
      Err(e) => {
        warn!(identity = %identity, error = %e, "cannot read artifact for summary");
        return WorkOutcome::Failed;
      }
    };
    // Bytes on disk may already be newer than the index. Only the requested
    // content is summarized; whoever recorded the newer bytes queues their own
    // request.
    let read_fingerprint = fingerprint(&stored.bytes);
    if read_fingerprint != requested {
      debug!(identity = %identity, "stored bytes differ from request; skipping");
      return WorkOutcome::Superseded;
    }

    let draft = match self
      .summarizer
      .summarize(&stored.bytes, identity.document_type())
      .await
    {
      Ok(draft) => draft,
      Err(SummarizeError::Unavailable(reason)) => {
        debug!(identity = %identity, reason = %reason, "summarizer unavailable");
        return WorkOutcome::Failed;
      }
      Err(e) => {
        warn!(identity = %identity, error = %e, "summarization failed");
        return WorkOutcome::Failed;
      }
    };

    let summary = SummaryRecord {
      text:               draft.text,
      key_points:         draft.key_points,
      generated_at:       Utc::now(),
      source_identity:    identity,
      source_fingerprint: read_fingerprint,
      model:              draft.model,
    };
    WorkOutcome::Bound(bind_summary(&self.index, &self.queue, summary))
  }
}
