//! Wiring: builds the engine, its adapters and the summary worker from
//! [`Settings`].

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use finch_core::company::{CikDirectory, Roster, refresh_ciks};
use finch_ingest::{Engine, SummaryQueue, SummaryWorker};
use finch_sources::{IrAdapter, OpenAiSummarizer, SecAdapter};
use finch_store_fs::{FsArtifactStore, SnapshotFile};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::settings::Settings;

pub struct App {
  pub engine: Arc<Engine<FsArtifactStore>>,
  pub worker: SummaryWorker<FsArtifactStore>,
  pub sec:    Arc<SecAdapter>,
}

impl App {
  /// Open the store, restore the index and register the adapters.
  pub async fn build(settings: &Settings) -> anyhow::Result<Self> {
    let raw_dir = settings.raw_dir();
    let store = Arc::new(
      FsArtifactStore::open(&raw_dir)
        .await
        .with_context(|| format!("failed to open artifact store at {}", raw_dir.display()))?,
    );
    let roster = Arc::new(settings.roster()?);
    let (queue, receiver) = SummaryQueue::new();

    let summarizer = Arc::new(
      OpenAiSummarizer::new(settings.openai_config()).context("failed to build summarizer")?,
    );
    if !summarizer.is_enabled() {
      warn!("no OpenAI API key configured; summaries will not be generated");
    }

    let sec = Arc::new(SecAdapter::new(settings.sec_config()).context("failed to build SEC adapter")?);
    let mut engine = Engine::new(store.clone(), roster, queue.clone())
      .with_adapter(sec.clone())
      .with_summarizer(summarizer.clone())
      .with_snapshot_file(SnapshotFile::in_dir(&settings.data_dir));
    if settings.ir.enabled {
      let ir = IrAdapter::new(settings.ir_config()).context("failed to build IR adapter")?;
      engine = engine.with_adapter(Arc::new(ir));
    }
    engine.restore().await.context("failed to restore index")?;

    let worker = SummaryWorker::new(engine.index().clone(), store, summarizer, queue, receiver);

    Ok(Self { engine: Arc::new(engine), worker, sec })
  }
}

/// Re-fetch the ticker → CIK map every `every` until shutdown.
pub async fn cik_refresh_loop(
  roster: Arc<Roster>,
  directory: Arc<dyn CikDirectory>,
  every: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  loop {
    match refresh_ciks(&roster, directory.as_ref()).await {
      Ok(updated) => info!(updated, "CIK mapping refreshed"),
      Err(e) => warn!(error = %e, "CIK refresh failed"),
    }
    tokio::select! {
      _ = tokio::time::sleep(every) => {}
      _ = shutdown.changed() => break,
    }
  }
}
