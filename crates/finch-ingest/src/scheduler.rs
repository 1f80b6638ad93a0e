//! Timer-driven batch collection.
//!
//! [`SchedulerDriver::start`] spawns a task that sleeps until the next
//! configured daily time (UTC), runs a batch, and repeats until
//! [`SchedulerHandle::stop`] is called.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use finch_core::{artifact::Source, report::CollectionReport, store::ArtifactStore};

use crate::{Engine, Error};

// ─── Schedule ────────────────────────────────────────────────────────────────

/// A time of day, in UTC, at which the daily batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
  time: NaiveTime,
}

impl Default for DailySchedule {
  fn default() -> Self {
    Self { time: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN) }
  }
}

impl DailySchedule {
  /// Parse `HH:MM` (24-hour clock). Returns `None` for anything else.
  pub fn parse(value: &str) -> Option<Self> {
    let (h, m) = value.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
      return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
  }

  /// Parse `value`, falling back to `02:00` with a warning.
  pub fn parse_or_default(value: &str) -> Self {
    Self::parse(value).unwrap_or_else(|| {
      let fallback = Self::default();
      warn!(value, %fallback, "invalid daily schedule time; using default");
      fallback
    })
  }

  /// The first scheduled instant strictly after `now`.
  pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(self.time).and_utc();
    if today > now {
      return today;
    }
    now
      .date_naive()
      .checked_add_days(Days::new(1))
      .map(|d| d.and_time(self.time).and_utc())
      .unwrap_or(today)
  }
}

impl fmt::Display for DailySchedule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.time.format("%H:%M"))
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// A company/source pair whose collection could not run at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyFailure {
  pub ticker: String,
  pub source: Source,
  pub error:  String,
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
  pub started_at:         DateTime<Utc>,
  pub finished_at:        DateTime<Utc>,
  pub collections:        Vec<CollectionReport>,
  pub failures:           Vec<CompanyFailure>,
  pub summaries_enqueued: usize,
}

impl BatchReport {
  pub fn new(started_at: DateTime<Utc>) -> Self {
    Self {
      started_at,
      finished_at: started_at,
      collections: Vec::new(),
      failures: Vec::new(),
      summaries_enqueued: 0,
    }
  }

  pub fn created_count(&self) -> usize { self.collections.iter().map(|c| c.created.len()).sum() }

  pub fn replaced_count(&self) -> usize { self.collections.iter().map(|c| c.replaced.len()).sum() }

  pub fn unchanged_count(&self) -> usize { self.collections.iter().map(|c| c.unchanged_count).sum() }

  /// Candidates that failed inside otherwise successful collections.
  pub fn failed_item_count(&self) -> usize { self.collections.iter().map(|c| c.failed.len()).sum() }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
  pub daily:          DailySchedule,
  /// Also run one batch as soon as the scheduler starts.
  pub run_on_startup: bool,
}

pub struct SchedulerDriver<S> {
  engine: Arc<Engine<S>>,
  config: SchedulerConfig,
}

impl<S: ArtifactStore> SchedulerDriver<S> {
  pub fn new(engine: Arc<Engine<S>>, config: SchedulerConfig) -> Self { Self { engine, config } }

  /// Run one batch now. Returns `None` if a batch was already running or the
  /// batch could not start.
  pub async fn tick(&self) -> Option<BatchReport> {
    match self.engine.run_batch().await {
      Ok(report) => Some(report),
      Err(Error::BatchInProgress) => {
        info!("batch already running; skipping scheduled run");
        None
      }
      Err(e) => {
        error!(error = %e, "scheduled batch failed");
        None
      }
    }
  }

  /// Spawn the timer loop.
  pub fn start(self) -> SchedulerHandle {
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(self.run(rx));
    SchedulerHandle { shutdown, task }
  }

  async fn run(self, mut shutdown: watch::Receiver<bool>) {
    info!(daily = %self.config.daily, run_on_startup = self.config.run_on_startup, "scheduler started");

    let mut due_now = self.config.run_on_startup;
    loop {
      if !due_now {
        let next = self.config.daily.next_after(Utc::now());
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(next = %next, "next batch scheduled");
        tokio::select! {
          _ = tokio::time::sleep(wait) => {}
          _ = shutdown.changed() => break,
        }
      }
      due_now = false;

      tokio::select! {
        _ = self.tick() => {}
        _ = shutdown.changed() => {
          warn!("shutdown requested during batch; abandoning it");
          break;
        }
      }
      if *shutdown.borrow() {
        break;
      }
    }

    if let Err(e) = self.engine.persist().await {
      error!(error = %e, "final snapshot failed");
    }
    info!("scheduler stopped");
  }
}

/// Controls a running scheduler task.
pub struct SchedulerHandle {
  shutdown: watch::Sender<bool>,
  task:     JoinHandle<()>,
}

impl SchedulerHandle {
  /// Signal shutdown and wait for the task to flush its final snapshot.
  pub async fn stop(self) {
    let _ = self.shutdown.send(true);
    if let Err(e) = self.task.await {
      error!(error = %e, "scheduler task panicked");
    }
  }
}
