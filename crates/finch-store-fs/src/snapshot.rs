//! Durable index snapshots.
//!
//! The whole index is written as one JSON document, `index.json`:
//!
//! ```json
//! { "format_version": 1, "saved_at": "...", "last_batch_at": null, "records": [...] }
//! ```
//!
//! Unknown fields are ignored on load. A file that cannot be read or parsed
//! is moved aside to `index.json.corrupt-<timestamp>` so that a fresh index
//! can start without destroying the evidence.

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info, warn};

use finch_core::{artifact::ArtifactRecord, index::IndexSnapshot};

use crate::{Error, Result, atomic::write_atomic};

pub const SNAPSHOT_FILE_NAME: &str = "index.json";
pub const FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 { FORMAT_VERSION }

/// On-disk form of the collection index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIndex {
  #[serde(default = "default_format_version")]
  pub format_version: u32,
  pub saved_at:       DateTime<Utc>,
  #[serde(default)]
  pub last_batch_at:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub records:        Vec<ArtifactRecord>,
}

impl PersistedIndex {
  pub fn new(snapshot: IndexSnapshot, last_batch_at: Option<DateTime<Utc>>) -> Self {
    Self {
      format_version: FORMAT_VERSION,
      saved_at: Utc::now(),
      last_batch_at,
      records: snapshot.records,
    }
  }

  pub fn into_snapshot(self) -> IndexSnapshot { IndexSnapshot { records: self.records } }
}

/// What [`SnapshotFile::load`] found.
#[derive(Debug)]
pub enum LoadedSnapshot {
  /// No snapshot has been written yet.
  Missing,
  Restored(PersistedIndex),
  /// The file was unreadable and has been moved to `moved_to`.
  Quarantined { moved_to: PathBuf, reason: String },
  /// The file could not be read and could not be moved aside either.
  Unreadable { reason: String },
}

/// The snapshot file of one data directory.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
  path: PathBuf,
}

impl SnapshotFile {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  /// `<data_dir>/index.json`.
  pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
    Self::new(data_dir.as_ref().join(SNAPSHOT_FILE_NAME))
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Read the snapshot, quarantining it if it cannot be read or parsed.
  pub async fn load(&self) -> Result<LoadedSnapshot> {
    let raw = match fs::read(&self.path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadedSnapshot::Missing),
      Err(source) => {
        let reason = Error::Io { path: self.path.clone(), source }.to_string();
        return Ok(self.set_aside(reason).await);
      }
    };

    match serde_json::from_slice::<PersistedIndex>(&raw) {
      Ok(persisted) => {
        if persisted.format_version > FORMAT_VERSION {
          warn!(
            path = %self.path.display(),
            found = persisted.format_version,
            supported = FORMAT_VERSION,
            "snapshot written by a newer version; reading known fields only"
          );
        }
        info!(
          path = %self.path.display(),
          records = persisted.records.len(),
          "index snapshot loaded"
        );
        Ok(LoadedSnapshot::Restored(persisted))
      }
      Err(e) => {
        let reason = finch_core::Error::SnapshotCorrupt(e.to_string()).to_string();
        Ok(self.set_aside(reason).await)
      }
    }
  }

  /// Move an unusable snapshot out of the way. Never fails: the caller starts
  /// with an empty index either way.
  async fn set_aside(&self, reason: String) -> LoadedSnapshot {
    match self.quarantine().await {
      Ok(moved_to) => {
        error!(
          path = %self.path.display(),
          moved_to = %moved_to.display(),
          error = %reason,
          "index snapshot unreadable; starting with an empty index"
        );
        LoadedSnapshot::Quarantined { moved_to, reason }
      }
      Err(e) => {
        error!(
          path = %self.path.display(),
          error = %reason,
          quarantine_error = %e,
          "index snapshot unreadable and could not be moved aside; starting with an empty index"
        );
        LoadedSnapshot::Unreadable { reason }
      }
    }
  }

  /// Atomically replace the snapshot file.
  pub async fn save(&self, persisted: &PersistedIndex) -> Result<()> {
    let body = serde_json::to_vec_pretty(persisted)?;
    write_atomic(&self.path, &body).await?;
    info!(
      path = %self.path.display(),
      records = persisted.records.len(),
      "index snapshot saved"
    );
    Ok(())
  }

  async fn quarantine(&self) -> Result<PathBuf> {
    let mut name = self.path.clone().into_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
    let moved_to = PathBuf::from(name);
    fs::rename(&self.path, &moved_to)
      .await
      .map_err(Error::io(&self.path))?;
    Ok(moved_to)
  }
}
