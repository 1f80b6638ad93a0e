//! Per-run collection reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactIdentity, Source};

/// Why a single candidate was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The adapter could not produce the candidate.
  AdapterItem,
  /// The candidate did not map to a valid identity.
  InvalidIdentity,
  /// The bytes could not be written to the artifact store.
  StoreWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCandidate {
  /// Known when the failure happened after the identity was derived.
  pub identity: Option<ArtifactIdentity>,
  pub locator:  String,
  pub kind:     FailureKind,
  pub reason:   String,
}

/// Outcome of one `collect` call: what was created, replaced, left alone,
/// and what failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
  pub company:         String,
  pub source:          Source,
  pub created:         Vec<ArtifactIdentity>,
  pub replaced:        Vec<ArtifactIdentity>,
  pub unchanged_count: usize,
  pub failed:          Vec<FailedCandidate>,
  pub started_at:      DateTime<Utc>,
  pub finished_at:     DateTime<Utc>,
}

impl CollectionReport {
  pub fn new(company: &str, source: Source, started_at: DateTime<Utc>) -> Self {
    Self {
      company: company.to_owned(),
      source,
      created: Vec::new(),
      replaced: Vec::new(),
      unchanged_count: 0,
      failed: Vec::new(),
      started_at,
      finished_at: started_at,
    }
  }

  /// Identities whose content is new in this run (created or replaced).
  pub fn changed(&self) -> impl Iterator<Item = &ArtifactIdentity> {
    self.created.iter().chain(self.replaced.iter())
  }

  /// Number of candidates the run looked at.
  pub fn total(&self) -> usize {
    self.created.len() + self.replaced.len() + self.unchanged_count + self.failed.len()
  }
}
