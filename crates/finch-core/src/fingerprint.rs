//! Content fingerprints.
//!
//! A fingerprint is the lower-case hex SHA-256 digest of an artifact's raw
//! bytes. It is the sole criterion for "is this the same content I already
//! have": provenance (URL, fetch time) never participates.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of an artifact's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Fingerprint `bytes`.
  pub fn of(bytes: &[u8]) -> Self {
    let digest = Sha256::digest(bytes);
    Self(hex::encode(digest))
  }

  /// Wrap an already-computed digest string (e.g. read back from a sidecar).
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into().to_ascii_lowercase()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The first twelve hex characters, for log lines.
  pub fn short(&self) -> &str { &self.0[..self.0.len().min(12)] }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Fingerprint `bytes`. Shorthand for [`Fingerprint::of`].
pub fn fingerprint(bytes: &[u8]) -> Fingerprint { Fingerprint::of(bytes) }
