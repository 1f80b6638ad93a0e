//! Mapping from artifact identity to filesystem location.

use std::path::{Path, PathBuf};

use finch_core::artifact::ArtifactIdentity;

const SIDECAR_SUFFIX: &str = ".meta.json";

/// `<root>/<TICKER>/<source>/<document_type>/<relative_path>`, with the
/// metadata sidecar at `<that path>.meta.json`.
///
/// Identities are validated on construction (no `..`, no absolute paths), so
/// every location stays below `root`.
#[derive(Debug, Clone)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn bytes_path(&self, identity: &ArtifactIdentity) -> PathBuf {
    let mut path = self.root.clone();
    path.extend(identity.segments());
    path
  }

  pub fn sidecar_path(&self, identity: &ArtifactIdentity) -> PathBuf {
    let mut path = self.bytes_path(identity).into_os_string();
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
  }
}

#[cfg(test)]
mod tests {
  use finch_core::artifact::{DocumentType, Source};

  use super::*;

  #[test]
  fn paths_follow_identity_segments() {
    let layout = Layout::new("/data/raw");
    let id = ArtifactIdentity::new(
      "acme",
      Source::Sec,
      DocumentType::new("10-K").unwrap(),
      "000123/acme-10k.htm",
    )
    .unwrap();
    assert_eq!(
      layout.bytes_path(&id),
      PathBuf::from("/data/raw/ACME/sec/10-K/000123/acme-10k.htm")
    );
    assert_eq!(
      layout.sidecar_path(&id),
      PathBuf::from("/data/raw/ACME/sec/10-K/000123/acme-10k.htm.meta.json")
    );
  }
}
