//! [`FsArtifactStore`]: the filesystem implementation of [`ArtifactStore`].

use std::{io::ErrorKind, path::PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use finch_core::{
  artifact::ArtifactIdentity,
  store::{ArtifactMetadata, ArtifactStore, StoredArtifact},
};

use crate::{Error, Result, atomic::write_pair_atomic, layout::Layout};

/// Artifact bytes and sidecars under a single root directory.
///
/// Cloning is cheap; clones share nothing but the root path.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  layout: Layout,
}

impl FsArtifactStore {
  /// Open a store rooted at `root`. The directory is created if missing.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
    let layout = Layout::new(root);
    fs::create_dir_all(layout.root())
      .await
      .map_err(Error::io(layout.root()))?;
    Ok(Self { layout })
  }

  pub fn layout(&self) -> &Layout { &self.layout }

  async fn read_or_not_found(path: PathBuf, identity: &ArtifactIdentity) -> Result<Vec<u8>> {
    match fs::read(&path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(identity.to_string())),
      Err(source) => Err(Error::Io { path, source }),
    }
  }
}

impl ArtifactStore for FsArtifactStore {
  type Error = Error;

  async fn put(
    &self,
    identity: &ArtifactIdentity,
    bytes: Bytes,
    metadata: &ArtifactMetadata,
  ) -> Result<String> {
    let path = self.layout.bytes_path(identity);
    let sidecar = serde_json::to_vec_pretty(metadata)?;
    write_pair_atomic(&path, &bytes, &self.layout.sidecar_path(identity), &sidecar).await?;

    debug!(identity = %identity, path = %path.display(), size = bytes.len(), "artifact written");
    Ok(path.display().to_string())
  }

  async fn get(&self, identity: &ArtifactIdentity) -> Result<StoredArtifact> {
    let bytes = Self::read_or_not_found(self.layout.bytes_path(identity), identity).await?;
    let sidecar = Self::read_or_not_found(self.layout.sidecar_path(identity), identity).await?;
    let metadata: ArtifactMetadata = serde_json::from_slice(&sidecar)?;
    Ok(StoredArtifact { bytes: Bytes::from(bytes), metadata })
  }

  async fn contains(&self, identity: &ArtifactIdentity) -> Result<bool> {
    let path = self.layout.bytes_path(identity);
    fs::try_exists(&path).await.map_err(Error::io(path))
  }
}
