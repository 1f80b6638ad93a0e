//! Write-to-temp-then-rename file replacement.

use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

/// Replace `path` with `contents` atomically.
///
/// Parent directories are created on demand. The temporary file is named
/// `.<file name>.<uuid>.tmp` in the same directory so the final rename never
/// crosses a filesystem boundary. On failure the temporary file is removed
/// and `path` is left as it was.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
  let parent = path.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(parent).await.map_err(Error::io(parent))?;

  let tmp = temp_path(parent, path);
  if let Err(e) = write_synced(&tmp, contents).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(e);
  }
  if let Err(source) = fs::rename(&tmp, path).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(Error::Io { path: path.to_path_buf(), source });
  }
  Ok(())
}

/// Replace `primary` and `secondary` as a unit.
///
/// Both files are staged and synced before either is renamed. If the second
/// rename fails, the previous `primary` (or its absence) is restored, so a
/// failed call leaves both paths as they were.
pub(crate) async fn write_pair_atomic(
  primary: &Path,
  primary_contents: &[u8],
  secondary: &Path,
  secondary_contents: &[u8],
) -> Result<()> {
  let primary_tmp = stage(primary, primary_contents).await?;
  let secondary_tmp = match stage(secondary, secondary_contents).await {
    Ok(tmp) => tmp,
    Err(e) => {
      let _ = fs::remove_file(&primary_tmp).await;
      return Err(e);
    }
  };
  let (p_tmp, s_tmp) = (&primary_tmp, &secondary_tmp);
  let discard = move || async move {
    let _ = fs::remove_file(p_tmp).await;
    let _ = fs::remove_file(s_tmp).await;
  };

  let backup = match backup(primary).await {
    Ok(backup) => backup,
    Err(e) => {
      discard().await;
      return Err(e);
    }
  };

  if let Err(source) = fs::rename(&primary_tmp, primary).await {
    discard().await;
    if let Some(backup) = &backup {
      let _ = fs::remove_file(backup).await;
    }
    return Err(Error::Io { path: primary.to_path_buf(), source });
  }

  if let Err(source) = fs::rename(&secondary_tmp, secondary).await {
    let _ = fs::remove_file(&secondary_tmp).await;
    let restored = match &backup {
      Some(backup) => fs::rename(backup, primary).await,
      None => fs::remove_file(primary).await,
    };
    if let Err(e) = restored {
      warn!(path = %primary.display(), error = %e, "could not roll back after failed write");
    }
    return Err(Error::Io { path: secondary.to_path_buf(), source });
  }

  if let Some(backup) = backup {
    let _ = fs::remove_file(&backup).await;
  }
  Ok(())
}

/// Write `contents` to a synced temporary file beside `path`.
async fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf> {
  let parent = path.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(parent).await.map_err(Error::io(parent))?;
  let tmp = temp_path(parent, path);
  if let Err(e) = write_synced(&tmp, contents).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(e);
  }
  Ok(tmp)
}

/// Keep a second name for the current `path` so it survives being renamed
/// over. `None` if there is nothing to keep.
async fn backup(path: &Path) -> Result<Option<PathBuf>> {
  if !fs::try_exists(path).await.map_err(Error::io(path))? {
    return Ok(None);
  }
  let parent = path.parent().unwrap_or(Path::new("."));
  let backup = sibling(parent, path, "bak");
  if fs::hard_link(path, &backup).await.is_err() {
    fs::copy(path, &backup).await.map_err(Error::io(path))?;
  }
  Ok(Some(backup))
}

fn temp_path(parent: &Path, path: &Path) -> PathBuf { sibling(parent, path, "tmp") }

fn sibling(parent: &Path, path: &Path, suffix: &str) -> PathBuf {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  parent.join(format!(".{name}.{}.{suffix}", Uuid::new_v4().simple()))
}

async fn write_synced(tmp: &Path, contents: &[u8]) -> Result<()> {
  let mut file = fs::File::create(tmp).await.map_err(Error::io(tmp))?;
  file.write_all(contents).await.map_err(Error::io(tmp))?;
  file.sync_all().await.map_err(Error::io(tmp))?;
  Ok(())
}
