//! Integration tests for `FsArtifactStore` and `SnapshotFile` against a
//! scratch directory.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use finch_core::{
  artifact::{ArtifactIdentity, ArtifactRecord, DocumentType, Source},
  fingerprint::fingerprint,
  index::{CollectionIndex, IndexSnapshot},
  store::{ArtifactMetadata, ArtifactStore},
};
use tempfile::TempDir;

use crate::{FsArtifactStore, LoadedSnapshot, PersistedIndex, SnapshotFile};

async fn store() -> (TempDir, FsArtifactStore) {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = FsArtifactStore::open(dir.path().join("raw"))
    .await
    .expect("open store");
  (dir, store)
}

fn identity(path: &str) -> ArtifactIdentity {
  ArtifactIdentity::new("ACME", Source::Sec, DocumentType::new("10-K").unwrap(), path).unwrap()
}

fn metadata(id: &ArtifactIdentity, bytes: &[u8]) -> ArtifactMetadata {
  ArtifactMetadata {
    identity:     id.clone(),
    fingerprint:  fingerprint(bytes),
    origin_url:   Some("https://www.sec.gov/Archives/x".into()),
    fetched_at:   Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
    size_bytes:   bytes.len() as u64,
    content_type: Some("text/html".into()),
  }
}

fn record(id: &ArtifactIdentity, bytes: &[u8]) -> ArtifactRecord {
  ArtifactRecord {
    identity:     id.clone(),
    fingerprint:  fingerprint(bytes),
    origin_url:   None,
    fetched_at:   Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
    storage_path: format!("raw/{id}"),
    size_bytes:   bytes.len() as u64,
    summary:      None,
  }
}

// ─── Artifact store ──────────────────────────────────────────────────────────

#[tokio::test]
async fn put_then_get_returns_bytes_and_metadata() {
  let (_dir, s) = store().await;
  let id = identity("0001/acme-10k.htm");
  let body = b"<html>annual report</html>";

  let path = s
    .put(&id, Bytes::from_static(body), &metadata(&id, body))
    .await
    .unwrap();
  assert!(path.ends_with("ACME/sec/10-K/0001/acme-10k.htm"));

  let stored = s.get(&id).await.unwrap();
  assert_eq!(&stored.bytes[..], body);
  assert_eq!(stored.metadata, metadata(&id, body));
  assert!(s.contains(&id).await.unwrap());
}

#[tokio::test]
async fn put_overwrites_in_place() {
  let (_dir, s) = store().await;
  let id = identity("x.html");
  s.put(&id, Bytes::from_static(b"v1"), &metadata(&id, b"v1")).await.unwrap();
  s.put(&id, Bytes::from_static(b"v2"), &metadata(&id, b"v2")).await.unwrap();

  let stored = s.get(&id).await.unwrap();
  assert_eq!(&stored.bytes[..], b"v2");
  assert_eq!(stored.metadata.fingerprint, fingerprint(b"v2"));
}

#[tokio::test]
async fn put_leaves_no_temporary_files() {
  let (_dir, s) = store().await;
  let id = identity("x.html");
  s.put(&id, Bytes::from_static(b"v1"), &metadata(&id, b"v1")).await.unwrap();

  let dir = s.layout().bytes_path(&id);
  let mut names: Vec<String> = std::fs::read_dir(dir.parent().unwrap())
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  assert_eq!(names, vec!["x.html", "x.html.meta.json"]);
}

#[tokio::test]
async fn get_missing_is_not_found() {
  let (_dir, s) = store().await;
  let id = identity("missing.html");
  let err = s.get(&id).await.unwrap_err();
  assert!(err.is_not_found());
  assert!(!s.contains(&id).await.unwrap());
}

#[tokio::test]
async fn get_without_sidecar_is_not_found() {
  let (_dir, s) = store().await;
  let id = identity("x.html");
  s.put(&id, Bytes::from_static(b"v1"), &metadata(&id, b"v1")).await.unwrap();
  std::fs::remove_file(s.layout().sidecar_path(&id)).unwrap();
  assert!(s.get(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failed_sidecar_write_keeps_previous_bytes() {
  let (_dir, s) = store().await;
  let id = identity("x.html");
  s.put(&id, Bytes::from_static(b"v1"), &metadata(&id, b"v1")).await.unwrap();

  // Block the sidecar path with a non-empty directory.
  let sidecar = s.layout().sidecar_path(&id);
  std::fs::remove_file(&sidecar).unwrap();
  std::fs::create_dir(&sidecar).unwrap();
  std::fs::write(sidecar.join("blocker"), b"x").unwrap();

  assert!(s.put(&id, Bytes::from_static(b"v2"), &metadata(&id, b"v2")).await.is_err());
  assert_eq!(std::fs::read(s.layout().bytes_path(&id)).unwrap(), b"v1");

  let mut names: Vec<String> = std::fs::read_dir(sidecar.parent().unwrap())
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  assert_eq!(names, vec!["x.html", "x.html.meta.json"]);
}

#[tokio::test]
async fn failed_first_write_leaves_nothing_behind() {
  let (_dir, s) = store().await;
  let id = identity("y.html");
  let sidecar = s.layout().sidecar_path(&id);
  std::fs::create_dir_all(&sidecar).unwrap();
  std::fs::write(sidecar.join("blocker"), b"x").unwrap();

  assert!(s.put(&id, Bytes::from_static(b"v1"), &metadata(&id, b"v1")).await.is_err());
  assert!(!s.contains(&id).await.unwrap());
}

// ─── Snapshot file ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_snapshot_loads_as_missing() {
  let dir = tempfile::tempdir().unwrap();
  let file = SnapshotFile::in_dir(dir.path());
  assert!(matches!(file.load().await.unwrap(), LoadedSnapshot::Missing));
}

#[tokio::test]
async fn snapshot_round_trips_through_disk() {
  let dir = tempfile::tempdir().unwrap();
  let file = SnapshotFile::in_dir(dir.path());

  let index = CollectionIndex::new();
  index.upsert(record(&identity("a.html"), b"a"));
  index.upsert(record(&identity("b.html"), b"b"));
  let last_batch = Some(Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap());

  file.save(&PersistedIndex::new(index.snapshot(), last_batch)).await.unwrap();

  let LoadedSnapshot::Restored(persisted) = file.load().await.unwrap() else {
    panic!("expected a restored snapshot");
  };
  assert_eq!(persisted.last_batch_at, last_batch);
  let restored = CollectionIndex::from_snapshot(persisted.into_snapshot());
  assert_eq!(restored.snapshot(), index.snapshot());
}

#[tokio::test]
async fn snapshot_with_unknown_fields_still_loads() {
  let dir = tempfile::tempdir().unwrap();
  let file = SnapshotFile::in_dir(dir.path());
  let body = serde_json::json!({
    "format_version": 1,
    "saved_at": "2024-03-02T02:00:00Z",
    "written_by": "finch 0.2",
    "records": [],
  });
  std::fs::write(file.path(), body.to_string()).unwrap();

  let LoadedSnapshot::Restored(persisted) = file.load().await.unwrap() else {
    panic!("expected a restored snapshot");
  };
  assert!(persisted.records.is_empty());
  assert_eq!(persisted.last_batch_at, None);
}

#[tokio::test]
async fn corrupt_snapshot_is_moved_aside() {
  let dir = tempfile::tempdir().unwrap();
  let file = SnapshotFile::in_dir(dir.path());
  std::fs::write(file.path(), b"{ not json").unwrap();

  let LoadedSnapshot::Quarantined { moved_to, .. } = file.load().await.unwrap() else {
    panic!("expected the snapshot to be quarantined");
  };
  assert!(!file.path().exists());
  assert_eq!(std::fs::read(&moved_to).unwrap(), b"{ not json");
  assert!(
    moved_to
      .file_name()
      .unwrap()
      .to_string_lossy()
      .starts_with("index.json.corrupt-")
  );

  // A fresh save after quarantine works and loads back.
  file
    .save(&PersistedIndex::new(IndexSnapshot::default(), None))
    .await
    .unwrap();
  assert!(matches!(file.load().await.unwrap(), LoadedSnapshot::Restored(_)));
}

#[tokio::test]
async fn unreadable_snapshot_is_moved_aside() {
  let dir = tempfile::tempdir().unwrap();
  let file = SnapshotFile::in_dir(dir.path());
  // A directory where the file should be cannot be read as a snapshot.
  std::fs::create_dir(file.path()).unwrap();
  std::fs::write(file.path().join("stray"), b"x").unwrap();

  let LoadedSnapshot::Quarantined { moved_to, .. } = file.load().await.unwrap() else {
    panic!("expected the snapshot to be quarantined");
  };
  assert!(moved_to.is_dir());
  assert!(matches!(file.load().await.unwrap(), LoadedSnapshot::Missing));
  file
    .save(&PersistedIndex::new(IndexSnapshot::default(), None))
    .await
    .unwrap();
}
