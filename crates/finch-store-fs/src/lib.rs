//! Filesystem backend for finch.
//!
//! Artifact bytes live under a store root at a path derived from their
//! identity, each with a JSON metadata sidecar. The collection index is
//! persisted as a single JSON snapshot file. Every write goes to a temporary
//! file in the target directory first and is renamed into place, so readers
//! never observe partial content.

mod atomic;
mod layout;

pub mod artifact_store;
pub mod error;
pub mod snapshot;

pub use artifact_store::FsArtifactStore;
pub use error::{Error, Result};
pub use layout::Layout;
pub use snapshot::{LoadedSnapshot, PersistedIndex, SnapshotFile};

#[cfg(test)]
mod tests;
