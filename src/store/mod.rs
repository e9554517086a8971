//! Artifact handoff between the build stage and the release stage
//!
//! Keys are [`ArtifactKey`]s, which only a [`crate::matrix::BuildCell`] can produce.
//! Each key is written once by its cell and read once by the release stage.

mod fs;
#[cfg(test)]
mod memory;

pub use fs::FsArtifactStore;
#[cfg(test)]
pub use memory::MemoryArtifactStore;

use crate::matrix::ArtifactKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;

/// Stored artifact contents plus the facts the release needs about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
  pub bytes: Vec<u8>,
  pub executable: bool,
}

impl Blob {
  pub fn new(bytes: Vec<u8>, executable: bool) -> Self {
    Self { bytes, executable }
  }

  /// Hex SHA-256 of the contents
  pub fn digest(&self) -> String {
    sha256_hex(&self.bytes)
  }
}

/// Lightweight description of a stored artifact (no contents)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
  pub name: String,
  pub size: u64,
  pub sha256: String,
  pub executable: bool,
}

impl ArtifactMeta {
  pub fn describe(key: &ArtifactKey, blob: &Blob) -> Self {
    Self {
      name: key.file_name().to_string(),
      size: blob.bytes.len() as u64,
      sha256: blob.digest(),
      executable: blob.executable,
    }
  }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  format!("{:x}", hasher.finalize())
}

/// Artifact store errors
#[derive(Debug)]
pub enum StoreError {
  /// Nothing was stored under this key
  NotFound { key: ArtifactKey },

  /// The key was already written in this store
  AlreadyExists { key: ArtifactKey },

  /// Contents do not match the recorded digest
  Corrupt {
    key: ArtifactKey,
    expected: String,
    actual: String,
  },

  /// Underlying storage failed
  Io { key: ArtifactKey, source: io::Error },

  /// Emptying the store failed
  Clear { source: io::Error },
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound { .. })
  }
}

impl fmt::Display for StoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoreError::NotFound { key } => write!(f, "Artifact '{}' not found in store", key),
      StoreError::AlreadyExists { key } => write!(f, "Artifact '{}' was already stored", key),
      StoreError::Corrupt { key, expected, actual } => write!(
        f,
        "Artifact '{}' is corrupt (expected sha256 {}, found {})",
        key, expected, actual
      ),
      StoreError::Io { key, source } => write!(f, "Store I/O error for '{}': {}", key, source),
      StoreError::Clear { source } => write!(f, "Failed to clear artifact store: {}", source),
    }
  }
}

impl std::error::Error for StoreError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      StoreError::Io { source, .. } | StoreError::Clear { source } => Some(source),
      _ => None,
    }
  }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key to blob handoff
///
/// Implementations must make `put` atomic per key: a concurrent or later `get` sees
/// either nothing or the complete blob.
pub trait ArtifactStore: Send + Sync {
  /// Store a blob; fails if the key already holds one
  fn put(&self, key: &ArtifactKey, blob: Blob) -> StoreResult<ArtifactMeta>;

  /// Fetch a blob; [`StoreError::NotFound`] if the key was never written
  fn get(&self, key: &ArtifactKey) -> StoreResult<Blob>;

  /// Whether the key holds a blob
  fn contains(&self, key: &ArtifactKey) -> bool;

  /// Drop every stored blob
  fn clear(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_digest_is_sha256_hex() {
    let blob = Blob::new(b"abc".to_vec(), false);
    assert_eq!(
      blob.digest(),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn test_meta_describes_blob() {
    let cell = &crate::matrix::test_cells()[3];
    let blob = Blob::new(vec![0u8; 16], true);
    let meta = ArtifactMeta::describe(&cell.artifact_key(), &blob);
    assert_eq!(meta.name, "YouTube_Downloader_macOS");
    assert_eq!(meta.size, 16);
    assert!(meta.executable);
  }
}
