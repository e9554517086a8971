use super::{ArtifactMeta, ArtifactStore, Blob, StoreError, StoreResult};
use crate::matrix::ArtifactKey;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory test fake for [`ArtifactStore`]
#[derive(Default)]
pub struct MemoryArtifactStore {
  blobs: Mutex<HashMap<ArtifactKey, Blob>>,
}

impl MemoryArtifactStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.blobs.lock().map(|b| b.len()).unwrap_or(0)
  }
}

impl ArtifactStore for MemoryArtifactStore {
  fn put(&self, key: &ArtifactKey, blob: Blob) -> StoreResult<ArtifactMeta> {
    let mut blobs = self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if blobs.contains_key(key) {
      return Err(StoreError::AlreadyExists { key: key.clone() });
    }
    let meta = ArtifactMeta::describe(key, &blob);
    blobs.insert(key.clone(), blob);
    Ok(meta)
  }

  fn get(&self, key: &ArtifactKey) -> StoreResult<Blob> {
    let blobs = self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    blobs
      .get(key)
      .cloned()
      .ok_or_else(|| StoreError::NotFound { key: key.clone() })
  }

  fn contains(&self, key: &ArtifactKey) -> bool {
    self
      .blobs
      .lock()
      .map(|b| b.contains_key(key))
      .unwrap_or(false)
  }

  fn clear(&self) -> Result<(), StoreError> {
    self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matrix::test_cells;

  #[test]
  fn test_round_trip() {
    let store = MemoryArtifactStore::new();
    let key = test_cells()[0].artifact_key();
    let blob = Blob::new(b"MZ binary".to_vec(), false);
    store.put(&key, blob.clone()).unwrap();
    assert_eq!(store.get(&key).unwrap(), blob);
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_missing_key_is_not_found() {
    let store = MemoryArtifactStore::new();
    let key = test_cells()[1].artifact_key();
    assert!(store.get(&key).unwrap_err().is_not_found());
    assert!(!store.contains(&key));
  }

  #[test]
  fn test_second_put_rejected() {
    let store = MemoryArtifactStore::new();
    let key = test_cells()[2].artifact_key();
    store.put(&key, Blob::new(b"one".to_vec(), true)).unwrap();
    let err = store.put(&key, Blob::new(b"two".to_vec(), true)).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    assert_eq!(store.get(&key).unwrap().bytes, b"one");
  }
}
