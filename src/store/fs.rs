use super::{ArtifactMeta, ArtifactStore, Blob, StoreError, StoreResult, sha256_hex};
use crate::matrix::ArtifactKey;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed store
///
/// Layout: `<dir>/<artifact>` holds the blob, `<dir>/<artifact>.json` its [`ArtifactMeta`].
/// The blob is renamed into place last, so its presence marks a committed put.
pub struct FsArtifactStore {
  dir: PathBuf,
}

impl FsArtifactStore {
  /// Open (and create if needed) a store directory
  pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// On-disk path of a stored artifact
  pub fn blob_path(&self, key: &ArtifactKey) -> PathBuf {
    self.dir.join(key.file_name())
  }

  /// Drop a previously stored artifact so its cell can be rebuilt
  pub fn remove(&self, key: &ArtifactKey) -> io::Result<bool> {
    let existed = self.contains(key);
    for path in [self.blob_path(key), self.meta_path(key)] {
      match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
      }
    }
    Ok(existed)
  }

  fn meta_path(&self, key: &ArtifactKey) -> PathBuf {
    self.dir.join(format!("{}.json", key.file_name()))
  }

  fn tmp_path(&self, key: &ArtifactKey, what: &str) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    self
      .dir
      .join(format!(".{}.{}.{}-{}.tmp", key.file_name(), what, std::process::id(), n))
  }

  fn write_committed(&self, key: &ArtifactKey, blob: &Blob, meta: &ArtifactMeta) -> io::Result<()> {
    let meta_json = serde_json::to_vec_pretty(meta).map_err(io::Error::other)?;
    let meta_tmp = self.tmp_path(key, "meta");
    let blob_tmp = self.tmp_path(key, "blob");

    fs::write(&meta_tmp, meta_json)?;
    fs::write(&blob_tmp, &blob.bytes)?;
    if blob.executable {
      set_executable(&blob_tmp)?;
    }

    fs::rename(&meta_tmp, self.meta_path(key))?;
    fs::rename(&blob_tmp, self.blob_path(key))?;
    Ok(())
  }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = fs::metadata(path)?.permissions();
  perms.set_mode(0o755);
  fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
  Ok(())
}

impl ArtifactStore for FsArtifactStore {
  fn put(&self, key: &ArtifactKey, blob: Blob) -> StoreResult<ArtifactMeta> {
    if self.contains(key) {
      return Err(StoreError::AlreadyExists { key: key.clone() });
    }

    let meta = ArtifactMeta::describe(key, &blob);
    self.write_committed(key, &blob, &meta).map_err(|source| StoreError::Io {
      key: key.clone(),
      source,
    })?;

    tracing::debug!(artifact = %key, size = meta.size, sha256 = %meta.sha256, "stored artifact");
    Ok(meta)
  }

  fn get(&self, key: &ArtifactKey) -> StoreResult<Blob> {
    let io_err = |source| StoreError::Io { key: key.clone(), source };

    let bytes = match fs::read(self.blob_path(key)) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound { key: key.clone() }),
      Err(e) => return Err(io_err(e)),
    };

    let meta_raw = fs::read(self.meta_path(key)).map_err(io_err)?;
    let meta: ArtifactMeta = serde_json::from_slice(&meta_raw).map_err(|e| io_err(io::Error::other(e)))?;

    let actual = sha256_hex(&bytes);
    if actual != meta.sha256 {
      return Err(StoreError::Corrupt {
        key: key.clone(),
        expected: meta.sha256,
        actual,
      });
    }

    Ok(Blob::new(bytes, meta.executable))
  }

  fn contains(&self, key: &ArtifactKey) -> bool {
    self.blob_path(key).is_file()
  }

  fn clear(&self) -> Result<(), StoreError> {
    match fs::remove_dir_all(&self.dir) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(source) => return Err(StoreError::Clear { source }),
    }
    fs::create_dir_all(&self.dir).map_err(|source| StoreError::Clear { source })?;
    tracing::debug!(dir = %self.dir.display(), "cleared artifact store");
    Ok(())
  }
}
