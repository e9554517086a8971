use super::{PublishError, PublishReceipt, PublishResult, Publisher, ReleaseManifest};
use crate::trigger::Tag;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "release.json";

/// Publishes into `<dir>/<tag>/`, one file per asset plus `release.json`
///
/// The release is assembled in a hidden staging directory and renamed into place, so
/// `<dir>/<tag>` either does not exist or is complete.
pub struct DirectoryPublisher {
  dir: PathBuf,
}

impl DirectoryPublisher {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn release_path(&self, tag: &Tag) -> PathBuf {
    self.dir.join(tag.as_str())
  }

  fn stage(&self, staging: &Path, manifest: &ReleaseManifest) -> io::Result<()> {
    if staging.exists() {
      fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;

    for asset in &manifest.assets {
      let path = staging.join(asset.name());
      fs::write(&path, &asset.contents)?;
      if asset.meta.executable {
        set_executable(&path)?;
      }
    }

    let json = serde_json::to_vec_pretty(manifest).map_err(io::Error::other)?;
    fs::write(staging.join(MANIFEST_FILE), json)
  }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
  Ok(())
}

impl Publisher for DirectoryPublisher {
  fn name(&self) -> &'static str {
    "directory"
  }

  fn release_exists(&self, tag: &Tag) -> PublishResult<bool> {
    Ok(self.release_path(tag).exists())
  }

  fn publish(&self, manifest: &ReleaseManifest) -> PublishResult<PublishReceipt> {
    let tag = manifest.tag.to_string();
    let rejected = |e: io::Error| PublishError::Rejected {
      tag: tag.clone(),
      reason: e.to_string(),
    };

    let target = self.release_path(&manifest.tag);
    if target.exists() {
      return Err(PublishError::Duplicate { tag });
    }

    fs::create_dir_all(&self.dir).map_err(rejected)?;
    let staging = self.dir.join(format!(".{}.staging-{}", tag, std::process::id()));
    self.stage(&staging, manifest).map_err(rejected)?;

    // A concurrent publisher may have won the race since the check above
    if target.exists() {
      let _ = fs::remove_dir_all(&staging);
      return Err(PublishError::Duplicate { tag });
    }
    fs::rename(&staging, &target).map_err(rejected)?;

    tracing::info!(tag = %tag, path = %target.display(), assets = manifest.assets.len(), "published release");
    Ok(PublishReceipt {
      tag,
      location: target.display().to_string(),
      assets: manifest.assets.len(),
    })
  }
}
