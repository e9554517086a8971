use super::{PublishError, PublishReceipt, PublishResult, Publisher, ReleaseManifest};
use crate::core::context::CancelToken;
use crate::core::process::{CommandOutput, CommandRunner, StepCommand};
use crate::trigger::Tag;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const TOKEN_VARS: [&str; 2] = ["GH_TOKEN", "GITHUB_TOKEN"];
const CALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// GitHub releases through the `gh` CLI available on CI hosts
pub struct GhCliPublisher {
  cwd: PathBuf,
  staging_dir: PathBuf,
  token: Option<String>,
  runner: Box<dyn CommandRunner>,
  cancel: CancelToken,
}

impl GhCliPublisher {
  /// Credential comes from `GH_TOKEN`, then `GITHUB_TOKEN`
  pub fn from_env(cwd: &Path, staging_dir: PathBuf, runner: Box<dyn CommandRunner>, cancel: CancelToken) -> Self {
    let token = TOKEN_VARS
      .iter()
      .filter_map(|var| std::env::var(var).ok())
      .find(|value| !value.trim().is_empty());
    Self {
      cwd: cwd.to_path_buf(),
      staging_dir,
      token,
      runner,
      cancel,
    }
  }

  #[cfg(test)]
  pub fn with_token(mut self, token: Option<String>) -> Self {
    self.token = token;
    self
  }

  fn gh(&self, token: &str) -> StepCommand {
    let env = [("GH_TOKEN".to_string(), token.to_string())].into_iter().collect();
    StepCommand::new("gh", &self.cwd).envs(&env)
  }

  fn token(&self) -> PublishResult<&str> {
    self.token.as_deref().ok_or(PublishError::MissingCredentials)
  }

  fn call(&self, tag: &Tag, cmd: &StepCommand) -> PublishResult<CommandOutput> {
    self
      .runner
      .run(cmd, Instant::now() + CALL_TIMEOUT, &self.cancel)
      .map_err(|e| PublishError::Rejected {
        tag: tag.to_string(),
        reason: e.to_string(),
      })
  }

  fn stage_assets(&self, manifest: &ReleaseManifest) -> std::io::Result<Vec<PathBuf>> {
    let dir = self.staging_dir.join(manifest.tag.as_str());
    fs::create_dir_all(&dir)?;
    manifest
      .assets
      .iter()
      .map(|asset| {
        let path = dir.join(asset.name());
        fs::write(&path, &asset.contents)?;
        Ok(path)
      })
      .collect()
  }
}

impl Publisher for GhCliPublisher {
  fn name(&self) -> &'static str {
    "github"
  }

  fn release_exists(&self, tag: &Tag) -> PublishResult<bool> {
    let cmd = self
      .gh(self.token()?)
      .args(["release", "view", tag.as_str(), "--json", "tagName"]);
    let out = self.call(tag, &cmd)?;
    if out.success {
      return Ok(true);
    }
    if out.stderr.contains("release not found") {
      return Ok(false);
    }
    Err(PublishError::Rejected {
      tag: tag.to_string(),
      reason: out.failure_summary(),
    })
  }

  fn publish(&self, manifest: &ReleaseManifest) -> PublishResult<PublishReceipt> {
    let tag = &manifest.tag;
    let token = self.token()?;
    if self.release_exists(tag)? {
      return Err(PublishError::Duplicate { tag: tag.to_string() });
    }

    let files = self.stage_assets(manifest).map_err(|e| PublishError::Rejected {
      tag: tag.to_string(),
      reason: format!("staging assets: {}", e),
    })?;

    let cmd = self
      .gh(token)
      .args(["release", "create", tag.as_str(), "--verify-tag", "--title"])
      .arg(&manifest.title)
      .arg("--notes")
      .arg(&manifest.body)
      .args(files.iter().map(|p| p.to_string_lossy().into_owned()));

    tracing::info!(tag = %tag, assets = files.len(), "creating GitHub release");
    let out = self.call(tag, &cmd)?;
    if !out.success {
      if out.stderr.contains("already exists") {
        return Err(PublishError::Duplicate { tag: tag.to_string() });
      }
      return Err(PublishError::Rejected {
        tag: tag.to_string(),
        reason: out.failure_summary(),
      });
    }

    let location = out
      .stdout
      .lines()
      .rev()
      .map(str::trim)
      .find(|l| !l.is_empty())
      .unwrap_or_default()
      .to_string();
    Ok(PublishReceipt {
      tag: tag.to_string(),
      location,
      assets: manifest.assets.len(),
    })
  }
}
