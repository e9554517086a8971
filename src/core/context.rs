//! Pipeline context - build once, pass everywhere
//!
//! Everything a stage needs (project root, configuration, cancellation) travels in
//! [`PipelineContext`] instead of ambient environment variables.
//!
//! ```text
//! main.rs:
//!   PipelineContext::build() -> &PipelineContext
//!   |
//!   v
//! commands/*.rs -> pipeline.rs -> build / release stages
//! ```

use crate::core::config::PipelineConfig;
use crate::core::error::PipelineResult;
use crate::trigger::Tag;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag for one pipeline run
///
/// Cloning yields a handle to the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request cancellation of every holder of this token
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

/// Unified pipeline context shared by all stages
///
/// Uses Arc so build cells running on different threads share one config.
#[derive(Clone)]
pub struct PipelineContext {
  /// Project root (absolute path); relative config paths resolve against it
  pub root: PathBuf,

  /// Loaded configuration (release.toml or defaults)
  pub config: Arc<PipelineConfig>,

  /// Cancellation for the whole run
  pub cancel: CancelToken,
}

impl PipelineContext {
  /// Build context from a project root
  pub fn build(root: &Path) -> PipelineResult<Self> {
    let config = PipelineConfig::load(root)?;
    Ok(Self::with_config(root, config))
  }

  /// A relative root is made absolute against the current directory
  pub fn with_config(root: &Path, config: PipelineConfig) -> Self {
    Self {
      root: std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf()),
      config: Arc::new(config),
      cancel: CancelToken::new(),
    }
  }

  /// Resolve a config path against the project root
  pub fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }

  /// Root of all per-cell work directories
  pub fn work_dir(&self) -> PathBuf {
    self.resolve(&self.config.build.work_dir)
  }

  /// Store directory for one tag
  pub fn store_dir(&self, tag: &Tag) -> PathBuf {
    self.resolve(&self.config.store.dir).join(tag.as_str())
  }

  /// Target directory of the `directory` publish backend
  pub fn release_dir(&self) -> PathBuf {
    self.resolve(&self.config.release.directory)
  }
}
