//! Release stage: join, collect, publish once
//!
//! # Core Invariants
//!
//! 1. **Nothing is published before every cell has terminated**
//!    - The stage takes the joined list of [`crate::build::CellOutcome`]s
//!
//! 2. **Artifacts are fetched by the same key the cell stored them under**
//!    - Both sides call [`crate::matrix::BuildCell::artifact_key`]
//!
//! 3. **One publish call per tag, never an overwrite**
//!    - A tag that already has a release yields [`PublishError::Duplicate`]
//!
//! # Backends
//!
//! - `github`: `gh release create` on the CI host ([`GhCliPublisher`])
//! - `directory`: `<release dir>/<tag>/` plus `release.json` ([`DirectoryPublisher`])

mod backend;
mod directory;
mod github;
mod manifest;
mod publisher;

pub use backend::{PublishReceipt, PublishResult, Publisher};
#[cfg(test)]
pub use backend::MemoryPublisher;
pub use directory::DirectoryPublisher;
pub use github::GhCliPublisher;
pub use manifest::{ReleaseAsset, ReleaseManifest};
pub use publisher::ReleasePublisher;

use crate::core::config::PublishBackend;
use crate::core::context::PipelineContext;
use crate::core::process::SystemRunner;
use std::fmt;

/// Errors from a publish backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
  /// A release for the tag already exists
  Duplicate { tag: String },

  /// The backend refused or failed the call
  Rejected { tag: String, reason: String },

  /// No credential for the hosting platform in the environment
  MissingCredentials,
}

impl fmt::Display for PublishError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PublishError::Duplicate { tag } => write!(f, "release {} already exists", tag),
      PublishError::Rejected { tag, reason } => write!(f, "release {} rejected: {}", tag, reason),
      PublishError::MissingCredentials => write!(f, "no release credential (GH_TOKEN / GITHUB_TOKEN)"),
    }
  }
}

impl std::error::Error for PublishError {}

/// The publish backend selected by configuration
pub fn configured_publisher(ctx: &PipelineContext) -> Box<dyn Publisher> {
  match ctx.config.release.backend {
    PublishBackend::Github => Box::new(GhCliPublisher::from_env(
      &ctx.root,
      ctx.work_dir().join("release"),
      Box::new(SystemRunner::new()),
      ctx.cancel.clone(),
    )),
    PublishBackend::Directory => Box::new(DirectoryPublisher::new(ctx.release_dir())),
  }
}
