//! Error types for release-matrix with contextual messages and exit codes
//!
//! Cell-local failures ([`CellFailure`]) are values first: the pipeline collects them per cell
//! and only turns them into a [`PipelineError`] when a stage cannot continue. Every variant knows
//! its exit code and, where one exists, a hint for the operator.

use crate::build::CellFailure;
use crate::release::PublishError;
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for release-matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, unknown cell)
  User = 1,
  /// System error (I/O, store, publish call rejected)
  System = 2,
  /// Build failure (cell failed, artifact missing, run cancelled)
  Build = 3,
  /// The tag was already published
  Duplicate = 4,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// One cell whose artifact could not be collected by the release stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingArtifact {
  /// Cell identifier (e.g. `macos`)
  pub cell: String,
  /// Artifact name the release stage asked the store for
  pub artifact: String,
  /// Why it is missing (upstream failure or store miss)
  pub reason: String,
}

/// Main error type for release-matrix
#[derive(Debug)]
pub enum PipelineError {
  /// Configuration errors
  Config(ConfigError),

  /// A single build cell failed (only surfaced as an error by single-cell commands)
  Cell(CellFailure),

  /// The release stage could not collect every artifact
  ArtifactMissing { missing: Vec<MissingArtifact> },

  /// The hosting platform rejected the publish call
  PublishFailure { tag: String, reason: String },

  /// The tag already has a published release
  DuplicateRelease { tag: String },

  /// Artifact store errors other than a plain miss
  Store(StoreError),

  /// The run was cancelled before the release stage
  Cancelled,

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl PipelineError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    PipelineError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    PipelineError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      PipelineError::Message { message, context, help } => PipelineError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      PipelineError::Io(e) => PipelineError::Message {
        message: format!("{}: {}", ctx_str, e),
        context: None,
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      PipelineError::Config(_) => ExitCode::User,
      PipelineError::Cell(_) => ExitCode::Build,
      PipelineError::ArtifactMissing { .. } => ExitCode::Build,
      PipelineError::PublishFailure { .. } => ExitCode::System,
      PipelineError::DuplicateRelease { .. } => ExitCode::Duplicate,
      PipelineError::Store(_) => ExitCode::System,
      PipelineError::Cancelled => ExitCode::Build,
      PipelineError::Io(_) => ExitCode::System,
      PipelineError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      PipelineError::Config(e) => e.help_message(),
      PipelineError::ArtifactMissing { .. } => Some(
        "Fix the failed cells and re-push the tag, or set `release.policy = \"partial\"` to publish what was built."
          .to_string(),
      ),
      PipelineError::DuplicateRelease { tag } => Some(format!(
        "Delete the existing release for {} on the hosting platform or push a new version tag.",
        tag
      )),
      PipelineError::PublishFailure { .. } => {
        Some("Check that GH_TOKEN or GITHUB_TOKEN is set and allowed to create releases.".to_string())
      }
      PipelineError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for PipelineError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PipelineError::Config(e) => write!(f, "{}", e),
      PipelineError::Cell(e) => write!(f, "{}", e),
      PipelineError::ArtifactMissing { missing } => {
        let names: Vec<&str> = missing.iter().map(|m| m.cell.as_str()).collect();
        write!(f, "Artifacts missing for cell(s): {}", names.join(", "))?;
        for m in missing {
          write!(f, "\n  - {} ({}): {}", m.cell, m.artifact, m.reason)?;
        }
        Ok(())
      }
      PipelineError::PublishFailure { tag, reason } => write!(f, "Publishing release {} failed: {}", tag, reason),
      PipelineError::DuplicateRelease { tag } => write!(f, "A release for {} already exists", tag),
      PipelineError::Store(e) => write!(f, "{}", e),
      PipelineError::Cancelled => write!(f, "Pipeline run was cancelled"),
      PipelineError::Io(e) => write!(f, "I/O error: {}", e),
      PipelineError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for PipelineError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      PipelineError::Io(e) => Some(e),
      PipelineError::Store(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for PipelineError {
  fn from(err: io::Error) -> Self {
    PipelineError::Io(err)
  }
}

impl From<String> for PipelineError {
  fn from(msg: String) -> Self {
    PipelineError::message(msg)
  }
}

impl From<&str> for PipelineError {
  fn from(msg: &str) -> Self {
    PipelineError::message(msg)
  }
}

impl From<toml_edit::de::Error> for PipelineError {
  fn from(err: toml_edit::de::Error) -> Self {
    PipelineError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for PipelineError {
  fn from(err: serde_json::Error) -> Self {
    PipelineError::message(format!("JSON error: {}", err))
  }
}

impl From<CellFailure> for PipelineError {
  fn from(err: CellFailure) -> Self {
    PipelineError::Cell(err)
  }
}

impl From<StoreError> for PipelineError {
  fn from(err: StoreError) -> Self {
    PipelineError::Store(err)
  }
}

impl From<PublishError> for PipelineError {
  fn from(err: PublishError) -> Self {
    match err {
      PublishError::Duplicate { tag } => PipelineError::DuplicateRelease { tag },
      PublishError::Rejected { tag, reason } => PipelineError::PublishFailure { tag, reason },
      PublishError::MissingCredentials => PipelineError::with_help(
        "No release credential found in the environment",
        "Export GH_TOKEN (or GITHUB_TOKEN) before publishing.",
      ),
    }
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// Config file exists but could not be parsed
  Parse { path: PathBuf, message: String },

  /// A field holds a value outside its domain
  InvalidValue { field: String, message: String },

  /// Unknown build cell requested on the command line
  UnknownCell { id: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::Parse { .. } => Some("Compare your release.toml with the example in README.md.".to_string()),
      ConfigError::UnknownCell { .. } => {
        Some("Run `release-matrix plan` to list the cells: windows, ubuntu-22.04, ubuntu-20.04, macos.".to_string())
      }
      ConfigError::InvalidValue { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::Parse { path, message } => {
        write!(f, "Failed to parse config {}:\n{}", path.display(), message)
      }
      ConfigError::InvalidValue { field, message } => {
        write!(f, "Invalid value for `{}`: {}", field, message)
      }
      ConfigError::UnknownCell { id } => write!(f, "Unknown build cell '{}'", id),
    }
  }
}

/// Result type alias for release-matrix
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> PipelineResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> PipelineResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<PipelineError>,
{
  fn context(self, ctx: impl Into<String>) -> PipelineResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> PipelineResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &PipelineError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_codes_by_category() {
    assert_eq!(PipelineError::Cancelled.exit_code(), ExitCode::Build);
    assert_eq!(
      PipelineError::DuplicateRelease { tag: "v1.0.0".into() }.exit_code(),
      ExitCode::Duplicate
    );
    assert_eq!(
      PipelineError::PublishFailure {
        tag: "v1.0.0".into(),
        reason: "HTTP 500".into()
      }
      .exit_code(),
      ExitCode::System
    );
    assert_eq!(PipelineError::message("bad flag").exit_code(), ExitCode::User);

    let store = PipelineError::from(StoreError::Clear {
      source: io::Error::other("read-only file system"),
    });
    assert_eq!(store.exit_code(), ExitCode::System);
    assert!(store.to_string().contains("read-only file system"));
  }

  #[test]
  fn test_artifact_missing_names_every_cell() {
    let err = PipelineError::ArtifactMissing {
      missing: vec![
        MissingArtifact {
          cell: "macos".into(),
          artifact: "App_macOS".into(),
          reason: "compile failed".into(),
        },
        MissingArtifact {
          cell: "windows".into(),
          artifact: "App_Windows.exe".into(),
          reason: "not found in store".into(),
        },
      ],
    };
    let text = err.to_string();
    assert!(text.contains("macos, windows"), "{}", text);
    assert!(text.contains("App_Windows.exe"));
    assert!(err.help_message().is_some());
  }

  #[test]
  fn test_publish_error_mapping() {
    let dup: PipelineError = PublishError::Duplicate { tag: "v2.0.0".into() }.into();
    assert!(matches!(dup, PipelineError::DuplicateRelease { ref tag } if tag == "v2.0.0"));

    let rejected: PipelineError = PublishError::Rejected {
      tag: "v2.0.0".into(),
      reason: "403".into(),
    }
    .into();
    assert!(matches!(rejected, PipelineError::PublishFailure { .. }));
  }

  #[test]
  fn test_context_chains_messages() {
    let err = PipelineError::message("inner").context("outer");
    assert_eq!(err.to_string(), "inner\nouter");
  }
}
