//! Build matrix: the fixed set of build cells
//!
//! The planner turns the closed [`Platform`] enum plus app-level settings into four
//! immutable [`BuildCell`] values. Later stages read fields; they never branch on
//! platform names.

mod key;
mod platform;

pub use key::ArtifactKey;
pub use platform::{Console, Platform};

use crate::core::config::PipelineConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-cell build parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellParams {
  /// Separator between source and destination in `--add-data`
  pub data_separator: char,
  /// Terminal window visibility of the packaged app
  pub console: Console,
  /// Extra environment for GUI-on-server execution
  pub headless_env: BTreeMap<String, String>,
  /// System packages installed after the Python dependencies
  pub extra_packages: Vec<String>,
  /// Toolkit submodules static analysis misses
  pub hidden_imports: Vec<String>,
  /// Platform part of the artifact name
  pub artifact_suffix: String,
  /// File extension of the artifact, if any
  pub extension: Option<String>,
  /// Whether the artifact needs the executable bit
  pub executable: bool,
}

/// One platform target with its fixed parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCell {
  pub platform: Platform,
  pub label: String,
  /// CI runner image the cell is meant to run on
  pub image: String,
  pub params: CellParams,
  pub(crate) artifact_prefix: String,
}

impl BuildCell {
  /// Cell identifier (same as the platform id)
  pub fn id(&self) -> &'static str {
    self.platform.id()
  }

  /// The one naming function shared by the build and release stages
  pub fn artifact_key(&self) -> ArtifactKey {
    ArtifactKey::derive(self)
  }

  /// Data embedding argument: `<src><sep><dest>`
  pub fn add_data_arg(&self, source: &str, dest: &str) -> String {
    format!("{}{}{}", source, self.params.data_separator, dest)
  }
}

/// Enumerates the build cells
pub struct MatrixPlanner {
  artifact_prefix: String,
  hidden_imports: Vec<String>,
}

impl MatrixPlanner {
  pub fn new(artifact_prefix: impl Into<String>, hidden_imports: Vec<String>) -> Self {
    Self {
      artifact_prefix: artifact_prefix.into(),
      hidden_imports,
    }
  }

  pub fn from_config(config: &PipelineConfig) -> Self {
    Self::new(config.app.artifact_prefix.clone(), config.app.hidden_imports.clone())
  }

  /// All cells, in matrix order
  pub fn plan(&self) -> Vec<BuildCell> {
    Platform::ALL.into_iter().map(|p| self.cell(p)).collect()
  }

  /// The cell for a single platform
  pub fn cell(&self, platform: Platform) -> BuildCell {
    let profile = platform.profile();
    BuildCell {
      platform,
      label: profile.label.to_string(),
      image: profile.image.to_string(),
      params: CellParams {
        data_separator: profile.data_separator,
        console: profile.console,
        headless_env: profile
          .headless_env
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect(),
        extra_packages: profile.extra_packages.iter().map(|s| s.to_string()).collect(),
        hidden_imports: self.hidden_imports.clone(),
        artifact_suffix: profile.artifact_suffix.to_string(),
        extension: profile.extension.map(str::to_string),
        executable: profile.executable,
      },
      artifact_prefix: self.artifact_prefix.clone(),
    }
  }
}

#[cfg(test)]
pub(crate) fn test_cells() -> Vec<BuildCell> {
  MatrixPlanner::new("YouTube_Downloader", vec!["PyQt6.QtCore".to_string()]).plan()
}
