use crate::core::error::{ConfigError, PipelineError, PipelineResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for release-matrix
/// Searched in order: release.toml, .release.toml, .config/release.toml
///
/// Every section has defaults, so a project without a config file builds the
/// stock four-cell matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default)]
  pub app: AppConfig,
  #[serde(default)]
  pub toolchain: ToolchainConfig,
  #[serde(default)]
  pub build: BuildConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub release: ReleaseConfig,
}

/// The application being packaged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
  /// Fixed prefix of every artifact name
  #[serde(default = "default_artifact_prefix")]
  pub artifact_prefix: String,

  /// Script handed to the packager
  #[serde(default = "default_entry_point")]
  pub entry_point: PathBuf,

  /// Declared Python dependencies
  #[serde(default = "default_requirements")]
  pub requirements: PathBuf,

  /// Toolkit submodules to force-include
  #[serde(default = "default_hidden_imports")]
  pub hidden_imports: Vec<String>,

  /// Internal path the CA bundle is embedded under
  #[serde(default = "default_embedded_data_dir")]
  pub embedded_data_dir: String,
}

fn default_artifact_prefix() -> String {
  "YouTube_Downloader".to_string()
}

fn default_entry_point() -> PathBuf {
  PathBuf::from("main.py")
}

fn default_requirements() -> PathBuf {
  PathBuf::from("requirements.txt")
}

fn default_hidden_imports() -> Vec<String> {
  ["PyQt6.QtCore", "PyQt6.QtGui", "PyQt6.QtWidgets", "PyQt6.sip"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_embedded_data_dir() -> String {
  "certifi".to_string()
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      artifact_prefix: default_artifact_prefix(),
      entry_point: default_entry_point(),
      requirements: default_requirements(),
      hidden_imports: default_hidden_imports(),
      embedded_data_dir: default_embedded_data_dir(),
    }
  }
}

/// External tools invoked by the build cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
  /// Python interpreter (runs pip, certifi lookup and the packager module)
  #[serde(default = "default_python")]
  pub python: String,

  /// Module run as `python -m <module>`
  #[serde(default = "default_packager_module")]
  pub packager_module: String,

  /// pip package providing the packager
  #[serde(default = "default_packager_package")]
  pub packager_package: String,

  /// Command prefix for system packages (cell extras are appended)
  #[serde(default = "default_system_installer")]
  pub system_installer: Vec<String>,

  /// Skip the certifi lookup and embed this bundle instead
  #[serde(default)]
  pub cert_bundle: Option<PathBuf>,
}

fn default_python() -> String {
  "python".to_string()
}

fn default_packager_module() -> String {
  "PyInstaller".to_string()
}

fn default_packager_package() -> String {
  "pyinstaller".to_string()
}

fn default_system_installer() -> Vec<String> {
  ["sudo", "apt-get", "install", "-y"].into_iter().map(String::from).collect()
}

impl Default for ToolchainConfig {
  fn default() -> Self {
    Self {
      python: default_python(),
      packager_module: default_packager_module(),
      packager_package: default_packager_package(),
      system_installer: default_system_installer(),
      cert_bundle: None,
    }
  }
}

/// Build stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
  /// Root of the per-cell work directories (relative to the project root)
  #[serde(default = "default_work_dir")]
  pub work_dir: PathBuf,

  /// Upper bound for one cell, all steps included
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_work_dir() -> PathBuf {
  PathBuf::from("build/matrix")
}

fn default_timeout_secs() -> u64 {
  45 * 60
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      work_dir: default_work_dir(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

/// Artifact handoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
  /// Root of the artifact store; one subdirectory per tag
  #[serde(default = "default_store_dir")]
  pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
  PathBuf::from("build/artifacts")
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      dir: default_store_dir(),
    }
  }
}

/// What to do when some cells produced no artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PartialPolicy {
  /// Refuse to publish unless every cell delivered
  #[default]
  AllOrNothing,
  /// Publish whatever was built and record the missing cells
  Partial,
}

impl PartialPolicy {
  pub fn as_str(self) -> &'static str {
    match self {
      PartialPolicy::AllOrNothing => "all-or-nothing",
      PartialPolicy::Partial => "partial",
    }
  }
}

/// Where releases go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishBackend {
  /// GitHub releases through the `gh` CLI
  #[default]
  Github,
  /// A local directory per tag
  Directory,
}

impl PublishBackend {
  pub fn as_str(self) -> &'static str {
    match self {
      PublishBackend::Github => "github",
      PublishBackend::Directory => "directory",
    }
  }
}

/// Release stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
  #[serde(default)]
  pub policy: PartialPolicy,

  #[serde(default)]
  pub backend: PublishBackend,

  /// Target directory for the `directory` backend
  #[serde(default = "default_release_dir")]
  pub directory: PathBuf,

  /// Title template; `{tag}` is replaced by the tag
  #[serde(default = "default_title")]
  pub title: String,

  /// Body template; `{tag}` is replaced by the tag
  #[serde(default = "default_body")]
  pub body: String,

  /// Ask the backend whether the tag is already released before building
  #[serde(default = "default_true")]
  pub preflight_duplicate_check: bool,
}

fn default_release_dir() -> PathBuf {
  PathBuf::from("build/releases")
}

fn default_title() -> String {
  "YouTube Downloader {tag}".to_string()
}

fn default_body() -> String {
  "Standalone executables of the YouTube Downloader for Windows, Linux and macOS.\n\n\
   Download the file for your platform and run it; no Python installation is required.\n\
   Linux users on older distributions should pick the Linux_Legacy build."
    .to_string()
}

fn default_true() -> bool {
  true
}

impl Default for ReleaseConfig {
  fn default() -> Self {
    Self {
      policy: PartialPolicy::default(),
      backend: PublishBackend::default(),
      directory: default_release_dir(),
      title: default_title(),
      body: default_body(),
      preflight_duplicate_check: default_true(),
    }
  }
}

impl PipelineConfig {
  /// Find config file in search order: release.toml, .release.toml, .config/release.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("release.toml"),
      path.join(".release.toml"),
      path.join(".config").join("release.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config, falling back to defaults when no file exists
  pub fn load(path: &Path) -> PipelineResult<Self> {
    let Some(config_path) = Self::find_config_path(path) else {
      tracing::debug!(root = %path.display(), "no release.toml found, using defaults");
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config: PipelineConfig = toml_edit::de::from_str(&content).map_err(|e| {
      PipelineError::Config(ConfigError::Parse {
        path: config_path.clone(),
        message: e.to_string(),
      })
    })?;

    config.validate()?;
    tracing::debug!(path = %config_path.display(), "loaded config");
    Ok(config)
  }

  /// Validate field domains
  pub fn validate(&self) -> PipelineResult<()> {
    let prefix = &self.app.artifact_prefix;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
      return Err(invalid(
        "app.artifact_prefix",
        format!("'{}' must be non-empty and use only letters, digits, '_', '-' or '.'", prefix),
      ));
    }

    if self.app.embedded_data_dir.trim().is_empty() {
      return Err(invalid("app.embedded_data_dir", "must not be empty"));
    }

    if self.toolchain.python.trim().is_empty() {
      return Err(invalid("toolchain.python", "must not be empty"));
    }

    if self.toolchain.system_installer.is_empty() {
      return Err(invalid("toolchain.system_installer", "needs at least a program name"));
    }

    if self.build.timeout_secs == 0 {
      return Err(invalid("build.timeout_secs", "must be greater than zero"));
    }

    if self.release.title.trim().is_empty() {
      return Err(invalid("release.title", "must not be empty"));
    }

    Ok(())
  }
}

fn invalid(field: &str, message: impl Into<String>) -> PipelineError {
  PipelineError::Config(ConfigError::InvalidValue {
    field: field.to_string(),
    message: message.into(),
  })
}
