//! Closed set of target platforms and their fixed build parameters
//!
//! Every difference between platforms lives in [`Platform::profile`]. Nothing downstream
//! compares OS names.

use crate::core::error::{ConfigError, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target platform of one build cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
  Windows,
  #[serde(rename = "ubuntu-22.04")]
  Ubuntu2204,
  #[serde(rename = "ubuntu-20.04")]
  Ubuntu2004,
  #[serde(rename = "macos")]
  MacOs,
}

/// Whether the packaged app opens a terminal window next to its GUI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Console {
  Hidden,
  Shown,
}

/// Static per-platform facts (the parts of a cell that never come from config)
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlatformProfile {
  pub label: &'static str,
  pub image: &'static str,
  pub data_separator: char,
  pub console: Console,
  pub headless_env: &'static [(&'static str, &'static str)],
  pub extra_packages: &'static [&'static str],
  pub artifact_suffix: &'static str,
  pub extension: Option<&'static str>,
  pub executable: bool,
}

const QT_OFFSCREEN: &[(&str, &str)] = &[("QT_QPA_PLATFORM", "offscreen")];

impl Platform {
  /// All platforms in matrix order
  pub const ALL: [Platform; 4] = [
    Platform::Windows,
    Platform::Ubuntu2204,
    Platform::Ubuntu2004,
    Platform::MacOs,
  ];

  /// Stable identifier used on the command line and in work directories
  pub fn id(self) -> &'static str {
    match self {
      Platform::Windows => "windows",
      Platform::Ubuntu2204 => "ubuntu-22.04",
      Platform::Ubuntu2004 => "ubuntu-20.04",
      Platform::MacOs => "macos",
    }
  }

  pub(crate) fn profile(self) -> PlatformProfile {
    match self {
      Platform::Windows => PlatformProfile {
        label: "Windows",
        image: "windows-latest",
        data_separator: ';',
        console: Console::Hidden,
        headless_env: &[],
        extra_packages: &[],
        artifact_suffix: "Windows",
        extension: Some("exe"),
        executable: false,
      },
      Platform::Ubuntu2204 => PlatformProfile {
        label: "Linux (Ubuntu 22.04)",
        image: "ubuntu-22.04",
        data_separator: ':',
        console: Console::Hidden,
        headless_env: QT_OFFSCREEN,
        extra_packages: &[],
        artifact_suffix: "Linux",
        extension: None,
        executable: true,
      },
      // The older runner lacks the xinerama xcb plugin dependency the Qt6 wheels expect
      Platform::Ubuntu2004 => PlatformProfile {
        label: "Linux (Ubuntu 20.04)",
        image: "ubuntu-20.04",
        data_separator: ':',
        console: Console::Hidden,
        headless_env: QT_OFFSCREEN,
        extra_packages: &["libxcb-xinerama0"],
        artifact_suffix: "Linux_Legacy",
        extension: None,
        executable: true,
      },
      Platform::MacOs => PlatformProfile {
        label: "macOS",
        image: "macos-latest",
        data_separator: ':',
        console: Console::Hidden,
        headless_env: &[],
        extra_packages: &[],
        artifact_suffix: "macOS",
        extension: None,
        executable: true,
      },
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.id())
  }
}

impl FromStr for Platform {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Platform::ALL
      .into_iter()
      .find(|p| p.id().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| PipelineError::Config(ConfigError::UnknownCell { id: s.to_string() }))
  }
}
