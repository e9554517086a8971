//! Typed artifact keys
//!
//! An [`ArtifactKey`] can only be derived from a [`BuildCell`]; the store accepts nothing
//! else. Producer and consumer therefore cannot disagree on a key.

use super::BuildCell;
use serde::{Serialize, Serializer};
use std::fmt;

/// Name under which a cell's artifact is stored and published
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
  file_name: String,
}

impl ArtifactKey {
  /// `<prefix>_<platform-suffix>[.<ext>]`
  pub(super) fn derive(cell: &BuildCell) -> Self {
    let mut file_name = format!("{}_{}", cell.artifact_prefix, cell.params.artifact_suffix);
    if let Some(ext) = &cell.params.extension {
      file_name.push('.');
      file_name.push_str(ext);
    }
    Self { file_name }
  }

  /// File name of the artifact (also the release asset name)
  pub fn file_name(&self) -> &str {
    &self.file_name
  }
}

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.file_name)
  }
}

impl Serialize for ArtifactKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.file_name)
  }
}
