use crate::core::error::MissingArtifact;
use crate::store::{ArtifactMeta, Blob};
use crate::trigger::Tag;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One binary attached to a release
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseAsset {
  #[serde(flatten)]
  pub meta: ArtifactMeta,
  #[serde(skip)]
  pub contents: Vec<u8>,
}

impl ReleaseAsset {
  pub fn new(meta: ArtifactMeta, blob: Blob) -> Self {
    Self {
      meta,
      contents: blob.bytes,
    }
  }

  pub fn name(&self) -> &str {
    &self.meta.name
  }
}

/// Tag-scoped description of everything published as one release
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseManifest {
  pub tag: Tag,
  pub title: String,
  pub body: String,
  /// In matrix order
  pub assets: Vec<ReleaseAsset>,
  /// Cells left out of a partial release; empty otherwise
  pub missing_cells: Vec<MissingArtifact>,
  pub created_at: DateTime<Utc>,
}

impl ReleaseManifest {
  pub fn new(
    tag: &Tag,
    title_template: &str,
    body_template: &str,
    assets: Vec<ReleaseAsset>,
    missing_cells: Vec<MissingArtifact>,
  ) -> Self {
    Self {
      tag: tag.clone(),
      title: render(title_template, tag),
      body: render(body_template, tag),
      assets,
      missing_cells,
      created_at: Utc::now(),
    }
  }

  pub fn is_partial(&self) -> bool {
    !self.missing_cells.is_empty()
  }

  pub fn asset_names(&self) -> Vec<&str> {
    self.assets.iter().map(ReleaseAsset::name).collect()
  }

  /// Human-readable summary
  pub fn to_human_readable(&self) -> String {
    let mut out = format!("Release {} \"{}\"\n", self.tag, self.title);
    if self.is_partial() {
      out.push_str(&format!(
        "  ⚠️  partial: {} of {} cells\n",
        self.assets.len(),
        self.assets.len() + self.missing_cells.len()
      ));
    }
    for asset in &self.assets {
      out.push_str(&format!("  {} ({} bytes, sha256 {})\n", asset.meta.name, asset.meta.size, asset.meta.sha256));
    }
    for missing in &self.missing_cells {
      out.push_str(&format!("  missing: {} ({})\n", missing.artifact, missing.reason));
    }
    out
  }
}

fn render(template: &str, tag: &Tag) -> String {
  template.replace("{tag}", tag.as_str())
}
