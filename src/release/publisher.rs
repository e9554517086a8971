use super::{PublishReceipt, Publisher, ReleaseAsset, ReleaseManifest};
use crate::build::CellOutcome;
use crate::core::config::{PartialPolicy, ReleaseConfig};
use crate::core::error::{MissingArtifact, PipelineError, PipelineResult};
use crate::matrix::BuildCell;
use crate::store::{ArtifactMeta, ArtifactStore};
use crate::trigger::Tag;

/// Reconciles every cell into a single release
pub struct ReleasePublisher<'a> {
  store: &'a dyn ArtifactStore,
  publisher: &'a dyn Publisher,
  policy: PartialPolicy,
  title: String,
  body: String,
}

impl<'a> ReleasePublisher<'a> {
  pub fn new(config: &ReleaseConfig, store: &'a dyn ArtifactStore, publisher: &'a dyn Publisher) -> Self {
    Self {
      store,
      publisher,
      policy: config.policy,
      title: config.title.clone(),
      body: config.body.clone(),
    }
  }

  pub fn with_policy(mut self, policy: PartialPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Fetch every cell's artifact and build the manifest
  ///
  /// `outcomes` is the joined result of the build stage; it may be empty when the build ran
  /// elsewhere, in which case the store alone decides what is missing.
  pub fn collect(&self, tag: &Tag, cells: &[BuildCell], outcomes: &[CellOutcome]) -> PipelineResult<ReleaseManifest> {
    let mut assets = Vec::with_capacity(cells.len());
    let mut missing = Vec::new();

    for cell in cells {
      let key = cell.artifact_key();
      let missing_because = |reason: String| MissingArtifact {
        cell: cell.id().to_string(),
        artifact: key.to_string(),
        reason,
      };

      if let Some(failure) = outcomes.iter().find(|o| o.cell == cell.platform).and_then(CellOutcome::failure) {
        missing.push(missing_because(failure.to_string()));
        continue;
      }

      match self.store.get(&key) {
        Ok(blob) => {
          let meta = ArtifactMeta::describe(&key, &blob);
          assets.push(ReleaseAsset::new(meta, blob));
        }
        Err(e) if e.is_not_found() => missing.push(missing_because("not found in artifact store".to_string())),
        Err(e) => missing.push(missing_because(e.to_string())),
      }
    }

    if !missing.is_empty() {
      match self.policy {
        PartialPolicy::AllOrNothing => return Err(PipelineError::ArtifactMissing { missing }),
        PartialPolicy::Partial if assets.is_empty() => return Err(PipelineError::ArtifactMissing { missing }),
        PartialPolicy::Partial => {
          let cells: Vec<&str> = missing.iter().map(|m| m.cell.as_str()).collect();
          tracing::warn!(missing = ?cells, "publishing partial release");
        }
      }
    }

    Ok(ReleaseManifest::new(tag, &self.title, &self.body, assets, missing))
  }

  /// Collect, then make the one publish call
  pub fn release(
    &self,
    tag: &Tag,
    cells: &[BuildCell],
    outcomes: &[CellOutcome],
  ) -> PipelineResult<(ReleaseManifest, PublishReceipt)> {
    let manifest = self.collect(tag, cells, outcomes)?;
    tracing::info!(tag = %tag, backend = self.publisher.name(), assets = ?manifest.asset_names(), "publishing");
    let receipt = self.publisher.publish(&manifest)?;
    Ok((manifest, receipt))
  }
}
