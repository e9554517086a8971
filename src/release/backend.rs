use super::{PublishError, ReleaseManifest};
use crate::trigger::Tag;
use serde::Serialize;

pub type PublishResult<T> = Result<T, PublishError>;

/// What a successful publish produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
  pub tag: String,
  /// URL or path of the published release
  pub location: String,
  pub assets: usize,
}

/// The hosting platform's release call, behind a narrow seam
pub trait Publisher: Send + Sync {
  /// Backend name for logs
  fn name(&self) -> &'static str;

  /// Whether a release for the tag already exists
  fn release_exists(&self, tag: &Tag) -> PublishResult<bool>;

  /// Create the release; [`PublishError::Duplicate`] if the tag is taken
  fn publish(&self, manifest: &ReleaseManifest) -> PublishResult<PublishReceipt>;
}

#[cfg(test)]
pub use memory::MemoryPublisher;
