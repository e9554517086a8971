//! Trigger gate: decides whether a pushed ref starts a release run
//!
//! Only release-shaped version tags (`vMAJOR.MINOR.PATCH`) proceed. Anything else is a
//! skip, not an error: the pipeline simply never starts.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

const TAG_REF_PREFIX: &str = "refs/tags/";

fn tag_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"^v([0-9]+)\.([0-9]+)\.([0-9]+)$").expect("static tag pattern compiles"))
}

/// A release tag that passed the gate
///
/// There is no public constructor besides [`TriggerGate::evaluate`], so holding a `Tag`
/// proves the ref was validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
  name: String,
  version: semver::Version,
}

impl Tag {
  /// Tag name as pushed (e.g. `v1.2.3`)
  pub fn as_str(&self) -> &str {
    &self.name
  }

  /// Parsed version (without the `v`)
  pub fn version(&self) -> &semver::Version {
    &self.version
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}

impl Serialize for Tag {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.name)
  }
}

/// Outcome of evaluating a ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
  /// Start the pipeline for this tag
  Proceed(Tag),
  /// Do nothing
  Skip { reference: String, reason: String },
}

impl GateDecision {
  /// The tag, if the gate let the ref through
  #[cfg(test)]
  pub fn tag(&self) -> Option<&Tag> {
    match self {
      GateDecision::Proceed(tag) => Some(tag),
      GateDecision::Skip { .. } => None,
    }
  }
}

/// Validates triggering refs
pub struct TriggerGate;

impl TriggerGate {
  /// Evaluate a ref (short tag name or fully qualified `refs/tags/...`)
  pub fn evaluate(reference: &str) -> GateDecision {
    let name = match reference.strip_prefix(TAG_REF_PREFIX) {
      Some(short) => short,
      None if reference.starts_with("refs/") => {
        return GateDecision::Skip {
          reference: reference.to_string(),
          reason: "not a tag ref".to_string(),
        };
      }
      None => reference,
    };

    let Some(caps) = tag_pattern().captures(name) else {
      return GateDecision::Skip {
        reference: reference.to_string(),
        reason: "does not match vMAJOR.MINOR.PATCH".to_string(),
      };
    };

    // Components are all digits; parse can only fail on overflow
    let parts: Option<Vec<u64>> = (1..=3).map(|i| caps[i].parse::<u64>().ok()).collect();
    match parts {
      Some(p) => GateDecision::Proceed(Tag {
        name: name.to_string(),
        version: semver::Version::new(p[0], p[1], p[2]),
      }),
      None => GateDecision::Skip {
        reference: reference.to_string(),
        reason: "version component out of range".to_string(),
      },
    }
  }
}

#[cfg(test)]
pub(crate) fn test_tag(name: &str) -> Tag {
  TriggerGate::evaluate(name)
    .tag()
    .cloned()
    .unwrap_or_else(|| panic!("{} is not a release tag", name))
}
