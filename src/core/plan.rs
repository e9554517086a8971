//! Run plans: what a pipeline run would do, before it does it
//!
//! A [`RunPlan`] lists every operation of a run in order: the duplicate
//! preflight, each cell's commands, then the single publish call.
//!
//! - **Dry-run**: `release-matrix plan` prints it without touching anything
//! - **Auditability**: plans are JSON-serializable for CI logs
//! - **Idempotency**: same tag + same config = same plan ID
//!
//! # Architecture
//!
//! ```text
//! TriggerGate (tag)
//!   ↓
//! MatrixPlanner (cells)
//!   ↓
//! RunPlan (operations)  <- `plan` stops here
//!   ↓
//! Pipeline (execute)
//! ```

use crate::build::BuildState;
use crate::build::steps::{self, CellDirs};
use crate::core::context::PipelineContext;
use crate::core::error::PipelineResult;
use crate::matrix::BuildCell;
use crate::trigger::Tag;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Placeholder for the CA bundle path, only known once the cell runs
const CERT_PLACEHOLDER: &str = "<certifi bundle>";

/// Plan identifier (SHA256 hash of plan contents)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanId(String);

impl PlanId {
  /// Create a plan ID from plan contents
  pub fn from_contents(contents: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let result = hasher.finalize();
    Self(format!("{:x}", result))
  }

  /// Get the short ID (first 12 characters)
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }
}

impl fmt::Display for PlanId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short())
  }
}

/// One thing a run does
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
  /// Ask the backend whether the tag is already released
  PreflightDuplicateCheck { tag: String, backend: String },

  /// Recreate the cell's work directory
  PrepareWorkspace { cell: String, path: String },

  /// Run an external command for a build step
  RunCommand {
    cell: String,
    step: BuildState,
    command: String,
  },

  /// Move the packager output to the canonical artifact name
  Rename { cell: String, from: String, to: String },

  /// Set executable bits
  MakeExecutable { cell: String, path: String },

  /// Hand the artifact to the store
  StoreArtifact { cell: String, artifact: String, store: String },

  /// The single publish call
  Publish {
    tag: String,
    backend: String,
    title: String,
    assets: Vec<String>,
    policy: String,
  },
}

/// Ordered operations of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
  /// Plan ID (content hash)
  pub id: PlanId,

  pub tag: Tag,

  /// The build matrix
  pub cells: Vec<BuildCell>,

  /// Operations to perform (cells run in parallel; each cell's operations in order)
  pub operations: Vec<Operation>,
}

impl RunPlan {
  /// Plan a full run for `tag`
  pub fn build(ctx: &PipelineContext, tag: &Tag, cells: Vec<BuildCell>) -> Self {
    let config = &ctx.config;
    let backend = config.release.backend.as_str().to_string();
    let mut operations = Vec::new();

    if config.release.preflight_duplicate_check {
      operations.push(Operation::PreflightDuplicateCheck {
        tag: tag.to_string(),
        backend: backend.clone(),
      });
    }

    for cell in &cells {
      operations.extend(cell_operations(ctx, tag, cell));
    }

    operations.push(Operation::Publish {
      tag: tag.to_string(),
      backend,
      title: config.release.title.replace("{tag}", tag.as_str()),
      assets: cells.iter().map(|c| c.artifact_key().to_string()).collect(),
      policy: config.release.policy.as_str().to_string(),
    });

    let mut plan = Self {
      id: PlanId::from_contents(&[]),
      tag: tag.clone(),
      cells,
      operations,
    };
    plan.recompute_id();
    plan
  }

  /// Recompute plan ID based on current contents
  fn recompute_id(&mut self) {
    let json = serde_json::to_vec(&(&self.tag, &self.operations)).unwrap_or_default();
    self.id = PlanId::from_contents(&json);
  }

  /// Operations belonging to one cell
  pub fn cell_operations(&self, cell: &BuildCell) -> Vec<&Operation> {
    self
      .operations
      .iter()
      .filter(|op| operation_cell(op) == Some(cell.id()))
      .collect()
  }

  /// Serialize to JSON
  pub fn to_json(&self) -> PipelineResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Get human-readable representation
  pub fn to_human_readable(&self) -> String {
    let mut output = String::new();

    output.push_str(&format!("📋 Plan: release {} ({})\n", self.tag, self.id));
    output.push_str(&format!("\n   Matrix ({} cells):\n", self.cells.len()));
    for cell in &self.cells {
      output.push_str(&format!(
        "   - {:<14} {:<22} -> {}\n",
        cell.id(),
        cell.label,
        cell.artifact_key()
      ));
    }

    output.push_str(&format!("\n   Operations ({}):\n", self.operations.len()));
    for (i, op) in self.operations.iter().enumerate() {
      output.push_str(&format!("   {}. {}\n", i + 1, op));
    }

    output
  }
}

fn cell_operations(ctx: &PipelineContext, tag: &Tag, cell: &BuildCell) -> Vec<Operation> {
  let config = &ctx.config;
  let id = cell.id().to_string();
  let dirs = CellDirs::new(&ctx.work_dir(), cell);
  let mut ops = vec![Operation::PrepareWorkspace {
    cell: id.clone(),
    path: dirs.root.display().to_string(),
  }];

  let requirements = Some(ctx.resolve(&config.app.requirements)).filter(|p| p.is_file());
  for cmd in steps::dependency_commands(cell, &config.toolchain, requirements.as_deref(), &ctx.root) {
    ops.push(Operation::RunCommand {
      cell: id.clone(),
      step: BuildState::DependencyInstall,
      command: cmd.to_string(),
    });
  }

  let cert_bundle = match &config.toolchain.cert_bundle {
    Some(path) => ctx.resolve(path),
    None => {
      ops.push(Operation::RunCommand {
        cell: id.clone(),
        step: BuildState::LocateCertBundle,
        command: steps::cert_locate_command(cell, &config.toolchain, &ctx.root).to_string(),
      });
      PathBuf::from(CERT_PLACEHOLDER)
    }
  };

  let compile = steps::compile_command(cell, &config.app, &config.toolchain, &dirs, &cert_bundle, &ctx.root);
  ops.push(Operation::RunCommand {
    cell: id.clone(),
    step: BuildState::Compile,
    command: compile.to_string(),
  });

  let artifact = dirs.artifact_path(cell);
  let produced = dirs
    .produced_candidates(cell, &config.app.artifact_prefix)
    .into_iter()
    .next()
    .unwrap_or_else(|| dirs.dist.clone());
  ops.push(Operation::Rename {
    cell: id.clone(),
    from: produced.display().to_string(),
    to: artifact.display().to_string(),
  });

  if cell.params.executable {
    ops.push(Operation::MakeExecutable {
      cell: id.clone(),
      path: artifact.display().to_string(),
    });
  }

  ops.push(Operation::StoreArtifact {
    cell: id,
    artifact: cell.artifact_key().to_string(),
    store: ctx.store_dir(tag).display().to_string(),
  });
  ops
}

fn operation_cell(op: &Operation) -> Option<&str> {
  match op {
    Operation::PrepareWorkspace { cell, .. }
    | Operation::RunCommand { cell, .. }
    | Operation::Rename { cell, .. }
    | Operation::MakeExecutable { cell, .. }
    | Operation::StoreArtifact { cell, .. } => Some(cell),
    Operation::PreflightDuplicateCheck { .. } | Operation::Publish { .. } => None,
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operation::PreflightDuplicateCheck { tag, backend } => write!(f, "Check {} has no release for {}", backend, tag),
      Operation::PrepareWorkspace { cell, path } => write!(f, "[{}] Prepare workspace {}", cell, path),
      Operation::RunCommand { cell, step, command } => write!(f, "[{}] {}: {}", cell, step, command),
      Operation::Rename { cell, from, to } => write!(f, "[{}] Rename {} → {}", cell, from, to),
      Operation::MakeExecutable { cell, path } => write!(f, "[{}] chmod 755 {}", cell, path),
      Operation::StoreArtifact { cell, artifact, store } => write!(f, "[{}] Store {} in {}", cell, artifact, store),
      Operation::Publish {
        tag,
        backend,
        assets,
        policy,
        ..
      } => write!(
        f,
        "Publish {} to {} with {} assets (policy: {})",
        tag,
        backend,
        assets.len(),
        policy
      ),
    }
  }
}
