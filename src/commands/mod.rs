//! CLI commands for release-matrix
//!
//! ## Trigger
//! - **gate**: Decide whether a ref starts a release run
//!
//! ## Inspection
//! - **plan**: Print the run plan (matrix, per-cell commands, publish call)
//!
//! ## Stages (one CI job each)
//! - **build**: Run one build cell and store its artifact
//! - **publish**: Join the stored artifacts into one release
//!
//! ## All-in-one
//! - **run**: Gate, build every cell in parallel, publish
//!
//! Everything except `gate` takes `&PipelineContext` so the config is loaded once.

pub mod build;
pub mod gate;
pub mod plan;
pub mod publish;
pub mod run;

pub use build::run_build;
pub use gate::run_gate;
pub use plan::run_plan;
pub use publish::run_publish;
pub use run::run_pipeline;

use crate::build::CellOutcome;
use crate::core::error::{PipelineError, PipelineResult};
use crate::trigger::{GateDecision, Tag, TriggerGate};

/// Host variable carrying the triggering ref on CI
const REF_ENV: &str = "GITHUB_REF";

/// Output switches shared by the commands
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
  pub json: bool,
  pub quiet: bool,
}

impl OutputMode {
  /// Progress bars only for interactive, human-readable runs
  pub fn progress(self) -> bool {
    use std::io::IsTerminal;
    !self.json && !self.quiet && std::io::stdout().is_terminal()
  }
}

/// Evaluate `--ref`, falling back to `GITHUB_REF`
pub(crate) fn gate_decision(reference: Option<String>) -> PipelineResult<GateDecision> {
  let reference = match reference {
    Some(r) => r,
    None => std::env::var(REF_ENV).map_err(|_| {
      PipelineError::with_help(
        "No ref to evaluate",
        format!("Pass --ref <tag> or run on CI where {} is set.", REF_ENV),
      )
    })?,
  };
  Ok(TriggerGate::evaluate(&reference))
}

/// The tag to work on, or `None` after reporting a skip
pub(crate) fn proceed_tag(reference: Option<String>, mode: OutputMode) -> PipelineResult<Option<Tag>> {
  match gate_decision(reference)? {
    GateDecision::Proceed(tag) => Ok(Some(tag)),
    GateDecision::Skip { reference, reason } => {
      tracing::info!(reference = %reference, reason = %reason, "trigger gate skipped");
      if !mode.quiet && !mode.json {
        println!("⏭️  Skipping '{}': {}", reference, reason);
      }
      Ok(None)
    }
  }
}

/// Per-cell summary lines
pub(crate) fn print_outcomes(outcomes: &[CellOutcome]) {
  for outcome in outcomes {
    match &outcome.result {
      Ok(meta) => println!(
        "   ✅ {:<22} {} ({} bytes, {:.1}s)",
        outcome.label,
        meta.name,
        meta.size,
        outcome.duration.as_secs_f64()
      ),
      Err(failure) => println!(
        "   ❌ {:<22} {}: {} ({:.1}s)",
        outcome.label,
        failure.kind,
        failure.detail,
        outcome.duration.as_secs_f64()
      ),
    }
  }
}
