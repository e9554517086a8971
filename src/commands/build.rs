use super::{OutputMode, print_outcomes, proceed_tag};
use crate::core::context::PipelineContext;
use crate::core::error::{PipelineError, PipelineResult, ResultExt};
use crate::core::process::SystemRunner;
use crate::matrix::{MatrixPlanner, Platform};
use crate::pipeline::Pipeline;
use crate::release::configured_publisher;
use crate::store::FsArtifactStore;
use crate::ui::progress::CellProgress;
use serde_json::json;

/// Build a single cell (one CI runner) and leave its artifact in the store
pub fn run_build(ctx: &PipelineContext, reference: Option<String>, cell: &str, mode: OutputMode) -> PipelineResult<()> {
  let Some(tag) = proceed_tag(reference, mode)? else {
    return Ok(());
  };
  let platform: Platform = cell.parse()?;
  let cell = MatrixPlanner::from_config(&ctx.config).cell(platform);

  let store_dir = ctx.store_dir(&tag);
  let store = FsArtifactStore::open(&store_dir)
    .with_context(|| format!("Failed to open artifact store {}", store_dir.display()))?;
  if store.remove(&cell.artifact_key())? {
    tracing::info!(artifact = %cell.artifact_key(), "replacing previously stored artifact");
  }

  if !mode.json && !mode.quiet {
    println!("🔨 Building {} for {} ({})", cell.label, tag, cell.image);
  }

  let runner = SystemRunner::new();
  let publisher = configured_publisher(ctx);
  let pipeline = Pipeline::new(ctx, &runner, &store, publisher.as_ref());
  let cells = [cell];
  let progress = CellProgress::new(&cells, mode.progress());
  let mut outcomes = pipeline.build_cells(&cells, false, &|p, s| progress.observe(p, s));
  let outcome = outcomes.pop().ok_or_else(|| PipelineError::message("build produced no outcome"))?;

  if mode.json {
    println!(
      "{}",
      serde_json::to_string_pretty(&json!({
        "tag": tag,
        "outcome": outcome,
        "store": store.dir().display().to_string(),
      }))?
    );
  } else if !mode.quiet {
    print_outcomes(std::slice::from_ref(&outcome));
  }

  match outcome.result {
    Ok(_) => Ok(()),
    Err(failure) => Err(PipelineError::Cell(failure)),
  }
}
