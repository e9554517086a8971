use super::{OutputMode, proceed_tag};
use crate::core::context::PipelineContext;
use crate::core::error::{PipelineResult, ResultExt};
use crate::core::process::SystemRunner;
use crate::matrix::MatrixPlanner;
use crate::pipeline::Pipeline;
use crate::release::configured_publisher;
use crate::store::FsArtifactStore;
use serde_json::json;

/// Release stage on its own: read every cell's artifact from the store and publish
pub fn run_publish(
  ctx: &PipelineContext,
  reference: Option<String>,
  allow_partial: bool,
  mode: OutputMode,
) -> PipelineResult<()> {
  let Some(tag) = proceed_tag(reference, mode)? else {
    return Ok(());
  };
  let cells = MatrixPlanner::from_config(&ctx.config).plan();

  let store_dir = ctx.store_dir(&tag);
  let store = FsArtifactStore::open(&store_dir)
    .with_context(|| format!("Failed to open artifact store {}", store_dir.display()))?;
  let runner = SystemRunner::new();
  let publisher = configured_publisher(ctx);
  let pipeline = Pipeline::new(ctx, &runner, &store, publisher.as_ref());

  let (manifest, receipt) = pipeline.release(&tag, &cells, &[], allow_partial)?;

  if mode.json {
    println!(
      "{}",
      serde_json::to_string_pretty(&json!({ "manifest": manifest, "receipt": receipt }))?
    );
  } else if !mode.quiet {
    print!("{}", manifest.to_human_readable());
    println!("🚀 Published {} ({} assets) → {}", receipt.tag, receipt.assets, receipt.location);
  }
  Ok(())
}
