use super::{OutputMode, print_outcomes, proceed_tag};
use crate::core::context::PipelineContext;
use crate::core::error::{PipelineResult, ResultExt};
use crate::core::process::SystemRunner;
use crate::matrix::MatrixPlanner;
use crate::pipeline::{Pipeline, RunOptions};
use crate::release::configured_publisher;
use crate::store::FsArtifactStore;
use crate::ui::progress::CellProgress;
use serde_json::json;

/// Full pipeline in one process: gate, parallel build, join, publish
pub fn run_pipeline(
  ctx: &PipelineContext,
  reference: Option<String>,
  options: RunOptions,
  mode: OutputMode,
) -> PipelineResult<()> {
  let Some(tag) = proceed_tag(reference, mode)? else {
    return Ok(());
  };
  let cells = MatrixPlanner::from_config(&ctx.config).plan();

  // Emptied by the pipeline once the duplicate preflight passed
  let store_dir = ctx.store_dir(&tag);
  let store = FsArtifactStore::open(&store_dir)
    .with_context(|| format!("Failed to open artifact store {}", store_dir.display()))?;

  let runner = SystemRunner::new();
  let publisher = configured_publisher(ctx);
  let pipeline = Pipeline::new(ctx, &runner, &store, publisher.as_ref());

  if !mode.json && !mode.quiet {
    println!("🏗️  Release {}: building {} cells", tag, cells.len());
  }

  let progress = CellProgress::new(&cells, mode.progress());
  let report = pipeline.run(&tag, &cells, options, &|p, s| progress.observe(p, s))?;

  if mode.json {
    let release = match &report.release {
      Ok((manifest, receipt)) => json!({ "manifest": manifest, "receipt": receipt }),
      Err(e) => json!({ "error": e.to_string() }),
    };
    println!(
      "{}",
      serde_json::to_string_pretty(&json!({
        "tag": tag,
        "outcomes": report.outcomes,
        "release": release,
      }))?
    );
  } else if !mode.quiet {
    println!();
    print_outcomes(&report.outcomes);
    let failed = report.failed_cells();
    if !failed.is_empty() {
      let ids: Vec<&str> = failed.iter().map(|o| o.cell.id()).collect();
      println!("\n⚠️  {} of {} cells failed: {}", failed.len(), report.outcomes.len(), ids.join(", "));
    }
    if let Ok((manifest, receipt)) = &report.release {
      println!();
      print!("{}", manifest.to_human_readable());
      println!("🚀 Published {} ({} assets) → {}", receipt.tag, receipt.assets, receipt.location);
    }
  }

  report.release.map(|_| ())
}
