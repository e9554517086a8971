use super::{OutputMode, proceed_tag};
use crate::core::context::PipelineContext;
use crate::core::error::PipelineResult;
use crate::core::plan::RunPlan;
use crate::matrix::{MatrixPlanner, Platform};
use serde_json::json;

/// Print what a run for the ref would do, without doing it
pub fn run_plan(
  ctx: &PipelineContext,
  reference: Option<String>,
  cell: Option<String>,
  mode: OutputMode,
) -> PipelineResult<()> {
  let Some(tag) = proceed_tag(reference, mode)? else {
    return Ok(());
  };

  let planner = MatrixPlanner::from_config(&ctx.config);
  let only = cell.as_deref().map(str::parse::<Platform>).transpose()?;
  let plan = RunPlan::build(ctx, &tag, planner.plan());

  match only {
    Some(platform) if mode.json => {
      let cell = planner.cell(platform);
      println!(
        "{}",
        serde_json::to_string_pretty(&json!({
          "id": plan.id,
          "tag": tag,
          "cell": cell,
          "operations": plan.cell_operations(&cell),
        }))?
      );
    }
    None if mode.json => println!("{}", plan.to_json()?),
    Some(platform) => {
      let cell = planner.cell(platform);
      println!("📋 Plan: {} cell for release {} ({})\n", cell.label, tag, plan.id);
      for (i, op) in plan.cell_operations(&cell).into_iter().enumerate() {
        println!("   {}. {}", i + 1, op);
      }
    }
    None => print!("{}", plan.to_human_readable()),
  }
  Ok(())
}
