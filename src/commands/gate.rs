use super::gate_decision;
use crate::core::error::PipelineResult;
use crate::trigger::GateDecision;
use serde_json::json;

/// Print the gate decision; skipping is not an error
pub fn run_gate(reference: Option<String>, json: bool) -> PipelineResult<()> {
  let decision = gate_decision(reference)?;

  if json {
    let value = match &decision {
      GateDecision::Proceed(tag) => json!({
        "proceed": true,
        "tag": tag,
        "version": tag.version().to_string(),
      }),
      GateDecision::Skip { reference, reason } => json!({
        "proceed": false,
        "reference": reference,
        "reason": reason,
      }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  match decision {
    GateDecision::Proceed(tag) => println!("proceed {}", tag),
    GateDecision::Skip { reference, reason } => println!("skip {}: {}", reference, reason),
  }
  Ok(())
}
