//! Trigger gate tests

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_release_tag_proceeds() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["gate", "--ref", "v1.2.3"])?;
  assert_eq!(stdout(&output).trim(), "proceed v1.2.3");
  Ok(())
}

#[test]
fn test_fully_qualified_tag_ref_proceeds() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["gate", "--ref", "refs/tags/v2.0.10"])?;
  assert_eq!(stdout(&output).trim(), "proceed v2.0.10");
  Ok(())
}

#[test]
fn test_non_release_refs_skip_without_failing() -> Result<()> {
  let project = TestProject::new()?;

  for reference in ["release-1.2.3", "v1.2", "refs/heads/main", "v1.2.3-rc1", " v1.2.3"] {
    let output = run_release_matrix(&project.path, &["gate", "--ref", reference])?;
    let out = stdout(&output);
    assert!(out.starts_with(&format!("skip {}:", reference)), "unexpected output for {}: {}", reference, out);
  }
  Ok(())
}

#[test]
fn test_gate_reads_github_ref() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix_with_env(&project.path, &["gate"], &[("GITHUB_REF", "refs/tags/v0.4.1")])?;
  assert!(output.status.success());
  assert_eq!(stdout(&output).trim(), "proceed v0.4.1");
  Ok(())
}

#[test]
fn test_gate_without_any_ref_is_a_user_error() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix_with_env(&project.path, &["gate"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("No ref to evaluate"));
  Ok(())
}

#[test]
fn test_gate_json_output() -> Result<()> {
  let project = TestProject::new()?;

  let output = run_release_matrix(&project.path, &["gate", "--ref", "v3.1.4", "--json"])?;
  let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(value["proceed"], true);
  assert_eq!(value["tag"], "v3.1.4");
  assert_eq!(value["version"], "3.1.4");

  let output = run_release_matrix(&project.path, &["gate", "--ref", "nightly", "--json"])?;
  let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(value["proceed"], false);
  assert_eq!(value["reference"], "nightly");
  Ok(())
}

#[test]
fn test_gate_ignores_broken_config() -> Result<()> {
  let project = TestProject::new()?;
  project.write_config("[build]\ntimeout_secs = \"soon\"\n")?;
  let output = run_release_matrix(&project.path, &["gate", "--ref", "v1.0.0"])?;
  assert_eq!(stdout(&output).trim(), "proceed v1.0.0");
  Ok(())
}
