//! Plan command tests (dry run, nothing is built)

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_plan_json_lists_matrix_and_single_publish() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["plan", "--ref", "v1.0.0", "--json"])?;
  let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;

  assert_eq!(plan["tag"], "v1.0.0");
  let cells = plan["cells"].as_array().expect("cells array");
  assert_eq!(cells.len(), 4);

  let operations = plan["operations"].as_array().expect("operations array");
  let publishes: Vec<_> = operations.iter().filter(|op| op["type"] == "publish").collect();
  assert_eq!(publishes.len(), 1);
  assert_eq!(operations.last().expect("at least one operation")["type"], "publish");
  assert_eq!(publishes[0]["assets"].as_array().expect("assets").len(), 4);

  // Nothing was built
  assert!(!project.file_exists("build"));
  Ok(())
}

#[test]
fn test_plan_id_is_stable() -> Result<()> {
  let project = TestProject::new()?;
  let first: serde_json::Value =
    serde_json::from_slice(&run_release_matrix(&project.path, &["plan", "--ref", "v1.0.0", "--json"])?.stdout)?;
  let second: serde_json::Value =
    serde_json::from_slice(&run_release_matrix(&project.path, &["plan", "--ref", "v1.0.0", "--json"])?.stdout)?;
  assert_eq!(first["id"], second["id"]);

  let other: serde_json::Value =
    serde_json::from_slice(&run_release_matrix(&project.path, &["plan", "--ref", "v1.0.1", "--json"])?.stdout)?;
  assert_ne!(first["id"], other["id"]);
  Ok(())
}

#[test]
fn test_plan_single_cell() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["plan", "--ref", "v1.0.0", "--cell", "windows"])?;
  let out = stdout(&output);
  assert!(out.contains("--onefile"), "missing packager call:\n{}", out);
  assert!(out.contains("YouTube_Downloader_Windows.exe"), "missing artifact name:\n{}", out);
  assert!(!out.contains("ubuntu"), "other cells leaked into single-cell plan:\n{}", out);
  Ok(())
}

#[test]
fn test_plan_single_cell_json() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["plan", "--ref", "v1.0.0", "--cell", "macos", "--json"])?;
  let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;

  assert_eq!(plan["cell"]["platform"], "macos");
  let operations = plan["operations"].as_array().expect("operations array");
  assert!(!operations.is_empty());
  assert!(operations.iter().all(|op| op["cell"] == "macos"), "other cells leaked: {:?}", operations);
  Ok(())
}

#[test]
fn test_plan_unknown_cell_is_a_user_error() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix_with_env(&project.path, &["plan", "--ref", "v1.0.0", "--cell", "freebsd"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("Unknown build cell 'freebsd'"));
  Ok(())
}

#[test]
fn test_plan_skips_non_release_ref() -> Result<()> {
  let project = TestProject::new()?;
  let output = run_release_matrix(&project.path, &["plan", "--ref", "refs/heads/main"])?;
  assert!(stdout(&output).contains("Skipping 'refs/heads/main'"));
  Ok(())
}

#[test]
fn test_plan_respects_config() -> Result<()> {
  let project = TestProject::new()?;
  project.write_config(
    r#"
[app]
artifact_prefix = "Clipper"

[release]
backend = "directory"
policy = "partial"
"#,
  )?;

  let output = run_release_matrix(&project.path, &["plan", "--ref", "v2.1.0", "--json"])?;
  let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  let publish = plan["operations"]
    .as_array()
    .and_then(|ops| ops.last())
    .expect("publish operation");
  assert_eq!(publish["backend"], "directory");
  assert_eq!(publish["policy"], "partial");
  assert!(
    publish["assets"]
      .as_array()
      .expect("assets")
      .iter()
      .any(|a| a == "Clipper_macOS")
  );
  Ok(())
}

#[test]
fn test_invalid_config_is_a_user_error() -> Result<()> {
  let project = TestProject::new()?;
  project.write_config("[build]\ntimeout_secs = \"soon\"\n")?;
  let output = run_release_matrix_with_env(&project.path, &["plan", "--ref", "v1.0.0"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  Ok(())
}
