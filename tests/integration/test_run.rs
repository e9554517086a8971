//! End-to-end runs with the fake toolchain and the directory backend

use crate::helpers::*;
use anyhow::Result;
use std::os::unix::fs::PermissionsExt;

const ASSETS: [&str; 4] = [
  "YouTube_Downloader_Windows.exe",
  "YouTube_Downloader_Linux",
  "YouTube_Downloader_Linux_Legacy",
  "YouTube_Downloader_macOS",
];

fn release_json(project: &TestProject, tag: &str) -> Result<serde_json::Value> {
  let raw = std::fs::read(project.release_dir(tag).join("release.json"))?;
  Ok(serde_json::from_slice(&raw)?)
}

#[test]
fn test_run_publishes_one_release_with_every_asset() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix(&project.path, &["run", "--ref", "v1.0.0"])?;
  assert!(stdout(&output).contains("Published v1.0.0 (4 assets)"));

  let release = project.release_dir("v1.0.0");
  for asset in ASSETS {
    assert!(release.join(asset).is_file(), "missing asset {}", asset);
  }
  assert_eq!(
    std::fs::read_to_string(release.join("YouTube_Downloader_macOS"))?,
    "binary for macos\n"
  );

  let mode = std::fs::metadata(release.join("YouTube_Downloader_Linux"))?
    .permissions()
    .mode();
  assert_eq!(mode & 0o111, 0o111, "linux asset should be executable");

  let manifest = release_json(&project, "v1.0.0")?;
  assert_eq!(manifest["tag"], "v1.0.0");
  assert_eq!(manifest["assets"].as_array().map(Vec::len), Some(4));
  assert_eq!(manifest["missing_cells"].as_array().map(Vec::len), Some(0));
  Ok(())
}

#[test]
fn test_second_run_for_same_tag_is_refused() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  run_release_matrix(&project.path, &["run", "--ref", "v1.0.0"])?;

  let output = run_release_matrix_with_env(&project.path, &["run", "--ref", "v1.0.0"], &[])?;
  assert_eq!(output.status.code(), Some(4));
  assert!(stderr(&output).contains("already exists"));
  Ok(())
}

#[test]
fn test_failed_cell_blocks_the_release() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix_with_env(&project.path, &["run", "--ref", "v1.1.0"], &[("FAKE_FAIL_CELL", "macos")])?;

  assert_eq!(output.status.code(), Some(3));
  let err = stderr(&output);
  assert!(err.contains("macos"), "error should name the failed cell:\n{}", err);
  assert!(stdout(&output).contains("compile failure"));
  assert!(!project.release_dir("v1.1.0").exists());
  Ok(())
}

#[test]
fn test_allow_partial_publishes_the_rest() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix_with_env(
    &project.path,
    &["run", "--ref", "v1.2.0", "--allow-partial"],
    &[("FAKE_FAIL_CELL", "windows")],
  )?;
  assert!(output.status.success(), "partial run failed:\n{}", stderr(&output));

  let release = project.release_dir("v1.2.0");
  assert!(!release.join("YouTube_Downloader_Windows.exe").exists());
  assert!(release.join("YouTube_Downloader_Linux").is_file());

  let manifest = release_json(&project, "v1.2.0")?;
  assert_eq!(manifest["assets"].as_array().map(Vec::len), Some(3));
  assert_eq!(manifest["missing_cells"][0]["cell"], "windows");
  Ok(())
}

#[test]
fn test_skipped_ref_does_nothing() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix(&project.path, &["run", "--ref", "refs/heads/main"])?;
  assert!(stdout(&output).contains("Skipping"));
  assert!(!project.file_exists("build"));
  Ok(())
}

#[test]
fn test_run_json_output() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix(&project.path, &["run", "--ref", "v1.3.0", "--json"])?;
  let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;

  assert_eq!(report["tag"], "v1.3.0");
  assert_eq!(report["outcomes"].as_array().map(Vec::len), Some(4));
  assert_eq!(report["release"]["receipt"]["assets"], 4);
  Ok(())
}

#[test]
fn test_split_build_then_publish() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;

  run_release_matrix(&project.path, &["build", "--ref", "v2.0.0", "--cell", "ubuntu-22.04"])?;
  assert!(project.file_exists("build/artifacts/v2.0.0"));

  // Three cells never built: nothing is published
  let output = run_release_matrix_with_env(&project.path, &["publish", "--ref", "v2.0.0"], &[])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(!project.release_dir("v2.0.0").exists());

  for cell in ["windows", "ubuntu-20.04", "macos"] {
    run_release_matrix(&project.path, &["build", "--ref", "v2.0.0", "--cell", cell])?;
  }
  let output = run_release_matrix(&project.path, &["publish", "--ref", "v2.0.0"])?;
  assert!(stdout(&output).contains("Published v2.0.0 (4 assets)"));
  for asset in ASSETS {
    assert!(project.release_dir("v2.0.0").join(asset).is_file(), "missing asset {}", asset);
  }
  Ok(())
}

#[test]
fn test_build_failure_exits_with_build_code() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let output = run_release_matrix_with_env(
    &project.path,
    &["build", "--ref", "v2.1.0", "--cell", "macos"],
    &[("FAKE_FAIL_CELL", "macos")],
  )?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("Cell 'macos' failed during compile"));
  Ok(())
}

#[test]
fn test_relative_root_builds_in_the_project() -> Result<()> {
  let project = TestProject::with_fake_toolchain()?;
  let parent = project.path.parent().expect("temp project has a parent");
  let name = project
    .path
    .file_name()
    .and_then(|n| n.to_str())
    .expect("temp project has a utf-8 name");

  run_release_matrix(parent, &["--root", name, "run", "--ref", "v3.0.0"])?;

  for asset in ASSETS {
    assert!(project.release_dir("v3.0.0").join(asset).is_file(), "missing asset {}", asset);
  }
  assert!(!project.path.join(name).exists(), "paths were resolved twice");
  Ok(())
}
