//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Stands in for the Python interpreter: pip succeeds, certifi prints a bundle path,
/// and `-m PyInstaller` writes a binary into `--distpath` unless the cell is
/// named by `FAKE_FAIL_CELL`.
const FAKE_PYTHON: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "Python 3.11.9"; exit 0 ;;
  -c) echo "CERT_PATH"; exit 0 ;;
esac

if [ "$1" = "-m" ] && [ "$2" = "pip" ]; then
  exit 0
fi

if [ "$1" = "-m" ] && [ "$2" = "PyInstaller" ]; then
  dist=""
  name=""
  while [ $# -gt 0 ]; do
    case "$1" in
      --distpath) dist="$2"; shift ;;
      --name) name="$2"; shift ;;
    esac
    shift
  done
  cell=$(basename "$(dirname "$dist")")
  if [ -n "$FAKE_FAIL_CELL" ] && [ "$cell" = "$FAKE_FAIL_CELL" ]; then
    echo "simulated packager crash" >&2
    exit 1
  fi
  mkdir -p "$dist"
  printf 'binary for %s\n' "$cell" > "$dist/$name"
  exit 0
fi

echo "unexpected invocation: $*" >&2
exit 2
"#;

/// A temporary application project with a release.toml
pub struct TestProject {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestProject {
  /// Empty project, no config file
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();
    std::fs::write(path.join("main.py"), "print('hello')\n")?;
    std::fs::write(path.join("requirements.txt"), "PyQt6\nyt-dlp\n")?;
    Ok(Self { _root: root, path })
  }

  /// Project whose toolchain is the fake python script, publishing to a directory
  #[cfg(unix)]
  pub fn with_fake_toolchain() -> Result<Self> {
    use std::os::unix::fs::PermissionsExt;

    let project = Self::new()?;
    let cert = project.path.join("cacert.pem");
    std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\n")?;

    let script = project.path.join("fake-python");
    std::fs::write(&script, FAKE_PYTHON.replace("CERT_PATH", &cert.display().to_string()))?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

    project.write_config(&format!(
      r#"
[toolchain]
python = '{}'
system_installer = ["true"]

[build]
timeout_secs = 120

[release]
backend = "directory"
"#,
      script.display()
    ))?;
    Ok(project)
  }

  pub fn write_config(&self, content: &str) -> Result<()> {
    std::fs::write(self.path.join("release.toml"), content)?;
    Ok(())
  }

  /// Release directory of the `directory` backend for a tag
  pub fn release_dir(&self, tag: &str) -> PathBuf {
    self.path.join("build/releases").join(tag)
  }

  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }
}

fn command(cwd: &Path, args: &[&str], envs: &[(&str, &str)]) -> Command {
  let mut cmd = Command::new(env!("CARGO_BIN_EXE_release-matrix"));
  cmd
    .current_dir(cwd)
    .args(args)
    .env_remove("GITHUB_REF")
    .env_remove("RELEASE_MATRIX_LOG")
    .env_remove("FAKE_FAIL_CELL")
    .envs(envs.iter().copied());
  cmd
}

/// Run release-matrix and require success
pub fn run_release_matrix(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = command(cwd, args, &[])
    .output()
    .context("Failed to run release-matrix")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "release-matrix command failed: release-matrix {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Run release-matrix with extra environment, whatever the exit status
pub fn run_release_matrix_with_env(cwd: &Path, args: &[&str], envs: &[(&str, &str)]) -> Result<Output> {
  command(cwd, args, envs)
    .output()
    .context("Failed to run release-matrix")
}

pub fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).into_owned()
}
