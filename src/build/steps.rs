//! Command construction for each build step
//!
//! Pure functions from (cell, config, paths) to [`StepCommand`]s, so the exact
//! invocations can be planned, printed and tested without running anything.

use crate::core::config::{AppConfig, ToolchainConfig};
use crate::core::process::StepCommand;
use crate::matrix::{BuildCell, Console};
use std::path::{Path, PathBuf};

/// Directories owned by one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDirs {
  pub root: PathBuf,
  pub dist: PathBuf,
  pub work: PathBuf,
  pub spec: PathBuf,
}

impl CellDirs {
  pub fn new(work_dir: &Path, cell: &BuildCell) -> Self {
    let root = work_dir.join(cell.id());
    Self {
      dist: root.join("dist"),
      work: root.join("build"),
      spec: root.join("spec"),
      root,
    }
  }

  /// Where Rename puts the canonical artifact
  pub fn artifact_path(&self, cell: &BuildCell) -> PathBuf {
    self.root.join(cell.artifact_key().file_name())
  }

  /// Possible packager outputs, most specific first
  pub fn produced_candidates(&self, cell: &BuildCell, binary_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(ext) = &cell.params.extension {
      candidates.push(self.dist.join(format!("{}.{}", binary_name, ext)));
    }
    candidates.push(self.dist.join(binary_name));
    candidates
  }
}

/// Runtime check, pip bootstrap, app dependencies, then cell extras
pub fn dependency_commands(
  cell: &BuildCell,
  toolchain: &ToolchainConfig,
  requirements: Option<&Path>,
  project_root: &Path,
) -> Vec<StepCommand> {
  let python = |args: &[&str]| {
    StepCommand::new(&toolchain.python, project_root)
      .args(args.iter().copied())
      .envs(&cell.params.headless_env)
  };

  let mut commands = vec![
    python(&["--version"]),
    python(&["-m", "pip", "install", "--upgrade", "pip"]),
  ];

  let mut install = python(&["-m", "pip", "install"]);
  if let Some(req) = requirements {
    install = install.arg("-r").arg(req.to_string_lossy());
  }
  commands.push(install.args([toolchain.packager_package.as_str(), "certifi"]));

  if !cell.params.extra_packages.is_empty()
    && let Some((program, prefix)) = toolchain.system_installer.split_first()
  {
    commands.push(
      StepCommand::new(program, project_root)
        .args(prefix.iter().cloned())
        .args(cell.params.extra_packages.iter().cloned())
        .envs(&cell.params.headless_env),
    );
  }

  commands
}

/// Ask the interpreter where certifi keeps its CA bundle
pub fn cert_locate_command(cell: &BuildCell, toolchain: &ToolchainConfig, project_root: &Path) -> StepCommand {
  StepCommand::new(&toolchain.python, project_root)
    .args(["-c", "import certifi; print(certifi.where())"])
    .envs(&cell.params.headless_env)
}

/// The single packager invocation for a cell
pub fn compile_command(
  cell: &BuildCell,
  app: &AppConfig,
  toolchain: &ToolchainConfig,
  dirs: &CellDirs,
  cert_bundle: &Path,
  project_root: &Path,
) -> StepCommand {
  let mut cmd = StepCommand::new(&toolchain.python, project_root)
    .args(["-m", toolchain.packager_module.as_str(), "--noconfirm", "--clean", "--onefile"]);

  if cell.params.console == Console::Hidden {
    cmd = cmd.arg("--windowed");
  }

  cmd = cmd
    .arg("--add-data")
    .arg(cell.add_data_arg(&cert_bundle.to_string_lossy(), &app.embedded_data_dir));

  for module in &cell.params.hidden_imports {
    cmd = cmd.arg("--hidden-import").arg(module);
  }

  cmd
    .arg("--name")
    .arg(&app.artifact_prefix)
    .arg("--distpath")
    .arg(dirs.dist.to_string_lossy())
    .arg("--workpath")
    .arg(dirs.work.to_string_lossy())
    .arg("--specpath")
    .arg(dirs.spec.to_string_lossy())
    .arg(project_root.join(&app.entry_point).to_string_lossy())
    .envs(&cell.params.headless_env)
}
