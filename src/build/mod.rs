//! Per-cell build pipeline
//!
//! Each cell walks a strictly sequential state machine:
//!
//! ```text
//! Init -> DependencyInstall -> LocateCertBundle -> Compile -> Rename
//!      -> (MakeExecutable, cells that need it) -> StoreArtifact
//! ```
//!
//! A failing step ends only its own cell. The outcome is a value ([`CellOutcome`]) so the
//! release stage can see every cell, failed or not, after the join.

pub mod steps;

use crate::core::context::PipelineContext;
use crate::core::process::{CommandOutput, CommandRunner, RunError, StepCommand};
use crate::matrix::{BuildCell, Platform};
use crate::store::{ArtifactMeta, ArtifactStore, Blob};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use steps::CellDirs;

/// Position of a cell in its build state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
  Init,
  DependencyInstall,
  LocateCertBundle,
  Compile,
  Rename,
  MakeExecutable,
  StoreArtifact,
  Succeeded,
  Failed,
}

impl BuildState {
  /// The working states a cell passes through, in order
  pub fn sequence(cell: &BuildCell) -> Vec<BuildState> {
    let mut states = vec![
      BuildState::Init,
      BuildState::DependencyInstall,
      BuildState::LocateCertBundle,
      BuildState::Compile,
      BuildState::Rename,
    ];
    if cell.params.executable {
      states.push(BuildState::MakeExecutable);
    }
    states.push(BuildState::StoreArtifact);
    states
  }
}

impl fmt::Display for BuildState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildState::Init => "init",
      BuildState::DependencyInstall => "dependency install",
      BuildState::LocateCertBundle => "locate cert bundle",
      BuildState::Compile => "compile",
      BuildState::Rename => "rename",
      BuildState::MakeExecutable => "make executable",
      BuildState::StoreArtifact => "store artifact",
      BuildState::Succeeded => "succeeded",
      BuildState::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// Category of a cell-local failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFailureKind {
  Workspace,
  DependencyInstall,
  CertLocate,
  Compile,
  Rename,
  MakeExecutable,
  StoreArtifact,
  TimedOut,
  Cancelled,
}

impl CellFailureKind {
  fn for_step(step: BuildState) -> Self {
    match step {
      BuildState::DependencyInstall => CellFailureKind::DependencyInstall,
      BuildState::LocateCertBundle => CellFailureKind::CertLocate,
      BuildState::Compile => CellFailureKind::Compile,
      BuildState::Rename => CellFailureKind::Rename,
      BuildState::MakeExecutable => CellFailureKind::MakeExecutable,
      BuildState::StoreArtifact => CellFailureKind::StoreArtifact,
      BuildState::Init | BuildState::Succeeded | BuildState::Failed => CellFailureKind::Workspace,
    }
  }
}

impl fmt::Display for CellFailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      CellFailureKind::Workspace => "workspace setup failure",
      CellFailureKind::DependencyInstall => "dependency install failure",
      CellFailureKind::CertLocate => "CA bundle lookup failure",
      CellFailureKind::Compile => "compile failure",
      CellFailureKind::Rename => "rename failure",
      CellFailureKind::MakeExecutable => "permission failure",
      CellFailureKind::StoreArtifact => "artifact store failure",
      CellFailureKind::TimedOut => "timeout",
      CellFailureKind::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// Why one cell did not produce its artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellFailure {
  pub cell: Platform,
  /// Step that was running when the cell failed
  pub step: BuildState,
  pub kind: CellFailureKind,
  pub detail: String,
}

impl fmt::Display for CellFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Cell '{}' failed during {} ({}): {}",
      self.cell, self.step, self.kind, self.detail
    )
  }
}

/// Terminal state of one cell
#[derive(Debug, Clone, Serialize)]
pub struct CellOutcome {
  pub cell: Platform,
  pub label: String,
  #[serde(serialize_with = "serialize_secs")]
  pub duration: Duration,
  pub result: Result<ArtifactMeta, CellFailure>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_f64(d.as_secs_f64())
}

impl CellOutcome {
  pub fn state(&self) -> BuildState {
    if self.result.is_ok() {
      BuildState::Succeeded
    } else {
      BuildState::Failed
    }
  }

  pub fn failure(&self) -> Option<&CellFailure> {
    self.result.as_ref().err()
  }
}

/// Everything one cell needs while it runs
struct CellContext<'a> {
  cell: &'a BuildCell,
  ctx: &'a PipelineContext,
  runner: &'a dyn CommandRunner,
  store: &'a dyn ArtifactStore,
  dirs: CellDirs,
  deadline: Instant,
}

/// Executes the build state machine for cells
pub struct PlatformBuildStep<'a> {
  ctx: &'a PipelineContext,
  runner: &'a dyn CommandRunner,
  store: &'a dyn ArtifactStore,
  timeout: Duration,
}

impl<'a> PlatformBuildStep<'a> {
  pub fn new(ctx: &'a PipelineContext, runner: &'a dyn CommandRunner, store: &'a dyn ArtifactStore) -> Self {
    Self {
      ctx,
      runner,
      store,
      timeout: Duration::from_secs(ctx.config.build.timeout_secs),
    }
  }

  /// Override the per-cell time budget
  #[cfg(test)]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Run one cell to a terminal state, reporting each state entered
  pub fn run(&self, cell: &BuildCell, on_state: &(dyn Fn(Platform, BuildState) + Sync)) -> CellOutcome {
    let span = tracing::info_span!("cell", id = cell.id());
    let _guard = span.enter();

    let started = Instant::now();
    let run = CellContext {
      cell,
      ctx: self.ctx,
      runner: self.runner,
      store: self.store,
      dirs: CellDirs::new(&self.ctx.work_dir(), cell),
      deadline: started + self.timeout,
    };

    let result = run.execute(&|state| on_state(cell.platform, state));
    match &result {
      Ok(meta) => {
        tracing::info!(artifact = %meta.name, size = meta.size, "cell succeeded");
        on_state(cell.platform, BuildState::Succeeded);
      }
      Err(failure) => {
        tracing::error!(step = %failure.step, kind = %failure.kind, detail = %failure.detail, "cell failed");
        on_state(cell.platform, BuildState::Failed);
      }
    }

    CellOutcome {
      cell: cell.platform,
      label: cell.label.clone(),
      duration: started.elapsed(),
      result,
    }
  }
}

impl CellContext<'_> {
  fn execute(&self, on_state: &dyn Fn(BuildState)) -> Result<ArtifactMeta, CellFailure> {
    let mut produced: Option<PathBuf> = None;
    let mut cert_bundle: Option<PathBuf> = None;
    let mut stored: Option<ArtifactMeta> = None;

    for step in BuildState::sequence(self.cell) {
      self.checkpoint(step)?;
      on_state(step);
      tracing::debug!(step = %step, "entering step");

      match step {
        BuildState::Init => self.init().map_err(|e| self.fail(step, e.to_string()))?,
        BuildState::DependencyInstall => self.install_dependencies()?,
        BuildState::LocateCertBundle => cert_bundle = Some(self.locate_cert_bundle()?),
        BuildState::Compile => {
          let bundle = cert_bundle
            .as_deref()
            .ok_or_else(|| self.fail(step, "no CA bundle located"))?;
          self.compile(bundle)?;
        }
        BuildState::Rename => produced = Some(self.rename()?),
        BuildState::MakeExecutable => {
          let path = produced.as_deref().ok_or_else(|| self.fail(step, "no artifact file"))?;
          make_executable(path).map_err(|e| self.fail(step, e.to_string()))?;
        }
        BuildState::StoreArtifact => {
          let path = produced.as_deref().ok_or_else(|| self.fail(step, "no artifact file"))?;
          stored = Some(self.store_artifact(path)?);
        }
        BuildState::Succeeded | BuildState::Failed => {}
      }
    }

    stored.ok_or_else(|| self.fail(BuildState::StoreArtifact, "state machine ended without storing"))
  }

  fn fail(&self, step: BuildState, detail: impl Into<String>) -> CellFailure {
    self.fail_as(step, CellFailureKind::for_step(step), detail)
  }

  fn fail_as(&self, step: BuildState, kind: CellFailureKind, detail: impl Into<String>) -> CellFailure {
    CellFailure {
      cell: self.cell.platform,
      step,
      kind,
      detail: detail.into(),
    }
  }

  /// Cancellation and deadline are checked between steps as well as inside commands
  fn checkpoint(&self, step: BuildState) -> Result<(), CellFailure> {
    if self.ctx.cancel.is_cancelled() {
      return Err(self.fail_as(step, CellFailureKind::Cancelled, "run cancelled"));
    }
    if Instant::now() >= self.deadline {
      return Err(self.fail_as(step, CellFailureKind::TimedOut, "cell time budget exhausted"));
    }
    Ok(())
  }

  fn run_command(&self, step: BuildState, cmd: &StepCommand) -> Result<CommandOutput, CellFailure> {
    match self.runner.run(cmd, self.deadline, &self.ctx.cancel) {
      Ok(out) if out.success => Ok(out),
      Ok(out) => Err(self.fail(step, format!("`{}` {}", cmd, out.failure_summary()))),
      Err(RunError::TimedOut) => Err(self.fail_as(
        step,
        CellFailureKind::TimedOut,
        format!("`{}` exceeded the cell time budget", cmd),
      )),
      Err(RunError::Cancelled) => Err(self.fail_as(step, CellFailureKind::Cancelled, "run cancelled")),
      Err(e) => Err(self.fail(step, e.to_string())),
    }
  }

  /// Fresh, cell-owned work directory
  fn init(&self) -> io::Result<()> {
    if self.dirs.root.exists() {
      fs::remove_dir_all(&self.dirs.root)?;
    }
    fs::create_dir_all(&self.dirs.dist)?;
    fs::create_dir_all(&self.dirs.work)?;
    fs::create_dir_all(&self.dirs.spec)?;
    Ok(())
  }

  fn install_dependencies(&self) -> Result<(), CellFailure> {
    let requirements = self.ctx.resolve(&self.ctx.config.app.requirements);
    let requirements = if requirements.is_file() {
      Some(requirements)
    } else {
      tracing::warn!(path = %requirements.display(), "requirements file not found, installing packager only");
      None
    };

    let commands = steps::dependency_commands(
      self.cell,
      &self.ctx.config.toolchain,
      requirements.as_deref(),
      &self.ctx.root,
    );
    for cmd in &commands {
      self.run_command(BuildState::DependencyInstall, cmd)?;
    }
    Ok(())
  }

  fn locate_cert_bundle(&self) -> Result<PathBuf, CellFailure> {
    let step = BuildState::LocateCertBundle;

    let path = match &self.ctx.config.toolchain.cert_bundle {
      Some(configured) => self.ctx.resolve(configured),
      None => {
        let cmd = steps::cert_locate_command(self.cell, &self.ctx.config.toolchain, &self.ctx.root);
        let out = self.run_command(step, &cmd)?;
        let line = out
          .stdout
          .lines()
          .rev()
          .map(str::trim)
          .find(|l| !l.is_empty())
          .ok_or_else(|| self.fail(step, "certifi printed no path"))?;
        PathBuf::from(line)
      }
    };

    if !path.is_file() {
      return Err(self.fail(step, format!("CA bundle {} does not exist", path.display())));
    }
    tracing::debug!(bundle = %path.display(), "located CA bundle");
    Ok(path)
  }

  fn compile(&self, cert_bundle: &Path) -> Result<(), CellFailure> {
    let config = &self.ctx.config;
    let cmd = steps::compile_command(
      self.cell,
      &config.app,
      &config.toolchain,
      &self.dirs,
      cert_bundle,
      &self.ctx.root,
    );
    self.run_command(BuildState::Compile, &cmd).map(|_| ())
  }

  fn rename(&self) -> Result<PathBuf, CellFailure> {
    let step = BuildState::Rename;
    let candidates = self
      .dirs
      .produced_candidates(self.cell, &self.ctx.config.app.artifact_prefix);
    let produced = candidates.iter().find(|p| p.is_file()).ok_or_else(|| {
      let looked: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
      self.fail(step, format!("packager output not found (looked for {})", looked.join(", ")))
    })?;

    let target = self.dirs.artifact_path(self.cell);
    fs::rename(produced, &target).map_err(|e| self.fail(step, e.to_string()))?;
    tracing::debug!(from = %produced.display(), to = %target.display(), "renamed artifact");
    Ok(target)
  }

  fn store_artifact(&self, path: &Path) -> Result<ArtifactMeta, CellFailure> {
    let step = BuildState::StoreArtifact;
    let bytes = fs::read(path).map_err(|e| self.fail(step, e.to_string()))?;
    let blob = Blob::new(bytes, self.cell.params.executable);
    self
      .store
      .put(&self.cell.artifact_key(), blob)
      .map_err(|e| self.fail(step, e.to_string()))
  }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = fs::metadata(path)?.permissions();
  perms.set_mode(perms.mode() | 0o755);
  fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(path: &Path) -> io::Result<()> {
  // No permission bits to set; the store records the flag
  fs::metadata(path).map(|_| ())
}


#[cfg(test)]
mod tests {
  use super::testing::FakeToolchain;
  use super::*;
  use crate::core::config::PipelineConfig;
  use crate::matrix::MatrixPlanner;
  use crate::store::MemoryArtifactStore;
  use std::sync::Mutex;

  struct Fixture {
    _dir: tempfile::TempDir,
    ctx: PipelineContext,
    cert: PathBuf,
  }

  fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cert = dir.path().join("cacert.pem");
    fs::write(&cert, "-----BEGIN CERTIFICATE-----").unwrap();
    let ctx = PipelineContext::with_config(dir.path(), PipelineConfig::default());
    Fixture { _dir: dir, ctx, cert }
  }

  fn cell(ctx: &PipelineContext, platform: Platform) -> BuildCell {
    MatrixPlanner::from_config(&ctx.config).cell(platform)
  }

  fn no_states(_: Platform, _: BuildState) {}

  #[test]
  fn test_state_sequence_skips_chmod_on_windows() {
    let f = fixture();
    let win = BuildState::sequence(&cell(&f.ctx, Platform::Windows));
    assert!(!win.contains(&BuildState::MakeExecutable));
    let mac = BuildState::sequence(&cell(&f.ctx, Platform::MacOs));
    assert_eq!(mac[mac.len() - 2], BuildState::MakeExecutable);
    assert_eq!(*mac.last().unwrap(), BuildState::StoreArtifact);
  }

  #[test]
  fn test_successful_cell_stores_artifact_under_cell_key() {
    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone());
    let store = MemoryArtifactStore::new();
    let step = PlatformBuildStep::new(&f.ctx, &runner, &store);
    let c = cell(&f.ctx, Platform::MacOs);

    let outcome = step.run(&c, &no_states);
    let meta = outcome.result.as_ref().unwrap();
    assert_eq!(meta.name, "YouTube_Downloader_macOS");
    assert_eq!(outcome.state(), BuildState::Succeeded);

    let blob = store.get(&c.artifact_key()).unwrap();
    assert_eq!(blob.bytes, b"binary macos");
    assert!(blob.executable);
  }

  #[test]
  fn test_states_reported_in_order() {
    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone());
    let store = MemoryArtifactStore::new();
    let seen = Mutex::new(Vec::new());
    let c = cell(&f.ctx, Platform::Windows);

    PlatformBuildStep::new(&f.ctx, &runner, &store).run(&c, &|_, s| seen.lock().unwrap().push(s));

    let mut expected = BuildState::sequence(&c);
    expected.push(BuildState::Succeeded);
    assert_eq!(*seen.lock().unwrap(), expected);
  }

  #[test]
  fn test_compile_failure_is_cell_local() {
    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone()).failing("macos", BuildState::Compile);
    let store = MemoryArtifactStore::new();
    let step = PlatformBuildStep::new(&f.ctx, &runner, &store);

    let failed = step.run(&cell(&f.ctx, Platform::MacOs), &no_states);
    let failure = failed.failure().unwrap();
    assert_eq!(failure.kind, CellFailureKind::Compile);
    assert_eq!(failure.step, BuildState::Compile);
    assert!(failure.detail.contains("simulated compile failure"));

    let ok = step.run(&cell(&f.ctx, Platform::Ubuntu2204), &no_states);
    assert!(ok.result.is_ok());
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_missing_cert_bundle_fails_cell() {
    let f = fixture();
    let runner = FakeToolchain::new(f.ctx.root.join("nope.pem"));
    let store = MemoryArtifactStore::new();
    let outcome = PlatformBuildStep::new(&f.ctx, &runner, &store).run(&cell(&f.ctx, Platform::Windows), &no_states);
    assert_eq!(outcome.failure().unwrap().kind, CellFailureKind::CertLocate);
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn test_configured_cert_bundle_skips_lookup() {
    let f = fixture();
    let mut config = (*f.ctx.config).clone();
    config.toolchain.cert_bundle = Some(f.cert.clone());
    let ctx = PipelineContext::with_config(&f.ctx.root, config);
    let runner = FakeToolchain::new(PathBuf::from("/unused"));
    let store = MemoryArtifactStore::new();

    let outcome = PlatformBuildStep::new(&ctx, &runner, &store).run(&cell(&ctx, Platform::Ubuntu2004), &no_states);
    assert!(outcome.result.is_ok());
    let calls = runner.calls.lock().unwrap();
    assert!(calls.iter().all(|c| c.args.first().map(String::as_str) != Some("-c")));
  }

  #[test]
  fn test_timeout_fails_cell() {
    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone()).hanging("ubuntu-20.04");
    let store = MemoryArtifactStore::new();
    let outcome = PlatformBuildStep::new(&f.ctx, &runner, &store)
      .with_timeout(Duration::from_millis(100))
      .run(&cell(&f.ctx, Platform::Ubuntu2004), &no_states);
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, CellFailureKind::TimedOut);
    assert_eq!(failure.step, BuildState::Compile);
  }

  #[test]
  fn test_cancelled_run_stops_before_first_step() {
    let f = fixture();
    f.ctx.cancel.cancel();
    let runner = FakeToolchain::new(f.cert.clone());
    let store = MemoryArtifactStore::new();
    let outcome = PlatformBuildStep::new(&f.ctx, &runner, &store).run(&cell(&f.ctx, Platform::MacOs), &no_states);
    assert_eq!(outcome.failure().unwrap().kind, CellFailureKind::Cancelled);
    assert!(runner.calls.lock().unwrap().is_empty());
  }

  #[test]
  fn test_rename_produces_canonical_file() {
    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone());
    let store = MemoryArtifactStore::new();
    let c = cell(&f.ctx, Platform::Ubuntu2204);
    PlatformBuildStep::new(&f.ctx, &runner, &store).run(&c, &no_states);

    let dirs = CellDirs::new(&f.ctx.work_dir(), &c);
    assert!(dirs.artifact_path(&c).is_file());
    assert!(!dirs.dist.join("YouTube_Downloader").exists());
  }

  #[cfg(unix)]
  #[test]
  fn test_unix_cells_get_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let f = fixture();
    let runner = FakeToolchain::new(f.cert.clone());
    let store = MemoryArtifactStore::new();
    let c = cell(&f.ctx, Platform::Ubuntu2004);
    PlatformBuildStep::new(&f.ctx, &runner, &store).run(&c, &no_states);

    let path = CellDirs::new(&f.ctx.work_dir(), &c).artifact_path(&c);
    let mode = fs::metadata(path).unwrap().permissions().mode();
    assert_eq!(mode & 0o755, 0o755);
  }
}
