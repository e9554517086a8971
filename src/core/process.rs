//! External command execution for build steps
//!
//! Build cells never call `std::process::Command` directly; they describe a
//! [`StepCommand`] and hand it to a [`CommandRunner`]. The system runner enforces the
//! cell deadline and observes the run's [`CancelToken`], killing the child when either fires.

use crate::core::context::CancelToken;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// One external command, fully described
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
  pub program: String,
  pub args: Vec<String>,
  /// Added on top of the inherited environment
  pub env: BTreeMap<String, String>,
  pub cwd: PathBuf,
}

impl StepCommand {
  pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: BTreeMap::new(),
      cwd: cwd.into(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
    self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }
}

impl fmt::Display for StepCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (k, v) in &self.env {
      write!(f, "{}={} ", k, v)?;
    }
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      if arg.contains(char::is_whitespace) {
        write!(f, " \"{}\"", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub success: bool,
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  /// Last non-empty stderr line, falling back to the exit code
  pub fn failure_summary(&self) -> String {
    self
      .stderr
      .lines()
      .rev()
      .find(|l| !l.trim().is_empty())
      .map(|l| l.trim().to_string())
      .unwrap_or_else(|| match self.code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
      })
  }
}

/// Why a command produced no output
#[derive(Debug)]
pub enum RunError {
  /// The program could not be started
  Spawn { program: String, source: io::Error },
  /// The cell deadline passed while the command ran
  TimedOut,
  /// The run was cancelled while the command ran
  Cancelled,
  /// Waiting on the child failed
  Io(io::Error),
}

impl fmt::Display for RunError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunError::Spawn { program, source } => write!(f, "failed to start {}: {}", program, source),
      RunError::TimedOut => write!(f, "timed out"),
      RunError::Cancelled => write!(f, "cancelled"),
      RunError::Io(e) => write!(f, "I/O error while waiting: {}", e),
    }
  }
}

/// Executes step commands
pub trait CommandRunner: Send + Sync {
  /// Run to completion, or until `deadline` passes or `cancel` fires
  fn run(&self, cmd: &StepCommand, deadline: Instant, cancel: &CancelToken) -> Result<CommandOutput, RunError>;
}

/// Runs commands as child processes of this process
pub struct SystemRunner {
  poll_interval: Duration,
}

impl SystemRunner {
  pub fn new() -> Self {
    Self {
      poll_interval: Duration::from_millis(100),
    }
  }

  fn spawn(cmd: &StepCommand) -> Result<Child, RunError> {
    let mut command = Command::new(&cmd.program);
    command
      .args(&cmd.args)
      .envs(&cmd.env)
      .current_dir(&cmd.cwd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    // Own process group, so stopping the step also reaches pip/PyInstaller children
    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      command.process_group(0);
    }

    command.spawn().map_err(|source| RunError::Spawn {
      program: cmd.program.clone(),
      source,
    })
  }
}

impl Default for SystemRunner {
  fn default() -> Self {
    Self::new()
  }
}

/// Drain a pipe on its own thread so a chatty child never blocks on a full buffer
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
  })
}

/// Kill the step and everything it started
fn stop(child: &mut Child) {
  // The group id is the child's pid (`process_group(0)`)
  #[cfg(unix)]
  {
    let status = Command::new("kill")
      .args(["-KILL", "--", &format!("-{}", child.id())])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status();
    if !matches!(status, Ok(s) if s.success()) {
      tracing::debug!(pid = child.id(), "process group kill failed, killing the child only");
    }
  }
  let _ = child.kill();
  let _ = child.wait();
}

impl CommandRunner for SystemRunner {
  fn run(&self, cmd: &StepCommand, deadline: Instant, cancel: &CancelToken) -> Result<CommandOutput, RunError> {
    if cancel.is_cancelled() {
      return Err(RunError::Cancelled);
    }
    if Instant::now() >= deadline {
      return Err(RunError::TimedOut);
    }

    tracing::debug!(command = %cmd, cwd = %cmd.cwd.display(), "spawning");
    let mut child = Self::spawn(cmd)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
      match child.try_wait() {
        Ok(Some(status)) => break status,
        Ok(None) => {}
        Err(e) => {
          stop(&mut child);
          return Err(RunError::Io(e));
        }
      }

      if cancel.is_cancelled() {
        stop(&mut child);
        return Err(RunError::Cancelled);
      }
      if Instant::now() >= deadline {
        tracing::warn!(command = %cmd, "deadline reached, killing");
        stop(&mut child);
        return Err(RunError::TimedOut);
      }

      thread::sleep(self.poll_interval);
    };

    Ok(CommandOutput {
      success: status.success(),
      code: status.code(),
      stdout: stdout.join().unwrap_or_default(),
      stderr: stderr.join().unwrap_or_default(),
    })
  }
}
