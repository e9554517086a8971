//! Progress indicators for the build matrix
//!
//! Uses `linya` for allocation-free, concurrency-optimized progress bars: one bar per
//! cell, advanced by the cell's state transitions from whichever worker thread runs it.

use crate::build::BuildState;
use crate::matrix::{BuildCell, Platform};
use linya::{Bar, Progress};
use std::sync::{Arc, Mutex};

/// Multi-bar progress for parallel operations
/// Thread-safe wrapper for concurrent progress tracking
#[derive(Clone)]
pub struct MultiProgress {
  progress: Arc<Mutex<Progress>>,
}

impl MultiProgress {
  /// Create a new multi-progress container
  pub fn new() -> Self {
    Self {
      progress: Arc::new(Mutex::new(Progress::new())),
    }
  }

  /// Add a new bar with a label and total
  pub fn add_bar(&self, total: usize, label: impl Into<String>) -> Option<Bar> {
    let mut progress = self.progress.lock().ok()?;
    Some(progress.bar(total, label.into()))
  }

  /// Increment a bar (thread-safe)
  pub fn inc(&self, bar: &Bar) {
    if let Ok(mut progress) = self.progress.lock() {
      progress.inc_and_draw(bar, 1);
    }
  }

  /// Jump a bar to a position (thread-safe)
  pub fn set(&self, bar: &Bar, pos: usize) {
    if let Ok(mut progress) = self.progress.lock() {
      progress.set_and_draw(bar, pos);
    }
  }
}

impl Default for MultiProgress {
  fn default() -> Self {
    Self::new()
  }
}

/// One bar per build cell, sized to the cell's state count
pub struct CellProgress {
  multi: Option<MultiProgress>,
  bars: Vec<(Platform, Bar, usize)>,
}

impl CellProgress {
  /// Bars are only drawn when `enabled` (off for `--quiet` and `--json`)
  pub fn new(cells: &[BuildCell], enabled: bool) -> Self {
    if !enabled {
      return Self::disabled();
    }

    let multi = MultiProgress::new();
    let bars = cells
      .iter()
      .filter_map(|cell| {
        let total = BuildState::sequence(cell).len();
        multi
          .add_bar(total, format!("{:<22}", cell.label))
          .map(|bar| (cell.platform, bar, total))
      })
      .collect();

    Self {
      multi: Some(multi),
      bars,
    }
  }

  pub fn disabled() -> Self {
    Self {
      multi: None,
      bars: Vec::new(),
    }
  }

  /// Advance the cell's bar for a state it just entered
  ///
  /// Entering a state completes the previous one; a failed cell's bar stays where it stopped.
  pub fn observe(&self, platform: Platform, state: BuildState) {
    let Some(multi) = &self.multi else {
      return;
    };
    let Some((_, bar, total)) = self.bars.iter().find(|(p, _, _)| *p == platform) else {
      return;
    };

    match state {
      BuildState::Init | BuildState::Failed => {}
      BuildState::Succeeded => multi.set(bar, *total),
      _ => multi.inc(bar),
    }
  }
}
