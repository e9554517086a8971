//! Pipeline wiring: gate → preflight → fan-out → join → release
//!
//! ```text
//! Tag ──► preflight (duplicate?) ──► cells.par_iter() ──► Vec<CellOutcome> ──► ReleasePublisher
//!                                     │  windows                (join)          │
//!                                     │  ubuntu-22.04                           └─► Publisher::publish (once)
//!                                     │  ubuntu-20.04
//!                                     └  macos
//! ```

use crate::build::{BuildState, CellFailureKind, CellOutcome, PlatformBuildStep};
use crate::core::config::PartialPolicy;
use crate::core::context::PipelineContext;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::process::CommandRunner;
use crate::matrix::{BuildCell, Platform};
use crate::release::{PublishReceipt, Publisher, ReleaseManifest, ReleasePublisher};
use crate::store::ArtifactStore;
use crate::trigger::Tag;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Knobs for one run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
  /// Publish what was built even if some cells failed
  pub allow_partial: bool,
  /// Cancel sibling cells after the first failure
  pub fail_fast: bool,
}

/// Everything a full run produced
#[derive(Debug)]
pub struct RunReport {
  /// Terminal state of every cell, in matrix order
  pub outcomes: Vec<CellOutcome>,
  /// The release stage result
  pub release: PipelineResult<(ReleaseManifest, PublishReceipt)>,
}

impl RunReport {
  pub fn failed_cells(&self) -> Vec<&CellOutcome> {
    self.outcomes.iter().filter(|o| o.result.is_err()).collect()
  }
}

/// The stages, bound to their collaborators
pub struct Pipeline<'a> {
  ctx: &'a PipelineContext,
  runner: &'a dyn CommandRunner,
  store: &'a dyn ArtifactStore,
  publisher: &'a dyn Publisher,
}

impl<'a> Pipeline<'a> {
  pub fn new(
    ctx: &'a PipelineContext,
    runner: &'a dyn CommandRunner,
    store: &'a dyn ArtifactStore,
    publisher: &'a dyn Publisher,
  ) -> Self {
    Self {
      ctx,
      runner,
      store,
      publisher,
    }
  }

  /// Refuse to build for a tag that is already released
  pub fn preflight(&self, tag: &Tag) -> PipelineResult<()> {
    if !self.ctx.config.release.preflight_duplicate_check {
      return Ok(());
    }
    if self.publisher.release_exists(tag)? {
      return Err(PipelineError::DuplicateRelease { tag: tag.to_string() });
    }
    tracing::debug!(tag = %tag, backend = self.publisher.name(), "no existing release");
    Ok(())
  }

  /// Run every cell in parallel and wait for all of them
  ///
  /// Cells get a pool of their own with one thread per cell, so a cell blocked on its packager
  /// never delays a sibling. The collect is the join barrier: it returns once every cell reached
  /// a terminal state.
  pub fn build_cells(
    &self,
    cells: &[BuildCell],
    fail_fast: bool,
    on_state: &(dyn Fn(Platform, BuildState) + Sync),
  ) -> Vec<CellOutcome> {
    let step = PlatformBuildStep::new(self.ctx, self.runner, self.store);
    let cancel = &self.ctx.cancel;

    let fan_out = || -> Vec<CellOutcome> {
      cells
        .par_iter()
        .map(|cell| {
          let outcome = step.run(cell, on_state);
          if fail_fast && outcome.state() == BuildState::Failed && !cancel.is_cancelled() {
            tracing::warn!(cell = cell.id(), "fail-fast: cancelling remaining cells");
            cancel.cancel();
          }
          outcome
        })
        .collect()
    };

    match rayon::ThreadPoolBuilder::new()
      .num_threads(cells.len().max(1))
      .thread_name(|i| format!("cell-{}", i))
      .build()
    {
      Ok(pool) => pool.install(fan_out),
      Err(e) => {
        tracing::warn!(error = %e, "could not start the cell pool, using the shared one");
        fan_out()
      }
    }
  }

  /// Release stage over joined outcomes
  pub fn release(
    &self,
    tag: &Tag,
    cells: &[BuildCell],
    outcomes: &[CellOutcome],
    allow_partial: bool,
  ) -> PipelineResult<(ReleaseManifest, PublishReceipt)> {
    let mut stage = ReleasePublisher::new(&self.ctx.config.release, self.store, self.publisher);
    if allow_partial {
      stage = stage.with_policy(PartialPolicy::Partial);
    }
    stage.release(tag, cells, outcomes)
  }

  /// Full run in one process
  ///
  /// The store is emptied only once the preflight passed, so refusing a duplicate leaves the tag's
  /// artifacts alone. Errors before the fan-out are returned directly; everything after it lands in
  /// [`RunReport::release`] next to the cell outcomes.
  pub fn run(
    &self,
    tag: &Tag,
    cells: &[BuildCell],
    options: RunOptions,
    on_state: &(dyn Fn(Platform, BuildState) + Sync),
  ) -> PipelineResult<RunReport> {
    self.preflight(tag)?;
    self.store.clear()?;

    let tripped = AtomicBool::new(false);
    let observe = |platform: Platform, state: BuildState| {
      if state == BuildState::Failed {
        tripped.store(true, Ordering::SeqCst);
      }
      on_state(platform, state);
    };
    let outcomes = self.build_cells(cells, options.fail_fast, &observe);

    let release = if self.ctx.cancel.is_cancelled() {
      if options.fail_fast && tripped.load(Ordering::SeqCst) {
        let first = outcomes
          .iter()
          .filter_map(CellOutcome::failure)
          .find(|f| f.kind != CellFailureKind::Cancelled)
          .or_else(|| outcomes.iter().find_map(CellOutcome::failure))
          .cloned();
        match first {
          Some(failure) => Err(PipelineError::Cell(failure)),
          None => Err(PipelineError::Cancelled),
        }
      } else {
        Err(PipelineError::Cancelled)
      }
    } else {
      self.release(tag, cells, &outcomes, options.allow_partial)
    };

    Ok(RunReport { outcomes, release })
  }
}
