mod build;
mod commands;
mod core;
mod matrix;
mod pipeline;
mod release;
mod store;
mod trigger;
mod ui;

use clap::{Parser, Subcommand};
use commands::OutputMode;
use core::context::PipelineContext;
use core::error::{PipelineError, print_error};
use pipeline::RunOptions;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tag-gated build matrix and release for single-file desktop executables
#[derive(Parser)]
#[command(name = "release-matrix")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  /// Debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Errors only, no progress bars or summaries
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  quiet: bool,

  /// Project root (default: current directory)
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  // ============================================================================
  // Trigger & Inspection
  // ============================================================================
  /// Decide whether a ref starts a release run
  Gate {
    /// Ref to evaluate (default: $GITHUB_REF)
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Output the decision in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show the build matrix and every operation a run would perform
  Plan {
    /// Ref to plan for (default: $GITHUB_REF)
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Only show one cell (windows, ubuntu-22.04, ubuntu-20.04, macos)
    #[arg(long)]
    cell: Option<String>,
    /// Output plan in JSON format (useful for CI/automation)
    #[arg(long)]
    json: bool,
  },

  // ============================================================================
  // Stages
  // ============================================================================
  /// Build one cell and store its artifact
  Build {
    /// Cell to build (windows, ubuntu-22.04, ubuntu-20.04, macos)
    #[arg(long)]
    cell: String,
    /// Ref being released (default: $GITHUB_REF)
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Output the outcome in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Publish one release from the stored artifacts of every cell
  Publish {
    /// Ref being released (default: $GITHUB_REF)
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Publish even if some cells have no artifact
    #[arg(long)]
    allow_partial: bool,
    /// Output the manifest in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Build every cell in parallel, then publish (single process)
  Run {
    /// Ref being released (default: $GITHUB_REF)
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Publish even if some cells failed
    #[arg(long)]
    allow_partial: bool,
    /// Cancel the other cells after the first failure
    #[arg(long)]
    fail_fast: bool,
    /// Output outcomes and manifest in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

/// Logs go to stderr so stdout stays parseable (`--json`, `gate`)
///
/// `RELEASE_MATRIX_LOG`, then `RUST_LOG`, override the level picked by `-v`/`-q`.
fn init_tracing(verbose: bool, quiet: bool) {
  let level = if verbose {
    "debug"
  } else if quiet {
    "error"
  } else {
    "info"
  };

  let filter = EnvFilter::try_from_env("RELEASE_MATRIX_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new(format!("release_matrix={}", level)));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.quiet);

  // Commands run with the root as cwd and get paths joined onto it, so it must be absolute
  let root = match cli.root.clone().map(std::path::absolute).unwrap_or_else(std::env::current_dir) {
    Ok(dir) => dir,
    Err(e) => {
      eprintln!("Error: Failed to resolve project root: {}", e);
      std::process::exit(2);
    }
  };

  let output = |json: bool| OutputMode { json, quiet: cli.quiet };

  let result = match cli.command {
    // The gate needs no config: a malformed release.toml must not block a skip
    Commands::Gate { reference, json } => commands::run_gate(reference, json),
    command => {
      // Build pipeline context once (loads release.toml or defaults)
      let ctx = match PipelineContext::build(&root) {
        Ok(ctx) => ctx,
        Err(e) => handle_error(e),
      };

      match command {
        Commands::Gate { .. } => Ok(()),
        Commands::Plan { reference, cell, json } => commands::run_plan(&ctx, reference, cell, output(json)),
        Commands::Build { cell, reference, json } => commands::run_build(&ctx, reference, &cell, output(json)),
        Commands::Publish {
          reference,
          allow_partial,
          json,
        } => commands::run_publish(&ctx, reference, allow_partial, output(json)),
        Commands::Run {
          reference,
          allow_partial,
          fail_fast,
          json,
        } => commands::run_pipeline(
          &ctx,
          reference,
          RunOptions {
            allow_partial,
            fail_fast,
          },
          output(json),
        ),
      }
    }
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: PipelineError) -> ! {
  tracing::debug!(error = ?err, "command failed");
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
