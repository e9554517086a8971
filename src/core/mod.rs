//! Core engine for release-matrix
//!
//! - **config**: Pipeline configuration (release.toml) parsing and validation
//! - **context**: Pipeline context and cancellation shared by every stage
//! - **error**: Error types with contextual help messages and exit codes
//! - **plan**: Run plans for dry-run and auditing
//! - **process**: External command execution with deadlines and cancellation

pub mod config;
pub mod context;
pub mod error;
pub mod plan;
pub mod process;
