//! Integration tests for release-matrix
//!
//! Each test drives the compiled binary against a temporary project whose toolchain is a
//! fake `python` script, so the whole gate → build → publish flow runs without Python.

mod helpers;
mod test_gate;
mod test_plan;
#[cfg(unix)]
mod test_run;
