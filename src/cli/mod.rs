//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Wiring the capture source, pipeline and output sink together

mod args;
mod run;

pub use args::Args;
pub use run::run;
