//! build-mate CLI - bundle TypeScript libraries into cjs, esm and iife.
//!
//! The binary parses flags into [`buildmate_config::Options`] overrides and
//! hands them to the [`orchestrator`], which builds every configured target.
//!
//! - [`cli`] - clap argument definitions
//! - [`orchestrator`] - config loading and per-target sequencing
//! - [`watch`] - build passes, the on-success lifecycle and the rebuild loop
//! - [`dts`] - the declaration task and its worker process
//! - [`error`] - [`CliError`] and miette reporting
//! - [`logger`] - tracing setup for diagnostic output

pub mod cli;
pub mod dts;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod watch;

#[cfg(test)]
mod test_support;

pub use error::{CliError, Result};
pub use orchestrator::{Orchestrator, execute};
