//! Command-line interface for `build-mate`.
//!
//! There is one user-facing command: build the entries given as positional
//! files (or taken from the config file) with the flags in [`BuildArgs`].
//! The hidden `__dts-worker` subcommand is the declaration worker process the
//! build spawns for itself.

mod args;
mod parse;

use clap::{Parser, Subcommand};

pub use args::{BuildArgs, ConfigSource};
pub use parse::{normalize_entry_path, parse_key_value, split_list};

/// build-mate - bundle TypeScript libraries with no config
#[derive(Parser, Debug)]
#[command(
    name = "build-mate",
    version,
    about = "Bundle TypeScript libraries into cjs, esm and iife",
    long_about = "build-mate bundles a library's entry points into one or more module formats,\n\
                  optionally generates type declarations, and can rebuild on change.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Enable verbose diagnostic logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors from the diagnostic log
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub build: BuildArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Declaration worker; reads one request from stdin.
    #[command(name = "__dts-worker", hide = true)]
    DtsWorker,
}
