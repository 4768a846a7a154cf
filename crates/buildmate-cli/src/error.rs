//! Error handling for the `build-mate` CLI.
//!
//! [`CliError`] wraps the library errors and adds the failures that only
//! exist at the process level: the declaration worker, on-success commands
//! and the file watcher. Variants that have an obvious fix end their message
//! with a `Hint:` paragraph.

mod miette;

pub use self::miette::{bundler_error_to_miette, cli_error_to_miette};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or parsing a config file failed.
    #[error("Configuration error: {0}")]
    Config(#[from] buildmate_config::ConfigError),

    /// Normalization or a build pass failed.
    #[error(transparent)]
    Build(#[from] buildmate_bundler::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The declaration worker reported a failure or went away.
    #[error("Declaration build failed: {0}")]
    Worker(String),

    /// The worker needs the project's TypeScript installation.
    #[error(
        "You need to install \"typescript\" in your project.\n\nHint: npm i -D typescript"
    )]
    TypescriptMissing,

    /// Starting or stopping an on-success command failed.
    #[error("onSuccess process error: {0}")]
    Process(String),

    /// An on-success callback or its cleanup returned an error.
    #[error("onSuccess callback failed: {0}")]
    Callback(#[from] anyhow::Error),

    #[error("File watcher error: {0}\n\nHint: Check that the watched paths exist")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

impl CliError {
    /// Whether the error comes from user configuration rather than from the
    /// build itself.
    pub fn is_config(&self) -> bool {
        match self {
            CliError::Config(_) | CliError::InvalidArgument(_) => true,
            CliError::Build(err) => err.is_config(),
            _ => false,
        }
    }
}
