//! # buildmate-bundler
//!
//! The build engine behind `build-mate`.
//!
//! - [`options`] turns raw [`buildmate_config::Options`] into a canonical
//!   [`NormalizedOptions`].
//! - [`engine::BuildEngine`] runs one output format through a [`Bundler`]
//!   backend and hands the result to a [`PluginPipeline`].
//! - [`plugin`] defines the transform-plugin contract. [`plugins`] holds the
//!   built-in transforms.
//! - [`dts`] generates type declarations.
//! - [`logger::Logger`] is the user-facing log sink shared by all of the above.

pub mod bundler;
pub mod config;
pub mod dts;
pub mod engine;
pub mod glob;
pub mod logger;
pub mod options;
pub mod output;
pub mod plugin;
pub mod plugins;
pub mod report;

pub use bundler::{BundleOutcome, BundleRequest, Bundler, EsbuildBundler, Metafile};
pub use config::{BuildConfiguration, OnSuccess, WorkerOptions};
pub use engine::{BuildEngine, DependencyTracker, StyleSheetMap};
pub use logger::{LogRecord, LogSettings, LogSink, Logger};
pub use options::{Format, NormalizedOptions, normalize};
pub use plugin::{Chunk, Plugin, PluginContext, PluginPipeline, WrittenFile};

use bundler::diagnostics::Message;

/// Error types for build operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The options do not describe a buildable target.
    #[error("{0}")]
    Config(String),

    /// Loading a project file (config, package.json, tsconfig) failed.
    #[error(transparent)]
    Project(#[from] buildmate_config::ConfigError),

    /// The bundling capability reported one or more errors.
    #[error("{}", format_messages(.0))]
    Bundler(Vec<Message>),

    /// The bundler backend could not be started.
    #[error("bundler unavailable: {0}")]
    BundlerUnavailable(String),

    /// Declaration generation failed.
    #[error("declaration build failed: {0}")]
    Dts(String),

    /// A transform plugin hook failed.
    #[error("plugin `{plugin}` failed: {message}")]
    Plugin { plugin: String, message: String },

    /// A pipeline hook ran before the per-pass context was installed.
    #[error("Plugin context is not set")]
    ContextNotSet,

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Source map could not be read or composed.
    #[error("source map error: {0}")]
    SourceMap(String),

    /// Stylesheet compilation failed.
    #[error("stylesheet error in {path}: {message}")]
    Css { path: String, message: String },

    /// A component file could not be split into script and style.
    #[error("component error in {path}: {message}")]
    Component { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn plugin(plugin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error is a user configuration problem rather than a
    /// failure of the build itself.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Project(_))
    }
}

fn format_messages(messages: &[Message]) -> String {
    match messages {
        [] => "Build failed".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} errors:\n{}",
            many.len(),
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Project(_) => "PROJECT_CONFIG_ERROR",
            Error::Bundler(_) => "BUNDLER_ERROR",
            Error::BundlerUnavailable(_) => "BUNDLER_UNAVAILABLE",
            Error::Dts(_) => "DTS_ERROR",
            Error::Plugin { .. } => "PLUGIN_ERROR",
            Error::ContextNotSet => "PLUGIN_CONTEXT_NOT_SET",
            Error::InvalidOutputPath(_) => "INVALID_OUTPUT_PATH",
            Error::WriteFailure(_) => "WRITE_FAILURE",
            Error::SourceMap(_) => "SOURCEMAP_ERROR",
            Error::Css { .. } => "CSS_ERROR",
            Error::Component { .. } => "COMPONENT_ERROR",
            Error::Io(_) => "IO_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::BundlerUnavailable(_) => Some(Box::new(
                "Install esbuild in your project (npm i -D esbuild) or set ESBUILD_BINARY_PATH.",
            )),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{path}' is invalid. Ensure it stays inside the output directory."
            ))),
            Error::WriteFailure(_) => Some(Box::new("Check disk space and permissions.")),
            Error::Project(buildmate_config::ConfigError::TsconfigNotFound(_)) => Some(Box::new(
                "Create a tsconfig.json or point to one with --tsconfig.",
            )),
            Error::Plugin { plugin, .. } => Some(Box::new(format!(
                "The `{plugin}` transform rejected a chunk; the file was not written."
            ))),
            _ => None,
        }
    }
}
