//! Miette diagnostic conversion for CLI errors.

use miette::Report;

use crate::error::CliError;

pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => bundler_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

/// Bundler errors carry their own diagnostic code and help text.
pub fn bundler_error_to_miette(err: buildmate_bundler::Error) -> Report {
    match err {
        buildmate_bundler::Error::Bundler(messages) if messages.is_empty() => {
            miette::miette!("Build failed")
        }
        other => Report::new(other),
    }
}
