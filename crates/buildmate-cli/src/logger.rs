//! Diagnostic logging for the `build-mate` binary.
//!
//! Build output goes through [`buildmate_bundler::Logger`]. This module only
//! wires up `tracing` for the debug output the crates emit. Everything is
//! written to stderr, so stdout stays free for build output and the
//! declaration worker's message channel.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str =
    "buildmate_cli=debug,buildmate_bundler=debug,buildmate_config=debug";
const DEFAULT_FILTER: &str = "buildmate_cli=warn,buildmate_bundler=warn,buildmate_config=warn";

/// Install the global tracing subscriber.
///
/// `--verbose` enables debug output for the build-mate crates, `--quiet`
/// keeps errors only, and otherwise `RUST_LOG` wins over the default.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    // A second call (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// `NO_COLOR` disables colors, `FORCE_COLOR` forces them; otherwise the
/// terminal decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::Term::stdout().features().colors_supported()
}
