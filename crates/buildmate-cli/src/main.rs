//! build-mate - bundle TypeScript libraries.
//!
//! Parses the command line, sets up diagnostic logging and dispatches either
//! a build or the hidden declaration worker.

use buildmate_cli::{cli, dts, error, logger, orchestrator};
use clap::Parser;
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    let code = match args.command {
        Some(cli::Command::DtsWorker) => match dts::worker::run().await {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(err) => return Err(error::cli_error_to_miette(err)),
        },
        None => orchestrator::execute(args.build, args.no_color)
            .await
            .map_err(error::cli_error_to_miette)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
