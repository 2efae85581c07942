//! CLI entry point for the tile mosaic generator

use clap::Parser;
use std::process::ExitCode;
use tilemosaic::io::cli::{Cli, MosaicRunner};
use tilemosaic::io::logging::init_logging;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = cli
        .into_config()
        .and_then(|config| MosaicRunner::new(config).run());

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
