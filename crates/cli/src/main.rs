mod cli;
mod commands;
mod telemetry;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    telemetry::init_logging(cli.log_json)?;

    commands::run(cli).await
}
