//! DataObjects
//!
//! Metadata-driven list and form objects: configuration resolution,
//! query building and result mapping.
//!
//! This is the main entry point for the command-line tool.

use clap::Parser;
use dataobjects_cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; stdout carries command output only
    FmtSubscriber::builder()
        .with_env_filter(cli.log_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .pretty()
        .init();

    tracing::debug!(version = dataobjects_cli::VERSION, "Starting dataobjects");
    dataobjects_cli::run(&cli)
}
