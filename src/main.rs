//! # otools
//!
//! Command-line entry point. Parses arguments, sets up logging on stderr and
//! turns any command failure into a single `Error: Failed to ...` line with
//! exit code 1.
//!
//! ## Quick Start
//!
//! ```bash
//! # List the databases of the project's db container
//! otools db list
//!
//! # Dump the main database and share it on the integration environment
//! otools db dump-and-share --env int
//!
//! # Prepare a minor release
//! otools release bump --type minor
//! ```
//!
//! Log output is controlled with `-v`/`-vv`/`-vvv` or `RUST_LOG`.

use anyhow::Result;
use clap::Parser;
use otools::{commands, Cli};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cmd = cli.cmd.unwrap_or_else(|| {
        eprintln!("No command provided. Use --help to see available commands.");
        std::process::exit(1);
    });

    if let Err(e) = commands::run(cmd).await {
        tracing::debug!("command failed: {:?}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
