//! tabris CLI - developer tools for tabris apps.
//!
//! Provides commands for:
//! - `serve`: Serve an app to a device with live reload and a remote console
//! - `platform`: Download and cache a build platform

mod commands;
mod console;
mod error;
mod history;
mod output;
mod prompt;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{PlatformArgs, ServeArgs};
use output::Output;

/// tabris - developer tools for tabris apps.
#[derive(Parser)]
#[command(name = "tabris", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an app to a device.
    Serve(ServeArgs),
    /// Download a build platform into the local cache.
    Platform(PlatformArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Serve(args) => args.verbose,
        Commands::Platform(args) => args.verbose,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve(args) => match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(args.execute()),
            Err(e) => Err(e.into()),
        },
        Commands::Platform(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
