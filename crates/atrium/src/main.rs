// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atrium - chat request orchestration over a local SQLite backend.
//!
//! This is the binary entry point: an interactive shell, a config dump, and
//! adapter health checks.

mod commands;
mod doctor;
mod render;
mod shell;

use std::path::PathBuf;

use atrium_config::AtriumConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;

/// Atrium - chat with a request-tracking assistant from the terminal.
#[derive(Parser, Debug)]
#[command(name = "atrium", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive chat session.
    Shell,
    /// Validate and print the effective configuration.
    Config,
    /// Check that the storage backend and reply worker are healthy.
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => atrium_config::load_and_validate_path(path),
        None => atrium_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            atrium_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.identity.log_level);

    let result = match cli.command {
        Some(Commands::Shell) | None => shell::run_shell(config).await,
        Some(Commands::Config) => print_config(&config),
        Some(Commands::Doctor) => doctor::run_doctor(&config).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn print_config(config: &AtriumConfig) -> Result<(), atrium_core::AtriumError> {
    let rendered = config
        .to_toml()
        .map_err(|e| atrium_core::AtriumError::Config(e.to_string()))?;
    print!("{rendered}");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr so they never interleave with the shell transcript on stdout.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("atrium={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
