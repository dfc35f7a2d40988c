//! conclave - Multi-provider meeting CLI
//!
//! Runs sequences of provider calls over several iterations, synthesizes the
//! result, and keeps per-agent memory in a local SQLite database.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod app;
mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("conclave=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Run(cmd) => commands::run::execute(cmd, &config).await,
        Commands::Sequence(cmd) => commands::sequence::execute(cmd, &config).await,
        Commands::Agent(cmd) => commands::agent::execute(cmd, &config),
        Commands::Memory(cmd) => commands::memory::execute(cmd, &config).await,
        Commands::Recover => commands::recover::execute(&config),
        Commands::Config => commands::show_config(&config),
        Commands::Version => {
            println!("conclave {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
