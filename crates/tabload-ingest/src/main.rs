//! tabload - Main entry point

use clap::Parser;
use std::process;
use tabload_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tabload_ingest::{Cli, Commands};
use tracing::error;

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads `env = ...` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("tabload")
        .build();

    // Environment variables take precedence over flags
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {}", e);
            log_config
        },
    };

    // The CLI keeps working without logging
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> tabload_ingest::Result<()> {
    match &cli.command {
        Commands::Load(args) => tabload_ingest::commands::load::run(args).await,
        Commands::Verify(args) => tabload_ingest::commands::verify::run(args).await,
        Commands::Normalize { path } => tabload_ingest::commands::normalize::run(path).await,
    }
}
