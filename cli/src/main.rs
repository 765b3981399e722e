// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Tokengate CLI
//!
//! The `tokengate` binary issues access tokens and validates signed approval
//! messages against a tokengate configuration.
//!
//! ## Commands
//!
//! - `tokengate token create|inspect` - Issue tokens and analyse tokens found in a message
//! - `tokengate submission validate|batch` - Run the full validation pipeline
//! - `tokengate trust verify` - Bootstrap and print the configured certificate chain
//! - `tokengate config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use tokengate_cli::commands::{self, ConfigCommand, SubmissionCommand, TokenCommand, TrustCommand};

/// Tokengate - signed access tokens carried in email
#[derive(Parser)]
#[command(name = "tokengate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TOKENGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TOKENGATE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue and inspect access tokens
    #[command(name = "token")]
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },

    /// Validate approval messages
    #[command(name = "submission")]
    Submission {
        #[command(subcommand)]
        command: SubmissionCommand,
    },

    /// Certificate chain operations
    #[command(name = "trust")]
    Trust {
        #[command(subcommand)]
        command: TrustCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Token { command }) => commands::token::handle_command(command, cli.config).await,
        Some(Commands::Submission { command }) => {
            commands::submission::handle_command(command, cli.config).await
        }
        Some(Commands::Trust { command }) => commands::trust::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
