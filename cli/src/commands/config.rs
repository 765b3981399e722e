// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use tokengate_core::domain::config::{TokengateConfigManifest, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./tokengate-config.yaml)
        #[arg(short, long, default_value = "./tokengate-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = TokengateConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./tokengate-config.yaml");
        println!("  4. ~/.tokengate/config.yaml");
        println!("  5. /etc/tokengate/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Token:".bold());
    let secret = match spec.token.secret.as_deref() {
        Some(s) if s.starts_with("env:") => s.to_string(),
        Some(_) => "(inline, hidden)".to_string(),
        None => "(not set)".to_string(),
    };
    println!("  Secret: {secret}");
    if let Some(legacy) = spec.token.legacy_team_id {
        println!("  Legacy team: {legacy}");
    }
    println!();

    println!("{}", "Trust:".bold());
    for (index, source) in spec.trust.certificate_chain.iter().enumerate() {
        println!("  {}. {}", index + 1, source);
    }
    if let Some(team) = spec.trust.delegated_trust_team_id {
        println!("  Delegated trust team: {team}");
    }
    if let Some(account) = spec.service_account_id {
        println!("  Service account: {account}");
    }
    println!("  Origin header: {}", spec.origin.header);
    println!();

    println!("{}", "Tenants:".bold());
    for tenant in &spec.tenants {
        println!(
            "  {} ({})",
            tenant.application_team_id.to_string().bold(),
            tenant.token_label.as_deref().unwrap_or("no label")
        );
        let ids: Vec<String> = tenant.access_requirement_ids.iter().map(|id| id.to_string()).collect();
        println!("    Access requirements: {}", ids.join(", "));
        println!("    Token expiration: {} days", tenant.token_expiration_days);
        if !tenant.allowed_subnets.is_empty() {
            println!("    Allowed subnets: {}", tenant.allowed_subnets.join(", "));
        }
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = TokengateConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
