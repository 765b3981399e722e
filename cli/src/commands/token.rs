// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token commands
//!
//! Commands: create, inspect

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use tokengate_core::domain::identifiers::{TeamId, UserId};
use tokengate_core::domain::token::TokenAnalysisResult;
use tokengate_core::infrastructure::mime;

use super::{format_millis, now_or};
use crate::embedded::EmbeddedServices;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a token for a user under a tenant's policy
    Create {
        /// Requesting user
        #[arg(long)]
        user: UserId,

        /// Application team whose dataset settings apply
        #[arg(long)]
        team: TeamId,

        /// Issue time in epoch milliseconds (default: now)
        #[arg(long, value_name = "MS")]
        issued_at: Option<i64>,

        /// Creation time of the user's membership request, in epoch milliseconds
        #[arg(long, value_name = "MS")]
        membership_request_created_at: Option<i64>,

        /// Print the full message body instead of the bare token block
        #[arg(long)]
        body: bool,
    },

    /// Analyse every token found in a message file
    Inspect {
        /// Raw message (.eml) or plain text file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Evaluate expiry as of this epoch-millisecond instant (default: now)
        #[arg(long, value_name = "MS")]
        now: Option<i64>,
    },
}

pub async fn handle_command(command: TokenCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = EmbeddedServices::load(config_path)?;
    match command {
        TokenCommand::Create { user, team, issued_at, membership_request_created_at, body } => {
            create(&services, user, team, now_or(issued_at), membership_request_created_at, body)
        }
        TokenCommand::Inspect { file, now } => inspect(&services, file, now_or(now)).await,
    }
}

fn create(
    services: &EmbeddedServices,
    user: UserId,
    team: TeamId,
    issued_at: i64,
    membership_request_created_at: Option<i64>,
    body: bool,
) -> Result<()> {
    let policies = services.tenant_policies();
    let settings = policies
        .get(&team)
        .with_context(|| format!("No tenant is configured for application team {team}"))?;

    let issued = services
        .issuance_service()
        .compose(user, settings, membership_request_created_at, issued_at)
        .context("Failed to create token")?;

    if body {
        println!("{}", issued.message_body);
    } else {
        print!("{}", issued.token);
    }
    Ok(())
}

async fn inspect(services: &EmbeddedServices, file: PathBuf, now: i64) -> Result<()> {
    let raw = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let bodies = mime::text_bodies(&raw);
    let text = if bodies.is_empty() { String::from_utf8_lossy(&raw).into_owned() } else { bodies.join("\n") };

    let results = services.codec().parse(text.as_bytes(), &services.tenant_policies(), now);
    if results.is_empty() {
        println!("{}", "No tokens found".yellow());
        return Ok(());
    }

    let mut results: Vec<_> = results.into_iter().collect();
    results.sort_by_key(|r| (!r.is_valid(), r.user_id()));
    for result in results {
        match result {
            TokenAnalysisResult::Valid(content) => {
                println!("{} user {} team {}", "✓ valid".green(), content.user_id, content.application_team_id);
                if let Some(label) = &content.token_label {
                    println!("    label: {label}");
                }
                let ids: Vec<String> = content.access_requirement_ids.iter().map(|id| id.to_string()).collect();
                println!("    access requirements: {}", ids.join(", "));
                println!("    issued: {}", format_millis(content.issued_at));
                if let Some(expires) = content.membership_request_expires_at {
                    println!("    membership request expires: {}", format_millis(expires));
                }
            }
            TokenAnalysisResult::Invalid { user_id, reason } => {
                let who = user_id.map(|u| format!(" user {u}")).unwrap_or_default();
                println!("{}{} {}", "✗ invalid".red(), who, reason);
            }
        }
    }
    Ok(())
}
