// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Submission commands
//!
//! Commands: validate, batch

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokengate_core::domain::identifiers::{SubmissionId, UserId};
use tokengate_core::domain::submission::{Submission, SubmissionProcessingResult};
use tokengate_core::infrastructure::repositories::{
    DirectorySubmissionSource, InMemorySubmissionStore, InMemoryTeamMembership,
};

use super::{format_millis, now_or};
use crate::embedded::EmbeddedServices;

#[derive(Subcommand)]
pub enum SubmissionCommand {
    /// Run the full validation pipeline over one message file
    Validate {
        /// Raw message (.eml)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Account that submitted the message
        #[arg(long)]
        sender: UserId,

        /// Evaluate expiry as of this epoch-millisecond instant (default: now)
        #[arg(long, value_name = "MS")]
        now: Option<i64>,

        /// Treat the sender as a member of the delegated trust team
        #[arg(long)]
        trusted_sender: bool,
    },

    /// Validate every `<submission-id>.eml` in a directory, in id order
    Batch {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Account that submitted the messages
        #[arg(long)]
        sender: UserId,

        /// Treat the sender as a member of the delegated trust team
        #[arg(long)]
        trusted_sender: bool,
    },
}

pub async fn handle_command(command: SubmissionCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = EmbeddedServices::load(config_path)?;
    match command {
        SubmissionCommand::Validate { file, sender, now, trusted_sender } => {
            validate(&services, file, sender, now_or(now), trusted_sender).await
        }
        SubmissionCommand::Batch { dir, sender, trusted_sender } => {
            batch(&services, dir, sender, trusted_sender).await
        }
    }
}

fn membership(services: &EmbeddedServices, sender: UserId, trusted_sender: bool) -> Result<InMemoryTeamMembership> {
    let membership = InMemoryTeamMembership::new();
    if trusted_sender {
        let team = services
            .config()
            .spec
            .trust
            .delegated_trust_team_id
            .context("--trusted-sender requires spec.trust.delegated_trust_team_id")?;
        membership.add_member(team, sender)?;
    }
    Ok(membership)
}

async fn validate(
    services: &EmbeddedServices,
    file: PathBuf,
    sender: UserId,
    now: i64,
    trusted_sender: bool,
) -> Result<()> {
    let content = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let service = services
        .validation_service(
            Arc::new(membership(services, sender, trusted_sender)?),
            Arc::new(InMemorySubmissionStore::new()),
        )
        .await?;

    let self_account = services.config().spec.service_account_id;
    let result = service
        .validate_submission_at(&content, &services.tenant_policies(), self_account, sender, now)
        .await;

    print_result(&file.display().to_string(), &result);
    Ok(())
}

async fn batch(services: &EmbeddedServices, dir: PathBuf, sender: UserId, trusted_sender: bool) -> Result<()> {
    let submissions = list_submissions(&dir, sender)?;
    if submissions.is_empty() {
        println!("{}", format!("No .eml files in {}", dir.display()).yellow());
        return Ok(());
    }

    let service = services
        .validation_service(
            Arc::new(membership(services, sender, trusted_sender)?),
            Arc::new(DirectorySubmissionSource::new(&dir)),
        )
        .await?;

    let results = service.process_batch(&submissions).await.context("Batch processing failed")?;
    for (submission, result) in submissions.iter().zip(&results) {
        print_result(submission.id.as_str(), result);
    }

    let accepted = results.iter().filter(|r| r.is_accepted()).count();
    println!();
    println!(
        "{} {} closed, {} rejected",
        "Summary:".bold(),
        accepted.to_string().green(),
        (results.len() - accepted).to_string().red()
    );
    Ok(())
}

/// Submissions for every `*.eml` file, sorted by id.
fn list_submissions(dir: &Path, sender: UserId) -> Result<Vec<Submission>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "eml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
    }
    ids.sort();

    Ok(ids
        .into_iter()
        .map(|id| Submission { id: SubmissionId::new(id), sender_id: sender })
        .collect())
}

fn print_result(name: &str, result: &SubmissionProcessingResult) {
    let status = if result.is_accepted() {
        result.status.to_string().green()
    } else {
        result.status.to_string().red()
    };
    println!("{} {}", name.bold(), status);

    for token in &result.valid_tokens {
        println!(
            "  {} user {} team {} issued {}",
            "✓".green(),
            token.user_id,
            token.application_team_id,
            format_millis(token.issued_at)
        );
    }
    for notice in &result.notices {
        for line in notice.reason.lines() {
            println!("  {} {}", "!".yellow(), line.trim_start());
        }
    }
}
