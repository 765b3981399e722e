// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate trust commands
//!
//! Commands: verify

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use tokengate_core::infrastructure::trust_store::certificate_der;

use crate::embedded::EmbeddedServices;

#[derive(Subcommand)]
pub enum TrustCommand {
    /// Fetch and verify the configured certificate chain
    Verify {
        /// Also check that this signer certificate (PEM or DER) is issued by the anchor
        #[arg(long, value_name = "FILE")]
        certificate: Option<PathBuf>,
    },
}

pub async fn handle_command(command: TrustCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = EmbeddedServices::load(config_path)?;
    match command {
        TrustCommand::Verify { certificate } => verify(&services, certificate).await,
    }
}

async fn verify(services: &EmbeddedServices, certificate: Option<PathBuf>) -> Result<()> {
    let store = services.trust_store().await?;

    println!("{}", "Certificate chain:".bold());
    for (index, cert) in store.chain().iter().enumerate() {
        println!("  {}. {}", index + 1, cert.subject);
        println!("     {}", cert.source.dimmed());
    }
    println!("{}", format!("✓ Anchor: {}", store.anchor().subject).green());

    if let Some(path) = certificate {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let der = certificate_der(&bytes)
            .map_err(|reason| anyhow::anyhow!("{} is not a certificate: {}", path.display(), reason))?;

        if store.verifies_issued(&der) {
            println!("{}", format!("✓ {} is issued by the anchor", path.display()).green());
        } else {
            anyhow::bail!("{} is not a currently valid certificate issued by the anchor", path.display());
        }
    }

    Ok(())
}
