// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process service wiring
//!
//! Builds the core services from a configuration manifest. The data platform
//! is not reachable from the CLI, so team membership and membership requests
//! are backed by in-memory stores the commands seed from their arguments.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tokengate_core::application::{SubmissionValidationService, TokenIssuanceService};
use tokengate_core::domain::collaborators::{SubmissionContentSource, TeamMembershipChecker};
use tokengate_core::domain::config::TokengateConfigManifest;
use tokengate_core::domain::dataset_settings::TenantPolicies;
use tokengate_core::infrastructure::certificate_fetcher::HttpCertificateFetcher;
use tokengate_core::infrastructure::repositories::ConfigTenantPolicyRepository;
use tokengate_core::infrastructure::{
    MessageAuthenticator, OriginValidator, RetryPolicy, TokenCodec, TrustStore, TrustStoreProvider,
};

pub struct EmbeddedServices {
    config: TokengateConfigManifest,
    codec: Arc<TokenCodec>,
    retry: RetryPolicy,
}

impl EmbeddedServices {
    /// Load and validate configuration, then build the token codec.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = TokengateConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: TokengateConfigManifest) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let secret = config.resolve_secret()?;
        let codec = TokenCodec::new(&secret, config.spec.token.legacy_team_id)
            .context("Failed to initialise token codec")?;
        let retry = RetryPolicy::from(&config.spec.retry);

        Ok(Self { config, codec: Arc::new(codec), retry })
    }

    pub fn config(&self) -> &TokengateConfigManifest {
        &self.config
    }

    pub fn codec(&self) -> Arc<TokenCodec> {
        self.codec.clone()
    }

    pub fn tenant_policies(&self) -> TenantPolicies {
        self.config.tenant_policies()
    }

    pub fn issuance_service(&self) -> TokenIssuanceService {
        TokenIssuanceService::new(self.codec())
    }

    /// Fetch and verify the configured certificate chain.
    pub async fn trust_store(&self) -> Result<Arc<TrustStore>> {
        let fetcher = HttpCertificateFetcher::new(self.config.spec.trust.fetch_timeout)
            .context("Failed to build certificate fetcher")?;
        let provider = TrustStoreProvider::new(
            self.config.spec.trust.certificate_chain.clone(),
            Arc::new(fetcher),
            self.retry.clone(),
        );
        let store = provider.get().await.context("Failed to bootstrap certificate trust store")?;
        info!(anchor = %store.anchor().subject, "Trust store ready");
        Ok(store)
    }

    /// Full validation pipeline over `content_source`.
    pub async fn validation_service(
        &self,
        membership: Arc<dyn TeamMembershipChecker>,
        content_source: Arc<dyn SubmissionContentSource>,
    ) -> Result<SubmissionValidationService> {
        let trust = self.trust_store().await?;
        let authenticator = Arc::new(MessageAuthenticator::new(trust, membership, self.retry.clone()));
        let spec = &self.config.spec;

        Ok(SubmissionValidationService::new(
            self.codec(),
            authenticator,
            Arc::new(ConfigTenantPolicyRepository::from_manifest(&self.config)),
            content_source,
        )
        .with_origin_validator(OriginValidator::new(spec.origin.header.clone()))
        .with_service_account(spec.service_account_id)
        .with_delegated_trust_team(spec.trust.delegated_trust_team_id)
        .with_retry(self.retry.clone()))
    }
}
