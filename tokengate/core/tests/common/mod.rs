// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests.
//!
//! The certificates form a two-level chain: `root.pem` issues `inter.pem`,
//! which issues the `signer.pem` approver certificate used to sign
//! `signed.eml`, `opaque.eml` and `mixed.eml`. `rogue.pem` is self-signed
//! and signs `rogue_signed.eml`.
//!
//! `regional_ca.pem` is a separate single-certificate chain; it issues
//! `regional_signer.pem`, which signs `cross_tenant.eml`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokengate_core::domain::collaborators::{SubmissionContentSource, TeamMembershipChecker};
use tokengate_core::domain::dataset_settings::{DatasetSettings, TenantPolicies};
use tokengate_core::domain::identifiers::{AccessRequirementId, TeamId};
use tokengate_core::infrastructure::certificate_fetcher::HttpCertificateFetcher;
use tokengate_core::infrastructure::repositories::{ConfigTenantPolicyRepository, InMemorySubmissionStore};
use tokengate_core::infrastructure::{
    CertificateTrustStore, MessageAuthenticator, RetryPolicy, TokenCodec, TrustStore,
};

pub const SECRET: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";
pub const TEAM: TeamId = TeamId(3412389);
pub const ISSUED_AT: i64 = 1_760_000_000_000;
/// One day after the fixture token was issued.
pub const NOW: i64 = ISSUED_AT + 86_400_000;
pub const FIXTURE_TOKEN: &str =
    "|Test Dataset|3350396|3412389|9605264|null|1760000000000|gQLobLeW5DPAGBxIFAKZCqg6mA0=|";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap_or_else(|e| panic!("fixture {name}: {e}"))
}

pub fn fixture_source(name: &str) -> String {
    fixture_path(name).to_string_lossy().into_owned()
}

pub fn settings() -> DatasetSettings {
    let mut settings = DatasetSettings::new(TEAM, [AccessRequirementId(9605264)]);
    settings.token_label = Some("Test Dataset".to_string());
    settings
}

pub fn policies() -> TenantPolicies {
    HashMap::from([(TEAM, settings())])
}

pub fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(SECRET, None).unwrap())
}

pub fn fetcher() -> HttpCertificateFetcher {
    HttpCertificateFetcher::new(std::time::Duration::from_secs(5)).unwrap()
}

/// The test chain, anchored at the issuing CA.
pub async fn trust_store() -> TrustStore {
    let sources = vec![fixture_source("root.pem"), fixture_source("inter.pem")];
    CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1))
        .await
        .unwrap()
}

pub async fn authenticator(membership: Arc<dyn TeamMembershipChecker>) -> Arc<MessageAuthenticator> {
    Arc::new(MessageAuthenticator::new(Arc::new(trust_store().await), membership, RetryPolicy::immediate(2)))
}

pub async fn regional_authenticator(membership: Arc<dyn TeamMembershipChecker>) -> Arc<MessageAuthenticator> {
    let sources = vec![fixture_source("regional_ca.pem")];
    let store = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1))
        .await
        .unwrap();
    Arc::new(MessageAuthenticator::new(Arc::new(store), membership, RetryPolicy::immediate(2)))
}

pub fn policy_repository(policies: TenantPolicies) -> Arc<ConfigTenantPolicyRepository> {
    Arc::new(ConfigTenantPolicyRepository::new(policies))
}

pub fn empty_store() -> Arc<dyn SubmissionContentSource> {
    Arc::new(InMemorySubmissionStore::new())
}

/// Prepend an origin header; outer headers are not covered by the signature.
pub fn with_origin(message: &[u8], ip: &str) -> Vec<u8> {
    let mut out = format!("X-Originating-IP: [{ip}]\n").into_bytes();
    out.extend_from_slice(message);
    out
}
