// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end validation of signed approval messages.
//!
//! Covers the signature gate, the delegated-trust bypass, origin gating,
//! mixed valid/invalid tokens and batch processing over an in-memory queue.

mod common;

use std::sync::Arc;

use common::*;
use tokengate_core::application::submission_validation::{
    NOT_SIGNED_REASON, NO_TOKEN_REASON, ORIGIN_NOT_ALLOWED_REASON,
};
use tokengate_core::application::SubmissionValidationService;
use tokengate_core::domain::dataset_settings::{DatasetSettings, TenantPolicies};
use tokengate_core::domain::identifiers::{AccessRequirementId, SubmissionId, TeamId, UserId};
use tokengate_core::domain::submission::{Submission, SubmissionStatus};
use tokengate_core::infrastructure::repositories::{
    InMemoryMembershipRequests, InMemorySubmissionStore, InMemoryTeamMembership,
};
use tokengate_core::infrastructure::RetryPolicy;

const APPROVER: UserId = UserId(273950);
const SERVICE_ACCOUNT: UserId = UserId(3324230);
const DELEGATED_TEAM: TeamId = TeamId(3497313);

async fn service_with(membership: InMemoryTeamMembership, policies: TenantPolicies) -> SubmissionValidationService {
    SubmissionValidationService::new(
        codec(),
        authenticator(Arc::new(membership)).await,
        policy_repository(policies),
        empty_store(),
    )
    .with_retry(RetryPolicy::immediate(2))
}

async fn service() -> SubmissionValidationService {
    service_with(InMemoryTeamMembership::new(), policies()).await
}

fn unsigned_message() -> Vec<u8> {
    format!(
        "From: approver@example.org\nSubject: token\n\n\
         =============== SYNAPSE LINK TOKEN BOUNDARY ===============\n\
         {FIXTURE_TOKEN}\n\
         =============== SYNAPSE LINK TOKEN BOUNDARY ===============\n"
    )
    .into_bytes()
}

#[tokio::test]
async fn test_trusted_detached_signature_closes_submission() {
    let service = service().await;
    let message = fixture("signed.eml");

    let result = service.validate_submission_at(&message, &policies(), None, APPROVER, NOW).await;

    assert_eq!(result.status, SubmissionStatus::Closed);
    assert!(result.notices.is_empty());
    let token = result.valid_tokens.iter().next().unwrap();
    assert_eq!(token.user_id, UserId(3350396));
    assert_eq!(token.application_team_id, TEAM);
    assert_eq!(token.issued_at, ISSUED_AT);
    assert_eq!(token.token_label.as_deref(), Some("Test Dataset"));
}

#[tokio::test]
async fn test_trusted_opaque_signature_closes_submission() {
    let service = service().await;
    let result = service.validate_submission_at(&fixture("opaque.eml"), &policies(), None, APPROVER, NOW).await;

    assert_eq!(result.status, SubmissionStatus::Closed);
    assert_eq!(result.valid_tokens.len(), 1);
}

#[tokio::test]
async fn test_untrusted_signer_is_rejected() {
    let service = service().await;
    let message = fixture("rogue_signed.eml");

    let result = service.validate_submission_at(&message, &policies(), None, APPROVER, NOW).await;

    assert_eq!(result.status, SubmissionStatus::Rejected);
    assert_eq!(result.rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
    assert_eq!(result.notices[0].original_message, message);
}

#[tokio::test]
async fn test_tampered_signed_content_is_rejected() {
    let service = service().await;
    let tampered = String::from_utf8(fixture("signed.eml"))
        .unwrap()
        .replace("Please find my access token", "Please find my access tokens");

    let result = service.validate_submission_at(tampered.as_bytes(), &policies(), None, APPROVER, NOW).await;
    assert_eq!(result.rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
}

#[tokio::test]
async fn test_unsigned_message_is_rejected_without_bypass() {
    let service = service().await;
    let result = service.validate_submission_at(&unsigned_message(), &policies(), None, APPROVER, NOW).await;
    assert_eq!(result.rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
}

#[tokio::test]
async fn test_delegated_trust_member_bypasses_signature() {
    let membership = InMemoryTeamMembership::new();
    membership.add_member(DELEGATED_TEAM, APPROVER).unwrap();
    let service = service_with(membership, policies())
        .await
        .with_delegated_trust_team(Some(DELEGATED_TEAM));

    let result = service.validate_submission_at(&unsigned_message(), &policies(), None, APPROVER, NOW).await;
    assert_eq!(result.status, SubmissionStatus::Closed);

    let outsider = service
        .validate_submission_at(&unsigned_message(), &policies(), None, UserId(1), NOW)
        .await;
    assert_eq!(outsider.rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
}

#[tokio::test]
async fn test_service_account_never_bypasses() {
    let membership = InMemoryTeamMembership::new();
    membership.add_member(DELEGATED_TEAM, SERVICE_ACCOUNT).unwrap();
    let service = service_with(membership, policies())
        .await
        .with_delegated_trust_team(Some(DELEGATED_TEAM));

    let result = service
        .validate_submission_at(&unsigned_message(), &policies(), Some(SERVICE_ACCOUNT), SERVICE_ACCOUNT, NOW)
        .await;
    assert_eq!(result.rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
}

#[tokio::test]
async fn test_origin_gating() {
    let mut restricted = settings();
    restricted.allowed_subnets = vec!["156.40.0.0/16".to_string()];
    let policies: TenantPolicies = [(TEAM, restricted)].into_iter().collect();
    let service = service_with(InMemoryTeamMembership::new(), policies.clone()).await;
    let signed = fixture("signed.eml");

    let missing = service.validate_submission_at(&signed, &policies, None, APPROVER, NOW).await;
    assert_eq!(missing.rejection_reason.as_deref(), Some(ORIGIN_NOT_ALLOWED_REASON));

    let outside = with_origin(&signed, "200.1.1.1");
    let outside = service.validate_submission_at(&outside, &policies, None, APPROVER, NOW).await;
    assert_eq!(outside.rejection_reason.as_deref(), Some(ORIGIN_NOT_ALLOWED_REASON));

    let inside = with_origin(&signed, "156.40.7.19");
    let inside = service.validate_submission_at(&inside, &policies, None, APPROVER, NOW).await;
    assert_eq!(inside.status, SubmissionStatus::Closed);
}

#[tokio::test]
async fn test_origin_checked_against_every_referenced_tenant() {
    // cross_tenant.eml carries the valid token for TEAM plus an unsigned
    // slice naming an unrestricted tenant.
    let open_team = TeamId(99);
    let mut restricted = settings();
    restricted.allowed_subnets = vec!["156.40.0.0/16".to_string()];
    let policies: TenantPolicies = [
        (TEAM, restricted),
        (open_team, DatasetSettings::new(open_team, [AccessRequirementId(1)])),
    ]
    .into_iter()
    .collect();

    let service = SubmissionValidationService::new(
        codec(),
        regional_authenticator(Arc::new(InMemoryTeamMembership::new())).await,
        policy_repository(policies.clone()),
        empty_store(),
    )
    .with_retry(RetryPolicy::immediate(2));
    let message = fixture("cross_tenant.eml");

    let outside = with_origin(&message, "200.1.1.1");
    let outside = service.validate_submission_at(&outside, &policies, None, APPROVER, NOW).await;
    assert_eq!(outside.status, SubmissionStatus::Rejected);
    assert_eq!(outside.rejection_reason.as_deref(), Some(ORIGIN_NOT_ALLOWED_REASON));
    assert!(outside.valid_tokens.is_empty());

    let inside = with_origin(&message, "156.40.7.19");
    let inside = service.validate_submission_at(&inside, &policies, None, APPROVER, NOW).await;
    assert_eq!(inside.status, SubmissionStatus::Closed);
    assert_eq!(inside.valid_tokens.len(), 1);
    assert_eq!(inside.valid_tokens.iter().next().unwrap().application_team_id, TEAM);
}

#[tokio::test]
async fn test_mixed_tokens_close_with_notice() {
    let service = service().await;
    let message = fixture("mixed.eml");

    let result = service.validate_submission_at(&message, &policies(), None, APPROVER, NOW).await;

    assert_eq!(result.status, SubmissionStatus::Closed);
    assert_eq!(result.valid_tokens.len(), 1);
    assert_eq!(result.invalid_token_count, 1);
    assert_eq!(result.notices.len(), 1);
    assert_eq!(
        result.notices[0].reason,
        "1 valid token(s) and 1 invalid token(s) were found in this message.\n\tinvalid digital signature"
    );
    assert_eq!(result.notices[0].original_message, message);
}

#[tokio::test]
async fn test_expired_token_is_rejected_with_reason() {
    let service = service().await;
    let later = ISSUED_AT + 15 * 86_400_000;

    let result = service.validate_submission_at(&fixture("signed.eml"), &policies(), None, APPROVER, later).await;

    assert_eq!(result.status, SubmissionStatus::Rejected);
    let reason = result.rejection_reason.unwrap();
    assert!(reason.starts_with("message timestamp has expired"), "{reason}");
}

#[tokio::test]
async fn test_bypassed_message_without_token() {
    let membership = InMemoryTeamMembership::new();
    membership.add_member(DELEGATED_TEAM, APPROVER).unwrap();
    let service = service_with(membership, policies())
        .await
        .with_delegated_trust_team(Some(DELEGATED_TEAM));

    let message = b"From: approver@example.org\nSubject: hello\n\nNothing to see here.\n";
    let result = service.validate_submission_at(message, &policies(), None, APPROVER, NOW).await;
    assert_eq!(result.rejection_reason.as_deref(), Some(NO_TOKEN_REASON));
}

#[tokio::test]
async fn test_membership_request_required_when_configured() {
    let requests = Arc::new(InMemoryMembershipRequests::new());
    let service = service().await.with_membership_requests(requests.clone());
    let message = fixture("signed.eml");

    let without = service.validate_submission_at(&message, &policies(), None, APPROVER, NOW).await;
    assert_eq!(
        without.rejection_reason.as_deref(),
        Some("no matching membership request for user 3350396 in team 3412389")
    );

    requests.open_request(TEAM, UserId(3350396)).unwrap();
    let with = service.validate_submission_at(&message, &policies(), None, APPROVER, NOW).await;
    assert_eq!(with.status, SubmissionStatus::Closed);
}

#[tokio::test]
async fn test_batch_processes_every_submission_in_order() {
    let store = InMemorySubmissionStore::new();
    store.insert(SubmissionId::new("9614021"), fixture("signed.eml")).unwrap();
    store.insert(SubmissionId::new("9614022"), fixture("rogue_signed.eml")).unwrap();

    // The batch runs against the wall clock; keep the fixture token alive.
    let mut long_lived = settings();
    long_lived.token_expiration_days = 36_500;
    let policies: TenantPolicies = [(TEAM, long_lived)].into_iter().collect();

    let service = SubmissionValidationService::new(
        codec(),
        authenticator(Arc::new(InMemoryTeamMembership::new())).await,
        policy_repository(policies),
        Arc::new(store),
    )
    .with_retry(RetryPolicy::immediate(1))
    .with_service_account(Some(SERVICE_ACCOUNT));

    let submissions = vec![
        Submission { id: SubmissionId::new("9614021"), sender_id: APPROVER },
        Submission { id: SubmissionId::new("9614022"), sender_id: APPROVER },
        Submission { id: SubmissionId::new("9614023"), sender_id: APPROVER },
    ];
    let results = service.process_batch(&submissions).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, SubmissionStatus::Closed);
    assert_eq!(results[1].rejection_reason.as_deref(), Some(NOT_SIGNED_REASON));
    assert_eq!(results[2].status, SubmissionStatus::Rejected);
    assert!(results[2].rejection_reason.as_deref().unwrap().contains("9614023"));
}
