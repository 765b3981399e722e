// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Submission Validation Service
//!
//! Turns one queued message into exactly one [`SubmissionProcessingResult`].
//!
//! # Flow
//!
//! 1. Download the message (transient failures retried).
//! 2. Unless the sender may bypass, require a trusted S/MIME signature and an
//!    origin allowed by every tenant the message references.
//! 3. Extract tokens from the decoded text parts and analyse them.
//! 4. `CLOSED` with at least one valid token, otherwise `REJECTED`.
//!
//! Nothing escapes a submission: any failure becomes `REJECTED` with the
//! error text as the reason, so one bad message cannot abort a batch.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::collaborators::{
    CollaboratorError, MembershipRequestChecker, SubmissionContentSource, TenantPolicyRepository,
};
use crate::domain::dataset_settings::{DatasetSettings, TenantPolicies};
use crate::domain::identifiers::{TeamId, UserId};
use crate::domain::submission::{Submission, SubmissionProcessingResult};
use crate::domain::token::{TokenAnalysisResult, TokenContent};
use crate::infrastructure::mime;
use crate::infrastructure::origin::OriginValidator;
use crate::infrastructure::retry::{retry_transient, RetryPolicy};
use crate::infrastructure::smime::MessageAuthenticator;
use crate::infrastructure::token_codec::TokenCodec;

pub const NOT_SIGNED_REASON: &str = "The message is not digitally signed by a trusted certificate.";
pub const ORIGIN_NOT_ALLOWED_REASON: &str = "The message did not originate from an allowed network address.";
pub const NO_TOKEN_REASON: &str = "No access token was found in the message.";

pub struct SubmissionValidationService {
    codec: Arc<TokenCodec>,
    authenticator: Arc<MessageAuthenticator>,
    origin: OriginValidator,
    policies: Arc<dyn TenantPolicyRepository>,
    content_source: Arc<dyn SubmissionContentSource>,
    membership_requests: Option<Arc<dyn MembershipRequestChecker>>,
    service_account: Option<UserId>,
    delegated_trust_team: Option<TeamId>,
    retry: RetryPolicy,
}

impl SubmissionValidationService {
    pub fn new(
        codec: Arc<TokenCodec>,
        authenticator: Arc<MessageAuthenticator>,
        policies: Arc<dyn TenantPolicyRepository>,
        content_source: Arc<dyn SubmissionContentSource>,
    ) -> Self {
        Self {
            codec,
            authenticator,
            origin: OriginValidator::default(),
            policies,
            content_source,
            membership_requests: None,
            service_account: None,
            delegated_trust_team: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_origin_validator(mut self, origin: OriginValidator) -> Self {
        self.origin = origin;
        self
    }

    /// Require an open membership request for every accepted token.
    pub fn with_membership_requests(mut self, checker: Arc<dyn MembershipRequestChecker>) -> Self {
        self.membership_requests = Some(checker);
        self
    }

    pub fn with_service_account(mut self, account: Option<UserId>) -> Self {
        self.service_account = account;
        self
    }

    pub fn with_delegated_trust_team(mut self, team: Option<TeamId>) -> Self {
        self.delegated_trust_team = team;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate `content` against `policies` as of the wall clock.
    pub async fn validate_submission(
        &self,
        content: &[u8],
        policies: &TenantPolicies,
        self_account: Option<UserId>,
        sender: UserId,
    ) -> SubmissionProcessingResult {
        let now = chrono::Utc::now().timestamp_millis();
        self.validate_submission_at(content, policies, self_account, sender, now).await
    }

    pub async fn validate_submission_at(
        &self,
        content: &[u8],
        policies: &TenantPolicies,
        self_account: Option<UserId>,
        sender: UserId,
        now: i64,
    ) -> SubmissionProcessingResult {
        match self.try_validate(content, policies, self_account, sender, now).await {
            Ok(result) => result,
            Err(e) => {
                warn!(sender = %sender, error = %e, "Submission could not be analysed");
                SubmissionProcessingResult::rejected(e.to_string(), content)
            }
        }
    }

    async fn try_validate(
        &self,
        content: &[u8],
        policies: &TenantPolicies,
        self_account: Option<UserId>,
        sender: UserId,
        now: i64,
    ) -> Result<SubmissionProcessingResult, CollaboratorError> {
        let token_text = self.token_text(content);

        let bypass = self.authenticator.bypass(sender, self_account, self.delegated_trust_team).await?;
        if !bypass {
            if !self.authenticator.is_validly_signed(content) {
                info!(sender = %sender, "Rejecting unsigned submission");
                return Ok(SubmissionProcessingResult::rejected(NOT_SIGNED_REASON, content));
            }

            if !self.origin_allowed(content, token_text.as_bytes(), policies) {
                info!(sender = %sender, "Rejecting submission from a disallowed origin");
                return Ok(SubmissionProcessingResult::rejected(ORIGIN_NOT_ALLOWED_REASON, content));
            }
        }

        let checker = self.membership_requests.as_deref();
        let results = retry_transient(&self.retry, "membership request lookup", || {
            self.codec.parse_checked(token_text.as_bytes(), policies, checker, now)
        })
        .await?;

        Ok(summarize(results, content))
    }

    /// Download and validate one queued submission. Never fails.
    pub async fn process_submission(
        &self,
        submission: &Submission,
        policies: &TenantPolicies,
    ) -> SubmissionProcessingResult {
        let download = retry_transient(&self.retry, "download submission", || {
            self.content_source.download_submission_content(&submission.id)
        })
        .await;

        let result = match download {
            Ok(content) => {
                self.validate_submission(&content, policies, self.service_account, submission.sender_id)
                    .await
            }
            Err(e) => {
                warn!(submission_id = %submission.id, error = %e, "Failed to download submission");
                SubmissionProcessingResult::rejected(
                    format!("Failed to download submission {}: {e}", submission.id),
                    &[],
                )
            }
        };

        info!(
            submission_id = %submission.id,
            sender = %submission.sender_id,
            status = %result.status,
            valid_tokens = result.valid_tokens.len(),
            invalid_tokens = result.invalid_token_count,
            "Processed submission"
        );
        result
    }

    /// Process `submissions` strictly in order against one policy snapshot.
    pub async fn process_batch(
        &self,
        submissions: &[Submission],
    ) -> Result<Vec<SubmissionProcessingResult>, CollaboratorError> {
        let policies = retry_transient(&self.retry, "lookup tenant policies", || {
            self.policies.lookup_tenant_policies()
        })
        .await?;

        let mut results = Vec::with_capacity(submissions.len());
        for submission in submissions {
            results.push(self.process_submission(submission, &policies).await);
        }

        let accepted = results.iter().filter(|r| r.is_accepted()).count();
        info!(
            submissions = results.len(),
            accepted,
            rejected = results.len() - accepted,
            "Batch complete"
        );
        Ok(results)
    }

    /// Every configured tenant referenced by a candidate token must accept
    /// the origin, whether or not that token later verifies. When no tenant
    /// is referenced, one accepting tenant is enough.
    fn origin_allowed(&self, content: &[u8], text: &[u8], policies: &TenantPolicies) -> bool {
        let referenced: Vec<&DatasetSettings> = self
            .codec
            .referenced_teams(text)
            .iter()
            .filter_map(|team| policies.get(team))
            .collect();

        if referenced.is_empty() {
            return policies.is_empty()
                || policies.values().any(|settings| self.origin.is_origin_allowed(content, settings));
        }
        referenced.iter().all(|settings| {
            let allowed = self.origin.is_origin_allowed(content, settings);
            if !allowed {
                debug!(team_id = %settings.application_team_id, "Origin not allowed for referenced tenant");
            }
            allowed
        })
    }

    /// Decoded text of the message, falling back to the signed inner entity
    /// and finally to the raw bytes.
    fn token_text(&self, content: &[u8]) -> String {
        let mut bodies = mime::text_bodies(content);
        if bodies.is_empty() {
            if let Some(inner) = self.authenticator.signed_content(content) {
                bodies = mime::text_bodies(&inner);
            }
        }
        if bodies.is_empty() {
            return String::from_utf8_lossy(content).into_owned();
        }
        bodies.join("\n")
    }
}

fn summarize(results: HashSet<TokenAnalysisResult>, content: &[u8]) -> SubmissionProcessingResult {
    if results.is_empty() {
        return SubmissionProcessingResult::rejected(NO_TOKEN_REASON, content);
    }

    let mut valid: HashSet<TokenContent> = HashSet::new();
    let mut reasons: Vec<String> = Vec::new();
    for result in results {
        match result {
            TokenAnalysisResult::Valid(token) => {
                valid.insert(token);
            }
            TokenAnalysisResult::Invalid { reason, .. } => reasons.push(reason),
        }
    }
    reasons.sort();

    if valid.is_empty() {
        let mut result = SubmissionProcessingResult::rejected(reasons.join("\n"), content);
        result.invalid_token_count = reasons.len();
        return result;
    }

    let valid_count = valid.len();
    let mut result = SubmissionProcessingResult::accepted(valid);
    result.invalid_token_count = reasons.len();
    if !reasons.is_empty() {
        result = result.with_notice(mixed_result_notice(valid_count, &reasons), content);
    }
    result
}

/// Sender notice for a message holding both valid and invalid tokens.
pub fn mixed_result_notice(valid_count: usize, reasons: &[String]) -> String {
    let mut notice = format!(
        "{valid_count} valid token(s) and {} invalid token(s) were found in this message.",
        reasons.len()
    );
    for reason in reasons {
        notice.push_str("\n\t");
        notice.push_str(reason);
    }
    notice
}
