// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token Issuance Service
//!
//! Composes the outbound message a user forwards to an approver. The approver
//! signs the message with S/MIME and returns it to the submission mailbox,
//! where [`crate::application::SubmissionValidationService`] picks it up.

use std::sync::Arc;
use tracing::info;

use crate::domain::dataset_settings::DatasetSettings;
use crate::domain::identifiers::{TeamId, UserId};
use crate::infrastructure::token_codec::{TokenCodec, TokenCodecError};

/// A freshly signed token and the message text that carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub user_id: UserId,
    pub application_team_id: TeamId,
    pub issued_at: i64,
    pub membership_request_expires_at: Option<i64>,
    /// Terminator-wrapped token block.
    pub token: String,
    pub message_body: String,
}

pub struct TokenIssuanceService {
    codec: Arc<TokenCodec>,
}

impl TokenIssuanceService {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Compose a token for `user_id` under `settings`, issued at `now`.
    ///
    /// `membership_request_created_at` is the creation time of the user's
    /// open membership request; tenants that expire requests stamp the
    /// resulting deadline into the token.
    pub fn compose(
        &self,
        user_id: UserId,
        settings: &DatasetSettings,
        membership_request_created_at: Option<i64>,
        now: i64,
    ) -> Result<IssuedToken, TokenCodecError> {
        let membership_request_expires_at =
            membership_request_created_at.and_then(|created| settings.membership_request_expires_at(created));
        let token = self.codec.create(user_id, now, settings, membership_request_expires_at)?;

        info!(
            user_id = %user_id,
            team_id = %settings.application_team_id,
            "Issued access token"
        );

        Ok(IssuedToken {
            user_id,
            application_team_id: settings.application_team_id,
            issued_at: now,
            membership_request_expires_at,
            message_body: message_body(user_id, settings, &token),
            token,
        })
    }
}

fn message_body(user_id: UserId, settings: &DatasetSettings, token: &str) -> String {
    let dataset = settings
        .token_label
        .as_deref()
        .filter(|label| !label.is_empty())
        .map(|label| format!("'{label}'"))
        .unwrap_or_else(|| format!("team {}", settings.application_team_id));
    format!(
        "Access request for user {user_id}\n\n\
         To complete your request for access to {dataset}, forward this message to an approver. \
         The approver must sign it with their institutional certificate and send it back within \
         {days} days.\n\n\
         Do not edit the text between the two boundary lines below.\n\n\
         {token}",
        days = settings.token_expiration_days,
    )
}
