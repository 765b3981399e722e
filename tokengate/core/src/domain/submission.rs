// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Submission Processing Result
//!
//! A submission is one inbound message placed on the evaluation queue by the
//! mailbox poller. Processing it yields exactly one
//! [`SubmissionProcessingResult`]; the approval layer applies its side effects.
//!
//! ## Invariants
//!
//! - The final status is always [`SubmissionStatus::Closed`] or
//!   [`SubmissionStatus::Rejected`]; nothing is left pending.
//! - `Closed` iff at least one embedded token validated.
//! - Every notice carries a copy of the original message so the sender can
//!   see what was evaluated.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::identifiers::{SubmissionId, UserId};
use crate::domain::token::TokenContent;

/// A queued inbound message, before its content has been downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// Account that placed the message on the queue.
    pub sender_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// At least one token was accepted.
    Closed,
    Rejected,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("CLOSED"),
            Self::Rejected => f.write_str("REJECTED"),
        }
    }
}

/// A message queued for the sender of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderNotice {
    pub reason: String,
    pub original_message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionProcessingResult {
    pub status: SubmissionStatus,
    /// Set when the submission was rejected.
    pub rejection_reason: Option<String>,
    pub valid_tokens: HashSet<TokenContent>,
    /// Number of distinct invalid tokens found.
    pub invalid_token_count: usize,
    pub notices: Vec<SenderNotice>,
}

impl SubmissionProcessingResult {
    /// Accepted with the given valid tokens.
    pub fn accepted(valid_tokens: HashSet<TokenContent>) -> Self {
        Self {
            status: SubmissionStatus::Closed,
            rejection_reason: None,
            valid_tokens,
            invalid_token_count: 0,
            notices: Vec::new(),
        }
    }

    /// Rejected outright; the sender is told why.
    pub fn rejected(reason: impl Into<String>, original_message: &[u8]) -> Self {
        let reason = reason.into();
        Self {
            status: SubmissionStatus::Rejected,
            rejection_reason: Some(reason.clone()),
            valid_tokens: HashSet::new(),
            invalid_token_count: 0,
            notices: vec![SenderNotice { reason, original_message: original_message.to_vec() }],
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SubmissionStatus::Closed
    }

    pub fn with_notice(mut self, reason: impl Into<String>, original_message: &[u8]) -> Self {
        self.notices.push(SenderNotice { reason: reason.into(), original_message: original_message.to_vec() });
        self
    }
}
