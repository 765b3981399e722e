// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Token (wire value and analysis outcome)
//!
//! A token is a signed claim that user U was issued permission to be granted
//! a set of access requirements. It travels as plain text inside email:
//!
//! ```text
//! <TERMINATOR>
//! |<userId>|<accessRequirementIds>|<epochMillis>|<hmac>|                                         (V1)
//! |<label>|<userId>|<teamId>|<accessRequirementIds>|<mrExpiresAt or null>|<epochMillis>|<hmac>|  (V2)
//! <TERMINATOR>
//! ```
//!
//! The two wire versions are modelled as one tagged union, [`Token`], selected
//! by field count. Encoding and verification live in
//! [`crate::infrastructure::token_codec`].
//!
//! ## Invariants
//!
//! - A parsed token is immutable.
//! - [`Token::unsigned_payload`] is the exact byte string the HMAC covers; the
//!   codec recomputes it from parsed fields, so any re-formatting of a field
//!   (leading zeros, reordering) invalidates the signature.
//! - [`TokenAnalysisResult`] values compare structurally so that the same
//!   token seen twice in one message counts once.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::identifiers::{AccessRequirementId, TeamId, UserId};

/// Separates token fields. Never appears inside a field value.
pub const FIELD_SEPARATOR: char = '|';

/// Line wrapped around V2 tokens.
pub const TOKEN_TERMINATOR: &str = "=============== SYNAPSE LINK TOKEN BOUNDARY ===============";

/// Line wrapped around V1 tokens. Still recognised when scanning.
pub const LEGACY_TOKEN_TERMINATOR: &str =
    "=============== SYNAPSE NRGR LINK TOKEN BOUNDARY ===============";

/// Literal used for an absent membership-request expiration.
pub const NULL_FIELD: &str = "null";

/// Field count of a V1 token once trailing empty fields are dropped.
pub const V1_FIELD_COUNT: usize = 5;

/// Field count of a V2 token once trailing empty fields are dropped.
pub const V2_FIELD_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenVersion {
    V1,
    V2,
}

impl TokenVersion {
    /// Select the wire version from a field count. One extra trailing field
    /// (mail-client garbage after the final separator) is tolerated.
    pub fn from_field_count(count: usize) -> Option<Self> {
        match count {
            V1_FIELD_COUNT | 6 => Some(Self::V1),
            V2_FIELD_COUNT | 9 => Some(Self::V2),
            _ => None,
        }
    }
}

/// A token as it appears on the wire, minus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Legacy token, implicitly scoped to the single legacy tenant.
    V1 {
        user_id: UserId,
        access_requirement_ids: Vec<AccessRequirementId>,
        issued_at: i64,
    },
    V2 {
        token_label: Option<String>,
        user_id: UserId,
        application_team_id: TeamId,
        access_requirement_ids: Vec<AccessRequirementId>,
        membership_request_expires_at: Option<i64>,
        issued_at: i64,
    },
}

impl Token {
    pub fn version(&self) -> TokenVersion {
        match self {
            Token::V1 { .. } => TokenVersion::V1,
            Token::V2 { .. } => TokenVersion::V2,
        }
    }

    /// The terminator emitted around this version.
    pub fn terminator(&self) -> &'static str {
        match self {
            Token::V1 { .. } => LEGACY_TOKEN_TERMINATOR,
            Token::V2 { .. } => TOKEN_TERMINATOR,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Token::V1 { user_id, .. } | Token::V2 { user_id, .. } => *user_id,
        }
    }

    pub fn issued_at(&self) -> i64 {
        match self {
            Token::V1 { issued_at, .. } | Token::V2 { issued_at, .. } => *issued_at,
        }
    }

    /// Team carried by the token itself. V1 tokens carry none.
    pub fn application_team_id(&self) -> Option<TeamId> {
        match self {
            Token::V1 { .. } => None,
            Token::V2 { application_team_id, .. } => Some(*application_team_id),
        }
    }

    /// The signed portion: every field, each preceded by the separator, with
    /// a trailing separator before the signature.
    pub fn unsigned_payload(&self) -> String {
        let sep = FIELD_SEPARATOR;
        match self {
            Token::V1 { user_id, access_requirement_ids, issued_at } => format!(
                "{sep}{user_id}{sep}{}{sep}{issued_at}{sep}",
                join_ids(access_requirement_ids)
            ),
            Token::V2 {
                token_label,
                user_id,
                application_team_id,
                access_requirement_ids,
                membership_request_expires_at,
                issued_at,
            } => {
                let mr_expires = membership_request_expires_at
                    .map(|millis| millis.to_string())
                    .unwrap_or_else(|| NULL_FIELD.to_string());
                format!(
                    "{sep}{}{sep}{user_id}{sep}{application_team_id}{sep}{}{sep}{mr_expires}{sep}{issued_at}{sep}",
                    token_label.as_deref().unwrap_or(""),
                    join_ids(access_requirement_ids),
                )
            }
        }
    }

    /// Convert into the structural content handed to the approval layer.
    /// `resolved_team` is the tenant whose policy verified the token.
    pub fn into_content(self, resolved_team: TeamId) -> TokenContent {
        match self {
            Token::V1 { user_id, access_requirement_ids, issued_at } => TokenContent {
                user_id,
                access_requirement_ids: access_requirement_ids.into_iter().collect(),
                issued_at,
                token_label: None,
                application_team_id: resolved_team,
                membership_request_expires_at: None,
            },
            Token::V2 {
                token_label,
                user_id,
                access_requirement_ids,
                membership_request_expires_at,
                issued_at,
                ..
            } => TokenContent {
                user_id,
                access_requirement_ids: access_requirement_ids.into_iter().collect(),
                issued_at,
                token_label,
                application_team_id: resolved_team,
                membership_request_expires_at,
            },
        }
    }
}

fn join_ids(ids: &[AccessRequirementId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Verified claims of a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenContent {
    pub user_id: UserId,
    pub access_requirement_ids: BTreeSet<AccessRequirementId>,
    /// Epoch milliseconds.
    pub issued_at: i64,
    pub token_label: Option<String>,
    pub application_team_id: TeamId,
    /// Epoch milliseconds.
    pub membership_request_expires_at: Option<i64>,
}

impl TokenContent {
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at)
    }
}

/// Why a candidate token was rejected. The `Display` text is shown to the
/// sender of the message, so it is phrased for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("wrong number of parts in token ({0})")]
    WrongNumberOfParts(usize),

    #[error("could not parse user id")]
    UnparseableUserId,

    #[error("illegal timestamp '{0}'")]
    IllegalTimestamp(String),

    #[error("could not parse application team id '{0}'")]
    UnparseableTeamId(String),

    #[error("unknown application team{}", .0.map(|t| format!(" {t}")).unwrap_or_default())]
    UnknownApplicationTeam(Option<TeamId>),

    #[error("message timestamp has expired: the token was issued {} and expired {}. Please request a new token.", format_millis(*.issued_at), format_millis(*.expired_at))]
    Expired { issued_at: i64, expired_at: i64 },

    #[error("bad access requirement id list '{0}'")]
    BadAccessRequirementList(String),

    #[error("bad membership request expiration '{0}'")]
    BadMembershipRequestExpiration(String),

    #[error("invalid digital signature")]
    InvalidSignature,

    #[error("no matching membership request for user {user_id} in team {team_id}")]
    NoMatchingMembershipRequest { user_id: UserId, team_id: TeamId },
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Outcome of analysing one candidate token slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenAnalysisResult {
    Valid(TokenContent),
    /// `user_id` is kept when it could be extracted so the rejection can be
    /// recorded against the right user.
    Invalid { user_id: Option<UserId>, reason: String },
}

impl TokenAnalysisResult {
    pub fn invalid(user_id: Option<UserId>, rejection: &TokenRejection) -> Self {
        Self::Invalid { user_id, reason: rejection.to_string() }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Valid(content) => Some(content.user_id),
            Self::Invalid { user_id, .. } => *user_id,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid { reason, .. } => Some(reason),
        }
    }
}
