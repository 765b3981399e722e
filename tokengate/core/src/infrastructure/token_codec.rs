// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token Codec
//!
//! Creates, locates and verifies HMAC-signed access tokens embedded in email
//! text.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Sign outbound tokens and turn inbound message text into
//!   per-token analysis results
//!
//! # Scanning
//!
//! Mail clients reflow, quote and re-encode bodies, so the scanner matches
//! both terminator literals with any whitespace run standing in for the
//! spaces inside them. Text between an opening and a closing terminator is one
//! candidate slice; an unpaired tail is ignored. Slices are trimmed and split
//! on the separator with trailing empty fields dropped.
//!
//! Malformed input never produces an `Err`: every failure becomes a
//! [`TokenAnalysisResult::Invalid`] carrying a reason meant for the sender.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha1::Sha1;
use std::collections::{BTreeSet, HashSet};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::collaborators::{CollaboratorError, MembershipRequestChecker};
use crate::domain::dataset_settings::{DatasetSettings, TenantPolicies};
use crate::domain::identifiers::{AccessRequirementId, TeamId, UserId};
use crate::domain::token::{
    Token, TokenAnalysisResult, TokenContent, TokenRejection, TokenVersion, FIELD_SEPARATOR,
    LEGACY_TOKEN_TERMINATOR, NULL_FIELD, TOKEN_TERMINATOR,
};

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Error)]
pub enum TokenCodecError {
    #[error("token signing secret is not configured")]
    MissingSecret,

    #[error("token signing secret is not valid base64: {0}")]
    MalformedSecret(String),

    #[error("invalid token field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("failed to build terminator pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Signs and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha1,
    legacy_team_id: Option<TeamId>,
    terminators: Regex,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("mac", &"<redacted>")
            .field("legacy_team_id", &self.legacy_team_id)
            .finish()
    }
}

/// A slice split into fields, before any field has been interpreted.
struct CandidateFields<'a> {
    version: TokenVersion,
    fields: Vec<&'a str>,
}

impl TokenCodec {
    /// Build a codec from a base64-encoded HMAC key. V1 tokens, which carry no
    /// tenant, are verified against `legacy_team_id`'s policy.
    pub fn new(secret_base64: &str, legacy_team_id: Option<TeamId>) -> Result<Self, TokenCodecError> {
        let secret = secret_base64.trim();
        if secret.is_empty() {
            return Err(TokenCodecError::MissingSecret);
        }
        let key = BASE64
            .decode(secret)
            .map_err(|e| TokenCodecError::MalformedSecret(e.to_string()))?;
        if key.is_empty() {
            return Err(TokenCodecError::MissingSecret);
        }
        let mac = HmacSha1::new_from_slice(&key)
            .map_err(|e| TokenCodecError::MalformedSecret(e.to_string()))?;

        let pattern = format!(
            "(?:{})|(?:{})",
            whitespace_tolerant(TOKEN_TERMINATOR),
            whitespace_tolerant(LEGACY_TOKEN_TERMINATOR)
        );

        Ok(Self { mac, legacy_team_id, terminators: Regex::new(&pattern)? })
    }

    pub fn legacy_team_id(&self) -> Option<TeamId> {
        self.legacy_team_id
    }

    /// Create a current-version token block for `user_id` under `settings`.
    pub fn create(
        &self,
        user_id: UserId,
        issued_at: i64,
        settings: &DatasetSettings,
        membership_request_expires_at: Option<i64>,
    ) -> Result<String, TokenCodecError> {
        let token = Token::V2 {
            token_label: settings.token_label.clone().filter(|label| !label.is_empty()),
            user_id,
            application_team_id: settings.application_team_id,
            access_requirement_ids: settings.access_requirement_ids.iter().copied().collect(),
            membership_request_expires_at,
            issued_at,
        };
        self.encode(&token)
    }

    /// Sign `token` and wrap it in the terminator matching its version.
    pub fn encode(&self, token: &Token) -> Result<String, TokenCodecError> {
        if let Token::V2 { token_label: Some(label), .. } = token {
            if label.contains(FIELD_SEPARATOR) || label.contains(['\r', '\n']) {
                return Err(TokenCodecError::InvalidField {
                    field: "token_label",
                    reason: format!("must not contain '{FIELD_SEPARATOR}' or a line break"),
                });
            }
        }

        let unsigned = token.unsigned_payload();
        let signature = self.sign(&unsigned);
        let terminator = token.terminator();
        Ok(format!("{terminator}\n{unsigned}{signature}{FIELD_SEPARATOR}\n{terminator}\n"))
    }

    /// Base64 HMAC-SHA1 of `unsigned`.
    pub fn sign(&self, unsigned: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(unsigned.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn signature_matches(&self, unsigned: &str, claimed: &str) -> bool {
        let expected = self.sign(unsigned);
        bool::from(expected.as_bytes().ct_eq(claimed.as_bytes()))
    }

    /// Trimmed text between each pair of terminators, in message order.
    pub fn candidate_slices<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut slices = Vec::new();
        let mut matches = self.terminators.find_iter(text);
        while let (Some(open), Some(close)) = (matches.next(), matches.next()) {
            slices.push(text[open.end()..close.start()].trim());
        }
        slices
    }

    /// Analyse every token found in `raw` without consulting collaborators.
    pub fn parse(&self, raw: &[u8], policies: &TenantPolicies, now: i64) -> HashSet<TokenAnalysisResult> {
        let text = String::from_utf8_lossy(raw);
        self.candidate_slices(&text)
            .into_iter()
            .map(|slice| match self.analyze_slice(slice, policies, now) {
                Ok(content) => TokenAnalysisResult::Valid(content),
                Err((user_id, rejection)) => reject(user_id, &rejection),
            })
            .collect()
    }

    /// Like [`TokenCodec::parse`], additionally requiring an open membership
    /// request for every otherwise valid token when `checker` is supplied.
    pub async fn parse_checked(
        &self,
        raw: &[u8],
        policies: &TenantPolicies,
        checker: Option<&dyn MembershipRequestChecker>,
        now: i64,
    ) -> Result<HashSet<TokenAnalysisResult>, CollaboratorError> {
        let text = String::from_utf8_lossy(raw);
        let mut results = HashSet::new();

        for slice in self.candidate_slices(&text) {
            let result = match self.analyze_slice(slice, policies, now) {
                Err((user_id, rejection)) => reject(user_id, &rejection),
                Ok(content) => match checker {
                    None => TokenAnalysisResult::Valid(content),
                    Some(checker) => {
                        let exists = checker
                            .membership_request_exists(content.application_team_id, content.user_id)
                            .await?;
                        if exists {
                            TokenAnalysisResult::Valid(content)
                        } else {
                            reject(
                                Some(content.user_id),
                                &TokenRejection::NoMatchingMembershipRequest {
                                    user_id: content.user_id,
                                    team_id: content.application_team_id,
                                },
                            )
                        }
                    }
                },
            };
            results.insert(result);
        }

        Ok(results)
    }

    /// Tenants named by the well-formed candidate slices in `raw`. V1 slices
    /// name the legacy tenant, if one is configured.
    pub fn referenced_teams(&self, raw: &[u8]) -> BTreeSet<TeamId> {
        let text = String::from_utf8_lossy(raw);
        self.candidate_slices(&text)
            .into_iter()
            .filter_map(|slice| {
                let candidate = split_candidate(slice).ok()?;
                match candidate.version {
                    TokenVersion::V1 => self.legacy_team_id,
                    TokenVersion::V2 => parse_i64(candidate.fields[3]).map(TeamId).ok(),
                }
            })
            .collect()
    }

    fn analyze_slice(
        &self,
        slice: &str,
        policies: &TenantPolicies,
        now: i64,
    ) -> Result<TokenContent, (Option<UserId>, TokenRejection)> {
        let candidate = split_candidate(slice).map_err(|rejection| (None, rejection))?;
        let fields = &candidate.fields;

        let (user_field, ar_field, timestamp_field, signature) = match candidate.version {
            TokenVersion::V1 => (fields[1], fields[2], fields[3], fields[4]),
            TokenVersion::V2 => (fields[2], fields[4], fields[6], fields[7]),
        };

        let user_id = parse_i64(user_field)
            .map(UserId)
            .map_err(|_| (None, TokenRejection::UnparseableUserId))?;
        let fail = |rejection: TokenRejection| (Some(user_id), rejection);

        let issued_at = parse_i64(timestamp_field)
            .map_err(|_| fail(TokenRejection::IllegalTimestamp(timestamp_field.to_string())))?;

        let team_id = match candidate.version {
            TokenVersion::V1 => self.legacy_team_id,
            TokenVersion::V2 => Some(
                parse_i64(fields[3])
                    .map(TeamId)
                    .map_err(|_| fail(TokenRejection::UnparseableTeamId(fields[3].to_string())))?,
            ),
        };
        let settings = team_id
            .and_then(|team| policies.get(&team))
            .ok_or_else(|| fail(TokenRejection::UnknownApplicationTeam(team_id)))?;

        if settings.is_token_expired(issued_at, now) {
            return Err(fail(TokenRejection::Expired {
                issued_at,
                expired_at: issued_at.saturating_add(settings.token_lifetime_millis()),
            }));
        }

        let access_requirement_ids = parse_access_requirements(ar_field)
            .ok_or_else(|| fail(TokenRejection::BadAccessRequirementList(ar_field.to_string())))?;

        let token = match candidate.version {
            TokenVersion::V1 => Token::V1 { user_id, access_requirement_ids, issued_at },
            TokenVersion::V2 => {
                let mr_field = fields[5];
                let membership_request_expires_at = if mr_field == NULL_FIELD {
                    None
                } else {
                    Some(parse_i64(mr_field).map_err(|_| {
                        fail(TokenRejection::BadMembershipRequestExpiration(mr_field.to_string()))
                    })?)
                };
                Token::V2 {
                    token_label: Some(fields[1].to_string()).filter(|label| !label.is_empty()),
                    user_id,
                    application_team_id: settings.application_team_id,
                    access_requirement_ids,
                    membership_request_expires_at,
                    issued_at,
                }
            }
        };

        if !self.signature_matches(&token.unsigned_payload(), signature) {
            return Err(fail(TokenRejection::InvalidSignature));
        }

        debug!(user_id = %user_id, team_id = %settings.application_team_id, "Token verified");
        Ok(token.into_content(settings.application_team_id))
    }
}

fn reject(user_id: Option<UserId>, rejection: &TokenRejection) -> TokenAnalysisResult {
    match user_id {
        Some(user_id) => warn!(user_id = %user_id, reason = %rejection, "Rejected token"),
        None => warn!(reason = %rejection, "Rejected token"),
    }
    TokenAnalysisResult::invalid(user_id, rejection)
}

/// Escape `literal` for a regex, letting any whitespace run match any other.
fn whitespace_tolerant(literal: &str) -> String {
    literal
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Split on the separator, dropping trailing empty fields.
fn split_fields(slice: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = slice.split(FIELD_SEPARATOR).collect();
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    fields
}

fn split_candidate(slice: &str) -> Result<CandidateFields<'_>, TokenRejection> {
    let fields = split_fields(slice);
    let version = TokenVersion::from_field_count(fields.len())
        .ok_or(TokenRejection::WrongNumberOfParts(fields.len()))?;
    Ok(CandidateFields { version, fields })
}

fn parse_i64(field: &str) -> Result<i64, std::num::ParseIntError> {
    field.parse::<i64>()
}

fn parse_access_requirements(field: &str) -> Option<Vec<AccessRequirementId>> {
    if field.is_empty() {
        return Some(Vec::new());
    }
    field
        .split(',')
        .map(|id| parse_i64(id).ok().map(AccessRequirementId))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset_settings::MILLIS_PER_DAY;
    use std::collections::HashMap;

    const SECRET: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";
    const TEAM: TeamId = TeamId(3412389);
    const ISSUED: i64 = 1_760_000_000_000;

    fn settings() -> DatasetSettings {
        let mut s = DatasetSettings::new(TEAM, [AccessRequirementId(9605264)]);
        s.token_label = Some("Test Dataset".to_string());
        s
    }

    fn policies() -> TenantPolicies {
        HashMap::from([(TEAM, settings())])
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, Some(TEAM)).unwrap()
    }

    #[test]
    fn test_rejects_missing_or_malformed_secret() {
        assert!(matches!(TokenCodec::new("", None), Err(TokenCodecError::MissingSecret)));
        assert!(matches!(TokenCodec::new("not base64!", None), Err(TokenCodecError::MalformedSecret(_))));
    }

    #[test]
    fn test_signature_matches_known_value() {
        let unsigned = "|Test Dataset|3350396|3412389|9605264|null|1760000000000|";
        assert_eq!(codec().sign(unsigned), "gQLobLeW5DPAGBxIFAKZCqg6mA0=");
    }

    #[test]
    fn test_create_then_parse() {
        let codec = codec();
        let block = codec.create(UserId(3350396), ISSUED, &settings(), None).unwrap();
        assert!(block.starts_with(TOKEN_TERMINATOR));
        assert!(block.contains("|Test Dataset|3350396|3412389|9605264|null|1760000000000|gQLobLeW5DPAGBxIFAKZCqg6mA0=|"));

        let results = codec.parse(block.as_bytes(), &policies(), ISSUED + MILLIS_PER_DAY);
        assert_eq!(results.len(), 1);
        let Some(TokenAnalysisResult::Valid(content)) = results.into_iter().next() else {
            panic!("expected a valid token");
        };
        assert_eq!(content.user_id, UserId(3350396));
        assert_eq!(content.application_team_id, TEAM);
        assert_eq!(content.token_label.as_deref(), Some("Test Dataset"));
        assert_eq!(content.issued_at, ISSUED);
    }

    #[test]
    fn test_label_with_separator_is_rejected() {
        let mut s = settings();
        s.token_label = Some("a|b".to_string());
        assert!(matches!(
            codec().create(UserId(1), ISSUED, &s, None),
            Err(TokenCodecError::InvalidField { field: "token_label", .. })
        ));
    }

    #[test]
    fn test_split_drops_trailing_empty_fields() {
        assert_eq!(split_fields("|1|2|3|sig|").len(), 5);
        assert_eq!(split_fields("|1|2|3|sig|x").len(), 6);
        assert_eq!(split_fields("|1|2|3|sig|||").len(), 5);
    }

    #[test]
    fn test_candidate_slices_pair_terminators() {
        let codec = codec();
        let text = format!("{t}\n a \n{t}\nnoise\n{t}\n b \n{t}\n{t}\n tail", t = TOKEN_TERMINATOR);
        assert_eq!(codec.candidate_slices(&text), vec!["a", "b"]);
    }

    #[test]
    fn test_terminator_tolerates_reflowed_whitespace() {
        let codec = codec();
        let reflowed = TOKEN_TERMINATOR.replace(' ', " \n  ");
        let text = format!("{reflowed}\nx\n{LEGACY_TOKEN_TERMINATOR}");
        assert_eq!(codec.candidate_slices(&text), vec!["x"]);
    }

    #[test]
    fn test_wrong_number_of_parts() {
        let codec = codec();
        let text = format!("{t}\n|1|2|{t}", t = TOKEN_TERMINATOR);
        let results = codec.parse(text.as_bytes(), &policies(), ISSUED);
        assert_eq!(
            results.into_iter().next(),
            Some(TokenAnalysisResult::Invalid {
                user_id: None,
                reason: "wrong number of parts in token (3)".to_string()
            })
        );
    }

    #[test]
    fn test_v1_without_legacy_team_is_unknown_application_team() {
        let codec = TokenCodec::new(SECRET, None).unwrap();
        let token = Token::V1 { user_id: UserId(7), access_requirement_ids: vec![], issued_at: ISSUED };
        let block = codec.encode(&token).unwrap();
        let results = codec.parse(block.as_bytes(), &policies(), ISSUED);
        let result = results.into_iter().next().unwrap();
        assert_eq!(result.user_id(), Some(UserId(7)));
        assert_eq!(result.reason(), Some("unknown application team"));
    }

    #[test]
    fn test_referenced_teams() {
        let codec = codec();
        let mut other = settings();
        other.application_team_id = TeamId(99);
        let mut text = codec.create(UserId(1), ISSUED, &other, None).unwrap();
        let v1 = Token::V1 { user_id: UserId(1), access_requirement_ids: vec![], issued_at: ISSUED };
        text.push_str(&codec.encode(&v1).unwrap());
        let teams: Vec<_> = codec.referenced_teams(text.as_bytes()).into_iter().collect();
        assert_eq!(teams, vec![TeamId(99), TEAM]);
    }

    #[test]
    fn test_bad_access_requirement_list() {
        let codec = codec();
        let unsigned = "|Test Dataset|1|3412389|9,x|null|1760000000000|";
        let text = format!("{t}\n{unsigned}{}|\n{t}", codec.sign(unsigned), t = TOKEN_TERMINATOR);
        let result = codec.parse(text.as_bytes(), &policies(), ISSUED).into_iter().next().unwrap();
        assert_eq!(result.reason(), Some("bad access requirement id list '9,x'"));
    }

    #[test]
    fn test_expiration_reported_before_signature() {
        let codec = codec();
        let forged = format!(
            "{t}\n|Test Dataset|1|3412389|9605264|null|{ISSUED}|AAAA|\n{t}",
            t = TOKEN_TERMINATOR
        );
        let now = ISSUED + 15 * MILLIS_PER_DAY;
        let result = codec.parse(forged.as_bytes(), &policies(), now).into_iter().next().unwrap();
        assert!(result.reason().unwrap().starts_with("message timestamp has expired"));
    }
}
