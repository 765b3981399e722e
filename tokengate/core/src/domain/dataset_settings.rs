// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dataset Settings (tenant policy)
//!
//! One [`DatasetSettings`] exists per application team. It names the access
//! requirements a token grants, how long issued tokens stay valid, which
//! networks inbound approvals may originate from and who may approve.
//!
//! Policies are loaded once per processing run and treated as immutable for
//! the rest of it; lookups go through [`TenantPolicies`], keyed by team id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::domain::identifiers::{AccessRequirementId, TeamId, UserId};

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Tenant policies for a run, keyed by application team.
pub type TenantPolicies = HashMap<TeamId, DatasetSettings>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// Tenant key.
    pub application_team_id: TeamId,

    /// Access requirements granted when a token from this tenant is accepted.
    pub access_requirement_ids: BTreeSet<AccessRequirementId>,

    /// Free text embedded in issued tokens so that approvers can tell datasets apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_label: Option<String>,

    /// Days after issuance during which a token is accepted.
    #[serde(default = "default_token_expiration_days")]
    pub token_expiration_days: u32,

    /// CIDR ranges inbound approvals must originate from. Empty means the
    /// tenant does not enforce origin validation.
    #[serde(default)]
    pub allowed_subnets: Vec<String>,

    /// Days a membership request stays open after it was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_request_expiration_days: Option<u32>,

    /// Principals allowed to sign approvals for this tenant.
    #[serde(default)]
    pub approver_ids: Vec<UserId>,
}

fn default_token_expiration_days() -> u32 {
    14
}

impl DatasetSettings {
    pub fn new(application_team_id: TeamId, access_requirement_ids: impl IntoIterator<Item = AccessRequirementId>) -> Self {
        Self {
            application_team_id,
            access_requirement_ids: access_requirement_ids.into_iter().collect(),
            token_label: None,
            token_expiration_days: default_token_expiration_days(),
            allowed_subnets: Vec::new(),
            membership_request_expiration_days: None,
            approver_ids: Vec::new(),
        }
    }

    /// Token lifetime in milliseconds.
    pub fn token_lifetime_millis(&self) -> i64 {
        i64::from(self.token_expiration_days) * MILLIS_PER_DAY
    }

    /// True when a token issued at `issued_at` has outlived this tenant's
    /// expiration window as of `now`.
    pub fn is_token_expired(&self, issued_at: i64, now: i64) -> bool {
        issued_at.saturating_add(self.token_lifetime_millis()) < now
    }

    pub fn requires_origin_validation(&self) -> bool {
        !self.allowed_subnets.is_empty()
    }

    /// When a membership request created at `created_at` lapses, if the
    /// tenant expires requests at all.
    pub fn membership_request_expires_at(&self, created_at: i64) -> Option<i64> {
        self.membership_request_expiration_days
            .map(|days| created_at.saturating_add(i64::from(days) * MILLIS_PER_DAY))
    }
}
