// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Collaborator Interfaces
//!
//! Contracts the core consumes from the data platform, the mailbox store and
//! the certificate host. Interfaces live in the domain layer; implementations
//! live in `crate::infrastructure`.
//!
//! | Trait | Contract | Implementations |
//! |-------|----------|-----------------|
//! | `CertificateFetcher` | fetch certificate bytes from a source | `HttpCertificateFetcher` |
//! | `TeamMembershipChecker` | is the user a current team member | `InMemoryTeamMembership` |
//! | `MembershipRequestChecker` | does an open membership request exist | `InMemoryMembershipRequests` |
//! | `TenantPolicyRepository` | load all tenant policies | `ConfigTenantPolicyRepository` |
//! | `SubmissionContentSource` | download a submission's message | `InMemorySubmissionStore`, `DirectorySubmissionSource` |
//!
//! Every call may fail with a [`CollaboratorError`]; only
//! [`CollaboratorError::Transient`] is worth retrying (see
//! `crate::infrastructure::retry`).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::dataset_settings::TenantPolicies;
use crate::domain::identifiers::{SubmissionId, TeamId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Conflicting concurrent update, result not ready yet, connection reset.
    #[error("transient collaborator failure: {0}")]
    Transient(String),

    #[error("collaborator failure: {0}")]
    Fatal(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    /// Fetch raw certificate bytes (PEM or DER) from `source`.
    async fn fetch_certificate_bytes(&self, source: &str) -> Result<Vec<u8>, CollaboratorError>;
}

#[async_trait]
pub trait TeamMembershipChecker: Send + Sync {
    async fn is_team_member(&self, team_id: TeamId, user_id: UserId) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait MembershipRequestChecker: Send + Sync {
    /// True while an open membership request exists for the user in the team.
    async fn membership_request_exists(&self, team_id: TeamId, user_id: UserId) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait TenantPolicyRepository: Send + Sync {
    async fn lookup_tenant_policies(&self) -> Result<TenantPolicies, CollaboratorError>;
}

#[async_trait]
pub trait SubmissionContentSource: Send + Sync {
    async fn download_submission_content(&self, submission_id: &SubmissionId) -> Result<Vec<u8>, CollaboratorError>;
}
