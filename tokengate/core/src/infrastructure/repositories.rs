// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collaborator Implementations
//!
//! Infrastructure implementations of the collaborator contracts defined in
//! `crate::domain::collaborators`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Back the data-platform and mailbox contracts locally
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## In-Memory
//!
//! Thread-safe HashMap-backed stores for tests and one-shot CLI runs:
//! - **InMemoryTeamMembership** - team rosters
//! - **InMemoryMembershipRequests** - open membership requests
//! - **InMemorySubmissionStore** - queued message content
//!
//! ## Configuration and Filesystem
//!
//! - **ConfigTenantPolicyRepository** - tenant policies from the config manifest
//! - **DirectorySubmissionSource** - message content from `<dir>/<submission-id>.eml`

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::domain::collaborators::{
    CollaboratorError, MembershipRequestChecker, SubmissionContentSource, TeamMembershipChecker,
    TenantPolicyRepository,
};
use crate::domain::config::TokengateConfigManifest;
use crate::domain::dataset_settings::TenantPolicies;
use crate::domain::identifiers::{SubmissionId, TeamId, UserId};

fn poisoned<T>(_: T) -> CollaboratorError {
    CollaboratorError::Fatal("in-memory store lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryTeamMembership {
    members: Arc<RwLock<HashMap<TeamId, HashSet<UserId>>>>,
}

impl InMemoryTeamMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, team_id: TeamId, user_id: UserId) -> Result<(), CollaboratorError> {
        let mut members = self.members.write().map_err(poisoned)?;
        members.entry(team_id).or_default().insert(user_id);
        Ok(())
    }

    pub fn remove_member(&self, team_id: TeamId, user_id: UserId) -> Result<(), CollaboratorError> {
        let mut members = self.members.write().map_err(poisoned)?;
        if let Some(team) = members.get_mut(&team_id) {
            team.remove(&user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TeamMembershipChecker for InMemoryTeamMembership {
    async fn is_team_member(&self, team_id: TeamId, user_id: UserId) -> Result<bool, CollaboratorError> {
        let members = self.members.read().map_err(poisoned)?;
        Ok(members.get(&team_id).is_some_and(|team| team.contains(&user_id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMembershipRequests {
    open: Arc<RwLock<HashSet<(TeamId, UserId)>>>,
}

impl InMemoryMembershipRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_request(&self, team_id: TeamId, user_id: UserId) -> Result<(), CollaboratorError> {
        self.open.write().map_err(poisoned)?.insert((team_id, user_id));
        Ok(())
    }

    /// Closing happens when the request is approved, withdrawn or expires.
    pub fn close_request(&self, team_id: TeamId, user_id: UserId) -> Result<(), CollaboratorError> {
        self.open.write().map_err(poisoned)?.remove(&(team_id, user_id));
        Ok(())
    }
}

#[async_trait]
impl MembershipRequestChecker for InMemoryMembershipRequests {
    async fn membership_request_exists(&self, team_id: TeamId, user_id: UserId) -> Result<bool, CollaboratorError> {
        Ok(self.open.read().map_err(poisoned)?.contains(&(team_id, user_id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemorySubmissionStore {
    contents: Arc<RwLock<HashMap<SubmissionId, Vec<u8>>>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, submission_id: SubmissionId, content: Vec<u8>) -> Result<(), CollaboratorError> {
        self.contents.write().map_err(poisoned)?.insert(submission_id, content);
        Ok(())
    }
}

#[async_trait]
impl SubmissionContentSource for InMemorySubmissionStore {
    async fn download_submission_content(&self, submission_id: &SubmissionId) -> Result<Vec<u8>, CollaboratorError> {
        self.contents
            .read()
            .map_err(poisoned)?
            .get(submission_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("submission {submission_id}")))
    }
}

/// Tenant policies taken from the loaded configuration manifest.
#[derive(Clone)]
pub struct ConfigTenantPolicyRepository {
    policies: TenantPolicies,
}

impl ConfigTenantPolicyRepository {
    pub fn new(policies: TenantPolicies) -> Self {
        Self { policies }
    }

    pub fn from_manifest(manifest: &TokengateConfigManifest) -> Self {
        Self::new(manifest.tenant_policies())
    }
}

#[async_trait]
impl TenantPolicyRepository for ConfigTenantPolicyRepository {
    async fn lookup_tenant_policies(&self) -> Result<TenantPolicies, CollaboratorError> {
        Ok(self.policies.clone())
    }
}

/// Reads `<dir>/<submission-id>.eml`.
#[derive(Clone)]
pub struct DirectorySubmissionSource {
    dir: PathBuf,
}

impl DirectorySubmissionSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, submission_id: &SubmissionId) -> Result<PathBuf, CollaboratorError> {
        let id = submission_id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(CollaboratorError::Fatal(format!("invalid submission id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.eml")))
    }
}

#[async_trait]
impl SubmissionContentSource for DirectorySubmissionSource {
    async fn download_submission_content(&self, submission_id: &SubmissionId) -> Result<Vec<u8>, CollaboratorError> {
        let path = self.path_for(submission_id)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CollaboratorError::NotFound(format!("submission {submission_id}")),
            std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock => {
                CollaboratorError::Transient(format!("{}: {e}", path.display()))
            }
            _ => CollaboratorError::Fatal(format!("{}: {e}", path.display())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_team_membership() {
        let membership = InMemoryTeamMembership::new();
        membership.add_member(TeamId(1), UserId(10)).unwrap();
        assert!(membership.is_team_member(TeamId(1), UserId(10)).await.unwrap());
        assert!(!membership.is_team_member(TeamId(2), UserId(10)).await.unwrap());

        membership.remove_member(TeamId(1), UserId(10)).unwrap();
        assert!(!membership.is_team_member(TeamId(1), UserId(10)).await.unwrap());
    }

    #[test]
    fn test_membership_requests() {
        let requests = InMemoryMembershipRequests::new();
        requests.open_request(TeamId(1), UserId(10)).unwrap();
        assert!(tokio_test::block_on(requests.membership_request_exists(TeamId(1), UserId(10))).unwrap());
        requests.close_request(TeamId(1), UserId(10)).unwrap();
        assert!(!tokio_test::block_on(requests.membership_request_exists(TeamId(1), UserId(10))).unwrap());
    }

    #[test]
    fn test_policies_from_manifest() {
        let mut manifest = TokengateConfigManifest::default();
        manifest.spec.tenants.push(crate::domain::dataset_settings::DatasetSettings::new(TeamId(5), []));
        let repo = ConfigTenantPolicyRepository::from_manifest(&manifest);
        let policies = tokio_test::block_on(repo.lookup_tenant_policies()).unwrap();
        assert!(policies.contains_key(&TeamId(5)));
    }

    #[tokio::test]
    async fn test_submission_store_not_found() {
        let store = InMemorySubmissionStore::new();
        store.insert(SubmissionId::new("s1"), b"content".to_vec()).unwrap();
        assert_eq!(store.download_submission_content(&SubmissionId::new("s1")).await.unwrap(), b"content");
        assert!(matches!(
            store.download_submission_content(&SubmissionId::new("s2")).await,
            Err(CollaboratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("9614021.eml"), b"raw message").unwrap();
        let source = DirectorySubmissionSource::new(dir.path());

        let content = source.download_submission_content(&SubmissionId::new("9614021")).await.unwrap();
        assert_eq!(content, b"raw message");

        assert!(matches!(
            source.download_submission_content(&SubmissionId::new("missing")).await,
            Err(CollaboratorError::NotFound(_))
        ));
        assert!(matches!(
            source.download_submission_content(&SubmissionId::new("../etc/passwd")).await,
            Err(CollaboratorError::Fatal(_))
        ));
    }
}
