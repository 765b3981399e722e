// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tokengate Configuration Types
//
// Defines the configuration manifest for a tokengate deployment:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Token signing secret and legacy tenant
// - Certificate chain sources and delegated-trust team
// - Origin header and collaborator retry policy
// - Per-tenant dataset settings

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::dataset_settings::{DatasetSettings, TenantPolicies};
use crate::domain::identifiers::{TeamId, UserId};

pub const API_VERSION: &str = "tokengate/v1";
pub const KIND: &str = "TokengateConfig";
pub const CONFIG_PATH_ENV: &str = "TOKENGATE_CONFIG_PATH";
pub const SECRET_ENV: &str = "TOKENGATE_HMAC_SECRET";
pub const SERVICE_ACCOUNT_ENV: &str = "TOKENGATE_SERVICE_ACCOUNT_ID";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokengateConfigManifest {
    /// API version (must be "tokengate/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "TokengateConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: TokengateConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokengateConfigSpec {
    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    /// Account the service itself acts as. Its own submissions never bypass
    /// signature checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<UserId>,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub tenants: Vec<DatasetSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Base64 HMAC key (supports "env:VAR_NAME")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Tenant that tenant-less V1 tokens are scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_team_id: Option<TeamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Ordered certificate sources, root first. The last entry is the trust anchor.
    #[serde(default)]
    pub certificate_chain: Vec<String>,

    /// Members of this team may submit unsigned approvals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_trust_team_id: Option<TeamId>,

    /// Timeout for a single certificate download
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            certificate_chain: Vec::new(),
            delegated_trust_team_id: None,
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Header carrying the originating client address
    #[serde(default = "default_origin_header")]
    pub header: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self { header: default_origin_header() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_origin_header() -> String {
    "X-Originating-IP".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(250)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}

impl Default for TokengateConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata { name: "tokengate".to_string(), labels: None },
            spec: TokengateConfigSpec::default(),
        }
    }
}

impl TokengateConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. TOKENGATE_CONFIG_PATH environment variable
    /// 2. ./tokengate-config.yaml (working directory)
    /// 3. ~/.tokengate/config.yaml (user home)
    /// 4. /etc/tokengate/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./tokengate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tokengate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/tokengate/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using empty defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if std::env::var(SECRET_ENV).is_ok() && self.spec.token.secret.is_none() {
            tracing::info!("Environment override: token secret taken from {}", SECRET_ENV);
            self.spec.token.secret = Some(format!("env:{SECRET_ENV}"));
        }

        if let Ok(val) = std::env::var(SERVICE_ACCOUNT_ENV) {
            match val.parse::<UserId>() {
                Ok(id) => {
                    tracing::info!("Environment override: {}={}", SERVICE_ACCOUNT_ENV, id);
                    self.spec.service_account_id = Some(id);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for {}: '{}'. Expected a numeric user id. Ignoring.",
                        SERVICE_ACCOUNT_ENV,
                        val
                    );
                }
            }
        }
    }

    /// Resolve the token secret, following an "env:VAR_NAME" indirection.
    pub fn resolve_secret(&self) -> anyhow::Result<String> {
        let raw = self
            .spec
            .token
            .secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("spec.token.secret is not configured"))?;

        if let Some(var) = raw.strip_prefix("env:") {
            std::env::var(var).map_err(|_| anyhow::anyhow!("environment variable {} is not set", var))
        } else {
            Ok(raw.to_string())
        }
    }

    pub fn tenant_policies(&self) -> TenantPolicies {
        self.spec
            .tenants
            .iter()
            .map(|settings| (settings.application_team_id, settings.clone()))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.resolve_secret()?.trim().is_empty() {
            anyhow::bail!("spec.token.secret resolves to an empty value");
        }

        if self.spec.trust.certificate_chain.is_empty() {
            anyhow::bail!("spec.trust.certificate_chain must list at least one certificate source");
        }

        if self.spec.retry.max_attempts == 0 {
            anyhow::bail!("spec.retry.max_attempts must be at least 1");
        }

        let mut seen = HashSet::new();
        for tenant in &self.spec.tenants {
            if !seen.insert(tenant.application_team_id) {
                anyhow::bail!("Duplicate tenant for application team {}", tenant.application_team_id);
            }

            if tenant.token_expiration_days == 0 {
                anyhow::bail!(
                    "token_expiration_days must be positive for application team {}",
                    tenant.application_team_id
                );
            }

            for subnet in &tenant.allowed_subnets {
                if subnet.trim().parse::<ipnetwork::IpNetwork>().is_err() {
                    anyhow::bail!(
                        "Invalid subnet '{}' for application team {}",
                        subnet,
                        tenant.application_team_id
                    );
                }
            }
        }

        if let Some(legacy) = self.spec.token.legacy_team_id {
            if !seen.contains(&legacy) {
                anyhow::bail!("Legacy team {} has no tenant configuration", legacy);
            }
        }

        Ok(())
    }
}
