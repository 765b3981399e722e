// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Certificate Source Loader
//!
//! Fetches raw certificate bytes for the trust-store bootstrap.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Implements `CertificateFetcher` over HTTP(S) and the local filesystem
//!
//! # Supported Sources
//!
//! - **URL**: `https://...` or `http://...`, fetched with a GET request
//! - **File URL**: `file:///etc/tokengate/root.pem`
//! - **Path**: any other string is read as a filesystem path
//!
//! Server errors, timeouts and refused connections are transient; client
//! errors and unreadable files are not.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::domain::collaborators::{CertificateFetcher, CollaboratorError};

/// Upper bound on a single certificate download.
const MAX_CERTIFICATE_SIZE: usize = 1024 * 1024;

pub struct HttpCertificateFetcher {
    /// HTTP client for URL sources
    client: Client,
}

impl HttpCertificateFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Fatal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, CollaboratorError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                CollaboratorError::Transient(format!("GET {url}: {e}"))
            } else {
                CollaboratorError::Fatal(format!("GET {url}: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound(format!("GET {url}: {status}")));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CollaboratorError::Transient(format!("GET {url}: {status}")));
        }
        if !status.is_success() {
            return Err(CollaboratorError::Fatal(format!("GET {url}: {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::Transient(format!("GET {url}: {e}")))?;
        check_size(url, body.len())?;
        Ok(body.to_vec())
    }

    async fn fetch_file(&self, path: &Path) -> Result<Vec<u8>, CollaboratorError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CollaboratorError::NotFound(format!("{}", path.display())),
            _ => CollaboratorError::Fatal(format!("Failed to read {}: {e}", path.display())),
        })?;
        check_size(&path.display().to_string(), bytes.len())?;
        Ok(bytes)
    }
}

fn check_size(source: &str, len: usize) -> Result<(), CollaboratorError> {
    if len > MAX_CERTIFICATE_SIZE {
        return Err(CollaboratorError::Fatal(format!(
            "Certificate at {source} is {len} bytes, exceeding the {MAX_CERTIFICATE_SIZE} byte limit"
        )));
    }
    Ok(())
}

fn file_url_path(source: &str) -> Result<PathBuf, CollaboratorError> {
    url::Url::parse(source)
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .ok_or_else(|| CollaboratorError::Fatal(format!("Invalid file URL: {source}")))
}

#[async_trait]
impl CertificateFetcher for HttpCertificateFetcher {
    async fn fetch_certificate_bytes(&self, source: &str) -> Result<Vec<u8>, CollaboratorError> {
        debug!(source, "Fetching certificate");
        if source.starts_with("https://") || source.starts_with("http://") {
            self.fetch_url(source).await
        } else if source.starts_with("file://") {
            let path = file_url_path(source)?;
            self.fetch_file(&path).await
        } else {
            self.fetch_file(Path::new(source)).await
        }
    }
}
