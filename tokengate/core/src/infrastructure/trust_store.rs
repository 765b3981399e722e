// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Certificate Trust Store
//!
//! Bootstraps the ordered certificate chain that message signers must chain
//! to, and answers "was this certificate issued by the anchor?".
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Verify the configured chain once and share it read-only
//!
//! # Chain Direction
//!
//! Sources are listed root first. Every entry after the first must be signed
//! by the entry before it. The last entry is the trust anchor.
//!
//! A broken link is fatal and never retried. The verified [`TrustStore`] is an
//! explicit value shared through an `Arc`; [`TrustStoreProvider`] memoises the
//! bootstrap so it runs at most once per process.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;
use x509_parser::prelude::FromDer;
use x509_parser::time::ASN1Time;

use crate::domain::collaborators::{CertificateFetcher, CollaboratorError};
use crate::infrastructure::retry::{retry_transient, RetryPolicy};

#[derive(Debug, Clone, Error)]
pub enum TrustError {
    #[error("no certificate sources are configured")]
    NoSources,

    #[error("failed to fetch certificate {index} from {location}: {cause}")]
    Fetch { index: usize, location: String, cause: CollaboratorError },

    #[error("certificate {index} from {location} could not be parsed: {reason}")]
    Parse { index: usize, location: String, reason: String },

    #[error("certificate {index} ({subject}) is not signed by its predecessor: {reason}")]
    BrokenChain { index: usize, subject: String, reason: String },
}

/// One verified link of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificate {
    pub source: String,
    pub subject: String,
    pub der: Vec<u8>,
}

impl TrustedCertificate {
    fn parsed(&self) -> Option<X509Certificate<'_>> {
        X509Certificate::from_der(&self.der).ok().map(|(_, cert)| cert)
    }
}

/// A verified, immutable certificate chain. The anchor is the last link.
#[derive(Debug, Clone)]
pub struct TrustStore {
    chain: Vec<TrustedCertificate>,
    anchor: TrustedCertificate,
}

impl TrustStore {
    pub fn chain(&self) -> &[TrustedCertificate] {
        &self.chain
    }

    pub fn anchor(&self) -> &TrustedCertificate {
        &self.anchor
    }

    /// True when `cert_der` is signed by the anchor and currently valid.
    pub fn verifies_issued(&self, cert_der: &[u8]) -> bool {
        self.verifies_issued_at(cert_der, ASN1Time::now())
    }

    pub fn verifies_issued_at(&self, cert_der: &[u8], at: ASN1Time) -> bool {
        let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
            return false;
        };
        let Some(anchor) = self.anchor().parsed() else {
            return false;
        };
        cert.validity().is_valid_at(at) && cert.verify_signature(Some(anchor.public_key())).is_ok()
    }
}

pub struct CertificateTrustStore;

impl CertificateTrustStore {
    /// Fetch every source in order and verify each link against its
    /// predecessor.
    pub async fn bootstrap(
        sources: &[String],
        fetcher: &dyn CertificateFetcher,
        retry: &RetryPolicy,
    ) -> Result<TrustStore, TrustError> {
        if sources.is_empty() {
            return Err(TrustError::NoSources);
        }

        let mut chain: Vec<TrustedCertificate> = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let bytes = retry_transient(retry, "fetch certificate", || fetcher.fetch_certificate_bytes(source))
                .await
                .map_err(|cause| TrustError::Fetch { index, location: source.clone(), cause })?;

            let der = certificate_der(&bytes)
                .map_err(|reason| TrustError::Parse { index, location: source.clone(), reason })?;
            let (_, cert) = X509Certificate::from_der(&der).map_err(|e| TrustError::Parse {
                index,
                location: source.clone(),
                reason: e.to_string(),
            })?;
            let subject = cert.subject().to_string();

            if let Some(previous) = chain.last() {
                let issuer = previous.parsed().ok_or_else(|| TrustError::Parse {
                    index: index - 1,
                    location: previous.source.clone(),
                    reason: "certificate no longer parses".to_string(),
                })?;
                cert.verify_signature(Some(issuer.public_key())).map_err(|e| TrustError::BrokenChain {
                    index,
                    subject: subject.clone(),
                    reason: e.to_string(),
                })?;
            }

            info!(index, subject = %subject, "Trusted certificate");
            chain.push(TrustedCertificate { source: source.clone(), subject, der });
        }

        let anchor = chain.last().cloned().ok_or(TrustError::NoSources)?;
        Ok(TrustStore { chain, anchor })
    }
}

/// Extract DER from PEM (first CERTIFICATE block) or pass DER through.
pub fn certificate_der(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let looks_like_pem = bytes.trim_ascii_start().starts_with(b"-----BEGIN");
    if !looks_like_pem {
        return Ok(bytes.to_vec());
    }
    for pem in Pem::iter_from_buffer(bytes) {
        let pem = pem.map_err(|e| e.to_string())?;
        if pem.label == "CERTIFICATE" {
            return Ok(pem.contents);
        }
    }
    Err("no CERTIFICATE block found".to_string())
}

/// Bootstraps the trust store on first use and hands out the shared result.
pub struct TrustStoreProvider {
    sources: Vec<String>,
    fetcher: Arc<dyn CertificateFetcher>,
    retry: RetryPolicy,
    store: OnceCell<Arc<TrustStore>>,
}

impl TrustStoreProvider {
    pub fn new(sources: Vec<String>, fetcher: Arc<dyn CertificateFetcher>, retry: RetryPolicy) -> Self {
        Self { sources, fetcher, retry, store: OnceCell::new() }
    }

    /// Provider around an already-verified store.
    pub fn preloaded(store: TrustStore) -> Self {
        Self {
            sources: store.chain.iter().map(|c| c.source.clone()).collect(),
            fetcher: Arc::new(NoFetch),
            retry: RetryPolicy::immediate(1),
            store: OnceCell::new_with(Some(Arc::new(store))),
        }
    }

    pub async fn get(&self) -> Result<Arc<TrustStore>, TrustError> {
        self.store
            .get_or_try_init(|| async {
                CertificateTrustStore::bootstrap(&self.sources, self.fetcher.as_ref(), &self.retry)
                    .await
                    .map(Arc::new)
                    .inspect_err(|e| error!(error = %e, "Trust store bootstrap failed"))
            })
            .await
            .cloned()
    }
}

struct NoFetch;

#[async_trait::async_trait]
impl CertificateFetcher for NoFetch {
    async fn fetch_certificate_bytes(&self, source: &str) -> Result<Vec<u8>, CollaboratorError> {
        Err(CollaboratorError::Fatal(format!("no fetcher configured for {source}")))
    }
}
