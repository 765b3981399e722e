// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate chain bootstrap against file and HTTP sources.

mod common;

use std::sync::Arc;

use common::*;
use tokengate_core::infrastructure::trust_store::certificate_der;
use tokengate_core::infrastructure::{CertificateTrustStore, RetryPolicy, TrustError, TrustStoreProvider};

#[tokio::test]
async fn test_bootstrap_from_files_anchors_at_last_certificate() {
    let store = trust_store().await;

    assert_eq!(store.chain().len(), 2);
    assert!(store.chain()[0].subject.contains("Test Root CA"));
    assert!(store.anchor().subject.contains("Test Issuing CA"));
}

#[tokio::test]
async fn test_single_certificate_chain_is_its_own_anchor() {
    let sources = vec![fixture_source("regional_ca.pem")];
    let store = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1))
        .await
        .unwrap();

    assert_eq!(store.chain().len(), 1);
    assert_eq!(store.anchor(), &store.chain()[0]);
    assert!(store.anchor().subject.contains("Test Regional CA"));
    assert!(store.verifies_issued(&certificate_der(&fixture("regional_signer.pem")).unwrap()));
    assert!(!store.verifies_issued(&certificate_der(&fixture("signer.pem")).unwrap()));
}

#[tokio::test]
async fn test_anchor_verifies_only_certificates_it_issued() {
    let store = trust_store().await;

    let signer = certificate_der(&fixture("signer.pem")).unwrap();
    let rogue = certificate_der(&fixture("rogue.pem")).unwrap();
    let root = certificate_der(&fixture("root.pem")).unwrap();

    assert!(store.verifies_issued(&signer));
    assert!(!store.verifies_issued(&rogue));
    // The root issued the anchor, not leaf certificates.
    assert!(!store.verifies_issued(&root));
}

#[tokio::test]
async fn test_reversed_chain_is_broken() {
    let sources = vec![fixture_source("inter.pem"), fixture_source("root.pem")];
    let result = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1)).await;

    match result {
        Err(TrustError::BrokenChain { index, subject, .. }) => {
            assert_eq!(index, 1);
            assert!(subject.contains("Test Root CA"));
        }
        other => panic!("expected broken chain, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unrelated_certificate_breaks_chain() {
    let sources = vec![fixture_source("root.pem"), fixture_source("rogue.pem")];
    let result = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1)).await;
    assert!(matches!(result, Err(TrustError::BrokenChain { index: 1, .. })));
}

#[tokio::test]
async fn test_unparseable_certificate_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let junk = dir.path().join("junk.pem");
    std::fs::write(&junk, b"-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n").unwrap();

    let sources = vec![fixture_source("root.pem"), junk.to_string_lossy().into_owned()];
    let result = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1)).await;
    assert!(matches!(result, Err(TrustError::Parse { index: 1, .. })));
}

#[tokio::test]
async fn test_bootstrap_over_http() {
    let mut server = mockito::Server::new_async().await;
    let root = server
        .mock("GET", "/certs/root.pem")
        .with_status(200)
        .with_body(fixture("root.pem"))
        .create_async()
        .await;
    let inter = server
        .mock("GET", "/certs/inter.pem")
        .with_status(200)
        .with_body(fixture("inter.pem"))
        .create_async()
        .await;

    let sources = vec![
        format!("{}/certs/root.pem", server.url()),
        format!("{}/certs/inter.pem", server.url()),
    ];
    let store = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(1))
        .await
        .unwrap();

    root.assert_async().await;
    inter.assert_async().await;
    assert!(store.anchor().subject.contains("Test Issuing CA"));
}

#[tokio::test]
async fn test_transient_http_failure_is_retried() {
    let mut server = mockito::Server::new_async().await;
    let unavailable = server
        .mock("GET", "/root.pem")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let sources = vec![format!("{}/root.pem", server.url())];
    let result = CertificateTrustStore::bootstrap(&sources, &fetcher(), &RetryPolicy::immediate(3)).await;

    unavailable.assert_async().await;
    assert!(matches!(result, Err(TrustError::Fetch { index: 0, .. })));
}

#[tokio::test]
async fn test_provider_bootstraps_once() {
    let mut server = mockito::Server::new_async().await;
    let root = server
        .mock("GET", "/root.pem")
        .with_status(200)
        .with_body(fixture("root.pem"))
        .expect(1)
        .create_async()
        .await;

    let provider = TrustStoreProvider::new(
        vec![format!("{}/root.pem", server.url())],
        Arc::new(fetcher()),
        RetryPolicy::immediate(1),
    );
    let first = provider.get().await.unwrap();
    let second = provider.get().await.unwrap();

    root.assert_async().await;
    assert!(Arc::ptr_eq(&first, &second));
}
