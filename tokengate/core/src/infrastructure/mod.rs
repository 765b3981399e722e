// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure
//!
//! Cryptographic, MIME and network adapters behind the domain contracts.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Token signing, certificate trust, S/MIME verification, origin checks and collaborator adapters

pub mod token_codec;
pub mod retry;
pub mod certificate_fetcher;
pub mod trust_store;
pub mod mime;
pub mod smime;
pub mod origin;
pub mod repositories;

pub use token_codec::{TokenCodec, TokenCodecError};
pub use trust_store::{CertificateTrustStore, TrustError, TrustStore, TrustStoreProvider};
pub use smime::MessageAuthenticator;
pub use origin::OriginValidator;
pub use retry::RetryPolicy;
