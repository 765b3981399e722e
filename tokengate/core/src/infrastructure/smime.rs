// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! S/MIME Message Authenticator
//!
//! Decides whether an inbound message is signed by a certificate that chains
//! to the trust anchor, and whether its sender may skip that check.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** CMS signature verification over detached and opaque S/MIME
//!
//! # Accepted Structures
//!
//! - `multipart/signed` with protocol `application/(x-)pkcs7-signature`. The
//!   first part, exactly as transmitted and canonicalised to CRLF, is the
//!   signed content; the second part is a detached CMS `SignedData`.
//! - `application/(x-)pkcs7-mime` with `smime-type=signed-data` (or none). The
//!   content travels inside the CMS structure.
//!
//! Anything else is simply unsigned. A message is accepted as soon as one
//! signer's certificate was issued by the anchor and that signer's signature
//! verifies; a failure for one signer moves on to the next.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;

use crate::domain::collaborators::{CollaboratorError, TeamMembershipChecker};
use crate::domain::identifiers::{TeamId, UserId};
use crate::infrastructure::mime;
use crate::infrastructure::retry::{retry_transient, RetryPolicy};
use crate::infrastructure::trust_store::TrustStore;

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// Why a signed structure could not be checked. Never leaves this module;
/// the public answer is always a boolean.
#[derive(Debug, Error)]
enum SmimeError {
    #[error("malformed CMS structure: {0}")]
    Malformed(String),

    #[error("content type {0} is not signed-data")]
    NotSignedData(ObjectIdentifier),

    #[error("signed-data carries no content")]
    NoContent,

    #[error("unsupported digest algorithm {0}")]
    UnsupportedDigest(ObjectIdentifier),

    #[error("unsupported signature algorithm {0}")]
    UnsupportedSignature(ObjectIdentifier),
}

impl From<der::Error> for SmimeError {
    fn from(e: der::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

enum SignedStructure {
    Detached { content: Vec<u8>, signature: Vec<u8> },
    Opaque { cms: Vec<u8> },
}

#[derive(Debug, Clone, Copy)]
enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    fn from_oid(oid: &ObjectIdentifier) -> Result<Self, SmimeError> {
        [
            (ID_SHA1, Self::Sha1),
            (ID_SHA256, Self::Sha256),
            (ID_SHA384, Self::Sha384),
            (ID_SHA512, Self::Sha512),
        ]
        .into_iter()
        .find_map(|(id, algorithm)| (id == *oid).then_some(algorithm))
        .ok_or(SmimeError::UnsupportedDigest(*oid))
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

pub struct MessageAuthenticator {
    trust: Arc<TrustStore>,
    membership: Arc<dyn TeamMembershipChecker>,
    retry: RetryPolicy,
}

impl MessageAuthenticator {
    /// Holding a [`TrustStore`] means the chain has already been bootstrapped.
    pub fn new(trust: Arc<TrustStore>, membership: Arc<dyn TeamMembershipChecker>, retry: RetryPolicy) -> Self {
        Self { trust, membership, retry }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// True when at least one signer chains to the anchor and its signature
    /// over the message content verifies.
    pub fn is_validly_signed(&self, message: &[u8]) -> bool {
        let Some(structure) = signed_structure(message) else {
            debug!("Message is not S/MIME signed");
            return false;
        };

        let result = match &structure {
            SignedStructure::Detached { content, signature } => self.verify_cms(signature, Some(content.as_slice())),
            SignedStructure::Opaque { cms } => self.verify_cms(cms, None),
        };

        match result {
            Ok(verified) => verified,
            Err(e) => {
                debug!(error = %e, "Signed structure could not be verified");
                false
            }
        }
    }

    /// The signed inner entity, without checking the signature.
    pub fn signed_content(&self, message: &[u8]) -> Option<Vec<u8>> {
        match signed_structure(message)? {
            SignedStructure::Detached { content, .. } => Some(content),
            SignedStructure::Opaque { cms } => {
                let signed_data = decode_signed_data(&cms).ok()?;
                signed_data.encap_content_info.econtent.map(|content| content.value().to_vec())
            }
        }
    }

    /// Whether `sender` may skip signature and origin checks. The service's
    /// own account never may; otherwise membership of the delegated trust
    /// team decides.
    pub async fn bypass(
        &self,
        sender: UserId,
        self_account: Option<UserId>,
        delegated_trust_team: Option<TeamId>,
    ) -> Result<bool, CollaboratorError> {
        if self_account == Some(sender) {
            info!(sender = %sender, "Submission from the service account itself, no bypass");
            return Ok(false);
        }
        let Some(team) = delegated_trust_team else {
            return Ok(false);
        };
        let member = retry_transient(&self.retry, "team membership lookup", || {
            self.membership.is_team_member(team, sender)
        })
        .await?;
        if member {
            info!(sender = %sender, team = %team, "Sender is in the delegated trust team, bypassing signature check");
        }
        Ok(member)
    }

    fn verify_cms(&self, cms_der: &[u8], detached: Option<&[u8]>) -> Result<bool, SmimeError> {
        let signed_data = decode_signed_data(cms_der)?;

        let content = match (detached, &signed_data.encap_content_info.econtent) {
            (Some(content), _) => content,
            (None, Some(econtent)) => econtent.value(),
            (None, None) => return Err(SmimeError::NoContent),
        };

        let certificates: Vec<Vec<u8>> = signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => cert.to_der().ok(),
                _ => None,
            })
            .collect();

        for (index, signer) in signed_data.signer_infos.0.iter().enumerate() {
            match self.verify_signer(signer, &certificates, content) {
                Ok(true) => {
                    debug!(signer = index, "Signer verified");
                    return Ok(true);
                }
                Ok(false) => debug!(signer = index, "Signer rejected"),
                Err(e) => debug!(signer = index, error = %e, "Signer could not be verified"),
            }
        }

        Ok(false)
    }

    fn verify_signer(&self, signer: &SignerInfo, certificates: &[Vec<u8>], content: &[u8]) -> Result<bool, SmimeError> {
        let matched = certificates.iter().find_map(|der| {
            let (_, cert) = X509Certificate::from_der(der).ok()?;
            signer_matches(&signer.sid, &cert).then_some((der, cert))
        });
        let Some((cert_der, cert)) = matched else {
            debug!("No embedded certificate matches the signer");
            return Ok(false);
        };

        if !self.trust.verifies_issued(cert_der) {
            debug!(subject = %cert.subject(), "Signer certificate is not issued by the trust anchor");
            return Ok(false);
        }

        let digest = DigestAlgorithm::from_oid(&signer.digest_alg.oid)?;
        let signed_bytes = match &signer.signed_attrs {
            Some(attributes) => {
                let expected = digest.digest(content);
                let claimed = attributes
                    .iter()
                    .find(|attribute| attribute.oid == ID_MESSAGE_DIGEST)
                    .and_then(|attribute| attribute.values.iter().next())
                    .map(|value| value.value());
                if claimed != Some(expected.as_slice()) {
                    debug!("messageDigest attribute does not match the content");
                    return Ok(false);
                }
                attributes.to_der()?
            }
            None => content.to_vec(),
        };

        let spki = cert.public_key();
        let key = spki
            .parsed()
            .map_err(|e| SmimeError::Malformed(format!("signer public key: {e}")))?;
        let algorithm = verification_algorithm(&signer.signature_algorithm.oid, digest, &key)?;

        Ok(UnparsedPublicKey::new(algorithm, spki.subject_public_key.data.as_ref())
            .verify(&signed_bytes, signer.signature.as_bytes())
            .is_ok())
    }
}

fn decode_signed_data(cms_der: &[u8]) -> Result<SignedData, SmimeError> {
    let content_info = ContentInfo::from_der(cms_der)?;
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(SmimeError::NotSignedData(content_info.content_type));
    }
    Ok(SignedData::from_der(&content_info.content.to_der()?)?)
}

fn signed_structure(message: &[u8]) -> Option<SignedStructure> {
    let (ctype, body) = mime::content_type_and_body(message)?;
    match ctype.mimetype.as_str() {
        "multipart/signed" => {
            let protocol = ctype.params.get("protocol")?.to_ascii_lowercase();
            if protocol != "application/pkcs7-signature" && protocol != "application/x-pkcs7-signature" {
                return None;
            }
            let boundary = ctype.params.get("boundary")?;
            let parts = mime::split_multipart(body, boundary);
            let [content, signature] = parts.as_slice() else {
                debug!(parts = parts.len(), "multipart/signed must have exactly two parts");
                return None;
            };
            Some(SignedStructure::Detached {
                content: mime::canonicalize_line_endings(content),
                signature: mime::decoded_body(signature)?,
            })
        }
        "application/pkcs7-mime" | "application/x-pkcs7-mime" => {
            if let Some(smime_type) = ctype.params.get("smime-type") {
                if !smime_type.eq_ignore_ascii_case("signed-data") {
                    return None;
                }
            }
            Some(SignedStructure::Opaque { cms: mime::decoded_body(message)? })
        }
        _ => None,
    }
}

fn signer_matches(sid: &SignerIdentifier, cert: &X509Certificate<'_>) -> bool {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(issuer_and_serial) => {
            let issuer_matches = issuer_and_serial
                .issuer
                .to_der()
                .is_ok_and(|issuer| issuer == cert.issuer().as_raw());
            issuer_matches && issuer_and_serial.serial_number.as_bytes() == cert.raw_serial()
        }
        SignerIdentifier::SubjectKeyIdentifier(ski) => cert.extensions().iter().any(|extension| {
            matches!(
                extension.parsed_extension(),
                ParsedExtension::SubjectKeyIdentifier(id) if id.0 == ski.0.as_bytes()
            )
        }),
    }
}

fn verification_algorithm(
    signature_oid: &ObjectIdentifier,
    digest: DigestAlgorithm,
    key: &PublicKey<'_>,
) -> Result<&'static dyn VerificationAlgorithm, SmimeError> {
    let unsupported = || SmimeError::UnsupportedSignature(*signature_oid);
    match key {
        PublicKey::RSA(_) => {
            let digest = match signature_oid {
                oid if *oid == RSA_ENCRYPTION => digest,
                oid if *oid == SHA1_WITH_RSA => DigestAlgorithm::Sha1,
                oid if *oid == SHA256_WITH_RSA => DigestAlgorithm::Sha256,
                oid if *oid == SHA384_WITH_RSA => DigestAlgorithm::Sha384,
                oid if *oid == SHA512_WITH_RSA => DigestAlgorithm::Sha512,
                _ => return Err(unsupported()),
            };
            Ok(match digest {
                DigestAlgorithm::Sha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                DigestAlgorithm::Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
                DigestAlgorithm::Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
                DigestAlgorithm::Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
            })
        }
        PublicKey::EC(point) => {
            let digest = match signature_oid {
                oid if *oid == EC_PUBLIC_KEY => digest,
                oid if *oid == ECDSA_WITH_SHA256 => DigestAlgorithm::Sha256,
                oid if *oid == ECDSA_WITH_SHA384 => DigestAlgorithm::Sha384,
                _ => return Err(unsupported()),
            };
            // Uncompressed points: 65 bytes on P-256, 97 on P-384.
            match (point.data().len(), digest) {
                (65, DigestAlgorithm::Sha256) => Ok(&signature::ECDSA_P256_SHA256_ASN1),
                (65, DigestAlgorithm::Sha384) => Ok(&signature::ECDSA_P256_SHA384_ASN1),
                (97, DigestAlgorithm::Sha256) => Ok(&signature::ECDSA_P384_SHA256_ASN1),
                (97, DigestAlgorithm::Sha384) => Ok(&signature::ECDSA_P384_SHA384_ASN1),
                _ => Err(unsupported()),
            }
        }
        _ => Err(unsupported()),
    }
}
