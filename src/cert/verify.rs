// cert/verify.rs - Certificate Signature Verification

use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use super::certificate::{Certificate, IssuerKey};

/// Errors raised while checking a certificate signature
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    #[error("Unknown issuer: {0}")]
    UnknownIssuer(String),

    #[error("Malformed signature: expected {expected} bytes, got {got}")]
    MalformedSignature { expected: usize, got: usize },

    #[error("Signature does not verify")]
    BadSignature,
}

/// Signature-check seam consumed by the certificate validator.
///
/// Implementations may consult remote key material, which is why the check is
/// async; the registration service bounds the call with its verification
/// timeout.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Verify the certificate's signature against its issuer's key material.
    async fn verify(&self, certificate: &Certificate) -> Result<(), VerifyError>;
}

/// Ed25519 verifier over a registered set of issuer verifying keys.
///
/// Issuers unknown to the verifier fail closed: a certificate from an
/// unregistered issuer is never accepted.
#[derive(Default)]
pub struct Ed25519Verifier {
    /// Issuer identifier -> verifying key
    keys: RwLock<HashMap<String, VerifyingKey>>,
}

impl Ed25519Verifier {
    /// Create a verifier with no known issuers
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Register an issuer's verifying key, replacing any previous key
    pub fn register_issuer(&self, issuer: impl Into<String>, key: VerifyingKey) {
        let issuer = issuer.into();
        debug!("Registered verifying key for issuer '{}'", issuer);
        self.keys.write().insert(issuer, key);
    }

    /// Register the verifying half of a local issuer key
    pub fn trust_issuer(&self, key: &IssuerKey) {
        self.register_issuer(key.issuer(), key.verifying_key());
    }

    /// Check whether an issuer is known
    pub fn has_issuer(&self, issuer: &str) -> bool {
        self.keys.read().contains_key(issuer)
    }

    /// Number of registered issuers
    pub fn issuer_count(&self) -> usize {
        self.keys.read().len()
    }
}

#[async_trait]
impl SignatureVerifier for Ed25519Verifier {
    async fn verify(&self, certificate: &Certificate) -> Result<(), VerifyError> {
        let key = self
            .keys
            .read()
            .get(&certificate.issuer)
            .copied()
            .ok_or_else(|| VerifyError::UnknownIssuer(certificate.issuer.clone()))?;

        if certificate.signature.len() != SIGNATURE_LENGTH {
            return Err(VerifyError::MalformedSignature {
                expected: SIGNATURE_LENGTH,
                got: certificate.signature.len(),
            });
        }

        let mut sig_bytes = [0u8; SIGNATURE_LENGTH];
        sig_bytes.copy_from_slice(&certificate.signature);
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(&certificate.signable_data(), &signature)
            .map_err(|_| VerifyError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_verify_issued_certificate() {
        let key = IssuerKey::generate("anchor-ca");
        let verifier = Ed25519Verifier::new();
        verifier.trust_issuer(&key);

        let cert = key.issue(98, "abc123", Utc::now() + chrono::Duration::days(30));
        assert!(verifier.verify(&cert).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_issuer_fails_closed() {
        let key = IssuerKey::generate("anchor-ca");
        let verifier = Ed25519Verifier::new();

        let cert = key.issue(98, "abc123", Utc::now() + chrono::Duration::days(30));
        let err = verifier.verify(&cert).await.unwrap_err();
        assert!(matches!(err, VerifyError::UnknownIssuer(issuer) if issuer == "anchor-ca"));
    }

    #[tokio::test]
    async fn test_tampered_certificate_rejected() {
        let key = IssuerKey::generate("anchor-ca");
        let verifier = Ed25519Verifier::new();
        verifier.trust_issuer(&key);

        let mut cert = key.issue(75, "abc123", Utc::now() + chrono::Duration::days(30));
        cert.score = Some(99); // inflate the score after signing

        let err = verifier.verify(&cert).await.unwrap_err();
        assert!(matches!(err, VerifyError::BadSignature));
    }

    #[tokio::test]
    async fn test_malformed_signature_length() {
        let key = IssuerKey::generate("anchor-ca");
        let verifier = Ed25519Verifier::new();
        verifier.trust_issuer(&key);

        let mut cert = key.issue(98, "abc123", Utc::now() + chrono::Duration::days(30));
        cert.signature = vec![0u8; 5];

        let err = verifier.verify(&cert).await.unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSignature { got: 5, .. }));
    }

    #[tokio::test]
    async fn test_wrong_issuer_key_rejected() {
        let signing = IssuerKey::generate("anchor-ca");
        let other = IssuerKey::generate("anchor-ca");

        // Verifier knows a different key for the same issuer name
        let verifier = Ed25519Verifier::new();
        verifier.trust_issuer(&other);

        let cert = signing.issue(98, "abc123", Utc::now() + chrono::Duration::days(30));
        assert!(matches!(
            verifier.verify(&cert).await,
            Err(VerifyError::BadSignature)
        ));
    }

    #[test]
    fn test_issuer_bookkeeping() {
        let verifier = Ed25519Verifier::new();
        assert_eq!(verifier.issuer_count(), 0);
        assert!(!verifier.has_issuer("anchor-ca"));

        verifier.trust_issuer(&IssuerKey::generate("anchor-ca"));
        assert_eq!(verifier.issuer_count(), 1);
        assert!(verifier.has_issuer("anchor-ca"));
    }
}
