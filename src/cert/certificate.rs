// cert/certificate.rs - Integrity Certificates and Issuer Keys

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Errors related to issuer key material
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

/// A trust score in the closed range 0..=100.
///
/// Construction is fallible; once a value exists it is known to be in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrustScore(u8);

impl TrustScore {
    /// Maximum representable score
    pub const MAX: u8 = 100;

    /// Create a score, rejecting values above [`TrustScore::MAX`]
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    /// Get the raw value
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submitted integrity certificate, exactly as received.
///
/// Score, content hash, and expiry are optional because submissions arrive
/// from untrusted peers; the validator rejects anything incomplete rather
/// than filling in defaults. Certificates are immutable once signed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    /// Issuer identifier (selects the verifying key)
    pub issuer: String,

    /// Declared trust score
    pub score: Option<u8>,

    /// Hex-encoded SHA-256 hash of the certified content
    pub content_hash: Option<String>,

    /// Expiry timestamp
    pub expires_at: Option<DateTime<Utc>>,

    /// Ed25519 signature over the canonical digest
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Create an unsigned certificate shell
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            score: None,
            content_hash: None,
            expires_at: None,
            signature: vec![],
        }
    }

    /// Set the declared score
    pub fn with_score(mut self, score: u8) -> Self {
        self.score = Some(score);
        self
    }

    /// Set the content hash
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set the expiry timestamp
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Canonical digest covered by the issuer signature.
    ///
    /// Absent fields contribute nothing, so a field cannot be stripped or
    /// injected after signing without invalidating the signature.
    pub(crate) fn signable_data(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.issuer.as_bytes());
        if let Some(score) = self.score {
            hasher.update([score]);
        }
        if let Some(ref hash) = self.content_hash {
            hasher.update(hash.as_bytes());
        }
        if let Some(expires_at) = self.expires_at {
            hasher.update(expires_at.timestamp_millis().to_le_bytes());
        }
        hasher.finalize().to_vec()
    }
}

/// A certificate that passed structural, temporal, and signature checks.
///
/// Produced only by the validator; downstream code can rely on every field
/// being present and the score being in range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCertificate {
    issuer: String,
    score: TrustScore,
    content_hash: String,
    expires_at: DateTime<Utc>,
}

impl ValidatedCertificate {
    pub(crate) fn new(
        issuer: String,
        score: TrustScore,
        content_hash: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer,
            score,
            content_hash,
            expires_at,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn score(&self) -> TrustScore {
        self.score
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Ed25519 signing half for a certificate issuer.
///
/// This is local key material handling, not a certificate authority: no
/// chains, no revocation transport.
pub struct IssuerKey {
    issuer: String,
    signing_key: SigningKey,
}

impl IssuerKey {
    /// Generate a fresh issuer key
    pub fn generate(issuer: impl Into<String>) -> Self {
        let mut secret_bytes = [0u8; SECRET_KEY_LENGTH];
        rand::rng().fill_bytes(&mut secret_bytes);

        Self {
            issuer: issuer.into(),
            signing_key: SigningKey::from_bytes(&secret_bytes),
        }
    }

    /// Create from existing secret key bytes
    pub fn from_secret_key(secret_bytes: &[u8], issuer: impl Into<String>) -> Result<Self, KeyError> {
        if secret_bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidKeyLength {
                expected: SECRET_KEY_LENGTH,
                got: secret_bytes.len(),
            });
        }

        let mut key_bytes = [0u8; SECRET_KEY_LENGTH];
        key_bytes.copy_from_slice(secret_bytes);

        Ok(Self {
            issuer: issuer.into(),
            signing_key: SigningKey::from_bytes(&key_bytes),
        })
    }

    /// Get the issuer identifier
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Get the verifying (public) half
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign the certificate in place, stamping this key's issuer id and
    /// replacing any previous signature.
    pub fn sign(&self, certificate: &mut Certificate) {
        certificate.issuer = self.issuer.clone();
        let data = certificate.signable_data();
        certificate.signature = self.signing_key.sign(&data).to_vec();
    }

    /// Issue a complete, signed certificate
    pub fn issue(
        &self,
        score: u8,
        content_hash: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Certificate {
        let mut certificate = Certificate::new(self.issuer.clone())
            .with_score(score)
            .with_content_hash(content_hash)
            .with_expiry(expires_at);
        self.sign(&mut certificate);
        certificate
    }
}

impl fmt::Debug for IssuerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerKey")
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Hex-encoded SHA-256 hash of arbitrary content, in the form certificates
/// carry in their `content_hash` field.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert_eq!(TrustScore::new(0).map(|s| s.value()), Some(0));
        assert_eq!(TrustScore::new(100).map(|s| s.value()), Some(100));
        assert!(TrustScore::new(101).is_none());
        assert!(TrustScore::new(255).is_none());
    }

    #[test]
    fn test_score_ordering() {
        let low = TrustScore::new(10).unwrap();
        let high = TrustScore::new(95).unwrap();
        assert!(low < high);
        assert_eq!(high.to_string(), "95");
    }

    #[test]
    fn test_certificate_builder() {
        let expires = Utc::now() + chrono::Duration::days(30);
        let cert = Certificate::new("anchor-ca")
            .with_score(98)
            .with_content_hash("abc123")
            .with_expiry(expires);

        assert_eq!(cert.issuer, "anchor-ca");
        assert_eq!(cert.score, Some(98));
        assert_eq!(cert.content_hash.as_deref(), Some("abc123"));
        assert_eq!(cert.expires_at, Some(expires));
        assert!(cert.signature.is_empty());
    }

    #[test]
    fn test_signable_data_covers_fields() {
        let expires = Utc::now() + chrono::Duration::days(30);
        let cert = Certificate::new("anchor-ca")
            .with_score(98)
            .with_content_hash("abc123")
            .with_expiry(expires);

        let original = cert.signable_data();
        let tampered = cert.clone().with_score(99).signable_data();
        assert_ne!(original, tampered);

        // Same fields produce the same digest
        assert_eq!(original, cert.signable_data());
    }

    #[test]
    fn test_issue_signs() {
        let key = IssuerKey::generate("anchor-ca");
        let cert = key.issue(98, "abc123", Utc::now() + chrono::Duration::days(30));

        assert_eq!(cert.issuer, "anchor-ca");
        assert_eq!(cert.score, Some(98));
        assert_eq!(cert.signature.len(), ed25519_dalek::SIGNATURE_LENGTH);
    }

    #[test]
    fn test_from_secret_key_round_trip() {
        let key = IssuerKey::generate("anchor-ca");
        let secret = key.signing_key.to_bytes();

        let restored = IssuerKey::from_secret_key(&secret, "anchor-ca").unwrap();
        assert_eq!(key.verifying_key(), restored.verifying_key());

        let err = IssuerKey::from_secret_key(&[0u8; 7], "bad");
        assert!(matches!(err, Err(KeyError::InvalidKeyLength { got: 7, .. })));
    }

    #[test]
    fn test_content_hash_format() {
        let hash = content_hash(b"model-weights");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash(b"model-weights"));
        assert_ne!(hash, content_hash(b"other"));
    }
}
