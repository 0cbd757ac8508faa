// cert/validator.rs - Integrity Certificate Validation

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::certificate::{Certificate, TrustScore, ValidatedCertificate};
use super::verify::{SignatureVerifier, VerifyError};

/// Reasons a certificate fails validation
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Certificate is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Trust score {0} is outside the valid range 0-{max}", max = TrustScore::MAX)]
    ScoreOutOfRange(u8),

    #[error("Certificate expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Signature rejected for issuer '{issuer}': {reason}")]
    SignatureMismatch { issuer: String, reason: VerifyError },
}

/// Validates integrity certificates before they reach policy evaluation.
///
/// Checks run cheapest-first: field presence, score range, and expiry are
/// decided locally before the signature verifier is consulted. A certificate
/// that clears every check is promoted to a [`ValidatedCertificate`], the only
/// form the rest of the pipeline accepts.
pub struct CertificateValidator {
    /// Signature-check backend
    verifier: Arc<dyn SignatureVerifier>,
}

impl CertificateValidator {
    /// Create a validator backed by the given signature verifier
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    /// Validate a certificate as of `now`.
    ///
    /// Expiry is strict: a certificate whose `expires_at` equals `now` is
    /// already expired.
    pub async fn validate(
        &self,
        certificate: &Certificate,
        now: DateTime<Utc>,
    ) -> Result<ValidatedCertificate, ValidationError> {
        if certificate.issuer.is_empty() {
            return Err(ValidationError::MissingField("issuer"));
        }

        let raw_score = certificate
            .score
            .ok_or(ValidationError::MissingField("score"))?;
        let score =
            TrustScore::new(raw_score).ok_or(ValidationError::ScoreOutOfRange(raw_score))?;

        let content_hash = certificate
            .content_hash
            .clone()
            .ok_or(ValidationError::MissingField("content_hash"))?;

        let expires_at = certificate
            .expires_at
            .ok_or(ValidationError::MissingField("expires_at"))?;
        if expires_at <= now {
            return Err(ValidationError::Expired {
                expired_at: expires_at,
            });
        }

        if certificate.signature.is_empty() {
            return Err(ValidationError::MissingField("signature"));
        }

        self.verifier
            .verify(certificate)
            .await
            .map_err(|reason| ValidationError::SignatureMismatch {
                issuer: certificate.issuer.clone(),
                reason,
            })?;

        debug!(
            issuer = %certificate.issuer,
            score = raw_score,
            "Certificate validated"
        );

        Ok(ValidatedCertificate::new(
            certificate.issuer.clone(),
            score,
            content_hash,
            expires_at,
        ))
    }
}
