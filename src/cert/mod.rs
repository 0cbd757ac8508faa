// cert/mod.rs - Integrity Certificate Module

//! Integrity certificates and their validation.
//!
//! Every agent joining the network presents a signed integrity certificate.
//! This module covers the full life of that document:
//!
//! - **Certificate**: the wire form, with optional fields so partially
//!   populated submissions can be represented and rejected precisely
//! - **IssuerKey**: Ed25519 issuing authority for signing certificates
//! - **Verify**: the [`SignatureVerifier`] seam and its Ed25519 backend
//! - **Validator**: promotes a raw certificate to a [`ValidatedCertificate`],
//!   the only form accepted by policy evaluation and registration
//!
//! # Example
//!
//! ```ignore
//! use poid::cert::*;
//! use std::sync::Arc;
//!
//! let ca = IssuerKey::generate("anchor-ca");
//! let verifier = Ed25519Verifier::new();
//! verifier.trust_issuer(&ca);
//!
//! let cert = ca.issue(98, content_hash(b"agent binary"), expiry);
//!
//! let validator = CertificateValidator::new(Arc::new(verifier));
//! let validated = validator.validate(&cert, chrono::Utc::now()).await?;
//! assert_eq!(validated.score().value(), 98);
//! ```

mod certificate;
mod validator;
mod verify;

pub use certificate::{
    content_hash, Certificate, IssuerKey, KeyError, TrustScore, ValidatedCertificate,
};

pub use validator::{CertificateValidator, ValidationError};

pub use verify::{Ed25519Verifier, SignatureVerifier, VerifyError};
