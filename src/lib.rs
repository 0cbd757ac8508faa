// lib.rs - Proof-of-Integrity Discovery
//
// Certificate-gated agent registration with trust-ranked capability
// discovery for agent networks.

#![doc = include_str!("../README.md")]

pub mod audit;
pub mod cert;
pub mod config;
pub mod discovery;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod service;

// Re-export commonly used types
pub use audit::{AuditLog, AuditOutcome, AuditRecord};

pub use cert::{
    content_hash, Certificate, CertificateValidator, Ed25519Verifier, IssuerKey,
    SignatureVerifier, TrustScore, ValidatedCertificate, ValidationError, VerifyError,
};

pub use config::PoidConfig;

pub use policy::{
    Policy, PolicyEngine, Reason, Rule, RulePredicate, BASELINE_POLICY, OPEN_POLICY,
};

pub use registry::{
    AgentId, AgentInfo, EntryStatus, MemoryStore, RegistryStore, SledStore, TrustEntry,
    TrustRegistry,
};

pub use service::{
    ExpirySweeper, RegistrationError, RegistrationRequest, RegistrationService, RequestState,
    ServiceStats,
};

pub use observability::{
    init_metrics, init_tracing, MetricsConfig, MetricsHandle, TracingConfig, TracingFormat,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditLog, AuditOutcome, AuditRecord};
    pub use crate::cert::{
        content_hash, Certificate, CertificateValidator, Ed25519Verifier, IssuerKey, TrustScore,
        ValidatedCertificate,
    };
    pub use crate::config::PoidConfig;
    pub use crate::discovery::DiscoveryIndex;
    pub use crate::policy::{Policy, PolicyEngine, Rule, BASELINE_POLICY, OPEN_POLICY};
    pub use crate::registry::{
        AgentId, AgentInfo, EntryStatus, MemoryStore, RegistryStore, SledStore, TrustEntry,
        TrustRegistry,
    };
    pub use crate::service::{
        ExpirySweeper, RegistrationError, RegistrationRequest, RegistrationService, RequestState,
        ServiceStats,
    };
}
