// policy/rule.rs - Admission Policy Rules

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::cert::ValidatedCertificate;

/// A single admission rule inside a policy.
///
/// Rules are plain data so policies can be declared in configuration files;
/// the engine interprets them at evaluation time. The serialized form is
/// tagged, e.g. `{"type": "min_score", "min": 95}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Certificate trust score must be at least `min`
    MinScore { min: u8 },

    /// Agent must declare every listed capability
    RequiredCapabilities { capabilities: Vec<String> },

    /// Agents declaring `capability` must score at least `min`
    CapabilityMinScore { capability: String, min: u8 },

    /// Certificate issuer must be one of the listed issuers
    IssuerAllow { issuers: Vec<String> },

    /// Certificate must not be valid further than `max_days` into the future
    MaxValidity { max_days: i64 },

    /// Defer to a predicate registered under `name`
    Custom { name: String },
}

/// A policy: a named, ordered set of admission rules.
///
/// All rules must pass for an agent to be admitted under the policy. A policy
/// with no rules admits any agent holding a validated certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name agents reference at registration
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Rules, all of which must hold
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Policy {
    /// Create an empty policy
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rules: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Why a policy turned an agent away.
///
/// Every failing rule contributes one reason; the engine reports all of them
/// rather than stopping at the first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Reason {
    /// Trust score below the policy floor
    ScoreBelowThreshold { score: u8, min: u8 },

    /// Trust score below the floor for a declared capability
    CapabilityScoreBelowThreshold {
        capability: String,
        score: u8,
        min: u8,
    },

    /// Required capabilities the agent did not declare
    MissingCapabilities { missing: Vec<String> },

    /// Certificate issuer not on the policy's allow list
    IssuerNotAllowed { issuer: String },

    /// Certificate validity window longer than the policy allows
    ValidityTooLong { days: i64, max_days: i64 },

    /// A custom predicate failed with the given detail
    CustomRuleFailed { name: String, detail: String },

    /// Policy references a predicate nobody registered
    CustomRuleUnresolved { name: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ScoreBelowThreshold { score, min } => {
                write!(f, "trust score {} below required minimum {}", score, min)
            }
            Reason::CapabilityScoreBelowThreshold {
                capability,
                score,
                min,
            } => write!(
                f,
                "trust score {} below minimum {} required for capability '{}'",
                score, min, capability
            ),
            Reason::MissingCapabilities { missing } => {
                write!(f, "missing required capabilities: {}", missing.join(", "))
            }
            Reason::IssuerNotAllowed { issuer } => {
                write!(f, "issuer '{}' is not allowed", issuer)
            }
            Reason::ValidityTooLong { days, max_days } => write!(
                f,
                "certificate valid for {} days, policy allows at most {}",
                days, max_days
            ),
            Reason::CustomRuleFailed { name, detail } => {
                write!(f, "rule '{}' failed: {}", name, detail)
            }
            Reason::CustomRuleUnresolved { name } => {
                write!(f, "rule '{}' is not registered", name)
            }
        }
    }
}

/// Custom admission check referenced by [`Rule::Custom`].
///
/// Predicates may consult external systems, so the check is async. Returning
/// `Err` carries a short human-readable detail for the rejection record.
#[async_trait]
pub trait RulePredicate: Send + Sync {
    /// Check the candidate; `Err` rejects with the given detail.
    async fn check(
        &self,
        certificate: &ValidatedCertificate,
        capabilities: &BTreeSet<String>,
    ) -> Result<(), String>;
}
