// policy/engine.rs - Admission Policy Engine

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::rule::{Policy, Reason, Rule, RulePredicate};
use crate::cert::ValidatedCertificate;

/// Name of the built-in policy that admits any validated certificate
pub const OPEN_POLICY: &str = "open";

/// Name of the built-in policy requiring a trust score of at least 95
pub const BASELINE_POLICY: &str = "baseline-95";

/// Policy evaluation errors
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error("Policy '{policy}' rejected agent: {}", format_reasons(.reasons))]
    Rejected { policy: String, reasons: Vec<Reason> },
}

pub(crate) fn format_reasons(reasons: &[Reason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Evaluates admission policies against validated certificates.
///
/// Policies are held by name; custom rules resolve through registered
/// [`RulePredicate`]s. Evaluation reports every failing rule, so a rejected
/// agent learns the full distance to admission rather than one rule at a time.
#[derive(Default)]
pub struct PolicyEngine {
    /// Named policies
    policies: RwLock<HashMap<String, Arc<Policy>>>,

    /// Named predicates backing `Rule::Custom`
    predicates: RwLock<HashMap<String, Arc<dyn RulePredicate>>>,
}

impl PolicyEngine {
    /// Create an engine with no policies
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            predicates: RwLock::new(HashMap::new()),
        }
    }

    /// Register the built-in `open` and `baseline-95` policies
    pub fn with_defaults(self) -> Self {
        self.register_policy(
            Policy::new(OPEN_POLICY)
                .with_description("Admit any agent holding a validated certificate"),
        );
        self.register_policy(
            Policy::new(BASELINE_POLICY)
                .with_description("Require a trust score of at least 95")
                .with_rule(Rule::MinScore { min: 95 }),
        );
        self
    }

    /// Register or replace a policy
    pub fn register_policy(&self, policy: Policy) {
        debug!(
            "Registered policy '{}' with {} rule(s)",
            policy.name,
            policy.rules.len()
        );
        self.policies
            .write()
            .insert(policy.name.clone(), Arc::new(policy));
    }

    /// Register or replace a predicate backing `Rule::Custom`
    pub fn register_predicate(&self, name: impl Into<String>, predicate: Arc<dyn RulePredicate>) {
        self.predicates.write().insert(name.into(), predicate);
    }

    /// Look up a policy by name
    pub fn policy(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.read().get(name).cloned()
    }

    /// Check whether a policy exists
    pub fn has_policy(&self, name: &str) -> bool {
        self.policies.read().contains_key(name)
    }

    /// Names of all registered policies
    pub fn policy_names(&self) -> Vec<String> {
        self.policies.read().keys().cloned().collect()
    }

    /// Evaluate a named policy against a validated certificate and the
    /// capabilities the agent wants to advertise.
    ///
    /// Rules are checked in declaration order and every failure is collected;
    /// `Ok(())` means the agent is admissible under the policy.
    pub async fn evaluate(
        &self,
        policy_name: &str,
        certificate: &ValidatedCertificate,
        capabilities: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        let policy = self
            .policies
            .read()
            .get(policy_name)
            .cloned()
            .ok_or_else(|| PolicyError::PolicyNotFound(policy_name.to_string()))?;

        let score = certificate.score().value();
        let mut reasons = Vec::new();

        for rule in &policy.rules {
            match rule {
                Rule::MinScore { min } => {
                    if score < *min {
                        reasons.push(Reason::ScoreBelowThreshold { score, min: *min });
                    }
                }
                Rule::RequiredCapabilities {
                    capabilities: required,
                } => {
                    let missing: Vec<String> = required
                        .iter()
                        .filter(|c| !capabilities.contains(*c))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        reasons.push(Reason::MissingCapabilities { missing });
                    }
                }
                Rule::CapabilityMinScore { capability, min } => {
                    if capabilities.contains(capability) && score < *min {
                        reasons.push(Reason::CapabilityScoreBelowThreshold {
                            capability: capability.clone(),
                            score,
                            min: *min,
                        });
                    }
                }
                Rule::IssuerAllow { issuers } => {
                    if !issuers.iter().any(|i| i == certificate.issuer()) {
                        reasons.push(Reason::IssuerNotAllowed {
                            issuer: certificate.issuer().to_string(),
                        });
                    }
                }
                Rule::MaxValidity { max_days } => {
                    let validity = certificate.expires_at() - now;
                    if validity > chrono::Duration::days(*max_days) {
                        // Round up so a bound overshot by an hour reads as a
                        // full day over, not as equal to the bound.
                        let days = (validity.num_seconds() + 86_399) / 86_400;
                        reasons.push(Reason::ValidityTooLong {
                            days,
                            max_days: *max_days,
                        });
                    }
                }
                Rule::Custom { name } => {
                    let predicate = self.predicates.read().get(name).cloned();
                    match predicate {
                        Some(predicate) => {
                            if let Err(detail) = predicate.check(certificate, capabilities).await {
                                reasons.push(Reason::CustomRuleFailed {
                                    name: name.clone(),
                                    detail,
                                });
                            }
                        }
                        None => reasons.push(Reason::CustomRuleUnresolved { name: name.clone() }),
                    }
                }
            }
        }

        if reasons.is_empty() {
            debug!(
                policy = %policy.name,
                issuer = %certificate.issuer(),
                score,
                "Policy evaluation passed"
            );
            Ok(())
        } else {
            debug!(
                policy = %policy.name,
                issuer = %certificate.issuer(),
                score,
                reasons = reasons.len(),
                "Policy evaluation rejected agent"
            );
            Err(PolicyError::Rejected {
                policy: policy.name.clone(),
                reasons,
            })
        }
    }
}
