// policy/mod.rs - Admission Policy Module

//! Declarative admission policies over validated certificates.
//!
//! A policy is a named list of [`Rule`]s; an agent is admitted under a policy
//! only if every rule holds. Policies are plain data (declarable in
//! configuration), while [`Rule::Custom`] defers to programmatic
//! [`RulePredicate`]s for checks that need code.
//!
//! Two policies ship built in:
//!
//! - **open**: admits any agent holding a validated certificate
//! - **baseline-95**: requires a trust score of at least 95
//!
//! # Example
//!
//! ```ignore
//! use poid::policy::*;
//!
//! let engine = PolicyEngine::new().with_defaults();
//! engine.register_policy(
//!     Policy::new("finos-financial")
//!         .with_rule(Rule::MinScore { min: 95 })
//!         .with_rule(Rule::IssuerAllow { issuers: vec!["finos-ca".into()] }),
//! );
//!
//! engine.evaluate("finos-financial", &validated, &capabilities, now).await?;
//! ```

mod engine;
mod rule;

pub use engine::{PolicyEngine, PolicyError, BASELINE_POLICY, OPEN_POLICY};
pub(crate) use engine::format_reasons;

pub use rule::{Policy, Reason, Rule, RulePredicate};
