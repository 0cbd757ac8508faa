// discovery/mod.rs - Capability Discovery Module

//! Capability-based discovery over the trust registry.
//!
//! The [`DiscoveryIndex`] answers "who provides this capability, best first":
//! agents are ranked per capability by descending trust score, ties broken by
//! earliest registration and finally agent id. The index is secondary state —
//! every query candidate is double-checked against the registry, so expired
//! or deregistered agents are never surfaced even before the next sweep
//! prunes their positions.

mod index;

pub use index::DiscoveryIndex;
