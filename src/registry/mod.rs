// registry/mod.rs - Trust Registry Module

//! The authoritative record of admitted agents.
//!
//! One [`TrustEntry`] exists per agent id, carrying the capability set, trust
//! score, policy, and expiry that admission established. The registry keeps
//! entries in memory for fast reads and writes through to a [`RegistryStore`]
//! (in-memory or sled-backed) so a restart can [`TrustRegistry::restore`] the
//! surviving population.
//!
//! Expiry is handled twice over:
//!
//! - **Lazily**: [`TrustRegistry::get`] marks an overdue entry `Expired` at
//!   read time, so staleness is never served as live
//! - **Physically**: [`TrustRegistry::sweep_expired`] deletes overdue entries
//!   from memory and store, re-checking under the write lock so a racing
//!   refresh survives

mod entry;
mod store;
mod trust;

pub use entry::{AgentId, AgentInfo, EntryStatus, TrustEntry};

pub use store::{MemoryStore, RegistryStore, SledStore, StoreError};

pub use trust::{RegistryError, TrustRegistry};
