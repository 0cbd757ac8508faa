// registry/trust.rs - Trust Registry

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::entry::{AgentId, EntryStatus, TrustEntry};
use super::store::{RegistryStore, StoreError};

/// Errors from registry mutations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry operation failed: {0}")]
    OperationFailed(#[from] StoreError),
}

/// Authoritative map of admitted agents, one entry per agent id.
///
/// Reads are memory-speed; mutations write through to the backing
/// [`RegistryStore`] before touching the in-memory map, so a reader never
/// observes an entry the store has not accepted. Same-id writers are expected
/// to be serialized by the caller (the registration service holds a per-id
/// commit lock); distinct ids proceed in parallel.
pub struct TrustRegistry {
    /// Current entries by agent id
    entries: RwLock<HashMap<AgentId, TrustEntry>>,

    /// Write-through persistence backend
    store: Arc<dyn RegistryStore>,
}

impl TrustRegistry {
    /// Create a registry over the given store
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Insert or replace an entry, returning the entry it replaced.
    ///
    /// The store is written first; if that write fails the previous record is
    /// put back (best effort) and the memory map is left untouched, so
    /// readers and the store stay in agreement.
    pub async fn upsert(&self, entry: TrustEntry) -> Result<Option<TrustEntry>, RegistryError> {
        let previous = self.entries.read().get(&entry.agent_id).cloned();

        if let Err(e) = self.store.put(&entry).await {
            // The failed write may have partially landed; restore the record
            // readers still see before surfacing the error.
            let rollback = match &previous {
                Some(prev) => self.store.put(prev).await,
                None => self.store.remove(&entry.agent_id).await.map(|_| ()),
            };
            if let Err(rollback_err) = rollback {
                warn!(
                    "Rollback after failed write for '{}' also failed: {}",
                    entry.agent_id, rollback_err
                );
            }
            return Err(RegistryError::OperationFailed(e));
        }

        let agent_id = entry.agent_id.clone();
        let replaced = self.entries.write().insert(agent_id.clone(), entry);
        debug!(
            agent_id = %agent_id,
            replaced = replaced.is_some(),
            "Registry entry committed"
        );
        Ok(replaced)
    }

    /// Look up an entry, lazily marking it Expired if its expiry has passed.
    ///
    /// The marked entry is still returned (and retained until the next sweep)
    /// so callers can observe the expiry. Marking happens in memory only.
    pub fn get(&self, agent_id: &str, now: DateTime<Utc>) -> Option<TrustEntry> {
        {
            let entries = self.entries.read();
            match entries.get(agent_id) {
                None => return None,
                Some(e) if e.status == EntryStatus::Expired || !e.is_expired_at(now) => {
                    return Some(e.clone());
                }
                _ => {} // needs marking, fall through to the write lock
            }
        }

        let mut entries = self.entries.write();
        let entry = entries.get_mut(agent_id)?;
        if entry.status == EntryStatus::Active && entry.is_expired_at(now) {
            entry.status = EntryStatus::Expired;
            debug!("Entry '{}' marked expired on read", agent_id);
        }
        Some(entry.clone())
    }

    /// Remove an entry unconditionally (explicit deregistration).
    ///
    /// Returns the removed entry, if one existed.
    pub async fn remove(&self, agent_id: &str) -> Result<Option<TrustEntry>, RegistryError> {
        let removed = self.entries.write().remove(agent_id);
        if removed.is_some() {
            self.store.remove(agent_id).await?;
        }
        Ok(removed)
    }

    /// Ids of entries whose expiry has passed as of `now`
    pub fn expired_candidates(&self, now: DateTime<Utc>) -> Vec<AgentId> {
        self.entries
            .read()
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.agent_id.clone())
            .collect()
    }

    /// Remove one entry if (and only if) it is still expired as of `now`.
    ///
    /// The expiry is re-checked under the write lock, so a refresh that
    /// committed after the caller selected this id is preserved.
    pub async fn remove_if_expired(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        {
            let mut entries = self.entries.write();
            match entries.get(agent_id) {
                Some(e) if e.is_expired_at(now) => {
                    entries.remove(agent_id);
                }
                _ => return Ok(false),
            }
        }
        self.store.remove(agent_id).await?;
        Ok(true)
    }

    /// Remove every expired entry from memory and store, returning their ids
    /// so callers can prune dependent structures in the same logical step.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, RegistryError> {
        let candidates = self.expired_candidates(now);
        let mut swept = Vec::with_capacity(candidates.len());

        for agent_id in candidates {
            if self.remove_if_expired(&agent_id, now).await? {
                swept.push(agent_id);
            }
        }

        if !swept.is_empty() {
            info!("Swept {} expired registry entries", swept.len());
        }
        Ok(swept)
    }

    /// Reload surviving entries from the store (startup recovery).
    ///
    /// Records that expired while the service was down are deleted from the
    /// store rather than restored. Returns the number of restored entries.
    pub async fn restore(&self, now: DateTime<Utc>) -> Result<usize, RegistryError> {
        let stored = self.store.load_all().await?;
        let mut restored = 0;

        for entry in stored {
            if entry.is_expired_at(now) {
                debug!("Discarding expired entry '{}' on restore", entry.agent_id);
                self.store.remove(&entry.agent_id).await?;
                continue;
            }
            self.entries.write().insert(entry.agent_id.clone(), entry);
            restored += 1;
        }

        info!("Restored {} registry entries from store", restored);
        Ok(restored)
    }

    /// All entries that are not expired as of `now`
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<TrustEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.status == EntryStatus::Active && !e.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Number of entries, including any awaiting sweep
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether an entry exists for the agent id (regardless of expiry)
    pub fn contains(&self, agent_id: &str) -> bool {
        self.entries.read().contains_key(agent_id)
    }
}
