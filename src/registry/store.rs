// registry/store.rs - Persistent Registry Storage

use async_trait::async_trait;
use dashmap::DashMap;
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;

use super::entry::{AgentId, TrustEntry};

/// Errors from the registry's persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Tree holding bincode-encoded trust entries keyed by agent id
const TREE_ENTRIES: &str = "trust_entries";

/// Persistence seam for the trust registry.
///
/// The registry writes through to its store before updating memory, so a
/// store that observes a `put` has the authoritative copy. Implementations
/// must be safe to call from many tasks at once.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Persist an entry, replacing any previous entry for the same agent id
    async fn put(&self, entry: &TrustEntry) -> Result<(), StoreError>;

    /// Load one entry by agent id
    async fn get(&self, agent_id: &str) -> Result<Option<TrustEntry>, StoreError>;

    /// Delete an entry; returns whether one existed
    async fn remove(&self, agent_id: &str) -> Result<bool, StoreError>;

    /// Load every stored entry, for startup recovery
    async fn load_all(&self) -> Result<Vec<TrustEntry>, StoreError>;
}

/// Volatile store for tests and embedders that do not need durability
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<AgentId, TrustEntry>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn put(&self, entry: &TrustEntry) -> Result<(), StoreError> {
        self.entries.insert(entry.agent_id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, agent_id: &str) -> Result<Option<TrustEntry>, StoreError> {
        Ok(self.entries.get(agent_id).map(|e| e.clone()))
    }

    async fn remove(&self, agent_id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(agent_id).is_some())
    }

    async fn load_all(&self) -> Result<Vec<TrustEntry>, StoreError> {
        Ok(self.entries.iter().map(|e| e.clone()).collect())
    }
}

/// Durable store backed by sled
pub struct SledStore {
    db: Db,
    entries: Tree,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let entries = db.open_tree(TREE_ENTRIES)?;
        Ok(Self { db, entries })
    }

    /// Create a temporary store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let entries = db.open_tree(TREE_ENTRIES)?;
        Ok(Self { db, entries })
    }

    fn decode(bytes: &[u8]) -> Result<TrustEntry, StoreError> {
        let (entry, _): (TrustEntry, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(entry)
    }
}

#[async_trait]
impl RegistryStore for SledStore {
    async fn put(&self, entry: &TrustEntry) -> Result<(), StoreError> {
        let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        self.entries.insert(entry.agent_id.as_bytes(), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn get(&self, agent_id: &str) -> Result<Option<TrustEntry>, StoreError> {
        match self.entries.get(agent_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, agent_id: &str) -> Result<bool, StoreError> {
        let removed = self.entries.remove(agent_id.as_bytes())?.is_some();
        if removed {
            self.db.flush_async().await?;
        }
        Ok(removed)
    }

    async fn load_all(&self) -> Result<Vec<TrustEntry>, StoreError> {
        let mut loaded = Vec::new();
        for item in self.entries.iter() {
            let (_, bytes) = item?;
            loaded.push(Self::decode(&bytes)?);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{TrustScore, ValidatedCertificate};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn entry(agent_id: &str, score: u8) -> TrustEntry {
        let cert = ValidatedCertificate::new(
            "test-ca".to_string(),
            TrustScore::new(score).unwrap(),
            format!("hash-{}", agent_id),
            Utc::now() + chrono::Duration::days(30),
        );
        let caps: BTreeSet<String> = ["finance".to_string()].into_iter().collect();
        TrustEntry::new(agent_id, caps, &cert, "baseline-95", Utc::now())
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        store.put(&entry("bot-1", 98)).await.unwrap();
        let loaded = store.get("bot-1").await.unwrap().unwrap();
        assert_eq!(loaded.agent_id, "bot-1");
        assert_eq!(loaded.score.value(), 98);

        assert!(store.get("bot-2").await.unwrap().is_none());
        assert!(store.remove("bot-1").await.unwrap());
        assert!(!store.remove("bot-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_put_replaces() {
        let store = MemoryStore::new();
        store.put(&entry("bot-1", 90)).await.unwrap();
        store.put(&entry("bot-1", 99)).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].score.value(), 99);
    }

    #[tokio::test]
    async fn test_sled_store_round_trip() {
        let store = SledStore::in_memory().unwrap();
        let stored = entry("bot-1", 98);

        store.put(&stored).await.unwrap();
        let loaded = store.get("bot-1").await.unwrap().unwrap();
        assert_eq!(loaded, stored);

        assert!(store.remove("bot-1").await.unwrap());
        assert!(store.get("bot-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry");

        {
            let store = SledStore::open(&path).unwrap();
            store.put(&entry("bot-1", 98)).await.unwrap();
            store.put(&entry("bot-2", 96)).await.unwrap();
        }

        let store = SledStore::open(&path).unwrap();
        let mut all = store.load_all().await.unwrap();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].agent_id, "bot-1");
        assert_eq!(all[1].agent_id, "bot-2");
    }
}
