// discovery/index.rs - Capability-Ranked Discovery Index

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::cert::TrustScore;
use crate::registry::{AgentId, EntryStatus, TrustEntry, TrustRegistry};

/// An agent's position in one capability list.
///
/// Ordering is the discovery rank: higher score first, then earlier
/// registration, then agent id for a total order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RankedAgent {
    score: TrustScore,
    registered_at: DateTime<Utc>,
    agent_id: AgentId,
}

impl Ord for RankedAgent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.registered_at.cmp(&other.registered_at))
            .then_with(|| self.agent_id.cmp(&other.agent_id))
    }
}

impl PartialOrd for RankedAgent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct IndexInner {
    /// Capability -> agents ranked by discovery order
    by_capability: HashMap<String, Vec<RankedAgent>>,

    /// Agent -> capabilities currently indexed, for diffing on re-index
    agent_capabilities: HashMap<AgentId, BTreeSet<String>>,
}

/// Secondary index answering "who provides this capability, best first".
///
/// The index holds ids and rank keys only; the registry stays authoritative.
/// Queries double-check every candidate against its registry entry, so a
/// stale index position (an entry expired since the last sweep) is filtered
/// rather than surfaced.
#[derive(Default)]
pub struct DiscoveryIndex {
    inner: RwLock<IndexInner>,
}

impl DiscoveryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Insert or update an agent's position for every capability it declares.
    ///
    /// Capabilities the agent previously declared but no longer does are
    /// dropped, so re-indexing after a refresh leaves exactly one position
    /// per declared capability.
    pub fn index(&self, entry: &TrustEntry) {
        let mut inner = self.inner.write();

        let previous = inner
            .agent_capabilities
            .get(&entry.agent_id)
            .cloned()
            .unwrap_or_default();

        // Drop positions for capabilities no longer declared
        for capability in previous.difference(&entry.capabilities) {
            if let Some(ranked) = inner.by_capability.get_mut(capability) {
                ranked.retain(|r| r.agent_id != entry.agent_id);
                if ranked.is_empty() {
                    inner.by_capability.remove(capability);
                }
            }
        }

        for capability in &entry.capabilities {
            let ranked = inner.by_capability.entry(capability.clone()).or_default();

            // Remove any stale position before inserting the fresh rank
            ranked.retain(|r| r.agent_id != entry.agent_id);

            let position = RankedAgent {
                score: entry.score,
                registered_at: entry.registered_at,
                agent_id: entry.agent_id.clone(),
            };
            let at = match ranked.binary_search(&position) {
                Ok(at) | Err(at) => at,
            };
            ranked.insert(at, position);
        }

        inner
            .agent_capabilities
            .insert(entry.agent_id.clone(), entry.capabilities.clone());

        debug!(
            agent_id = %entry.agent_id,
            capabilities = entry.capabilities.len(),
            "Agent indexed"
        );
    }

    /// Remove an agent from every capability list (expiry or deregistration).
    ///
    /// Returns whether the agent was indexed.
    pub fn remove(&self, agent_id: &str) -> bool {
        let mut inner = self.inner.write();

        let Some(capabilities) = inner.agent_capabilities.remove(agent_id) else {
            return false;
        };

        for capability in &capabilities {
            if let Some(ranked) = inner.by_capability.get_mut(capability) {
                ranked.retain(|r| r.agent_id != agent_id);
                if ranked.is_empty() {
                    inner.by_capability.remove(capability);
                }
            }
        }

        debug!("Agent '{}' removed from discovery index", agent_id);
        true
    }

    /// Up to `top_k` agent ids providing `capability` with score at least
    /// `min_score`, in discovery rank order.
    ///
    /// Candidates are snapshotted under the read lock, then each is verified
    /// against the registry: the entry must exist, be Active as of `now`, and
    /// still declare the capability at a qualifying score.
    pub fn query(
        &self,
        capability: &str,
        min_score: u8,
        top_k: usize,
        registry: &TrustRegistry,
        now: DateTime<Utc>,
    ) -> Vec<AgentId> {
        if top_k == 0 {
            return Vec::new();
        }

        let candidates: Vec<AgentId> = {
            let inner = self.inner.read();
            match inner.by_capability.get(capability) {
                Some(ranked) => ranked
                    .iter()
                    // Ranked descending by score, so stop at the first miss
                    .take_while(|r| r.score.value() >= min_score)
                    .map(|r| r.agent_id.clone())
                    .collect(),
                None => return Vec::new(),
            }
        };

        let mut results = Vec::with_capacity(top_k.min(candidates.len()));
        for agent_id in candidates {
            let Some(entry) = registry.get(&agent_id, now) else {
                continue;
            };
            if entry.status != EntryStatus::Active
                || !entry.capabilities.contains(capability)
                || entry.score.value() < min_score
            {
                continue;
            }

            results.push(agent_id);
            if results.len() == top_k {
                break;
            }
        }
        results
    }

    /// Number of agents currently indexed
    pub fn agent_count(&self) -> usize {
        self.inner.read().agent_capabilities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ValidatedCertificate;
    use crate::registry::MemoryStore;
    use std::sync::Arc;

    fn entry_at(
        agent_id: &str,
        score: u8,
        capabilities: &[&str],
        registered_at: DateTime<Utc>,
    ) -> TrustEntry {
        let cert = ValidatedCertificate::new(
            "test-ca".to_string(),
            TrustScore::new(score).unwrap(),
            format!("hash-{}", agent_id),
            registered_at + chrono::Duration::days(30),
        );
        let caps: BTreeSet<String> = capabilities.iter().map(|s| s.to_string()).collect();
        TrustEntry::new(agent_id, caps, &cert, "open", registered_at)
    }

    async fn registered(
        registry: &TrustRegistry,
        index: &DiscoveryIndex,
        entry: TrustEntry,
    ) {
        registry.upsert(entry.clone()).await.unwrap();
        index.index(&entry);
    }

    #[tokio::test]
    async fn test_query_ranks_by_score_then_age_then_id() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        let earlier = now - chrono::Duration::hours(1);
        registered(&registry, &index, entry_at("young-high", 98, &["finance"], now)).await;
        registered(&registry, &index, entry_at("old-high", 98, &["finance"], earlier)).await;
        registered(&registry, &index, entry_at("b-mid", 96, &["finance"], now)).await;
        registered(&registry, &index, entry_at("a-mid", 96, &["finance"], now)).await;

        let results = index.query("finance", 0, 10, &registry, now);
        assert_eq!(
            results,
            vec![
                "old-high".to_string(),  // same score, earlier registration
                "young-high".to_string(),
                "a-mid".to_string(),     // same score and time, id breaks the tie
                "b-mid".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_query_applies_min_score_and_top_k() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        for (id, score) in [("a", 99u8), ("b", 97), ("c", 95), ("d", 90)] {
            registered(&registry, &index, entry_at(id, score, &["finance"], now)).await;
        }

        // min_score is inclusive
        let results = index.query("finance", 95, 10, &registry, now);
        assert_eq!(results, vec!["a", "b", "c"]);

        let results = index.query("finance", 95, 2, &registry, now);
        assert_eq!(results, vec!["a", "b"]);

        assert!(index.query("finance", 100, 10, &registry, now).is_empty());
        assert!(index.query("finance", 0, 0, &registry, now).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_is_empty() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();

        assert!(index
            .query("nothing", 0, 10, &registry, Utc::now())
            .is_empty());
    }

    #[tokio::test]
    async fn test_reindex_moves_agent_between_capabilities() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        registered(&registry, &index, entry_at("bot", 98, &["finance", "audit"], now)).await;
        assert_eq!(index.query("audit", 0, 10, &registry, now), vec!["bot"]);

        // Refresh drops "audit" and picks up "billing"
        registered(&registry, &index, entry_at("bot", 98, &["finance", "billing"], now)).await;

        assert!(index.query("audit", 0, 10, &registry, now).is_empty());
        assert_eq!(index.query("billing", 0, 10, &registry, now), vec!["bot"]);
        assert_eq!(index.query("finance", 0, 10, &registry, now), vec!["bot"]);
        assert_eq!(index.agent_count(), 1);
    }

    #[tokio::test]
    async fn test_reindex_updates_rank_without_duplicates() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        registered(&registry, &index, entry_at("riser", 90, &["finance"], now)).await;
        registered(&registry, &index, entry_at("anchor", 95, &["finance"], now)).await;
        assert_eq!(
            index.query("finance", 0, 10, &registry, now),
            vec!["anchor", "riser"]
        );

        // Refresh with a higher score re-ranks the agent, one position only
        registered(&registry, &index, entry_at("riser", 99, &["finance"], now)).await;
        assert_eq!(
            index.query("finance", 0, 10, &registry, now),
            vec!["riser", "anchor"]
        );
    }

    #[tokio::test]
    async fn test_expired_entry_never_surfaced() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        let entry = entry_at("fading", 98, &["finance"], now);
        let expires_at = entry.expires_at;
        registered(&registry, &index, entry).await;

        assert_eq!(index.query("finance", 0, 10, &registry, now), vec!["fading"]);

        // Index still holds the position, but the liveness check filters it
        assert!(index
            .query("finance", 0, 10, &registry, expires_at)
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_prunes_every_capability() {
        let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
        let index = DiscoveryIndex::new();
        let now = Utc::now();

        registered(&registry, &index, entry_at("bot", 98, &["finance", "audit"], now)).await;

        assert!(index.remove("bot"));
        assert!(!index.remove("bot"));
        assert!(index.query("finance", 0, 10, &registry, now).is_empty());
        assert!(index.query("audit", 0, 10, &registry, now).is_empty());
        assert_eq!(index.agent_count(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn agent_strategy() -> impl Strategy<Value = Vec<(String, u8, i64)>> {
            // id, score, registration offset in seconds
            proptest::collection::vec(
                ("agent-[a-j]{2}", 0u8..=100, 0i64..3600),
                1..24,
            )
        }

        proptest! {
            #[test]
            fn property_query_is_ranked_and_duplicate_free(agents in agent_strategy()) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async move {
                    let registry = TrustRegistry::new(Arc::new(MemoryStore::new()));
                    let index = DiscoveryIndex::new();
                    let base = Utc::now();

                    for (id, score, offset) in &agents {
                        let at = base + chrono::Duration::seconds(*offset);
                        registered(&registry, &index, entry_at(id, *score, &["cap"], at)).await;
                    }

                    let results = index.query("cap", 0, agents.len(), &registry, base);

                    // No id appears twice, even when generated ids collide
                    let unique: BTreeSet<&AgentId> = results.iter().collect();
                    prop_assert_eq!(unique.len(), results.len());

                    // Rank order: score desc, then registration asc, then id
                    let ranks: Vec<(u8, DateTime<Utc>, AgentId)> = results
                        .iter()
                        .map(|id| {
                            let e = registry.get(id, base).expect("indexed id has entry");
                            (e.score.value(), e.registered_at, e.agent_id)
                        })
                        .collect();
                    for pair in ranks.windows(2) {
                        let (s1, t1, id1) = &pair[0];
                        let (s2, t2, id2) = &pair[1];
                        prop_assert!(
                            s1 > s2 || (s1 == s2 && (t1 < t2 || (t1 == t2 && id1 < id2)))
                        );
                    }
                    Ok(())
                })?;
            }
        }
    }
}
