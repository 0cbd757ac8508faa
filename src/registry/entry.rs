// registry/entry.rs - Trust Registry Entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cert::{TrustScore, ValidatedCertificate};

/// Agent identifier, unique within a registry
pub type AgentId = String;

/// Lifecycle state of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Entry is live and discoverable
    Active,

    /// Expiry passed; retained until the next sweep removes it
    Expired,
}

impl EntryStatus {
    /// Human-readable status name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Expired => "expired",
        }
    }
}

/// One agent's standing in the trust registry.
///
/// Exactly one entry exists per agent id; re-registration replaces the whole
/// entry and resets `registered_at`. The entry carries everything discovery
/// ranking and expiry need, so neither ever re-reads the certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEntry {
    /// Agent identifier
    pub agent_id: AgentId,

    /// Capabilities the agent advertises, deduplicated and ordered
    pub capabilities: BTreeSet<String>,

    /// Trust score from the validated certificate
    pub score: TrustScore,

    /// Policy the agent was admitted under
    pub policy: String,

    /// Content hash of the admitting certificate
    pub cert_hash: String,

    /// When this entry was created or last refreshed
    pub registered_at: DateTime<Utc>,

    /// When the admitting certificate expires
    pub expires_at: DateTime<Utc>,

    /// Current lifecycle state
    pub status: EntryStatus,
}

impl TrustEntry {
    /// Build an Active entry from an admitted agent's validated certificate
    pub fn new(
        agent_id: impl Into<AgentId>,
        capabilities: BTreeSet<String>,
        certificate: &ValidatedCertificate,
        policy: impl Into<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            capabilities,
            score: certificate.score(),
            policy: policy.into(),
            cert_hash: certificate.content_hash().to_string(),
            registered_at,
            expires_at: certificate.expires_at(),
            status: EntryStatus::Active,
        }
    }

    /// Whether the entry's expiry has passed as of `now`.
    ///
    /// The boundary is exclusive: an entry expiring exactly at `now` is
    /// already expired. Every expiry decision in the crate goes through this
    /// predicate.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Externally visible projection of a registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent identifier
    pub agent_id: AgentId,

    /// Advertised capabilities
    pub capabilities: BTreeSet<String>,

    /// Trust score
    pub score: u8,

    /// Admitting policy name
    pub policy: String,

    /// Registration timestamp
    pub registered_at: DateTime<Utc>,

    /// Certificate expiry
    pub expires_at: DateTime<Utc>,
}

impl From<&TrustEntry> for AgentInfo {
    fn from(entry: &TrustEntry) -> Self {
        Self {
            agent_id: entry.agent_id.clone(),
            capabilities: entry.capabilities.clone(),
            score: entry.score.value(),
            policy: entry.policy.clone(),
            registered_at: entry.registered_at,
            expires_at: entry.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(score: u8, valid_days: i64) -> ValidatedCertificate {
        ValidatedCertificate::new(
            "test-ca".to_string(),
            TrustScore::new(score).unwrap(),
            "hash-1".to_string(),
            Utc::now() + chrono::Duration::days(valid_days),
        )
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entry_from_certificate() {
        let now = Utc::now();
        let cert = validated(98, 30);
        let entry = TrustEntry::new("bot-1", caps(&["finance"]), &cert, "baseline-95", now);

        assert_eq!(entry.agent_id, "bot-1");
        assert_eq!(entry.score.value(), 98);
        assert_eq!(entry.cert_hash, "hash-1");
        assert_eq!(entry.expires_at, cert.expires_at());
        assert_eq!(entry.status, EntryStatus::Active);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let cert = validated(98, 30);
        let entry = TrustEntry::new("bot-1", caps(&["finance"]), &cert, "open", now);

        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(entry.expires_at));
        assert!(entry.is_expired_at(entry.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_agent_info_projection() {
        let now = Utc::now();
        let cert = validated(97, 10);
        let entry = TrustEntry::new("bot-2", caps(&["a", "b"]), &cert, "open", now);

        let info = AgentInfo::from(&entry);
        assert_eq!(info.agent_id, "bot-2");
        assert_eq!(info.score, 97);
        assert_eq!(info.capabilities, caps(&["a", "b"]));
        assert_eq!(info.registered_at, now);
        assert_eq!(info.expires_at, entry.expires_at);
    }

    #[test]
    fn test_entry_encodes_for_storage() {
        let entry = TrustEntry::new(
            "bot-3",
            caps(&["finance"]),
            &validated(96, 5),
            "baseline-95",
            Utc::now(),
        );

        let bytes = bincode::serde::encode_to_vec(&entry, bincode::config::standard()).unwrap();
        let (decoded, _): (TrustEntry, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(EntryStatus::Active.as_str(), "active");
        assert_eq!(EntryStatus::Expired.as_str(), "expired");
    }
}
