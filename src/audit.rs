// audit.rs - Registration Audit Trail

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::registry::AgentId;
use crate::service::RequestState;

/// Terminal outcome captured per audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditOutcome {
    /// New agent admitted
    Accepted,

    /// Existing agent refreshed in place
    Replaced,

    /// Request turned away, with the rendered error
    Rejected { reason: String },

    /// Agent explicitly deregistered
    Deregistered,

    /// Entry removed by an expiry sweep
    Swept,
}

impl AuditOutcome {
    /// Short outcome name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Accepted => "accepted",
            AuditOutcome::Replaced => "replaced",
            AuditOutcome::Rejected { .. } => "rejected",
            AuditOutcome::Deregistered => "deregistered",
            AuditOutcome::Swept => "swept",
        }
    }
}

/// One audited event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id
    pub record_id: Uuid,

    /// Agent the event concerns
    pub agent_id: AgentId,

    /// What happened
    pub outcome: AuditOutcome,

    /// Terminal request state, for registration-shaped events
    pub state: Option<RequestState>,

    /// When the event was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Bounded in-memory trail of registration outcomes.
///
/// Holds the most recent `capacity` records; older ones fall off the front.
/// Replaced and swept entries leave the registry silently otherwise, so this
/// is the one place their departure can still be observed.
pub struct AuditLog {
    /// Records, oldest first
    records: RwLock<VecDeque<AuditRecord>>,

    /// Maximum records retained
    capacity: usize,
}

impl AuditLog {
    /// Default record capacity
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a trail retaining up to `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Append a record, evicting the oldest if over capacity.
    ///
    /// Returns the new record's id.
    pub fn record(
        &self,
        agent_id: impl Into<AgentId>,
        outcome: AuditOutcome,
        state: Option<RequestState>,
    ) -> Uuid {
        let record = AuditRecord {
            record_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            outcome,
            state,
            recorded_at: Utc::now(),
        };
        let record_id = record.record_id;

        let mut records = self.records.write();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        record_id
    }

    /// The most recent `n` records, newest first
    pub fn recent(&self, n: usize) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the trail is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let log = AuditLog::default();

        log.record("bot-1", AuditOutcome::Accepted, Some(RequestState::Accepted));
        log.record("bot-2", AuditOutcome::Replaced, Some(RequestState::Accepted));
        log.record(
            "bot-3",
            AuditOutcome::Rejected {
                reason: "score too low".to_string(),
            },
            Some(RequestState::Rejected),
        );

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].agent_id, "bot-3");
        assert_eq!(recent[1].agent_id, "bot-2");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = AuditLog::new(3);

        for i in 0..5 {
            log.record(format!("bot-{}", i), AuditOutcome::Accepted, None);
        }

        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent[0].agent_id, "bot-4");
        assert_eq!(recent[2].agent_id, "bot-2");
    }

    #[test]
    fn test_record_ids_unique() {
        let log = AuditLog::default();
        let a = log.record("bot-1", AuditOutcome::Accepted, None);
        let b = log.record("bot-1", AuditOutcome::Deregistered, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(AuditOutcome::Accepted.as_str(), "accepted");
        assert_eq!(
            AuditOutcome::Rejected {
                reason: "x".to_string()
            }
            .as_str(),
            "rejected"
        );
        assert_eq!(AuditOutcome::Swept.as_str(), "swept");
    }
}
