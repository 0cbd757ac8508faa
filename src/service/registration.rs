// service/registration.rs - Registration Service

//! Certificate-gated agent registration.
//!
//! [`RegistrationService`] ties the subsystem together: requests pass through
//! certificate validation and policy evaluation, then commit to the trust
//! registry and discovery index as one unit. Every decision lands in the
//! audit trail.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditOutcome};
use crate::cert::{
    Certificate, CertificateValidator, SignatureVerifier, TrustScore, ValidationError, VerifyError,
};
use crate::config::PoidConfig;
use crate::discovery::DiscoveryIndex;
use crate::observability;
use crate::policy::{format_reasons, PolicyEngine, PolicyError, Reason, BASELINE_POLICY};
use crate::registry::{
    AgentId, AgentInfo, EntryStatus, RegistryError, RegistryStore, TrustEntry, TrustRegistry,
};

/// Lifecycle of a registration request.
///
/// ```text
/// Received -> ValidatingCertificate -> EvaluatingPolicy -> Committing -> Accepted
/// ```
///
/// Every non-terminal state may also step to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Request received, preconditions not yet checked
    Received,

    /// Certificate signature and fields being verified
    ValidatingCertificate,

    /// Admission policy being evaluated
    EvaluatingPolicy,

    /// Registry and index write in progress
    Committing,

    /// Agent admitted
    Accepted,

    /// Request refused
    Rejected,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::ValidatingCertificate => "validating_certificate",
            RequestState::EvaluatingPolicy => "evaluating_policy",
            RequestState::Committing => "committing",
            RequestState::Accepted => "accepted",
            RequestState::Rejected => "rejected",
        }
    }

    /// Whether the request has reached a final decision
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Accepted | RequestState::Rejected)
    }

    /// Whether stepping to `next` is a legal transition
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (*self, next),
            (Received, ValidatingCertificate)
                | (ValidatingCertificate, EvaluatingPolicy)
                | (EvaluatingPolicy, Committing)
                | (Committing, Accepted)
                | (Received, Rejected)
                | (ValidatingCertificate, Rejected)
                | (EvaluatingPolicy, Rejected)
                | (Committing, Rejected)
        )
    }
}

fn advance(state: &mut RequestState, next: RequestState, agent_id: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {:?} -> {:?}",
        state,
        next
    );
    debug!(
        agent_id = %agent_id,
        from = state.as_str(),
        to = next.as_str(),
        "Request state advanced"
    );
    *state = next;
}

/// A request to join the agent network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Identifier the agent wants to register under
    pub agent_id: AgentId,

    /// Capabilities the agent advertises
    pub capabilities: BTreeSet<String>,

    /// Integrity certificate backing the request
    pub certificate: Option<Certificate>,

    /// Admission policy to evaluate the request under
    pub policy: String,
}

impl RegistrationRequest {
    /// Create a request evaluated under the baseline policy
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            capabilities: BTreeSet::new(),
            certificate: None,
            policy: BASELINE_POLICY.to_string(),
        }
    }

    /// Add a single capability
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Add several capabilities
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Attach the integrity certificate
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Evaluate under a named policy instead of the baseline
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }
}

/// Why a registration request was refused or could not complete
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Registration request has no certificate attached")]
    MissingCertificate,

    #[error("Registration request declares no capabilities")]
    EmptyCapabilities,

    #[error("Agent id '{0}' is reserved")]
    ReservedAgentId(AgentId),

    #[error("Registry is full ({limit} agents)")]
    RegistryFull { limit: usize },

    #[error("Too many capabilities: {count} declared, limit is {limit}")]
    TooManyCapabilities { count: usize, limit: usize },

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Trust score {0} is outside the valid range 0-{max}", max = TrustScore::MAX)]
    ScoreOutOfRange(u8),

    #[error("Certificate expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Signature rejected for issuer '{issuer}': {reason}")]
    SignatureMismatch { issuer: String, reason: VerifyError },

    #[error("Unknown policy '{0}'")]
    PolicyNotFound(String),

    #[error("Policy '{policy}' rejected agent: {}", format_reasons(.reasons))]
    PolicyRejected { policy: String, reasons: Vec<Reason> },

    #[error("Verification timed out after {timeout_ms}ms")]
    VerificationTimeout { timeout_ms: u64 },

    #[error("Registration could not be completed: {0}")]
    OperationFailed(String),
}

impl RegistrationError {
    /// Short label for metrics and audit records
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::MissingCertificate => "missing_certificate",
            RegistrationError::EmptyCapabilities => "empty_capabilities",
            RegistrationError::ReservedAgentId(_) => "reserved_agent_id",
            RegistrationError::RegistryFull { .. } => "registry_full",
            RegistrationError::TooManyCapabilities { .. } => "too_many_capabilities",
            RegistrationError::MissingField(_) => "missing_field",
            RegistrationError::ScoreOutOfRange(_) => "score_out_of_range",
            RegistrationError::Expired { .. } => "expired",
            RegistrationError::SignatureMismatch { .. } => "signature_mismatch",
            RegistrationError::PolicyNotFound(_) => "policy_not_found",
            RegistrationError::PolicyRejected { .. } => "policy_rejected",
            RegistrationError::VerificationTimeout { .. } => "verification_timeout",
            RegistrationError::OperationFailed(_) => "operation_failed",
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistrationError::VerificationTimeout { .. } | RegistrationError::OperationFailed(_)
        )
    }
}

impl From<ValidationError> for RegistrationError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingField(field) => RegistrationError::MissingField(field),
            ValidationError::ScoreOutOfRange(score) => RegistrationError::ScoreOutOfRange(score),
            ValidationError::Expired { expired_at } => RegistrationError::Expired { expired_at },
            ValidationError::SignatureMismatch { issuer, reason } => {
                RegistrationError::SignatureMismatch { issuer, reason }
            }
        }
    }
}

impl From<PolicyError> for RegistrationError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::PolicyNotFound(name) => RegistrationError::PolicyNotFound(name),
            PolicyError::Rejected { policy, reasons } => {
                RegistrationError::PolicyRejected { policy, reasons }
            }
        }
    }
}

impl From<RegistryError> for RegistrationError {
    fn from(err: RegistryError) -> Self {
        RegistrationError::OperationFailed(err.to_string())
    }
}

/// Service counters
#[derive(Debug, Default, Clone)]
pub struct ServiceStats {
    /// New agents admitted
    pub registered: u64,

    /// Re-registrations that replaced an earlier entry
    pub replaced: u64,

    /// Requests refused
    pub rejected: u64,

    /// Agents removed on request
    pub deregistered: u64,

    /// Discovery queries served
    pub queries: u64,

    /// Expiry sweeps run
    pub sweeps: u64,

    /// Entries removed by sweeps
    pub swept_entries: u64,
}

/// Front door of the subsystem: admission, discovery, and expiry.
///
/// # Example
///
/// ```ignore
/// use poid::prelude::*;
///
/// let issuer = IssuerKey::generate("finos-ca");
/// let verifier = Ed25519Verifier::new();
/// verifier.trust_issuer(&issuer);
///
/// let service = RegistrationService::new(
///     PoidConfig::default(),
///     Arc::new(verifier),
///     Arc::new(MemoryStore::new()),
/// );
///
/// let request = RegistrationRequest::new("FinanceBot")
///     .with_capability("finance")
///     .with_certificate(issuer.issue(98, hash, expiry));
/// let info = service.register(request).await?;
/// ```
pub struct RegistrationService {
    config: PoidConfig,
    validator: CertificateValidator,
    engine: PolicyEngine,
    registry: Arc<TrustRegistry>,
    index: Arc<DiscoveryIndex>,
    audit: AuditLog,
    // One lock per agent id; commits and sweeps for the same agent serialize
    // on it. Locks are never removed, ids are expected to be re-registered.
    commit_locks: DashMap<AgentId, Arc<tokio::sync::Mutex<()>>>,
    // Ids whose first insert is mid-commit. Counted against max_agents, so
    // admissions racing through validation cannot overshoot the cap.
    pending_inserts: Arc<Mutex<HashSet<AgentId>>>,
    stats: Mutex<ServiceStats>,
}

impl RegistrationService {
    /// Create a service over the given verifier and backing store.
    ///
    /// The built-in policies are registered first, then any policies from the
    /// configuration.
    pub fn new(
        config: PoidConfig,
        verifier: Arc<dyn SignatureVerifier>,
        store: Arc<dyn RegistryStore>,
    ) -> Self {
        let engine = PolicyEngine::new().with_defaults();
        for policy in &config.policies {
            engine.register_policy(policy.clone());
        }

        let audit = AuditLog::new(config.audit_capacity);

        Self {
            validator: CertificateValidator::new(verifier),
            engine,
            registry: Arc::new(TrustRegistry::new(store)),
            index: Arc::new(DiscoveryIndex::new()),
            audit,
            commit_locks: DashMap::new(),
            pending_inserts: Arc::new(Mutex::new(HashSet::new())),
            stats: Mutex::new(ServiceStats::default()),
            config,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &PoidConfig {
        &self.config
    }

    /// The policy engine, for registering policies and custom predicates
    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// The audit trail
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Snapshot of the service counters
    pub fn stats(&self) -> ServiceStats {
        self.stats.lock().clone()
    }

    /// Number of registered agents, including expired entries not yet swept
    pub fn agent_count(&self) -> usize {
        self.registry.len()
    }

    /// Register an agent, replacing any earlier registration under the same id.
    ///
    /// The request walks the full admission pipeline: preconditions,
    /// certificate validation, policy evaluation, then an atomic commit to the
    /// registry and discovery index. The decision is recorded in the audit
    /// trail either way.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<AgentInfo, RegistrationError> {
        let started = Instant::now();
        let now = Utc::now();
        let mut state = RequestState::Received;

        match self.admit(&request, &mut state, now).await {
            Ok((info, replaced)) => {
                let outcome = if replaced {
                    AuditOutcome::Replaced
                } else {
                    AuditOutcome::Accepted
                };
                self.audit
                    .record(request.agent_id.clone(), outcome, Some(state));
                {
                    let mut stats = self.stats.lock();
                    if replaced {
                        stats.replaced += 1;
                    } else {
                        stats.registered += 1;
                    }
                }
                observability::record_registration_accepted(&request.policy, replaced);
                observability::record_admission_duration(started.elapsed(), "accepted");
                observability::set_active_agents(self.registry.len());
                info!(
                    agent_id = %request.agent_id,
                    policy = %request.policy,
                    score = info.score,
                    replaced,
                    "Agent registered"
                );
                Ok(info)
            }
            Err(e) => {
                if !state.is_terminal() {
                    advance(&mut state, RequestState::Rejected, &request.agent_id);
                }
                self.audit.record(
                    request.agent_id.clone(),
                    AuditOutcome::Rejected {
                        reason: e.to_string(),
                    },
                    Some(state),
                );
                self.stats.lock().rejected += 1;
                observability::record_registration_rejected(e.kind());
                observability::record_admission_duration(started.elapsed(), "rejected");
                warn!(agent_id = %request.agent_id, error = %e, "Registration rejected");
                Err(e)
            }
        }
    }

    async fn admit(
        &self,
        request: &RegistrationRequest,
        state: &mut RequestState,
        now: DateTime<Utc>,
    ) -> Result<(AgentInfo, bool), RegistrationError> {
        // Preconditions come before any cryptography.
        if request.agent_id.is_empty() {
            return Err(RegistrationError::MissingField("agent_id"));
        }
        if request.capabilities.is_empty() {
            return Err(RegistrationError::EmptyCapabilities);
        }
        if self.config.reserved_agent_ids.contains(&request.agent_id) {
            return Err(RegistrationError::ReservedAgentId(request.agent_id.clone()));
        }
        let cap_limit = self.config.max_capabilities_per_agent;
        if cap_limit > 0 && request.capabilities.len() > cap_limit {
            return Err(RegistrationError::TooManyCapabilities {
                count: request.capabilities.len(),
                limit: cap_limit,
            });
        }
        // Replacing an existing registration never counts against the cap.
        let max_agents = self.config.max_agents;
        if max_agents > 0
            && !self.registry.contains(&request.agent_id)
            && self.registry.len() >= max_agents
        {
            return Err(RegistrationError::RegistryFull { limit: max_agents });
        }
        let certificate = request
            .certificate
            .as_ref()
            .ok_or(RegistrationError::MissingCertificate)?;

        advance(state, RequestState::ValidatingCertificate, &request.agent_id);
        let timeout = self.config.verify_timeout();
        let validated = tokio::time::timeout(timeout, self.validator.validate(certificate, now))
            .await
            .map_err(|_| RegistrationError::VerificationTimeout {
                timeout_ms: self.config.verify_timeout_ms,
            })??;

        advance(state, RequestState::EvaluatingPolicy, &request.agent_id);
        tokio::time::timeout(
            timeout,
            self.engine
                .evaluate(&request.policy, &validated, &request.capabilities, now),
        )
        .await
        .map_err(|_| RegistrationError::VerificationTimeout {
            timeout_ms: self.config.verify_timeout_ms,
        })??;

        advance(state, RequestState::Committing, &request.agent_id);
        let entry = TrustEntry::new(
            request.agent_id.clone(),
            request.capabilities.clone(),
            &validated,
            request.policy.clone(),
            now,
        );
        let replaced = self.commit(entry.clone()).await?;

        advance(state, RequestState::Accepted, &request.agent_id);
        Ok((AgentInfo::from(&entry), replaced.is_some()))
    }

    fn commit_lock(&self, agent_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.commit_locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Write the entry to the registry and discovery index as one unit.
    ///
    /// Runs on a detached task holding the agent's commit lock: a caller
    /// dropping the registration future mid-commit cannot leave the registry
    /// and index disagreeing.
    ///
    /// The precondition check of `max_agents` raced with other admissions
    /// while validation was in flight; the binding decision is made here. A
    /// first insert reserves its slot in `pending_inserts` before the upsert,
    /// so concurrent commits for distinct new ids see each other's claims.
    async fn commit(&self, entry: TrustEntry) -> Result<Option<TrustEntry>, RegistrationError> {
        let guard = self.commit_lock(&entry.agent_id).lock_owned().await;

        let max_agents = self.config.max_agents;
        let reserved = max_agents > 0 && !self.registry.contains(&entry.agent_id) && {
            let mut pending = self.pending_inserts.lock();
            if self.registry.len() + pending.len() >= max_agents {
                return Err(RegistrationError::RegistryFull { limit: max_agents });
            }
            pending.insert(entry.agent_id.clone())
        };

        let registry = Arc::clone(&self.registry);
        let index = Arc::clone(&self.index);
        let pending = Arc::clone(&self.pending_inserts);

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = registry.upsert(entry.clone()).await;
            if reserved {
                // Slot is either backed by the committed entry now or freed
                pending.lock().remove(&entry.agent_id);
            }
            let replaced = result?;
            index.index(&entry);
            Ok::<_, RegistryError>(replaced)
        });

        match task.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(RegistrationError::OperationFailed(format!(
                "commit task failed: {e}"
            ))),
        }
    }

    /// Find up to `top_k` active agents advertising `capability` with a trust
    /// score of at least `min_score`, ranked best first.
    pub fn discover(&self, capability: &str, min_score: u8, top_k: usize) -> Vec<AgentInfo> {
        let now = Utc::now();
        let ids = self
            .index
            .query(capability, min_score, top_k, &self.registry, now);
        let results: Vec<AgentInfo> = ids
            .iter()
            .filter_map(|id| self.registry.get(id, now))
            .filter(|entry| entry.status == EntryStatus::Active)
            .map(|entry| AgentInfo::from(&entry))
            .collect();

        self.stats.lock().queries += 1;
        observability::record_discovery_query(capability, results.len());
        debug!(
            capability = %capability,
            min_score,
            top_k,
            results = results.len(),
            "Discovery query"
        );
        results
    }

    /// Look up a single registered agent
    pub fn agent(&self, agent_id: &str) -> Option<AgentInfo> {
        let now = Utc::now();
        self.registry
            .get(agent_id, now)
            .filter(|entry| entry.status == EntryStatus::Active)
            .map(|entry| AgentInfo::from(&entry))
    }

    /// All active registrations
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        let now = Utc::now();
        self.registry
            .list_active(now)
            .iter()
            .map(AgentInfo::from)
            .collect()
    }

    /// Remove an agent from the registry and discovery index.
    ///
    /// Returns `true` if the agent was registered.
    pub async fn deregister(&self, agent_id: &str) -> Result<bool, RegistrationError> {
        let guard = self.commit_lock(agent_id).lock_owned().await;
        let registry = Arc::clone(&self.registry);
        let index = Arc::clone(&self.index);
        let id = agent_id.to_string();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let removed = registry.remove(&id).await?;
            index.remove(&id);
            Ok::<_, RegistryError>(removed.is_some())
        });

        let removed = match task.await {
            Ok(result) => result?,
            Err(e) => {
                return Err(RegistrationError::OperationFailed(format!(
                    "deregister task failed: {e}"
                )));
            }
        };

        if removed {
            self.audit
                .record(agent_id.to_string(), AuditOutcome::Deregistered, None);
            self.stats.lock().deregistered += 1;
            observability::set_active_agents(self.registry.len());
            info!("Agent '{}' deregistered", agent_id);
        }
        Ok(removed)
    }

    /// Remove expired registrations from the registry and discovery index.
    ///
    /// Expiry is re-checked per agent under its commit lock, so an agent that
    /// refreshed its registration after the scan is left alone. Returns the
    /// ids that were removed.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, RegistrationError> {
        let candidates = self.registry.expired_candidates(now);
        let mut swept = Vec::new();

        for agent_id in candidates {
            let lock = self.commit_lock(&agent_id);
            let _guard = lock.lock().await;

            let still_expired = match self.registry.get(&agent_id, now) {
                Some(entry) => entry.is_expired_at(now),
                None => false,
            };
            if !still_expired {
                continue;
            }

            // Index first: an interrupted sweep must not leave an index entry
            // pointing at a missing registration.
            self.index.remove(&agent_id);
            if self.registry.remove_if_expired(&agent_id, now).await? {
                self.audit
                    .record(agent_id.clone(), AuditOutcome::Swept, None);
                swept.push(agent_id);
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.sweeps += 1;
            stats.swept_entries += swept.len() as u64;
        }
        observability::record_sweep(swept.len());
        observability::set_active_agents(self.registry.len());
        if !swept.is_empty() {
            info!("Expiry sweep removed {} agent(s)", swept.len());
        }
        Ok(swept)
    }

    /// Reload surviving registrations from the backing store and rebuild the
    /// discovery index. Entries already expired are discarded.
    ///
    /// Returns the number of agents restored.
    pub async fn restore(&self) -> Result<usize, RegistrationError> {
        let now = Utc::now();
        let restored = self.registry.restore(now).await?;
        for entry in self.registry.list_active(now) {
            self.index.index(&entry);
        }
        observability::set_active_agents(self.registry.len());
        info!("Restored {} registration(s) from store", restored);
        Ok(restored)
    }
}
