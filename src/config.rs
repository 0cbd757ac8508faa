// config.rs - Service Configuration

//! Configuration for the PoID service.
//!
//! Settings are layered: built-in defaults, then an optional config file,
//! then `POID_`-prefixed environment variables. Later layers win.
//!
//! # Example
//!
//! ```ignore
//! use poid::config::PoidConfig;
//!
//! // Defaults only
//! let config = PoidConfig::default();
//!
//! // Defaults + file + environment
//! let config = PoidConfig::load(Some("/etc/poid/poid.toml"))?;
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::AuditLog;
use crate::policy::Policy;

/// Errors raised while loading or checking configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the registration service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoidConfig {
    /// Maximum number of registered agents (0 = unlimited)
    pub max_agents: usize,

    /// Maximum capabilities a single agent may declare (0 = unlimited)
    pub max_capabilities_per_agent: usize,

    /// Agent identifiers that may never be registered
    pub reserved_agent_ids: HashSet<String>,

    /// Upper bound for certificate validation and policy evaluation, in milliseconds
    pub verify_timeout_ms: u64,

    /// Interval between background expiry sweeps, in seconds
    pub sweep_interval_secs: u64,

    /// Number of audit records retained in memory
    pub audit_capacity: usize,

    /// Admission policies registered at startup, in addition to the built-ins.
    ///
    /// Defaults to empty: the defaults layer serializes through the `config`
    /// crate, which drops empty arrays, so the field must tolerate absence.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl Default for PoidConfig {
    fn default() -> Self {
        let mut reserved = HashSet::new();
        reserved.insert("poid".to_string());
        reserved.insert("registry".to_string());
        reserved.insert("discovery".to_string());

        Self {
            max_agents: 0,
            max_capabilities_per_agent: 64,
            reserved_agent_ids: reserved,
            verify_timeout_ms: 5_000,
            sweep_interval_secs: 60,
            audit_capacity: AuditLog::DEFAULT_CAPACITY,
            policies: Vec::new(),
        }
    }
}

impl PoidConfig {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// Environment variables use the `POID_` prefix, e.g. `POID_MAX_AGENTS=100`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&PoidConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings: PoidConfig = builder
            .add_source(
                config::Environment::with_prefix("POID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings for values that would misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "verify_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.audit_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "audit_capacity must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            if policy.name.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "policy names must not be empty".to_string(),
                ));
            }
            if !seen.insert(policy.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate policy name '{}'",
                    policy.name
                )));
            }
        }

        Ok(())
    }

    /// Validation/evaluation timeout as a [`Duration`]
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    /// Sweep interval as a [`Duration`]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
