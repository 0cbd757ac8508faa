// observability/mod.rs - Tracing and Metrics

//! Structured tracing and Prometheus metrics for the registration service.
//!
//! Both halves are optional: the service emits `tracing` events and `metrics`
//! samples unconditionally, and they go nowhere until an embedder installs a
//! subscriber and a recorder. Call [`init_tracing`] and [`init_metrics`] once
//! at startup, or wire up your own.
//!
//! ```ignore
//! use poid::observability::{init_tracing, init_metrics, MetricsConfig, TracingConfig};
//!
//! init_tracing(TracingConfig::production());
//! let handle = init_metrics(MetricsConfig::default())?;
//! ```

mod metrics;
mod tracing_setup;

pub use metrics::{
    init_metrics, record_admission_duration, record_discovery_query, record_registration_accepted,
    record_registration_rejected, record_sweep, set_active_agents, DiscoveryMetrics,
    MetricsConfig, MetricsHandle, RegistrationMetrics, SweepMetrics,
};

pub use tracing_setup::{init_tracing, try_init_tracing, TracingConfig, TracingFormat};
