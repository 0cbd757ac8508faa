// observability/metrics.rs - Prometheus Metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for metrics
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to expose metrics endpoint
    pub listen_addr: SocketAddr,

    /// Histogram buckets for admission latency (in seconds)
    pub admission_buckets: Vec<f64>,

    /// Histogram buckets for discovery result counts
    pub result_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".parse().unwrap(),
            admission_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
            result_buckets: vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0],
        }
    }
}

/// Handle to the Prometheus metrics exporter
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Registration-related metrics
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    pub const ACCEPTED_TOTAL: &'static str = "poid_registrations_accepted_total";
    pub const REJECTED_TOTAL: &'static str = "poid_registrations_rejected_total";
    pub const ACTIVE_AGENTS: &'static str = "poid_agents_active";
    pub const ADMISSION_SECONDS: &'static str = "poid_admission_seconds";
}

/// Discovery-related metrics
pub struct DiscoveryMetrics;

impl DiscoveryMetrics {
    pub const QUERIES_TOTAL: &'static str = "poid_discovery_queries_total";
    pub const RESULT_COUNT: &'static str = "poid_discovery_result_count";
}

/// Expiry sweep metrics
pub struct SweepMetrics;

impl SweepMetrics {
    pub const SWEEPS_TOTAL: &'static str = "poid_sweeps_total";
    pub const SWEPT_ENTRIES_TOTAL: &'static str = "poid_swept_entries_total";
}

/// Initialize the metrics system
///
/// Starts an HTTP server on the configured address to expose Prometheus metrics.
/// Returns a handle that can be used to render metrics programmatically.
pub fn init_metrics(config: MetricsConfig) -> Result<MetricsHandle, Box<dyn std::error::Error>> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                RegistrationMetrics::ADMISSION_SECONDS.into(),
            ),
            &config.admission_buckets,
        )?
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(DiscoveryMetrics::RESULT_COUNT.into()),
            &config.result_buckets,
        )?;

    let handle = builder.install_recorder()?;
    let metrics_handle = MetricsHandle {
        handle: handle.clone(),
    };

    // Start HTTP server for metrics endpoint
    let listen_addr = config.listen_addr;
    let shared_handle = std::sync::Arc::new(handle);

    tokio::spawn(async move {
        use axum::{http::StatusCode, routing::get, Json, Router};
        use serde::Serialize;

        #[derive(Serialize)]
        struct HealthResponse {
            status: &'static str,
            version: &'static str,
            uptime_secs: u64,
        }

        let start_time = std::time::Instant::now();

        let handle_for_route = shared_handle.clone();
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let h = handle_for_route.clone();
                    async move { h.render() }
                }),
            )
            .route(
                "/health",
                get(move || {
                    let uptime = start_time.elapsed().as_secs();
                    async move {
                        Json(HealthResponse {
                            status: "healthy",
                            version: env!("CARGO_PKG_VERSION"),
                            uptime_secs: uptime,
                        })
                    }
                }),
            )
            .route("/ready", get(|| async { StatusCode::OK }))
            .route("/live", get(|| async { StatusCode::OK }));

        match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => {
                tracing::info!(addr = %listen_addr, "Metrics HTTP server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, addr = %listen_addr, "Failed to bind metrics server");
            }
        }
    });

    // Register metric descriptions
    describe_counter!(
        RegistrationMetrics::ACCEPTED_TOTAL,
        "Total number of registrations accepted"
    );
    describe_counter!(
        RegistrationMetrics::REJECTED_TOTAL,
        "Total number of registrations rejected"
    );
    describe_gauge!(
        RegistrationMetrics::ACTIVE_AGENTS,
        "Current number of registered agents"
    );
    describe_histogram!(
        RegistrationMetrics::ADMISSION_SECONDS,
        "End-to-end admission latency in seconds"
    );

    describe_counter!(
        DiscoveryMetrics::QUERIES_TOTAL,
        "Total number of discovery queries"
    );
    describe_histogram!(
        DiscoveryMetrics::RESULT_COUNT,
        "Number of agents returned per discovery query"
    );

    describe_counter!(SweepMetrics::SWEEPS_TOTAL, "Total number of expiry sweeps");
    describe_counter!(
        SweepMetrics::SWEPT_ENTRIES_TOTAL,
        "Total number of expired entries removed by sweeps"
    );

    tracing::info!(addr = %config.listen_addr, "Metrics initialized");

    // Record initial metrics to ensure something is always visible
    gauge!(RegistrationMetrics::ACTIVE_AGENTS).set(0.0);

    Ok(metrics_handle)
}

// Recording functions

/// Record an accepted registration
pub fn record_registration_accepted(policy: &str, replaced: bool) {
    counter!(
        RegistrationMetrics::ACCEPTED_TOTAL,
        "policy" => policy.to_string(),
        "replaced" => replaced.to_string()
    )
    .increment(1);
}

/// Record a rejected registration
pub fn record_registration_rejected(reason: &str) {
    counter!(
        RegistrationMetrics::REJECTED_TOTAL,
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record end-to-end admission latency
pub fn record_admission_duration(duration: Duration, outcome: &str) {
    histogram!(
        RegistrationMetrics::ADMISSION_SECONDS,
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Update the active agent gauge
pub fn set_active_agents(count: usize) {
    gauge!(RegistrationMetrics::ACTIVE_AGENTS).set(count as f64);
}

/// Record a discovery query and its result count
pub fn record_discovery_query(capability: &str, results: usize) {
    counter!(
        DiscoveryMetrics::QUERIES_TOTAL,
        "capability" => capability.to_string()
    )
    .increment(1);
    histogram!(DiscoveryMetrics::RESULT_COUNT).record(results as f64);
}

/// Record an expiry sweep
pub fn record_sweep(removed: usize) {
    counter!(SweepMetrics::SWEEPS_TOTAL).increment(1);
    if removed > 0 {
        counter!(SweepMetrics::SWEPT_ENTRIES_TOTAL).increment(removed as u64);
    }
}
