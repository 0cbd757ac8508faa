// observability/tracing_setup.rs - Tracing Configuration

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Tracing output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// Single-line output for terminals and CI logs
    Compact,
    /// JSON for log aggregation
    Json,
}

/// Configuration for the tracing subscriber.
///
/// The filter string follows `tracing_subscriber::EnvFilter` syntax; a
/// `RUST_LOG` environment variable overrides it when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter directives, e.g. "info,poid=debug"
    pub filter: String,

    /// Output format
    pub format: TracingFormat,

    /// Emit span open/close events (useful when timing admissions)
    pub span_events: bool,

    /// ANSI colors in the output
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info,poid=debug".into(),
            format: TracingFormat::Pretty,
            span_events: false,
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// JSON output at info level, for deployed services
    pub fn production() -> Self {
        Self {
            filter: "info".into(),
            format: TracingFormat::Json,
            span_events: false,
            ansi: false,
        }
    }

    /// Verbose pretty output with span timings, for local work
    pub fn development() -> Self {
        Self {
            filter: "debug,poid=trace".into(),
            format: TracingFormat::Compact,
            span_events: true,
            ansi: true,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global tracing subscriber, failing if one is already set.
///
/// Embedders that install their own subscriber can skip this entirely; the
/// crate only emits events and never requires its own subscriber.
pub fn try_init_tracing(config: &TracingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let base = fmt::layer()
        .with_span_events(config.span_events())
        .with_ansi(config.ansi);

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.format {
        TracingFormat::Pretty => registry.with(base).try_init()?,
        TracingFormat::Compact => registry.with(base.compact()).try_init()?,
        TracingFormat::Json => registry.with(base.json()).try_init()?,
    }

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

/// Install the global tracing subscriber, panicking if one is already set.
/// Call once at startup.
pub fn init_tracing(config: TracingConfig) {
    try_init_tracing(&config).expect("tracing subscriber already installed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert!(config.filter.contains("poid=debug"));
        assert_eq!(config.format, TracingFormat::Pretty);
        assert!(config.ansi);
    }

    #[test]
    fn test_presets() {
        let prod = TracingConfig::production();
        assert_eq!(prod.format, TracingFormat::Json);
        assert!(!prod.ansi);

        let dev = TracingConfig::development();
        assert!(dev.span_events);
        assert!(dev.filter.contains("poid=trace"));
    }

    #[test]
    fn test_format_from_config_string() {
        let format: TracingFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, TracingFormat::Json);
        assert_eq!(serde_json::to_string(&TracingFormat::Compact).unwrap(), r#""compact""#);
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        // Whichever test initializes first wins; the second must error,
        // not panic.
        let config = TracingConfig::default();
        let _ = try_init_tracing(&config);
        assert!(try_init_tracing(&config).is_err());
    }
}
