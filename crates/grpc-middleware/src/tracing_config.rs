//! Process-wide `tracing` setup.
//!
//! Summary records written by [`TracingLogger`](crate::logging::TracingLogger)
//! are ordinary `tracing` events, so this subscriber decides where they go:
//! - Console output (development)
//! - JSON structured logging (production)
//! - OpenTelemetry export via OTLP

use std::str::FromStr;

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::Config;

/// Default service name reported to OpenTelemetry.
pub const DEFAULT_SERVICE_NAME: &str = "grpc-middleware";

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable console output (for development).
    #[default]
    Console,
    /// JSON structured logging (for production).
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(TracingFormat::Console),
            "json" => Ok(TracingFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directives (e.g., "info", "grpc_middleware=debug").
    pub log_level: String,
    pub format: TracingFormat,
    pub service_name: String,
    /// OpenTelemetry OTLP endpoint; export is disabled when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: TracingFormat::Console,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `RUST_LOG`: filter directives (default: "info")
    /// - `GRPC_MW_LOG_FORMAT`: "console" or "json" (default: "console")
    /// - `GRPC_MW_SERVICE_NAME`: service name (default: "grpc-middleware")
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (optional)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            format: var("GRPC_MW_LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.format),
            service_name: var("GRPC_MW_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }

    /// Derive tracing settings from a loaded [`Config`].
    ///
    /// `RUST_LOG`, when set, still takes precedence over the configured level.
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
            format: config.logging.format.parse().unwrap_or_default(),
            service_name: config.tracing.service_name.clone(),
            otlp_endpoint: config.tracing.otlp_endpoint.clone(),
        }
    }
}

/// Initialize the global subscriber.
///
/// Fails if the filter, the OTLP pipeline, or the subscriber installation
/// fails (for instance when a global subscriber is already set).
pub fn init_tracing(config: TracingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.format {
        TracingFormat::Console => fmt::layer()
            .with_target(true)
            .with_file(false)
            .pretty()
            .boxed(),
        TracingFormat::Json => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .boxed(),
    };

    let Some(endpoint) = config.otlp_endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
        tracing::info!("Tracing initialized (OpenTelemetry disabled)");
        return Ok(());
    };

    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
                    "service.name",
                    config.service_name,
                )])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    tracing::info!("Tracing initialized with OpenTelemetry export");
    Ok(())
}

/// Initialize tracing from the environment.
pub fn init_default_tracing() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TracingConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.service_name, "grpc-middleware");
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<TracingFormat>(), Ok(TracingFormat::Json));
        assert_eq!("console".parse::<TracingFormat>(), Ok(TracingFormat::Console));
        assert!("xml".parse::<TracingFormat>().is_err());
    }

    #[test]
    fn test_from_vars() {
        let vars = HashMap::from([
            ("RUST_LOG", "grpc_middleware=debug"),
            ("GRPC_MW_LOG_FORMAT", "json"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        ]);
        let config = TracingConfig::from_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "grpc_middleware=debug");
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(config.service_name, "grpc-middleware");
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.logging.format = "json".to_string();
        config.tracing.service_name = "health".to_string();

        let tracing = TracingConfig::from_config(&config);
        assert_eq!(tracing.format, TracingFormat::Json);
        assert_eq!(tracing.service_name, "health");
        assert!(tracing.otlp_endpoint.is_none());
    }
}
