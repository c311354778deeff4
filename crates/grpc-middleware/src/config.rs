//! Configuration management for the gRPC middleware.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with GRPC_MW_ prefix)
//! 3. .env files
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use crate::logging::{
    CallLabels, LogOption, duration_to_duration_field, duration_to_time_millis_field,
    with_duration_field,
};

/// Complete middleware configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// gRPC server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Call logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Rate limiter configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// gRPC server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0:50051")
    #[serde(default = "default_grpc_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_grpc_address(),
        }
    }
}

/// Which field the call duration is logged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationField {
    /// `grpc.time_ms`, fractional milliseconds
    TimeMs,
    /// `grpc.duration`, native duration
    Duration,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Value of the `system` field
    #[serde(default = "default_system")]
    pub system: String,

    /// Value of `span.kind` on server calls
    #[serde(default = "default_server_kind")]
    pub server_kind: String,

    /// Value of `span.kind` on client calls
    #[serde(default = "default_client_kind")]
    pub client_kind: String,

    /// Duration field of summary records
    #[serde(default = "default_duration_field")]
    pub duration_field: DurationField,

    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            system: default_system(),
            server_kind: default_server_kind(),
            client_kind: default_client_kind(),
            duration_field: default_duration_field(),
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// The identity labels attached to every call.
    pub fn labels(&self) -> CallLabels {
        CallLabels {
            system: self.system.clone(),
            server_kind: self.server_kind.clone(),
            client_kind: self.client_kind.clone(),
        }
    }

    /// The option selecting the configured duration field.
    pub fn duration_option(&self) -> LogOption {
        match self.duration_field {
            DurationField::TimeMs => with_duration_field(duration_to_time_millis_field),
            DurationField::Duration => with_duration_field(duration_to_duration_field),
        }
    }
}

/// Distributed tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// OTLP endpoint (e.g., "<http://localhost:4317>")
    pub otlp_endpoint: Option<String>,

    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

/// Token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bucket size, i.e. the largest burst admitted
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens added per second
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_capacity(),
            refill_per_second: default_refill_per_second(),
        }
    }
}

/// Authentication settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected authorization scheme
    #[serde(default = "default_auth_scheme")]
    pub scheme: String,

    /// Static token; authentication is disabled when unset (set via GRPC_MW_AUTH_TOKEN)
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme: default_auth_scheme(),
            token: None,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("scheme", &self.scheme)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// Default value functions
fn default_grpc_address() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_system() -> String {
    "grpc".to_string()
}

fn default_server_kind() -> String {
    "server".to_string()
}

fn default_client_kind() -> String {
    "client".to_string()
}

fn default_duration_field() -> DurationField {
    DurationField::TimeMs
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_service_name() -> String {
    "grpc-middleware".to_string()
}

fn default_capacity() -> u32 {
    100
}

fn default_refill_per_second() -> f64 {
    100.0
}

fn default_auth_scheme() -> String {
    "bearer".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        Config::default().merge_env()
    }

    /// Load configuration with the following precedence:
    /// 1. Load .env file if it exists
    /// 2. Load from file if provided
    /// 3. Apply environment variable overrides
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = if let Some(path) = config_file {
            Self::from_file(path)?
        } else {
            Config::default()
        };

        let config = config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into this configuration.
    ///
    /// Only variables that are set override the current values.
    fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        // Server
        if let Some(v) = var("GRPC_MW_ADDRESS") {
            self.server.address = v;
        }

        // Logging
        if let Some(v) = var("GRPC_MW_SYSTEM") {
            self.logging.system = v;
        }
        if let Some(v) = var("GRPC_MW_DURATION_FIELD") {
            match v.as_str() {
                "time_ms" => self.logging.duration_field = DurationField::TimeMs,
                "duration" => self.logging.duration_field = DurationField::Duration,
                other => tracing::warn!(value = %other, "Ignoring unknown GRPC_MW_DURATION_FIELD"),
            }
        }
        if let Some(v) = var("GRPC_MW_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("GRPC_MW_LOG_FORMAT") {
            self.logging.format = v;
        }

        // Tracing
        if let Some(v) = var("GRPC_MW_SERVICE_NAME") {
            self.tracing.service_name = v;
        }
        if let Some(v) = var("GRPC_MW_OTLP_ENDPOINT") {
            self.tracing.otlp_endpoint = Some(v);
        }

        // Rate limit
        if let Some(v) = var("GRPC_MW_RATE_LIMIT_ENABLED") {
            if let Ok(val) = v.parse() {
                self.rate_limit.enabled = val;
            }
        }
        if let Some(v) = var("GRPC_MW_RATE_LIMIT_CAPACITY") {
            if let Ok(val) = v.parse() {
                self.rate_limit.capacity = val;
            }
        }
        if let Some(v) = var("GRPC_MW_RATE_LIMIT_REFILL") {
            if let Ok(val) = v.parse() {
                self.rate_limit.refill_per_second = val;
            }
        }

        // Auth
        if let Some(v) = var("GRPC_MW_AUTH_SCHEME") {
            self.auth.scheme = v;
        }
        if let Some(v) = var("GRPC_MW_AUTH_TOKEN") {
            self.auth.token = Some(v);
        }

        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grpc_address()?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }

        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        if self.logging.system.is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.system must not be empty".to_string(),
            ));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.capacity == 0 {
                return Err(ConfigError::ValidationError(
                    "rate_limit.capacity must be greater than 0".to_string(),
                ));
            }
            if !self.rate_limit.refill_per_second.is_finite()
                || self.rate_limit.refill_per_second <= 0.0
            {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid rate_limit.refill_per_second: {}",
                    self.rate_limit.refill_per_second
                )));
            }
        }

        if self.auth.scheme.is_empty() || self.auth.scheme.contains(' ') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid auth scheme: {:?}",
                self.auth.scheme
            )));
        }
        if let Some(ref token) = self.auth.token {
            if token.is_empty() {
                return Err(ConfigError::ValidationError(
                    "auth.token must not be empty; omit the field to disable authentication"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get the parsed gRPC server address.
    pub fn grpc_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server.address.parse().map_err(|_| {
            ConfigError::ValidationError(format!("Invalid server address: {}", self.server.address))
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
