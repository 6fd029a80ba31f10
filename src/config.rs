use crate::messaging::MessagingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which binary is loading the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Publishes content events
    Content,
    /// Consumes content events
    Analytics,
}

impl ServiceRole {
    pub fn default_service_name(&self) -> &'static str {
        match self {
            ServiceRole::Content => "content-service",
            ServiceRole::Analytics => "analytics-service",
        }
    }

    pub fn default_http_port(&self) -> u16 {
        match self {
            ServiceRole::Content => 3001,
            ServiceRole::Analytics => 3002,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Service identity
    pub service: ServiceConfig,

    /// Messaging configuration
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Event query configuration
    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration: role defaults, then the embedded defaults file,
    /// then `path` if given, then `EVENT_PIPELINE__*` environment variables.
    pub fn load(role: ServiceRole, path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("service.name", role.default_service_name())?
            .set_default("server.http_port", i64::from(role.default_http_port()))?
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix("EVENT_PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Address the HTTP server binds to
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    pub http_port: u16,

    /// Upper bound on broker disconnect during shutdown (milliseconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name stamped as `source` on published events
    pub name: String,

    /// Environment tag sent with published events
    #[serde(default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Events returned by `/events` when no limit is given
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_query_limit() -> usize {
    crate::state::DEFAULT_QUERY_LIMIT
}
