use std::collections::BTreeMap;
use std::path::PathBuf;

use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
pub struct AppConfig {
    #[garde(dive)]
    #[serde(default)]
    pub server: ServerConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub storage: StorageConfig,

    #[garde(dive)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[garde(skip)]
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[garde(dive)]
    #[serde(default)]
    pub profiling: ProfilingConfig,

    #[garde(skip)]
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[garde(range(min = 1024, max = 65535))]
    pub port: u16,

    #[garde(length(min = 1), custom(validate_bind_address))]
    #[serde(default = "default_bind")]
    pub bind: String,

    #[garde(range(min = 1, max = 300))]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64, // seconds allowed to drain in-flight requests
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: default_bind(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Where page files live
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    #[garde(custom(validate_data_dir))]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

/// How the tracer provider is assembled
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TracerStrategy {
    /// Exporter built straight from the endpoint, channel connects lazily
    #[default]
    Direct,
    /// Channel dialed up front with a connect timeout
    Dialed,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct TelemetryConfig {
    #[garde(skip)]
    pub enabled: bool,

    #[garde(length(min = 1))]
    pub service_name: String,

    #[garde(length(min = 1))]
    pub application: String,

    /// `host:port`, or a full `http(s)://` URI
    #[garde(length(min = 1))]
    pub otlp_endpoint: String,

    /// Plaintext gRPC for bare `host:port` endpoints
    #[garde(skip)]
    pub insecure: bool,

    #[garde(skip)]
    pub strategy: TracerStrategy,

    #[garde(range(min = 1, max = 60))]
    pub connect_timeout_secs: u64,

    #[garde(range(min = 1, max = 120))]
    pub export_timeout_secs: u64,

    #[garde(range(min = 1, max = 120))]
    pub shutdown_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "gowiki".to_string(),
            application: "fosscomm2023".to_string(),
            otlp_endpoint: "opentelemetry-collector:4317".to_string(),
            insecure: true,
            strategy: TracerStrategy::Direct,
            connect_timeout_secs: 5,
            export_timeout_secs: 10,
            shutdown_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve the Prometheus registry at `/metrics`
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ProfilingConfig {
    #[garde(skip)]
    pub enabled: bool,

    #[garde(pattern(r"^https?://[^\s/]+"))]
    pub server_address: String,

    #[garde(length(min = 1))]
    pub application_name: String,

    /// Samples per second
    #[garde(range(min = 1, max = 1000))]
    pub sample_rate: u32,

    #[garde(skip)]
    pub tags: BTreeMap<String, String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(
            "hostname".to_string(),
            std::env::var("HOSTNAME").unwrap_or_default(),
        );

        Self {
            enabled: false,
            server_address: "http://pyroscope:4040".to_string(),
            application_name: "gowiki".to_string(),
            sample_rate: 100,
            tags,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

fn validate_bind_address(value: &str, _: &()) -> garde::Result {
    value
        .parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid IP address"))
}

fn validate_data_dir(value: &PathBuf, _: &()) -> garde::Result {
    if value.as_os_str().is_empty() {
        return Err(garde::Error::new("data directory must not be empty"));
    }
    Ok(())
}
