use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;

use super::AppConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "wiki-api", version, about = "Instrumented wiki server")]
pub struct Cli {
    /// Path to configuration file, replaces config/default.toml
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Environment name
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Directory holding page files
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// OTLP collector endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Load configuration from the process arguments and environment
pub fn load_config() -> Result<AppConfig> {
    load_config_with(&Cli::parse())
}

/// Layered configuration, lowest priority first:
///
/// 1. embedded defaults
/// 2. `config/default.toml` (or `--config`)
/// 3. `config/{environment}.toml`
/// 4. `APP_`-prefixed environment variables, `__` separating sections
/// 5. command line flags
pub fn load_config_with(cli: &Cli) -> Result<AppConfig> {
    let env_name = cli
        .environment
        .clone()
        .or_else(|| std::env::var("ENVIRONMENT").ok())
        .unwrap_or_else(|| "development".to_string());

    let base_file = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config/default.toml"));

    let mut figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(base_file))
        .merge(Toml::file(format!("config/{}.toml", env_name)))
        .merge(Env::prefixed("APP_").split("__"))
        .merge(Serialized::default("environment", &env_name));

    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if let Some(data_dir) = &cli.data_dir {
        figment = figment.merge(Serialized::default("storage.data_dir", data_dir));
    }
    if let Some(endpoint) = &cli.otlp_endpoint {
        figment = figment.merge(Serialized::default("telemetry.otlp_endpoint", endpoint));
    }
    if cli.debug {
        figment = figment.merge(Serialized::default("logging.level", "debug"));
    }

    let config: AppConfig = figment.extract()?;

    config.validate()?;

    Ok(config)
}
