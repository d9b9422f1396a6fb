//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{MonitorError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__WEBHOOKS__SIGNAL_STATS`)
/// 2. Configuration file (TOML format)
/// 3. Default values
///
/// A `.env` file in the working directory is read first, if present.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| MonitorError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| MonitorError::Configuration(e.to_string()))
}

/// Parse configuration from a TOML string, without environment overrides
pub fn load_from_str(toml: &str) -> Result<AppConfig> {
    Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| MonitorError::Configuration(e.to_string()))
}
