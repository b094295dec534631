//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_HTTP_ADDR: &str = "USER_SERVICE_HTTP_ADDR";
pub const ENV_RPC_ADDR: &str = "USER_SERVICE_RPC_ADDR";
pub const ENV_DRAIN_TIMEOUT_SECS: &str = "USER_SERVICE_DRAIN_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "USER_SERVICE_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value '{value}' for {var}")]
    Override { var: &'static str, value: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };
    let config = apply_overrides(config, |var| std::env::var(var).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `USER_SERVICE_*` overrides using `lookup` to read variables.
pub fn apply_overrides<F>(mut config: ServiceConfig, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup(ENV_HTTP_ADDR) {
        config.http.bind_address = addr;
    }
    if let Some(addr) = lookup(ENV_RPC_ADDR) {
        config.rpc.bind_address = addr;
    }
    if let Some(value) = lookup(ENV_DRAIN_TIMEOUT_SECS) {
        config.shutdown.drain_timeout_secs = value.parse().map_err(|_| ConfigError::Override {
            var: ENV_DRAIN_TIMEOUT_SECS,
            value,
        })?;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.observability.log_level = level;
    }
    Ok(config)
}
