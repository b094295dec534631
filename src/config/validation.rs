//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, limits > 0)
//! - Detect the two listeners claiming the same address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every error found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let http_addr = check_address("http.bind_address", &config.http.bind_address, &mut errors);
    let rpc_addr = check_address("rpc.bind_address", &config.rpc.bind_address, &mut errors);
    if let (Some(http), Some(rpc)) = (http_addr, rpc_addr) {
        if http.port() != 0 && http == rpc {
            errors.push(ValidationError::new(
                "rpc.bind_address",
                format!("conflicts with http.bind_address ({http})"),
            ));
        }
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be > 0"));
    }
    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be > 0"));
    }
    if config.http.max_connections == 0 {
        errors.push(ValidationError::new("http.max_connections", "must be > 0"));
    }
    if config.rpc.max_connections == 0 {
        errors.push(ValidationError::new("rpc.max_connections", "must be > 0"));
    }
    if config.rpc.max_frame_bytes == 0 {
        errors.push(ValidationError::new("rpc.max_frame_bytes", "must be > 0"));
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.drain_timeout_secs", "must be > 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            errors.push(ValidationError::new(field, format!("'{value}' is not a socket address: {e}")));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ServiceConfig::default();
        config.http.bind_address = "not-an-address".into();
        config.shutdown.drain_timeout_secs = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "http.bind_address",
                "shutdown.drain_timeout_secs",
                "observability.log_level"
            ]
        );
    }

    #[test]
    fn listeners_must_not_share_an_address() {
        let mut config = ServiceConfig::default();
        config.rpc.bind_address = config.http.bind_address.clone();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "rpc.bind_address");
    }

    #[test]
    fn ephemeral_ports_may_repeat() {
        let mut config = ServiceConfig::default();
        config.http.bind_address = "127.0.0.1:0".into();
        config.rpc.bind_address = "127.0.0.1:0".into();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
