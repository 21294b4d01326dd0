//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Endpoint and address parseability
//! - Value ranges (intervals and limits above zero)
//! - Existence of configured filesystem paths; a missing certificate or
//!   document root is fatal at startup
//!
//! Returns every error found, not just the first.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::transport::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a valid tcp endpoint: {value}")]
    InvalidEndpoint { field: &'static str, value: String },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("{field} does not exist: {path}")]
    MissingPath { field: &'static str, path: PathBuf },
}

/// Pure semantic pass over a deserialized config.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_endpoint(&mut errors, "backend.query_endpoint", &config.backend.query_endpoint);
    check_endpoint(
        &mut errors,
        "backend.heartbeat_endpoint",
        &config.backend.heartbeat_endpoint,
    );

    check_address(&mut errors, "web.bind_address", &config.web.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_nonzero(&mut errors, "backend.poll_interval_ms", config.backend.poll_interval_ms);
    check_nonzero(
        &mut errors,
        "backend.heartbeat_interval_ms",
        config.backend.heartbeat_interval_ms,
    );
    check_nonzero(
        &mut errors,
        "backend.send_queue_depth",
        config.backend.send_queue_depth as u64,
    );
    check_nonzero(
        &mut errors,
        "backend.max_message_length",
        config.backend.max_message_length as u64,
    );
    check_nonzero(&mut errors, "web.max_connections", config.web.max_connections as u64);
    check_nonzero(
        &mut errors,
        "web.max_incoming_frame_length",
        config.web.max_incoming_frame_length as u64,
    );

    check_path(
        &mut errors,
        "backend.server_certificate",
        config.backend.server_certificate.as_deref(),
    );
    check_path(
        &mut errors,
        "backend.client_certificates_path",
        config.backend.client_certificates_path.as_deref(),
    );
    check_path(
        &mut errors,
        "backend.client_certificate",
        config.backend.client_certificate.as_deref(),
    );
    check_path(&mut errors, "web.document_root", config.web.document_root.as_deref());

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<Endpoint>().is_err() {
        errors.push(ValidationError::InvalidEndpoint {
            field,
            value: value.to_string(),
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::ZeroValue { field });
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, path: Option<&Path>) {
    if let Some(path) = path {
        if !path.exists() {
            errors.push(ValidationError::MissingPath {
                field,
                path: path.to_path_buf(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.backend.query_endpoint = "not an endpoint".into();
        config.backend.poll_interval_ms = 0;
        config.web.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroValue {
            field: "backend.poll_interval_ms"
        }));
    }

    #[test]
    fn missing_document_root_is_fatal() {
        let mut config = GatewayConfig::default();
        config.web.document_root = Some("/definitely/not/a/real/path".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::MissingPath {
                field: "web.document_root",
                ..
            }
        ));
    }
}
