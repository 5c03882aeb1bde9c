//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid and distinct)
//! - Check keystore layout (directory + bare file name)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::ServerConfig;

/// A single semantic violation in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable reason.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_host", "must not be empty"));
    }
    if listener.plain_port == 0 {
        errors.push(ValidationError::new("listener.plain_port", "must be a fixed port"));
    }
    if listener.secure_port == 0 {
        errors.push(ValidationError::new("listener.secure_port", "must be a fixed port"));
    }
    if listener.plain_port == listener.secure_port {
        errors.push(ValidationError::new(
            "listener.secure_port",
            format!("must differ from plain_port ({})", listener.plain_port),
        ));
    }
    if listener.handshake_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.handshake_timeout_secs", "must be > 0"));
    }

    let keystore = &config.keystore;
    if keystore.directory.as_os_str().is_empty() {
        errors.push(ValidationError::new("keystore.directory", "must not be empty"));
    }
    if keystore.name.trim().is_empty() {
        errors.push(ValidationError::new("keystore.name", "must not be empty"));
    } else if Path::new(&keystore.name).file_name().and_then(|n| n.to_str()) != Some(keystore.name.as_str()) {
        errors.push(ValidationError::new("keystore.name", "must be a bare file name"));
    }
    if keystore.password.is_empty() {
        errors.push(ValidationError::new("keystore.password", "must not be empty"));
    }

    let ca = &config.certificate_authority;
    if ca.common_name.trim().is_empty() {
        errors.push(ValidationError::new("certificate_authority.common_name", "must not be empty"));
    }
    if ca.organization.trim().is_empty() {
        errors.push(ValidationError::new("certificate_authority.organization", "must not be empty"));
    }
    if ca.server_names.is_empty() {
        errors.push(ValidationError::new("certificate_authority.server_names", "at least one name is required"));
    }
    if ca.server_names.iter().any(|name| name.trim().is_empty()) {
        errors.push(ValidationError::new("certificate_authority.server_names", "names must not be empty"));
    }

    if matches!(config.auth.api_token.as_deref(), Some(token) if token.trim().is_empty()) {
        errors.push(ValidationError::new("auth.api_token", "must not be empty when set"));
    }
    if matches!(config.auth.enrollment_passphrase.as_deref(), Some(pass) if pass.is_empty()) {
        errors.push(ValidationError::new("auth.enrollment_passphrase", "must not be empty when set"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.shutdown_grace_secs == 0 {
        errors.push(ValidationError::new("timeouts.shutdown_grace_secs", "must be > 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
