//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the management server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Plain and secured listener settings.
    pub listener: ListenerConfig,

    /// Keystore location and protection.
    pub keystore: KeystoreConfig,

    /// Identity of the self-issued certificate authority.
    pub certificate_authority: CertificateAuthorityConfig,

    /// Credentials for the operator and enrollment surfaces.
    pub auth: AuthConfig,

    /// Static content fallback.
    pub static_content: StaticContentConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Application state recovery.
    pub recovery: RecoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host both listeners bind to (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Port of the unauthenticated listener.
    pub plain_port: u16,

    /// Port of the mutual-TLS listener.
    pub secure_port: u16,

    /// Upper bound for a TLS handshake on the secured listener.
    pub handshake_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            plain_port: 4080,
            secure_port: 8443,
            handshake_timeout_secs: 10,
        }
    }
}

/// Container formats understood by the keystore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// PEM sections sealed in a JSON envelope.
    #[default]
    Pem,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::Pem => write!(f, "pem"),
        }
    }
}

/// Keystore configuration.
///
/// The keystore doubles as the truststore: the server presents and verifies
/// against the same root.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Directory holding the keystore file.
    pub directory: PathBuf,

    /// Keystore file name inside `directory`.
    pub name: String,

    /// Shared password protecting key and trust material.
    pub password: String,

    /// Container format.
    pub store_type: StoreType,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/var/lib/mgmt-server/keys"),
            name: "keystore.json".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            password: "CHANGE_ME_IN_PRODUCTION".to_string(),
            store_type: StoreType::Pem,
        }
    }
}

impl KeystoreConfig {
    /// Full path of the keystore file.
    pub fn keystore_path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    /// Full path of the truststore file (same file as the keystore).
    pub fn truststore_path(&self) -> PathBuf {
        self.keystore_path()
    }
}

/// Subject and SAN settings for the generated certificates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertificateAuthorityConfig {
    /// Common name of the root certificate.
    pub common_name: String,

    /// Organization of the root and issued certificates.
    pub organization: String,

    /// DNS names or IP addresses the secured listener answers to.
    pub server_names: Vec<String>,
}

impl Default for CertificateAuthorityConfig {
    fn default() -> Self {
        Self {
            common_name: "Management Server Root CA".to_string(),
            organization: "mgmt-server".to_string(),
            server_names: vec!["localhost".to_string(), "127.0.0.1".to_string()],
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token required by the operator surface. Unset closes the
    /// operator surface entirely.
    pub api_token: Option<String>,

    /// Shared secret required to enroll a new client identity.
    pub enrollment_passphrase: Option<String>,
}

/// Static content configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StaticContentConfig {
    /// Directory served for requests no API surface claims.
    pub root: Option<PathBuf>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time given to in-flight requests when stopping.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Where persisted application state is recovered from.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RecoveryConfig {
    /// JSON snapshot of the application state.
    pub snapshot_path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
