//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → owned by the lifecycle coordinator, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is loaded once before start; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CertificateAuthorityConfig, KeystoreConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RecoveryConfig, ServerConfig, StaticContentConfig, StoreType,
    TimeoutConfig,
};
