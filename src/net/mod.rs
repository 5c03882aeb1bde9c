//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → listener.rs (ListenerSpec per listener, bind)
//!     → tls.rs (secured listener only: mutual TLS from keystore material)
//!     → connection.rs (ConnectionId, verified ClientIdentity)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Binding failures are fatal and never retried
//! - The secured listener fails closed on missing or unverifiable client certs
//! - Keystore and truststore are the same CA-derived material

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ClientIdentity, ConnectionId};
pub use listener::{bind, BoundListener, ListenerError, ListenerKind, ListenerSpec};
pub use tls::{mutual_tls_config, MutualTlsAcceptor};
