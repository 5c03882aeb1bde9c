//! Management server core.
//!
//! Stands up a plain listener and a mutual-TLS listener, bootstraps the
//! server's own certificate authority before the secured listener opens,
//! and dispatches requests to isolated surfaces by longest path prefix.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;
pub mod surfaces;

pub use config::schema::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use lifecycle::{ManagementServer, ServerState};
