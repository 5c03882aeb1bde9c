//! Top-level error taxonomy for the management server.
//!
//! Startup errors unwind the whole `start()` call and reach the process entry
//! point. Shutdown errors are only ever logged.

use thiserror::Error;

use crate::lifecycle::recovery::RecoveryError;
use crate::lifecycle::state::ServerState;
use crate::net::listener::ListenerError;
use crate::routing::RouteError;
use crate::security::authority::TrustError;

/// Errors surfaced by the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Root certificate generation, load or validation failed.
    #[error("trust initialization failed: {0}")]
    TrustInitialization(#[from] TrustError),

    /// A listener could not be configured or bound.
    #[error("listener bind failed: {0}")]
    ListenerBind(#[from] ListenerError),

    /// The route table could not be built.
    #[error("route registration failed: {0}")]
    RouteConflict(#[from] RouteError),

    /// Lifecycle operation invoked from a state that does not allow it.
    #[error("cannot {operation} while server is {state}")]
    StateConflict {
        operation: &'static str,
        state: ServerState,
    },

    /// Persisted application state could not be recovered.
    #[error("state recovery failed: {0}")]
    Recovery(#[from] RecoveryError),

    /// Releasing listener resources failed.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for lifecycle operations.
pub type ServerResult<T> = Result<T, ServerError>;
