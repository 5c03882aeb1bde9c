//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (plain or secured listener)
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, request span)
//!     → server.rs dispatch (RouteTable lookup, AuthPolicy, prefix strip)
//!     → surface Router
//!     → response.rs (JSON errors for no-match and denials)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use server::{listener_app, DispatchState};
