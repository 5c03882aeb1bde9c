//! API surfaces and their static registration.
//!
//! # Data Flow
//! ```text
//! SurfaceContext (built once per start, after trust is ensured)
//!     → api.rs     /api/*    Authenticated
//!     → agent.rs   /agent/*  MutualTls
//!     → cert.rs    /cert/*   Open
//!     → static_files.rs  /*  Open (only when a content root is configured)
//!     → RouteTable (plus extra registrations)
//! ```
//!
//! # Design Decisions
//! - Each surface is its own Router with its own state; none can reach
//!   another surface's handlers
//! - Registration is one explicit call, no discovery

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::lifecycle::recovery::RecoveredState;
use crate::lifecycle::state::LifecycleState;
use crate::routing::{RouteEntry, RouteError, RouteTable};
use crate::security::access_control::AuthPolicy;
use crate::security::authority::TrustMaterial;

pub mod agent;
pub mod api;
pub mod cert;
pub mod static_files;

/// Everything the built-in surfaces read.
#[derive(Clone)]
pub struct SurfaceContext {
    pub config: Arc<ServerConfig>,
    /// Material the listeners of this start were configured from.
    pub trust: Arc<TrustMaterial>,
    pub recovered: Arc<RecoveredState>,
    pub lifecycle: Arc<LifecycleState>,
}

/// Register the built-in surfaces plus `extra` into a RouteTable.
pub fn route_table(context: &SurfaceContext, extra: Vec<RouteEntry>) -> Result<RouteTable, RouteError> {
    let mut entries = vec![
        RouteEntry::new("/api/*", "api", AuthPolicy::Authenticated, api::router(context.clone()))?,
        RouteEntry::new("/agent/*", "agent", AuthPolicy::MutualTls, agent::router())?,
        RouteEntry::new("/cert/*", "cert", AuthPolicy::Open, cert::router(context.clone()))?,
    ];

    match &context.config.static_content.root {
        Some(root) => entries.push(RouteEntry::new("/*", "static", AuthPolicy::Open, static_files::router(root))?),
        None => tracing::debug!("No static content root, unmatched paths return 404"),
    }

    entries.extend(extra);
    RouteTable::new(entries)
}
