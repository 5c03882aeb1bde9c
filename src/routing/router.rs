//! Route table and longest-prefix lookup.
//!
//! # Responsibilities
//! - Store registered RouteEntries
//! - Reject identical prefixes at construction time
//! - Look up the most specific entry for a request path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Sorted once by specificity; lookup is a linear scan
//! - Registration order never affects matching
//! - Explicit no-match (`None`) rather than silent default

use std::fmt;

use thiserror::Error;

use crate::routing::matcher::RoutePrefix;
use crate::security::access_control::AuthPolicy;

/// Error type for route registration.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route prefix '{prefix}' is registered more than once")]
    Conflict { prefix: String },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },
}

/// One surface mounted under a path prefix.
#[derive(Clone)]
pub struct RouteEntry {
    prefix: RoutePrefix,
    surface: String,
    policy: AuthPolicy,
    service: axum::Router,
}

impl RouteEntry {
    pub fn new(
        pattern: &str,
        surface: impl Into<String>,
        policy: AuthPolicy,
        service: axum::Router,
    ) -> Result<Self, RouteError> {
        Ok(Self {
            prefix: RoutePrefix::parse(pattern)?,
            surface: surface.into(),
            policy,
            service,
        })
    }

    pub fn prefix(&self) -> &RoutePrefix {
        &self.prefix
    }

    /// Surface name, used in logs and metric labels.
    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    /// Handlers of the surface, routed on the path below the prefix.
    pub fn service(&self) -> &axum::Router {
        &self.service
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("prefix", &self.prefix.pattern())
            .field("surface", &self.surface)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Immutable set of RouteEntries ordered by specificity.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Validate and freeze `entries`.
    pub fn new(entries: Vec<RouteEntry>) -> Result<Self, RouteError> {
        let mut entries = entries;
        // Equal bases end up adjacent.
        entries.sort_by(|a, b| {
            b.prefix
                .specificity()
                .cmp(&a.prefix.specificity())
                .then_with(|| a.prefix.base().cmp(b.prefix.base()))
        });

        if let Some(pair) = entries
            .windows(2)
            .find(|pair| pair[0].prefix.base() == pair[1].prefix.base())
        {
            return Err(RouteError::Conflict {
                prefix: pair[1].prefix.pattern().to_string(),
            });
        }

        for entry in &entries {
            tracing::debug!(
                prefix = %entry.prefix,
                surface = %entry.surface,
                policy = ?entry.policy,
                "Route registered"
            );
        }

        Ok(Self { entries })
    }

    /// Most specific entry matching `path`.
    pub fn lookup(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.prefix.matches(path))
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
