//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (longest-prefix lookup)
//!     → matcher.rs (segment-wise prefix test)
//!     → Return: matched RouteEntry or NoMatch
//!
//! Route Registration (at startup):
//!     RouteEntry[]
//!     → Parse patterns
//!     → Reject identical prefixes
//!     → Sort by specificity
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable while running
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Most specific prefix wins, regardless of registration order

pub mod matcher;
pub mod router;

pub use matcher::RoutePrefix;
pub use router::{RouteEntry, RouteError, RouteTable};
