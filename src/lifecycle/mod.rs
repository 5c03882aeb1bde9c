//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (coordinator.rs):
//!     Stopped → Starting
//!     → recovery.rs (await persisted state)
//!     → CA manager (ensure root)
//!     → RouteTable (register surfaces)
//!     → bind plain, bind secured
//!     → startup.rs (serve both) → Running → park
//!
//! Stop (coordinator.rs, shutdown.rs):
//!     Running|Starting → Stopping → stop accepting → drain → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Stop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing secured binds before trust exists
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: tasks are cancelled after the grace period

pub mod coordinator;
pub mod recovery;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use coordinator::{BoundAddrs, ManagementServer, ManagementServerBuilder};
pub use recovery::{EmptyRecovery, RecoveredState, RecoveryError, SnapshotRecovery, StateRecovery};
pub use state::{LifecycleState, ServerState};
