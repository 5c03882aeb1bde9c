//! Server state machine cell.
//!
//! # Responsibilities
//! - Hold the single ServerState of the process
//! - Perform transitions atomically (compare-and-swap)
//! - Let other tasks observe and await transitions
//!
//! # Design Decisions
//! - AtomicU8 with Acquire/Release is the source of truth, so `is_running`
//!   never blocks
//! - A watch channel mirrors the value for waiters; it is updated after the
//!   atomic and never consulted for decisions

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use crate::observability::metrics;

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for ServerState {
    fn from(v: u8) -> Self {
        match v {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Shared, atomically updated [`ServerState`].
#[derive(Debug)]
pub struct LifecycleState {
    state: AtomicU8,
    notify: watch::Sender<ServerState>,
}

impl LifecycleState {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(ServerState::Stopped);
        Self {
            state: AtomicU8::new(ServerState::Stopped as u8),
            notify,
        }
    }

    /// Current state.
    pub fn get(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == ServerState::Running
    }

    /// Move from `from` to `to`. On failure returns the actual state.
    pub fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(ServerState::from)?;
        self.publish(from, to);
        Ok(())
    }

    /// Move to `to` regardless of the current state. Returns the previous one.
    pub fn force(&self, to: ServerState) -> ServerState {
        let previous = ServerState::from(self.state.swap(to as u8, Ordering::AcqRel));
        if previous != to {
            self.publish(previous, to);
        }
        previous
    }

    /// Move `Starting` or `Running` to `Stopping`.
    ///
    /// Returns the state that was left, or the current state when no stop is
    /// possible from it.
    pub fn request_stop(&self) -> Result<ServerState, ServerState> {
        loop {
            let current = self.get();
            match current {
                ServerState::Starting | ServerState::Running => {
                    if self.transition(current, ServerState::Stopping).is_ok() {
                        return Ok(current);
                    }
                }
                other => return Err(other),
            }
        }
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    pub async fn wait_for(&self, predicate: impl Fn(ServerState) -> bool) -> ServerState {
        let mut rx = self.notify.subscribe();
        loop {
            let current = self.get();
            if predicate(current) {
                return current;
            }
            // The sender lives in self, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return self.get();
            }
        }
    }

    /// Wait for a start attempt to settle on `Running` or `Stopped`.
    ///
    /// From `Stopped` the next state change marks the attempt as begun; only
    /// a start leaves `Stopped`.
    pub async fn wait_for_start(&self) -> ServerState {
        let mut rx = self.notify.subscribe();
        if self.get() == ServerState::Stopped && rx.changed().await.is_err() {
            return self.get();
        }
        self.wait_for(|s| matches!(s, ServerState::Running | ServerState::Stopped))
            .await
    }

    fn publish(&self, from: ServerState, to: ServerState) {
        self.notify.send_replace(to);
        metrics::set_server_state(to);
        tracing::debug!(%from, %to, "Server state changed");
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}
