//! Application state recovery.
//!
//! The first step of every start: the coordinator awaits the external state
//! store before any trust or listener work happens. The store is a
//! collaborator behind [`StateRecovery`]; two implementations ship here.

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

/// Error type for state recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("failed to read state snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state snapshot {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Application state handed to the surfaces after recovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveredState {
    /// True when no persisted state existed.
    pub first_boot: bool,
    /// Recovered document; `null` on first boot.
    pub document: serde_json::Value,
}

impl RecoveredState {
    pub fn empty() -> Self {
        Self {
            first_boot: true,
            document: serde_json::Value::Null,
        }
    }
}

/// External state store consulted at the start of every start.
pub trait StateRecovery: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn recover(&self) -> BoxFuture<'_, Result<RecoveredState, RecoveryError>>;
}

/// Store with nothing to recover.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRecovery;

impl StateRecovery for EmptyRecovery {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn recover(&self) -> BoxFuture<'_, Result<RecoveredState, RecoveryError>> {
        Box::pin(async { Ok(RecoveredState::empty()) })
    }
}

/// Store backed by a JSON snapshot file; a missing file means first boot.
#[derive(Debug, Clone)]
pub struct SnapshotRecovery {
    path: PathBuf,
}

impl SnapshotRecovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateRecovery for SnapshotRecovery {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn recover(&self) -> BoxFuture<'_, Result<RecoveredState, RecoveryError>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!(path = %self.path.display(), "No state snapshot, first boot");
                    return Ok(RecoveredState::empty());
                }
                Err(source) => {
                    return Err(RecoveryError::Io {
                        path: self.path.clone(),
                        source,
                    })
                }
            };

            let document = serde_json::from_slice(&bytes).map_err(|source| RecoveryError::Malformed {
                path: self.path.clone(),
                source,
            })?;

            Ok(RecoveredState {
                first_boot: false,
                document,
            })
        })
    }
}
