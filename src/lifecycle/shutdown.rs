//! Drain of serving listeners.
//!
//! Both listeners stop accepting at once, then in-flight connections get the
//! grace period. Failures are collected as `ServerError::Shutdown`, logged,
//! and never stop the drain from reaching the next listener.

use std::time::Duration;

use crate::error::ServerError;
use crate::lifecycle::startup::ServingSet;

/// Extra time over the grace period before a serving task is cancelled.
const JOIN_SLACK: Duration = Duration::from_secs(2);

/// Stop accepting, wait for connections to finish, release the sockets.
pub async fn drain(serving: ServingSet, grace: Duration) -> Vec<ServerError> {
    for listener in &serving.listeners {
        listener.handle.graceful_shutdown(Some(grace));
    }

    let mut errors = Vec::new();
    for mut listener in serving.listeners {
        match tokio::time::timeout(grace + JOIN_SLACK, &mut listener.task).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(listener = %listener.kind, address = %listener.addr, "Listener stopped");
            }
            Ok(Ok(Err(e))) => {
                errors.push(ServerError::Shutdown(format!("{} listener: {e}", listener.kind)));
            }
            Ok(Err(e)) => {
                errors.push(ServerError::Shutdown(format!("{} listener task: {e}", listener.kind)));
            }
            Err(_) => {
                listener.handle.shutdown();
                listener.task.abort();
                errors.push(ServerError::Shutdown(format!(
                    "{} listener did not stop within {:?}",
                    listener.kind,
                    grace + JOIN_SLACK
                )));
            }
        }
    }

    for error in &errors {
        tracing::error!(error = %error, "Shutdown error");
    }
    errors
}
