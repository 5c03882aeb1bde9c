//! Server lifecycle coordinator.
//!
//! # Responsibilities
//! - Own the ServerConfig, the CA manager and the single ServerState
//! - Sequence start: recover state → ensure root → register routes →
//!   bind plain → bind secured → serve
//! - Sequence stop: stop accepting → drain → release sockets
//!
//! # Design Decisions
//! - `start()` parks its caller until the server is stopped
//! - `stop()` is called from another task and waits for `Stopped`
//! - Any start failure reverts to `Stopped` with no socket left open
//! - Routes are registered before the first bind so a conflict never
//!   leaves a half-open listener

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::http::server::{listener_app, DispatchState};
use crate::lifecycle::recovery::{EmptyRecovery, SnapshotRecovery, StateRecovery};
use crate::lifecycle::shutdown;
use crate::lifecycle::startup::{self, ServingSet};
use crate::lifecycle::state::{LifecycleState, ServerState};
use crate::net::listener::{self, ListenerKind, ListenerSpec};
use crate::net::tls::mutual_tls_config;
use crate::routing::RouteEntry;
use crate::security::access_control::Authorizer;
use crate::security::authority::CertificateAuthority;
use crate::surfaces::{self, SurfaceContext};

/// Addresses of both listeners while they are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub plain: std::net::SocketAddr,
    pub secure: std::net::SocketAddr,
}

/// Builder for [`ManagementServer`].
pub struct ManagementServerBuilder {
    config: ServerConfig,
    authority: Option<Arc<CertificateAuthority>>,
    recovery: Option<Arc<dyn StateRecovery>>,
    routes: Vec<RouteEntry>,
}

impl ManagementServerBuilder {
    /// Use an existing CA manager (e.g. one already warmed up by the caller).
    pub fn authority(mut self, authority: Arc<CertificateAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn recovery(mut self, recovery: Arc<dyn StateRecovery>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Register an additional RouteEntry next to the built-in surfaces.
    pub fn route(mut self, entry: RouteEntry) -> Self {
        self.routes.push(entry);
        self
    }

    pub fn build(self) -> Result<ManagementServer, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let authority = self
            .authority
            .unwrap_or_else(|| Arc::new(CertificateAuthority::from_config(&self.config)));
        let recovery = self.recovery.unwrap_or_else(|| match &self.config.recovery.snapshot_path {
            Some(path) => Arc::new(SnapshotRecovery::new(path.clone())),
            None => Arc::new(EmptyRecovery),
        });

        Ok(ManagementServer {
            config: Arc::new(self.config),
            authority,
            recovery,
            routes: self.routes,
            state: Arc::new(LifecycleState::new()),
            bound: Mutex::new(None),
        })
    }
}

/// The management server: two listeners, three surfaces, one root of trust.
pub struct ManagementServer {
    config: Arc<ServerConfig>,
    authority: Arc<CertificateAuthority>,
    recovery: Arc<dyn StateRecovery>,
    routes: Vec<RouteEntry>,
    state: Arc<LifecycleState>,
    bound: Mutex<Option<BoundAddrs>>,
}

impl ManagementServer {
    pub fn builder(config: ServerConfig) -> ManagementServerBuilder {
        ManagementServerBuilder {
            config,
            authority: None,
            recovery: None,
            routes: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.authority
    }

    /// Non-blocking; safe from any task or thread.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Listener addresses while bound.
    pub fn bound_addrs(&self) -> Option<BoundAddrs> {
        self.bound.lock().ok().and_then(|bound| *bound)
    }

    /// Wait for a start to settle: `Running`, or `Stopped` if it gave up.
    ///
    /// While `Stopped` this first waits for a start to begin, so it can be
    /// called right after spawning `start()`.
    pub async fn wait_until_running(&self) -> ServerState {
        self.state.wait_for_start().await
    }

    /// Start the server and serve until stopped.
    ///
    /// Valid only from `Stopped`. Returns `Ok(())` once a stop completed, or
    /// the first startup error after reverting to `Stopped`.
    pub async fn start(&self) -> ServerResult<()> {
        self.state
            .transition(ServerState::Stopped, ServerState::Starting)
            .map_err(|state| ServerError::StateConflict {
                operation: "start",
                state,
            })?;
        tracing::info!(
            plain_port = self.config.listener.plain_port,
            secure_port = self.config.listener.secure_port,
            "Server starting"
        );

        let mut guard = StartGuard {
            state: &self.state,
            bound: &self.bound,
            serving: None,
        };
        let result = self.run(&mut guard).await;
        drop(guard);

        match &result {
            Ok(()) => tracing::info!("Server stopped"),
            Err(e) => tracing::error!(error = %e, "Server start failed"),
        }
        result
    }

    /// Stop a starting or running server and wait for `Stopped`.
    pub async fn stop(&self) -> ServerResult<()> {
        let left = self.state.request_stop().map_err(|state| ServerError::StateConflict {
            operation: "stop",
            state,
        })?;
        tracing::info!(from = %left, "Server stopping");

        self.state.wait_for(|s| s == ServerState::Stopped).await;
        Ok(())
    }

    async fn run(&self, guard: &mut StartGuard<'_>) -> ServerResult<()> {
        // 1. Persisted application state.
        tracing::debug!(store = self.recovery.name(), "Recovering state");
        let recovered = self.recovery.recover().await?;
        if self.stop_requested("state recovery") {
            return Ok(());
        }

        // 2. Root of trust, pinned against reissue until this start ends.
        let lease = self.authority.lease()?;
        let trust = Arc::clone(lease.material());
        if self.stop_requested("trust initialization") {
            return Ok(());
        }

        // 3. Route registration.
        let context = SurfaceContext {
            config: Arc::clone(&self.config),
            trust,
            recovered: Arc::new(recovered),
            lifecycle: Arc::clone(&self.state),
        };
        let table = Arc::new(surfaces::route_table(&context, self.routes.clone())?);
        for entry in table.entries() {
            tracing::debug!(
                prefix = entry.prefix().pattern(),
                surface = entry.surface(),
                policy = ?entry.policy(),
                "Route registered"
            );
        }
        if self.config.auth.api_token.is_none() {
            tracing::warn!("No api_token configured; /api rejects every request");
        }

        // 4. Plain listener.
        let plain = listener::bind(&ListenerSpec::plain(&self.config))?;

        // 5. Secured listener from CA-derived material.
        let material = self.authority.materialize_keystore()?;
        let tls = mutual_tls_config(&material, &self.config.keystore.password)?;
        let secure = listener::bind(&ListenerSpec::secure(&self.config))?;

        if let Ok(mut bound) = self.bound.lock() {
            *bound = Some(BoundAddrs {
                plain: plain.local_addr(),
                secure: secure.local_addr(),
            });
        }
        if self.stop_requested("listener bind") {
            return Ok(());
        }

        // 6. Serve.
        let authorizer = Authorizer::new(self.config.auth.api_token.clone());
        let request_timeout = Duration::from_secs(self.config.timeouts.request_secs);
        let app_for = |kind| {
            listener_app(
                DispatchState {
                    listener: kind,
                    table: Arc::clone(&table),
                    authorizer: authorizer.clone(),
                },
                request_timeout,
            )
        };

        let serving = ServingSet {
            listeners: vec![
                startup::serve_plain(plain, app_for(ListenerKind::Plain), Arc::clone(&self.state)),
                startup::serve_secure(
                    secure,
                    app_for(ListenerKind::Secure),
                    tls,
                    Duration::from_secs(self.config.listener.handshake_timeout_secs),
                    Arc::clone(&self.state),
                ),
            ],
        };
        guard.serving = Some(serving);

        if self.state.transition(ServerState::Starting, ServerState::Running).is_ok() {
            tracing::info!("Server running");
            self.state.wait_for(|s| s == ServerState::Stopping).await;
        }

        if let Some(serving) = guard.serving.take() {
            let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
            let errors = shutdown::drain(serving, grace).await;
            if !errors.is_empty() {
                tracing::warn!(count = errors.len(), "Shutdown completed with errors");
            }
        }
        drop(lease);
        Ok(())
    }

    fn stop_requested(&self, step: &'static str) -> bool {
        let stopping = self.state.get() == ServerState::Stopping;
        if stopping {
            tracing::info!(after = step, "Start aborted by stop request");
        }
        stopping
    }
}

/// Reverts to `Stopped` when `start()` finishes or its future is dropped.
struct StartGuard<'a> {
    state: &'a LifecycleState,
    bound: &'a Mutex<Option<BoundAddrs>>,
    serving: Option<ServingSet>,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if let Some(serving) = self.serving.take() {
            serving.abort();
        }
        if let Ok(mut bound) = self.bound.lock() {
            *bound = None;
        }
        self.state.force(ServerState::Stopped);
    }
}
