//! Serving steps of the start sequence.
//!
//! # Responsibilities
//! - Turn bound listener sockets into serving tasks
//! - Attach the mutual-TLS acceptor to the secured listener
//! - Request a stop if a serving task ends on its own
//!
//! # Design Decisions
//! - Sockets are bound before this point, so serving cannot fail on bind
//! - Each listener gets its own `axum_server::Handle` for independent drain

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::http::server::into_make_service;
use crate::lifecycle::state::LifecycleState;
use crate::net::listener::{BoundListener, ListenerKind};
use crate::net::tls::MutualTlsAcceptor;

/// One listener that is accepting connections.
#[derive(Debug)]
pub struct ServingListener {
    pub kind: ListenerKind,
    pub addr: SocketAddr,
    pub handle: Handle,
    pub task: JoinHandle<io::Result<()>>,
}

/// All serving listeners of one start.
#[derive(Debug, Default)]
pub struct ServingSet {
    pub listeners: Vec<ServingListener>,
}

impl ServingSet {
    /// Stop accepting immediately and cancel the serving tasks.
    pub fn abort(self) {
        for listener in self.listeners {
            listener.handle.shutdown();
            listener.task.abort();
        }
    }
}

/// Serve `app` on the plain listener.
pub fn serve_plain(bound: BoundListener, app: Router, state: Arc<LifecycleState>) -> ServingListener {
    let kind = bound.spec().kind;
    let addr = bound.local_addr();
    let handle = Handle::new();

    let server = axum_server::from_tcp(bound.into_socket()).handle(handle.clone());
    let task = tokio::spawn(supervise(kind, state, async move {
        server.serve(into_make_service(app)).await
    }));

    tracing::info!(listener = %kind, address = %addr, "Serving");
    ServingListener {
        kind,
        addr,
        handle,
        task,
    }
}

/// Serve `app` on the secured listener behind mutual TLS.
pub fn serve_secure(
    bound: BoundListener,
    app: Router,
    tls: Arc<rustls::ServerConfig>,
    handshake_timeout: Duration,
    state: Arc<LifecycleState>,
) -> ServingListener {
    let kind = bound.spec().kind;
    let addr = bound.local_addr();
    let handle = Handle::new();

    let server = axum_server::from_tcp(bound.into_socket())
        .acceptor(MutualTlsAcceptor::new(tls, handshake_timeout))
        .handle(handle.clone());
    let task = tokio::spawn(supervise(kind, state, async move {
        server.serve(into_make_service(app)).await
    }));

    tracing::info!(listener = %kind, address = %addr, "Serving with mutual TLS");
    ServingListener {
        kind,
        addr,
        handle,
        task,
    }
}

/// Run a serving future; if it ends while the server should be running, ask
/// the coordinator to stop.
async fn supervise(
    kind: ListenerKind,
    state: Arc<LifecycleState>,
    serving: impl std::future::Future<Output = io::Result<()>>,
) -> io::Result<()> {
    let result = serving.await;
    if state.request_stop().is_ok() {
        match &result {
            Ok(()) => tracing::error!(listener = %kind, "Listener exited unexpectedly"),
            Err(e) => tracing::error!(listener = %kind, error = %e, "Listener failed"),
        }
    }
    result
}
