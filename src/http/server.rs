//! Per-listener HTTP application.
//!
//! # Responsibilities
//! - Create the Axum Router each listener serves
//! - Wire up middleware (tracing, request ID, timeout, security headers)
//! - Dispatch every request through the RouteTable
//! - Enforce the matched surface's AuthPolicy before the surface runs
//!
//! # Design Decisions
//! - One catch-all handler; surfaces are nested Routers called with the
//!   prefix stripped, so a surface only ever sees its own paths
//! - Both listeners share the same RouteTable; only the connection
//!   (client identity present or not) differs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{Request, Uri},
    response::Response,
    routing::any,
    Router,
};
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;

use crate::http::request::{request_id, with_request_tracing};
use crate::http::response;
use crate::net::listener::ListenerKind;
use crate::observability::metrics;
use crate::routing::{RoutePrefix, RouteTable};
use crate::security::access_control::Authorizer;
use crate::security::headers::with_security_headers;

/// State of the dispatch handler.
#[derive(Clone)]
pub struct DispatchState {
    pub listener: ListenerKind,
    pub table: Arc<RouteTable>,
    pub authorizer: Authorizer,
}

/// Build the application served by one listener.
#[allow(deprecated)]
pub fn listener_app(state: DispatchState, request_timeout: Duration) -> Router {
    let router = Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout));

    with_security_headers(with_request_tracing(router))
}

/// Make-service handed to the serving runtime.
pub fn into_make_service(
    app: Router,
) -> axum::extract::connect_info::IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    app.into_make_service_with_connect_info::<SocketAddr>()
}

/// Route, authorize and forward one request.
async fn dispatch(State(state): State<DispatchState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();

    let Some(entry) = state.table.lookup(&path) else {
        tracing::debug!(listener = %state.listener, path, "No route matched");
        let response = response::not_found(&path);
        metrics::record_request("none", response.status().as_u16(), started.elapsed());
        return response;
    };

    if let Err(denial) = state.authorizer.authorize(entry.policy(), &request) {
        tracing::warn!(
            listener = %state.listener,
            surface = entry.surface(),
            path,
            request_id = request_id(&request).unwrap_or("-"),
            reason = denial.message(),
            "Request denied"
        );
        let response = response::denied(denial);
        metrics::record_request(entry.surface(), response.status().as_u16(), started.elapsed());
        return response;
    }

    let request = strip_prefix(request, entry.prefix());
    let response = match entry.service().clone().oneshot(request).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };

    tracing::debug!(
        listener = %state.listener,
        surface = entry.surface(),
        status = response.status().as_u16(),
        "Request served"
    );
    metrics::record_request(entry.surface(), response.status().as_u16(), started.elapsed());
    response
}

/// Rewrite the request URI to the path below `prefix`, keeping the query.
fn strip_prefix(mut request: Request<Body>, prefix: &RoutePrefix) -> Request<Body> {
    let original = request.uri().clone();
    let Some(rest) = prefix.strip(original.path()) else {
        return request;
    };

    let path_and_query = match original.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };
    match Uri::builder().path_and_query(path_and_query).build() {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => {
            tracing::debug!(error = %e, uri = %original, "Keeping unstripped URI");
            return request;
        }
    }

    if request.extensions().get::<OriginalUri>().is_none() {
        request.extensions_mut().insert(OriginalUri(original));
    }
    request
}
