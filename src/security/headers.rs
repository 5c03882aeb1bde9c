//! Security response headers.
//!
//! # Responsibilities
//! - Add `X-Content-Type-Options: nosniff` and `X-Frame-Options: DENY`
//! - Mark responses of authenticated surfaces as non-cacheable
//!
//! # Design Decisions
//! - Headers a surface already set are left alone

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// Wrap `router` with the hardening headers applied to every listener.
pub fn with_security_headers(router: Router) -> Router {
    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Wrap a credentialed surface so its responses are never cached.
pub fn with_no_store(router: Router) -> Router {
    router.layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    ))
}
