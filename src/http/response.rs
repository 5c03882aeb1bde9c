//! Error responses produced by the dispatcher.
//!
//! # Design Decisions
//! - Errors are JSON `{ "error": ..., "message": ... }`
//! - 401 responses advertise the bearer scheme

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::security::access_control::Denial;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// JSON error response with the canonical reason as `error`.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: status.canonical_reason().unwrap_or("error"),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// No RouteEntry matched the path.
pub fn not_found(path: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("No surface serves {path}"))
}

/// The matched surface refused the request.
pub fn denied(denial: Denial) -> Response {
    let mut response = error_response(denial.status(), denial.message());
    if denial.status() == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_is_json() {
        let response = not_found("/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["message"], "No surface serves /missing");
    }

    #[test]
    fn unauthorized_advertises_bearer() {
        let response = denied(Denial::MissingCredentials);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let response = denied(Denial::ClientCertificateRequired);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
