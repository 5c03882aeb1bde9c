//! Enrollment surface (`/cert/*`).
//!
//! Reachable without prior trust: new nodes fetch the root here and trade a
//! CSR for a client certificate they then use on the secured listener.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::security::enrollment::{enroll, EnrollmentError, EnrollmentRequest};
use crate::surfaces::SurfaceContext;

#[derive(Debug, Serialize)]
#[serde(tag = "result")]
pub enum EnrollmentResponse {
    #[serde(rename = "OK")]
    Ok { certificate: String, ca: String },
    #[serde(rename = "FAIL")]
    Fail { message: String },
}

pub fn router(context: SurfaceContext) -> Router {
    Router::new()
        .route("/ca", get(get_ca))
        .route("/enroll", post(post_enroll))
        .with_state(context)
}

pub async fn get_ca(State(context): State<SurfaceContext>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/x-pem-file")],
        context.trust.root_certificate_pem().to_string(),
    )
        .into_response()
}

/// Signs with the material the listeners serve, never a later reissue.
pub async fn post_enroll(
    State(context): State<SurfaceContext>,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> (StatusCode, Json<EnrollmentResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Enrollment body rejected");
            return (
                rejection.status(),
                Json(EnrollmentResponse::Fail { message: rejection.body_text() }),
            );
        }
    };
    let passphrase = context.config.auth.enrollment_passphrase.as_deref();
    let organization = &context.config.certificate_authority.organization;

    match enroll(&context.trust, organization, passphrase, &request) {
        Ok(signed) => (
            StatusCode::OK,
            Json(EnrollmentResponse::Ok {
                certificate: signed.certificate_pem,
                ca: signed.ca_certificate_pem,
            }),
        ),
        Err(e) => {
            let status = match &e {
                EnrollmentError::PassphraseMismatch => StatusCode::FORBIDDEN,
                EnrollmentError::InvalidRequest(_) | EnrollmentError::InvalidHostname(_) => StatusCode::BAD_REQUEST,
                EnrollmentError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(hostname = %request.hostname, error = %e, "Enrollment refused");
            (status, Json(EnrollmentResponse::Fail { message: e.to_string() }))
        }
    }
}
