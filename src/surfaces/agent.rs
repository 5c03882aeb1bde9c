//! Fleet surface (`/agent/*`).
//!
//! Reached only with a verified client certificate; the identity comes from
//! the handshake, never from request content.

use axum::{routing::get, Extension, Json, Router};
use serde::Serialize;

use crate::net::connection::ClientIdentity;

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub identity: Option<String>,
    pub fingerprint: String,
    pub connection: String,
}

pub fn router() -> Router {
    Router::new().route("/status", get(get_status))
}

pub async fn get_status(Extension(identity): Extension<ClientIdentity>) -> Json<AgentStatus> {
    Json(AgentStatus {
        identity: identity.common_name,
        fingerprint: identity.fingerprint,
        connection: identity.connection_id.to_string(),
    })
}
