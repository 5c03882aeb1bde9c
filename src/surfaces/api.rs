//! Operator surface (`/api/*`).

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::lifecycle::recovery::RecoveredState;
use crate::lifecycle::state::ServerState;
use crate::security::headers::with_no_store;
use crate::surfaces::SurfaceContext;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub version: &'static str,
    pub state: ServerState,
    pub plain_port: u16,
    pub secure_port: u16,
    pub ca_fingerprint: String,
    pub first_boot: bool,
}

pub fn router(context: SurfaceContext) -> Router {
    with_no_store(
        Router::new()
            .route("/status", get(get_status))
            .route("/state", get(get_state))
            .with_state(context),
    )
}

pub async fn get_status(State(context): State<SurfaceContext>) -> Json<ServerStatus> {
    Json(ServerStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: context.lifecycle.get(),
        plain_port: context.config.listener.plain_port,
        secure_port: context.config.listener.secure_port,
        ca_fingerprint: context.trust.fingerprint().to_string(),
        first_boot: context.recovered.first_boot,
    })
}

pub async fn get_state(State(context): State<SurfaceContext>) -> Json<RecoveredState> {
    Json(RecoveredState::clone(&context.recovered))
}
