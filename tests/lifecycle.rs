//! Lifecycle tests: start/stop ordering, state conflicts and socket release.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use mgmt_server::lifecycle::{RecoveredState, RecoveryError, StateRecovery};
use mgmt_server::routing::RouteEntry;
use mgmt_server::security::{AuthPolicy, TrustError};
use mgmt_server::{ManagementServer, ServerError, ServerState};

mod common;

#[tokio::test]
async fn start_then_stop_releases_both_ports() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(ManagementServer::builder(common::config(dir.path(), 38101, 38102)).build().unwrap());

    let task = common::spawn_server(Arc::clone(&server)).await;
    assert!(server.is_running());
    let bound = server.bound_addrs().unwrap();
    assert_eq!(bound.plain.port(), 38101);
    assert_eq!(bound.secure.port(), 38102);
    assert!(!common::port_is_free(38101));

    server.stop().await.unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!server.is_running());
    assert!(server.bound_addrs().is_none());
    assert!(common::port_is_free(38101));
    assert!(common::port_is_free(38102));
}

#[tokio::test]
async fn first_start_generates_trust_material() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path(), 38103, 38104);
    let keystore = config.keystore.keystore_path();
    assert!(!keystore.exists());

    let server = Arc::new(ManagementServer::builder(config).build().unwrap());
    let task = common::spawn_server(Arc::clone(&server)).await;

    assert!(keystore.exists());
    assert_eq!(server.authority().generation_count(), 1);

    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_start_is_a_state_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(ManagementServer::builder(common::config(dir.path(), 38105, 38106)).build().unwrap());
    let task = common::spawn_server(Arc::clone(&server)).await;

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::StateConflict { operation: "start", state: ServerState::Running }
    ));
    // Still serving on the original sockets.
    assert!(server.is_running());
    assert_eq!(server.bound_addrs().unwrap().plain.port(), 38105);

    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_while_stopped_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = ManagementServer::builder(common::config(dir.path(), 38107, 38108)).build().unwrap();

    let err = server.stop().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::StateConflict { operation: "stop", state: ServerState::Stopped }
    ));
}

#[tokio::test]
async fn server_can_restart_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(ManagementServer::builder(common::config(dir.path(), 38109, 38110)).build().unwrap());

    let task = common::spawn_server(Arc::clone(&server)).await;
    server.stop().await.unwrap();
    task.await.unwrap().unwrap();

    let task = common::spawn_server(Arc::clone(&server)).await;
    // Trust material was loaded, not regenerated.
    assert_eq!(server.authority().generation_count(), 1);
    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn duplicate_prefix_fails_before_any_bind() {
    let dir = tempfile::tempdir().unwrap();
    let duplicate = RouteEntry::new("/api/*", "duplicate", AuthPolicy::Open, Router::new()).unwrap();
    let server = ManagementServer::builder(common::config(dir.path(), 38111, 38112))
        .route(duplicate)
        .build()
        .unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::RouteConflict(_)));
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(common::port_is_free(38111));
    assert!(common::port_is_free(38112));
}

#[tokio::test]
async fn occupied_secure_port_aborts_start_and_frees_plain_port() {
    let dir = tempfile::tempdir().unwrap();
    let _occupied = std::net::TcpListener::bind(("127.0.0.1", 38114)).unwrap();
    let server = ManagementServer::builder(common::config(dir.path(), 38113, 38114)).build().unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::ListenerBind(_)));
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(common::port_is_free(38113));
}

struct FailingRecovery;

impl StateRecovery for FailingRecovery {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn recover(&self) -> BoxFuture<'_, Result<RecoveredState, RecoveryError>> {
        Box::pin(async {
            Err(RecoveryError::Io {
                path: "state.json".into(),
                source: std::io::Error::other("store offline"),
            })
        })
    }
}

#[tokio::test]
async fn failed_recovery_aborts_before_trust_and_binds() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path(), 38115, 38116);
    let keystore = config.keystore.keystore_path();
    let server = ManagementServer::builder(config)
        .recovery(Arc::new(FailingRecovery))
        .build()
        .unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Recovery(_)));
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!keystore.exists());
    assert!(common::port_is_free(38115));
}

#[tokio::test]
async fn nested_extra_route_wins_over_api_surface() {
    let dir = tempfile::tempdir().unwrap();
    let v2 = RouteEntry::new(
        "/api/v2/*",
        "api-v2",
        AuthPolicy::Authenticated,
        Router::new().route("/ping", get(|| async { "pong" })),
    )
    .unwrap();
    let server = Arc::new(
        ManagementServer::builder(common::config(dir.path(), 38117, 38118))
            .route(v2)
            .build()
            .unwrap(),
    );
    let task = common::spawn_server(Arc::clone(&server)).await;

    let client = reqwest::Client::new();
    let res = client
        .get("http://127.0.0.1:38117/api/v2/ping")
        .bearer_auth(common::API_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "pong");

    let res = client.get("http://127.0.0.1:38117/api/v2/ping").send().await.unwrap();
    assert_eq!(res.status(), 401);

    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn root_cannot_be_reissued_while_serving() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(ManagementServer::builder(common::config(dir.path(), 38119, 38120)).build().unwrap());
    let task = common::spawn_server(Arc::clone(&server)).await;

    assert!(matches!(server.authority().reissue(), Err(TrustError::InUse)));

    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
    assert!(server.authority().reissue().is_ok());
}

/// Recovery that blocks until released.
struct GatedRecovery {
    gate: Arc<Notify>,
}

impl StateRecovery for GatedRecovery {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn recover(&self) -> BoxFuture<'_, Result<RecoveredState, RecoveryError>> {
        Box::pin(async move {
            self.gate.notified().await;
            Ok(RecoveredState::empty())
        })
    }
}

fn gated_server(dir: &std::path::Path, plain: u16, secure: u16) -> (Arc<ManagementServer>, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let server = ManagementServer::builder(common::config(dir, plain, secure))
        .recovery(Arc::new(GatedRecovery { gate: Arc::clone(&gate) }))
        .build()
        .unwrap();
    (Arc::new(server), gate)
}

async fn wait_for_state(server: &ManagementServer, state: ServerState) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while server.state() != state {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn start_while_starting_is_a_state_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let (server, gate) = gated_server(dir.path(), 38121, 38122);

    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start().await })
    };
    wait_for_state(&server, ServerState::Starting).await;

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::StateConflict { operation: "start", state: ServerState::Starting }
    ));

    gate.notify_one();
    let state = server.wait_until_running().await;
    assert_eq!(state, ServerState::Running);
    server.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_during_start_aborts_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (server, gate) = gated_server(dir.path(), 38123, 38124);
    let keystore = common::config(dir.path(), 38123, 38124).keystore.keystore_path();

    let starter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start().await })
    };
    wait_for_state(&server, ServerState::Starting).await;

    let stopper = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.stop().await })
    };
    wait_for_state(&server, ServerState::Stopping).await;
    gate.notify_one();

    stopper.await.unwrap().unwrap();
    starter.await.unwrap().unwrap();

    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.bound_addrs().is_none());
    assert!(!keystore.exists());
    assert!(common::port_is_free(38123));
    assert!(common::port_is_free(38124));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_keystore_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path(), 38125, 38125);
    let keystore = config.keystore.keystore_path();

    match ManagementServer::builder(config).build() {
        Ok(_) => panic!("ports that collide must not build"),
        Err(e) => assert!(e.to_string().contains("listener.secure_port"), "unexpected error: {e}"),
    }
    assert!(!keystore.exists());
}
