//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use mgmt_server::{ManagementServer, ServerConfig, ServerResult, ServerState};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

pub const API_TOKEN: &str = "integration-token";

/// Config bound to loopback with a keystore inside `dir`.
pub fn config(dir: &Path, plain_port: u16, secure_port: u16) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.listener.plain_port = plain_port;
    config.listener.secure_port = secure_port;
    config.keystore.directory = dir.to_path_buf();
    config.keystore.password = "integration-secret".into();
    config.auth.api_token = Some(API_TOKEN.into());
    config.timeouts.shutdown_grace_secs = 2;
    config
}

/// Run `start()` on a background task and wait until the server is up.
pub async fn spawn_server(server: Arc<ManagementServer>) -> JoinHandle<ServerResult<()>> {
    let mut task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start().await })
    };
    tokio::select! {
        state = server.wait_until_running() => {
            assert_eq!(state, ServerState::Running, "server failed to start");
        }
        result = &mut task => panic!("start returned before the server was running: {result:?}"),
    }
    task
}

/// True when nothing holds `port` on loopback.
pub fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// A generated key with a CSR for `hostname`.
pub fn csr(hostname: &str) -> (rcgen::KeyPair, String) {
    let key = rcgen::KeyPair::generate().unwrap();
    let csr = rcgen::CertificateParams::new(vec![hostname.to_string()])
        .unwrap()
        .serialize_request(&key)
        .unwrap()
        .pem()
        .unwrap();
    (key, csr)
}

pub fn parse_certs(pem: &str) -> Vec<CertificateDer<'static>> {
    rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Client config trusting `ca_pem`, optionally presenting a client identity.
pub fn client_config(
    ca_pem: &str,
    identity: Option<(Vec<CertificateDer<'static>>, &rcgen::KeyPair)>,
) -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in parse_certs(ca_pem) {
        roots.add(cert).unwrap();
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);

    let config = match identity {
        Some((chain, key)) => {
            let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
            builder.with_client_auth_cert(chain, key).unwrap()
        }
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

/// Issue a raw HTTP/1.1 GET over TLS and return the whole response text.
pub async fn tls_get(
    addr: SocketAddr,
    config: Arc<rustls::ClientConfig>,
    path: &str,
) -> std::io::Result<String> {
    let connector = TlsConnector::from(config);
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(name, tcp).await?;

    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    tls.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    match tls.read_to_end(&mut buf).await {
        Ok(_) => {}
        // Peers closing without close_notify still delivered the response.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && !buf.is_empty() => {}
        Err(e) => return Err(e),
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
