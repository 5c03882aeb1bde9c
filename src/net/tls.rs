//! Mutual-TLS configuration for the secured listener.
//!
//! The server presents `[server leaf, root]` from the keystore and verifies
//! clients against the root from the same keystore. Client authentication is
//! mandatory: a handshake without a certificate, or with one that does not
//! chain to the root, is rejected.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum_server::accept::{Accept, DefaultAcceptor};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower_http::add_extension::AddExtension;

use crate::net::connection::{ClientIdentity, ConnectionId};
use crate::net::listener::ListenerError;
use crate::observability::metrics;
use crate::security::keystore::KeystoreMaterial;

/// Build the rustls server config from keystore material.
pub fn mutual_tls_config(
    material: &KeystoreMaterial,
    password: &str,
) -> Result<Arc<rustls::ServerConfig>, ListenerError> {
    let entries = material.open(password)?;
    let chain = entries.server_chain()?;
    let key = entries.server_key()?;

    let mut roots = RootCertStore::empty();
    roots
        .add(entries.trust_anchor()?)
        .map_err(|e| ListenerError::Tls(format!("trust anchor rejected: {e}")))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .map_err(|e| ListenerError::Tls(e.to_string()))?;

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ListenerError::Tls(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|e| ListenerError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::debug!(keystore = %material.path().display(), "Mutual TLS configured");
    Ok(Arc::new(config))
}

/// Acceptor for the secured listener.
///
/// Runs the rustls handshake and attaches the verified [`ClientIdentity`]
/// to every request served on the connection.
#[derive(Clone)]
pub struct MutualTlsAcceptor {
    inner: RustlsAcceptor<DefaultAcceptor>,
}

impl MutualTlsAcceptor {
    pub fn new(config: Arc<rustls::ServerConfig>, handshake_timeout: Duration) -> Self {
        let inner = RustlsAcceptor::new(RustlsConfig::from_config(config)).handshake_timeout(handshake_timeout);
        Self { inner }
    }
}

impl<I, S> Accept<I, S> for MutualTlsAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, ClientIdentity>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = match acceptor.accept(stream, service).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    metrics::record_handshake_failure();
                    tracing::debug!(error = %e, "TLS handshake rejected");
                    return Err(e);
                }
            };

            let connection_id = ConnectionId::new();
            let identity = stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|cert| ClientIdentity::from_certificate(cert, connection_id));

            let Some(identity) = identity else {
                metrics::record_handshake_failure();
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "client presented no certificate",
                ));
            };

            tracing::debug!(
                connection_id = %connection_id,
                client = identity.common_name.as_deref().unwrap_or("-"),
                "Client certificate verified"
            );
            Ok((stream, AddExtension::new(service, identity)))
        })
    }
}
