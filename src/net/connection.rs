//! Per-connection identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry the verified client certificate of a secured connection into
//!   request extensions

use std::sync::atomic::{AtomicU64, Ordering};

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity established by a completed mutual-TLS handshake.
///
/// Only constructed by the secured listener after rustls verified the chain,
/// so its presence in request extensions is itself the authentication proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Subject common name, when the certificate carries one.
    pub common_name: Option<String>,
    /// Hex SHA-256 of the client certificate DER.
    pub fingerprint: String,
    /// Connection the certificate was presented on.
    pub connection_id: ConnectionId,
}

impl ClientIdentity {
    pub fn from_certificate(certificate: &CertificateDer<'_>, connection_id: ConnectionId) -> Self {
        let common_name = x509_parser::parse_x509_certificate(certificate.as_ref())
            .ok()
            .and_then(|(_, cert)| {
                cert.subject()
                    .iter_common_name()
                    .next()
                    .and_then(|cn| cn.as_str().ok())
                    .map(str::to_string)
            });

        Self {
            common_name,
            fingerprint: hex::encode(Sha256::digest(certificate.as_ref())),
            connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert_ne!(id1.to_string(), id2.to_string());
    }

    #[test]
    fn identity_reads_common_name() {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["node-1.example".to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "node-1.example");
        let cert = params.self_signed(&key).unwrap();

        let identity = ClientIdentity::from_certificate(cert.der(), ConnectionId::new());
        assert_eq!(identity.common_name.as_deref(), Some("node-1.example"));
        assert_eq!(identity.fingerprint.len(), 64);
    }

    #[test]
    fn unparseable_certificate_has_no_common_name() {
        let der = CertificateDer::from(vec![0x30, 0x00]);
        let identity = ClientIdentity::from_certificate(&der, ConnectionId::new());
        assert_eq!(identity.common_name, None);
    }
}
