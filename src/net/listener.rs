//! Listener Set: declarative listener specs and port binding.
//!
//! # Responsibilities
//! - Derive the plain and secured listener specs from configuration
//! - Bind each spec to its port, failing fast (no retries)
//!
//! # Design Decisions
//! - `require_client_auth` is not configurable: it is true for the secured
//!   listener and false for the plain one
//! - Sockets are bound with std and handed to the serving runtime afterwards,
//!   so a bind failure surfaces before anything starts accepting

use std::fmt;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use thiserror::Error;

use crate::config::ServerConfig;
use crate::security::keystore::KeystoreError;

/// Error type for listener configuration and binding.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secured listener keystore unusable: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("TLS configuration rejected: {0}")]
    Tls(String),
}

/// Which of the two listeners a spec describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Plain,
    Secure,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Plain => "plain",
            ListenerKind::Secure => "secure",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub kind: ListenerKind,
    pub host: String,
    pub port: u16,
    pub require_client_auth: bool,
}

impl ListenerSpec {
    pub fn plain(config: &ServerConfig) -> Self {
        Self {
            kind: ListenerKind::Plain,
            host: config.listener.bind_host.clone(),
            port: config.listener.plain_port,
            require_client_auth: false,
        }
    }

    pub fn secure(config: &ServerConfig) -> Self {
        Self {
            kind: ListenerKind::Secure,
            host: config.listener.bind_host.clone(),
            port: config.listener.secure_port,
            require_client_auth: true,
        }
    }

    fn display_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A bound, not yet serving, listener socket.
#[derive(Debug)]
pub struct BoundListener {
    spec: ListenerSpec,
    socket: TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    pub fn spec(&self) -> &ListenerSpec {
        &self.spec
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_socket(self) -> TcpListener {
        self.socket
    }
}

/// Bind the socket described by `spec`.
pub fn bind(spec: &ListenerSpec) -> Result<BoundListener, ListenerError> {
    let bind_error = |source| ListenerError::Bind {
        addr: spec.display_addr(),
        source,
    };

    let addr = (spec.host.as_str(), spec.port)
        .to_socket_addrs()
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            ))
        })?;

    let socket = TcpListener::bind(addr).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    let local_addr = socket.local_addr().map_err(bind_error)?;

    tracing::info!(
        listener = %spec.kind,
        address = %local_addr,
        require_client_auth = spec.require_client_auth,
        "Listener bound"
    );

    Ok(BoundListener {
        spec: spec.clone(),
        socket,
        local_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_auth_only_on_secure_listener() {
        let config = ServerConfig::default();
        let plain = ListenerSpec::plain(&config);
        let secure = ListenerSpec::secure(&config);

        assert_eq!(plain.port, 4080);
        assert!(!plain.require_client_auth);
        assert_eq!(secure.port, 8443);
        assert!(secure.require_client_auth);
    }

    #[test]
    fn bind_reports_port_in_use() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let spec = ListenerSpec {
            kind: ListenerKind::Plain,
            host: "127.0.0.1".into(),
            port,
            require_client_auth: false,
        };
        let err = bind(&spec).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[test]
    fn bound_listener_releases_port_on_drop() {
        let scratch = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = scratch.local_addr().unwrap().port();
        drop(scratch);

        let spec = ListenerSpec {
            kind: ListenerKind::Secure,
            host: "127.0.0.1".into(),
            port,
            require_client_auth: true,
        };
        let bound = bind(&spec).unwrap();
        assert_eq!(bound.local_addr().port(), port);
        drop(bound);

        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}
