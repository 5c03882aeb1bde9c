//! Per-surface authentication policies.
//!
//! Each RouteEntry carries an [`AuthPolicy`]; the dispatcher calls
//! [`Authorizer::authorize`] before handing the request to the surface.

use axum::http::{header, HeaderMap, Request, StatusCode};

use crate::net::connection::ClientIdentity;

/// Authentication requirement of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No credentials required.
    Open,
    /// Operator bearer token. Client certificates are fleet identities
    /// handed out by enrollment and never count here.
    Authenticated,
    /// Verified client certificate from the secured listener.
    MutualTls,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    MissingCredentials,
    InvalidCredentials,
    ClientCertificateRequired,
}

impl Denial {
    pub fn status(&self) -> StatusCode {
        match self {
            Denial::MissingCredentials | Denial::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Denial::ClientCertificateRequired => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Denial::MissingCredentials => "Authentication required",
            Denial::InvalidCredentials => "Invalid credentials",
            Denial::ClientCertificateRequired => "Client certificate required; use the secured listener",
        }
    }
}

/// Enforces [`AuthPolicy`] against a request.
#[derive(Clone, Default)]
pub struct Authorizer {
    api_token: Option<String>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Authorizer {
    pub fn new(api_token: Option<String>) -> Self {
        Self { api_token }
    }

    pub fn authorize<B>(&self, policy: AuthPolicy, request: &Request<B>) -> Result<(), Denial> {
        let identity = request.extensions().get::<ClientIdentity>();
        match policy {
            AuthPolicy::Open => Ok(()),
            AuthPolicy::MutualTls => identity.map(|_| ()).ok_or(Denial::ClientCertificateRequired),
            AuthPolicy::Authenticated => self.check_bearer(request.headers()),
        }
    }

    fn check_bearer(&self, headers: &HeaderMap) -> Result<(), Denial> {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(Denial::MissingCredentials)?;

        match self.api_token.as_deref() {
            Some(expected) if constant_time_eq(presented.trim(), expected) => Ok(()),
            _ => Err(Denial::InvalidCredentials),
        }
    }
}

/// Compare secrets without early exit on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;

    fn request(bearer: Option<&str>, identity: bool) -> Request<()> {
        let mut builder = Request::builder().uri("/status");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let mut request = builder.body(()).unwrap();
        if identity {
            request.extensions_mut().insert(ClientIdentity {
                common_name: Some("node-1".into()),
                fingerprint: "00".repeat(32),
                connection_id: ConnectionId::new(),
            });
        }
        request
    }

    #[test]
    fn open_allows_anonymous() {
        let authorizer = Authorizer::new(None);
        assert_eq!(authorizer.authorize(AuthPolicy::Open, &request(None, false)), Ok(()));
    }

    #[test]
    fn authenticated_requires_matching_token() {
        let authorizer = Authorizer::new(Some("s3cret".into()));

        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(None, false)),
            Err(Denial::MissingCredentials)
        );
        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(Some("nope"), false)),
            Err(Denial::InvalidCredentials)
        );
        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(Some("s3cret"), false)),
            Ok(())
        );
    }

    #[test]
    fn authenticated_without_configured_token_rejects_bearer() {
        let authorizer = Authorizer::new(None);
        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(Some("anything"), false)),
            Err(Denial::InvalidCredentials)
        );
    }

    #[test]
    fn client_certificate_is_not_an_operator_credential() {
        let authorizer = Authorizer::new(Some("s3cret".into()));
        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(None, true)),
            Err(Denial::MissingCredentials)
        );
        assert_eq!(
            authorizer.authorize(AuthPolicy::Authenticated, &request(Some("s3cret"), true)),
            Ok(())
        );

        let without_token = Authorizer::new(None);
        assert_eq!(
            without_token.authorize(AuthPolicy::Authenticated, &request(None, true)),
            Err(Denial::MissingCredentials)
        );
    }

    #[test]
    fn mutual_tls_requires_identity() {
        let authorizer = Authorizer::new(Some("s3cret".into()));

        let denied = authorizer.authorize(AuthPolicy::MutualTls, &request(Some("s3cret"), false));
        assert_eq!(denied, Err(Denial::ClientCertificateRequired));
        assert_eq!(Denial::ClientCertificateRequired.status(), StatusCode::FORBIDDEN);

        assert_eq!(authorizer.authorize(AuthPolicy::MutualTls, &request(None, true)), Ok(()));
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq("token", "token"));
        assert!(!constant_time_eq("token", "tokem"));
        assert!(!constant_time_eq("token", "token2"));
    }
}
