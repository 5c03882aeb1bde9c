//! Client certificate enrollment.
//!
//! # Responsibilities
//! - Check the optional enrollment passphrase
//! - Validate the requested hostname
//! - Sign the CSR's public key into a client-auth certificate
//!
//! # Design Decisions
//! - Only the CSR's public key is honored; subject and extensions are set by
//!   the server (CN = hostname, client-auth only, never a CA)
//! - The CSR signature is verified while parsing

use std::net::IpAddr;

use rcgen::CertificateSigningRequestParams;
use serde::Deserialize;
use thiserror::Error;

use crate::observability::metrics;
use crate::security::access_control::constant_time_eq;
use crate::security::authority::{client_params, TrustError, TrustMaterial};

const MAX_HOSTNAME_LEN: usize = 253;

/// Error type for enrollment.
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("invalid certificate signing request: {0}")]
    InvalidRequest(String),

    #[error("invalid hostname '{0}'")]
    InvalidHostname(String),

    #[error("enrollment passphrase does not match")]
    PassphraseMismatch,

    #[error("signing failed: {0}")]
    Signing(#[from] TrustError),
}

/// Body of `POST /cert/enroll`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentRequest {
    pub hostname: String,
    pub csr: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// Signed client certificate plus the root it chains to.
#[derive(Debug, Clone)]
pub struct SignedEnrollment {
    pub certificate_pem: String,
    pub ca_certificate_pem: String,
}

/// Sign `request` with the root in `trust`.
///
/// Callers pass the material the secured listener was configured from, so
/// every enrolled certificate is one that listener accepts.
pub fn enroll(
    trust: &TrustMaterial,
    organization: &str,
    expected_passphrase: Option<&str>,
    request: &EnrollmentRequest,
) -> Result<SignedEnrollment, EnrollmentError> {
    if let Some(expected) = expected_passphrase {
        let presented = request.passphrase.as_deref().unwrap_or_default();
        if !constant_time_eq(presented, expected) {
            return Err(EnrollmentError::PassphraseMismatch);
        }
    }

    let hostname = request.hostname.trim();
    if !is_valid_hostname(hostname) {
        return Err(EnrollmentError::InvalidHostname(request.hostname.clone()));
    }

    let mut csr = CertificateSigningRequestParams::from_pem(&request.csr)
        .map_err(|e| EnrollmentError::InvalidRequest(e.to_string()))?;
    csr.params = client_params(hostname, organization).map_err(TrustError::from)?;

    let certificate = csr.signed_by(trust.issuer()).map_err(TrustError::from)?;
    metrics::record_certificate_issued("enrollment");

    tracing::info!(hostname, "Client certificate enrolled");
    Ok(SignedEnrollment {
        certificate_pem: certificate.pem(),
        ca_certificate_pem: trust.root_certificate_pem().to_string(),
    })
}

fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.parse::<IpAddr>().is_ok() {
        return true;
    }
    !hostname.is_empty()
        && hostname.len() <= MAX_HOSTNAME_LEN
        && hostname.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreType;
    use crate::security::authority::{AuthoritySettings, CertificateAuthority};
    use rustls::pki_types::UnixTime;
    use rustls::server::danger::ClientCertVerifier;
    use rustls::server::WebPkiClientVerifier;
    use std::sync::Arc;

    const ORG: &str = "mgmt-tests";

    fn authority(dir: &std::path::Path) -> CertificateAuthority {
        CertificateAuthority::new(AuthoritySettings {
            keystore_path: dir.join("keystore.json"),
            store_type: StoreType::Pem,
            password: "enroll-test".into(),
            common_name: "Enroll Root".into(),
            organization: ORG.into(),
            server_names: vec!["localhost".into()],
        })
    }

    fn csr_for(name: &str) -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    fn request(hostname: &str, passphrase: Option<&str>) -> EnrollmentRequest {
        EnrollmentRequest {
            hostname: hostname.into(),
            csr: csr_for(hostname),
            passphrase: passphrase.map(str::to_string),
        }
    }

    #[test]
    fn signs_csr_with_server_chosen_subject() {
        let dir = tempfile::tempdir().unwrap();
        let authority = authority(dir.path());
        let trust = authority.ensure_root_certificate().unwrap();

        let signed = enroll(&trust, ORG, None, &request("node-3.cluster", None)).unwrap();

        let der = rustls_pemfile::certs(&mut signed.certificate_pem.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref()).unwrap();
        let cn = cert.subject().iter_common_name().next().unwrap().as_str().unwrap();
        assert_eq!(cn, "node-3.cluster");
        assert!(!cert.is_ca());
        assert_eq!(
            signed.ca_certificate_pem,
            authority.ensure_root_certificate().unwrap().root_certificate_pem()
        );
    }

    #[test]
    fn passphrase_is_enforced_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let trust = authority(dir.path()).ensure_root_certificate().unwrap();

        let err = enroll(&trust, ORG, Some("letmein"), &request("node-1", Some("guess"))).unwrap_err();
        assert!(matches!(err, EnrollmentError::PassphraseMismatch));

        let err = enroll(&trust, ORG, Some("letmein"), &request("node-1", None)).unwrap_err();
        assert!(matches!(err, EnrollmentError::PassphraseMismatch));

        assert!(enroll(&trust, ORG, Some("letmein"), &request("node-1", Some("letmein"))).is_ok());
    }

    #[test]
    fn garbage_csr_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let trust = authority(dir.path()).ensure_root_certificate().unwrap();
        let bad = EnrollmentRequest {
            hostname: "node-1".into(),
            csr: "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n".into(),
            passphrase: None,
        };

        assert!(matches!(
            enroll(&trust, ORG, None, &bad),
            Err(EnrollmentError::InvalidRequest(_))
        ));
    }

    #[test]
    fn signs_with_the_given_material_after_reissue() {
        let dir = tempfile::tempdir().unwrap();
        let authority = authority(dir.path());
        let serving = authority.ensure_root_certificate().unwrap();
        authority.reissue().unwrap();

        let signed = enroll(&serving, ORG, None, &request("node-4", None)).unwrap();
        assert_eq!(signed.ca_certificate_pem, serving.root_certificate_pem());

        let mut roots = rustls::RootCertStore::empty();
        roots.add(serving.root_certificate().clone()).unwrap();
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .unwrap();
        let leaf = rustls_pemfile::certs(&mut signed.certificate_pem.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        assert!(verifier.verify_client_cert(&leaf, &[], UnixTime::now()).is_ok());
    }

    #[test]
    fn hostname_rules() {
        assert!(is_valid_hostname("node-1.example.com"));
        assert!(is_valid_hostname("10.0.0.7"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("-leading"));
        assert!(!is_valid_hostname("under_score"));
        assert!(!is_valid_hostname("a..b"));
    }
}
