//! Certificate authority manager.
//!
//! Owns the server's root trust. On first start a self-signed root and a
//! server leaf signed by it are generated and sealed into the keystore; on
//! later starts the keystore is loaded and validated instead. Material is
//! never mutated in place: [`CertificateAuthority::reissue`] swaps in a new
//! [`TrustMaterial`], and only while no running server holds a
//! [`TrustLease`] on the current one.

use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, PublicKeyData, SanType, SerialNumber,
};
use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ServerConfig, StoreType};
use crate::observability::metrics;
use crate::security::keystore::{self, KeystoreEntries, KeystoreError, KeystoreMaterial};

/// Failure to create, load or validate root trust.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid trust material: {0}")]
    InvalidMaterial(String),

    #[error("root certificate is in use by a running server")]
    InUse,

    #[error("certificate authority lock poisoned")]
    LockPoisoned,
}

/// Inputs the authority needs from the server configuration.
#[derive(Clone)]
pub struct AuthoritySettings {
    pub keystore_path: PathBuf,
    pub store_type: StoreType,
    pub password: String,
    pub common_name: String,
    pub organization: String,
    pub server_names: Vec<String>,
}

impl AuthoritySettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            keystore_path: config.keystore.keystore_path(),
            store_type: config.keystore.store_type,
            password: config.keystore.password.clone(),
            common_name: config.certificate_authority.common_name.clone(),
            organization: config.certificate_authority.organization.clone(),
            server_names: config.certificate_authority.server_names.clone(),
        }
    }
}

impl fmt::Debug for AuthoritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthoritySettings")
            .field("keystore_path", &self.keystore_path)
            .field("store_type", &self.store_type)
            .field("common_name", &self.common_name)
            .field("organization", &self.organization)
            .field("server_names", &self.server_names)
            .finish_non_exhaustive()
    }
}

/// Root certificate, its signing key and the sealed keystore derived from them.
pub struct TrustMaterial {
    root_certificate: CertificateDer<'static>,
    root_certificate_pem: String,
    fingerprint: String,
    keystore_bytes: Arc<[u8]>,
    issuer: Issuer<'static, KeyPair>,
}

impl TrustMaterial {
    fn new(
        root_certificate: CertificateDer<'static>,
        root_certificate_pem: String,
        keystore_bytes: Arc<[u8]>,
        issuer: Issuer<'static, KeyPair>,
    ) -> Self {
        let fingerprint = hex::encode(Sha256::digest(root_certificate.as_ref()));
        Self {
            root_certificate,
            root_certificate_pem,
            fingerprint,
            keystore_bytes,
            issuer,
        }
    }

    pub fn root_certificate(&self) -> &CertificateDer<'static> {
        &self.root_certificate
    }

    pub fn root_certificate_pem(&self) -> &str {
        &self.root_certificate_pem
    }

    /// Hex SHA-256 of the root certificate DER.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn keystore_bytes(&self) -> &[u8] {
        &self.keystore_bytes
    }

    pub(crate) fn issuer(&self) -> &Issuer<'static, KeyPair> {
        &self.issuer
    }
}

impl fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustMaterial")
            .field("fingerprint", &self.fingerprint)
            .field("keystore_len", &self.keystore_bytes.len())
            .finish_non_exhaustive()
    }
}

/// A freshly issued client identity.
#[derive(Clone)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ca_certificate_pem: String,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("certificate_pem", &self.certificate_pem)
            .finish_non_exhaustive()
    }
}

/// Pins the current [`TrustMaterial`] for as long as a server serves with it.
///
/// While any lease is alive [`CertificateAuthority::reissue`] is refused.
pub struct TrustLease {
    material: Arc<TrustMaterial>,
    leases: Arc<AtomicUsize>,
}

impl TrustLease {
    pub fn material(&self) -> &Arc<TrustMaterial> {
        &self.material
    }
}

impl Drop for TrustLease {
    fn drop(&mut self) {
        self.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for TrustLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustLease")
            .field("fingerprint", &self.material.fingerprint())
            .finish()
    }
}

/// Certificate authority manager.
pub struct CertificateAuthority {
    settings: AuthoritySettings,
    material: Mutex<Option<Arc<TrustMaterial>>>,
    leases: Arc<AtomicUsize>,
    generations: AtomicU64,
}

impl CertificateAuthority {
    pub fn new(settings: AuthoritySettings) -> Self {
        Self {
            settings,
            material: Mutex::new(None),
            leases: Arc::new(AtomicUsize::new(0)),
            generations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(AuthoritySettings::from_config(config))
    }

    pub fn settings(&self) -> &AuthoritySettings {
        &self.settings
    }

    /// Make sure root trust exists, generating and persisting it on first use.
    ///
    /// Idempotent: once material is held, later calls return the same
    /// [`TrustMaterial`] without touching the disk or generating keys.
    pub fn ensure_root_certificate(&self) -> Result<Arc<TrustMaterial>, TrustError> {
        let mut slot = self.material.lock().map_err(|_| TrustError::LockPoisoned)?;
        self.ensure_in(&mut slot)
    }

    /// Ensure root trust and pin it against reissuance until the lease drops.
    pub fn lease(&self) -> Result<TrustLease, TrustError> {
        let mut slot = self.material.lock().map_err(|_| TrustError::LockPoisoned)?;
        let material = self.ensure_in(&mut slot)?;
        self.leases.fetch_add(1, Ordering::AcqRel);
        Ok(TrustLease {
            material,
            leases: Arc::clone(&self.leases),
        })
    }

    fn ensure_in(&self, slot: &mut Option<Arc<TrustMaterial>>) -> Result<Arc<TrustMaterial>, TrustError> {
        if let Some(material) = slot.as_ref() {
            return Ok(Arc::clone(material));
        }

        let path = &self.settings.keystore_path;
        let material = if path.exists() {
            let material = load_material(&self.settings)?;
            tracing::info!(
                path = %path.display(),
                fingerprint = %material.fingerprint(),
                "Loaded root certificate"
            );
            material
        } else {
            let material = self.generate_and_persist()?;
            tracing::info!(
                path = %path.display(),
                fingerprint = %material.fingerprint(),
                "Generated root certificate"
            );
            material
        };

        let material = Arc::new(material);
        *slot = Some(Arc::clone(&material));
        Ok(material)
    }

    /// Keystore bytes for the TLS layer.
    pub fn materialize_keystore(&self) -> Result<KeystoreMaterial, TrustError> {
        let material = self.ensure_root_certificate()?;
        Ok(KeystoreMaterial::new(
            self.settings.keystore_path.clone(),
            self.settings.store_type,
            Arc::clone(&material.keystore_bytes),
        ))
    }

    /// Material currently held, if root trust was already ensured.
    pub fn current(&self) -> Option<Arc<TrustMaterial>> {
        self.material.lock().ok().and_then(|slot| slot.clone())
    }

    /// Replace the root with a newly generated one.
    ///
    /// Refused with [`TrustError::InUse`] while a [`TrustLease`] is held.
    pub fn reissue(&self) -> Result<Arc<TrustMaterial>, TrustError> {
        let mut slot = self.material.lock().map_err(|_| TrustError::LockPoisoned)?;
        if self.leases.load(Ordering::Acquire) > 0 {
            return Err(TrustError::InUse);
        }
        let material = Arc::new(self.generate_and_persist()?);
        tracing::warn!(fingerprint = %material.fingerprint(), "Root certificate reissued");
        *slot = Some(Arc::clone(&material));
        Ok(material)
    }

    /// Issue a client-auth certificate with a server-generated key.
    pub fn issue_client_certificate(&self, common_name: &str) -> Result<IssuedCertificate, TrustError> {
        let material = self.ensure_root_certificate()?;
        let key = KeyPair::generate()?;
        let params = client_params(common_name, &self.settings.organization)?;
        let certificate = params.signed_by(&key, material.issuer())?;
        metrics::record_certificate_issued("client");

        Ok(IssuedCertificate {
            certificate_pem: certificate.pem(),
            private_key_pem: key.serialize_pem(),
            ca_certificate_pem: material.root_certificate_pem().to_string(),
        })
    }

    /// Number of root key pairs generated by this instance.
    pub fn generation_count(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    fn generate_and_persist(&self) -> Result<TrustMaterial, TrustError> {
        let material = generate_material(&self.settings)?;
        keystore::write_keystore(&self.settings.keystore_path, material.keystore_bytes())?;
        self.generations.fetch_add(1, Ordering::Relaxed);
        metrics::record_certificate_issued("root");
        Ok(material)
    }
}

fn generate_material(settings: &AuthoritySettings) -> Result<TrustMaterial, TrustError> {
    let ca_key = KeyPair::generate()?;
    let ca_params = root_params(settings);
    let ca_cert = ca_params.self_signed(&ca_key)?;
    let ca_key_pem = ca_key.serialize_pem();
    let issuer = Issuer::new(ca_params, ca_key);

    let server_key = KeyPair::generate()?;
    let server_cert = server_params(settings)?.signed_by(&server_key, &issuer)?;

    let entries = KeystoreEntries {
        ca_certificate: ca_cert.pem(),
        ca_private_key: ca_key_pem,
        server_certificate: server_cert.pem(),
        server_private_key: server_key.serialize_pem(),
    };
    let bytes = keystore::seal(&entries, settings.store_type, &settings.password)?;

    Ok(TrustMaterial::new(
        ca_cert.der().clone(),
        entries.ca_certificate,
        bytes.into(),
        issuer,
    ))
}

fn load_material(settings: &AuthoritySettings) -> Result<TrustMaterial, TrustError> {
    let mut bytes = fs::read(&settings.keystore_path)?;
    let mut entries = keystore::open(&bytes, settings.store_type, &settings.password)?;

    let root = entries.trust_anchor()?;
    let ca_key = validate_root(&root, &entries.ca_private_key)?;
    let issuer = Issuer::from_ca_cert_der(&root, ca_key)?;

    let chain = entries.server_chain()?;
    entries.server_key()?;
    if let Err(reason) = verify_server_leaf(&root, &chain, &settings.server_names) {
        tracing::warn!(
            path = %settings.keystore_path.display(),
            reason = %reason,
            "Server certificate does not verify against the root; reissuing it"
        );
        let server_key = KeyPair::generate()?;
        let server_cert = server_params(settings)?.signed_by(&server_key, &issuer)?;
        entries.server_certificate = server_cert.pem();
        entries.server_private_key = server_key.serialize_pem();
        bytes = keystore::seal(&entries, settings.store_type, &settings.password)?;
        keystore::write_keystore(&settings.keystore_path, &bytes)?;
        metrics::record_certificate_issued("server");
    }

    Ok(TrustMaterial::new(
        root,
        entries.ca_certificate,
        bytes.into(),
        issuer,
    ))
}

fn validate_root(root: &CertificateDer<'_>, key_pem: &str) -> Result<KeyPair, TrustError> {
    let (_, cert) = x509_parser::parse_x509_certificate(root.as_ref())
        .map_err(|e| TrustError::InvalidMaterial(format!("root certificate does not parse: {e}")))?;

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|ext| ext.value.ca)
        .unwrap_or(false);
    if !is_ca {
        return Err(TrustError::InvalidMaterial("root certificate is not a CA".into()));
    }
    if !cert.validity().is_valid() {
        return Err(TrustError::InvalidMaterial(
            "root certificate is outside its validity period".into(),
        ));
    }

    let key = KeyPair::from_pem(key_pem)?;
    if key.subject_public_key_info() != cert.public_key().raw {
        return Err(TrustError::InvalidMaterial(
            "root key does not match root certificate".into(),
        ));
    }
    Ok(key)
}

/// Check the server leaf the way a client of the secured listener would:
/// signed by `root`, inside its validity period, valid for every server name.
fn verify_server_leaf(
    root: &CertificateDer<'static>,
    chain: &[CertificateDer<'static>],
    server_names: &[String],
) -> Result<(), String> {
    let leaf = chain.first().ok_or("server chain is empty")?;

    let mut roots = RootCertStore::empty();
    roots.add(root.clone()).map_err(|e| e.to_string())?;
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|e| e.to_string())?;

    let now = UnixTime::now();
    for name in server_names {
        let server_name = ServerName::try_from(name.clone()).map_err(|e| format!("{name}: {e}"))?;
        verifier
            .verify_server_cert(leaf, &[], &server_name, &[], now)
            .map_err(|e| format!("{name}: {e}"))?;
    }
    Ok(())
}

fn root_params(settings: &AuthoritySettings) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params.serial_number = Some(random_serial());

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, settings.common_name.clone());
    distinguished_name.push(DnType::OrganizationName, settings.organization.clone());
    params.distinguished_name = distinguished_name;
    params
}

fn server_params(settings: &AuthoritySettings) -> Result<CertificateParams, TrustError> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.is_ca = IsCa::NoCa;
    params.use_authority_key_identifier_extension = true;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.serial_number = Some(random_serial());

    let primary = settings
        .server_names
        .first()
        .cloned()
        .unwrap_or_else(|| "localhost".to_string());
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, primary);
    distinguished_name.push(DnType::OrganizationName, settings.organization.clone());
    params.distinguished_name = distinguished_name;

    for name in &settings.server_names {
        params.subject_alt_names.push(subject_alt_name(name)?);
    }
    Ok(params)
}

/// Parameters of a client-auth leaf bound to `common_name`.
pub(crate) fn client_params(common_name: &str, organization: &str) -> Result<CertificateParams, rcgen::Error> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.is_ca = IsCa::NoCa;
    params.use_authority_key_identifier_extension = true;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.serial_number = Some(random_serial());

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name.to_string());
    distinguished_name.push(DnType::OrganizationName, organization.to_string());
    params.distinguished_name = distinguished_name;

    params.subject_alt_names.push(subject_alt_name(common_name)?);
    Ok(params)
}

fn subject_alt_name(name: &str) -> Result<SanType, rcgen::Error> {
    match name.parse::<IpAddr>() {
        Ok(ip) => Ok(SanType::IpAddress(ip)),
        Err(_) => Ok(SanType::DnsName(name.try_into()?)),
    }
}

fn random_serial() -> SerialNumber {
    SerialNumber::from_slice(Uuid::new_v4().as_bytes())
}
