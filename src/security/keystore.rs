//! Sealed keystore container.
//!
//! A keystore is a JSON envelope holding the PEM sections of the root CA and of
//! the server leaf, plus an HMAC-SHA256 tag keyed by the shared keystore
//! password. The same file serves as truststore. Opening it with the wrong
//! password, or opening a modified file, fails the integrity check.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::StoreType;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_TAG: &str = "mgmt-keystore/1";

/// Errors raised while sealing, opening or reading a keystore.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("malformed keystore: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported keystore format '{0}'")]
    UnsupportedFormat(String),

    #[error("keystore type {found} does not match configured {expected}")]
    StoreTypeMismatch { expected: StoreType, found: StoreType },

    #[error("keystore integrity check failed (wrong password or modified file)")]
    IntegrityCheck,

    #[error("keystore entry '{0}' holds no usable PEM data")]
    MissingEntry(&'static str),

    #[error("keystore I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// PEM sections held by a keystore.
#[derive(Clone, PartialEq, Eq)]
pub struct KeystoreEntries {
    pub ca_certificate: String,
    pub ca_private_key: String,
    pub server_certificate: String,
    pub server_private_key: String,
}

impl std::fmt::Debug for KeystoreEntries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreEntries")
            .field("ca_certificate", &self.ca_certificate)
            .field("server_certificate", &self.server_certificate)
            .finish_non_exhaustive()
    }
}

impl KeystoreEntries {
    /// The root certificate, which is also the only trust anchor.
    pub fn trust_anchor(&self) -> Result<CertificateDer<'static>, KeystoreError> {
        first_certificate(&self.ca_certificate, "ca_certificate")
    }

    /// Chain presented by the secured listener: server leaf, then root.
    pub fn server_chain(&self) -> Result<Vec<CertificateDer<'static>>, KeystoreError> {
        Ok(vec![
            first_certificate(&self.server_certificate, "server_certificate")?,
            self.trust_anchor()?,
        ])
    }

    /// Private key matching the server leaf.
    pub fn server_key(&self) -> Result<PrivateKeyDer<'static>, KeystoreError> {
        rustls_pemfile::private_key(&mut BufReader::new(self.server_private_key.as_bytes()))?
            .ok_or(KeystoreError::MissingEntry("server_private_key"))
    }
}

fn first_certificate(pem: &str, entry: &'static str) -> Result<CertificateDer<'static>, KeystoreError> {
    rustls_pemfile::certs(&mut BufReader::new(pem.as_bytes()))
        .next()
        .ok_or(KeystoreError::MissingEntry(entry))?
        .map_err(KeystoreError::Io)
}

#[derive(Serialize, Deserialize)]
struct SealedKeystore {
    format: String,
    store_type: StoreType,
    ca_certificate: String,
    ca_private_key: String,
    server_certificate: String,
    server_private_key: String,
    mac: String,
}

/// Serialize `entries` into keystore bytes protected by `password`.
pub fn seal(entries: &KeystoreEntries, store_type: StoreType, password: &str) -> Result<Vec<u8>, KeystoreError> {
    let tag = keystore_mac(password, store_type, entries)?.finalize().into_bytes();
    let sealed = SealedKeystore {
        format: FORMAT_TAG.to_string(),
        store_type,
        ca_certificate: entries.ca_certificate.clone(),
        ca_private_key: entries.ca_private_key.clone(),
        server_certificate: entries.server_certificate.clone(),
        server_private_key: entries.server_private_key.clone(),
        mac: STANDARD.encode(tag),
    };
    Ok(serde_json::to_vec_pretty(&sealed)?)
}

/// Parse keystore bytes and verify them against `password`.
pub fn open(bytes: &[u8], store_type: StoreType, password: &str) -> Result<KeystoreEntries, KeystoreError> {
    let sealed: SealedKeystore = serde_json::from_slice(bytes)?;
    if sealed.format != FORMAT_TAG {
        return Err(KeystoreError::UnsupportedFormat(sealed.format));
    }
    if sealed.store_type != store_type {
        return Err(KeystoreError::StoreTypeMismatch {
            expected: store_type,
            found: sealed.store_type,
        });
    }

    let entries = KeystoreEntries {
        ca_certificate: sealed.ca_certificate,
        ca_private_key: sealed.ca_private_key,
        server_certificate: sealed.server_certificate,
        server_private_key: sealed.server_private_key,
    };
    let tag = STANDARD
        .decode(sealed.mac.as_bytes())
        .map_err(|_| KeystoreError::IntegrityCheck)?;
    keystore_mac(password, store_type, &entries)?
        .verify_slice(&tag)
        .map_err(|_| KeystoreError::IntegrityCheck)?;

    Ok(entries)
}

fn keystore_mac(password: &str, store_type: StoreType, entries: &KeystoreEntries) -> Result<HmacSha256, KeystoreError> {
    let mut mac = HmacSha256::new_from_slice(password.as_bytes()).map_err(|_| KeystoreError::IntegrityCheck)?;
    let store_type = store_type.to_string();
    let fields: [&str; 6] = [
        FORMAT_TAG,
        store_type.as_str(),
        entries.ca_certificate.as_str(),
        entries.ca_private_key.as_str(),
        entries.server_certificate.as_str(),
        entries.server_private_key.as_str(),
    ];
    for field in fields {
        // Length prefix keeps field boundaries unambiguous.
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field.as_bytes());
    }
    Ok(mac)
}

/// Write keystore bytes atomically, readable by the owner only.
pub fn write_keystore(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let staging = path.with_extension("partial");
    fs::write(&staging, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

/// Keystore bytes handed to the TLS layer.
///
/// The bytes are opaque to everything but [`open`]; the listener never sees
/// the CA's signing key as a typed value.
#[derive(Clone)]
pub struct KeystoreMaterial {
    path: PathBuf,
    store_type: StoreType,
    bytes: Arc<[u8]>,
}

impl KeystoreMaterial {
    pub(crate) fn new(path: PathBuf, store_type: StoreType, bytes: Arc<[u8]>) -> Self {
        Self {
            path,
            store_type,
            bytes,
        }
    }

    /// Keystore location on disk (also the truststore location).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    /// Open the material with the shared password.
    pub fn open(&self, password: &str) -> Result<KeystoreEntries, KeystoreError> {
        open(&self.bytes, self.store_type, password)
    }
}

impl std::fmt::Debug for KeystoreMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreMaterial")
            .field("path", &self.path)
            .field("store_type", &self.store_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
