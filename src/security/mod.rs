//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Trust bootstrap (startup):
//!     authority.rs (ensure root: load or generate)
//!     → keystore.rs (sealed container on disk)
//!     → KeystoreMaterial handed to the secured listener
//!
//! Incoming request:
//!     → access_control.rs (AuthPolicy of the matched surface)
//!     → headers.rs (hardening headers on the response)
//!
//! Enrollment (/cert surface):
//!     CSR → enrollment.rs → signed by the root held in authority.rs
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - The root signing key never leaves the authority except sealed in the keystore
//! - One password protects key and trust material

pub mod access_control;
pub mod authority;
pub mod enrollment;
pub mod headers;
pub mod keystore;

pub use access_control::{AuthPolicy, Authorizer, Denial};
pub use authority::{
    AuthoritySettings, CertificateAuthority, IssuedCertificate, TrustError, TrustLease, TrustMaterial,
};
pub use enrollment::{enroll, EnrollmentError, EnrollmentRequest, SignedEnrollment};
pub use keystore::{KeystoreError, KeystoreMaterial};
