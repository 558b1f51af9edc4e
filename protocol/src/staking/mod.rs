//! # Staking Certificates
//!
//! Everything about the certificate a node presents in its TLS handshake:
//!
//! - **certificate** — strict / permissive parsing, NodeID derivation,
//!   post-parse validation.
//! - **builder** — self-signed certificates carrying the identity proof.
//! - **credentials** — the local node's keys and certificate, on disk.

pub mod builder;
pub mod certificate;
pub mod credentials;
pub mod error;

pub use builder::{build_certificate, sign_primary_key, CertificateBuilder};
pub use certificate::{
    parse_certificate, parse_permissive, parse_strict, validate_certificate, Certificate,
    ParseMode, SignatureAlgorithm,
};
pub use credentials::{CredentialError, StakingCredentials, CERT_FILE_NAME, KEY_FILE_NAME};
pub use error::{BuildError, CertificateError, ValidationError};
