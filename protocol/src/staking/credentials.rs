//! # Staking Credentials
//!
//! A node's complete identity kit: primary RSA key, derived secondary key,
//! and the certificate binding the two. On disk it's two PEM files:
//!
//! - `staker.key` — PKCS#8 RSA private key (mode 0600 on Unix)
//! - `staker.crt` — the DER certificate, PEM-armoured
//!
//! The secondary key is never written. It's recomputed from the primary key
//! on load and checked against the certificate's NodeID.

use rsa::pkcs8::der::pem;
use rsa::pkcs8::LineEnding;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::builder::build_certificate;
use super::certificate::{parse_permissive, Certificate};
use super::error::{BuildError, CertificateError};
use crate::crypto::primary::{PrimaryKey, PrimaryKeyError};
use crate::crypto::secp256k1::{Secp256k1Error, SecondaryKey};
use crate::identity::{derive_node_id, NodeId};

/// File name of the PEM certificate inside a data directory.
pub const CERT_FILE_NAME: &str = "staker.crt";

/// File name of the PEM private key inside a data directory.
pub const KEY_FILE_NAME: &str = "staker.key";

const CERT_PEM_LABEL: &str = "CERTIFICATE";

/// Errors loading, generating or storing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Filesystem failure.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// PEM armour is broken or carries the wrong label.
    #[error("invalid pem in {}: {reason}", .path.display())]
    Pem {
        /// File involved.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Primary key problem.
    #[error(transparent)]
    PrimaryKey(#[from] PrimaryKeyError),

    /// Secondary key derivation failed.
    #[error(transparent)]
    SecondaryKey(#[from] Secp256k1Error),

    /// Certificate generation failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Stored certificate doesn't parse.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Stored certificate doesn't belong to the stored key.
    #[error("certificate {cert} does not match key-derived identity {derived}")]
    KeyMismatch {
        /// NodeID in the certificate.
        cert: NodeId,
        /// NodeID derived from the key file.
        derived: NodeId,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CredentialError + '_ {
    move |source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Primary key, secondary key and certificate of the local node.
#[derive(Clone, Debug)]
pub struct StakingCredentials {
    primary: PrimaryKey,
    secondary: SecondaryKey,
    certificate: Certificate,
}

impl StakingCredentials {
    /// Fresh credentials from a new 2048-bit primary key.
    pub fn generate() -> Result<Self, CredentialError> {
        Self::from_primary(PrimaryKey::generate()?)
    }

    /// Derive the secondary key and issue a certificate for `primary`.
    pub fn from_primary(primary: PrimaryKey) -> Result<Self, CredentialError> {
        let secondary = SecondaryKey::derive_from_primary(&primary)?;
        let der = build_certificate(&primary, &secondary)?;
        let certificate = parse_permissive(&der)?;
        Ok(Self {
            primary,
            secondary,
            certificate,
        })
    }

    /// Pair an existing certificate with its primary key.
    pub fn from_parts(primary: PrimaryKey, cert_der: &[u8]) -> Result<Self, CredentialError> {
        let certificate = parse_permissive(cert_der)?;
        let secondary = SecondaryKey::derive_from_primary(&primary)?;
        let derived = derive_node_id(&secondary.public_key());
        if certificate.node_id() != derived || *certificate.public_key() != primary.public_key() {
            return Err(CredentialError::KeyMismatch {
                cert: certificate.node_id(),
                derived,
            });
        }
        Ok(Self {
            primary,
            secondary,
            certificate,
        })
    }

    /// The local NodeID.
    pub fn node_id(&self) -> NodeId {
        self.certificate.node_id()
    }

    /// The local certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The primary (TLS) key.
    pub fn primary(&self) -> &PrimaryKey {
        &self.primary
    }

    /// The secondary (identity) key, used to sign address claims.
    pub fn secondary(&self) -> &SecondaryKey {
        &self.secondary
    }

    /// Read `staker.key` and `staker.crt` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CredentialError> {
        let key_path = dir.join(KEY_FILE_NAME);
        let key_pem = fs::read_to_string(&key_path).map_err(io_err(&key_path))?;
        let primary = PrimaryKey::from_pkcs8_pem(&key_pem)?;

        let cert_path = dir.join(CERT_FILE_NAME);
        let cert_pem = fs::read(&cert_path).map_err(io_err(&cert_path))?;
        let (label, der) = pem::decode_vec(&cert_pem).map_err(|e| CredentialError::Pem {
            path: cert_path.clone(),
            reason: e.to_string(),
        })?;
        if label != CERT_PEM_LABEL {
            return Err(CredentialError::Pem {
                path: cert_path,
                reason: format!("expected {CERT_PEM_LABEL}, found {label}"),
            });
        }

        Self::from_parts(primary, &der)
    }

    /// Write both files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), CredentialError> {
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let key_path = dir.join(KEY_FILE_NAME);
        fs::write(&key_path, self.primary.to_pkcs8_pem()?).map_err(io_err(&key_path))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))
                .map_err(io_err(&key_path))?;
        }

        let cert_path = dir.join(CERT_FILE_NAME);
        let cert_pem = pem::encode_string(CERT_PEM_LABEL, LineEnding::LF, self.certificate.raw())
            .map_err(|e| CredentialError::Pem {
                path: cert_path.clone(),
                reason: e.to_string(),
            })?;
        fs::write(&cert_path, cert_pem).map_err(io_err(&cert_path))?;

        Ok(())
    }

    /// Load credentials from `dir`, generating and saving new ones if the
    /// key file doesn't exist yet. Returns whether they were generated.
    pub fn load_or_generate(dir: &Path) -> Result<(Self, bool), CredentialError> {
        if dir.join(KEY_FILE_NAME).exists() {
            return Ok((Self::load(dir)?, false));
        }
        let creds = Self::generate()?;
        creds.save(dir)?;
        tracing::info!(node_id = %creds.node_id(), dir = %dir.display(), "generated staking credentials");
        Ok((creds, true))
    }
}
