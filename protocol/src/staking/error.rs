//! Staking certificate error types.

use thiserror::Error;

use crate::crypto::primary::PrimaryKeyError;
use crate::crypto::secp256k1::Secp256k1Error;
use crate::identity::RecoveryError;

/// Why certificate bytes could not be turned into a [`Certificate`](super::Certificate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    /// Input exceeds the size bound; not even looked at.
    #[error("certificate is {len} bytes, limit is {max}")]
    CertificateTooLarge {
        /// Size of the input.
        len: usize,
        /// The configured bound.
        max: usize,
    },

    /// Structural ASN.1 / X.509 decode failure, including trailing bytes.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Version tag other than 2 (X.509 v3).
    #[error("certificate version must be 3 (tag 2), got tag {0}")]
    WrongCertificateVersion(u32),

    /// No extensions block, or an empty one.
    #[error("certificate must have extensions")]
    NoCertificateExtensions,

    /// No extension carries a usable identity proof.
    #[error("certificate must have extension with node public key")]
    MissingNodePubKey,

    /// The identity proof could not be resolved to a key.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

/// Post-parse policy failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Certificate is not signed with sha256WithRSAEncryption.
    #[error("unsupported certificate signature algorithm {0}")]
    UnsupportedSignatureAlgorithm(String),

    /// RSA modulus outside the allowed sizes.
    #[error("unsupported rsa modulus size: {0} bits")]
    UnsupportedModulusSize(usize),

    /// RSA public exponent other than 65537.
    #[error("unsupported rsa public exponent")]
    UnsupportedPublicExponent,
}

/// Errors producing a certificate.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Primary key could not be encoded for the certificate generator.
    #[error(transparent)]
    PrimaryKey(#[from] PrimaryKeyError),

    /// Secondary key refused to sign.
    #[error(transparent)]
    Secondary(#[from] Secp256k1Error),

    /// The certificate generator failed.
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    /// The freshly built certificate didn't parse back.
    #[error("generated certificate is invalid: {0}")]
    Parse(#[from] CertificateError),
}
