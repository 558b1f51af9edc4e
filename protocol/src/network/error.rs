//! Network error types.

use std::io;
use thiserror::Error;

use crate::crypto::secp256k1::Secp256k1Error;
use crate::staking::{CertificateError, ValidationError};

/// Why a connection was not upgraded.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The handshake itself failed. The error is the transport's own.
    #[error(transparent)]
    Transport(#[from] io::Error),

    /// Handshake completed but the peer presented no certificate.
    #[error("peer presented no certificate")]
    NoPeerCertificate,

    /// The peer's certificate did not parse.
    #[error("invalid peer certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),

    /// The peer's certificate parsed but failed policy checks.
    #[error("peer certificate rejected: {0}")]
    CertificateRejected(#[from] ValidationError),
}

impl UpgradeError {
    /// Whether this rejection counts as an invalid peer certificate.
    pub fn is_invalid_certificate(&self) -> bool {
        matches!(
            self,
            UpgradeError::InvalidCertificate(_) | UpgradeError::CertificateRejected(_)
        )
    }
}

/// Address claim failures.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Claim is dated after the accepted bound.
    #[error("timestamp {timestamp} is after max {max_timestamp}")]
    TimestampTooFarInFuture {
        /// Claimed timestamp.
        timestamp: u64,
        /// Inclusive bound it was checked against.
        max_timestamp: u64,
    },

    /// Signature doesn't recover to the expected certificate's identity.
    #[error("invalid address claim signature")]
    InvalidSignature,

    /// Signing failed.
    #[error(transparent)]
    Signing(#[from] Secp256k1Error),

    /// Frame is larger than the protocol allows.
    #[error("claim frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// The bound.
        max: usize,
    },

    /// Frame didn't decode.
    #[error("malformed claim frame: {0}")]
    Codec(#[from] bincode::Error),

    /// Embedded certificate didn't parse.
    #[error("claim certificate is invalid: {0}")]
    Certificate(#[from] CertificateError),

    /// Stream failure while exchanging claims.
    #[error(transparent)]
    Io(#[from] io::Error),
}
