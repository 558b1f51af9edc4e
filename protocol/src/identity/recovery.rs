//! # Secondary Key Recovery
//!
//! A staking certificate never carries its secondary key. It carries a
//! compact-recoverable secp256k1 signature over
//! `SHA256(PKCS#1 DER(primary RSA public key))`, and the key is rebuilt from
//! that signature on demand.
//!
//! Forging the binding means producing a signature that recovers to the
//! victim's secondary key over *your* RSA key, which takes the victim's
//! secondary private key. And since nothing but the signature is
//! transmitted, there is no separate copy of the key to tamper with.
//!
//! Everything here is pure: same inputs, same key, no side effects.

use rsa::RsaPublicKey;
use thiserror::Error;
use x509_parser::extensions::X509Extension;
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::config::NODE_PROOF_OID_STR;
use crate::crypto::hash::sha256_array;
use crate::crypto::primary::{public_key_from_pkcs1_der, public_key_pkcs1_der};
use crate::crypto::secp256k1::{recover_compact, CompressedPublicKey};

/// Why an extension could not be turned into a secondary key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// The extension is not the identity-proof extension. Scanners use this
    /// to move on; it is never surfaced to callers.
    #[error("wrong extension type")]
    WrongExtensionType,

    /// The proof extension has an empty value.
    #[error("identity proof extension carries no signature")]
    MissingSignature,

    /// The certificate's primary key is not RSA.
    #[error("certificate public key is not an rsa public key")]
    NotRsaPublicKey,

    /// The signature does not recover to a valid secp256k1 point.
    #[error("failed to recover secondary public key")]
    RecoveryFailed,
}

/// Is this the identity-proof extension?
pub fn is_proof_extension(ext: &X509Extension<'_>) -> bool {
    ext.oid.to_id_string() == NODE_PROOF_OID_STR
}

/// Extract the RSA key from a SubjectPublicKeyInfo.
pub fn rsa_public_key(spki: &SubjectPublicKeyInfo<'_>) -> Result<RsaPublicKey, RecoveryError> {
    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return Err(RecoveryError::NotRsaPublicKey);
    }
    public_key_from_pkcs1_der(&spki.subject_public_key.data)
        .map_err(|_| RecoveryError::NotRsaPublicKey)
}

/// Recover the secondary key from a proof signature and the RSA key it
/// signs.
pub fn recover_secondary_key(
    primary: &RsaPublicKey,
    proof: &[u8],
) -> Result<CompressedPublicKey, RecoveryError> {
    if proof.is_empty() {
        return Err(RecoveryError::MissingSignature);
    }
    let der = public_key_pkcs1_der(primary).map_err(|_| RecoveryError::NotRsaPublicKey)?;
    let digest = sha256_array(&der);
    recover_compact(proof, &digest).map_err(|_| RecoveryError::RecoveryFailed)
}

/// Recover the secondary key from one certificate extension.
///
/// Checks run in a fixed order: extension type, presence of a signature,
/// primary key type, then recovery.
pub fn recover_from_extension(
    ext: &X509Extension<'_>,
    spki: &SubjectPublicKeyInfo<'_>,
) -> Result<CompressedPublicKey, RecoveryError> {
    if !is_proof_extension(ext) {
        return Err(RecoveryError::WrongExtensionType);
    }
    if ext.value.is_empty() {
        return Err(RecoveryError::MissingSignature);
    }
    let primary = rsa_public_key(spki)?;
    recover_secondary_key(&primary, ext.value)
}
