//! # secp256k1 Compact-Recoverable Signatures
//!
//! The secondary key of a node lives on secp256k1 and only ever produces one
//! kind of signature: the 65-byte compact-recoverable form
//! `[v || r || s]`, where `v = 27 + recovery_id` (plus 4 when the signer
//! wants a compressed key back). Given a digest and such a signature anyone
//! can reconstruct the signer's public key, which is what lets a certificate
//! prove the secondary key without carrying it.
//!
//! All signing happens over 32-byte prehashed digests; callers hash first.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::{sha256_array, SHA256_LENGTH};
use super::primary::PrimaryKey;

/// Size of a compact-recoverable signature.
pub const COMPACT_SIGNATURE_LENGTH: usize = 65;

/// Size of a SEC1-compressed public key.
pub const COMPRESSED_PUBLIC_KEY_LENGTH: usize = 33;

/// Size of a raw secret scalar.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Offset added to the recovery id in the leading byte.
const COMPACT_MAGIC_OFFSET: u8 = 27;

/// Flag added on top of the offset when the signer asks for a compressed
/// key on recovery.
const COMPACT_COMPRESSED_FLAG: u8 = 4;

/// Errors from secondary-key operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Secp256k1Error {
    /// Secret bytes are not a valid non-zero scalar below the curve order.
    #[error("invalid secp256k1 secret key")]
    InvalidSecretKey,

    /// Public key bytes are not a valid SEC1 point.
    #[error("invalid secp256k1 public key")]
    InvalidPublicKey,

    /// Signature is not exactly 65 bytes.
    #[error("compact signature must be {COMPACT_SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// Leading byte outside 27..=34.
    #[error("invalid compact recovery byte {0}")]
    InvalidRecoveryCode(u8),

    /// r or s is zero or not below the curve order.
    #[error("malformed signature scalars")]
    MalformedSignature,

    /// The signature doesn't recover to a point on the curve.
    #[error("public key recovery failed")]
    RecoveryFailed,

    /// The signer refused the digest (should not happen for 32-byte input).
    #[error("signing failed")]
    SigningFailed,
}

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// A SEC1-compressed secp256k1 public key (33 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressedPublicKey([u8; COMPRESSED_PUBLIC_KEY_LENGTH]);

impl CompressedPublicKey {
    /// Parse and validate a compressed key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Secp256k1Error> {
        if bytes.len() != COMPRESSED_PUBLIC_KEY_LENGTH {
            return Err(Secp256k1Error::InvalidPublicKey);
        }
        let vk =
            VerifyingKey::from_sec1_bytes(bytes).map_err(|_| Secp256k1Error::InvalidPublicKey)?;
        Ok(Self::from(&vk))
    }

    /// Raw compressed encoding.
    pub fn as_bytes(&self) -> &[u8; COMPRESSED_PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

impl From<&VerifyingKey> for CompressedPublicKey {
    fn from(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(true);
        let mut out = [0u8; COMPRESSED_PUBLIC_KEY_LENGTH];
        out.copy_from_slice(point.as_bytes());
        Self(out)
    }
}

impl fmt::Debug for CompressedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompressedPublicKey({})", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Secret key
// ---------------------------------------------------------------------------

/// A node's secondary (identity) key.
///
/// No `Serialize`, no `Debug` output of the scalar. It's derived from the
/// primary key on every start, so there's nothing to persist anyway.
#[derive(Clone)]
pub struct SecondaryKey {
    inner: SigningKey,
}

impl SecondaryKey {
    /// A fresh random key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Load a key from its 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Secp256k1Error> {
        let inner = SigningKey::from_slice(bytes).map_err(|_| Secp256k1Error::InvalidSecretKey)?;
        Ok(Self { inner })
    }

    /// Derive the secondary key from a primary RSA key: the scalar is
    /// `SHA256(PKCS#1 DER(private key))`.
    ///
    /// Deterministic, so the primary key file alone pins the node identity.
    pub fn derive_from_primary(primary: &PrimaryKey) -> Result<Self, Secp256k1Error> {
        let der = primary
            .to_pkcs1_der()
            .map_err(|_| Secp256k1Error::InvalidSecretKey)?;
        Self::from_bytes(&sha256_array(der.as_bytes()))
    }

    /// The 32-byte scalar.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.inner.to_bytes().into()
    }

    /// The compressed public key.
    pub fn public_key(&self) -> CompressedPublicKey {
        CompressedPublicKey::from(self.inner.verifying_key())
    }

    /// Sign a 32-byte digest, producing `[27 + recid || r || s]`.
    ///
    /// The compressed flag is left unset; recovery always yields the
    /// compressed form regardless.
    pub fn sign_compact(
        &self,
        digest: &[u8; SHA256_LENGTH],
    ) -> Result<[u8; COMPACT_SIGNATURE_LENGTH], Secp256k1Error> {
        let (signature, recovery_id) = self
            .inner
            .sign_prehash_recoverable(digest)
            .map_err(|_| Secp256k1Error::SigningFailed)?;

        let mut out = [0u8; COMPACT_SIGNATURE_LENGTH];
        out[0] = COMPACT_MAGIC_OFFSET + recovery_id.to_byte();
        out[1..].copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

impl fmt::Debug for SecondaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Recover the signer of `digest` from a compact signature.
///
/// Accepts leading bytes 27..=34, i.e. with or without the compressed flag.
pub fn recover_compact(
    signature: &[u8],
    digest: &[u8; SHA256_LENGTH],
) -> Result<CompressedPublicKey, Secp256k1Error> {
    if signature.len() != COMPACT_SIGNATURE_LENGTH {
        return Err(Secp256k1Error::InvalidSignatureLength(signature.len()));
    }

    let code = signature[0];
    let mut recid = code
        .checked_sub(COMPACT_MAGIC_OFFSET)
        .ok_or(Secp256k1Error::InvalidRecoveryCode(code))?;
    if recid >= COMPACT_COMPRESSED_FLAG {
        recid -= COMPACT_COMPRESSED_FLAG;
    }
    let recovery_id = RecoveryId::from_byte(recid).ok_or(Secp256k1Error::InvalidRecoveryCode(code))?;

    let sig =
        Signature::from_slice(&signature[1..]).map_err(|_| Secp256k1Error::MalformedSignature)?;
    let vk = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| Secp256k1Error::RecoveryFailed)?;
    Ok(CompressedPublicKey::from(&vk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(tag: &[u8]) -> [u8; 32] {
        sha256_array(tag)
    }

    #[test]
    fn signer_is_recovered() {
        let key = SecondaryKey::generate();
        let d = digest(b"primary key der");
        let sig = key.sign_compact(&d).unwrap();

        assert!((27..=30).contains(&sig[0]));
        assert_eq!(recover_compact(&sig, &d).unwrap(), key.public_key());
    }

    #[test]
    fn compressed_flag_is_tolerated() {
        let key = SecondaryKey::generate();
        let d = digest(b"flagged");
        let mut sig = key.sign_compact(&d).unwrap();
        sig[0] += COMPACT_COMPRESSED_FLAG;
        assert_eq!(recover_compact(&sig, &d).unwrap(), key.public_key());
    }

    #[test]
    fn other_digest_recovers_someone_else() {
        let key = SecondaryKey::generate();
        let sig = key.sign_compact(&digest(b"one")).unwrap();
        // Recovery "succeeds" for any digest; it just names a different key.
        match recover_compact(&sig, &digest(b"two")) {
            Ok(pk) => assert_ne!(pk, key.public_key()),
            Err(e) => assert_eq!(e, Secp256k1Error::RecoveryFailed),
        }
    }

    #[test]
    fn rejects_bad_lengths_and_codes() {
        let d = digest(b"x");
        assert_eq!(
            recover_compact(&[0u8; 64], &d),
            Err(Secp256k1Error::InvalidSignatureLength(64))
        );

        let key = SecondaryKey::generate();
        let mut sig = key.sign_compact(&d).unwrap();
        sig[0] = 26;
        assert_eq!(
            recover_compact(&sig, &d),
            Err(Secp256k1Error::InvalidRecoveryCode(26))
        );
        sig[0] = 35;
        assert_eq!(
            recover_compact(&sig, &d),
            Err(Secp256k1Error::InvalidRecoveryCode(35))
        );
    }

    #[test]
    fn zero_scalars_are_malformed() {
        let mut sig = [0u8; 65];
        sig[0] = 27;
        assert_eq!(
            recover_compact(&sig, &digest(b"z")),
            Err(Secp256k1Error::MalformedSignature)
        );
    }

    #[test]
    fn secret_bytes_reload() {
        let key = SecondaryKey::generate();
        let again = SecondaryKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key.public_key(), again.public_key());
        assert_eq!(
            SecondaryKey::from_bytes(&[0u8; 32]).unwrap_err(),
            Secp256k1Error::InvalidSecretKey
        );
    }

    #[test]
    fn compressed_key_parses_back() {
        let pk = SecondaryKey::generate().public_key();
        assert_eq!(CompressedPublicKey::from_bytes(pk.as_bytes()).unwrap(), pk);
        assert!(CompressedPublicKey::from_bytes(&[2u8; 32]).is_err());
    }

    #[test]
    fn debug_never_prints_the_scalar() {
        let key = SecondaryKey::generate();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(&hex::encode(key.to_bytes())));
    }
}
