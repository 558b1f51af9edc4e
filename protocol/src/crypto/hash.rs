//! # Hashing Utilities
//!
//! The identity scheme needs exactly two hash functions:
//!
//! - **SHA-256** — digests of the primary public key (what the secondary key
//!   signs), of claim payloads, and the cb58 checksum.
//! - **RIPEMD-160** — applied on top of SHA-256 to squeeze a compressed
//!   secp256k1 key into a 20-byte NodeID. Same construction Bitcoin uses for
//!   addresses, same reasons.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::config::CB58_CHECKSUM_LENGTH;

/// Length of a SHA-256 digest.
pub const SHA256_LENGTH: usize = 32;

/// Length of a RIPEMD-160 digest.
pub const RIPEMD160_LENGTH: usize = 20;

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use keybind_protocol::crypto::sha256_array;
///
/// let hash = sha256_array(b"keybind");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> [u8; SHA256_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the RIPEMD-160 hash of the input data.
pub fn ripemd160(data: &[u8]) -> [u8; RIPEMD160_LENGTH] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `RIPEMD160(SHA256(data))`, the address-style digest NodeIDs are made of.
pub fn hash160(data: &[u8]) -> [u8; RIPEMD160_LENGTH] {
    ripemd160(&sha256_array(data))
}

/// The cb58 checksum: the last four bytes of `SHA256(data)`.
pub fn checksum(data: &[u8]) -> [u8; CB58_CHECKSUM_LENGTH] {
    let digest = sha256_array(data);
    let mut out = [0u8; CB58_CHECKSUM_LENGTH];
    out.copy_from_slice(&digest[SHA256_LENGTH - CB58_CHECKSUM_LENGTH..]);
    out
}

/// Errors decoding cb58 text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Cb58Error {
    /// Not valid base58.
    #[error("invalid base58: {0}")]
    Base58(String),

    /// Decoded payload shorter than the checksum itself.
    #[error("cb58 input too short: {0} bytes")]
    TooShort(usize),

    /// Checksum didn't match the payload.
    #[error("cb58 checksum mismatch")]
    BadChecksum,
}

/// Encode `data` as base58 with a trailing 4-byte SHA-256 checksum.
pub fn cb58_encode(data: &[u8]) -> String {
    let mut buf = Vec::with_capacity(data.len() + CB58_CHECKSUM_LENGTH);
    buf.extend_from_slice(data);
    buf.extend_from_slice(&checksum(data));
    bs58::encode(buf).into_string()
}

/// Decode cb58 text, verifying and stripping the checksum.
pub fn cb58_decode(text: &str) -> Result<Vec<u8>, Cb58Error> {
    let raw = bs58::decode(text)
        .into_vec()
        .map_err(|e| Cb58Error::Base58(e.to_string()))?;
    if raw.len() < CB58_CHECKSUM_LENGTH {
        return Err(Cb58Error::TooShort(raw.len()));
    }
    let (payload, sum) = raw.split_at(raw.len() - CB58_CHECKSUM_LENGTH);
    if checksum(payload) != sum {
        return Err(Cb58Error::BadChecksum);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(sha256_array(b"").as_slice(), expected.as_slice());
    }

    #[test]
    fn ripemd160_known_vector() {
        let expected = hex::decode("9c1185a5c5e9fc54612808977ee8f548b2258d31").unwrap();
        assert_eq!(ripemd160(b"").as_slice(), expected.as_slice());
    }

    #[test]
    fn hash160_is_ripemd_of_sha() {
        let data = b"compressed key bytes";
        assert_eq!(hash160(data), ripemd160(&sha256_array(data)));
    }

    #[test]
    fn checksum_is_digest_tail() {
        let digest = sha256_array(b"tail");
        assert_eq!(checksum(b"tail"), digest[28..]);
    }

    #[test]
    fn cb58_decode_inverts_encode() {
        let data = [7u8; 20];
        let text = cb58_encode(&data);
        assert_eq!(cb58_decode(&text).unwrap(), data.to_vec());
    }

    #[test]
    fn cb58_detects_corruption() {
        let mut raw = [3u8; 20].to_vec();
        raw.extend_from_slice(&[0, 0, 0, 0]);
        let text = bs58::encode(raw).into_string();
        assert_eq!(cb58_decode(&text), Err(Cb58Error::BadChecksum));
    }

    #[test]
    fn cb58_rejects_short_and_invalid_input() {
        assert_eq!(cb58_decode("1"), Err(Cb58Error::TooShort(1)));
        assert!(matches!(cb58_decode("0OIl"), Err(Cb58Error::Base58(_))));
    }
}
