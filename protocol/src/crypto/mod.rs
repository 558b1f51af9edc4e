//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations:
//!
//! - **RSA** (`rsa`) for the primary key that signs TLS handshakes.
//! - **secp256k1** (`k256`) for the secondary key and its compact
//!   recoverable signatures.
//! - **SHA-256 / RIPEMD-160** (`sha2`, `ripemd`) for digests and NodeIDs.
//!
//! Nothing in here is clever. Keep it that way.

pub mod hash;
pub mod primary;
pub mod secp256k1;

pub use hash::{cb58_decode, cb58_encode, hash160, ripemd160, sha256_array, Cb58Error};
pub use primary::{public_key_from_pkcs1_der, public_key_pkcs1_der, PrimaryKey, PrimaryKeyError};
pub use secp256k1::{
    recover_compact, CompressedPublicKey, SecondaryKey, Secp256k1Error, COMPACT_SIGNATURE_LENGTH,
};
