//! # Network Module
//!
//! Where raw connections become authenticated peers.
//!
//! ## Architecture
//!
//! ```text
//! transport.rs — Handshake primitive trait (raw stream -> secure stream + certs)
//! tls.rs       — rustls implementation of that primitive
//! upgrader.rs  — Channel upgrader: handshake, parse, validate, count rejects
//! claim.rs     — Signed address claims and their length-prefixed framing
//! error.rs     — UpgradeError / ClaimError
//! ```
//!
//! ## Design Decisions
//!
//! - The upgrader is generic over the handshake primitive so the parse and
//!   counting logic can be exercised without TLS. Production wires in
//!   [`TlsHandshaker`].
//! - TLS does not validate certificate chains. Identity certificates are
//!   self-signed; trust comes from the recovered NodeID, not from an issuer.
//! - The invalid-certificate counter is a `prometheus::IntCounter` handed in
//!   by the caller, so the node can register it with its own registry.

pub mod claim;
pub mod error;
pub mod tls;
pub mod transport;
pub mod upgrader;

pub use claim::{
    max_claim_timestamp, read_claim, write_claim, SignedAddressClaim, UnsignedAddressClaim,
};
pub use error::{ClaimError, UpgradeError};
pub use tls::TlsHandshaker;
pub use transport::{Handshake, Handshaker, Role};
pub use upgrader::{Upgraded, Upgrader};
