//! # Identity Module
//!
//! How a certificate turns into a peer name. Two steps, both pure:
//!
//! 1. **Recovery** — rebuild the secondary secp256k1 key from the
//!    recoverable signature a certificate carries over its RSA key.
//! 2. **NodeID** — `RIPEMD160(SHA256(compressed key))`, rendered as
//!    `NodeID-<cb58>`.
//!
//! Certificate parsing (the `staking` module) chains the two; the address
//! claim verifier reuses them to check who signed a claim.

pub mod node_id;
pub mod recovery;

pub use node_id::{derive_node_id, NodeId, NodeIdError, EMPTY_NODE_ID};
pub use recovery::{
    is_proof_extension, recover_from_extension, recover_secondary_key, rsa_public_key,
    RecoveryError,
};
