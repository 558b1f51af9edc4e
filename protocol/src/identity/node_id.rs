//! # NodeID
//!
//! A NodeID is the 20-byte name of a peer:
//!
//! ```text
//! secondary public key (33 bytes, SEC1 compressed)
//!     -> SHA-256            -> 32 bytes
//!     -> RIPEMD-160         -> 20 bytes
//!     -> "NodeID-" + cb58   -> NodeID-6HgC8KRBEhXYbF4riJyJFLSHt37UNuRt
//! ```
//!
//! Derived exactly once per certificate, at parse time. The all-zero
//! [`EMPTY_NODE_ID`] is what failed derivations hand back, and it never
//! names a real peer: callers must treat it as "no identity".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{NODE_ID_LENGTH, NODE_ID_PREFIX};
use crate::crypto::hash::{cb58_decode, cb58_encode, hash160, Cb58Error};
use crate::crypto::secp256k1::CompressedPublicKey;

/// Errors parsing a textual or binary NodeID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeIdError {
    /// Text doesn't start with `NodeID-`.
    #[error("node id must start with {NODE_ID_PREFIX:?}")]
    MissingPrefix,

    /// The cb58 body didn't decode.
    #[error("invalid node id encoding: {0}")]
    Encoding(#[from] Cb58Error),

    /// Wrong number of bytes.
    #[error("node id must be {NODE_ID_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A peer's 20-byte identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; NODE_ID_LENGTH]);

/// The "no identity" sentinel.
pub const EMPTY_NODE_ID: NodeId = NodeId([0u8; NODE_ID_LENGTH]);

impl NodeId {
    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Wrap a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, NodeIdError> {
        let arr: [u8; NODE_ID_LENGTH] = bytes
            .try_into()
            .map_err(|_| NodeIdError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LENGTH] {
        &self.0
    }

    /// True for the all-zero sentinel.
    pub fn is_empty(&self) -> bool {
        *self == EMPTY_NODE_ID
    }
}

/// `RIPEMD160(SHA256(compressed key))`.
pub fn derive_node_id(key: &CompressedPublicKey) -> NodeId {
    NodeId(hash160(key.as_bytes()))
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NODE_ID_PREFIX, cb58_encode(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(NODE_ID_PREFIX)
            .ok_or(NodeIdError::MissingPrefix)?;
        let bytes = cb58_decode(body)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            NodeId::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
