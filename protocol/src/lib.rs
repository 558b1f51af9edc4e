// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Keybind Protocol — Core Library
//!
//! The root of trust for a peer-to-peer node. Peers don't get handed an
//! identity by anyone; they carry it inside the TLS certificate they present
//! during a mutual handshake, and they repeat it out-of-band in signed,
//! timestamped address claims used for discovery.
//!
//! The trick: every staking certificate has an RSA primary key (the one TLS
//! actually signs with) and a secp256k1 secondary key that never appears on
//! the wire. Instead, the certificate carries a recoverable signature by the
//! secondary key over the primary key. Recover the signer, hash it, and you
//! have the node's 20-byte [`NodeId`](identity::NodeId).
//!
//! ## Architecture
//!
//! - **crypto** — SHA-256 / RIPEMD-160 helpers, the RSA primary key and the
//!   secp256k1 compact-recoverable signatures.
//! - **identity** — NodeID derivation and the key-recovery primitive.
//! - **staking** — Building, parsing and validating identity certificates,
//!   plus credential files on disk.
//! - **network** — The channel upgrader (raw stream in, authenticated stream
//!   plus NodeID out), the TLS handshake primitive, and signed address claims.
//! - **upgrade** — Per-network upgrade epochs, injected rather than global.
//! - **time** — Clock sources, so tests can pin "now".
//! - **config** — Protocol constants.
//!
//! ## Ground rules
//!
//! 1. Every rejection is a value, never a panic. One bad peer must not take
//!    the node down.
//! 2. Certificate bytes are kept exactly as received. NodeIDs are derived
//!    once, at parse time.
//! 3. Everything here is safe to share across connection tasks.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod network;
pub mod staking;
pub mod time;
pub mod upgrade;
