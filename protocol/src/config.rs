//! # Protocol Configuration & Constants
//!
//! Every magic number of the identity scheme lives here. Most of these are
//! wire-visible: changing one means every peer on the network has to change
//! it at the same moment, which is what upgrade epochs are for.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet network id.
pub const NETWORK_ID_MAINNET: u32 = 1;

/// Fuji test network id.
pub const NETWORK_ID_FUJI: u32 = 5;

/// Camino main network id.
pub const NETWORK_ID_CAMINO: u32 = 1000;

/// Columbus test network id.
pub const NETWORK_ID_COLUMBUS: u32 = 1001;

/// Kopernikus dev network id.
pub const NETWORK_ID_KOPERNIKUS: u32 = 1002;

/// Local network id, used by single-machine test setups.
pub const NETWORK_ID_LOCAL: u32 = 12345;

/// Resolve a network name (as typed on the command line) to its id.
pub fn network_id_from_name(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "mainnet" => Some(NETWORK_ID_MAINNET),
        "fuji" => Some(NETWORK_ID_FUJI),
        "camino" => Some(NETWORK_ID_CAMINO),
        "columbus" => Some(NETWORK_ID_COLUMBUS),
        "kopernikus" => Some(NETWORK_ID_KOPERNIKUS),
        "local" => Some(NETWORK_ID_LOCAL),
        other => other.parse().ok(),
    }
}

// ---------------------------------------------------------------------------
// Identity Certificate
// ---------------------------------------------------------------------------

/// OID of the extension carrying the secondary-key proof: PKCS#9
/// `localKeyId` (1.2.840.113549.1.9.21). Nobody uses it for its original
/// purpose, so it doesn't collide with what off-the-shelf tooling emits.
pub const NODE_PROOF_OID: &[u64] = &[1, 2, 840, 113549, 1, 9, 21];

/// Dotted form of [`NODE_PROOF_OID`], as x509-parser renders it.
pub const NODE_PROOF_OID_STR: &str = "1.2.840.113549.1.9.21";

/// Required X.509 version tag. The tag is zero-based, so 2 means v3.
pub const CERTIFICATE_VERSION: u32 = 2;

/// Upper bound on an encoded staking certificate. Anything larger is
/// rejected before the ASN.1 parser sees it.
pub const MAX_CERTIFICATE_LEN: usize = 2 * 1024;

/// RSA modulus sizes a staking certificate may carry.
pub const ALLOWED_RSA_MODULUS_BITS: [usize; 2] = [2048, 4096];

/// The only RSA public exponent we accept.
pub const ALLOWED_RSA_PUBLIC_EXPONENT: u32 = 65_537;

/// Modulus size used when generating fresh primary keys.
pub const DEFAULT_RSA_MODULUS_BITS: usize = 2048;

// ---------------------------------------------------------------------------
// NodeID
// ---------------------------------------------------------------------------

/// NodeID length in bytes (RIPEMD-160 output).
pub const NODE_ID_LENGTH: usize = 20;

/// Prefix of the textual NodeID form.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// Checksum bytes appended before base58 encoding.
pub const CB58_CHECKSUM_LENGTH: usize = 4;

// ---------------------------------------------------------------------------
// Address Claims
// ---------------------------------------------------------------------------

/// How far into the future a peer's claim timestamp may be, relative to our
/// own clock, before we refuse it.
pub const MAX_CLOCK_DIFFERENCE: Duration = Duration::from_secs(60);

/// Canonical claim layout: 16-byte IPv6 address, u16 port, u64 timestamp.
pub const CLAIM_SIGNED_BYTES_LENGTH: usize = 16 + 2 + 8;

/// Upper bound on a framed claim on the wire (certificate + signature +
/// address + framing overhead).
pub const MAX_CLAIM_FRAME_LEN: usize = MAX_CERTIFICATE_LEN + 256;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Server name presented in the client hello. Peers are identified by their
/// certificate, never by name, so this is a fixed placeholder.
pub const TLS_SERVER_NAME: &str = "localhost";

/// Default peer-to-peer listening port.
pub const DEFAULT_P2P_PORT: u16 = 9651;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9652;

/// Time budget for a full upgrade (TCP already connected, TLS + claim).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_forms_agree() {
        let dotted: Vec<String> = NODE_PROOF_OID.iter().map(|a| a.to_string()).collect();
        assert_eq!(dotted.join("."), NODE_PROOF_OID_STR);
    }

    #[test]
    fn network_names_resolve() {
        assert_eq!(network_id_from_name("Camino"), Some(NETWORK_ID_CAMINO));
        assert_eq!(network_id_from_name("local"), Some(NETWORK_ID_LOCAL));
        assert_eq!(network_id_from_name("4242"), Some(4242));
        assert_eq!(network_id_from_name("atlantis"), None);
    }
}
