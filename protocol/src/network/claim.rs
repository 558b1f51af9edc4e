//! # Signed Address Claims
//!
//! "Node X is reachable at this address, as of this time", signed with X's
//! secondary key. Receivers check a claim against a certificate they already
//! trust (typically the one from the handshake) and never against the
//! certificate embedded in the claim itself, so a relayed claim can't be
//! passed off under somebody else's identity.
//!
//! Signed bytes have a fixed layout:
//!
//! ```text
//! +--------------------------+----------+----------------+
//! | IPv6 address (16, v4     | port     | timestamp      |
//! | addresses are v6-mapped) | u16 BE   | u64 BE seconds |
//! +--------------------------+----------+----------------+
//! ```
//!
//! On the wire a claim is a `u32` BE length followed by a bincode body.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::ClaimError;
use crate::config::{CLAIM_SIGNED_BYTES_LENGTH, MAX_CLAIM_FRAME_LEN, MAX_CLOCK_DIFFERENCE};
use crate::crypto::hash::sha256_array;
use crate::crypto::secp256k1::{recover_compact, SecondaryKey, COMPACT_SIGNATURE_LENGTH};
use crate::identity::derive_node_id;
use crate::staking::{parse_permissive, Certificate};
use crate::time::TimeSource;

/// Latest timestamp a claim may carry when received at `clock`'s now.
pub fn max_claim_timestamp(clock: &dyn TimeSource) -> u64 {
    clock
        .unix_now()
        .saturating_add(MAX_CLOCK_DIFFERENCE.as_secs())
}

/// An address and the time it was claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsignedAddressClaim {
    /// Where the claimant can be reached.
    pub addr: SocketAddr,
    /// Unix seconds.
    pub timestamp: u64,
}

impl UnsignedAddressClaim {
    /// Claim `addr` as of `timestamp`.
    pub fn new(addr: SocketAddr, timestamp: u64) -> Self {
        Self { addr, timestamp }
    }

    /// The canonical signed serialization.
    pub fn signed_bytes(&self) -> [u8; CLAIM_SIGNED_BYTES_LENGTH] {
        let ip = match self.addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        let mut buf = BytesMut::with_capacity(CLAIM_SIGNED_BYTES_LENGTH);
        buf.put_slice(&ip.octets());
        buf.put_u16(self.addr.port());
        buf.put_u64(self.timestamp);

        let mut out = [0u8; CLAIM_SIGNED_BYTES_LENGTH];
        out.copy_from_slice(&buf);
        out
    }

    fn digest(&self) -> [u8; 32] {
        sha256_array(&self.signed_bytes())
    }
}

/// A claim, its signature, and the claimant's certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAddressClaim {
    claim: UnsignedAddressClaim,
    certificate: Certificate,
    signature: [u8; COMPACT_SIGNATURE_LENGTH],
}

#[derive(Serialize, Deserialize)]
struct ClaimFrame {
    ip: IpAddr,
    port: u16,
    timestamp: u64,
    certificate: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedAddressClaim {
    /// Sign `claim` with the claimant's secondary key.
    pub fn sign(
        claim: UnsignedAddressClaim,
        key: &SecondaryKey,
        certificate: Certificate,
    ) -> Result<Self, ClaimError> {
        let signature = key.sign_compact(&claim.digest())?;
        Ok(Self {
            claim,
            certificate,
            signature,
        })
    }

    /// The unsigned part.
    pub fn claim(&self) -> &UnsignedAddressClaim {
        &self.claim
    }

    /// Certificate the claimant attached. Not trusted by [`verify`](Self::verify).
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The compact-recoverable signature.
    pub fn signature(&self) -> &[u8; COMPACT_SIGNATURE_LENGTH] {
        &self.signature
    }

    /// Check the claim was signed by the holder of `expected` and is not
    /// dated after `max_timestamp` (inclusive).
    pub fn verify(&self, expected: &Certificate, max_timestamp: u64) -> Result<(), ClaimError> {
        if self.claim.timestamp > max_timestamp {
            return Err(ClaimError::TimestampTooFarInFuture {
                timestamp: self.claim.timestamp,
                max_timestamp,
            });
        }
        let signer = recover_compact(&self.signature, &self.claim.digest())
            .map_err(|_| ClaimError::InvalidSignature)?;
        if derive_node_id(&signer) != expected.node_id() {
            return Err(ClaimError::InvalidSignature);
        }
        Ok(())
    }

    /// Bincode body, without the length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, ClaimError> {
        let frame = ClaimFrame {
            ip: self.claim.addr.ip(),
            port: self.claim.addr.port(),
            timestamp: self.claim.timestamp,
            certificate: self.certificate.raw().to_vec(),
            signature: self.signature.to_vec(),
        };
        Ok(bincode::serialize(&frame)?)
    }

    /// Decode a bincode body. The embedded certificate is parsed
    /// permissively.
    pub fn decode(body: &[u8]) -> Result<Self, ClaimError> {
        let frame: ClaimFrame = bincode::deserialize(body)?;
        let signature = <[u8; COMPACT_SIGNATURE_LENGTH]>::try_from(frame.signature.as_slice())
            .map_err(|_| ClaimError::InvalidSignature)?;
        Ok(Self {
            claim: UnsignedAddressClaim::new(SocketAddr::new(frame.ip, frame.port), frame.timestamp),
            certificate: parse_permissive(&frame.certificate)?,
            signature,
        })
    }
}

/// Write one length-prefixed claim.
pub async fn write_claim<W>(writer: &mut W, claim: &SignedAddressClaim) -> Result<(), ClaimError>
where
    W: AsyncWrite + Unpin,
{
    let body = claim.encode()?;
    if body.len() > MAX_CLAIM_FRAME_LEN {
        return Err(ClaimError::FrameTooLarge {
            len: body.len(),
            max: MAX_CLAIM_FRAME_LEN,
        });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed claim.
pub async fn read_claim<R>(reader: &mut R) -> Result<SignedAddressClaim, ClaimError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_CLAIM_FRAME_LEN {
        return Err(ClaimError::FrameTooLarge {
            len,
            max: MAX_CLAIM_FRAME_LEN,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    SignedAddressClaim::decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::StakingCredentials;
    use crate::time::FixedTimeSource;
    use std::sync::OnceLock;

    fn alice() -> &'static StakingCredentials {
        static CREDS: OnceLock<StakingCredentials> = OnceLock::new();
        CREDS.get_or_init(|| StakingCredentials::generate().unwrap())
    }

    fn bob() -> &'static StakingCredentials {
        static CREDS: OnceLock<StakingCredentials> = OnceLock::new();
        CREDS.get_or_init(|| StakingCredentials::generate().unwrap())
    }

    fn claim_by(creds: &StakingCredentials, timestamp: u64) -> SignedAddressClaim {
        let addr: SocketAddr = "10.0.0.7:9651".parse().unwrap();
        SignedAddressClaim::sign(
            UnsignedAddressClaim::new(addr, timestamp),
            creds.secondary(),
            creds.certificate().clone(),
        )
        .unwrap()
    }

    #[test]
    fn signed_bytes_layout() {
        let claim = UnsignedAddressClaim::new("1.2.3.4:258".parse().unwrap(), 0x0102_0304_0506_0708);
        let bytes = claim.signed_bytes();
        assert_eq!(&bytes[..10], &[0u8; 10]);
        assert_eq!(&bytes[10..12], &[0xff, 0xff]);
        assert_eq!(&bytes[12..16], &[1, 2, 3, 4]);
        assert_eq!(&bytes[16..18], &[1, 2]);
        assert_eq!(&bytes[18..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn timestamp_bound_is_inclusive() {
        let t = 1_700_000_000;
        assert!(claim_by(alice(), t - 1).verify(alice().certificate(), t).is_ok());
        assert!(claim_by(alice(), t).verify(alice().certificate(), t).is_ok());
        assert!(matches!(
            claim_by(alice(), t + 1).verify(alice().certificate(), t),
            Err(ClaimError::TimestampTooFarInFuture { timestamp, max_timestamp })
                if timestamp == t + 1 && max_timestamp == t
        ));
    }

    #[test]
    fn signer_must_match_expected_certificate() {
        let claim = claim_by(alice(), 10);
        assert!(matches!(
            claim.verify(bob().certificate(), 10),
            Err(ClaimError::InvalidSignature)
        ));
    }

    #[test]
    fn embedded_certificate_is_not_trusted() {
        // Alice signs, but attaches Bob's certificate.
        let claim = SignedAddressClaim::sign(
            UnsignedAddressClaim::new("10.0.0.7:9651".parse().unwrap(), 10),
            alice().secondary(),
            bob().certificate().clone(),
        )
        .unwrap();
        assert!(claim.verify(claim.certificate(), 10).is_err());
        assert!(claim.verify(alice().certificate(), 10).is_ok());
    }

    #[test]
    fn tampered_address_fails() {
        let claim = claim_by(alice(), 10);
        let forged = SignedAddressClaim {
            claim: UnsignedAddressClaim::new("10.0.0.8:9651".parse().unwrap(), 10),
            ..claim
        };
        assert!(matches!(
            forged.verify(alice().certificate(), 10),
            Err(ClaimError::InvalidSignature)
        ));
    }

    #[test]
    fn clock_bound_allows_sixty_seconds_of_skew() {
        let clock = FixedTimeSource::from_unix(1_000);
        assert_eq!(max_claim_timestamp(&clock), 1_060);
    }

    #[tokio::test]
    async fn frames_survive_a_pipe() {
        let claim = claim_by(bob(), 42);
        let (mut a, mut b) = tokio::io::duplex(8 * 1024);
        write_claim(&mut a, &claim).await.unwrap();
        let received = read_claim(&mut b).await.unwrap();
        assert_eq!(received, claim);
        assert!(received.verify(bob().certificate(), 42).is_ok());
    }

    #[tokio::test]
    async fn oversized_frame_is_refused_before_reading() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_CLAIM_FRAME_LEN + 1) as u32).await.unwrap();
        assert!(matches!(
            read_claim(&mut b).await,
            Err(ClaimError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn short_signature_in_frame_is_invalid() {
        let claim = claim_by(alice(), 5);
        let frame = ClaimFrame {
            ip: claim.claim.addr.ip(),
            port: claim.claim.addr.port(),
            timestamp: 5,
            certificate: claim.certificate.raw().to_vec(),
            signature: vec![1, 2, 3],
        };
        let body = bincode::serialize(&frame).unwrap();
        assert!(matches!(
            SignedAddressClaim::decode(&body),
            Err(ClaimError::InvalidSignature)
        ));
    }
}
