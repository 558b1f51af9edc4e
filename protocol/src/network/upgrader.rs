//! # Channel Upgrader
//!
//! Turns a raw connection into `(secure stream, NodeID, certificate)`.
//!
//! ```text
//! Idle -> Handshaking -> Authenticated
//!                     \-> Rejected
//! ```
//!
//! One upgrader per role, shared by every connection of that role. The only
//! mutable state is the invalid-certificate counter, which is atomic, so
//! `upgrade` can run on as many tasks at once as there are connections.
//!
//! Which certificate parser runs is decided per call from the clock and the
//! configured upgrade epoch: strict before it, permissive from it on.

use chrono::{DateTime, Utc};
use prometheus::IntCounter;
use std::sync::Arc;

use super::error::UpgradeError;
use super::transport::{Handshaker, Role};
use crate::identity::NodeId;
use crate::staking::{parse_certificate, validate_certificate, Certificate, ParseMode};
use crate::time::{SharedTimeSource, SystemTimeSource};
use crate::upgrade::UpgradeSchedule;

/// An authenticated connection.
#[derive(Debug)]
pub struct Upgraded<S> {
    /// The secured stream.
    pub stream: S,
    /// The peer's identity.
    pub node_id: NodeId,
    /// The certificate the identity came from.
    pub certificate: Certificate,
}

/// Upgrades raw connections for one role.
pub struct Upgrader<H> {
    role: Role,
    handshaker: Arc<H>,
    epoch: DateTime<Utc>,
    clock: SharedTimeSource,
    invalid_certificates: IntCounter,
}

impl<H> Clone for Upgrader<H> {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            handshaker: Arc::clone(&self.handshaker),
            epoch: self.epoch,
            clock: Arc::clone(&self.clock),
            invalid_certificates: self.invalid_certificates.clone(),
        }
    }
}

impl<H> Upgrader<H> {
    /// Upgrader for `role`. `invalid_certificates` is incremented once per
    /// rejected peer certificate.
    pub fn new(
        role: Role,
        handshaker: Arc<H>,
        epoch: DateTime<Utc>,
        invalid_certificates: IntCounter,
    ) -> Self {
        Self {
            role,
            handshaker,
            epoch,
            clock: Arc::new(SystemTimeSource),
            invalid_certificates,
        }
    }

    /// Upgrader for dialled connections.
    pub fn initiator(handshaker: Arc<H>, epoch: DateTime<Utc>, counter: IntCounter) -> Self {
        Self::new(Role::Initiator, handshaker, epoch, counter)
    }

    /// Upgrader for accepted connections.
    pub fn responder(handshaker: Arc<H>, epoch: DateTime<Utc>, counter: IntCounter) -> Self {
        Self::new(Role::Responder, handshaker, epoch, counter)
    }

    /// Replace the clock used for the epoch rule.
    pub fn with_time_source(mut self, clock: SharedTimeSource) -> Self {
        self.clock = clock;
        self
    }

    /// Role this upgrader plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The configured upgrade epoch.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Parser selected for a connection starting now.
    pub fn parse_mode(&self) -> ParseMode {
        UpgradeSchedule::mode_at(self.epoch, self.clock.now())
    }

    /// The invalid-certificate counter.
    pub fn invalid_certificates(&self) -> &IntCounter {
        &self.invalid_certificates
    }

    /// Parse and validate the peer's leaf certificate.
    ///
    /// Increments the counter on failure. Never called when the peer sent
    /// no certificate.
    fn authenticate(&self, leaf: &[u8], mode: ParseMode) -> Result<Certificate, UpgradeError> {
        let checked = parse_certificate(leaf, mode)
            .map_err(UpgradeError::from)
            .and_then(|cert| {
                validate_certificate(&cert)?;
                Ok(cert)
            });
        if let Err(err) = &checked {
            self.invalid_certificates.inc();
            tracing::warn!(role = %self.role, %mode, reason = %err, "rejected peer certificate");
        }
        checked
    }

    /// Handshake over `io` and authenticate the peer.
    ///
    /// Transport errors come back untouched in [`UpgradeError::Transport`].
    pub async fn upgrade<IO>(
        &self,
        io: IO,
    ) -> Result<Upgraded<<H as Handshaker<IO>>::Stream>, UpgradeError>
    where
        H: Handshaker<IO>,
        IO: Send + 'static,
    {
        let mode = self.parse_mode();
        let handshake = self.handshaker.handshake(io, self.role).await?;

        let Some(leaf) = handshake.peer_certificates.first() else {
            tracing::debug!(role = %self.role, "peer presented no certificate");
            return Err(UpgradeError::NoPeerCertificate);
        };

        let certificate = self.authenticate(leaf, mode)?;
        let node_id = certificate.node_id();
        tracing::debug!(role = %self.role, %mode, peer = %node_id, "upgraded connection");

        Ok(Upgraded {
            stream: handshake.stream,
            node_id,
            certificate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{PrimaryKey, SecondaryKey};
    use crate::network::transport::Handshake;
    use crate::staking::{CertificateBuilder, StakingCredentials};
    use crate::time::FixedTimeSource;
    use async_trait::async_trait;
    use std::io;

    /// Hands back a fixed certificate list without touching the stream.
    struct Scripted(Result<Vec<Vec<u8>>, io::ErrorKind>);

    #[async_trait]
    impl Handshaker<()> for Scripted {
        type Stream = ();

        async fn handshake(&self, _io: (), _role: Role) -> io::Result<Handshake<()>> {
            match &self.0 {
                Ok(certs) => Ok(Handshake {
                    stream: (),
                    peer_certificates: certs.clone(),
                }),
                Err(kind) => Err(io::Error::new(*kind, "scripted failure")),
            }
        }
    }

    fn counter() -> IntCounter {
        IntCounter::new("invalid_peer_certificates_total", "test").unwrap()
    }

    fn upgrader(certs: Result<Vec<Vec<u8>>, io::ErrorKind>) -> Upgrader<Scripted> {
        Upgrader::responder(Arc::new(Scripted(certs)), DateTime::<Utc>::MIN_UTC, counter())
    }

    #[tokio::test]
    async fn good_certificate_is_authenticated() {
        let creds = StakingCredentials::generate().unwrap();
        let up = upgrader(Ok(vec![creds.certificate().raw().to_vec()]));

        let upgraded = up.upgrade(()).await.unwrap();
        assert_eq!(upgraded.node_id, creds.node_id());
        assert_eq!(upgraded.certificate, *creds.certificate());
        assert_eq!(up.invalid_certificates().get(), 0);
    }

    #[tokio::test]
    async fn no_certificate_does_not_count_as_invalid() {
        let up = upgrader(Ok(vec![]));
        let err = up.upgrade(()).await.unwrap_err();
        assert!(matches!(err, UpgradeError::NoPeerCertificate));
        assert_eq!(up.invalid_certificates().get(), 0);
    }

    #[tokio::test]
    async fn malformed_certificate_counts_once() {
        let up = upgrader(Ok(vec![b"garbage".to_vec()]));
        let err = up.upgrade(()).await.unwrap_err();
        assert!(err.is_invalid_certificate());
        assert_eq!(up.invalid_certificates().get(), 1);
    }

    #[tokio::test]
    async fn transport_errors_pass_through_verbatim() {
        let up = upgrader(Err(io::ErrorKind::ConnectionReset));
        match up.upgrade(()).await {
            Err(UpgradeError::Transport(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "scripted failure");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(up.invalid_certificates().get(), 0);
    }

    #[tokio::test]
    async fn epoch_selects_parser() {
        let primary = PrimaryKey::generate().unwrap();
        let secondary = SecondaryKey::derive_from_primary(&primary).unwrap();
        let der = CertificateBuilder::new(&primary)
            .with_raw_proof(vec![0u8; 65])
            .with_proof_by(&secondary)
            .unwrap()
            .build()
            .unwrap();

        let epoch = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let before = Arc::new(FixedTimeSource::from_unix(1_699_999_999));
        let at = Arc::new(FixedTimeSource::from_unix(1_700_000_000));
        let scripted = Arc::new(Scripted(Ok(vec![der])));

        let strict = Upgrader::initiator(scripted.clone(), epoch, counter()).with_time_source(before);
        assert_eq!(strict.parse_mode(), ParseMode::Strict);
        assert!(strict.upgrade(()).await.unwrap_err().is_invalid_certificate());
        assert_eq!(strict.invalid_certificates().get(), 1);

        let permissive = Upgrader::initiator(scripted, epoch, counter()).with_time_source(at);
        assert_eq!(permissive.parse_mode(), ParseMode::Permissive);
        let upgraded = permissive.upgrade(()).await.unwrap();
        assert!(!upgraded.node_id.is_empty());
        assert_eq!(permissive.invalid_certificates().get(), 0);
    }

    #[tokio::test]
    async fn only_the_leaf_is_inspected() {
        let creds = StakingCredentials::generate().unwrap();
        let up = upgrader(Ok(vec![
            creds.certificate().raw().to_vec(),
            b"junk intermediate".to_vec(),
        ]));
        assert_eq!(up.upgrade(()).await.unwrap().node_id, creds.node_id());
    }
}
