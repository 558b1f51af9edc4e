//! # Peer Connections
//!
//! Every connection, accepted or dialled, goes through the same steps:
//!
//! ```text
//! upgrade (TLS + certificate) -> claim exchange -> held open until EOF
//! ```
//!
//! The dialling side sends its claim first. A connection whose claim fails
//! verification is dropped; the peer's certificate is still the identity
//! the claim is checked against, never the one inside the claim.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use prometheus::IntGauge;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use keybind_protocol::config::HANDSHAKE_TIMEOUT;
use keybind_protocol::identity::NodeId;
use keybind_protocol::network::{
    max_claim_timestamp, read_claim, write_claim, ClaimError, Role, SignedAddressClaim,
    TlsHandshaker, UnsignedAddressClaim, Upgrader,
};
use keybind_protocol::staking::{Certificate, StakingCredentials};
use keybind_protocol::time::{SharedTimeSource, SystemTimeSource};

use crate::metrics::SharedMetrics;

/// Decrements `connected_peers` when the connection goes away.
struct ConnectedPeer(IntGauge);

impl ConnectedPeer {
    fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ConnectedPeer {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// An authenticated peer whose address claim checked out.
pub struct PeerSession<S> {
    /// The peer's identity.
    pub node_id: NodeId,
    /// Where the peer says it can be reached.
    pub claimed_addr: SocketAddr,
    stream: S,
    _connected: ConnectedPeer,
}

/// Everything a connection task needs. Shared by all of them.
pub struct PeerContext {
    credentials: Arc<StakingCredentials>,
    public_addr: SocketAddr,
    initiator: Upgrader<TlsHandshaker>,
    responder: Upgrader<TlsHandshaker>,
    metrics: SharedMetrics,
    clock: SharedTimeSource,
    handshake_timeout: Duration,
}

impl PeerContext {
    /// Build both upgraders for `credentials` with the given epoch.
    pub fn new(
        credentials: StakingCredentials,
        public_addr: SocketAddr,
        epoch: DateTime<Utc>,
        metrics: SharedMetrics,
    ) -> Result<Self> {
        let tls = Arc::new(TlsHandshaker::new(&credentials).context("building tls config")?);
        let invalid = metrics.invalid_peer_certificates_total.clone();
        Ok(Self {
            credentials: Arc::new(credentials),
            public_addr,
            initiator: Upgrader::initiator(Arc::clone(&tls), epoch, invalid.clone()),
            responder: Upgrader::responder(tls, epoch, invalid),
            metrics,
            clock: Arc::new(SystemTimeSource),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        })
    }

    /// Our own NodeID.
    pub fn node_id(&self) -> NodeId {
        self.credentials.node_id()
    }

    fn own_claim(&self) -> Result<SignedAddressClaim, ClaimError> {
        SignedAddressClaim::sign(
            UnsignedAddressClaim::new(self.public_addr, self.clock.unix_now()),
            self.credentials.secondary(),
            self.credentials.certificate().clone(),
        )
    }

    async fn exchange_claims<S>(
        &self,
        stream: &mut S,
        role: Role,
        peer: &Certificate,
    ) -> Result<SignedAddressClaim, ClaimError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let own = self.own_claim()?;
        let received = match role {
            Role::Initiator => {
                write_claim(stream, &own).await?;
                read_claim(stream).await?
            }
            Role::Responder => {
                let received = read_claim(stream).await?;
                write_claim(stream, &own).await?;
                received
            }
        };
        received.verify(peer, max_claim_timestamp(self.clock.as_ref()))?;
        Ok(received)
    }

    /// Override the time budget for [`establish`](Self::establish).
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Upgrade `io` and exchange claims, all within the handshake timeout.
    pub async fn establish<IO>(
        &self,
        io: IO,
        remote: SocketAddr,
        role: Role,
    ) -> Result<PeerSession<tokio_rustls::TlsStream<IO>>>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        tokio::time::timeout(self.handshake_timeout, self.authenticate(io, remote, role))
            .await
            .map_err(|_| anyhow!("handshake with {remote} timed out"))?
    }

    async fn authenticate<IO>(
        &self,
        io: IO,
        remote: SocketAddr,
        role: Role,
    ) -> Result<PeerSession<tokio_rustls::TlsStream<IO>>>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let upgrader = match role {
            Role::Initiator => &self.initiator,
            Role::Responder => &self.responder,
        };
        let upgraded = upgrader
            .upgrade(io)
            .await
            .with_context(|| format!("upgrading connection with {remote}"))?;
        self.metrics.peer_upgrades_total.inc();

        let mut stream = upgraded.stream;
        let claim = match self
            .exchange_claims(&mut stream, role, &upgraded.certificate)
            .await
        {
            Ok(claim) => claim,
            Err(err) => {
                if !matches!(err, ClaimError::Io(_)) {
                    self.metrics.address_claims_rejected_total.inc();
                }
                return Err(anyhow::Error::new(err)
                    .context(format!("address claim from {}", upgraded.node_id)));
            }
        };

        Ok(PeerSession {
            node_id: upgraded.node_id,
            claimed_addr: claim.claim().addr,
            stream,
            _connected: ConnectedPeer::new(&self.metrics.connected_peers),
        })
    }

    /// Run one connection to completion.
    async fn handle<IO>(&self, io: IO, remote: SocketAddr, role: Role) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut session = self.establish(io, remote, role).await?;
        tracing::info!(
            peer = %session.node_id,
            %remote,
            claimed = %session.claimed_addr,
            %role,
            "peer connected"
        );
        match drain(&mut session.stream).await {
            Ok(bytes) => tracing::info!(peer = %session.node_id, bytes, "peer disconnected"),
            Err(e) => tracing::debug!(
                peer = %session.node_id,
                error = %e,
                "peer connection closed with error"
            ),
        }
        Ok(())
    }
}

/// Read and discard everything the peer sends until EOF.
async fn drain<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<u64> {
    tokio::io::copy(stream, &mut tokio::io::sink()).await
}

/// Accept peers forever.
pub async fn accept_loop(listener: TcpListener, ctx: Arc<PeerContext>) -> Result<()> {
    loop {
        let (stream, remote) = listener
            .accept()
            .await
            .context("accepting peer connection")?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = ctx.handle(stream, remote, Role::Responder).await {
                tracing::warn!(%remote, error = %format!("{e:#}"), "inbound peer rejected");
            }
        });
    }
}

/// Dial `addr` and run the connection to completion.
pub async fn dial(ctx: Arc<PeerContext>, addr: SocketAddr) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    ctx.handle(stream, addr, Role::Initiator).await
}
