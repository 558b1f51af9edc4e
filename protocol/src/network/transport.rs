//! # Handshake Primitive
//!
//! The upgrader doesn't care how two peers end up with an encrypted pipe,
//! only that the remote side presented a certificate chain along the way.
//! [`Handshaker`] is that seam: TLS in production, a scripted fake in tests.

use async_trait::async_trait;
use std::fmt;
use std::io;

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialled out; acts as the transport client.
    Initiator,
    /// Accepted; acts as the transport server.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Result of a completed handshake.
pub struct Handshake<S> {
    /// The secured stream.
    pub stream: S,
    /// DER certificates the peer presented, leaf first. May be empty.
    pub peer_certificates: Vec<Vec<u8>>,
}

impl<S> fmt::Debug for Handshake<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("peer_certificates", &self.peer_certificates.len())
            .finish_non_exhaustive()
    }
}

/// Mutual handshake over a raw connection.
///
/// Implementations must be shareable across connection tasks. Errors are
/// reported as plain `io::Error` and the upgrader hands them back untouched.
#[async_trait]
pub trait Handshaker<IO>: Send + Sync
where
    IO: Send + 'static,
{
    /// The secured stream type.
    type Stream: Send;

    /// Run the handshake for `role`.
    async fn handshake(&self, io: IO, role: Role) -> io::Result<Handshake<Self::Stream>>;
}
