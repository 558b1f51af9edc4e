//! # TLS Handshaker
//!
//! Mutual TLS over any async byte stream, with identities that no CA ever
//! signed. Certificate chains are therefore not validated here at all; the
//! only thing checked during the handshake is that the peer really holds the
//! RSA key inside the certificate it sent. Deciding whether that certificate
//! names a valid node is the upgrader's job.
//!
//! Both configs are built once from the local [`StakingCredentials`] and
//! shared by every connection.

use async_trait::async_trait;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{
    CertificateError as TlsCertificateError, ClientConfig, DigitallySignedStruct,
    DistinguishedName, Error as TlsError, ServerConfig, SignatureScheme,
};
use sha2::{Sha256, Sha384, Sha512};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::transport::{Handshake, Handshaker, Role};
use crate::config::TLS_SERVER_NAME;
use crate::identity::rsa_public_key;
use crate::staking::StakingCredentials;

/// Handshake signature schemes we can check against an RSA certificate key.
const SUPPORTED_SCHEMES: [SignatureScheme; 6] = [
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PSS_SHA384,
    SignatureScheme::RSA_PSS_SHA512,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
];

// ---------------------------------------------------------------------------
// Signature checks
// ---------------------------------------------------------------------------

fn certificate_key(cert: &CertificateDer<'_>) -> Result<RsaPublicKey, TlsError> {
    let (_, x509) = X509Certificate::from_der(cert.as_ref())
        .map_err(|_| TlsError::InvalidCertificate(TlsCertificateError::BadEncoding))?;
    rsa_public_key(x509.public_key())
        .map_err(|e| TlsError::General(format!("peer certificate key: {e}")))
}

fn verify_pss<D>(key: RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<(), TlsError>
where
    D: sha2::Digest + sha2::digest::FixedOutputReset,
{
    let signature = rsa::pss::Signature::try_from(signature)
        .map_err(|_| TlsError::InvalidCertificate(TlsCertificateError::BadSignature))?;
    rsa::pss::VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .map_err(|_| TlsError::InvalidCertificate(TlsCertificateError::BadSignature))
}

fn verify_pkcs1<D>(key: RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<(), TlsError>
where
    D: sha2::Digest + rsa::pkcs8::AssociatedOid,
{
    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|_| TlsError::InvalidCertificate(TlsCertificateError::BadSignature))?;
    rsa::pkcs1v15::VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .map_err(|_| TlsError::InvalidCertificate(TlsCertificateError::BadSignature))
}

/// Check a handshake signature against the RSA key in `cert`.
fn verify_handshake_signature(
    message: &[u8],
    cert: &CertificateDer<'_>,
    dss: &DigitallySignedStruct,
) -> Result<HandshakeSignatureValid, TlsError> {
    let key = certificate_key(cert)?;
    let signature = dss.signature();
    match dss.scheme {
        SignatureScheme::RSA_PSS_SHA256 => verify_pss::<Sha256>(key, message, signature)?,
        SignatureScheme::RSA_PSS_SHA384 => verify_pss::<Sha384>(key, message, signature)?,
        SignatureScheme::RSA_PSS_SHA512 => verify_pss::<Sha512>(key, message, signature)?,
        SignatureScheme::RSA_PKCS1_SHA256 => verify_pkcs1::<Sha256>(key, message, signature)?,
        SignatureScheme::RSA_PKCS1_SHA384 => verify_pkcs1::<Sha384>(key, message, signature)?,
        SignatureScheme::RSA_PKCS1_SHA512 => verify_pkcs1::<Sha512>(key, message, signature)?,
        other => {
            return Err(TlsError::General(format!(
                "unsupported handshake signature scheme {other:?}"
            )))
        }
    }
    Ok(HandshakeSignatureValid::assertion())
}

// ---------------------------------------------------------------------------
// Verifiers
// ---------------------------------------------------------------------------

/// Accepts any peer certificate; only handshake signatures are checked.
#[derive(Debug)]
struct PeerCertificateVerifier;

impl ServerCertVerifier for PeerCertificateVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_handshake_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_handshake_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        SUPPORTED_SCHEMES.to_vec()
    }
}

impl ClientCertVerifier for PeerCertificateVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, TlsError> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_handshake_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_handshake_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        SUPPORTED_SCHEMES.to_vec()
    }
}

// ---------------------------------------------------------------------------
// Local identity
// ---------------------------------------------------------------------------

/// Always presents the node's own staking certificate.
#[derive(Debug)]
struct LocalIdentity(Arc<CertifiedKey>);

impl LocalIdentity {
    fn new(credentials: &StakingCredentials) -> Result<Self, TlsError> {
        let pkcs8 = credentials
            .primary()
            .to_pkcs8_der()
            .map_err(|e| TlsError::General(e.to_string()))?;
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkcs8));
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key_der)?;
        let chain = vec![CertificateDer::from(credentials.certificate().raw().to_vec())];
        Ok(Self(Arc::new(CertifiedKey::new(chain, signing_key))))
    }
}

impl ResolvesServerCert for LocalIdentity {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

impl ResolvesClientCert for LocalIdentity {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Handshaker
// ---------------------------------------------------------------------------

/// TLS 1.2 / 1.3 handshake presenting the local staking certificate.
#[derive(Clone)]
pub struct TlsHandshaker {
    connector: TlsConnector,
    acceptor: TlsAcceptor,
}

impl TlsHandshaker {
    /// Build client and server configs for `credentials`.
    pub fn new(credentials: &StakingCredentials) -> Result<Self, TlsError> {
        let identity = Arc::new(LocalIdentity::new(credentials)?);
        let verifier = Arc::new(PeerCertificateVerifier);
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let client = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_client_cert_resolver(identity.clone());

        let server = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(identity);

        Ok(Self {
            connector: TlsConnector::from(Arc::new(client)),
            acceptor: TlsAcceptor::from(Arc::new(server)),
        })
    }
}

impl std::fmt::Debug for TlsHandshaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsHandshaker").finish_non_exhaustive()
    }
}

#[async_trait]
impl<IO> Handshaker<IO> for TlsHandshaker
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = TlsStream<IO>;

    async fn handshake(&self, io: IO, role: Role) -> io::Result<Handshake<Self::Stream>> {
        let stream: TlsStream<IO> = match role {
            Role::Initiator => {
                let name = ServerName::try_from(TLS_SERVER_NAME)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                self.connector.connect(name, io).await?.into()
            }
            Role::Responder => self.acceptor.accept(io).await?.into(),
        };

        let peer_certificates = stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|chain| chain.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default();

        Ok(Handshake {
            stream,
            peer_certificates,
        })
    }
}
