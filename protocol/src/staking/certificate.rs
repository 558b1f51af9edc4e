//! # Staking Certificate Codec
//!
//! Parses identity certificates in one of two modes:
//!
//! - **Strict** — scan extensions in order; the first identity-proof
//!   extension decides. If it doesn't recover, the certificate is rejected.
//!   If it does, any later proof extension is ignored without a look.
//! - **Permissive** — same scan, but a proof extension that fails to recover
//!   is skipped and the scan continues. An older certificate generator could
//!   emit a broken proof next to a good one; this mode accepts those.
//!
//! Which mode applies is the caller's business (see [`crate::upgrade`]).
//!
//! A primary key that is not RSA is fatal in both modes: no later extension
//! can fix the key the proofs were made over.

use bytes::Bytes;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use std::fmt;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::X509Extension;
use x509_parser::oid_registry::OID_PKCS1_SHA256WITHRSA;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

use super::error::{CertificateError, ValidationError};
use crate::config::{
    ALLOWED_RSA_MODULUS_BITS, ALLOWED_RSA_PUBLIC_EXPONENT, CERTIFICATE_VERSION,
    MAX_CERTIFICATE_LEN,
};
use crate::crypto::secp256k1::CompressedPublicKey;
use crate::identity::{derive_node_id, recover_from_extension, rsa_public_key, NodeId, RecoveryError};

/// Which extension-scan policy to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// First proof extension decides.
    Strict,
    /// Broken proof extensions are skipped.
    Permissive,
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMode::Strict => f.write_str("strict"),
            ParseMode::Permissive => f.write_str("permissive"),
        }
    }
}

/// The certificate's own signature scheme. Only kept for the validation
/// step; nothing downstream branches on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// sha256WithRSAEncryption.
    Sha256WithRsa,
    /// Anything else, by dotted OID.
    Other(String),
}

/// A parsed, identity-bearing certificate. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    raw: Bytes,
    node_id: NodeId,
    public_key: RsaPublicKey,
    signature_algorithm: SignatureAlgorithm,
}

impl Certificate {
    /// The exact DER bytes this certificate was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Cheap shared handle on the raw bytes.
    pub fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// NodeID derived at parse time.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The primary RSA public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The certificate's signature scheme.
    pub fn signature_algorithm(&self) -> &SignatureAlgorithm {
        &self.signature_algorithm
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("node_id", &self.node_id)
            .field("len", &self.raw.len())
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

/// Parse with the strict extension policy.
pub fn parse_strict(bytes: &[u8]) -> Result<Certificate, CertificateError> {
    parse_certificate(bytes, ParseMode::Strict)
}

/// Parse with the permissive extension policy.
pub fn parse_permissive(bytes: &[u8]) -> Result<Certificate, CertificateError> {
    parse_certificate(bytes, ParseMode::Permissive)
}

/// Parse a DER certificate and derive its NodeID.
pub fn parse_certificate(bytes: &[u8], mode: ParseMode) -> Result<Certificate, CertificateError> {
    if bytes.len() > MAX_CERTIFICATE_LEN {
        return Err(CertificateError::CertificateTooLarge {
            len: bytes.len(),
            max: MAX_CERTIFICATE_LEN,
        });
    }

    let (rest, x509) = X509Certificate::from_der(bytes)
        .map_err(|e| CertificateError::MalformedCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CertificateError::MalformedCertificate(format!(
            "{} trailing bytes",
            rest.len()
        )));
    }

    let version = x509.version().0;
    if version != CERTIFICATE_VERSION {
        return Err(CertificateError::WrongCertificateVersion(version));
    }

    let extensions = x509.extensions();
    if extensions.is_empty() {
        return Err(CertificateError::NoCertificateExtensions);
    }

    let spki = x509.public_key();
    let secondary = scan_extensions(extensions, spki, mode)?;
    // A successful scan already proved the key is RSA.
    let public_key = rsa_public_key(spki)?;

    let signature_algorithm = if x509.signature_algorithm.algorithm == OID_PKCS1_SHA256WITHRSA {
        SignatureAlgorithm::Sha256WithRsa
    } else {
        SignatureAlgorithm::Other(x509.signature_algorithm.algorithm.to_id_string())
    };

    Ok(Certificate {
        raw: Bytes::copy_from_slice(bytes),
        node_id: derive_node_id(&secondary),
        public_key,
        signature_algorithm,
    })
}

fn scan_extensions(
    extensions: &[X509Extension<'_>],
    spki: &SubjectPublicKeyInfo<'_>,
    mode: ParseMode,
) -> Result<CompressedPublicKey, CertificateError> {
    let mut skipped: Option<RecoveryError> = None;

    for (index, ext) in extensions.iter().enumerate() {
        match recover_from_extension(ext, spki) {
            Ok(key) => return Ok(key),
            Err(RecoveryError::WrongExtensionType) => continue,
            Err(RecoveryError::NotRsaPublicKey) => {
                return Err(RecoveryError::NotRsaPublicKey.into());
            }
            Err(err) if mode == ParseMode::Permissive => {
                tracing::trace!(index, error = %err, "skipping unusable identity proof extension");
                skipped = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(match skipped {
        Some(err) => err.into(),
        None => CertificateError::MissingNodePubKey,
    })
}

/// Policy checks applied after a successful parse.
pub fn validate_certificate(cert: &Certificate) -> Result<(), ValidationError> {
    if let SignatureAlgorithm::Other(oid) = &cert.signature_algorithm {
        return Err(ValidationError::UnsupportedSignatureAlgorithm(oid.clone()));
    }

    let bits = cert.public_key.size() * 8;
    if !ALLOWED_RSA_MODULUS_BITS.contains(&bits) {
        return Err(ValidationError::UnsupportedModulusSize(bits));
    }

    if *cert.public_key.e() != BigUint::from(ALLOWED_RSA_PUBLIC_EXPONENT) {
        return Err(ValidationError::UnsupportedPublicExponent);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primary::PrimaryKey;
    use crate::crypto::secp256k1::SecondaryKey;
    use crate::staking::builder::{build_certificate, CertificateBuilder};
    use std::sync::OnceLock;

    fn primary() -> &'static PrimaryKey {
        static KEY: OnceLock<PrimaryKey> = OnceLock::new();
        KEY.get_or_init(|| PrimaryKey::generate().unwrap())
    }

    fn both_modes() -> [ParseMode; 2] {
        [ParseMode::Strict, ParseMode::Permissive]
    }

    #[test]
    fn built_certificate_yields_secondary_node_id() {
        let secondary = SecondaryKey::generate();
        let der = build_certificate(primary(), &secondary).unwrap();
        let expected = derive_node_id(&secondary.public_key());

        for mode in both_modes() {
            let cert = parse_certificate(&der, mode).unwrap();
            assert_eq!(cert.node_id(), expected);
            assert_eq!(cert.raw(), der.as_slice());
            assert_eq!(cert.public_key(), &primary().public_key());
            assert_eq!(cert.signature_algorithm(), &SignatureAlgorithm::Sha256WithRsa);
            validate_certificate(&cert).unwrap();
        }
    }

    #[test]
    fn parsing_twice_gives_same_node_id() {
        let der = build_certificate(primary(), &SecondaryKey::generate()).unwrap();
        let a = parse_strict(&der).unwrap();
        let b = parse_strict(&der).unwrap();
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(a, b);
    }

    #[test]
    fn broken_first_proof_splits_the_modes() {
        let secondary = SecondaryKey::generate();
        let der = CertificateBuilder::new(primary())
            .with_raw_proof(vec![0u8; 65])
            .with_proof_by(&secondary)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            parse_strict(&der).unwrap_err(),
            CertificateError::Recovery(RecoveryError::RecoveryFailed)
        );
        let cert = parse_permissive(&der).unwrap();
        assert_eq!(cert.node_id(), derive_node_id(&secondary.public_key()));
    }

    #[test]
    fn first_good_proof_wins_over_a_later_one() {
        let first = SecondaryKey::generate();
        let second = SecondaryKey::generate();
        let der = CertificateBuilder::new(primary())
            .with_proof_by(&first)
            .unwrap()
            .with_proof_by(&second)
            .unwrap()
            .build()
            .unwrap();

        let expected = derive_node_id(&first.public_key());
        for mode in both_modes() {
            assert_eq!(parse_certificate(&der, mode).unwrap().node_id(), expected);
        }
    }

    #[test]
    fn empty_proof_is_fatal_only_in_strict_mode() {
        let secondary = SecondaryKey::generate();
        let der = CertificateBuilder::new(primary())
            .with_raw_proof(Vec::new())
            .with_proof_by(&secondary)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            parse_strict(&der).unwrap_err(),
            CertificateError::Recovery(RecoveryError::MissingSignature)
        );
        assert!(parse_permissive(&der).is_ok());
    }

    #[test]
    fn only_broken_proofs_report_the_recovery_error() {
        let der = CertificateBuilder::new(primary())
            .with_raw_proof(vec![0u8; 65])
            .with_raw_proof(vec![1u8; 12])
            .build()
            .unwrap();

        for mode in both_modes() {
            assert_eq!(
                parse_certificate(&der, mode).unwrap_err(),
                CertificateError::Recovery(RecoveryError::RecoveryFailed)
            );
        }
    }

    #[test]
    fn certificate_without_proof_is_missing_node_key() {
        let der = CertificateBuilder::new(primary()).build().unwrap();
        for mode in both_modes() {
            assert_eq!(
                parse_certificate(&der, mode).unwrap_err(),
                CertificateError::MissingNodePubKey
            );
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let der = build_certificate(primary(), &SecondaryKey::generate()).unwrap();
        let mut patched = der.clone();
        // [0] EXPLICIT INTEGER 2 -> INTEGER 1
        let marker = [0xA0, 0x03, 0x02, 0x01, 0x02];
        let at = patched
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap();
        patched[at + 4] = 0x01;

        assert_eq!(
            parse_strict(&patched).unwrap_err(),
            CertificateError::WrongCertificateVersion(1)
        );
    }

    #[test]
    fn garbage_and_trailing_bytes_are_malformed() {
        assert!(matches!(
            parse_strict(b"\x30\x03\x02\x01"),
            Err(CertificateError::MalformedCertificate(_))
        ));

        let mut der = build_certificate(primary(), &SecondaryKey::generate()).unwrap();
        der.push(0);
        assert!(matches!(
            parse_permissive(&der),
            Err(CertificateError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn oversized_input_is_rejected_up_front() {
        let big = vec![0u8; MAX_CERTIFICATE_LEN + 1];
        assert_eq!(
            parse_strict(&big).unwrap_err(),
            CertificateError::CertificateTooLarge {
                len: MAX_CERTIFICATE_LEN + 1,
                max: MAX_CERTIFICATE_LEN
            }
        );
    }

    #[test]
    fn non_rsa_key_is_rejected() {
        // An rcgen P-256 certificate that nonetheless carries a proof
        // extension in the right place.
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::default();
        let mut ext = rcgen::CustomExtension::from_oid_content(
            crate::config::NODE_PROOF_OID,
            vec![27u8; 65],
        );
        ext.set_criticality(true);
        params.custom_extensions.push(ext);
        let der = params.self_signed(&key_pair).unwrap().der().to_vec();

        for mode in both_modes() {
            assert_eq!(
                parse_certificate(&der, mode).unwrap_err(),
                CertificateError::Recovery(RecoveryError::NotRsaPublicKey)
            );
        }
    }

    #[test]
    fn small_modulus_fails_validation() {
        let weak = PrimaryKey::generate_with_bits(1024).unwrap();
        let der = build_certificate(&weak, &SecondaryKey::generate());
        // rcgen (ring) refuses to sign with keys below 2048 bits; either way
        // such a key never makes it through.
        if let Ok(der) = der {
            let cert = parse_strict(&der).unwrap();
            assert_eq!(
                validate_certificate(&cert),
                Err(ValidationError::UnsupportedModulusSize(1024))
            );
        }
    }
}
