//! # Staking Certificate Builder
//!
//! Produces self-signed identity certificates: the RSA primary key signs
//! the certificate, and a secp256k1 secondary key signs the RSA public key.
//! That second signature goes into a critical `localKeyId` extension.
//!
//! ```text
//! proof = [27 + recid || r || s] = sign_k1(secondary, SHA256(PKCS#1(primary_pub)))
//! ```

use rcgen::{
    date_time_ymd, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::RsaPublicKey;
use rustls::pki_types::PrivatePkcs8KeyDer;

use super::error::BuildError;
use crate::config::NODE_PROOF_OID;
use crate::crypto::hash::sha256_array;
use crate::crypto::primary::{public_key_pkcs1_der, PrimaryKey};
use crate::crypto::secp256k1::{SecondaryKey, COMPACT_SIGNATURE_LENGTH};

/// Sign a primary public key with a secondary key.
pub fn sign_primary_key(
    secondary: &SecondaryKey,
    primary: &RsaPublicKey,
) -> Result<[u8; COMPACT_SIGNATURE_LENGTH], BuildError> {
    let der = public_key_pkcs1_der(primary)?;
    Ok(secondary.sign_compact(&sha256_array(&der))?)
}

/// Octets of the primary key hash used as the certificate serial.
const SERIAL_LENGTH: usize = 16;

/// Serial number for a certificate over `primary`: the leading octets of
/// `SHA256(PKCS#1(primary))`, top bit cleared so the integer is positive.
pub fn serial_for(primary: &RsaPublicKey) -> Result<SerialNumber, BuildError> {
    let digest = sha256_array(&public_key_pkcs1_der(primary)?);
    let mut serial = digest[..SERIAL_LENGTH].to_vec();
    serial[0] &= 0x7f;
    Ok(SerialNumber::from(serial))
}

/// Step-by-step certificate construction.
///
/// Proof extensions are emitted in the order they were added. Normal code
/// adds exactly one with [`with_proof_by`](Self::with_proof_by);
/// [`with_raw_proof`](Self::with_raw_proof) exists for reproducing
/// certificates from older, buggier generators.
pub struct CertificateBuilder<'a> {
    primary: &'a PrimaryKey,
    proofs: Vec<Vec<u8>>,
    common_name: String,
}

impl<'a> CertificateBuilder<'a> {
    /// Start a certificate for `primary`.
    pub fn new(primary: &'a PrimaryKey) -> Self {
        Self {
            primary,
            proofs: Vec::new(),
            common_name: "keybind staking certificate".to_string(),
        }
    }

    /// Subject / issuer common name.
    pub fn common_name(mut self, name: impl Into<String>) -> Self {
        self.common_name = name.into();
        self
    }

    /// Append a proof extension signed by `secondary`.
    pub fn with_proof_by(mut self, secondary: &SecondaryKey) -> Result<Self, BuildError> {
        let proof = sign_primary_key(secondary, &self.primary.public_key())?;
        self.proofs.push(proof.to_vec());
        Ok(self)
    }

    /// Append a proof extension with arbitrary contents.
    pub fn with_raw_proof(mut self, value: Vec<u8>) -> Self {
        self.proofs.push(value);
        self
    }

    /// Produce the DER certificate.
    pub fn build(self) -> Result<Vec<u8>, BuildError> {
        let pkcs8 = self.primary.to_pkcs8_der()?;
        let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
            &PrivatePkcs8KeyDer::from(pkcs8.as_slice()),
            &PKCS_RSA_SHA256,
        )?;

        let mut params = CertificateParams::default();
        params.serial_number = Some(serial_for(&self.primary.public_key())?);
        params.not_before = date_time_ymd(2000, 1, 1);
        params.not_after = date_time_ymd(2100, 1, 1);
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, self.common_name);
        params.distinguished_name = name;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DataEncipherment,
        ];
        for proof in self.proofs {
            let mut ext = CustomExtension::from_oid_content(NODE_PROOF_OID, proof);
            ext.set_criticality(true);
            params.custom_extensions.push(ext);
        }

        let cert = params.self_signed(&key_pair)?;
        Ok(cert.der().to_vec())
    }
}

/// Build the standard single-proof certificate.
pub fn build_certificate(
    primary: &PrimaryKey,
    secondary: &SecondaryKey,
) -> Result<Vec<u8>, BuildError> {
    CertificateBuilder::new(primary).with_proof_by(secondary)?.build()
}
