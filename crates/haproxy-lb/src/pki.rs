//! Certificate authority and client certificate generation
//!
//! Every load balancer gets its own self-signed CA. The CA is shipped to the
//! VM in the bootstrap data, where the VM mints its own dataplane API server
//! certificate from it, and is used by the controller to sign the client
//! certificate it presents to that API.
//!
//! Keys are 2048-bit RSA and are encoded as PKCS#1 (`RSA PRIVATE KEY`) PEM
//! blocks, which is what `new-cert.sh` on the VM expects.

use crate::error::PkiError;
use chrono::{DateTime, Months, TimeDelta, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose, PKCS_RSA_SHA256, SanType, SerialNumber,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use time::OffsetDateTime;
use x509_parser::pem::parse_x509_pem;

/// RSA key size for CA and client keys
pub const RSA_KEY_SIZE: usize = 2048;

/// Common name of every load balancer CA
pub const CA_COMMON_NAME: &str = "self-signed CA";

/// Default backdating of `not_before` to tolerate clock skew
pub const DEFAULT_NEGATIVE_TIME_SKEW_MINUTES: i64 = 10;

/// Default certificate lifetime
pub const DEFAULT_LIFETIME_YEARS: u32 = 10;

// X.520 serialNumber attribute
const SERIAL_NUMBER_OID: [u64; 4] = [2, 5, 4, 5];

/// PEM-encoded certificate and its PKCS#1 private key
#[derive(Clone, PartialEq, Eq)]
pub struct PemKeyPair {
    /// `CERTIFICATE` PEM block
    pub certificate_pem: String,
    /// `RSA PRIVATE KEY` PEM block
    pub private_key_pem: String,
}

impl std::fmt::Debug for PemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemKeyPair")
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// The self-signed CA of a load balancer
pub type SigningKeyPair = PemKeyPair;

/// A client certificate signed by a load balancer CA
pub type ClientKeyPair = PemKeyPair;

/// Validity window of a generated certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateValidity {
    /// Start of the window
    pub not_before: DateTime<Utc>,
    /// End of the window
    pub not_after: DateTime<Utc>,
}

impl CertificateValidity {
    /// Window starting `skew` in the past and lasting `lifetime` calendar months.
    pub fn new(skew: TimeDelta, lifetime: Months) -> Self {
        let not_before = Utc::now() - skew;
        let not_after = not_before
            .checked_add_months(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            not_before,
            not_after,
        }
    }

    /// Window starting ten minutes ago and lasting ten years.
    pub fn with_default_skew() -> Self {
        Self::new(
            TimeDelta::minutes(DEFAULT_NEGATIVE_TIME_SKEW_MINUTES),
            Months::new(DEFAULT_LIFETIME_YEARS * 12),
        )
    }
}

impl Default for CertificateValidity {
    fn default() -> Self {
        Self::with_default_skew()
    }
}

/// Generate a self-signed CA valid between `not_before` and `not_after`.
///
/// CPU-bound; call it from a blocking context when running on an async
/// runtime.
pub fn generate_ca(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<SigningKeyPair, PkiError> {
    let (not_before, not_after) = validity_window(not_before, not_after)?;
    let ca_key = generate_rsa_key()?;
    let ca_key_pair = rcgen_key_pair(&ca_key)?;
    let (serial, serial_value) = random_serial();

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CA_COMMON_NAME);
    dn.push(
        DnType::CustomDnType(SERIAL_NUMBER_OID.to_vec()),
        serial_value.to_string(),
    );
    params.distinguished_name = dn;
    params.serial_number = Some(serial);
    params.not_before = not_before;
    params.not_after = not_after;
    params.key_identifier_method = KeyIdMethod::PreSpecified(modulus_hash(&ca_key));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];

    let cert = params
        .self_signed(&ca_key_pair)
        .map_err(|e| PkiError::CertificateGeneration(format!("failed to self-sign CA: {e}")))?;

    Ok(PemKeyPair {
        certificate_pem: cert.pem(),
        private_key_pem: pkcs1_pem(&ca_key)?,
    })
}

/// Issue a client certificate for `ip_address`, signed by the given CA.
///
/// The CA key may be PKCS#1 or PKCS#8. An `ip_address` that is not an IP
/// address is rejected before any key is generated.
pub fn sign_client_certificate(
    ca_cert_pem: &str,
    ca_key_pem: &str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    ip_address: &str,
) -> Result<ClientKeyPair, PkiError> {
    let ip: IpAddr = ip_address
        .parse()
        .map_err(|_| PkiError::InvalidIpAddress(ip_address.to_string()))?;
    let (not_before, not_after) = validity_window(not_before, not_after)?;

    let ca_key = parse_rsa_private_key(ca_key_pem)?;
    let ca_key_pair = rcgen_key_pair(&ca_key)?;
    let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, &ca_key_pair).map_err(|e| PkiError::Parse {
        what: "CA certificate",
        reason: e.to_string(),
    })?;

    let client_key = generate_rsa_key()?;
    let client_key_pair = rcgen_key_pair(&client_key)?;
    let (serial, _) = random_serial();

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, ip_address);
    params.distinguished_name = dn;
    params.serial_number = Some(serial);
    params.subject_alt_names = vec![SanType::IpAddress(ip)];
    params.not_before = not_before;
    params.not_after = not_after;
    params.key_identifier_method = KeyIdMethod::PreSpecified(modulus_hash(&client_key));
    params.use_authority_key_identifier_extension = true;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::DataEncipherment,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::ContentCommitment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

    let cert = params
        .signed_by(&client_key_pair, &issuer)
        .map_err(|e| PkiError::CertificateGeneration(format!("failed to sign client certificate: {e}")))?;

    Ok(PemKeyPair {
        certificate_pem: cert.pem(),
        private_key_pem: pkcs1_pem(&client_key)?,
    })
}

/// Check that `cert_pem` was issued by the CA in `ca_cert_pem`.
///
/// The CA must be a CA certificate allowed to sign certificates, the issuer
/// of `cert_pem` must be the CA's subject, both certificates must be within
/// their validity window, and the signature must verify against the CA key.
pub fn verify_signed_by(cert_pem: &str, ca_cert_pem: &str) -> Result<(), PkiError> {
    let (_, cert_block) = parse_x509_pem(cert_pem.as_bytes()).map_err(|e| PkiError::Parse {
        what: "certificate PEM",
        reason: e.to_string(),
    })?;
    let (_, ca_block) = parse_x509_pem(ca_cert_pem.as_bytes()).map_err(|e| PkiError::Parse {
        what: "CA certificate PEM",
        reason: e.to_string(),
    })?;

    let cert = cert_block.parse_x509().map_err(|e| PkiError::Parse {
        what: "certificate",
        reason: e.to_string(),
    })?;
    let ca = ca_block.parse_x509().map_err(|e| PkiError::Parse {
        what: "CA certificate",
        reason: e.to_string(),
    })?;

    if !ca.is_ca() {
        return Err(PkiError::Verification(
            "issuer certificate is not a CA".to_string(),
        ));
    }
    let ca_usage = ca
        .key_usage()
        .map_err(|e| PkiError::Parse {
            what: "CA key usage",
            reason: e.to_string(),
        })?;
    if ca_usage.is_some_and(|usage| !usage.value.key_cert_sign()) {
        return Err(PkiError::Verification(
            "CA key usage does not allow certificate signing".to_string(),
        ));
    }
    if cert.issuer() != ca.subject() {
        return Err(PkiError::Verification(format!(
            "certificate issuer {} does not match CA subject {}",
            cert.issuer(),
            ca.subject()
        )));
    }
    if !ca.validity().is_valid() {
        return Err(PkiError::Verification(
            "CA certificate is outside its validity window".to_string(),
        ));
    }
    if !cert.validity().is_valid() {
        return Err(PkiError::Verification(
            "certificate is outside its validity window".to_string(),
        ));
    }

    cert.verify_signature(Some(ca.public_key()))
        .map_err(|e| PkiError::Verification(e.to_string()))
}

fn validity_window(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<(OffsetDateTime, OffsetDateTime), PkiError> {
    if not_after <= not_before {
        return Err(PkiError::InvalidValidity(format!(
            "not_after {not_after} is not after not_before {not_before}"
        )));
    }
    let convert = |at: DateTime<Utc>| {
        OffsetDateTime::from_unix_timestamp(at.timestamp())
            .map_err(|e| PkiError::InvalidValidity(e.to_string()))
    };
    Ok((convert(not_before)?, convert(not_after)?))
}

fn generate_rsa_key() -> Result<RsaPrivateKey, PkiError> {
    RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_SIZE)
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

fn parse_rsa_private_key(pem: &str) -> Result<RsaPrivateKey, PkiError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| PkiError::Parse {
        what: "CA private key",
        reason: e.to_string(),
    })
}

/// rcgen signs with ring, which loads RSA keys from PKCS#8.
fn rcgen_key_pair(key: &RsaPrivateKey) -> Result<KeyPair, PkiError> {
    let pkcs8 = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
    KeyPair::from_pem_and_sign_algo(pkcs8.as_str(), &PKCS_RSA_SHA256)
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

fn pkcs1_pem(key: &RsaPrivateKey) -> Result<String, PkiError> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

/// SHA-256 of the big-endian modulus, used as subject key identifier.
fn modulus_hash(key: &RsaPrivateKey) -> Vec<u8> {
    Sha256::digest(key.n().to_bytes_be()).to_vec()
}

/// Random positive 128-bit serial.
fn random_serial() -> (SerialNumber, u128) {
    let mut bytes: [u8; 16] = rand::random();
    // Clear the sign bit and keep the leading byte non-zero so the DER
    // integer stays 16 bytes.
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    (SerialNumber::from(bytes.to_vec()), u128::from_be_bytes(bytes))
}
