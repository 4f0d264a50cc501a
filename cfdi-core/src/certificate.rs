//! Signing certificate facts and their verification primitive.
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use x509_cert::{
    der::{
        oid::{AssociatedOid, ObjectIdentifier},
        Decode, Encode,
    },
    name::Name,
    spki::DecodePublicKey,
    time::Time,
    Certificate,
};

use crate::document::{DocumentField, DocumentView};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.41");
const UNIQUE_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.45");

/// Errors raised while turning embedded certificate bytes into [`CertificateFacts`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document does not embed a certificate")]
    MissingCertificate,
    #[error("embedded certificate is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("embedded certificate is not valid DER: {0}")]
    InvalidDer(String),
    #[error("unsupported public key algorithm {algorithm}")]
    UnsupportedKey { algorithm: String },
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("certificate validity window is invalid")]
    InvalidValidity,
}

/// Digest algorithms a seal may have been computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    Sha256,
    Sha1,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => f.write_str("SHA-256"),
            DigestAlgorithm::Sha1 => f.write_str("SHA-1"),
        }
    }
}

/// Public half of the signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// PKCS#1 v1.5 signatures, as issued by the tax authority.
    Rsa(RsaPublicKey),
    /// DER-encoded ECDSA signatures over secp256k1.
    Secp256k1(k256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn from_spki_der(
        algorithm: ObjectIdentifier,
        spki_der: &[u8],
    ) -> Result<Self, ExtractionError> {
        if algorithm == RSA_ENCRYPTION {
            RsaPublicKey::from_public_key_der(spki_der)
                .map(PublicKey::Rsa)
                .map_err(|e| ExtractionError::InvalidKey(e.to_string()))
        } else if algorithm == EC_PUBLIC_KEY {
            k256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map(PublicKey::Secp256k1)
                .map_err(|e| ExtractionError::InvalidKey(e.to_string()))
        } else {
            Err(ExtractionError::UnsupportedKey {
                algorithm: algorithm.to_string(),
            })
        }
    }

    fn verify(&self, content: &[u8], signature: &[u8], algorithm: DigestAlgorithm) -> bool {
        match (self, algorithm) {
            (PublicKey::Rsa(key), DigestAlgorithm::Sha256) => {
                verify_pkcs1v15::<Sha256>(key, content, signature)
            }
            (PublicKey::Rsa(key), DigestAlgorithm::Sha1) => {
                verify_pkcs1v15::<Sha1>(key, content, signature)
            }
            (PublicKey::Secp256k1(key), algorithm) => {
                let Ok(signature) = k256::ecdsa::Signature::from_der(signature) else {
                    return false;
                };
                match algorithm {
                    DigestAlgorithm::Sha256 => key.verify(content, &signature).is_ok(),
                    DigestAlgorithm::Sha1 => key
                        .verify_prehash(&Sha1::digest(content), &signature)
                        .is_ok(),
                }
            }
        }
    }
}

fn verify_pkcs1v15<D>(key: &RsaPublicKey, content: &[u8], signature: &[u8]) -> bool
where
    D: Digest + AssociatedOid,
{
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
        return false;
    };
    rsa::pkcs1v15::VerifyingKey::<D>::new(key.clone())
        .verify(content, &signature)
        .is_ok()
}

/// Immutable snapshot of a signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    serial: String,
    owner_id: String,
    owner_name: String,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    public_key: PublicKey,
}

impl CertificateFacts {
    pub fn new(
        serial: impl Into<String>,
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        public_key: PublicKey,
    ) -> Result<Self, ExtractionError> {
        if valid_from > valid_to {
            return Err(ExtractionError::InvalidValidity);
        }
        Ok(Self {
            serial: serial.into(),
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
            valid_from,
            valid_to,
            public_key,
        })
    }

    pub fn from_certificate(cert: &Certificate) -> Result<Self, ExtractionError> {
        let tbs = &cert.tbs_certificate;
        let spki = &tbs.subject_public_key_info;
        let spki_der = spki
            .to_der()
            .map_err(|e| ExtractionError::InvalidDer(e.to_string()))?;
        let public_key = PublicKey::from_spki_der(spki.algorithm.oid, &spki_der)?;

        let owner_id = subject_text(&tbs.subject, UNIQUE_IDENTIFIER)
            .map(|value| issuer_id_from_unique_identifier(&value))
            .unwrap_or_default();
        let owner_name = subject_text(&tbs.subject, NAME)
            .or_else(|| subject_text(&tbs.subject, COMMON_NAME))
            .unwrap_or_default();

        Self::new(
            serial_from_bytes(tbs.serial_number.as_bytes()),
            owner_id,
            owner_name,
            time_to_utc(&tbs.validity.not_before)?,
            time_to_utc(&tbs.validity.not_after)?,
            public_key,
        )
    }

    pub fn from_der(der: &[u8]) -> Result<Self, ExtractionError> {
        let cert = Certificate::from_der(der)
            .map_err(|e| ExtractionError::InvalidDer(e.to_string()))?;
        Self::from_certificate(&cert)
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn valid_to(&self) -> DateTime<Utc> {
        self.valid_to
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Check `signature` over `content` hashed with `algorithm`. Malformed signatures verify as false.
    pub fn verify(&self, content: &[u8], signature: &[u8], algorithm: DigestAlgorithm) -> bool {
        self.public_key.verify(content, signature, algorithm)
    }
}

fn time_to_utc(time: &Time) -> Result<DateTime<Utc>, ExtractionError> {
    let since_epoch = time.to_unix_duration();
    let secs = i64::try_from(since_epoch.as_secs()).map_err(|_| ExtractionError::InvalidValidity)?;
    DateTime::from_timestamp(secs, since_epoch.subsec_nanos()).ok_or(ExtractionError::InvalidValidity)
}

fn subject_text(subject: &Name, oid: ObjectIdentifier) -> Option<String> {
    subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(|value| value.trim().to_string())
}

// "AAA010101AAA / HEGT7610034S2" carries the company id and its legal representative's id.
fn issuer_id_from_unique_identifier(value: &str) -> String {
    value.split('/').next().unwrap_or_default().trim().to_string()
}

/// Render a certificate serial. Serials made only of ASCII digits are read as text,
/// anything else as a big-endian integer in decimal.
pub fn serial_from_bytes(bytes: &[u8]) -> String {
    let significant: &[u8] = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[],
    };
    if !significant.is_empty() && significant.iter().all(u8::is_ascii_digit) {
        return significant.iter().map(|b| *b as char).collect();
    }
    serial_bytes_to_decimal_string(bytes)
}

fn serial_bytes_to_decimal_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

/// Builds [`CertificateFacts`] for a document.
pub trait CertificateExtractor {
    fn extract(&self, document: &dyn DocumentView) -> Result<CertificateFacts, ExtractionError>;
}

/// Reads the base64 DER certificate the document embeds in its `certificado` attribute.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedCertificateExtractor;

impl CertificateExtractor for EmbeddedCertificateExtractor {
    fn extract(&self, document: &dyn DocumentView) -> Result<CertificateFacts, ExtractionError> {
        let encoded = document
            .get(DocumentField::Certificate)
            .map(|value| value.split_ascii_whitespace().collect::<String>())
            .filter(|value| !value.is_empty())
            .ok_or(ExtractionError::MissingCertificate)?;
        let der = Base64::decode_vec(&encoded)
            .map_err(|e| ExtractionError::InvalidBase64(e.to_string()))?;
        CertificateFacts::from_der(&der)
    }
}
