use base64ct::{Base64, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use k256::ecdsa::signature::Signer;
use k256::ecdsa::SigningKey;
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::UtcTime;
use x509_cert::der::Encode;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

pub const SERIAL: &str = "30001000000400002434";
pub const RFC: &str = "EKU9003173C9";
pub const SUBJECT: &str =
    "CN=ESCUELA KEMPER URGATE SA DE CV,2.5.4.41=ESCUELA KEMPER URGATE SA DE CV,2.5.4.45=EKU9003173C9 / XIQB891116QE4,O=ESCUELA KEMPER URGATE SA DE CV,C=MX";

#[allow(dead_code)]
pub fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x11; 32]).expect("signing key")
}

#[allow(dead_code)]
pub fn valid_from() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 18, 11, 43, 51).unwrap()
}

#[allow(dead_code)]
pub fn valid_to() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 5, 18, 11, 43, 51).unwrap()
}

#[allow(dead_code)]
pub fn build_test_cert(key: &SigningKey, serial: &[u8], subject: &str) -> Vec<u8> {
    let serial_number = SerialNumber::new(serial).expect("serial");
    let validity = Validity {
        not_before: utc_time(valid_from()),
        not_after: utc_time(valid_to()),
    };
    let subject = Name::from_str(subject).expect("subject");
    let public_key =
        SubjectPublicKeyInfoOwned::from_key(*key.verifying_key()).expect("public key");
    let builder = CertificateBuilder::new(Profile::Root, serial_number, validity, subject, public_key, key)
        .expect("builder");
    let cert = builder
        .build::<k256::ecdsa::DerSignature>()
        .expect("certificate");
    cert.to_der().expect("cert der")
}

fn utc_time(time: DateTime<Utc>) -> Time {
    let since_epoch = Duration::from_secs(time.timestamp() as u64);
    Time::UtcTime(UtcTime::from_unix_duration(since_epoch).expect("utc time"))
}

/// Fields used to render a test document.
#[allow(dead_code)]
pub struct InvoiceFields<'a> {
    pub version: &'a str,
    pub serial: &'a str,
    pub rfc: &'a str,
    pub name: &'a str,
    pub date: &'a str,
}

impl Default for InvoiceFields<'_> {
    fn default() -> Self {
        Self {
            version: "4.0",
            serial: SERIAL,
            rfc: RFC,
            name: "ESCUELA KEMPER URGATE S.A. DE C.V.",
            date: "2024-02-10T09:30:00",
        }
    }
}

#[allow(dead_code)]
pub fn render(fields: &InvoiceFields<'_>, certificate_b64: &str, seal: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="{version}" Serie="A" Folio="1001" Fecha="{date}" NoCertificado="{serial}" Certificado="{certificate_b64}" Sello="{seal}" SubTotal="100.00" Moneda="MXN" Total="116.00" TipoDeComprobante="I">
  <cfdi:Emisor Rfc="{rfc}" Nombre="{name}" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="XAXX010101000" Nombre="PUBLICO EN GENERAL" UsoCFDI="S01"/>
</cfdi:Comprobante>"#,
        version = fields.version,
        date = fields.date,
        serial = fields.serial,
        rfc = fields.rfc,
        name = fields.name,
    )
}

/// Original chain for the rendered document, in the pipe-delimited layout the tax
/// authority's XSLT produces.
#[allow(dead_code)]
pub fn original_chain(fields: &InvoiceFields<'_>) -> String {
    format!(
        "||{version}|A|1001|{date}|{serial}|100.00|MXN|116.00|I|{rfc}|{name}|601|XAXX010101000|PUBLICO EN GENERAL|S01||",
        version = fields.version,
        date = fields.date,
        serial = fields.serial,
        rfc = fields.rfc,
        name = fields.name,
    )
}

/// A document whose seal covers [`original_chain`], sealed with [`signing_key`].
#[allow(dead_code)]
pub fn sealed_document(fields: &InvoiceFields<'_>) -> String {
    let key = signing_key();
    let cert = build_test_cert(&key, SERIAL.as_bytes(), SUBJECT);
    // Wrapped like certificates pasted from PEM bodies.
    let cert_b64 = wrap(&Base64::encode_string(&cert), "\n");

    let signature: k256::ecdsa::Signature = key.sign(original_chain(fields).as_bytes());
    // Character references keep the line feeds through attribute normalization.
    let seal = wrap(&Base64::encode_string(signature.to_der().as_bytes()), "&#10;");
    render(fields, &cert_b64, &seal)
}

fn wrap(encoded: &str, separator: &str) -> String {
    encoded
        .as_bytes()
        .chunks(64)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(separator)
}
