mod common;

use base64ct::{Base64, Encoding};
use cfdi_core::certificate::{
    CertificateExtractor, CertificateFacts, DigestAlgorithm, EmbeddedCertificateExtractor,
    ExtractionError, PublicKey,
};
use cfdi_core::config::ValidationConfig;
use cfdi_core::document::{DeclaredIssuer, XmlDocument};
use cfdi_core::issues::Issues;
use cfdi_core::validation::canonical::PrecomputedCanonical;
use cfdi_core::validation::certificate::{CertificateFinding, CertificateValidator};
use chrono::{FixedOffset, TimeZone, Utc};
use common::InvoiceFields;
use rsa::signature::{SignatureEncoding, Signer};
use sha1::Sha1;
use sha2::Sha256;
use std::sync::OnceLock;
use x509_cert::der::oid::AssociatedOid;

#[test]
fn extracts_facts_from_embedded_certificate() {
    let xml = common::sealed_document(&InvoiceFields::default());
    let doc = XmlDocument::parse(&xml).expect("parse");
    let facts = EmbeddedCertificateExtractor.extract(&doc).expect("facts");

    assert_eq!(facts.serial(), common::SERIAL);
    assert_eq!(facts.owner_id(), common::RFC);
    assert_eq!(facts.owner_name(), "ESCUELA KEMPER URGATE SA DE CV");
    assert_eq!(facts.valid_from(), common::valid_from());
    assert_eq!(facts.valid_to(), common::valid_to());
    assert!(matches!(facts.public_key(), PublicKey::Secp256k1(_)));
}

#[test]
fn sealed_document_passes_every_check() {
    let fields = InvoiceFields::default();
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let chain = PrecomputedCanonical::new(common::original_chain(&fields));
    let mut issues = Issues::new();
    validator.validate(&doc, &mut issues, Some(&chain));
    assert!(issues.is_empty(), "{issues:?}");
}

#[test]
fn tampered_document_fails_seal_verification() {
    let fields = InvoiceFields::default();
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let chain = common::original_chain(&fields).replace("|116.00|", "|1116.00|");
    let mut issues = Issues::new();
    validator.validate(&doc, &mut issues, Some(&PrecomputedCanonical::new(chain)));
    assert_eq!(
        issues.errors(),
        [CertificateFinding::SignatureMismatch.to_string()]
    );
}

#[test]
fn wrapped_seal_in_document_is_verified() {
    let fields = InvoiceFields::default();
    let xml = common::sealed_document(&fields);
    assert!(xml.contains("&#10;"));
    let doc = XmlDocument::parse(&xml).expect("parse");
    let declared = DeclaredIssuer::from_view(&doc, FixedOffset::east_opt(0).expect("offset"));
    assert!(declared.signature_base64().contains('\n'));

    let facts = EmbeddedCertificateExtractor.extract(&doc).expect("facts");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let mut issues = Issues::new();
    validator.check(
        &declared,
        &facts,
        &mut issues,
        Some(common::original_chain(&fields).as_bytes()),
    );
    assert!(issues.is_empty(), "{issues:?}");
}

#[test]
fn document_without_certificate_records_single_error() {
    let xml = common::render(&InvoiceFields::default(), "", "");
    let doc = XmlDocument::parse(&xml).expect("parse");
    assert!(matches!(
        EmbeddedCertificateExtractor.extract(&doc),
        Err(ExtractionError::MissingCertificate)
    ));

    let validator = CertificateValidator::new(ValidationConfig::default());
    let mut issues = Issues::new();
    validator.validate(&doc, &mut issues, Some(&PrecomputedCanonical::new("||4.0||")));
    assert_eq!(issues.errors().len(), 1);
    assert!(issues.warnings().is_empty());
}

#[test]
fn garbage_certificate_is_an_extraction_error() {
    let xml = common::render(&InvoiceFields::default(), "@@not-base64@@", "");
    let doc = XmlDocument::parse(&xml).expect("parse");
    assert!(matches!(
        EmbeddedCertificateExtractor.extract(&doc),
        Err(ExtractionError::InvalidBase64(_))
    ));

    let xml = common::render(&InvoiceFields::default(), "AAECAwQ=", "");
    let doc = XmlDocument::parse(&xml).expect("parse");
    assert!(matches!(
        EmbeddedCertificateExtractor.extract(&doc),
        Err(ExtractionError::InvalidDer(_))
    ));
}

#[test]
fn identity_mismatches_are_errors_and_name_mismatch_warns() {
    let fields = InvoiceFields {
        serial: "30001000000400002999",
        rfc: "XAXX010101000",
        name: "OTRA EMPRESA",
        ..InvoiceFields::default()
    };
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let mut issues = Issues::new();
    validator.validate(&doc, &mut issues, None);

    assert_eq!(
        issues.errors(),
        [
            CertificateFinding::SerialMismatch {
                certificate: common::SERIAL.into(),
                declared: "30001000000400002999".into(),
            }
            .to_string(),
            CertificateFinding::OwnerIdMismatch {
                certificate: common::RFC.into(),
                declared: "XAXX010101000".into(),
            }
            .to_string(),
        ]
    );
    assert_eq!(issues.warnings().len(), 1);
}

#[test]
fn document_date_outside_window_is_reported() {
    let fields = InvoiceFields {
        date: "2028-01-01T00:00:00",
        ..InvoiceFields::default()
    };
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let chain = PrecomputedCanonical::new(common::original_chain(&fields));
    let mut issues = Issues::new();
    validator.validate(&doc, &mut issues, Some(&chain));
    assert_eq!(
        issues.errors(),
        [CertificateFinding::DateAfterValidTo {
            document: "2028-01-01 00:00:00".into(),
            valid_to: "2027-05-18 11:43:51".into(),
        }
        .to_string()]
    );
}

#[test]
fn document_offset_shifts_local_dates() {
    // 05:00 local at UTC-7 is 12:00 UTC, after the certificate became valid at 11:43:51.
    let fields = InvoiceFields {
        date: "2023-05-18T05:00:00",
        ..InvoiceFields::default()
    };
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");

    let mut utc_issues = Issues::new();
    CertificateValidator::new(ValidationConfig::default()).validate(&doc, &mut utc_issues, None);
    assert_eq!(utc_issues.errors().len(), 1);

    let pacific = FixedOffset::west_opt(7 * 3600).expect("offset");
    let config = ValidationConfig::default().with_document_offset(pacific);
    let mut local_issues = Issues::new();
    CertificateValidator::new(config).validate(&doc, &mut local_issues, None);
    assert!(local_issues.is_accepted(), "{local_issues:?}");
}

#[test]
fn unparseable_date_counts_as_missing() {
    let fields = InvoiceFields {
        date: "10/02/2024",
        ..InvoiceFields::default()
    };
    let xml = common::sealed_document(&fields);
    let doc = XmlDocument::parse(&xml).expect("parse");
    let mut issues = Issues::new();
    CertificateValidator::new(ValidationConfig::default()).validate(&doc, &mut issues, None);
    assert_eq!(
        issues.errors(),
        [CertificateFinding::DateNotFound.to_string()]
    );
}

#[test]
fn validation_is_repeatable() {
    let xml = common::sealed_document(&InvoiceFields {
        name: "OTRA",
        date: "2000-01-01T00:00:00",
        ..InvoiceFields::default()
    });
    let doc = XmlDocument::parse(&xml).expect("parse");
    let validator = CertificateValidator::new(ValidationConfig::default());
    let canonical = PrecomputedCanonical::new("||4.0|A|1001||");

    let mut first = Issues::new();
    validator.validate(&doc, &mut first, Some(&canonical));
    let mut second = Issues::new();
    validator.validate(&doc, &mut second, Some(&canonical));
    assert_eq!(first, second);
    assert_eq!(first.errors().len(), 2);
    assert_eq!(first.warnings().len(), 1);
}

fn rsa_key() -> &'static rsa::RsaPrivateKey {
    static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("rsa key"))
}

fn rsa_facts() -> CertificateFacts {
    CertificateFacts::new(
        common::SERIAL,
        common::RFC,
        "ESCUELA KEMPER URGATE SA DE CV",
        common::valid_from(),
        common::valid_to(),
        PublicKey::Rsa(rsa_key().to_public_key()),
    )
    .expect("facts")
}

fn rsa_seal<D>(content: &[u8]) -> String
where
    D: sha2::Digest + AssociatedOid,
{
    let signer = rsa::pkcs1v15::SigningKey::<D>::new(rsa_key().clone());
    Base64::encode_string(&signer.sign(content).to_vec())
}

fn issuer(version: &str, seal: String) -> DeclaredIssuer {
    DeclaredIssuer::new(
        common::SERIAL,
        common::RFC,
        "",
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        seal,
        version,
    )
}

#[test]
fn rsa_seal_verifies_with_sha256() {
    let content: &[u8] = b"||4.0|A|1001|2024-01-01T00:00:00|601||";
    let facts = rsa_facts();
    assert!(facts.verify(
        content,
        &Base64::decode_vec(&rsa_seal::<Sha256>(content)).expect("seal"),
        DigestAlgorithm::Sha256
    ));

    let validator = CertificateValidator::new(ValidationConfig::default());
    let mut issues = Issues::new();
    validator.check(
        &issuer("4.0", rsa_seal::<Sha256>(content)),
        &facts,
        &mut issues,
        Some(content),
    );
    assert!(issues.is_empty(), "{issues:?}");

    let mut issues = Issues::new();
    validator.check(
        &issuer("4.0", rsa_seal::<Sha256>(b"||other||")),
        &facts,
        &mut issues,
        Some(content),
    );
    assert_eq!(
        issues.errors(),
        [CertificateFinding::SignatureMismatch.to_string()]
    );
}

#[test]
fn sha1_seal_only_accepted_for_legacy_version() {
    let content: &[u8] = b"||3.2|2012-01-01T00:00:00|ingreso|100.00||";
    let seal = rsa_seal::<Sha1>(content);
    let validator = CertificateValidator::new(ValidationConfig::default());

    let mut legacy = Issues::new();
    validator.check(&issuer("3.2", seal.clone()), &rsa_facts(), &mut legacy, Some(content));
    assert!(legacy.is_empty(), "{legacy:?}");

    let mut current = Issues::new();
    validator.check(&issuer("3.3", seal), &rsa_facts(), &mut current, Some(content));
    assert_eq!(
        current.errors(),
        [CertificateFinding::SignatureMismatch.to_string()]
    );
}
