//! Checks that the embedded certificate belongs to the declared issuer, was valid on the
//! document date, and produced the document's seal.
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::certificate::{
    CertificateExtractor, CertificateFacts, DigestAlgorithm, EmbeddedCertificateExtractor,
};
use crate::config::ValidationConfig;
use crate::document::{DeclaredIssuer, DocumentView};
use crate::issues::Issues;
use crate::validation::canonical::CanonicalBuilder;

/// Version tag whose seals may still use SHA-1.
pub const LEGACY_VERSION: &str = "3.2";

/// Ordered digest algorithms to try per document version. Versions without an entry use
/// the fallback list.
///
/// # Examples
/// ```rust
/// use cfdi_core::certificate::DigestAlgorithm;
/// use cfdi_core::validation::certificate::DigestPolicy;
///
/// let policy = DigestPolicy::default();
/// assert_eq!(policy.algorithms_for("3.2"), &[DigestAlgorithm::Sha256, DigestAlgorithm::Sha1]);
/// assert_eq!(policy.algorithms_for("4.0"), &[DigestAlgorithm::Sha256]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPolicy {
    by_version: BTreeMap<String, Vec<DigestAlgorithm>>,
    fallback: Vec<DigestAlgorithm>,
}

impl DigestPolicy {
    /// SHA-256 for every version.
    pub fn modern_only() -> Self {
        Self {
            by_version: BTreeMap::new(),
            fallback: vec![DigestAlgorithm::Sha256],
        }
    }

    pub fn with_version(
        mut self,
        version: impl Into<String>,
        algorithms: impl Into<Vec<DigestAlgorithm>>,
    ) -> Self {
        self.by_version.insert(version.into(), algorithms.into());
        self
    }

    pub fn algorithms_for(&self, version: &str) -> &[DigestAlgorithm] {
        self.by_version
            .get(version)
            .map(Vec::as_slice)
            .unwrap_or(self.fallback.as_slice())
    }
}

impl Default for DigestPolicy {
    fn default() -> Self {
        Self::modern_only().with_version(
            LEGACY_VERSION,
            [DigestAlgorithm::Sha256, DigestAlgorithm::Sha1],
        )
    }
}

/// Findings the certificate validator can record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateFinding {
    #[error("could not obtain the certificate from the document: {0}")]
    Extraction(String),
    #[error("certificate serial ({certificate}) does not match the serial declared in the document ({declared})")]
    SerialMismatch { certificate: String, declared: String },
    #[error("certificate owner id ({certificate}) does not match the issuer id declared in the document ({declared})")]
    OwnerIdMismatch { certificate: String, declared: String },
    #[error("certificate owner name \"{certificate}\" does not match the issuer name declared in the document \"{declared}\"")]
    OwnerNameMismatch { certificate: String, declared: String },
    #[error("document date not found")]
    DateNotFound,
    #[error("document date {document} is earlier than the certificate valid-from date {valid_from}")]
    DateBeforeValidFrom { document: String, valid_from: String },
    #[error("document date {document} is later than the certificate valid-to date {valid_to}")]
    DateAfterValidTo { document: String, valid_to: String },
    #[error("signature is not valid base64")]
    SignatureNotBase64,
    #[error("canonical content could not be built: {0}")]
    CanonicalUnavailable(String),
    #[error("signature verification failed, the document was altered or malformed")]
    SignatureMismatch,
}

impl CertificateFinding {
    /// Owner name mismatches are usually formatting noise, so they only warn.
    pub fn is_warning(&self) -> bool {
        matches!(self, CertificateFinding::OwnerNameMismatch { .. })
    }

    fn record(self, issues: &mut Issues) {
        if self.is_warning() {
            issues.add_warning(self.to_string());
        } else {
            issues.add_error(self.to_string());
        }
    }
}

/// Runs the certificate checks and writes findings to an [`Issues`] sink.
///
/// Business-rule violations never fail the call. The only abort is a certificate that
/// cannot be extracted, which is recorded as a single error.
#[derive(Debug, Clone)]
pub struct CertificateValidator<E = EmbeddedCertificateExtractor> {
    config: ValidationConfig,
    extractor: E,
}

impl CertificateValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self::with_extractor(config, EmbeddedCertificateExtractor)
    }
}

impl<E: CertificateExtractor> CertificateValidator<E> {
    pub fn with_extractor(config: ValidationConfig, extractor: E) -> Self {
        Self { config, extractor }
    }

    /// Extract the certificate and declared issuer from `document`, then run every check.
    /// The seal is only verified when `canonical` is supplied.
    pub fn validate(
        &self,
        document: &dyn DocumentView,
        issues: &mut Issues,
        canonical: Option<&dyn CanonicalBuilder>,
    ) {
        let facts = match self.extractor.extract(document) {
            Ok(facts) => facts,
            Err(err) => {
                CertificateFinding::Extraction(err.to_string()).record(issues);
                return;
            }
        };
        let issuer = DeclaredIssuer::from_view(document, self.config.document_offset());

        let (content, build_error) = match canonical.map(|builder| builder.build(document.source()))
        {
            Some(Ok(content)) => (Some(content), None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };

        self.check(&issuer, &facts, issues, content.as_deref());

        if let Some(err) = build_error {
            CertificateFinding::CanonicalUnavailable(err.to_string()).record(issues);
        }
    }

    /// Compare `facts` against `issuer`. `canonical` is the content the seal covers; when
    /// absent the signature check is skipped.
    pub fn check(
        &self,
        issuer: &DeclaredIssuer,
        facts: &CertificateFacts,
        issues: &mut Issues,
        canonical: Option<&[u8]>,
    ) {
        check_serial(issuer, facts, issues);
        check_owner_id(issuer, facts, issues);
        check_owner_name(issuer, facts, issues);
        check_document_date(issuer, facts, issues);
        if let Some(content) = canonical {
            self.check_signature(issuer, facts, content, issues);
        }
    }

    fn check_signature(
        &self,
        issuer: &DeclaredIssuer,
        facts: &CertificateFacts,
        content: &[u8],
        issues: &mut Issues,
    ) {
        let encoded: String = issuer.signature_base64().split_ascii_whitespace().collect();
        let Ok(signature) = Base64::decode_vec(&encoded) else {
            CertificateFinding::SignatureNotBase64.record(issues);
            return;
        };
        // An empty seal has nothing to verify; it is not reported.
        if signature.is_empty() {
            debug!("document seal is empty, skipping verification");
            return;
        }

        let algorithms = self.config.digest_policy().algorithms_for(issuer.version());
        match algorithms
            .iter()
            .find(|algorithm| facts.verify(content, &signature, **algorithm))
        {
            Some(algorithm) => debug!(%algorithm, version = issuer.version(), "seal verified"),
            None => CertificateFinding::SignatureMismatch.record(issues),
        }
    }
}

fn check_serial(issuer: &DeclaredIssuer, facts: &CertificateFacts, issues: &mut Issues) {
    if facts.serial() != issuer.serial() {
        CertificateFinding::SerialMismatch {
            certificate: facts.serial().to_string(),
            declared: issuer.serial().to_string(),
        }
        .record(issues);
    }
}

fn check_owner_id(issuer: &DeclaredIssuer, facts: &CertificateFacts, issues: &mut Issues) {
    if facts.owner_id() != issuer.owner_id() {
        CertificateFinding::OwnerIdMismatch {
            certificate: facts.owner_id().to_string(),
            declared: issuer.owner_id().to_string(),
        }
        .record(issues);
    }
}

fn check_owner_name(issuer: &DeclaredIssuer, facts: &CertificateFacts, issues: &mut Issues) {
    if issuer.owner_name().is_empty() {
        return;
    }
    if !names_match(facts.owner_name(), issuer.owner_name()) {
        CertificateFinding::OwnerNameMismatch {
            certificate: facts.owner_name().to_string(),
            declared: issuer.owner_name().to_string(),
        }
        .record(issues);
    }
}

fn check_document_date(issuer: &DeclaredIssuer, facts: &CertificateFacts, issues: &mut Issues) {
    let Some(date) = issuer.document_date() else {
        CertificateFinding::DateNotFound.record(issues);
        return;
    };
    if date < facts.valid_from() {
        CertificateFinding::DateBeforeValidFrom {
            document: format_date(date),
            valid_from: format_date(facts.valid_from()),
        }
        .record(issues);
    }
    if date > facts.valid_to() {
        CertificateFinding::DateAfterValidTo {
            document: format_date(date),
            valid_to: format_date(facts.valid_to()),
        }
        .record(issues);
    }
}

/// Case-insensitive comparison ignoring spaces and periods: "ACME S.A." matches "acme sa".
pub fn names_match(first: &str, second: &str) -> bool {
    normalize_name(first) == normalize_name(second)
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}
