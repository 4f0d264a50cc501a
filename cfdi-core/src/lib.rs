//! Post-parse validation of signed CFDI documents: certificate identity, validity window,
//! digital seal, and XSD conformance (optionally against a local schema mirror).
//!
//! # Examples
//! ```rust,no_run
//! use cfdi_core::config::ValidationConfig;
//! use cfdi_core::document::XmlDocument;
//! use cfdi_core::issues::Issues;
//! use cfdi_core::validation::certificate::CertificateValidator;
//!
//! let xml = std::fs::read_to_string("cfdi.xml")?;
//! let document = XmlDocument::parse(&xml)?;
//! let validator = CertificateValidator::new(ValidationConfig::default());
//! let mut issues = Issues::new();
//! validator.validate(&document, &mut issues, None);
//! assert!(issues.is_accepted());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod certificate;
pub mod config;
pub mod document;
pub mod issues;
pub mod schemas;
pub mod validation;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Document(#[from] document::DocumentError),
    #[error(transparent)]
    Extraction(#[from] certificate::ExtractionError),
    #[error(transparent)]
    Canonical(#[from] validation::canonical::CanonicalError),
    #[error(transparent)]
    Schema(#[from] schemas::SchemaError),
    #[error(transparent)]
    Retrieve(#[from] schemas::RetrieveError),
}
