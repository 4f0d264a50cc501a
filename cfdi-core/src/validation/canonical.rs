//! Builders for the exact byte string a document's seal was computed over.
//!
//! For CFDI that is the original chain the tax authority derives from the document with a
//! version-specific XSLT. The chain is supplied by the caller, either precomputed or through
//! a closure wrapping whatever transform they run.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("failed to build canonical content: {0}")]
    Build(String),
}

/// Produces the signable representation of a document from its raw source.
/// Implementations must be deterministic for a given document version.
pub trait CanonicalBuilder {
    fn build(&self, source: &str) -> Result<Vec<u8>, CanonicalError>;
}

impl<F> CanonicalBuilder for F
where
    F: Fn(&str) -> Result<Vec<u8>, CanonicalError>,
{
    fn build(&self, source: &str) -> Result<Vec<u8>, CanonicalError> {
        self(source)
    }
}

/// Canonical content computed elsewhere, e.g. an original chain produced by the
/// tax authority's XSLT.
///
/// # Examples
/// ```rust
/// use cfdi_core::validation::canonical::{CanonicalBuilder, PrecomputedCanonical};
///
/// let chain = PrecomputedCanonical::new("||4.0|A|1001|2024-02-10T09:30:00||");
/// assert_eq!(chain.build("<cfdi:Comprobante/>")?, b"||4.0|A|1001|2024-02-10T09:30:00||");
/// # Ok::<(), cfdi_core::validation::canonical::CanonicalError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecomputedCanonical(Vec<u8>);

impl PrecomputedCanonical {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self(content.into())
    }
}

impl CanonicalBuilder for PrecomputedCanonical {
    fn build(&self, _source: &str) -> Result<Vec<u8>, CanonicalError> {
        Ok(self.0.clone())
    }
}
