//! Validation configuration.
use chrono::{FixedOffset, Offset, Utc};
use std::path::{Path, PathBuf};

use crate::validation::certificate::DigestPolicy;

/// Configuration shared by the certificate validator and the schema facade.
///
/// - `digest_policy`: which digest algorithms are tried per document version.
/// - `document_offset`: offset applied to document dates written without one.
/// - `schema_cache_dir`: local mirror directory for XSD files, if any.
///
/// # Examples
/// ```rust
/// use cfdi_core::config::ValidationConfig;
/// use chrono::FixedOffset;
///
/// let config = ValidationConfig::default()
///     .with_document_offset(FixedOffset::west_opt(6 * 3600).unwrap())
///     .with_schema_cache_dir("/var/cache/cfdi/xsd");
/// assert!(config.schema_cache_dir().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    digest_policy: DigestPolicy,
    document_offset: FixedOffset,
    schema_cache_dir: Option<PathBuf>,
}

impl ValidationConfig {
    pub fn new(digest_policy: DigestPolicy) -> Self {
        Self {
            digest_policy,
            ..Self::default()
        }
    }

    pub fn with_document_offset(mut self, offset: FixedOffset) -> Self {
        self.document_offset = offset;
        self
    }

    pub fn with_schema_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_cache_dir = Some(dir.into());
        self
    }

    pub fn digest_policy(&self) -> &DigestPolicy {
        &self.digest_policy
    }

    pub fn document_offset(&self) -> FixedOffset {
        self.document_offset
    }

    pub fn schema_cache_dir(&self) -> Option<&Path> {
        self.schema_cache_dir.as_deref()
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            digest_policy: DigestPolicy::default(),
            document_offset: Utc.fix(),
            schema_cache_dir: None,
        }
    }
}
