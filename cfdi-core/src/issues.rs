//! Findings collected during a validation run.
use serde::{Deserialize, Serialize};

/// Append-only sink with two channels: errors reject the document, warnings flag it for review.
///
/// # Examples
/// ```rust
/// use cfdi_core::issues::Issues;
///
/// let mut issues = Issues::new();
/// issues.add_warning("name differs");
/// assert!(issues.is_accepted());
/// issues.add_error("serial differs");
/// assert!(!issues.is_accepted());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issues {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "validation error recorded");
        self.errors.push(message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "validation warning recorded");
        self.warnings.push(message);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True when no errors were recorded. Warnings do not reject a document.
    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
