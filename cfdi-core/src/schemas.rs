//! XSD conformance facade with an optional local schema mirror.
//!
//! [`SchemasValidator`] validates either against the schema locations a document declares
//! ([`DirectValidation`]) or against local copies of them ([`MirroredValidation`]), fetching
//! any copy that is missing first.
pub mod retriever;
pub mod xsd;

use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ValidationConfig;

pub use retriever::XsdRetriever;
pub use xsd::LibxmlSchemaValidator;

/// Errors from schema discovery and validation. Validation failures are not itemized.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("XML parse error: {0}")]
    XmlParse(String),
    #[error("invalid xsi:schemaLocation value: {value}")]
    InvalidSchemaLocation { value: String },
    #[error("document does not declare any schema")]
    NoSchemas,
    #[error("failed to load schemas: {message}")]
    SchemaLoad { message: String },
    #[error("XSD error found: {message}")]
    Invalid { message: String },
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
}

/// Errors from fetching a remote schema into the local mirror.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("invalid resource location: {location}")]
    InvalidLocation { location: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to download '{location}': {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of '{location}' returned status {status}")]
    Status { location: String, status: u16 },
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("resource '{location}' is not a valid schema: {message}")]
    InvalidSchema { location: String, message: String },
}

/// A namespace and the schema that defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    namespace: String,
    location: String,
    local_path: Option<PathBuf>,
}

impl SchemaReference {
    pub fn new(namespace: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            location: location.into(),
            local_path: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Location as declared by the document.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn local_path(&self) -> Option<&std::path::Path> {
        self.local_path.as_deref()
    }

    pub fn resolve_to(&mut self, path: PathBuf) {
        self.local_path = Some(path);
    }

    /// Where the schema is loaded from: the local copy when resolved, otherwise the declared location.
    pub fn effective_location(&self) -> String {
        match &self.local_path {
            Some(path) => path.display().to_string(),
            None => self.location.clone(),
        }
    }
}

/// Structural checker: discovers the schemas a document declares and validates against a set.
pub trait SchemaValidator {
    fn schemas(&self, content: &str) -> Result<Vec<SchemaReference>, SchemaError>;

    fn validate_with_schemas(
        &self,
        content: &str,
        schemas: &[SchemaReference],
    ) -> Result<(), SchemaError>;
}

/// Local storage for remote resources.
pub trait ResourceRetriever {
    /// Deterministic local path for `location`. Does not touch the filesystem.
    fn local_path(&self, location: &str) -> Result<PathBuf, RetrieveError>;

    /// Fetch `location` and store it at [`ResourceRetriever::local_path`].
    fn retrieve(&self, location: &str) -> Result<PathBuf, RetrieveError>;
}

/// One way of running schema validation.
pub trait SchemasValidation {
    fn validate(&self, content: &str) -> Result<(), SchemaError>;
}

/// Validates against the declared (possibly remote) schema locations.
#[derive(Debug, Clone)]
pub struct DirectValidation<V> {
    validator: V,
}

impl<V: SchemaValidator> DirectValidation<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }
}

impl<V: SchemaValidator> SchemasValidation for DirectValidation<V> {
    fn validate(&self, content: &str) -> Result<(), SchemaError> {
        let schemas = self.validator.schemas(content)?;
        self.validator.validate_with_schemas(content, &schemas)
    }
}

/// Mirrors every declared schema locally, then validates against the mirrored copies.
#[derive(Debug, Clone)]
pub struct MirroredValidation<V, R> {
    validator: V,
    retriever: R,
}

impl<V: SchemaValidator, R: ResourceRetriever> MirroredValidation<V, R> {
    pub fn new(validator: V, retriever: R) -> Self {
        Self {
            validator,
            retriever,
        }
    }
}

impl<V: SchemaValidator, R: ResourceRetriever> SchemasValidation for MirroredValidation<V, R> {
    fn validate(&self, content: &str) -> Result<(), SchemaError> {
        let mut schemas = self.validator.schemas(content)?;
        for schema in schemas.iter_mut() {
            let local_path = self.retriever.local_path(schema.location())?;
            // Check-then-write is not atomic; concurrent first mirrors fetch the same bytes twice.
            if local_path.exists() {
                debug!(location = schema.location(), path = %local_path.display(), "schema mirror hit");
            } else {
                info!(location = schema.location(), path = %local_path.display(), "mirroring schema");
                self.retriever.retrieve(schema.location())?;
            }
            schema.resolve_to(local_path);
        }
        self.validator.validate_with_schemas(content, &schemas)
    }
}

/// Facade over the two validation strategies, chosen at construction.
///
/// # Examples
/// ```rust,no_run
/// use cfdi_core::schemas::{LibxmlSchemaValidator, SchemasValidator, XsdRetriever};
///
/// let retriever = XsdRetriever::new("/var/cache/cfdi/xsd")?;
/// let validator = SchemasValidator::mirrored(LibxmlSchemaValidator, retriever);
/// let xml = std::fs::read_to_string("cfdi.xml")?;
/// validator.validate(&xml)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SchemasValidator {
    strategy: Box<dyn SchemasValidation>,
    mirrored: bool,
}

impl std::fmt::Debug for SchemasValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemasValidator")
            .field("mirrored", &self.mirrored)
            .finish()
    }
}

impl SchemasValidator {
    pub fn direct<V>(validator: V) -> Self
    where
        V: SchemaValidator + 'static,
    {
        Self {
            strategy: Box::new(DirectValidation::new(validator)),
            mirrored: false,
        }
    }

    pub fn mirrored<V, R>(validator: V, retriever: R) -> Self
    where
        V: SchemaValidator + 'static,
        R: ResourceRetriever + 'static,
    {
        Self {
            strategy: Box::new(MirroredValidation::new(validator, retriever)),
            mirrored: true,
        }
    }

    /// libxml validation, mirrored into `schema_cache_dir` when the config sets one.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, RetrieveError> {
        match config.schema_cache_dir() {
            Some(dir) => Ok(Self::mirrored(LibxmlSchemaValidator, XsdRetriever::new(dir)?)),
            None => Ok(Self::direct(LibxmlSchemaValidator)),
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Fails with a single error when `content` does not conform to its declared schemas.
    pub fn validate(&self, content: &str) -> Result<(), SchemaError> {
        self.strategy.validate(content)
    }
}
