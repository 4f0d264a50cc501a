//! Read-only access to the fields of an already parsed CFDI.
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use libxml::{
    parser::Parser,
    tree::{Document, Node},
};
use std::path::Path;
use thiserror::Error;

/// Errors emitted while loading a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("XML parse error: {0}")]
    XmlParse(String),
    #[error("failed to read document '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("document has no root element")]
    MissingRoot,
}

/// Fields the validators read from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentField {
    Version,
    CertificateSerial,
    Certificate,
    Signature,
    Date,
    IssuerId,
    IssuerName,
}

/// Where a field lives: on the root element or on the issuer (`Emisor`) element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOwner {
    Root,
    Issuer,
}

impl DocumentField {
    /// Attribute name as written in legacy documents. Lookup ignores case, so
    /// `NoCertificado` in current documents matches `noCertificado`.
    pub const fn attribute(&self) -> &'static str {
        match self {
            DocumentField::Version => "version",
            DocumentField::CertificateSerial => "noCertificado",
            DocumentField::Certificate => "certificado",
            DocumentField::Signature => "sello",
            DocumentField::Date => "fecha",
            DocumentField::IssuerId => "rfc",
            DocumentField::IssuerName => "nombre",
        }
    }

    const fn owner(&self) -> FieldOwner {
        match self {
            DocumentField::IssuerId | DocumentField::IssuerName => FieldOwner::Issuer,
            _ => FieldOwner::Root,
        }
    }
}

/// Capability interface over a parsed document.
///
/// `get` returns `None` when the field is absent, which is distinct from a present but empty value.
pub trait DocumentView {
    fn get(&self, field: DocumentField) -> Option<String>;

    /// Raw source the document was parsed from, input for canonical content builders.
    fn source(&self) -> &str;
}

/// libxml-backed [`DocumentView`].
pub struct XmlDocument {
    source: String,
    document: Document,
}

impl std::fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlDocument")
            .field("source_len", &self.source.len())
            .finish()
    }
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let document = Parser::default()
            .parse_string(xml)
            .map_err(|e| DocumentError::XmlParse(format!("{e:?}")))?;
        if document.get_root_element().is_none() {
            return Err(DocumentError::MissingRoot);
        }
        Ok(Self {
            source: xml.to_string(),
            document,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let xml = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&xml)
    }

    fn issuer_node(root: &Node) -> Option<Node> {
        root.get_child_elements()
            .into_iter()
            .find(|node| node.get_name().eq_ignore_ascii_case("Emisor"))
    }
}

impl DocumentView for XmlDocument {
    fn get(&self, field: DocumentField) -> Option<String> {
        let root = self.document.get_root_element()?;
        let node = match field.owner() {
            FieldOwner::Root => root,
            FieldOwner::Issuer => Self::issuer_node(&root)?,
        };
        attribute_ignore_case(&node, field.attribute())
    }

    fn source(&self) -> &str {
        &self.source
    }
}

// Exact spelling wins; otherwise the smallest case-insensitive match, so the result
// does not depend on map order.
fn attribute_ignore_case(node: &Node, name: &str) -> Option<String> {
    let properties = node.get_properties();
    if let Some(value) = properties.get(name) {
        return Some(value.clone());
    }
    properties
        .into_iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, value)| value)
}

/// Identity fields a document claims for its issuer, read once per validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredIssuer {
    serial: String,
    owner_id: String,
    owner_name: String,
    document_date: Option<DateTime<Utc>>,
    signature_base64: String,
    version: String,
}

impl DeclaredIssuer {
    /// Missing text fields read as empty strings; a missing or unparseable date reads as `None`.
    /// Dates without an explicit offset are interpreted at `offset`.
    pub fn from_view(view: &dyn DocumentView, offset: FixedOffset) -> Self {
        let text = |field| view.get(field).unwrap_or_default();
        Self {
            serial: text(DocumentField::CertificateSerial),
            owner_id: text(DocumentField::IssuerId),
            owner_name: text(DocumentField::IssuerName),
            document_date: view
                .get(DocumentField::Date)
                .and_then(|raw| parse_document_date(&raw, offset)),
            signature_base64: text(DocumentField::Signature),
            version: text(DocumentField::Version),
        }
    }

    pub fn new(
        serial: impl Into<String>,
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
        document_date: Option<DateTime<Utc>>,
        signature_base64: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            serial: serial.into(),
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
            document_date,
            signature_base64: signature_base64.into(),
            version: version.into(),
        }
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

    pub fn document_date(&self) -> Option<DateTime<Utc>> {
        self.document_date
    }

    pub fn signature_base64(&self) -> &str {
        &self.signature_base64
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

const LOCAL_DATE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a document date. Accepts RFC 3339 and the offset-less local forms CFDI uses.
pub fn parse_document_date(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    LOCAL_DATE_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(raw, format).ok()?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|local| local.with_timezone(&Utc))
    })
}
