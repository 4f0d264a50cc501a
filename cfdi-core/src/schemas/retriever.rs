use libxml::{parser::Parser, xpath};
use reqwest::blocking::Client;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{ResourceRetriever, RetrieveError};

const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads XSD files into a local mirror at `<base>/<host>/<path>`. A non-default port
/// becomes part of the host directory as `<host>_<port>`.
///
/// A downloaded schema's `xs:import`/`xs:include` locations are rewritten to point at their
/// mirrored siblings and fetched too, so later validations run offline. Existing files are
/// never overwritten.
#[derive(Debug, Clone)]
pub struct XsdRetriever {
    base_path: PathBuf,
    client: Client,
}

impl XsdRetriever {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, RetrieveError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(RetrieveError::Client)?;
        Ok(Self::with_client(base_path, client))
    }

    pub fn with_client(base_path: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            base_path: base_path.into(),
            client,
        }
    }

    fn download(&self, location: &str) -> Result<String, RetrieveError> {
        let http_error = |source| RetrieveError::Http {
            location: location.to_string(),
            source,
        };
        let response = self.client.get(location).send().map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrieveError::Status {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(http_error)
    }

    /// Point nested schema locations at their mirrored copies. Returns the absolute
    /// locations that still need to be mirrored.
    fn relink(
        &self,
        location: &Url,
        local_path: &Path,
        content: &str,
    ) -> Result<(String, Vec<String>), RetrieveError> {
        let invalid = |message: String| RetrieveError::InvalidSchema {
            location: location.to_string(),
            message,
        };
        let doc = Parser::default()
            .parse_string(content)
            .map_err(|e| invalid(format!("{e:?}")))?;
        let ctx = xpath::Context::new(&doc).map_err(|e| invalid(format!("{e:?}")))?;
        ctx.register_namespace("xs", XS_NS)
            .map_err(|e| invalid(format!("{e:?}")))?;
        let nodes = ctx
            .evaluate("//xs:import[@schemaLocation] | //xs:include[@schemaLocation]")
            .map_err(|e| invalid(format!("{e:?}")))?
            .get_nodes_as_vec();

        let mut nested = Vec::new();
        for mut node in nodes {
            let Some(declared) = node.get_attribute("schemaLocation") else {
                continue;
            };
            let absolute = location
                .join(declared.trim())
                .map_err(|_| RetrieveError::InvalidLocation {
                    location: declared.clone(),
                })?;
            let nested_path = self.local_path(absolute.as_str())?;
            node.set_attribute("schemaLocation", &relative_location(local_path, &nested_path))
                .map_err(|e| invalid(e.to_string()))?;
            nested.push(absolute.to_string());
        }
        Ok((doc.to_string(), nested))
    }
}

impl ResourceRetriever for XsdRetriever {
    fn local_path(&self, location: &str) -> Result<PathBuf, RetrieveError> {
        let invalid = || RetrieveError::InvalidLocation {
            location: location.to_string(),
        };
        let url = Url::parse(location).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?;
        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid());
        }
        let mut path = match url.port() {
            Some(port) => self.base_path.join(format!("{host}_{port}")),
            None => self.base_path.join(host),
        };
        path.extend(segments);
        Ok(path)
    }

    fn retrieve(&self, location: &str) -> Result<PathBuf, RetrieveError> {
        let url = Url::parse(location).map_err(|_| RetrieveError::InvalidLocation {
            location: location.to_string(),
        })?;
        let local_path = self.local_path(location)?;

        info!(location, path = %local_path.display(), "downloading schema");
        let content = self.download(location)?;
        let (content, nested) = self.relink(&url, &local_path, &content)?;

        // Written before recursing so import cycles see the file and stop.
        if !local_path.exists() {
            if let Some(parent) = local_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| RetrieveError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&local_path, content).map_err(|source| RetrieveError::Io {
                path: local_path.clone(),
                source,
            })?;
        }

        for nested_location in nested {
            if self.local_path(&nested_location)?.exists() {
                debug!(location = %nested_location, "nested schema already mirrored");
                continue;
            }
            self.retrieve(&nested_location)?;
        }
        Ok(local_path)
    }
}

/// Path of `to` relative to the directory holding `from`, with `/` separators.
fn relative_location(from: &Path, to: &Path) -> String {
    let from_dir: Vec<Component> = from
        .parent()
        .map(|dir| dir.components().collect())
        .unwrap_or_default();
    let to_parts: Vec<Component> = to.components().collect();
    let common = from_dir
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = std::iter::repeat("..".to_string()).take(from_dir.len() - common);
    let downs = to_parts[common..]
        .iter()
        .map(|part| part.as_os_str().to_string_lossy().into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}
