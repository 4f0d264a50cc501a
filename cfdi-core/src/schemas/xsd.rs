use libxml::{
    error::StructuredError,
    parser::Parser,
    schemas::{SchemaParserContext, SchemaValidationContext},
    tree::Document,
    xpath,
};

use super::{SchemaError, SchemaReference, SchemaValidator};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// [`SchemaValidator`] backed by libxml2.
///
/// Schemas are discovered from every `xsi:schemaLocation` attribute in the document and
/// loaded through a generated schema that imports each namespace from its location.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibxmlSchemaValidator;

impl SchemaValidator for LibxmlSchemaValidator {
    fn schemas(&self, content: &str) -> Result<Vec<SchemaReference>, SchemaError> {
        let doc = parse(content)?;
        let ctx = xpath::Context::new(&doc)
            .map_err(|e| SchemaError::XmlParse(format!("XPath context error: {e:?}")))?;
        ctx.register_namespace("xsi", XSI_NS)
            .map_err(|e| SchemaError::XmlParse(format!("XPath context error: {e:?}")))?;
        let declarations = ctx
            .evaluate("//@xsi:schemaLocation")
            .map_err(|e| SchemaError::XmlParse(format!("XPath error: {e:?}")))?
            .get_nodes_as_vec()
            .into_iter()
            .map(|node| node.get_content());

        let mut schemas: Vec<SchemaReference> = Vec::new();
        for value in declarations {
            for reference in parse_schema_location(&value)? {
                if !schemas
                    .iter()
                    .any(|known| known.namespace() == reference.namespace())
                {
                    schemas.push(reference);
                }
            }
        }
        Ok(schemas)
    }

    fn validate_with_schemas(
        &self,
        content: &str,
        schemas: &[SchemaReference],
    ) -> Result<(), SchemaError> {
        if schemas.is_empty() {
            return Err(SchemaError::NoSchemas);
        }
        let import = import_schema(schemas);
        let mut parser_ctx = SchemaParserContext::from_buffer(&import);
        let mut validation_ctx = SchemaValidationContext::from_parser(&mut parser_ctx)
            .map_err(|errors| SchemaError::SchemaLoad {
                message: last_message(&errors),
            })?;
        let document = parse(content)?;
        validation_ctx
            .validate_document(&document)
            .map_err(|errors| SchemaError::Invalid {
                message: last_message(&errors),
            })
    }
}

fn parse(content: &str) -> Result<Document, SchemaError> {
    Parser::default()
        .parse_string(content)
        .map_err(|e| SchemaError::XmlParse(format!("{e:?}")))
}

/// Split an `xsi:schemaLocation` value into namespace/location pairs.
pub fn parse_schema_location(value: &str) -> Result<Vec<SchemaReference>, SchemaError> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err(SchemaError::InvalidSchemaLocation {
            value: value.to_string(),
        });
    }
    Ok(tokens
        .chunks(2)
        .map(|pair| SchemaReference::new(pair[0], pair[1]))
        .collect())
}

fn import_schema(schemas: &[SchemaReference]) -> String {
    let imports: String = schemas
        .iter()
        .map(|schema| {
            format!(
                "  <xs:import namespace=\"{}\" schemaLocation=\"{}\"/>\n",
                escape_attribute(schema.namespace()),
                escape_attribute(&schema.effective_location())
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" elementFormDefault=\"qualified\">\n\
         {imports}</xs:schema>\n"
    )
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

// libxml reports every diagnostic; callers get the last one verbatim.
fn last_message(errors: &[StructuredError]) -> String {
    errors
        .last()
        .map(|error| match &error.message {
            Some(message) => message.trim_end().to_string(),
            None => format!("{error:#?}"),
        })
        .unwrap_or_else(|| "unknown schema error".to_string())
}
