use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cfdi_core::config::ValidationConfig;
use cfdi_core::document::XmlDocument;
use cfdi_core::issues::Issues;
use cfdi_core::schemas::SchemasValidator;
use cfdi_core::validation::canonical::{CanonicalBuilder, PrecomputedCanonical};
use cfdi_core::validation::certificate::CertificateValidator;
use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfdi")]
#[command(about = "Validate CFDI certificates, seals and schemas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the embedded certificate against the document and verify the seal.
    Certificate {
        #[arg(long)]
        invoice: PathBuf,
        /// File holding the original chain the seal covers. Without it the seal is not checked.
        #[arg(long)]
        canonical: Option<PathBuf>,
        /// UTC offset, in minutes, for document dates that carry none.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset_minutes: i32,
    },
    /// Validate the document against the XSD schemas it declares.
    Schemas {
        #[arg(long)]
        invoice: PathBuf,
        /// Mirror declared schemas here and validate offline.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let issues = match cli.command {
        Commands::Certificate {
            invoice,
            canonical,
            offset_minutes,
        } => {
            let offset = offset_minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .with_context(|| format!("invalid offset of {offset_minutes} minutes"))?;
            let document = XmlDocument::from_file(&invoice)?;
            let precomputed = canonical
                .map(|path| {
                    std::fs::read(&path)
                        .map(PrecomputedCanonical::new)
                        .with_context(|| format!("reading {}", path.display()))
                })
                .transpose()?;
            let builder = precomputed
                .as_ref()
                .map(|content| content as &dyn CanonicalBuilder);

            let config = ValidationConfig::default().with_document_offset(offset);
            let mut issues = Issues::new();
            CertificateValidator::new(config).validate(&document, &mut issues, builder);
            issues
        }
        Commands::Schemas { invoice, cache_dir } => {
            let content = std::fs::read_to_string(&invoice)
                .with_context(|| format!("reading {}", invoice.display()))?;
            let config = match cache_dir {
                Some(dir) => ValidationConfig::default().with_schema_cache_dir(dir),
                None => ValidationConfig::default(),
            };
            let validator = SchemasValidator::from_config(&config)?;
            let mut issues = Issues::new();
            if let Err(err) = validator.validate(&content) {
                issues.add_error(err.to_string());
            }
            issues
        }
    };

    println!("{}", serde_json::to_string_pretty(&issues)?);
    Ok(if issues.is_accepted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
