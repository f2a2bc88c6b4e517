use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rulekit::{DocumentSource, EngineConfig, Manifest};
use serde_json::{Map, Value};

#[derive(Parser, Debug)]
pub struct ExtractCommand {
    /// Source ID (see list-sources)
    pub source: String,

    /// Saved page to read (stdin when omitted)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl ExtractCommand {
    pub async fn run(self) -> Result<()> {
        let manifest = rulekit::find_by_id(&self.source)?;
        let content = super::read_input(self.file.as_deref())?;
        let records = extract_records(&manifest, content)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        Ok(())
    }
}

/// Run a manifest's list phase over a fetched or saved page.
pub(super) fn extract_records(
    manifest: &Manifest,
    content: String,
) -> Result<Vec<Map<String, Value>>> {
    let config = EngineConfig {
        base_url: manifest.source.base_url.clone(),
        backend: manifest.source.backend,
        ..EngineConfig::default()
    };
    let engine = config
        .create(DocumentSource::from(content))
        .with_context(|| format!("Failed to create an engine for '{}'", manifest.source.id))?;
    tracing::info!(source = %manifest.source.id, backend = %engine.source_type(), "extracting");
    Ok(manifest.extract(engine.as_ref()))
}
