use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rulekit::EngineConfig;

mod capture;
mod eval;
mod extract;
mod list_sources;
mod request;
mod search;

pub use capture::CaptureCommand;
pub use eval::EvalCommand;
pub use extract::ExtractCommand;
pub use list_sources::ListSourcesCommand;
pub use request::RequestCommand;
pub use search::SearchCommand;

#[derive(Parser, Debug)]
#[command(name = "rulekit")]
#[command(about = "Evaluate extraction rules against HTML, JSON and text documents")]
pub struct Args {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a rule against a document
    Eval(EvalCommand),
    /// Run a line regex over a document and print the selected captures
    Capture(CaptureCommand),
    /// Resolve a request template without sending it
    Request(RequestCommand),
    /// Extract records from a saved page with a bundled source
    Extract(ExtractCommand),
    /// Fetch a search page from a bundled source and extract its records
    Search(SearchCommand),
    /// List bundled sources and exit (default)
    ListSources(ListSourcesCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or(Command::ListSources(ListSourcesCommand));

        match command {
            Command::Eval(cmd) => cmd.run().await,
            Command::Capture(cmd) => cmd.run().await,
            Command::Request(cmd) => cmd.run().await,
            Command::Extract(cmd) => cmd.run().await,
            Command::Search(cmd) => cmd.run().await,
            Command::ListSources(cmd) => cmd.run().await,
        }
    }
}

/// Read a document from `path`, or from stdin when no path is given.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            Ok(content)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}
