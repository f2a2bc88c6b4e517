use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct ListSourcesCommand;

impl ListSourcesCommand {
    pub async fn run(self) -> Result<()> {
        println!("Available sources:");
        for manifest in rulekit::load_all()? {
            println!("  - {} ({})", manifest.source.id, manifest.source.name);
        }
        Ok(())
    }
}
