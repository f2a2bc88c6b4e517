use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct RequestCommand {
    /// Request template, `url` or `url,{options}`
    pub template: String,

    /// Search key bound as `key`
    #[arg(short, long, default_value = "")]
    pub key: String,

    /// Page number bound as `page`
    #[arg(short, long, default_value_t = 1)]
    pub page: u32,

    /// Base URL for a relative request URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Engine config file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl RequestCommand {
    pub async fn run(self) -> Result<()> {
        let config = super::load_config(self.config.as_ref())?;
        let mut builder = config.request_builder();
        if let Some(base_url) = self.base_url {
            builder = builder.with_base_url(base_url);
        }
        let request = builder.build(&self.template, &self.key, self.page);
        println!("{}", serde_json::to_string_pretty(&request)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from(["rulekit", "request", "/s?q={{key}}", "-k", "dune"])
            .unwrap();
        let Some(Command::Request(cmd)) = args.command else {
            panic!("expected request command");
        };
        assert_eq!(cmd.template, "/s?q={{key}}");
        assert_eq!(cmd.key, "dune");
        assert_eq!(cmd.page, 1);
    }
}
