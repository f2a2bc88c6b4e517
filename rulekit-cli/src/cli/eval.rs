use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use rulekit::{DocumentSource, ParserEngine, SourceType};
use serde_json::Value;

/// What to produce from the rule.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Output {
    /// One string
    #[default]
    String,
    /// A JSON array of strings
    Strings,
    /// The raw content of each selected sub-tree
    Engines,
    /// One string resolved against the base URL
    Url,
}

#[derive(Parser, Debug)]
pub struct EvalCommand {
    /// The rule to evaluate
    pub rule: String,

    /// Document to read (stdin when omitted)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Force a backend instead of detecting one
    #[arg(short = 't', long = "type")]
    pub source_type: Option<SourceType>,

    /// Output shape
    #[arg(short, long, value_enum, default_value_t = Output::String)]
    pub output: Output,

    /// Base URL for relative links
    #[arg(long)]
    pub base_url: Option<String>,

    /// Engine config file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Script variable as KEY=VALUE; VALUE is read as JSON when it parses
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

impl EvalCommand {
    pub async fn run(self) -> Result<()> {
        let mut config = super::load_config(self.config.as_ref())?;
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if self.source_type.is_some() {
            config.backend = self.source_type;
        }
        for var in &self.vars {
            let (key, value) = parse_var(var)?;
            config.variables.insert(key, value);
        }

        let content = super::read_input(self.file.as_deref())?;
        let engine = config
            .create(DocumentSource::from(content))
            .context("Failed to create an engine for the document")?;
        tracing::debug!(backend = %engine.source_type(), rule = %self.rule, "evaluating");

        for line in render(engine.as_ref(), &self.rule, self.output)? {
            println!("{}", line);
        }
        Ok(())
    }
}

fn render(engine: &dyn ParserEngine, rule: &str, output: Output) -> Result<Vec<String>> {
    Ok(match output {
        Output::String => vec![engine.parse_to_string(rule)],
        Output::Url => vec![engine.parse_to_url(rule)],
        Output::Strings => vec![serde_json::to_string_pretty(&engine.parse_to_strings(rule))?],
        Output::Engines => engine
            .parse_to_engines(rule)
            .iter()
            .map(|sub| sub.raw_content())
            .collect(),
    })
}

fn parse_var(var: &str) -> Result<(String, Value)> {
    let Some((key, value)) = var.split_once('=') else {
        bail!("Invalid variable '{}': expected KEY=VALUE", var);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid variable '{}': empty key", var);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};
    use rulekit::RuleEngine;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "rulekit", "eval", "class.title@text", "--type", "html", "-o", "strings", "--var",
            "n=2",
        ])
        .unwrap();
        let Some(Command::Eval(cmd)) = args.command else {
            panic!("expected eval command");
        };
        assert_eq!(cmd.rule, "class.title@text");
        assert_eq!(cmd.source_type, Some(SourceType::Dom));
        assert_eq!(cmd.output, Output::Strings);
        assert_eq!(cmd.vars, vec!["n=2"]);
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(Args::try_parse_from(["rulekit", "eval", "x", "--type", "yaml"]).is_err());
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("n=2").unwrap(), ("n".to_string(), Value::from(2)));
        assert_eq!(
            parse_var("lang=en").unwrap(),
            ("lang".to_string(), Value::from("en"))
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=1").is_err());
    }

    #[test]
    fn test_render() {
        let engine = RuleEngine::dom("<ul><li>a</li><li>b</li></ul>");
        assert_eq!(render(&engine, "tag.li@text", Output::String).unwrap(), vec!["ab"]);
        assert_eq!(
            render(&engine, "tag.li@text", Output::Strings).unwrap(),
            vec!["[\n  \"a\",\n  \"b\"\n]"]
        );
        assert_eq!(render(&engine, "tag.li", Output::Engines).unwrap().len(), 2);
    }
}
