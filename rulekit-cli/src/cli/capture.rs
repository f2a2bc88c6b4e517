use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
pub struct CaptureCommand {
    /// Regex applied to every line
    pub regex: String,

    /// Cell to print per match: FULL, $N or a sub-regex (repeatable)
    #[arg(short, long = "select", value_name = "SELECT")]
    pub selects: Vec<String>,

    /// Document to read (stdin when omitted)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl CaptureCommand {
    pub async fn run(self) -> Result<()> {
        let content = super::read_input(self.file.as_deref())?;
        for row in capture_rows(&self.regex, &self.selects, &content)? {
            println!("{}", row.join("\t"));
        }
        Ok(())
    }
}

/// Without selects every row holds the whole match.
fn capture_rows(regex: &str, selects: &[String], content: &str) -> Result<Vec<Vec<String>>> {
    let selects: Vec<Option<&str>> = if selects.is_empty() {
        vec![Some(rulekit::FULL)]
    } else {
        selects.iter().map(|s| Some(s.as_str())).collect()
    };
    rulekit::parse_regex_to_strings(regex, &selects, content)
        .with_context(|| format!("Failed to capture with '{}'", regex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn test_parse_args() {
        let args =
            Args::try_parse_from(["rulekit", "capture", r"id=(\d+)", "-s", "$1", "-s", "FULL"])
                .unwrap();
        let Some(Command::Capture(cmd)) = args.command else {
            panic!("expected capture command");
        };
        assert_eq!(cmd.selects, vec!["$1", "FULL"]);
    }

    #[test]
    fn test_capture_rows() {
        let selects = vec!["$1".to_string(), "$2".to_string()];
        let rows = capture_rows(r"id=(\d+) name=(\w+)", &selects, "id=42 name=foo\nnoise").unwrap();
        assert_eq!(rows, vec![vec!["42", "foo"]]);

        let rows = capture_rows(r"\d+", &[], "a1\nb22").unwrap();
        assert_eq!(rows, vec![vec!["1"], vec!["22"]]);

        assert!(capture_rows("(", &[], "x").is_err());
    }
}
