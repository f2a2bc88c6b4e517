//! Line-oriented positional captures, independent of tree selection.

use regex::Regex;
use tracing::debug;

use crate::error::{RuleError, RuleResult};

/// Select expression naming the whole match.
pub const FULL: &str = "FULL";

/**
    Scan `text` line by line and apply `regex` once per line.

    Every matching line yields one row with one cell per select expression:

    - `FULL` (any case): the whole match
    - `$N`: capture group `N`, empty when it did not participate
    - any other text: a sub-regex applied to the whole match, its match and
      groups concatenated
    - `None`: always empty

    Lines without a match produce no row.
*/
pub fn parse_regex_to_strings(
    regex: &str,
    selects: &[Option<&str>],
    text: &str,
) -> RuleResult<Vec<Vec<String>>> {
    let line_regex = Regex::new(regex).map_err(|e| RuleError::invalid_regex(regex, e))?;
    let selects: Vec<Select> = selects.iter().map(|s| Select::parse(*s)).collect();

    let mut rows = Vec::new();
    for line in text.lines() {
        let Some(caps) = line_regex.captures(line) else {
            continue;
        };
        let row = selects
            .iter()
            .map(|select| select.apply(&caps))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

enum Select {
    Empty,
    Full,
    Group(usize),
    Sub(Option<Regex>),
}

impl Select {
    fn parse(select: Option<&str>) -> Self {
        let Some(select) = select.filter(|s| !s.is_empty()) else {
            return Select::Empty;
        };
        if select.eq_ignore_ascii_case(FULL) {
            return Select::Full;
        }
        if let Some(group) = select.strip_prefix('$')
            && !group.is_empty()
            && group.bytes().all(|b| b.is_ascii_digit())
        {
            return group.parse().map_or(Select::Empty, Select::Group);
        }
        match Regex::new(select) {
            Ok(re) => Select::Sub(Some(re)),
            Err(e) => {
                debug!(select = %select, error = %e, "invalid select regex");
                Select::Sub(None)
            }
        }
    }

    fn apply(&self, caps: &regex::Captures<'_>) -> String {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        match self {
            Select::Empty | Select::Sub(None) => String::new(),
            Select::Full => whole.to_string(),
            Select::Group(n) => caps.get(*n).map_or("", |m| m.as_str()).to_string(),
            Select::Sub(Some(re)) => re
                .captures(whole)
                .map(|sub| {
                    sub.iter()
                        .map(|m| m.map_or("", |m| m.as_str()))
                        .collect::<String>()
                })
                .unwrap_or_default(),
        }
    }
}
