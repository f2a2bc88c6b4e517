use super::ParseStrategy;
use crate::context::ParseContext;
use crate::error::RuleResult;
use crate::node::{ParseNode, is_identifier};
use crate::rule::{IndexFilter, SliceEnd};

/// `$...` / `@json:` JSONPath evaluated on every JSON node.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathStrategy;

impl ParseStrategy for JsonPathStrategy {
    fn sign(&self) -> &str {
        "$"
    }

    fn can_handle(&self, rule: &str) -> bool {
        rule.starts_with('$') || rule.starts_with("@json:")
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let path = rule.strip_prefix("@json:").unwrap_or(rule);
        let mut out = Vec::new();
        for node in nodes.iter().filter_map(ParseNode::as_json) {
            out.extend(node.evaluate_json_path(path)?);
        }
        Ok(out)
    }
}

/**
    `[n]`, `[a:b]`, `[a:b:c]` over JSON arrays.

    A single array node is sliced element-wise. Otherwise the index applies to
    the node set itself, which is what a previous expanding step produced.
    A negative slice end counts like Python's, so `[0:-1]` drops the last
    element.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayIndexStrategy;

impl ParseStrategy for ArrayIndexStrategy {
    fn sign(&self) -> &str {
        "["
    }

    fn can_handle(&self, rule: &str) -> bool {
        rule.starts_with('[') && IndexFilter::parse_exact(rule).is_some()
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let Some(filter) = IndexFilter::parse_exact(rule) else {
            return Ok(Vec::new());
        };
        if let [ParseNode::Json(node)] = nodes
            && node.is_array()
        {
            return Ok(filter.apply_with(node.children(), SliceEnd::Exclusive));
        }
        Ok(filter.apply_with(nodes.to_vec(), SliceEnd::Exclusive))
    }
}

/// Bare identifier: object member, broadcast over arrays.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectKeyStrategy;

impl ParseStrategy for ObjectKeyStrategy {
    fn sign(&self) -> &str {
        ""
    }

    fn priority(&self) -> i32 {
        1
    }

    fn can_handle(&self, rule: &str) -> bool {
        is_identifier(rule)
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        Ok(nodes
            .iter()
            .filter_map(ParseNode::as_json)
            .flat_map(|node| node.key(rule))
            .collect())
    }
}
