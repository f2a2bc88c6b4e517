use std::borrow::Cow;

use regex::Regex;
use tracing::{debug, trace, warn};

use super::index::IndexFilter;
use super::split::{split_chain, split_combinator, strip_prefix_ci};
use super::{Preprocessed, preprocess};
use crate::context::ParseContext;
use crate::error::RuleResult;
use crate::extractor::{Extracted, extract_builtin};
use crate::node::ParseNode;
use crate::registry::Registry;
use crate::script::{ScriptSandbox, replace_bounded};

// ── Segment kinds ──────────────────────────────────────────────────────

enum Explicit<'s> {
    XPath(&'s str),
    JsonPath(Cow<'s, str>),
    Css(&'s str),
}

fn explicit(segment: &str) -> Option<Explicit<'_>> {
    if let Some(xpath) = strip_prefix_ci(segment, "@xpath:") {
        return Some(Explicit::XPath(xpath.trim()));
    }
    if segment.starts_with("//") {
        return Some(Explicit::XPath(segment));
    }
    if let Some(path) = strip_prefix_ci(segment, "@json:") {
        let path = path.trim();
        return Some(Explicit::JsonPath(if path.starts_with('$') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("$.{path}"))
        }));
    }
    if segment.starts_with("$.") || segment.starts_with("$[") {
        return Some(Explicit::JsonPath(Cow::Borrowed(segment)));
    }
    strip_prefix_ci(segment, "@css:").map(|css| Explicit::Css(css.trim()))
}

/// A leading `-` asks for the result in reverse order.
fn strip_reverse(rule: &str) -> (&str, bool) {
    match rule.strip_prefix('-') {
        Some(rest) => (rest.trim_start(), true),
        None => (rule, false),
    }
}

fn each(
    nodes: &[ParseNode],
    f: impl Fn(&ParseNode) -> RuleResult<Vec<ParseNode>>,
) -> RuleResult<Vec<ParseNode>> {
    let mut out = Vec::new();
    for node in nodes {
        out.extend(f(node)?);
    }
    Ok(out)
}

/// Row-major interleave: element 0 of every list, then element 1, and so on.
fn interleave<T>(lists: Vec<Vec<T>>) -> Vec<T> {
    let rows = lists.iter().map(Vec::len).max().unwrap_or(0);
    let mut iters: Vec<_> = lists.into_iter().map(IntoIterator::into_iter).collect();
    let mut out = Vec::new();
    for _ in 0..rows {
        for iter in &mut iters {
            if let Some(item) = iter.next() {
                out.push(item);
            }
        }
    }
    out
}

/**
    Combinators over list results, split in the order `||`, `&&`, `%%`.

    `||` keeps the first non-empty alternative, `&&` concatenates and `%%`
    interleaves.
*/
fn combine<T>(rule: &str, leaf: &dyn Fn(&str) -> Vec<T>) -> Vec<T> {
    let alternatives = split_combinator(rule, "||");
    if alternatives.len() > 1 {
        return alternatives
            .into_iter()
            .map(|part| combine(part, leaf))
            .find(|found| !found.is_empty())
            .unwrap_or_default();
    }

    let parts = split_combinator(rule, "&&");
    if parts.len() > 1 {
        return parts.into_iter().flat_map(|part| combine(part, leaf)).collect();
    }

    let parts = split_combinator(rule, "%%");
    if parts.len() > 1 {
        return interleave(parts.into_iter().map(|part| combine(part, leaf)).collect());
    }

    leaf(rule)
}

// ── Evaluator ──────────────────────────────────────────────────────────

/**
    Reduces rule text against a node set.

    Every failure below the public entry points is recovered here: backend
    errors become empty results, a bad `##` regex leaves the value as is and
    a failing script returns its input.
*/
pub(crate) struct Evaluator<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) context: &'a ParseContext,
    pub(crate) sandbox: &'a dyn ScriptSandbox,
}

impl Evaluator<'_> {
    /// String mode: one value for the whole rule.
    pub(crate) fn eval_string(&self, rule: &str, roots: &[ParseNode]) -> String {
        let pre = preprocess(rule);
        let value = self.string_rule(pre.rule, roots);
        self.postprocess(value, &pre)
    }

    /// Node mode. `##` and `@js:` suffixes have no meaning for nodes.
    pub(crate) fn eval_nodes(&self, rule: &str, roots: &[ParseNode]) -> Vec<ParseNode> {
        let pre = preprocess(rule);
        if pre.replace.is_some() || pre.script.is_some() {
            debug!(rule = %rule, "ignoring post-processing suffix in node mode");
        }
        combine(pre.rule, &|part| self.node_chain(part, roots))
    }

    /// List mode: one value per selected node, each post-processed.
    pub(crate) fn eval_strings(&self, rule: &str, roots: &[ParseNode]) -> Vec<String> {
        let pre = preprocess(rule);
        combine(pre.rule, &|part| self.string_list_chain(part, roots))
            .into_iter()
            .map(|value| self.postprocess(value, &pre))
            .collect()
    }

    fn postprocess(&self, mut value: String, pre: &Preprocessed<'_>) -> String {
        if let Some((pattern, replacement)) = &pre.replace {
            match Regex::new(pattern) {
                Ok(re) => match replace_bounded(&re, &value, replacement, true) {
                    Ok(out) => value = out,
                    Err(e) => warn!(pattern = %pattern, error = %e, "replace failed, keeping value"),
                },
                Err(e) => debug!(pattern = %pattern, error = %e, "invalid replace regex"),
            }
        }
        if let Some(script) = pre.script {
            match self.sandbox.run(script, &value, self.context) {
                Ok(out) => value = out,
                Err(e) => warn!(script = %script, error = %e, "script failed, keeping value"),
            }
        }
        value
    }

    /// String combinators: `||` first non-empty, `&&` concatenation, `%%` rows.
    fn string_rule(&self, rule: &str, nodes: &[ParseNode]) -> String {
        let alternatives = split_combinator(rule, "||");
        if alternatives.len() > 1 {
            return alternatives
                .into_iter()
                .map(|part| self.string_rule(part, nodes))
                .find(|value| !value.is_empty())
                .unwrap_or_default();
        }

        let parts = split_combinator(rule, "&&");
        if parts.len() > 1 {
            return parts
                .into_iter()
                .map(|part| self.string_rule(part, nodes))
                .collect();
        }

        let parts = split_combinator(rule, "%%");
        if parts.len() > 1 {
            let columns: Vec<Vec<String>> = parts
                .into_iter()
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let value = self.string_rule(part, nodes);
                    if value.is_empty() {
                        Vec::new()
                    } else {
                        value.split('\n').map(str::to_string).collect()
                    }
                })
                .collect();
            let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
            return (0..rows)
                .map(|i| {
                    columns
                        .iter()
                        .filter_map(|column| column.get(i).map(String::as_str))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect::<Vec<_>>()
                .join("\n");
        }

        self.string_chain(rule, nodes)
    }

    fn string_chain(&self, rule: &str, roots: &[ParseNode]) -> String {
        self.chain_values(rule, roots)
            .into_iter()
            .map(|values| values.join("\n"))
            .collect()
    }

    fn string_list_chain(&self, rule: &str, roots: &[ParseNode]) -> Vec<String> {
        self.chain_values(rule, roots).into_iter().flatten().collect()
    }

    /// Narrow through every segment but the last, then extract per node.
    fn chain_values(&self, rule: &str, roots: &[ParseNode]) -> Vec<Vec<String>> {
        let (rule, _) = strip_reverse(rule);
        let segments = split_chain(rule);
        let Some((last, init)) = segments.split_last() else {
            return Vec::new();
        };

        let mut nodes = roots.to_vec();
        for segment in init {
            nodes = self.narrow(segment, &nodes);
            if nodes.is_empty() {
                return Vec::new();
            }
        }
        nodes.iter().map(|node| self.extract(node, last)).collect()
    }

    fn node_chain(&self, rule: &str, roots: &[ParseNode]) -> Vec<ParseNode> {
        let (rule, reverse) = strip_reverse(rule);
        let mut nodes = roots.to_vec();
        for segment in split_chain(rule) {
            if nodes.is_empty() {
                break;
            }
            nodes = self.narrow(&segment, &nodes);
        }
        if reverse {
            nodes.reverse();
        }
        nodes
    }

    /**
        Apply one chain segment to the current node set.

        An index suffix filters the current set first and the rest of the
        segment runs on the survivors, so `class.item.1` searches inside the
        second current node. Explicit XPath and JSONPath segments never carry
        an index suffix. A segment made of an index alone filters the current
        set unless a strategy claims it.
    */
    fn narrow(&self, segment: &str, nodes: &[ParseNode]) -> Vec<ParseNode> {
        trace!(segment = %segment, nodes = nodes.len(), "narrow");
        if matches!(explicit(segment), Some(Explicit::XPath(_) | Explicit::JsonPath(_))) {
            return self.dispatch(segment, nodes);
        }

        match IndexFilter::strip(segment) {
            (body, Some(filter)) if body.trim().is_empty() => {
                if self.registry.strategy_for(segment).is_some() {
                    self.dispatch(segment, nodes)
                } else {
                    filter.apply(nodes.to_vec())
                }
            }
            (body, Some(filter)) => self.dispatch(body.trim(), &filter.apply(nodes.to_vec())),
            (_, None) if segment.is_empty() => nodes.to_vec(),
            (_, None) => self.dispatch(segment, nodes),
        }
    }

    fn dispatch(&self, segment: &str, nodes: &[ParseNode]) -> Vec<ParseNode> {
        let result = match explicit(segment) {
            Some(Explicit::XPath(xpath)) => each(nodes, |node| node.evaluate_xpath(xpath)),
            Some(Explicit::JsonPath(path)) => each(nodes, |node| node.evaluate_json_path(&path)),
            Some(Explicit::Css(css)) => each(nodes, |node| node.query_selector_all(css)),
            None => match self.registry.strategy_for(segment) {
                Some(strategy) => {
                    trace!(segment = %segment, strategy = strategy.sign(), "strategy");
                    strategy.parse(segment, self.context, nodes)
                }
                None => each(nodes, |node| node.query_selector_all(segment)),
            },
        };
        result.unwrap_or_else(|e| {
            debug!(segment = %segment, error = %e, "segment matched nothing");
            Vec::new()
        })
    }

    /// Values of the final chain segment for one node.
    fn extract(&self, node: &ParseNode, rule: &str) -> Vec<String> {
        let texts = |found: RuleResult<Vec<ParseNode>>| -> RuleResult<Vec<String>> {
            Ok(found?.iter().map(ParseNode::text_content).collect())
        };
        let result = match explicit(rule) {
            Some(Explicit::XPath(xpath)) => node.evaluate_xpath_strings(xpath),
            Some(Explicit::JsonPath(path)) => texts(node.evaluate_json_path(&path)),
            Some(Explicit::Css(css)) => texts(node.query_selector_all(css)),
            None => {
                return match self.registry.extractor_for(rule) {
                    Some(extractor) => match extractor.extract(node, rule) {
                        Extracted::One(value) => vec![value],
                        Extracted::Many(values) => values,
                    },
                    None => vec![extract_builtin(node, rule)],
                };
            }
        };
        result.unwrap_or_else(|e| {
            debug!(rule = %rule, error = %e, "extraction failed");
            Vec::new()
        })
    }
}
