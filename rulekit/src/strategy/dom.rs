use super::ParseStrategy;
use crate::context::ParseContext;
use crate::error::RuleResult;
use crate::node::{DomNode, ParseNode};

fn dom_nodes(nodes: &[ParseNode]) -> impl Iterator<Item = &DomNode> {
    nodes.iter().filter_map(ParseNode::as_dom)
}

fn argument<'r>(rule: &'r str, sign: &str) -> &'r str {
    rule.strip_prefix(sign).unwrap_or(rule).trim()
}

/// `tag.<name>`: descendants with the given tag name, `*` for any.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagStrategy;

impl ParseStrategy for TagStrategy {
    fn sign(&self) -> &str {
        "tag."
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let tag = argument(rule, self.sign());
        Ok(dom_nodes(nodes)
            .flat_map(|node| node.descendants(false))
            .filter(|el| tag == "*" || el.tag_name().eq_ignore_ascii_case(tag))
            .map(ParseNode::Dom)
            .collect())
    }
}

/// `class.<names>`: descendants carrying every listed class.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassStrategy;

impl ParseStrategy for ClassStrategy {
    fn sign(&self) -> &str {
        "class."
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let classes: Vec<&str> = argument(rule, self.sign()).split_whitespace().collect();
        if classes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(dom_nodes(nodes)
            .flat_map(|node| node.descendants(false))
            .filter(|el| classes.iter().all(|class| el.has_class(class)))
            .map(ParseNode::Dom)
            .collect())
    }
}

/// `id.<id>`: the first descendant with that id, per input node.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdStrategy;

impl ParseStrategy for IdStrategy {
    fn sign(&self) -> &str {
        "id."
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let id = argument(rule, self.sign());
        Ok(dom_nodes(nodes)
            .filter_map(|node| {
                node.descendants(false)
                    .into_iter()
                    .find(|el| el.attribute("id").as_deref() == Some(id))
            })
            .map(ParseNode::Dom)
            .collect())
    }
}

/**
    `text.<value>`: elements, the input node included, whose trimmed text
    equals the value exactly.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct TextStrategy;

impl ParseStrategy for TextStrategy {
    fn sign(&self) -> &str {
        "text."
    }

    fn parse(
        &self,
        rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        let text = rule.strip_prefix(self.sign()).unwrap_or(rule);
        let mut found: Vec<DomNode> = Vec::new();
        for node in dom_nodes(nodes) {
            for el in node.descendants(true) {
                if el.text_content().trim() == text && !found.contains(&el) {
                    found.push(el);
                }
            }
        }
        Ok(found.into_iter().map(ParseNode::Dom).collect())
    }
}

/// `children`: element children of every input node.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildrenStrategy;

impl ParseStrategy for ChildrenStrategy {
    fn sign(&self) -> &str {
        "children"
    }

    fn can_handle(&self, rule: &str) -> bool {
        rule == "children"
    }

    fn parse(
        &self,
        _rule: &str,
        _context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        Ok(nodes.iter().flat_map(ParseNode::children).collect())
    }
}
