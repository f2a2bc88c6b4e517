//! XPath over scraper documents.
//!
//! scraper has no XPath support, so each evaluation copies the document into an
//! `sxd-document` package and runs `sxd-xpath` against the copy. Every mirrored
//! element carries a marker attribute indexing back into the scraper arena.

use ego_tree::NodeId;
use ego_tree::iter::Edge;
use scraper::Node;
use sxd_document::Package;
use sxd_document::dom::Element;
use sxd_xpath::{Context, Factory, Value, nodeset};

use super::DomNode;
use crate::error::{RuleError, RuleResult};
use crate::script::format_number;

const MARKER: &str = "data-rulekit-node";

pub(super) struct XPathItem {
    /// Set for element results only.
    pub node: Option<NodeId>,
    pub text: String,
}

pub(super) fn evaluate(node: &DomNode, expr: &str) -> RuleResult<Vec<XPathItem>> {
    let factory = Factory::new();
    let xpath = factory
        .build(expr)
        .map_err(|_| RuleError::InvalidXPath(expr.to_string()))?
        .ok_or_else(|| RuleError::InvalidXPath(expr.to_string()))?;

    let package = Package::new();
    let document = package.as_document();

    // ── Mirror ─────────────────────────────────────────────────────────
    let mut ids: Vec<NodeId> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut context_node = None;

    for edge in node.document().tree.root().traverse() {
        match edge {
            Edge::Open(current) => match current.value() {
                Node::Element(el) => {
                    let mirrored = document.create_element(el.name());
                    for (name, value) in el.attrs() {
                        if name != MARKER {
                            mirrored.set_attribute_value(name, value);
                        }
                    }
                    mirrored.set_attribute_value(MARKER, &ids.len().to_string());
                    ids.push(current.id());

                    match stack.last() {
                        Some(parent) => parent.append_child(mirrored),
                        None => document.root().append_child(mirrored),
                    }
                    if current.id() == node.id() {
                        context_node = Some(mirrored);
                    }
                    stack.push(mirrored);
                }
                Node::Text(text) => {
                    if let Some(parent) = stack.last() {
                        parent.append_child(document.create_text(text));
                    }
                }
                _ => {}
            },
            Edge::Close(current) => {
                if current.value().is_element() {
                    stack.pop();
                }
            }
        }
    }

    // ── Evaluate ───────────────────────────────────────────────────────
    let context = Context::new();
    let value = match context_node {
        Some(element) => xpath.evaluate(&context, element),
        None => xpath.evaluate(&context, document.root()),
    }
    .map_err(|e| RuleError::XPathEvaluation(format!("{e:?}")))?;

    let items = match value {
        Value::Nodeset(nodes) => nodes
            .document_order()
            .into_iter()
            .filter_map(|found| match found {
                nodeset::Node::Element(element) => Some(XPathItem {
                    node: element
                        .attribute_value(MARKER)
                        .and_then(|index| index.parse::<usize>().ok())
                        .and_then(|index| ids.get(index).copied()),
                    text: found.string_value(),
                }),
                nodeset::Node::Attribute(attribute)
                    if attribute.name().local_part() == MARKER =>
                {
                    None
                }
                nodeset::Node::Root(_) => None,
                _ => Some(XPathItem {
                    node: None,
                    text: found.string_value(),
                }),
            })
            .collect(),
        Value::String(s) => vec![XPathItem {
            node: None,
            text: s,
        }],
        Value::Number(n) => vec![XPathItem {
            node: None,
            text: format_number(n),
        }],
        Value::Boolean(b) => vec![XPathItem {
            node: None,
            text: b.to_string(),
        }],
    };
    Ok(items)
}
