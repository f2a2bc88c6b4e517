use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, RuleResult};

mod dom;
mod json;
mod xpath;

pub use self::dom::{DomDocument, DomNode};
pub use self::json::JsonNode;
pub(crate) use self::json::{is_identifier, scalar_text};

/**
    The kind of document a backend understands.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Dom,
    Json,
    Text,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Dom => "dom",
            SourceType::Json => "json",
            SourceType::Text => "text",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dom" | "html" => Ok(SourceType::Dom),
            "json" => Ok(SourceType::Json),
            "text" => Ok(SourceType::Text),
            _ => Err(ParseError {
                kind: "source type",
                value: s.to_string(),
            }),
        }
    }
}

/**
    A node of either backend, behind one operation set.

    The variant never changes after construction. Nodes are cheap handles:
    DOM nodes point into a shared document arena and JSON nodes share their
    value, so cloning a node never copies the underlying tree.
*/
#[derive(Debug, Clone)]
pub enum ParseNode {
    Dom(DomNode),
    Json(JsonNode),
}

impl ParseNode {
    pub fn source_type(&self) -> SourceType {
        match self {
            ParseNode::Dom(_) => SourceType::Dom,
            ParseNode::Json(_) => SourceType::Json,
        }
    }

    pub fn as_dom(&self) -> Option<&DomNode> {
        match self {
            ParseNode::Dom(node) => Some(node),
            ParseNode::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonNode> {
        match self {
            ParseNode::Json(node) => Some(node),
            ParseNode::Dom(_) => None,
        }
    }

    /// Serialized source of this node (outer HTML or compact JSON).
    pub fn raw_content(&self) -> String {
        match self {
            ParseNode::Dom(node) => node.outer_html(),
            ParseNode::Json(node) => node.raw_content(),
        }
    }

    pub fn query_selector_all(&self, selector: &str) -> RuleResult<Vec<ParseNode>> {
        match self {
            ParseNode::Dom(node) => node.query_selector_all(selector),
            ParseNode::Json(node) => node.query_selector_all(selector),
        }
    }

    /// First match of [`ParseNode::query_selector_all`].
    pub fn query_selector(&self, selector: &str) -> RuleResult<Option<ParseNode>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match self {
            ParseNode::Dom(node) => node.attribute(name),
            ParseNode::Json(node) => node.attribute(name),
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            ParseNode::Dom(node) => node.text_content(),
            ParseNode::Json(node) => node.text_content(),
        }
    }

    pub fn outer_html(&self) -> String {
        match self {
            ParseNode::Dom(node) => node.outer_html(),
            ParseNode::Json(node) => node.pretty(),
        }
    }

    pub fn children(&self) -> Vec<ParseNode> {
        match self {
            ParseNode::Dom(node) => node.children(),
            ParseNode::Json(node) => node.children(),
        }
    }

    pub fn evaluate_xpath(&self, xpath: &str) -> RuleResult<Vec<ParseNode>> {
        match self {
            ParseNode::Dom(node) => node.evaluate_xpath(xpath),
            ParseNode::Json(node) => node.evaluate_xpath(xpath),
        }
    }

    /**
        String values of an XPath result: text of elements, values of attributes
        and text nodes, or the scalar the expression produced.
    */
    pub fn evaluate_xpath_strings(&self, xpath: &str) -> RuleResult<Vec<String>> {
        match self {
            ParseNode::Dom(node) => node.evaluate_xpath_strings(xpath),
            ParseNode::Json(node) => node.evaluate_xpath(xpath).map(|_| Vec::new()),
        }
    }

    pub fn evaluate_json_path(&self, path: &str) -> RuleResult<Vec<ParseNode>> {
        match self {
            ParseNode::Dom(node) => node.evaluate_json_path(path),
            ParseNode::Json(node) => node.evaluate_json_path(path),
        }
    }
}

impl From<DomNode> for ParseNode {
    fn from(node: DomNode) -> Self {
        ParseNode::Dom(node)
    }
}

impl From<JsonNode> for ParseNode {
    fn from(node: JsonNode) -> Self {
        ParseNode::Json(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_from_str() {
        assert_eq!("dom".parse::<SourceType>().unwrap(), SourceType::Dom);
        assert_eq!("HTML".parse::<SourceType>().unwrap(), SourceType::Dom);
        assert_eq!(" json ".parse::<SourceType>().unwrap(), SourceType::Json);
        assert_eq!("text".parse::<SourceType>().unwrap(), SourceType::Text);

        let err = "yaml".parse::<SourceType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown source type 'yaml'");
    }

    #[test]
    fn test_node_type_is_stable() {
        let doc = DomDocument::parse("<p>a</p>");
        let node = ParseNode::from(doc.body());
        assert_eq!(node.source_type(), SourceType::Dom);
        for child in node.children() {
            assert_eq!(child.source_type(), SourceType::Dom);
        }

        let json = ParseNode::from(JsonNode::new(serde_json::json!({"a": [1, 2]})));
        assert_eq!(json.source_type(), SourceType::Json);
        for child in json.children() {
            assert_eq!(child.source_type(), SourceType::Json);
        }
    }
}
