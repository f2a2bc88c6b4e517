//! Terminal content extraction for the last segment of a chain.

use crate::node::{ParseNode, is_identifier, scalar_text};

/// Built-in extraction tokens shared by every backend.
pub const BUILTIN_TOKENS: &[&str] = &["text", "ownText", "textNodes", "html", "all"];

/**
    Result of an extractor: one value, or several joined with newlines.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    One(String),
    Many(Vec<String>),
}

impl Extracted {
    pub fn into_string(self) -> String {
        match self {
            Extracted::One(value) => value,
            Extracted::Many(values) => values.join("\n"),
        }
    }
}

impl From<String> for Extracted {
    fn from(value: String) -> Self {
        Extracted::One(value)
    }
}

/**
    Produces content from a node once selection is done.
*/
pub trait ContentExtractor {
    fn can_extract(&self, rule: &str) -> bool;
    fn extract(&self, node: &ParseNode, rule: &str) -> Extracted;
}

/**
    Extraction when no registered extractor claims the rule.

    `text`/`ownText` give the full text, `textNodes` the text of leaf
    children joined by newlines, `html`/`all` the serialized node, and any
    other rule is an attribute name.
*/
pub fn extract_builtin(node: &ParseNode, rule: &str) -> String {
    match rule {
        "text" | "ownText" => node.text_content(),
        "textNodes" => node
            .children()
            .iter()
            .filter(|child| child.children().is_empty())
            .map(ParseNode::text_content)
            .collect::<Vec<_>>()
            .join("\n"),
        "html" | "all" => node.outer_html(),
        name => node.attribute(name).unwrap_or_default(),
    }
}

/// Text, markup and attributes of DOM elements.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomContentExtractor;

impl ContentExtractor for DomContentExtractor {
    fn can_extract(&self, rule: &str) -> bool {
        BUILTIN_TOKENS.contains(&rule)
            || rule.starts_with('@')
            || rule.starts_with('$')
            || rule.starts_with(|c: char| c.is_ascii_alphabetic())
    }

    fn extract(&self, node: &ParseNode, rule: &str) -> Extracted {
        let Some(dom) = node.as_dom() else {
            return Extracted::One(String::new());
        };
        match rule {
            "text" | "ownText" => Extracted::One(dom.text_content()),
            "textNodes" => Extracted::Many(dom.own_text_nodes()),
            "html" | "all" => Extracted::One(dom.outer_html()),
            name => Extracted::One(dom.attribute(name).unwrap_or_default()),
        }
    }
}

/**
    Object members of JSON nodes, with the built-in tokens as fallback.

    On an array node the key is read from every object element.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonKeyExtractor;

impl ContentExtractor for JsonKeyExtractor {
    fn can_extract(&self, rule: &str) -> bool {
        is_identifier(rule) || BUILTIN_TOKENS.contains(&rule)
    }

    fn extract(&self, node: &ParseNode, rule: &str) -> Extracted {
        let Some(json) = node.as_json() else {
            return Extracted::One(String::new());
        };
        match json.value() {
            serde_json::Value::Object(map) if map.contains_key(rule) => Extracted::One(
                map.get(rule)
                    .filter(|v| !v.is_null())
                    .map(scalar_text)
                    .unwrap_or_default(),
            ),
            serde_json::Value::Array(items) if !BUILTIN_TOKENS.contains(&rule) => {
                Extracted::Many(
                    items
                        .iter()
                        .filter_map(|item| item.get(rule))
                        .map(scalar_text)
                        .collect(),
                )
            }
            _ if BUILTIN_TOKENS.contains(&rule) => Extracted::One(extract_builtin(node, rule)),
            _ => Extracted::One(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DomDocument, JsonNode};
    use serde_json::json;

    fn paragraph() -> ParseNode {
        let doc = DomDocument::parse(r#"<p data-id="7">lead <b>bold</b> tail</p>"#);
        doc.body().children().remove(0)
    }

    #[test]
    fn test_dom_extractor() {
        let node = paragraph();
        let ex = DomContentExtractor;
        assert!(ex.can_extract("text"));
        assert!(ex.can_extract("href"));
        assert!(!ex.can_extract("0"));

        assert_eq!(ex.extract(&node, "text").into_string(), "lead bold tail");
        assert_eq!(ex.extract(&node, "textNodes").into_string(), "lead\ntail");
        assert_eq!(ex.extract(&node, "data-id").into_string(), "7");
        assert_eq!(ex.extract(&node, "missing").into_string(), "");
        assert!(ex.extract(&node, "html").into_string().starts_with("<p"));
    }

    #[test]
    fn test_builtin_fallback() {
        let node = paragraph();
        assert_eq!(extract_builtin(&node, "ownText"), "lead bold tail");
        assert_eq!(extract_builtin(&node, "textNodes"), "bold");
        assert_eq!(extract_builtin(&node, "data-id"), "7");
    }

    #[test]
    fn test_json_key_extractor() {
        let ex = JsonKeyExtractor;
        let book = ParseNode::Json(JsonNode::new(json!({"title": "Dune", "year": 1965, "isbn": null})));
        assert_eq!(ex.extract(&book, "title").into_string(), "Dune");
        assert_eq!(ex.extract(&book, "year").into_string(), "1965");
        assert_eq!(ex.extract(&book, "missing").into_string(), "");
        assert_eq!(ex.extract(&book, "isbn").into_string(), "");
        assert_eq!(
            ex.extract(&book, "text").into_string(),
            r#"{"title":"Dune","year":1965,"isbn":null}"#
        );

        let list = ParseNode::Json(JsonNode::new(json!([{"n": "a"}, {"n": "b"}])));
        assert_eq!(ex.extract(&list, "n").into_string(), "a\nb");
    }

    #[test]
    fn test_json_text_key_wins_over_token() {
        let node = ParseNode::Json(JsonNode::new(json!({"text": "body"})));
        assert_eq!(JsonKeyExtractor.extract(&node, "text").into_string(), "body");
    }
}
