use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::OnceLock;

use jsonpath_rust::JsonPath;
use regex::Regex;
use serde_json::Value;

use super::{ParseNode, SourceType};
use crate::error::{RuleError, RuleResult};

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex should compile")
    })
}

/// True if `rule` is a bare object key such as `name` or `_id`.
pub(crate) fn is_identifier(rule: &str) -> bool {
    identifier_regex().is_match(rule)
}

/**
    A JSON value plus the path it was reached by.

    The path is diagnostic only (`$`, `$.books[2].title`). Values are shared,
    so narrowing never copies the parent document.
*/
#[derive(Clone)]
pub struct JsonNode {
    value: Rc<Value>,
    path: String,
}

impl JsonNode {
    pub fn new(value: Value) -> Self {
        Self::with_path(value, "$")
    }

    pub fn with_path(value: Value, path: impl Into<String>) -> Self {
        Self {
            value: Rc::new(value),
            path: path.into(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_array(&self) -> bool {
        self.value.is_array()
    }

    pub fn len(&self) -> usize {
        match &*self.value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compact serialization.
    pub fn raw_content(&self) -> String {
        self.value.to_string()
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&*self.value).unwrap_or_else(|_| self.raw_content())
    }

    /**
        Scalars render as their plain text (`null` included), containers as
        compact JSON.
    */
    pub fn text_content(&self) -> String {
        scalar_text(&self.value)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.value.as_object()?.get(name).map(scalar_text)
    }

    /// Array elements or object members, in document order.
    pub fn children(&self) -> Vec<ParseNode> {
        match &*self.value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.child(item.clone(), format!("[{i}]")))
                .collect(),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| self.child(item.clone(), format!(".{key}")))
                .collect(),
            _ => Vec::new(),
        }
    }

    /**
        Query forms understood by JSON nodes: `$...` JSONPath, `@json:` JSONPath,
        and bare identifier keys. Anything else matches nothing.
    */
    pub fn query_selector_all(&self, selector: &str) -> RuleResult<Vec<ParseNode>> {
        if !self.value.is_object() && !self.value.is_array() {
            return Ok(Vec::new());
        }
        if selector.starts_with('$') {
            return self.evaluate_json_path(selector);
        }
        if let Some(path) = selector.strip_prefix("@json:") {
            return self.evaluate_json_path(path);
        }
        if is_identifier(selector) {
            return Ok(self.key(selector));
        }
        Ok(Vec::new())
    }

    /**
        Member `key` of an object. On an array the key is broadcast over the
        object elements. A member that is itself an array yields one node per
        element.
    */
    pub fn key(&self, key: &str) -> Vec<ParseNode> {
        let mut out = Vec::new();
        match &*self.value {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    push_expanded(&mut out, found, format!("{}.{key}", self.path));
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(found) = item.as_object().and_then(|map| map.get(key)) {
                        push_expanded(&mut out, found, format!("{}[{i}].{key}", self.path));
                    }
                }
            }
            _ => {}
        }
        out
    }

    /**
        Evaluate a JSONPath expression with this node's value as `$`.

        Missing paths yield nothing. When the expression produces exactly one
        array, its elements become the result.
    */
    pub fn evaluate_json_path(&self, path: &str) -> RuleResult<Vec<ParseNode>> {
        let path = path.trim();
        let jsonpath = JsonPath::from_str(path).map_err(|e| RuleError::InvalidJsonPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let found: Vec<Value> = jsonpath
            .find_slice(&*self.value)
            .into_iter()
            .map(|v| v.to_data())
            .filter(|v| !v.is_null())
            .collect();

        let label = format!("{}{}", self.path, path.trim_start_matches('$'));
        let mut out = Vec::new();
        match found.as_slice() {
            [single] => push_expanded(&mut out, single, label),
            many => {
                for (i, value) in many.iter().enumerate() {
                    out.push(self.child_at(value.clone(), format!("{label}[{i}]")));
                }
            }
        }
        Ok(out)
    }

    pub fn evaluate_xpath(&self, _xpath: &str) -> RuleResult<Vec<ParseNode>> {
        Err(RuleError::Unsupported {
            operation: "XPath",
            backend: SourceType::Json,
        })
    }

    fn child(&self, value: Value, suffix: String) -> ParseNode {
        self.child_at(value, format!("{}{suffix}", self.path))
    }

    fn child_at(&self, value: Value, path: String) -> ParseNode {
        ParseNode::Json(JsonNode::with_path(value, path))
    }
}

fn push_expanded(out: &mut Vec<ParseNode>, value: &Value, path: String) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                out.push(ParseNode::Json(JsonNode::with_path(
                    item.clone(),
                    format!("{path}[{i}]"),
                )));
            }
        }
        other => out.push(ParseNode::Json(JsonNode::with_path(other.clone(), path))),
    }
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl fmt::Debug for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonNode({})", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> JsonNode {
        JsonNode::new(json!({
            "name": "shelf",
            "count": 3,
            "books": [
                {"title": "A", "tags": ["x", "y"]},
                {"title": "B", "tags": []},
                {"title": "C"}
            ]
        }))
    }

    #[test]
    fn test_text_content() {
        assert_eq!(JsonNode::new(json!("hi")).text_content(), "hi");
        assert_eq!(JsonNode::new(json!(12)).text_content(), "12");
        assert_eq!(JsonNode::new(json!(true)).text_content(), "true");
        assert_eq!(JsonNode::new(json!(null)).text_content(), "null");
        assert_eq!(JsonNode::new(json!({"a": 1})).text_content(), r#"{"a":1}"#);
    }

    #[test]
    fn test_attribute() {
        let node = library();
        assert_eq!(node.attribute("name").as_deref(), Some("shelf"));
        assert_eq!(node.attribute("count").as_deref(), Some("3"));
        assert_eq!(node.attribute("missing"), None);
    }

    #[test]
    fn test_key_expands_arrays() {
        let books = library().key("books");
        assert_eq!(books.len(), 3);
        assert_eq!(books[2].as_json().unwrap().path(), "$.books[2]");
    }

    #[test]
    fn test_key_broadcasts_over_arrays() {
        let node = JsonNode::new(json!([{"t": 1}, 5, {"t": 2}]));
        let found = node.key("t");
        let texts: Vec<String> = found.iter().map(ParseNode::text_content).collect();
        assert_eq!(texts, vec!["1", "2"]);
        assert_eq!(found[1].as_json().unwrap().path(), "$[2].t");
    }

    #[test]
    fn test_json_path() {
        let node = library();
        let titles = node.evaluate_json_path("$.books[*].title").unwrap();
        let texts: Vec<String> = titles.iter().map(ParseNode::text_content).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);

        let name = node.query_selector_all("$.name").unwrap();
        assert_eq!(name.len(), 1);
        assert_eq!(name[0].text_content(), "shelf");

        assert!(node.evaluate_json_path("$.nothing").unwrap().is_empty());
    }

    #[test]
    fn test_json_path_single_array_expands() {
        let books = library().query_selector_all("@json:$.books").unwrap();
        assert_eq!(books.len(), 3);
        assert_eq!(books[0].attribute("title").as_deref(), Some("A"));
    }

    #[test]
    fn test_selector_on_scalar_is_empty() {
        let node = JsonNode::new(json!("plain"));
        assert!(node.query_selector_all("$.a").unwrap().is_empty());
        assert!(node.query_selector_all("a").unwrap().is_empty());
    }

    #[test]
    fn test_children_keep_member_order() {
        let node = JsonNode::new(json!({"z": 1, "a": 2}));
        let paths: Vec<String> = node
            .children()
            .iter()
            .map(|c| c.as_json().unwrap().path().to_string())
            .collect();
        assert_eq!(paths, vec!["$.z", "$.a"]);
    }

    #[test]
    fn test_xpath_unsupported() {
        assert!(matches!(
            library().evaluate_xpath("//a"),
            Err(RuleError::Unsupported { .. })
        ));
    }
}
