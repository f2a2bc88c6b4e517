use std::fmt;
use std::rc::Rc;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use super::{ParseNode, SourceType, xpath};
use crate::error::{RuleError, RuleResult};

/**
    A parsed HTML document shared by every [`DomNode`] taken from it.
*/
#[derive(Clone)]
pub struct DomDocument {
    html: Rc<Html>,
}

impl DomDocument {
    /**
        Parse a full document. Fragments and plain text are accepted too:
        the parser always produces `html`, `head` and `body` elements.
    */
    pub fn parse(source: &str) -> Self {
        Self {
            html: Rc::new(Html::parse_document(source)),
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// The `<html>` element.
    pub fn root(&self) -> DomNode {
        DomNode::new(Rc::clone(&self.html), self.html.root_element().id())
    }

    /**
        The `<body>` element, or the root element when the document has none.
    */
    pub fn body(&self) -> DomNode {
        let root = self.html.root_element();
        let body = root
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body")
            .unwrap_or(root);
        DomNode::new(Rc::clone(&self.html), body.id())
    }
}

impl fmt::Debug for DomDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomDocument").finish_non_exhaustive()
    }
}

/**
    Handle to one element inside a shared [`DomDocument`].

    The handle is an arena index, so nodes never point back at the engine
    that produced them and sub-engines are built by seeding them with handles.
*/
#[derive(Clone)]
pub struct DomNode {
    doc: Rc<Html>,
    id: NodeId,
}

impl DomNode {
    pub(crate) fn new(doc: Rc<Html>, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn document(&self) -> &Rc<Html> {
        &self.doc
    }

    fn sibling(&self, id: NodeId) -> DomNode {
        DomNode::new(Rc::clone(&self.doc), id)
    }

    fn element(&self) -> Option<ElementRef<'_>> {
        self.doc.tree.get(self.id).and_then(ElementRef::wrap)
    }

    /// Lower-case tag name, empty if the handle is stale.
    pub fn tag_name(&self) -> String {
        self.element()
            .map(|el| el.value().name().to_string())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.element()
            .is_some_and(|el| el.value().classes().any(|c| c == class))
    }

    pub fn query_selector_all(&self, selector: &str) -> RuleResult<Vec<ParseNode>> {
        let parsed = Selector::parse(selector).map_err(|e| RuleError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("{e:?}"),
        })?;
        let Some(el) = self.element() else {
            return Ok(Vec::new());
        };
        Ok(el
            .select(&parsed)
            .filter(|found| found.id() != self.id)
            .map(|found| ParseNode::Dom(self.sibling(found.id())))
            .collect())
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.element()
            .and_then(|el| el.value().attr(name).map(str::to_string))
    }

    pub fn text_content(&self) -> String {
        self.element()
            .map(|el| el.text().collect())
            .unwrap_or_default()
    }

    /**
        Text nodes that are direct children of this element, trimmed,
        with blank ones skipped.
    */
    pub fn own_text_nodes(&self) -> Vec<String> {
        let Some(el) = self.element() else {
            return Vec::new();
        };
        el.children()
            .filter_map(|child| {
                let text: &str = child.value().as_text()?;
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            })
            .collect()
    }

    pub fn outer_html(&self) -> String {
        self.element().map(|el| el.html()).unwrap_or_default()
    }

    pub fn inner_html(&self) -> String {
        self.element().map(|el| el.inner_html()).unwrap_or_default()
    }

    /// Element children in document order. Text and comment nodes are skipped.
    pub fn children(&self) -> Vec<ParseNode> {
        let Some(el) = self.element() else {
            return Vec::new();
        };
        el.children()
            .filter_map(ElementRef::wrap)
            .map(|child| ParseNode::Dom(self.sibling(child.id())))
            .collect()
    }

    /**
        Elements in this subtree, in document order. The node itself is
        included only when `include_self` is set.
    */
    pub fn descendants(&self, include_self: bool) -> Vec<DomNode> {
        let Some(el) = self.element() else {
            return Vec::new();
        };
        el.descendants()
            .filter_map(ElementRef::wrap)
            .filter(|found| include_self || found.id() != self.id)
            .map(|found| self.sibling(found.id()))
            .collect()
    }

    pub fn evaluate_xpath(&self, expr: &str) -> RuleResult<Vec<ParseNode>> {
        let items = xpath::evaluate(self, expr)?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.node)
            .map(|id| ParseNode::Dom(self.sibling(id)))
            .collect())
    }

    pub fn evaluate_xpath_strings(&self, expr: &str) -> RuleResult<Vec<String>> {
        let items = xpath::evaluate(self, expr)?;
        Ok(items.into_iter().map(|item| item.text).collect())
    }

    pub fn evaluate_json_path(&self, _path: &str) -> RuleResult<Vec<ParseNode>> {
        Err(RuleError::Unsupported {
            operation: "JSONPath",
            backend: SourceType::Dom,
        })
    }
}

impl PartialEq for DomNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.id == other.id
    }
}

impl Eq for DomNode {}

impl fmt::Debug for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomNode(<{}> {:?})", self.tag_name(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <ul id="list">
                <li class="item first"><a href="/a">Alpha</a></li>
                <li class="item"><a href="/b">Beta</a> tail</li>
            </ul>
        </body></html>
    "#;

    #[test]
    fn test_body_is_root() {
        let doc = DomDocument::parse(PAGE);
        assert_eq!(doc.body().tag_name(), "body");
        assert_eq!(doc.root().tag_name(), "html");
    }

    #[test]
    fn test_plain_text_lands_in_body() {
        let doc = DomDocument::parse("just words");
        assert_eq!(doc.body().text_content(), "just words");
    }

    #[test]
    fn test_query_selector_all_excludes_self() {
        let doc = DomDocument::parse(PAGE);
        let items = doc.body().query_selector_all("li").unwrap();
        assert_eq!(items.len(), 2);

        let first = items[0].as_dom().unwrap();
        assert!(first.query_selector_all("li").unwrap().is_empty());
        assert_eq!(first.query_selector_all("a").unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_selector() {
        let doc = DomDocument::parse(PAGE);
        let err = doc.body().query_selector_all("li[").unwrap_err();
        assert!(matches!(err, RuleError::InvalidSelector { .. }));
    }

    #[test]
    fn test_attribute_and_text() {
        let doc = DomDocument::parse(PAGE);
        let links = doc.body().query_selector_all("a").unwrap();
        assert_eq!(links[1].attribute("href").as_deref(), Some("/b"));
        assert_eq!(links[1].attribute("title"), None);
        assert_eq!(links[1].text_content(), "Beta");
        assert_eq!(links[0].outer_html(), r#"<a href="/a">Alpha</a>"#);
    }

    #[test]
    fn test_own_text_nodes() {
        let doc = DomDocument::parse(PAGE);
        let items = doc.body().query_selector_all("li").unwrap();
        assert_eq!(items[1].as_dom().unwrap().own_text_nodes(), vec!["tail"]);
        assert!(items[0].as_dom().unwrap().own_text_nodes().is_empty());
    }

    #[test]
    fn test_children_skip_text() {
        let doc = DomDocument::parse(PAGE);
        let list = doc.body().query_selector_all("#list").unwrap();
        assert_eq!(list[0].children().len(), 2);
    }

    #[test]
    fn test_classes() {
        let doc = DomDocument::parse(PAGE);
        let items = doc.body().query_selector_all("li").unwrap();
        let first = items[0].as_dom().unwrap();
        assert!(first.has_class("first"));
        assert!(first.has_class("item"));
        assert!(!items[1].as_dom().unwrap().has_class("first"));
    }

    #[test]
    fn test_json_path_unsupported() {
        let doc = DomDocument::parse(PAGE);
        assert!(matches!(
            doc.body().evaluate_json_path("$.a"),
            Err(RuleError::Unsupported { .. })
        ));
    }
}
