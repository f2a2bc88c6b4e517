use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::capture;
use crate::context::ParseContext;
use crate::node::{DomDocument, JsonNode, ParseNode, SourceType};
use crate::registry::Registry;
use crate::rule::Evaluator;
use crate::script::{ExpressionSandbox, ScriptSandbox};

/**
    Evaluates rules against a fixed set of root nodes.

    No method returns an error or panics for any rule text. Failures are
    logged and produce an empty string or an empty list.
*/
pub trait ParserEngine: fmt::Debug {
    fn source_type(&self) -> SourceType;

    fn context(&self) -> &Rc<ParseContext>;

    /// The text the engine was built from, or its roots serialized.
    fn raw_content(&self) -> String;

    fn parse_to_string(&self, rule: &str) -> String;

    /// One engine per selected node, sharing this engine's context.
    fn parse_to_engines(&self, rule: &str) -> Vec<Box<dyn ParserEngine>>;

    /// One value per selected node.
    fn parse_to_strings(&self, rule: &str) -> Vec<String>;

    /// Line-oriented captures over [`raw_content`](Self::raw_content).
    fn parse_regex_to_strings(&self, regex: &str, selects: &[Option<&str>]) -> Vec<Vec<String>>;

    /// `parse_to_string`, resolved against the context's base URL.
    fn parse_to_url(&self, rule: &str) -> String {
        let value = self.parse_to_string(rule);
        resolve_url(&self.context().base_url(), &value)
    }
}

/// Resolve `target` against `base`. Unresolvable input is returned as is.
pub fn resolve_url(base: &str, target: &str) -> String {
    let target = target.trim();
    if target.is_empty() || base.is_empty() {
        return target.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(target)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            debug!(base = %base, target = %target, error = %e, "url not resolvable");
            target.to_string()
        }
    }
}

/// The engine behind every built-in backend.
#[derive(Clone)]
pub struct RuleEngine {
    source_type: SourceType,
    roots: Vec<ParseNode>,
    raw: Option<Rc<str>>,
    registry: Rc<Registry>,
    context: Rc<ParseContext>,
    sandbox: Rc<dyn ScriptSandbox>,
}

impl RuleEngine {
    pub fn new(
        source_type: SourceType,
        roots: Vec<ParseNode>,
        registry: Rc<Registry>,
        context: Rc<ParseContext>,
    ) -> Self {
        Self {
            source_type,
            roots,
            raw: None,
            registry,
            context,
            sandbox: Rc::new(ExpressionSandbox),
        }
    }

    /// HTML engine with the default DOM registry and a fresh context.
    pub fn dom(source: &str) -> Self {
        let body = DomDocument::parse(source).body();
        Self::new(
            SourceType::Dom,
            vec![body.into()],
            Rc::new(Registry::dom()),
            Rc::new(ParseContext::new()),
        )
        .with_raw(source)
    }

    /// JSON engine with the default JSON registry and a fresh context.
    pub fn json(value: Value) -> Self {
        Self::new(
            SourceType::Json,
            vec![JsonNode::new(value).into()],
            Rc::new(Registry::json()),
            Rc::new(ParseContext::new()),
        )
    }

    pub fn with_raw(mut self, raw: impl Into<Rc<str>>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn with_context(mut self, context: Rc<ParseContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Rc<dyn ScriptSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn roots(&self) -> &[ParseNode] {
        &self.roots
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            registry: &self.registry,
            context: &self.context,
            sandbox: self.sandbox.as_ref(),
        }
    }

    fn sub_engine(&self, node: ParseNode) -> RuleEngine {
        RuleEngine {
            source_type: node.source_type(),
            roots: vec![node],
            raw: None,
            registry: Rc::clone(&self.registry),
            context: Rc::clone(&self.context),
            sandbox: Rc::clone(&self.sandbox),
        }
    }

    /// Last-resort boundary: a panic anywhere below becomes an empty result.
    fn guarded<T: Default>(&self, operation: &'static str, rule: &str, f: impl FnOnce() -> T) -> T {
        if rule.trim().is_empty() {
            return T::default();
        }
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(_) => {
                warn!(operation, rule = %rule, backend = %self.source_type, "rule evaluation panicked");
                T::default()
            }
        }
    }
}

impl ParserEngine for RuleEngine {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn context(&self) -> &Rc<ParseContext> {
        &self.context
    }

    fn raw_content(&self) -> String {
        match &self.raw {
            Some(raw) => raw.to_string(),
            None => self
                .roots
                .iter()
                .map(ParseNode::raw_content)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn parse_to_string(&self, rule: &str) -> String {
        self.guarded("parse_to_string", rule, || {
            self.evaluator().eval_string(rule, &self.roots)
        })
    }

    fn parse_to_engines(&self, rule: &str) -> Vec<Box<dyn ParserEngine>> {
        self.guarded("parse_to_engines", rule, || {
            self.evaluator()
                .eval_nodes(rule, &self.roots)
                .into_iter()
                .map(|node| Box::new(self.sub_engine(node)) as Box<dyn ParserEngine>)
                .collect()
        })
    }

    fn parse_to_strings(&self, rule: &str) -> Vec<String> {
        self.guarded("parse_to_strings", rule, || {
            self.evaluator().eval_strings(rule, &self.roots)
        })
    }

    fn parse_regex_to_strings(&self, regex: &str, selects: &[Option<&str>]) -> Vec<Vec<String>> {
        self.guarded("parse_regex_to_strings", regex, || {
            capture::parse_regex_to_strings(regex, selects, &self.raw_content()).unwrap_or_else(
                |e| {
                    debug!(regex = %regex, error = %e, "capture failed");
                    Vec::new()
                },
            )
        })
    }
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("source_type", &self.source_type)
            .field("roots", &self.roots)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::DisabledSandbox;
    use crate::strategy::FnStrategy;
    use serde_json::json;

    const SHELF: &str = r#"
        <div class="book"><a href="/b/1">One</a><span class="price">3</span></div>
        <div class="book"><a href="/b/2">Two</a><span class="price">5</span></div>
    "#;

    #[test]
    fn test_parse_to_engines_recurses() {
        let engine = RuleEngine::dom(SHELF);
        let books = engine.parse_to_engines("class.book");
        assert_eq!(books.len(), 2);
        assert_eq!(books[1].parse_to_string("tag.a@text"), "Two");
        assert_eq!(books[0].parse_to_string("class.price@text"), "3");
        assert_eq!(books[0].source_type(), SourceType::Dom);
        assert!(Rc::ptr_eq(books[0].context(), engine.context()));
    }

    #[test]
    fn test_empty_rule() {
        let engine = RuleEngine::dom(SHELF);
        assert_eq!(engine.parse_to_string(""), "");
        assert!(engine.parse_to_engines("  ").is_empty());
        assert!(engine.parse_to_strings("").is_empty());
    }

    #[test]
    fn test_parse_to_strings() {
        let engine = RuleEngine::dom(SHELF);
        assert_eq!(engine.parse_to_strings("class.book@tag.a@href"), vec!["/b/1", "/b/2"]);
        assert_eq!(
            engine.parse_to_strings("class.price@text##(\\d)##$1.00"),
            vec!["3.00", "5.00"]
        );
    }

    #[test]
    fn test_parse_to_url() {
        let engine = RuleEngine::dom(SHELF);
        engine.context().set_base_url("https://books.example/shop/");
        assert_eq!(
            engine.parse_to_url("class.book@tag.a.1@href"),
            "https://books.example/b/2"
        );
        assert_eq!(resolve_url("", "/x"), "/x");
        assert_eq!(resolve_url("not a url", "/x"), "/x");
    }

    #[test]
    fn test_panicking_strategy_is_contained() {
        let mut registry = Registry::dom();
        registry.prepend_strategy(FnStrategy::new(
            "boom.",
            |rule| rule.starts_with("boom."),
            |_, _, _| panic!("strategy exploded"),
        ));
        let engine = RuleEngine::new(
            SourceType::Dom,
            vec![DomDocument::parse(SHELF).body().into()],
            Rc::new(registry),
            Rc::new(ParseContext::new()),
        );
        assert_eq!(engine.parse_to_string("boom.x@text"), "");
        assert!(engine.parse_to_engines("boom.x").is_empty());
        assert_eq!(engine.parse_to_string("class.book@tag.a.0@text"), "One");
    }

    #[test]
    fn test_disabled_sandbox() {
        let engine = RuleEngine::dom(SHELF).with_sandbox(Rc::new(DisabledSandbox));
        assert_eq!(engine.parse_to_string("class.book@[0]@tag.a@text@js:value + 1"), "One");
    }

    #[test]
    fn test_regex_captures_over_raw_content() {
        let engine = RuleEngine::dom(SHELF);
        let rows = engine.parse_regex_to_strings(r#"href="([^"]+)">(\w+)"#, &[Some("$2"), Some("$1")]);
        assert_eq!(rows, vec![vec!["One", "/b/1"], vec!["Two", "/b/2"]]);
        assert!(engine.parse_regex_to_strings("(", &[Some("FULL")]).is_empty());
    }

    #[test]
    fn test_json_engine() {
        let engine = RuleEngine::json(json!({"items": [{"id": 1}, {"id": 2}]}));
        let items = engine.parse_to_engines("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].parse_to_string("id"), "2");
        assert_eq!(items[1].source_type(), SourceType::Json);
        assert_eq!(engine.raw_content(), r#"{"items":[{"id":1},{"id":2}]}"#);
    }
}
