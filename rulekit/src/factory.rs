use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::context::ParseContext;
use crate::engine::{ParserEngine, RuleEngine};
use crate::error::{RuleError, RuleResult};
use crate::node::{DomDocument, JsonNode, SourceType};
use crate::registry::Registry;
use crate::script::{ExpressionSandbox, ScriptSandbox};

/// Raw input handed to the factory.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Text(String),
    Json(Value),
}

impl DocumentSource {
    fn kind(&self) -> &'static str {
        match self {
            DocumentSource::Text(_) => "text",
            DocumentSource::Json(_) => "a JSON value",
        }
    }
}

impl From<&str> for DocumentSource {
    fn from(text: &str) -> Self {
        DocumentSource::Text(text.to_string())
    }
}

impl From<String> for DocumentSource {
    fn from(text: String) -> Self {
        DocumentSource::Text(text)
    }
}

impl From<Value> for DocumentSource {
    fn from(value: Value) -> Self {
        DocumentSource::Json(value)
    }
}

/// What every engine built by one factory shares.
#[derive(Clone)]
pub struct EngineSeed {
    pub context: Rc<ParseContext>,
    pub sandbox: Rc<dyn ScriptSandbox>,
}

/**
    One backend: a detector plus an engine constructor.
*/
pub trait BackendFactory: fmt::Debug {
    fn source_type(&self) -> SourceType;

    /// Whether automatic detection should pick this backend.
    fn accepts(&self, source: &DocumentSource) -> bool;

    fn create(&self, source: &DocumentSource, seed: EngineSeed) -> RuleResult<Box<dyn ParserEngine>>;
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<[a-z][\s\S]*>").expect("tag regex should compile"))
}

fn parse_container(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

fn dom_engine(source_type: SourceType, text: &str, registry: &Rc<Registry>, seed: EngineSeed) -> RuleEngine {
    let body = DomDocument::parse(text).body();
    RuleEngine::new(source_type, vec![body.into()], Rc::clone(registry), seed.context)
        .with_sandbox(seed.sandbox)
        .with_raw(text)
}

// ── Built-in backends ──────────────────────────────────────────────────

/// Objects and arrays, given as values or as JSON text.
#[derive(Debug, Clone)]
pub struct JsonBackend {
    registry: Rc<Registry>,
}

impl JsonBackend {
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry: Rc::new(registry),
        }
    }
}

impl Default for JsonBackend {
    fn default() -> Self {
        Self::with_registry(Registry::json())
    }
}

impl BackendFactory for JsonBackend {
    fn source_type(&self) -> SourceType {
        SourceType::Json
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        match source {
            DocumentSource::Json(value) => value.is_object() || value.is_array(),
            DocumentSource::Text(text) => parse_container(text).is_some(),
        }
    }

    fn create(&self, source: &DocumentSource, seed: EngineSeed) -> RuleResult<Box<dyn ParserEngine>> {
        let (value, raw) = match source {
            DocumentSource::Json(value) => (value.clone(), None),
            DocumentSource::Text(text) => (serde_json::from_str(text.trim())?, Some(text.as_str())),
        };
        let mut engine = RuleEngine::new(
            SourceType::Json,
            vec![JsonNode::new(value).into()],
            Rc::clone(&self.registry),
            seed.context,
        )
        .with_sandbox(seed.sandbox);
        if let Some(raw) = raw {
            engine = engine.with_raw(raw);
        }
        Ok(Box::new(engine))
    }
}

/// Markup: text that starts with `<`, contains a tag or a doctype.
#[derive(Debug, Clone)]
pub struct DomBackend {
    registry: Rc<Registry>,
}

impl DomBackend {
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry: Rc::new(registry),
        }
    }
}

impl Default for DomBackend {
    fn default() -> Self {
        Self::with_registry(Registry::dom())
    }
}

impl BackendFactory for DomBackend {
    fn source_type(&self) -> SourceType {
        SourceType::Dom
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        let DocumentSource::Text(text) = source else {
            return false;
        };
        text.trim_start().starts_with('<')
            || tag_regex().is_match(text)
            || text.to_ascii_uppercase().contains("<!DOCTYPE")
    }

    fn create(&self, source: &DocumentSource, seed: EngineSeed) -> RuleResult<Box<dyn ParserEngine>> {
        match source {
            DocumentSource::Text(text) => {
                Ok(Box::new(dom_engine(SourceType::Dom, text, &self.registry, seed)))
            }
            other => Err(RuleError::SourceMismatch {
                backend: SourceType::Dom,
                given: other.kind(),
            }),
        }
    }
}

/// Any other non-empty text, parsed as HTML so selectors keep working.
#[derive(Debug, Clone)]
pub struct TextBackend {
    registry: Rc<Registry>,
}

impl Default for TextBackend {
    fn default() -> Self {
        Self {
            registry: Rc::new(Registry::dom()),
        }
    }
}

impl BackendFactory for TextBackend {
    fn source_type(&self) -> SourceType {
        SourceType::Text
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        matches!(source, DocumentSource::Text(text) if !text.trim().is_empty())
    }

    fn create(&self, source: &DocumentSource, seed: EngineSeed) -> RuleResult<Box<dyn ParserEngine>> {
        match source {
            DocumentSource::Text(text) => {
                Ok(Box::new(dom_engine(SourceType::Text, text, &self.registry, seed)))
            }
            other => Err(RuleError::SourceMismatch {
                backend: SourceType::Text,
                given: other.kind(),
            }),
        }
    }
}

// ── Factory ────────────────────────────────────────────────────────────

/**
    Chooses a backend for a raw source and builds its engine.

    Detection asks backends in registration order and the first that accepts
    wins; the defaults are JSON, then DOM, then text. Every engine gets its own
    context chained to the factory's, so variables seeded on the factory are
    visible everywhere while writes stay per document.
*/
#[derive(Clone)]
pub struct EngineFactory {
    backends: Vec<Rc<dyn BackendFactory>>,
    context: Rc<ParseContext>,
    sandbox: Rc<dyn ScriptSandbox>,
}

impl EngineFactory {
    pub fn new() -> Self {
        Self::empty()
            .with_backend(JsonBackend::default())
            .with_backend(DomBackend::default())
            .with_backend(TextBackend::default())
    }

    /// A factory without any backend.
    pub fn empty() -> Self {
        Self {
            backends: Vec::new(),
            context: Rc::new(ParseContext::new()),
            sandbox: Rc::new(ExpressionSandbox),
        }
    }

    pub fn with_backend(mut self, backend: impl BackendFactory + 'static) -> Self {
        self.register(backend);
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

    pub fn context(&self) -> &Rc<ParseContext> {
        &self.context
    }

    /// Add a backend, replacing one of the same type in place.
    pub fn register(&mut self, backend: impl BackendFactory + 'static) {
        let backend: Rc<dyn BackendFactory> = Rc::new(backend);
        match self
            .backends
            .iter_mut()
            .find(|b| b.source_type() == backend.source_type())
        {
            Some(slot) => *slot = backend,
            None => self.backends.push(backend),
        }
    }

    pub fn unregister(&mut self, source_type: SourceType) -> bool {
        let before = self.backends.len();
        self.backends.retain(|b| b.source_type() != source_type);
        self.backends.len() != before
    }

    pub fn backend(&self, source_type: SourceType) -> Option<&Rc<dyn BackendFactory>> {
        self.backends.iter().find(|b| b.source_type() == source_type)
    }

    pub fn registered_types(&self) -> Vec<SourceType> {
        self.backends.iter().map(|b| b.source_type()).collect()
    }

    pub fn detect(&self, source: &DocumentSource) -> Option<SourceType> {
        self.backends
            .iter()
            .find(|b| b.accepts(source))
            .map(|b| b.source_type())
    }

    fn seed(&self) -> EngineSeed {
        EngineSeed {
            context: Rc::new(ParseContext::chained(Rc::clone(&self.context))),
            sandbox: Rc::clone(&self.sandbox),
        }
    }

    pub fn create(&self, source: impl Into<DocumentSource>) -> RuleResult<Box<dyn ParserEngine>> {
        let source = source.into();
        let backend = self
            .backends
            .iter()
            .find(|b| b.accepts(&source))
            .ok_or(RuleError::NoBackend)?;
        debug!(backend = %backend.source_type(), "detected source type");
        backend.create(&source, self.seed())
    }

    /// Build with a specific backend, skipping detection.
    pub fn create_with_type(
        &self,
        source: impl Into<DocumentSource>,
        source_type: SourceType,
    ) -> RuleResult<Box<dyn ParserEngine>> {
        let backend = self
            .backend(source_type)
            .ok_or(RuleError::BackendNotRegistered(source_type))?;
        backend.create(&source.into(), self.seed())
    }
}

impl Default for EngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineFactory")
            .field("backends", &self.registered_types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detection_order() {
        let factory = EngineFactory::new();
        let detect = |s: &str| factory.detect(&s.into());
        assert_eq!(detect(r#"{"a":1}"#), Some(SourceType::Json));
        assert_eq!(detect(" [1, 2] "), Some(SourceType::Json));
        assert_eq!(detect("<p>hi</p>"), Some(SourceType::Dom));
        assert_eq!(detect("text then <b>bold</b>"), Some(SourceType::Dom));
        assert_eq!(detect("<!doctype html>"), Some(SourceType::Dom));
        assert_eq!(detect("just words"), Some(SourceType::Text));
        assert_eq!(detect("42"), Some(SourceType::Text));
        assert_eq!(detect("   "), None);
        assert_eq!(factory.detect(&json!("scalar").into()), None);
        assert_eq!(factory.detect(&json!({"k": "v"}).into()), Some(SourceType::Json));
    }

    #[test]
    fn test_json_text_wins_over_dom() {
        let engine = EngineFactory::new().create(r#"{"a":1}"#).unwrap();
        assert_eq!(engine.source_type(), SourceType::Json);
        assert_eq!(engine.parse_to_string("a"), "1");
    }

    #[test]
    fn test_text_is_still_selectable() {
        let engine = EngineFactory::new().create("plain words").unwrap();
        assert_eq!(engine.source_type(), SourceType::Text);
        assert_eq!(engine.parse_to_string("text"), "plain words");
    }

    #[test]
    fn test_create_errors() {
        let factory = EngineFactory::new();
        assert!(matches!(factory.create(""), Err(RuleError::NoBackend)));
        assert!(matches!(
            factory.create_with_type(json!([1]), SourceType::Dom),
            Err(RuleError::SourceMismatch { backend: SourceType::Dom, .. })
        ));
        assert!(matches!(
            factory.create_with_type("{oops", SourceType::Json),
            Err(RuleError::Json(_))
        ));
    }

    #[test]
    fn test_forced_type() {
        let factory = EngineFactory::new();
        let engine = factory
            .create_with_type(r#"{"a":"<b>x</b>"}"#, SourceType::Dom)
            .unwrap();
        assert_eq!(engine.source_type(), SourceType::Dom);
        assert_eq!(engine.parse_to_string("tag.b@text"), "x");
    }

    #[test]
    fn test_register_and_unregister() {
        let mut factory = EngineFactory::new();
        assert!(factory.unregister(SourceType::Json));
        assert!(!factory.unregister(SourceType::Json));
        assert_eq!(factory.detect(&r#"{"a":1}"#.into()), Some(SourceType::Text));
        assert!(matches!(
            factory.create_with_type("{}", SourceType::Json),
            Err(RuleError::BackendNotRegistered(SourceType::Json))
        ));

        factory.register(JsonBackend::default());
        assert_eq!(
            factory.registered_types(),
            vec![SourceType::Dom, SourceType::Text, SourceType::Json]
        );
        factory.register(DomBackend::default());
        assert_eq!(factory.registered_types().len(), 3);
    }

    #[test]
    fn test_engines_share_factory_variables() {
        let factory = EngineFactory::new();
        factory.context().put("suffix", "!");
        factory.context().set_base_url("https://example.org/");

        let engine = factory.create("<a href='/x'>go</a>").unwrap();
        assert_eq!(engine.parse_to_string("tag.a@text@js:value + suffix"), "go!");
        assert_eq!(engine.parse_to_url("tag.a@href"), "https://example.org/x");

        engine.context().put("local", 1);
        assert!(!factory.context().contains("local"));
    }
}
