use std::fmt;
use std::rc::Rc;

use crate::extractor::{ContentExtractor, DomContentExtractor, JsonKeyExtractor};
use crate::strategy::{
    ArrayIndexStrategy, ChildrenStrategy, ClassStrategy, IdStrategy, JsonPathStrategy,
    ObjectKeyStrategy, ParseStrategy, TagStrategy, TextStrategy,
};

/**
    Ordered strategies and extractors consulted by the evaluator.

    Lookups return the first entry whose capability test accepts the rule, so
    registration order settles overlaps. Registries are cloned cheaply and
    shared by every engine of one backend.
*/
#[derive(Clone, Default)]
pub struct Registry {
    strategies: Vec<Rc<dyn ParseStrategy>>,
    extractors: Vec<Rc<dyn ContentExtractor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `tag.`, `class.`, `id.`, `text.`, `children` and the DOM extractor.
    pub fn dom() -> Self {
        Self::new()
            .with_strategy(TagStrategy)
            .with_strategy(ClassStrategy)
            .with_strategy(IdStrategy)
            .with_strategy(TextStrategy)
            .with_strategy(ChildrenStrategy)
            .with_extractor(DomContentExtractor)
    }

    /// JSONPath, array index and object key, with the JSON key extractor.
    pub fn json() -> Self {
        Self::new()
            .with_strategy(JsonPathStrategy)
            .with_strategy(ArrayIndexStrategy)
            .with_strategy(ObjectKeyStrategy)
            .with_extractor(JsonKeyExtractor)
    }

    pub fn with_strategy(mut self, strategy: impl ParseStrategy + 'static) -> Self {
        self.register_strategy(strategy);
        self
    }

    pub fn with_extractor(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.register_extractor(extractor);
        self
    }

    pub fn register_strategy(&mut self, strategy: impl ParseStrategy + 'static) {
        self.strategies.push(Rc::new(strategy));
    }

    /// Insert ahead of everything registered so far.
    pub fn prepend_strategy(&mut self, strategy: impl ParseStrategy + 'static) {
        self.strategies.insert(0, Rc::new(strategy));
    }

    pub fn register_extractor(&mut self, extractor: impl ContentExtractor + 'static) {
        self.extractors.push(Rc::new(extractor));
    }

    pub fn strategies(&self) -> &[Rc<dyn ParseStrategy>] {
        &self.strategies
    }

    pub fn extractors(&self) -> &[Rc<dyn ContentExtractor>] {
        &self.extractors
    }

    pub fn strategy_for(&self, rule: &str) -> Option<&Rc<dyn ParseStrategy>> {
        self.strategies.iter().find(|s| s.can_handle(rule))
    }

    pub fn extractor_for(&self, rule: &str) -> Option<&Rc<dyn ContentExtractor>> {
        self.extractors.iter().find(|e| e.can_extract(rule))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signs: Vec<&str> = self.strategies.iter().map(|s| s.sign()).collect();
        f.debug_struct("Registry")
            .field("strategies", &signs)
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::FnStrategy;

    #[test]
    fn test_builtin_order() {
        let dom = Registry::dom();
        let signs: Vec<&str> = dom.strategies().iter().map(|s| s.sign()).collect();
        assert_eq!(signs, vec!["tag.", "class.", "id.", "text.", "children"]);

        let json = Registry::json();
        assert_eq!(json.strategy_for("[0]").map(|s| s.sign()), Some("["));
        assert_eq!(json.strategy_for("title").map(|s| s.sign()), Some(""));
        assert!(json.strategy_for("a.b").is_none());
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = Registry::dom();
        registry.register_strategy(
            FnStrategy::new("tag.", |rule| rule.starts_with("tag."), |_, _, _| Ok(Vec::new()))
                .with_priority(100),
        );
        // The later, higher-priority strategy never wins the overlap.
        let chosen = registry.strategy_for("tag.div").unwrap();
        assert_eq!(chosen.priority(), 10);

        registry.prepend_strategy(FnStrategy::new(
            "tag.",
            |rule| rule.starts_with("tag."),
            |_, _, _| Ok(Vec::new()),
        ));
        assert_eq!(registry.strategies().len(), 7);
        assert_eq!(registry.strategy_for("tag.div").unwrap().priority(), 10);
        assert!(Rc::ptr_eq(
            registry.strategy_for("tag.div").unwrap(),
            &registry.strategies()[0]
        ));
    }
}
