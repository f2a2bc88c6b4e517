//! Pluggable node-selection strategies.
//!
//! A strategy claims a rule segment through [`ParseStrategy::can_handle`] and
//! turns the current node set into a new one. Strategies are tried in
//! registration order and the first claim wins, regardless of priority.

use std::fmt;

use crate::context::ParseContext;
use crate::error::RuleResult;
use crate::node::ParseNode;

mod dom;
mod json;

pub use self::dom::{ChildrenStrategy, ClassStrategy, IdStrategy, TagStrategy, TextStrategy};
pub use self::json::{ArrayIndexStrategy, JsonPathStrategy, ObjectKeyStrategy};

/**
    Selects nodes for the rule segments it recognizes.
*/
pub trait ParseStrategy {
    /// Rule prefix this strategy answers to, e.g. `tag.`.
    fn sign(&self) -> &str;

    /// Informational only; dispatch order is registration order.
    fn priority(&self) -> i32 {
        10
    }

    fn can_handle(&self, rule: &str) -> bool {
        rule.starts_with(self.sign())
    }

    fn parse(
        &self,
        rule: &str,
        context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>>;
}

type Predicate = Box<dyn Fn(&str) -> bool>;
type Handler = Box<dyn Fn(&str, &ParseContext, &[ParseNode]) -> RuleResult<Vec<ParseNode>>>;

/**
    A strategy assembled from a predicate and a handler closure.

    ```ignore
    let attr = FnStrategy::new(
        "attr.",
        |rule| rule.starts_with("attr."),
        |rule, _ctx, nodes| {
            let name = &rule["attr.".len()..];
            Ok(nodes.iter().filter(|n| n.attribute(name).is_some()).cloned().collect())
        },
    );
    ```
*/
pub struct FnStrategy {
    sign: String,
    priority: i32,
    predicate: Predicate,
    handler: Handler,
}

impl FnStrategy {
    pub fn new(
        sign: impl Into<String>,
        predicate: impl Fn(&str) -> bool + 'static,
        handler: impl Fn(&str, &ParseContext, &[ParseNode]) -> RuleResult<Vec<ParseNode>> + 'static,
    ) -> Self {
        Self {
            sign: sign.into(),
            priority: 10,
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl ParseStrategy for FnStrategy {
    fn sign(&self) -> &str {
        &self.sign
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, rule: &str) -> bool {
        (self.predicate)(rule)
    }

    fn parse(
        &self,
        rule: &str,
        context: &ParseContext,
        nodes: &[ParseNode],
    ) -> RuleResult<Vec<ParseNode>> {
        (self.handler)(rule, context, nodes)
    }
}

impl fmt::Debug for FnStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStrategy")
            .field("sign", &self.sign)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
