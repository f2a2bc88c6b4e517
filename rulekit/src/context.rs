use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/**
    Variables and base URL shared by every evaluation an engine performs.

    Engines hold the context behind an `Rc` and sub-engines produced by
    `parse_to_engines` share it. A chained context reads through to its parent
    but keeps writes local, so nested evaluation can see outer variables
    without mutating them. The base URL always belongs to the outermost context.
*/
#[derive(Debug, Default)]
pub struct ParseContext {
    variables: RefCell<HashMap<String, Value>>,
    base_url: RefCell<String>,
    parent: Option<Rc<ParseContext>>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let context = Self::new();
        context.set_base_url(base_url);
        context
    }

    /**
        Create a context that delegates unresolved lookups to `parent`.
    */
    pub fn chained(parent: Rc<ParseContext>) -> Self {
        Self {
            variables: RefCell::default(),
            base_url: RefCell::default(),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Rc<ParseContext>> {
        self.parent.as_ref()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.borrow_mut().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.variables.borrow().get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.borrow().contains_key(key)
            || self.parent.as_ref().is_some_and(|parent| parent.contains(key))
    }

    /// Removes a local variable. Parent variables are never touched.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.variables.borrow_mut().remove(key)
    }

    pub fn clear(&self) {
        self.variables.borrow_mut().clear();
    }

    /**
        Snapshot of the visible variables, local entries shadowing the parent's.
    */
    pub fn variables(&self) -> HashMap<String, Value> {
        let mut all = self
            .parent
            .as_ref()
            .map(|parent| parent.variables())
            .unwrap_or_default();
        for (key, value) in self.variables.borrow().iter() {
            all.insert(key.clone(), value.clone());
        }
        all
    }

    pub fn local_variables(&self) -> HashMap<String, Value> {
        self.variables.borrow().clone()
    }

    pub fn base_url(&self) -> String {
        match &self.parent {
            Some(parent) => parent.base_url(),
            None => self.base_url.borrow().clone(),
        }
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        match &self.parent {
            Some(parent) => parent.set_base_url(url),
            None => *self.base_url.borrow_mut() = url.into(),
        }
    }
}
