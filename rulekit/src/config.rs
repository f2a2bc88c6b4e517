use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ParseContext;
use crate::engine::ParserEngine;
use crate::error::{RuleError, RuleResult};
use crate::factory::{DocumentSource, EngineFactory};
use crate::node::SourceType;
use crate::request::RequestBuilder;
use crate::script::{DisabledSandbox, ExpressionSandbox, ScriptSandbox};

/**
    Engine settings, usually read from YAML.

    ```yaml
    base_url: https://example.com/
    backend: dom        # optional, skips detection
    variables:
      lang: en
    script:
      enabled: false    # `@js:` and `{{ }}` pass values through
    ```
*/
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub base_url: Option<String>,
    pub variables: BTreeMap<String, Value>,
    pub backend: Option<SourceType>,
    pub script: ScriptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub enabled: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> RuleResult<Self> {
        Self::parse(content, "<string>")
    }

    pub fn load(path: impl AsRef<Path>) -> RuleResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| RuleError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> RuleResult<Self> {
        // An empty document is the default configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| RuleError::Yaml {
            origin: origin.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn sandbox(&self) -> Rc<dyn ScriptSandbox> {
        if self.script.enabled {
            Rc::new(ExpressionSandbox)
        } else {
            Rc::new(DisabledSandbox)
        }
    }

    /// A root context seeded with the base URL and variables.
    pub fn context(&self) -> Rc<ParseContext> {
        let context = ParseContext::new();
        if let Some(base_url) = &self.base_url {
            context.set_base_url(base_url.as_str());
        }
        for (key, value) in &self.variables {
            context.put(key.as_str(), value.clone());
        }
        Rc::new(context)
    }

    pub fn build_factory(&self) -> EngineFactory {
        EngineFactory::new()
            .with_context(self.context())
            .with_sandbox(self.sandbox())
    }

    /// Build an engine, honouring a forced backend.
    pub fn create(&self, source: impl Into<DocumentSource>) -> RuleResult<Box<dyn ParserEngine>> {
        let factory = self.build_factory();
        match self.backend {
            Some(source_type) => factory.create_with_type(source, source_type),
            None => factory.create(source),
        }
    }

    pub fn request_builder(&self) -> RequestBuilder {
        RequestBuilder::new()
            .with_context(self.context())
            .with_sandbox(self.sandbox())
    }
}
