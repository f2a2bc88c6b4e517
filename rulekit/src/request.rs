//! Request templates: `url,options` strings with `{{ }}` script segments.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::ParseContext;
use crate::engine::resolve_url;
use crate::node::scalar_text;
use crate::script::{ExpressionSandbox, ScriptSandbox};

/// Methods that carry a request body.
const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// A resolved, normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    pub webview: bool,
    /// Milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RequestDescriptor {
    fn get(url: String) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: None,
            charset: None,
            webview: false,
            timeout: None,
        }
    }
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([\s\S]*?)\}\}").expect("segment regex should compile"))
}

fn js_mode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:var|let|const|function)\s+")
            .expect("js mode regex should compile")
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), scalar_text(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Options as JSON, accepting single-quoted JSON as well.
fn parse_options(text: &str) -> Option<Map<String, Value>> {
    let parsed = serde_json::from_str::<Value>(text)
        .or_else(|_| serde_json::from_str::<Value>(&text.replace('\'', "\"")));
    match parsed {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            warn!(options = %other, "request options are not an object");
            None
        }
        Err(e) => {
            warn!(options = %text, error = %e, "malformed request options");
            None
        }
    }
}

/**
    Resolves request templates into [`RequestDescriptor`]s.

    A template is `url` or `url,options`. Before splitting, every `{{ expr }}`
    segment is replaced by the value of `expr`, evaluated with `key` and
    `page` bound; a template that starts with `@js:` is evaluated as a whole
    instead. Options are a JSON object:

    | Key              | Effect                                          |
    |------------------|-------------------------------------------------|
    | `method`         | upper-cased, default `GET`                      |
    | `headers`        | header map, default empty                       |
    | `params`         | query parameters                                |
    | `body`           | kept for POST, PUT, PATCH and DELETE only       |
    | `charset`        | response charset                                |
    | `webview`        | also accepted as `webView`                      |
    | `timeout`        | milliseconds                                    |
    | `baseURL`        | base for a relative URL                         |

    Options starting with `let`, `var` or `const` are a script that assigns
    `result` the final `url,options` text.
*/
#[derive(Clone)]
pub struct RequestBuilder {
    base_url: String,
    context: Rc<ParseContext>,
    sandbox: Rc<dyn ScriptSandbox>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            base_url: String::new(),
            context: Rc::new(ParseContext::new()),
            sandbox: Rc::new(ExpressionSandbox),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
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

    pub fn build(&self, template: &str, key: &str, page: u32) -> RequestDescriptor {
        let scope = ParseContext::chained(Rc::clone(&self.context));
        scope.put("key", key);
        scope.put("page", page);

        let text = match template.trim().strip_prefix("@js:") {
            Some(script) => self.run(script, template, &scope),
            None => self.substitute(template, &scope),
        };

        let (url, options) = split_template(&text);
        if let Some(script) = options.filter(|o| js_mode_regex().is_match(o)) {
            let output = self.run(&format!("{script}\n;return result"), "", &scope);
            let (url, options) = split_template(&output);
            return self.describe(url, options);
        }
        self.describe(url, options)
    }

    fn run(&self, script: &str, input: &str, scope: &ParseContext) -> String {
        self.sandbox.run(script, input, scope).unwrap_or_else(|e| {
            warn!(script = %script, error = %e, "request script failed");
            String::new()
        })
    }

    fn substitute(&self, template: &str, scope: &ParseContext) -> String {
        segment_regex()
            .replace_all(template, |caps: &Captures<'_>| {
                self.run(caps[1].trim(), &caps[0], scope)
            })
            .into_owned()
    }

    fn describe(&self, url: &str, options: Option<&str>) -> RequestDescriptor {
        let options = options
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .and_then(parse_options)
            .unwrap_or_default();

        let base = match options.get("baseURL") {
            Some(base) if !base.is_null() => scalar_text(base),
            _ if self.base_url.is_empty() => self.context.base_url(),
            _ => self.base_url.clone(),
        };
        let mut request = RequestDescriptor::get(resolve_url(&base, url));

        if let Some(method) = options.get("method").filter(|m| truthy(m)) {
            request.method = scalar_text(method).to_uppercase();
        }
        request.headers = string_map(options.get("headers"));
        request.params = string_map(options.get("params"));
        request.webview = options
            .get("webview")
            .or_else(|| options.get("webView"))
            .is_some_and(truthy);
        request.charset = options
            .get("charset")
            .filter(|c| truthy(c))
            .map(scalar_text);
        request.timeout = options.get("timeout").and_then(|t| match t {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        if let Some(body) = options.get("body").filter(|b| truthy(b)) {
            if BODY_METHODS.contains(&request.method.as_str()) {
                request.body = Some(match body {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            } else {
                debug!(method = %request.method, "dropping body of a bodiless method");
            }
        }
        request
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Split at the first `,` into the URL and the options text.
fn split_template(text: &str) -> (&str, Option<&str>) {
    match text.split_once(',') {
        Some((url, options)) => (url.trim(), Some(options)),
        None => (text.trim(), None),
    }
}
