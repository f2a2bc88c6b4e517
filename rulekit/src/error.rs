use thiserror::Error;

use crate::node::SourceType;

/**
    Errors raised while evaluating rules against a document.

    Rule evaluation itself never surfaces these to callers: the evaluator logs them
    and treats the failing branch as empty. They are returned directly only by
    construction-time APIs (factory, config, manifests).
*/
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    // ── Selection ──────────────────────────────────────────────────────
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid XPath '{0}'")]
    InvalidXPath(String),
    #[error("XPath evaluation failed: {0}")]
    XPathEvaluation(String),
    #[error("invalid JSONPath '{path}': {reason}")]
    InvalidJsonPath { path: String, reason: String },
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: SourceType,
    },

    // ── Post-processing ────────────────────────────────────────────────
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("script failed: {0}")]
    Script(String),

    // ── Documents ──────────────────────────────────────────────────────
    #[error("invalid JSON document: {0}")]
    Json(String),
    #[error("no backend can handle the given source")]
    NoBackend,
    #[error("no backend registered for type '{0}'")]
    BackendNotRegistered(SourceType),
    #[error("{backend} backend cannot be built from {given}")]
    SourceMismatch {
        backend: SourceType,
        given: &'static str,
    },

    // ── Configuration ──────────────────────────────────────────────────
    #[error("invalid YAML in {origin}: {reason}")]
    Yaml { origin: String, reason: String },
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("source '{0}' not found")]
    UnknownSource(String),
}

impl RuleError {
    pub(crate) fn invalid_regex(pattern: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/**
    Error returned by `FromStr` implementations on enum types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

/**
    Type alias for results that may return a [`RuleError`].
*/
pub type RuleResult<T> = std::result::Result<T, RuleError>;
