#![allow(clippy::doc_overindented_list_items)]

mod capture;
mod config;
mod context;
mod engine;
mod error;
mod extractor;
mod factory;
mod manifest;
mod node;
mod registry;
mod request;
mod script;
mod strategy;

pub mod rule;

pub use self::capture::{FULL, parse_regex_to_strings};
pub use self::config::{EngineConfig, ScriptConfig};
pub use self::context::ParseContext;
pub use self::engine::{ParserEngine, RuleEngine, resolve_url};
pub use self::error::{ParseError, RuleError, RuleResult};
pub use self::extractor::{
    BUILTIN_TOKENS, ContentExtractor, DomContentExtractor, Extracted, JsonKeyExtractor,
    extract_builtin,
};
pub use self::factory::{
    BackendFactory, DocumentSource, DomBackend, EngineFactory, EngineSeed, JsonBackend,
    TextBackend,
};
pub use self::manifest::{
    Field, ListPhase, Manifest, SearchPhase, Source, find_by_id, list_sources, load_all,
};
pub use self::node::{DomDocument, DomNode, JsonNode, ParseNode, SourceType};
pub use self::registry::Registry;
pub use self::request::{RequestBuilder, RequestDescriptor};
pub use self::script::{
    DisabledSandbox, ExpressionSandbox, ScriptSandbox, ScriptValue, format_number,
};
pub use self::strategy::{
    ArrayIndexStrategy, ChildrenStrategy, ClassStrategy, FnStrategy, IdStrategy,
    JsonPathStrategy, ObjectKeyStrategy, ParseStrategy, TagStrategy, TextStrategy,
};
