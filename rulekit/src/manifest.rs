use include_dir::{Dir, include_dir};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::ParserEngine;
use crate::error::{RuleError, RuleResult};
use crate::node::SourceType;
use crate::request::{RequestBuilder, RequestDescriptor};

/// Embedded source manifests directory.
static SOURCES_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/sources");

/// A source manifest: where to search and how to read the results page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Manifest {
    pub source: Source,
    pub search: SearchPhase,
    pub list: ListPhase,
}

/// Source metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Skip detection and always use this backend.
    #[serde(default)]
    pub backend: Option<SourceType>,
}

/// Search phase - a request template with `key` and `page` bound.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchPhase {
    pub url: String,
}

/// List phase - selects one sub-tree per record, then reads its fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListPhase {
    pub rule: String,
    pub fields: Vec<Field>,
}

/// One output field of a record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Field {
    pub name: String,
    pub rule: String,
    /// Resolve the value against the base URL.
    #[serde(default)]
    pub url: bool,
}

impl Manifest {
    pub fn from_yaml_str(content: &str) -> RuleResult<Self> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, origin: &str) -> RuleResult<Self> {
        serde_yaml::from_str(content).map_err(|e| RuleError::Yaml {
            origin: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// The search request for `key` on `page`.
    pub fn request(&self, key: &str, page: u32) -> RequestDescriptor {
        let builder = match &self.source.base_url {
            Some(base) => RequestBuilder::new().with_base_url(base.as_str()),
            None => RequestBuilder::new(),
        };
        builder.build(&self.search.url, key, page)
    }

    /**
        Run the list rule through `parse_to_engines` and read every field
        from each sub-engine, in declaration order.
    */
    pub fn extract(&self, engine: &dyn ParserEngine) -> Vec<Map<String, Value>> {
        if let Some(base) = &self.source.base_url
            && engine.context().base_url().is_empty()
        {
            engine.context().set_base_url(base.as_str());
        }

        engine
            .parse_to_engines(&self.list.rule)
            .iter()
            .map(|item| {
                self.list
                    .fields
                    .iter()
                    .map(|field| {
                        let value = if field.url {
                            item.parse_to_url(&field.rule)
                        } else {
                            item.parse_to_string(&field.rule)
                        };
                        (field.name.clone(), Value::String(value))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Load all bundled source manifests.
pub fn load_all() -> RuleResult<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for file in SOURCES_DIR.files() {
        let path = file.path();
        if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            let origin = path.display().to_string();
            let content = file.contents_utf8().ok_or_else(|| RuleError::Io {
                path: origin.clone(),
                reason: "not valid UTF-8".to_string(),
            })?;
            manifests.push(Manifest::parse(content, &origin)?);
        }
    }

    manifests.sort_by(|a, b| a.source.id.cmp(&b.source.id));
    Ok(manifests)
}

/// Find a source manifest by ID (case-insensitive, exact match first, then partial).
pub fn find_by_id(id: &str) -> RuleResult<Manifest> {
    let manifests = load_all()?;
    let id_lower = id.to_lowercase();

    if let Some(manifest) = manifests
        .iter()
        .find(|m| m.source.id.to_lowercase() == id_lower)
    {
        return Ok(manifest.clone());
    }

    manifests
        .into_iter()
        .find(|m| m.source.id.to_lowercase().contains(&id_lower))
        .ok_or_else(|| RuleError::UnknownSource(id.to_string()))
}

/// List all bundled source IDs.
pub fn list_sources() -> RuleResult<Vec<String>> {
    let manifests = load_all()?;
    Ok(manifests.into_iter().map(|m| m.source.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleEngine;
    use serde_json::json;

    const QUOTES_PAGE: &str = r#"
        <div class="quote">
            <span class="text">“Be yourself.”</span>
            <span>by <small class="author">Oscar Wilde</small>
            <a href="/author/Oscar-Wilde">(about)</a></span>
            <div class="tags">
                <a class="tag" href="/tag/life/">life</a>
                <a class="tag" href="/tag/self/">self</a>
            </div>
        </div>
        <div class="quote">
            <span class="text">“So it goes.”</span>
            <span>by <small class="author">Kurt Vonnegut</small>
            <a href="/author/Kurt-Vonnegut">(about)</a></span>
        </div>
    "#;

    #[test]
    fn test_load_all_manifests() {
        let manifests = load_all().expect("Failed to load manifests");
        assert!(!manifests.is_empty(), "No manifests found");

        for manifest in &manifests {
            assert!(!manifest.source.id.is_empty());
            assert!(!manifest.source.name.is_empty());
            assert!(!manifest.list.rule.is_empty());
            assert!(!manifest.list.fields.is_empty());
        }
    }

    #[test]
    fn test_list_sources() {
        let sources = list_sources().expect("Failed to list sources");
        assert_eq!(sources, vec!["hn-search", "quotes"]);
    }

    #[test]
    fn test_find_by_id() {
        let manifest = find_by_id("QUOTES").expect("Failed to find quotes");
        assert_eq!(manifest.source.name, "Quotes to Scrape");
        assert_eq!(find_by_id("hn").unwrap().source.id, "hn-search");
        assert!(matches!(find_by_id("nope"), Err(RuleError::UnknownSource(_))));
    }

    #[test]
    fn test_extract_html_records() {
        let manifest = find_by_id("quotes").unwrap();
        let records = manifest.extract(&RuleEngine::dom(QUOTES_PAGE));
        assert_eq!(records.len(), 2);

        let first = &records[0];
        let keys: Vec<&str> = first.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["text", "author", "tags", "link"]);
        assert_eq!(first["text"], "Be yourself.");
        assert_eq!(first["author"], "Oscar Wilde");
        assert_eq!(first["tags"], "life,/tag/life/\nself,/tag/self/");
        assert_eq!(first["link"], "https://quotes.toscrape.com/author/Oscar-Wilde");
        assert_eq!(records[1]["tags"], "");
    }

    #[test]
    fn test_extract_json_records() {
        let manifest = find_by_id("hn-search").unwrap();
        let engine = RuleEngine::json(json!({
            "hits": [
                {"title": "Rust 2024", "author": "ferris", "points": 42, "url": "https://r.example"},
                {"title": null, "story_title": "Re: Rust", "author": "crab", "points": 1,
                 "url": null, "story_url": "https://s.example"}
            ]
        }));
        let records = manifest.extract(&engine);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "Rust 2024");
        assert_eq!(records[0]["points"], "42");
        assert_eq!(records[1]["title"], "Re: Rust");
        assert_eq!(records[1]["link"], "https://s.example");
    }

    #[test]
    fn test_search_request() {
        let request = find_by_id("hn-search").unwrap().request("rust lang", 1);
        assert_eq!(
            request.url,
            "https://hn.algolia.com/api/v1/search?query=rust%20lang&page=0"
        );
        assert_eq!(
            request.headers.get("Accept").map(String::as_str),
            Some("application/json")
        );

        let request = find_by_id("quotes").unwrap().request("life", 2);
        assert_eq!(request.url, "https://quotes.toscrape.com/tag/life/page/2/");
    }

    #[test]
    fn test_from_yaml_str_errors() {
        assert!(matches!(
            Manifest::from_yaml_str("source: ["),
            Err(RuleError::Yaml { .. })
        ));
    }
}
