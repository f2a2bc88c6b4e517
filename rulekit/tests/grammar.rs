//! Rule grammar properties checked through the public engine API.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use rulekit::rule::IndexFilter;
use rulekit::{
    DomDocument, EngineFactory, FnStrategy, ParseContext, ParserEngine, Registry, RuleEngine,
    SourceType, parse_regex_to_strings,
};

const PAGE: &str = r#"
    <h1>Catalog</h1>
    <div class="n">zero</div>
    <div class="n">one</div>
    <div class="n">two</div>
    <div class="n">three</div>
    <div class="n">four</div>
    <ul><li>x</li><li>y</li></ul>
    <ol><li>1</li><li>2</li></ol>
"#;

fn engine() -> RuleEngine {
    RuleEngine::dom(PAGE)
}

/// An engine whose `count.` strategy counts its invocations.
fn counting_engine() -> (RuleEngine, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut registry = Registry::dom();
    registry.prepend_strategy(FnStrategy::new(
        "count.",
        |rule| rule.starts_with("count."),
        move |_, _, nodes| {
            counter.set(counter.get() + 1);
            Ok(nodes.to_vec())
        },
    ));
    let engine = RuleEngine::new(
        SourceType::Dom,
        vec![DomDocument::parse(PAGE).body().into()],
        Rc::new(registry),
        Rc::new(ParseContext::new()),
    );
    (engine, calls)
}

#[test]
fn test_or_short_circuits() {
    let (engine, calls) = counting_engine();
    assert_eq!(
        engine.parse_to_string("tag.h1@text||count.x@tag.h1@text"),
        engine.parse_to_string("tag.h1@text")
    );
    assert_eq!(calls.get(), 0);

    assert_eq!(
        engine.parse_to_string("class.missing@text||count.x@tag.h1@text"),
        "Catalog"
    );
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_and_concatenates_without_separator() {
    let engine = engine();
    for (left, right) in [
        ("tag.h1@text", "class.n@.0@text"),
        ("class.n@.-1@text", "class.missing@text"),
        ("//ul/li/text()", "//ol/li/text()"),
    ] {
        let expected = engine.parse_to_string(left) + &engine.parse_to_string(right);
        assert_eq!(engine.parse_to_string(&format!("{left}&&{right}")), expected);
    }
}

#[test]
fn test_interleave_rows() {
    let engine = engine();
    assert_eq!(engine.parse_to_string("//ul/li/text()"), "x\ny");
    assert_eq!(engine.parse_to_string("//ol/li/text()"), "1\n2");
    assert_eq!(
        engine.parse_to_string("//ul/li/text()%%//ol/li/text()"),
        "x,1\ny,2"
    );
}

#[test]
fn test_interleave_skips_short_columns() {
    assert_eq!(
        engine().parse_to_string("//ul/li/text()%%tag.h1@text"),
        "x,Catalog\ny"
    );
}

#[test]
fn test_index_filters() {
    let (body, filter) = IndexFilter::strip("class.n[0:3:1]");
    assert_eq!(body, "class.n");
    assert_eq!(filter.unwrap().indices(5), vec![0, 1, 2]);
    assert_eq!(IndexFilter::strip("class.n[-2]").1.unwrap().indices(5), vec![3]);

    let engine = engine();
    assert_eq!(
        engine.parse_to_strings("class.n@[0:3:1]@text"),
        vec!["zero", "one", "two"]
    );
    assert_eq!(engine.parse_to_strings("class.n@[-2]@text"), vec!["three"]);
    assert_eq!(engine.parse_to_strings("tag.div@.1@text"), vec!["one"]);
}

#[test]
fn test_index_selects_among_current_nodes() {
    let engine = RuleEngine::dom(
        r#"<div class="n">a</div><div class="n">b</div><div class="n">c</div>"#,
    );
    // The filter runs on the single <body> root before `class.n` searches it.
    assert_eq!(engine.parse_to_string("class.n.1@text"), "");
    assert_eq!(engine.parse_to_string("class.n.0@text"), "abc");

    let divs = engine.parse_to_engines("class.n");
    assert_eq!(divs.len(), 3);
    assert_eq!(engine.parse_to_string("class.n@.1@text"), "b");
    assert!(engine.parse_to_engines("class.n.1").is_empty());
}

#[test]
fn test_reversal() {
    let engine = engine();
    let forward: Vec<String> = engine
        .parse_to_engines("tag.div")
        .iter()
        .map(|e| e.raw_content())
        .collect();
    let mut backward: Vec<String> = engine
        .parse_to_engines("-tag.div")
        .iter()
        .map(|e| e.raw_content())
        .collect();
    assert_eq!(forward.len(), 5);
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn test_replace_runs_before_script() {
    let engine = EngineFactory::new().create("a1b2").unwrap();
    assert_eq!(
        engine.parse_to_string(r#"text##\d+##N##@js:return value+"!""#),
        "aNbN!"
    );
}

#[test]
fn test_factory_prefers_json() {
    let engine = EngineFactory::new().create("{\"a\":1}").unwrap();
    assert_eq!(engine.source_type(), SourceType::Json);
    assert_eq!(engine.parse_to_string("a"), "1");
}

#[test]
fn test_regex_multi_capture() {
    let rows = parse_regex_to_strings(
        r"id=(\d+) name=(\w+)",
        &[Some("$1"), Some("$2")],
        "id=42 name=foo",
    )
    .unwrap();
    assert_eq!(rows, vec![vec!["42".to_string(), "foo".to_string()]]);
}

#[test]
fn test_node_mode_agrees_with_string_mode() {
    let engine = engine();
    for rule in ["class.n", "tag.li", "tag.div@[1:4]", "@css:ol li", "tag.div@!0"] {
        let via_engines: Vec<String> = engine
            .parse_to_engines(rule)
            .iter()
            .map(|sub| sub.parse_to_string("text"))
            .collect();
        assert_eq!(via_engines, engine.parse_to_strings(&format!("{rule}@text")), "{rule}");
    }
}

#[test]
fn test_malformed_rule_is_empty() {
    let engine = engine();
    assert_eq!(engine.parse_to_string("@@||%%"), "");
    assert!(engine.parse_to_engines("@@||%%").is_empty());
}

#[test]
fn test_runaway_script_keeps_value() {
    let engine = RuleEngine::dom("<p>abcdefgh</p>");
    assert_eq!(
        engine.parse_to_string("tag.p@text@js:value.repeat(65536).length"),
        "524288"
    );
    assert_eq!(
        engine.parse_to_string("tag.p@text@js:value.repeat(65536).repeat(65536).length"),
        "abcdefgh"
    );
}

proptest! {
    #[test]
    fn test_arbitrary_rules_never_panic(rule in r#"[a-z.@|&%#\-\[\]:!,0-9$/ '"]{0,24}"#) {
        let engine = engine();
        let _ = engine.parse_to_string(&rule);
        let _ = engine.parse_to_strings(&rule);
        let _ = engine.parse_to_engines(&rule);
    }

    #[test]
    fn test_or_matches_first_non_empty(left in "(tag.h1|class.n|class.x|tag.li)", right in "(tag.h1|class.n|tag.li)") {
        let engine = engine();
        let left = format!("{left}@text");
        let right = format!("{right}@text");
        let first = engine.parse_to_string(&left);
        let expected = if first.is_empty() { engine.parse_to_string(&right) } else { first };
        prop_assert_eq!(engine.parse_to_string(&format!("{left}||{right}")), expected);
    }
}
