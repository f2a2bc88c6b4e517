/// Explicit backend prefixes that stay attached to their chain segment.
const EXPLICIT_PREFIXES: &[&str] = &["css:", "json:", "xpath:"];

/**
    Split `rule` on `op` where brackets and parentheses are balanced and
    outside quoted strings.

    Parts are trimmed. A rule without `op` at depth zero yields itself. A
    quote with no closing partner is an ordinary character, so an apostrophe
    in a `##` pattern does not swallow the rest of the rule.
*/
pub fn split_combinator<'r>(rule: &'r str, op: &str) -> Vec<&'r str> {
    split_top_level(rule, op)
        .into_iter()
        .map(str::trim)
        .collect()
}

fn split_top_level<'r>(rule: &'r str, op: &str) -> Vec<&'r str> {
    let bytes = rule.as_bytes();
    let op = op.as_bytes();
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = (depth - 1).max(0),
            quote @ (b'\'' | b'"') => {
                if let Some(len) = bytes[i + 1..].iter().position(|&b| b == quote) {
                    i += len + 2;
                    continue;
                }
            }
            _ => {}
        }
        if depth == 0 && bytes[i..].starts_with(op) {
            parts.push(&rule[start..i]);
            i += op.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&rule[start..]);
    parts
}

fn is_xpath(segment: &str) -> bool {
    segment.starts_with("//") || has_prefix_ci(segment, "@xpath:")
}

/// ASCII case-insensitive prefix test.
pub(crate) fn has_prefix_ci(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Strip an ASCII case-insensitive prefix.
pub(crate) fn strip_prefix_ci<'t>(text: &'t str, prefix: &str) -> Option<&'t str> {
    has_prefix_ci(text, prefix).then(|| &text[prefix.len()..])
}

/**
    Split a chain rule into its `@`-separated segments.

    `@css:`, `@json:` and `@xpath:` keep their `@`. An XPath segment (`@xpath:`
    or `//`) runs to the end of the rule, since XPath uses `@` itself. Empty
    segments are dropped.
*/
pub fn split_chain(rule: &str) -> Vec<String> {
    let rule = rule.trim();
    if is_xpath(rule) {
        return vec![rule.to_string()];
    }

    let pieces = split_top_level(rule, "@");
    let mut segments: Vec<String> = Vec::new();
    let mut i = 0;
    while i < pieces.len() {
        let piece = pieces[i].trim();
        let segment = if EXPLICIT_PREFIXES.iter().any(|p| has_prefix_ci(piece, p)) {
            format!("@{piece}")
        } else {
            piece.to_string()
        };

        if is_xpath(&segment) {
            // Re-join the raw remainder of the rule untouched.
            let rest = pieces[i + 1..].join("@");
            let joined = if rest.is_empty() {
                segment
            } else {
                format!("{segment}@{rest}")
            };
            segments.push(joined);
            break;
        }
        if !segment.is_empty() {
            segments.push(segment);
        }
        i += 1;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_combinator() {
        assert_eq!(split_combinator("a || b||c", "||"), vec!["a", "b", "c"]);
        assert_eq!(split_combinator("a", "||"), vec!["a"]);
        assert_eq!(
            split_combinator("//a[@x='1&&2']&&b", "&&"),
            vec!["//a[@x='1&&2']", "b"]
        );
        assert_eq!(split_combinator("x%%", "%%"), vec!["x", ""]);
    }

    #[test]
    fn test_split_skips_quoted_operators() {
        assert_eq!(
            split_combinator("text@js:value + '||'||tag.b@text", "||"),
            vec!["text@js:value + '||'", "tag.b@text"]
        );
        assert_eq!(
            split_combinator(r#"text@js:"a&&b"&&id.x@text"#, "&&"),
            vec![r#"text@js:"a&&b""#, "id.x@text"]
        );
        // An unmatched apostrophe is literal.
        assert_eq!(
            split_combinator("tag.p@text##don't##||id.y@text", "||"),
            vec!["tag.p@text##don't##", "id.y@text"]
        );
    }

    #[test]
    fn test_split_chain_plain() {
        assert_eq!(split_chain("class.item@tag.a@href"), vec!["class.item", "tag.a", "href"]);
        assert_eq!(split_chain("text"), vec!["text"]);
        assert!(split_chain("@@").is_empty());
    }

    #[test]
    fn test_split_chain_keeps_explicit_prefixes() {
        assert_eq!(split_chain("@css:div.a@text"), vec!["@css:div.a", "text"]);
        assert_eq!(split_chain("@json:$.data@title"), vec!["@json:$.data", "title"]);
        assert_eq!(split_chain("$.list[?(@.ok)]@name"), vec!["$.list[?(@.ok)]", "name"]);
    }

    #[test]
    fn test_xpath_swallows_rest() {
        assert_eq!(split_chain("//div/a/@href"), vec!["//div/a/@href"]);
        assert_eq!(
            split_chain("class.box@@xpath://a/@href"),
            vec!["class.box", "@xpath://a/@href"]
        );
        assert_eq!(split_chain("@XPath://p"), vec!["@XPath://p"]);
    }

    #[test]
    fn test_prefix_helpers() {
        assert!(has_prefix_ci("@CSS:div", "@css:"));
        assert_eq!(strip_prefix_ci("@Json:$.a", "@json:"), Some("$.a"));
        assert_eq!(strip_prefix_ci("é", "@json:"), None);
    }
}
