//! Rule text: combinator and chain splitting, suffix preprocessing, index
//! filters and the evaluator that reduces a rule against a node set.

mod eval;
mod index;
mod split;

pub(crate) use eval::Evaluator;
pub use index::{IndexFilter, SliceEnd};
pub use split::{split_chain, split_combinator};

/**
    A rule with its post-processing suffixes split off.

    `rule##regex##replacement##@js:script` becomes the selection part `rule`,
    the replace pair and the script. The script is cut at the first `@js:`
    and the replace pair at the first `##` of what remains. A missing
    replacement is empty.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed<'r> {
    pub rule: &'r str,
    pub replace: Option<(String, String)>,
    pub script: Option<&'r str>,
}

pub fn preprocess(rule: &str) -> Preprocessed<'_> {
    let (body, script) = match rule.find("@js:") {
        Some(at) => (&rule[..at], Some(rule[at + 4..].trim())),
        None => (rule, None),
    };

    let (body, replace) = match body.find("##") {
        Some(at) => {
            let mut pieces = body[at..].split("##").filter(|p| !p.trim().is_empty());
            let replace = pieces.next().map(|pattern| {
                let replacement = pieces.next().unwrap_or_default();
                (pattern.to_string(), replacement.to_string())
            });
            (&body[..at], replace)
        }
        None => (body, None),
    };

    Preprocessed {
        rule: body.trim(),
        replace,
        script: script.filter(|s| !s.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_plain() {
        let pre = preprocess(" class.title@text ");
        assert_eq!(pre.rule, "class.title@text");
        assert_eq!(pre.replace, None);
        assert_eq!(pre.script, None);
    }

    #[test]
    fn test_preprocess_replace_and_script() {
        let pre = preprocess(r#"text##\d+##N##@js:return value+"!""#);
        assert_eq!(pre.rule, "text");
        assert_eq!(pre.replace, Some((r"\d+".to_string(), "N".to_string())));
        assert_eq!(pre.script, Some(r#"return value+"!""#));
    }

    #[test]
    fn test_preprocess_replacement_defaults_to_empty() {
        let pre = preprocess("text##\\s+");
        assert_eq!(pre.rule, "text");
        assert_eq!(pre.replace, Some((r"\s+".to_string(), String::new())));

        let pre = preprocess("text####");
        assert_eq!(pre.rule, "text");
        assert_eq!(pre.replace, None);
    }

    #[test]
    fn test_preprocess_empty_script_is_dropped() {
        let pre = preprocess("href@js:  ");
        assert_eq!(pre.rule, "href");
        assert_eq!(pre.script, None);
    }
}
