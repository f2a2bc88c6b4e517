/*!
    The `@js:` and `{{ }}` script hook.

    Rules never reach a general-purpose interpreter. Scripts run through a
    [`ScriptSandbox`], and the bundled [`ExpressionSandbox`] evaluates a small,
    loop-free expression language: literals, arithmetic, comparisons, logical
    and ternary operators, `let` bindings, `if`/`else`, `return`, string and
    array methods, and a fixed set of helper functions (`encodeURIComponent`,
    `base64Encode`, `timeFormat`, `parseInt` and friends, also reachable as
    `java.*`). Every program terminates.
*/

use std::sync::OnceLock;

use regex::Regex;

use crate::context::ParseContext;
use crate::error::{RuleError, RuleResult};

mod eval;
mod parse;
mod value;

pub use value::ScriptValue;

/// Upper bound on script source length.
const MAX_SOURCE_LEN: usize = 64 * 1024;

/// Upper bound on any single string a script or a `##` replacement builds.
pub(crate) const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/**
    Runs one script against one input string.

    Implementations see the input as `value` (alias `result`) and may read
    the context's variables by name.
*/
pub trait ScriptSandbox {
    fn run(&self, script: &str, input: &str, context: &ParseContext) -> RuleResult<String>;
}

/// Restricted expression evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionSandbox;

impl ExpressionSandbox {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `script` and return its value without stringifying it.
    pub fn evaluate(
        &self,
        script: &str,
        input: &str,
        context: &ParseContext,
    ) -> RuleResult<ScriptValue> {
        if script.len() > MAX_SOURCE_LEN {
            return Err(RuleError::Script(format!(
                "script is {} bytes, limit is {MAX_SOURCE_LEN}",
                script.len()
            )));
        }
        let tokens = parse::tokenize(script)?;
        let program = parse::Parser::new(tokens).program()?;

        let mut interpreter = eval::Interpreter::new(context);
        interpreter.bind("value", ScriptValue::from(input));
        interpreter.bind("result", ScriptValue::from(input));
        match interpreter.run(&program)? {
            ScriptValue::Undefined => Err(RuleError::Script("script produced no value".into())),
            value => Ok(value),
        }
    }
}

impl ScriptSandbox for ExpressionSandbox {
    fn run(&self, script: &str, input: &str, context: &ParseContext) -> RuleResult<String> {
        let value = self.evaluate(script, input, context)?;
        Ok(match value {
            ScriptValue::Null => String::new(),
            other => other.to_string(),
        })
    }
}

/// Passes every input through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSandbox;

impl ScriptSandbox for DisabledSandbox {
    fn run(&self, _script: &str, input: &str, _context: &ParseContext) -> RuleResult<String> {
        Ok(input.to_string())
    }
}

/// Render a number the way JavaScript's `String(n)` does for common values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        // -0 renders as 0.
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Translate JavaScript replacement references (`$&`, `$1`, `$$`) to `regex` syntax.
pub(crate) fn js_replacement(replacement: &str) -> String {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    let reference = REFERENCE.get_or_init(|| {
        Regex::new(r"\$(\$|&|\d+)").expect("replacement reference regex should compile")
    });
    reference
        .replace_all(replacement, |caps: &regex::Captures<'_>| match &caps[1] {
            "$" => "$$".to_string(),
            "&" => "${0}".to_string(),
            group => format!("${{{group}}}"),
        })
        .into_owned()
}

pub(crate) fn ensure_len(len: usize) -> RuleResult<usize> {
    if len > MAX_STRING_LEN {
        return Err(RuleError::Script(format!(
            "output of {len} bytes exceeds the {MAX_STRING_LEN} byte limit"
        )));
    }
    Ok(len)
}

/**
    Regex replacement with JavaScript references (`$&`, `$1`, `$$`).

    Each expansion is bounded before it is written: a reference expands to at
    most the whole match. Output may grow past the input only up to
    [`MAX_STRING_LEN`].
*/
pub(crate) fn replace_bounded(
    re: &Regex,
    text: &str,
    replacement: &str,
    all: bool,
) -> RuleResult<String> {
    let template = js_replacement(replacement);
    let references = template.matches('$').count();
    let limit = MAX_STRING_LEN.max(text.len());

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text).take(if all { usize::MAX } else { 1 }) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let bound = out
            .len()
            .saturating_add(template.len())
            .saturating_add(references.saturating_mul(whole.len()))
            .saturating_add(text.len() - whole.end());
        if bound > limit {
            return Err(RuleError::Script(format!(
                "replacement exceeds the {limit} byte limit"
            )));
        }
        caps.expand(&template, &mut out);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
