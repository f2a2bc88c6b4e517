//! Tree-walking evaluation of parsed scripts.

use std::collections::HashMap;
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::parse::{Expr, Stmt};
use super::value::ScriptValue;
use super::{MAX_STRING_LEN, ensure_len, replace_bounded};
use crate::context::ParseContext;
use crate::error::{RuleError, RuleResult};

fn error(message: impl Into<String>) -> RuleError {
    RuleError::Script(message.into())
}

/// Namespaces whose members are plain functions (`java.base64Encode`, `Math.max`).
const NAMESPACES: &[&str] = &["java", "Math", "JSON"];

/// Bytes a single run may produce across all intermediate values.
const MAX_RUN_BYTES: usize = 4 * MAX_STRING_LEN;

/// Upper bound on the length of an array built by `split`.
const MAX_ARRAY_LEN: usize = 1 << 20;

const MAX_CALL_DEPTH: usize = 32;

/// Calls to declared functions allowed in one run.
const MAX_CALLS: usize = 10_000;

/// A declared `function`.
struct Function {
    params: Vec<String>,
    body: Vec<Stmt>,
}

enum Flow {
    Normal(ScriptValue),
    Return(ScriptValue),
}

pub(super) struct Interpreter<'c> {
    locals: HashMap<String, ScriptValue>,
    functions: HashMap<String, Rc<Function>>,
    context: &'c ParseContext,
    spent: usize,
    depth: usize,
    calls: usize,
}

impl<'c> Interpreter<'c> {
    pub(super) fn new(context: &'c ParseContext) -> Self {
        Self {
            locals: HashMap::new(),
            functions: HashMap::new(),
            context,
            spent: 0,
            depth: 0,
            calls: 0,
        }
    }

    pub(super) fn bind(&mut self, name: &str, value: ScriptValue) {
        self.locals.insert(name.to_string(), value);
    }

    /**
        Run a program. The result is the value of the first executed `return`,
        or else the value of the last expression statement.
    */
    pub(super) fn run(&mut self, program: &[Stmt]) -> RuleResult<ScriptValue> {
        match self.block(program)? {
            Flow::Normal(value) | Flow::Return(value) => Ok(value),
        }
    }

    fn block(&mut self, statements: &[Stmt]) -> RuleResult<Flow> {
        // Declarations are hoisted and do not change the completion value.
        for stmt in statements {
            if let Stmt::Function(name, params, body) = stmt {
                let function = Function {
                    params: params.clone(),
                    body: body.clone(),
                };
                self.functions.insert(name.clone(), Rc::new(function));
            }
        }

        let mut last = ScriptValue::Undefined;
        for stmt in statements {
            if matches!(stmt, Stmt::Function(..)) {
                continue;
            }
            match self.statement(stmt)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(value) => last = value,
            }
        }
        Ok(Flow::Normal(last))
    }

    fn statement(&mut self, stmt: &Stmt) -> RuleResult<Flow> {
        match stmt {
            Stmt::Let(name, init) => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => ScriptValue::Undefined,
                };
                self.locals.insert(name.clone(), value);
                Ok(Flow::Normal(ScriptValue::Undefined))
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.locals.insert(name.clone(), value.clone());
                Ok(Flow::Normal(value))
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => ScriptValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If(condition, then, otherwise) => {
                if self.eval(condition)?.truthy() {
                    self.block(then)
                } else {
                    self.block(otherwise)
                }
            }
            Stmt::Function(..) => Ok(Flow::Normal(ScriptValue::Undefined)),
            Stmt::Expr(expr) => Ok(Flow::Normal(self.eval(expr)?)),
        }
    }

    /**
        Call a declared function.

        The body shares the caller's bindings. Parameters shadow them for the
        duration of the call and are restored afterwards.
    */
    fn call(
        &mut self,
        name: &str,
        function: &Function,
        args: Vec<ScriptValue>,
    ) -> RuleResult<ScriptValue> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(error(format!("{name}: too much recursion")));
        }
        self.calls += 1;
        if self.calls > MAX_CALLS {
            return Err(error(format!("script made more than {MAX_CALLS} calls")));
        }

        let mut args = args.into_iter();
        let shadowed: Vec<(String, Option<ScriptValue>)> = function
            .params
            .iter()
            .map(|param| {
                let value = args.next().unwrap_or(ScriptValue::Undefined);
                (param.clone(), self.locals.insert(param.clone(), value))
            })
            .collect();

        self.depth += 1;
        let flow = self.block(&function.body);
        self.depth -= 1;

        for (param, previous) in shadowed.into_iter().rev() {
            match previous {
                Some(value) => self.locals.insert(param, value),
                None => self.locals.remove(&param),
            };
        }
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(ScriptValue::Undefined),
        }
    }

    fn lookup(&self, name: &str) -> RuleResult<ScriptValue> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.context.get(name) {
            return Ok(ScriptValue::from_json(&value));
        }
        if name == "baseUrl" {
            return Ok(ScriptValue::String(self.context.base_url()));
        }
        Err(error(format!("{name} is not defined")))
    }

    /// Evaluate and charge the produced value against the run's byte budget.
    fn eval(&mut self, expr: &Expr) -> RuleResult<ScriptValue> {
        let value = self.eval_expr(expr)?;
        self.spent = self.spent.saturating_add(value.weight());
        if self.spent > MAX_RUN_BYTES {
            return Err(error(format!(
                "script exceeded its {MAX_RUN_BYTES} byte budget"
            )));
        }
        Ok(value)
    }

    fn eval_expr(&mut self, expr: &Expr) -> RuleResult<ScriptValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.lookup(name),
            Expr::Array(items) => Ok(ScriptValue::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<RuleResult<_>>()?,
            )),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match *op {
                    "!" => ScriptValue::Bool(!value.truthy()),
                    "-" => ScriptValue::Number(-value.to_number()),
                    "typeof" => ScriptValue::String(type_of(&value).to_string()),
                    _ => ScriptValue::Number(value.to_number()),
                })
            }
            Expr::Binary("&&", lhs, rhs) => {
                let left = self.eval(lhs)?;
                if left.truthy() { self.eval(rhs) } else { Ok(left) }
            }
            Expr::Binary("||", lhs, rhs) => {
                let left = self.eval(lhs)?;
                if left.truthy() { Ok(left) } else { self.eval(rhs) }
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                binary(op, &left, &right)
            }
            Expr::Conditional(condition, then, otherwise) => {
                if self.eval(condition)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                Ok(member(&object, name))
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                Ok(index_value(&object, &index))
            }
            Expr::Call(callee, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<RuleResult<Vec<_>>>()?;
                match callee.as_ref() {
                    Expr::Ident(name) => match self.functions.get(name).cloned() {
                        Some(function) => self.call(name, &function, args),
                        None => call_function(name, &args),
                    },
                    Expr::Member(object, name) => match object.as_ref() {
                        Expr::Ident(ns)
                            if NAMESPACES.contains(&ns.as_str())
                                && !self.locals.contains_key(ns.as_str()) =>
                        {
                            call_function(&format!("{ns}.{name}"), &args)
                        }
                        _ => {
                            let receiver = self.eval(object)?;
                            call_method(&receiver, name, &args)
                        }
                    },
                    _ => Err(error("expression is not callable")),
                }
            }
        }
    }
}

fn type_of(value: &ScriptValue) -> &'static str {
    match value {
        ScriptValue::Undefined => "undefined",
        ScriptValue::Bool(_) => "boolean",
        ScriptValue::Number(_) => "number",
        ScriptValue::String(_) => "string",
        _ => "object",
    }
}

// ── Operators ──────────────────────────────────────────────────────────

fn loose_eq(left: &ScriptValue, right: &ScriptValue) -> bool {
    use ScriptValue::*;
    match (left, right) {
        (Undefined | Null, Undefined | Null) => true,
        (Undefined | Null, _) | (_, Undefined | Null) => false,
        (String(a), String(b)) => a == b,
        (Number(_) | Bool(_) | String(_), Number(_) | Bool(_) | String(_)) => {
            left.to_number() == right.to_number()
        }
        _ => left == right,
    }
}

fn strict_eq(left: &ScriptValue, right: &ScriptValue) -> bool {
    match (left, right) {
        (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
        _ => std::mem::discriminant(left) == std::mem::discriminant(right) && left == right,
    }
}

fn compare(left: &ScriptValue, right: &ScriptValue, op: &str) -> bool {
    let ordering = match (left, right) {
        (ScriptValue::String(a), ScriptValue::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn binary(op: &str, left: &ScriptValue, right: &ScriptValue) -> RuleResult<ScriptValue> {
    Ok(match op {
        "+" => {
            let stringy = |v: &ScriptValue| {
                matches!(
                    v,
                    ScriptValue::String(_) | ScriptValue::Array(_) | ScriptValue::Object(_)
                )
            };
            if stringy(left) || stringy(right) {
                let (left, right) = (left.to_string(), right.to_string());
                ensure_len(left.len().saturating_add(right.len()))?;
                ScriptValue::String(left + &right)
            } else {
                ScriptValue::Number(left.to_number() + right.to_number())
            }
        }
        "-" => ScriptValue::Number(left.to_number() - right.to_number()),
        "*" => ScriptValue::Number(left.to_number() * right.to_number()),
        "/" => ScriptValue::Number(left.to_number() / right.to_number()),
        "%" => ScriptValue::Number(left.to_number() % right.to_number()),
        "==" => ScriptValue::Bool(loose_eq(left, right)),
        "!=" => ScriptValue::Bool(!loose_eq(left, right)),
        "===" => ScriptValue::Bool(strict_eq(left, right)),
        "!==" => ScriptValue::Bool(!strict_eq(left, right)),
        _ => ScriptValue::Bool(compare(left, right, op)),
    })
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn member(object: &ScriptValue, name: &str) -> ScriptValue {
    match (object, name) {
        (ScriptValue::String(s), "length") => ScriptValue::Number(char_len(s) as f64),
        (ScriptValue::Array(items), "length") => ScriptValue::Number(items.len() as f64),
        (ScriptValue::Object(_), key) => object.get(key),
        _ => ScriptValue::Undefined,
    }
}

fn index_value(object: &ScriptValue, index: &ScriptValue) -> ScriptValue {
    match object {
        ScriptValue::Array(items) => usize_arg(index)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(ScriptValue::Undefined),
        ScriptValue::String(s) => usize_arg(index)
            .and_then(|i| s.chars().nth(i))
            .map(|c| ScriptValue::String(c.to_string()))
            .unwrap_or(ScriptValue::Undefined),
        ScriptValue::Object(_) => object.get(&index.to_string()),
        _ => ScriptValue::Undefined,
    }
}

fn usize_arg(value: &ScriptValue) -> Option<usize> {
    let n = value.to_number();
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn arg(args: &[ScriptValue], i: usize) -> ScriptValue {
    args.get(i).cloned().unwrap_or(ScriptValue::Undefined)
}

fn string_arg(args: &[ScriptValue], i: usize) -> String {
    match args.get(i) {
        Some(value) => value.to_string(),
        None => "undefined".to_string(),
    }
}

/// JS relative index: negative counts from the end, result clamped to `0..=len`.
fn relative_index(value: &ScriptValue, len: usize) -> usize {
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    let len = len as f64;
    let resolved = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
    resolved as usize
}

fn compile_regex(source: &str, ignore_case: bool) -> RuleResult<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| RuleError::invalid_regex(source, e))
}

// ── Functions ──────────────────────────────────────────────────────────

/// Characters `encodeURIComponent` leaves alone besides alphanumerics.
const URI_COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `encodeURI` also keeps the reserved URI characters.
const URI_SET: &AsciiSet = &URI_COMPONENT_SET
    .remove(b';')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b',')
    .remove(b'#');

fn percent_encode(input: &str, set: &'static AsciiSet) -> String {
    utf8_percent_encode(input, set).to_string()
}

/// Every `%` must start a two-digit hex escape and the bytes must be UTF-8.
fn percent_decode(input: &str) -> RuleResult<String> {
    let malformed = input.match_indices('%').any(|(i, _)| {
        !input
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
    });
    if malformed {
        return Err(error("URI malformed"));
    }
    percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| error("URI malformed"))
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, text) = match radix {
        Some(16) | None if text.starts_with("0x") || text.starts_with("0X") => (16, &text[2..]),
        Some(r) if (2..=36).contains(&r) => (r, text),
        Some(_) => return f64::NAN,
        None => (10, text),
    };
    let digits: String = text.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    if negative { -value } else { value }
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return f64::NAN;
    }
    text[..end].trim_end_matches('.').parse().unwrap_or(f64::NAN)
}

fn time_format(value: &ScriptValue) -> RuleResult<String> {
    let millis = match value {
        ScriptValue::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        other => other.to_number(),
    };
    if !millis.is_finite() {
        return Err(error(format!("invalid timestamp '{value}'")));
    }
    let time = DateTime::from_timestamp_millis(millis as i64)
        .ok_or_else(|| error(format!("timestamp out of range: {value}")))?;
    Ok(time.format("%Y/%m/%d %H:%M").to_string())
}

fn math(args: &[ScriptValue], f: impl Fn(f64) -> f64) -> ScriptValue {
    ScriptValue::Number(f(arg(args, 0).to_number()))
}

fn call_function(name: &str, args: &[ScriptValue]) -> RuleResult<ScriptValue> {
    let name = name.strip_prefix("java.").unwrap_or(name);
    let value: ScriptValue = match name {
        "encodeURIComponent" => percent_encode(&string_arg(args, 0), URI_COMPONENT_SET).into(),
        "encodeURI" => percent_encode(&string_arg(args, 0), URI_SET).into(),
        "decodeURIComponent" | "decodeURI" => percent_decode(&string_arg(args, 0))?.into(),
        "base64Encode" | "btoa" => STANDARD.encode(string_arg(args, 0)).into(),
        "base64Decode" | "atob" => {
            let bytes = STANDARD
                .decode(string_arg(args, 0).trim())
                .map_err(|e| error(format!("invalid base64: {e}")))?;
            String::from_utf8_lossy(&bytes).into_owned().into()
        }
        "timeFormat" => time_format(&arg(args, 0))?.into(),
        "parseInt" => {
            let radix = args.get(1).map(|r| r.to_number() as u32);
            parse_int(&string_arg(args, 0), radix).into()
        }
        "parseFloat" => parse_float(&string_arg(args, 0)).into(),
        "String" => args.first().map(ToString::to_string).unwrap_or_default().into(),
        "Number" => args.first().map_or(0.0, ScriptValue::to_number).into(),
        "isNaN" => arg(args, 0).to_number().is_nan().into(),
        "log" => {
            debug!(message = %string_arg(args, 0), "script log");
            arg(args, 0)
        }
        "Math.floor" => math(args, f64::floor),
        "Math.ceil" => math(args, f64::ceil),
        "Math.round" => math(args, |n| (n + 0.5).floor()),
        "Math.abs" => math(args, f64::abs),
        "Math.max" => ScriptValue::Number(
            args.iter()
                .map(ScriptValue::to_number)
                .fold(f64::NEG_INFINITY, f64::max),
        ),
        "Math.min" => ScriptValue::Number(
            args.iter()
                .map(ScriptValue::to_number)
                .fold(f64::INFINITY, f64::min),
        ),
        "JSON.stringify" => arg(args, 0).to_json().to_string().into(),
        "JSON.parse" => {
            let parsed: serde_json::Value = serde_json::from_str(&string_arg(args, 0))?;
            ScriptValue::from_json(&parsed)
        }
        other => return Err(error(format!("{other} is not a function"))),
    };
    Ok(value)
}

// ── Methods ────────────────────────────────────────────────────────────

fn call_method(receiver: &ScriptValue, name: &str, args: &[ScriptValue]) -> RuleResult<ScriptValue> {
    if name == "toString" {
        return Ok(receiver.to_string().into());
    }
    match receiver {
        ScriptValue::String(s) => string_method(s, name, args),
        ScriptValue::Array(items) => array_method(items, name, args),
        ScriptValue::Number(n) if name == "toFixed" => {
            let digits = usize_arg(&arg(args, 0)).unwrap_or(0).min(100);
            Ok(format!("{n:.digits$}").into())
        }
        other => Err(error(format!("{name} is not a method of {}", type_of(other)))),
    }
}

fn string_method(s: &str, name: &str, args: &[ScriptValue]) -> RuleResult<ScriptValue> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let substr = |start: usize, end: usize| -> String { chars[start..end].iter().collect() };

    let value: ScriptValue = match name {
        "trim" => s.trim().into(),
        "trimStart" => s.trim_start().into(),
        "trimEnd" => s.trim_end().into(),
        "toUpperCase" => s.to_uppercase().into(),
        "toLowerCase" => s.to_lowercase().into(),
        "charAt" => usize_arg(&arg(args, 0))
            .and_then(|i| chars.get(i))
            .map(char::to_string)
            .unwrap_or_default()
            .into(),
        "substring" => {
            let clamp = |v: &ScriptValue| {
                let n = v.to_number();
                if n.is_nan() { 0 } else { n.clamp(0.0, len as f64) as usize }
            };
            let a = clamp(&arg(args, 0));
            let b = args.get(1).filter(|v| **v != ScriptValue::Undefined).map_or(len, clamp);
            substr(a.min(b), a.max(b)).into()
        }
        "slice" => {
            let a = relative_index(&arg(args, 0), len);
            let b = args
                .get(1)
                .filter(|v| **v != ScriptValue::Undefined)
                .map_or(len, |v| relative_index(v, len));
            if a < b { substr(a, b).into() } else { String::new().into() }
        }
        "substr" => {
            let a = relative_index(&arg(args, 0), len);
            let count = args.get(1).map_or(len, |v| usize_arg(v).unwrap_or(0));
            substr(a, (a + count).min(len)).into()
        }
        "indexOf" => {
            let needle = string_arg(args, 0);
            s.find(&needle)
                .map_or(-1.0, |byte| char_len(&s[..byte]) as f64)
                .into()
        }
        "lastIndexOf" => {
            let needle = string_arg(args, 0);
            s.rfind(&needle)
                .map_or(-1.0, |byte| char_len(&s[..byte]) as f64)
                .into()
        }
        "includes" => s.contains(&string_arg(args, 0)).into(),
        "startsWith" => s.starts_with(&string_arg(args, 0)).into(),
        "endsWith" => s.ends_with(&string_arg(args, 0)).into(),
        "repeat" => {
            let count = usize_arg(&arg(args, 0)).unwrap_or(0);
            ensure_len(s.len().saturating_mul(count))?;
            s.repeat(count).into()
        }
        "padStart" | "padEnd" => {
            let target = usize_arg(&arg(args, 0)).unwrap_or(0);
            let fill = match args.get(1) {
                Some(v) => v.to_string(),
                None => " ".to_string(),
            };
            if target <= len || fill.is_empty() {
                s.into()
            } else {
                let missing = target - len;
                let cycles = missing.div_ceil(char_len(&fill));
                ensure_len(s.len().saturating_add(cycles.saturating_mul(fill.len())))?;
                let pad: String = fill.chars().cycle().take(missing).collect();
                if name == "padStart" {
                    format!("{pad}{s}").into()
                } else {
                    format!("{s}{pad}").into()
                }
            }
        }
        "split" => {
            let parts: Vec<ScriptValue> = match arg(args, 0) {
                ScriptValue::Undefined => vec![s.into()],
                ScriptValue::Regex {
                    source,
                    ignore_case,
                    ..
                } => compile_regex(&source, ignore_case)?
                    .split(s)
                    .take(MAX_ARRAY_LEN + 1)
                    .map(ScriptValue::from)
                    .collect(),
                sep => {
                    let sep = sep.to_string();
                    if sep.is_empty() {
                        chars
                            .iter()
                            .take(MAX_ARRAY_LEN + 1)
                            .map(|c| ScriptValue::from(c.to_string()))
                            .collect()
                    } else {
                        s.split(sep.as_str())
                            .take(MAX_ARRAY_LEN + 1)
                            .map(ScriptValue::from)
                            .collect()
                    }
                }
            };
            if parts.len() > MAX_ARRAY_LEN {
                return Err(error(format!("split produced more than {MAX_ARRAY_LEN} parts")));
            }
            ScriptValue::Array(parts)
        }
        "replace" | "replaceAll" => {
            let replacement = string_arg(args, 1);
            match arg(args, 0) {
                ScriptValue::Regex {
                    source,
                    global,
                    ignore_case,
                } => {
                    let re = compile_regex(&source, ignore_case)?;
                    let all = global || name == "replaceAll";
                    replace_bounded(&re, s, &replacement, all)?.into()
                }
                pattern => {
                    let pattern = pattern.to_string();
                    let matches = if pattern.is_empty() {
                        len + 1
                    } else {
                        s.matches(pattern.as_str()).count()
                    };
                    let matches = if name == "replaceAll" { matches } else { matches.min(1) };
                    ensure_len(s.len().saturating_add(matches.saturating_mul(replacement.len())))?;
                    if name == "replaceAll" {
                        s.replace(&pattern, &replacement).into()
                    } else {
                        s.replacen(&pattern, &replacement, 1).into()
                    }
                }
            }
        }
        "match" => {
            let (source, ignore_case) = match arg(args, 0) {
                ScriptValue::Regex {
                    source,
                    ignore_case,
                    ..
                } => (source, ignore_case),
                other => (regex::escape(&other.to_string()), false),
            };
            let re = compile_regex(&source, ignore_case)?;
            match re.captures(s) {
                Some(caps) => ScriptValue::Array(
                    caps.iter()
                        .map(|m| m.map_or(ScriptValue::Undefined, |m| m.as_str().into()))
                        .collect(),
                ),
                None => ScriptValue::Null,
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                let a = a.to_string();
                ensure_len(out.len().saturating_add(a.len()))?;
                out.push_str(&a);
            }
            out.into()
        }
        other => return Err(error(format!("{other} is not a string method"))),
    };
    Ok(value)
}

fn array_method(items: &[ScriptValue], name: &str, args: &[ScriptValue]) -> RuleResult<ScriptValue> {
    let value: ScriptValue = match name {
        "join" => {
            let sep = match args.first() {
                Some(ScriptValue::Undefined) | None => ",".to_string(),
                Some(sep) => sep.to_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    ScriptValue::Undefined | ScriptValue::Null => String::new(),
                    other => other.to_string(),
                })
                .collect();
            let total = parts
                .iter()
                .map(String::len)
                .fold(0usize, usize::saturating_add)
                .saturating_add(sep.len().saturating_mul(parts.len().saturating_sub(1)));
            ensure_len(total)?;
            parts.join(sep.as_str()).into()
        }
        "indexOf" => {
            let needle = arg(args, 0);
            items
                .iter()
                .position(|item| strict_eq(item, &needle))
                .map_or(-1.0, |i| i as f64)
                .into()
        }
        "includes" => {
            let needle = arg(args, 0);
            items.iter().any(|item| strict_eq(item, &needle)).into()
        }
        "slice" => {
            let len = items.len();
            let a = relative_index(&arg(args, 0), len);
            let b = args.get(1).map_or(len, |v| relative_index(v, len));
            ScriptValue::Array(if a < b { items[a..b].to_vec() } else { Vec::new() })
        }
        "reverse" => ScriptValue::Array(items.iter().rev().cloned().collect()),
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    ScriptValue::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            ScriptValue::Array(out)
        }
        other => return Err(error(format!("{other} is not an array method"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse::{Parser, tokenize};

    #[test]
    fn test_percent_round_trip() {
        let encoded = percent_encode("a b/é", URI_COMPONENT_SET);
        assert_eq!(encoded, "a%20b%2F%C3%A9");
        assert_eq!(percent_encode("a b/?x=1#f", URI_SET), "a%20b/?x=1#f");
        assert_eq!(percent_encode("it's (ok)!", URI_COMPONENT_SET), "it's%20(ok)!");
        assert_eq!(percent_decode(&encoded).unwrap(), "a b/é");
        assert!(percent_decode("%E0%A4").is_err());
        assert!(percent_decode("%zz").is_err());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("  -7", None), -7.0);
        assert_eq!(parse_int("ff", Some(16)), 255.0);
        assert_eq!(parse_int("0x10", None), 16.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.25kg"), 3.25);
        assert_eq!(parse_float("-1."), -1.0);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_loose_and_strict_equality() {
        let one = ScriptValue::Number(1.0);
        let text = ScriptValue::from("1");
        assert!(loose_eq(&one, &text));
        assert!(!strict_eq(&one, &text));
        assert!(loose_eq(&ScriptValue::Null, &ScriptValue::Undefined));
        assert!(!strict_eq(&ScriptValue::Number(f64::NAN), &ScriptValue::Number(f64::NAN)));
    }

    #[test]
    fn test_time_format() {
        assert_eq!(
            time_format(&ScriptValue::Number(0.0)).unwrap(),
            "1970/01/01 00:00"
        );
        assert_eq!(
            time_format(&ScriptValue::from("1700000000000")).unwrap(),
            "2023/11/14 22:13"
        );
        assert!(time_format(&ScriptValue::from("soon")).is_err());
    }

    #[test]
    fn test_binary_concatenation_is_bounded() {
        let half = ScriptValue::from("x".repeat(MAX_STRING_LEN / 2 + 1));
        assert!(binary("+", &half, &half).is_err());
        let small = ScriptValue::from("ab");
        assert_eq!(
            binary("+", &small, &ScriptValue::Number(1.0)).unwrap(),
            ScriptValue::from("ab1")
        );
    }

    #[test]
    fn test_string_growth_is_bounded() {
        let s = "abcdefgh";
        let huge = [ScriptValue::Number(65536.0)];
        let grown = string_method(s, "repeat", &huge).unwrap();
        assert_eq!(grown.to_string().len(), 8 * 65536);
        assert!(string_method(&grown.to_string(), "repeat", &huge).is_err());

        let width = [ScriptValue::Number((MAX_STRING_LEN + 1) as f64)];
        assert!(string_method(s, "padStart", &width).is_err());

        let items = vec![ScriptValue::from(grown.to_string()); 64];
        assert!(array_method(&items, "join", &[]).is_err());

        let long_pattern = [
            ScriptValue::Regex {
                source: "(.)".to_string(),
                global: true,
                ignore_case: false,
            },
            ScriptValue::from("$1".repeat(1024)),
        ];
        assert!(string_method(&grown.to_string(), "replace", &long_pattern).is_err());
    }

    #[test]
    fn test_run_budget() {
        let context = ParseContext::new();
        let script = "let a = value.repeat(4194304); let b = a; let c = a; let d = a; let e = a; e";
        let program = Parser::new(tokenize(script).unwrap()).program().unwrap();
        let mut interpreter = Interpreter::new(&context);
        interpreter.bind("value", ScriptValue::from("abcd"));
        assert!(interpreter.run(&program).is_err());
    }

    fn run(script: &str, value: &str) -> RuleResult<ScriptValue> {
        let context = ParseContext::new();
        let program = Parser::new(tokenize(script)?).program()?;
        let mut interpreter = Interpreter::new(&context);
        interpreter.bind("value", ScriptValue::from(value));
        interpreter.run(&program)
    }

    #[test]
    fn test_declared_functions() {
        let script = "wrap(value, '[') ; function wrap(s, open) { return open + s + ']' }";
        assert_eq!(run(script, "x").unwrap(), ScriptValue::from("[x]"));

        let script = "function f(n) { if (n < 1) { return 0 } return n + f(n - 1) } f(4)";
        assert_eq!(run(script, "").unwrap(), ScriptValue::Number(10.0));

        // Parameters do not outlive the call.
        let script = "function id(value) { return value } id('inner') + value";
        assert_eq!(run(script, "outer").unwrap(), ScriptValue::from("innerouter"));
    }

    #[test]
    fn test_runaway_recursion_fails() {
        assert!(run("function f() { return f() } f()", "").is_err());
        let fib =
            "function fib(n) { if (n < 2) { return n } return fib(n - 1) + fib(n - 2) } fib(30)";
        assert!(run(fib, "").is_err());
    }
}
