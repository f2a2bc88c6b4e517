use std::fmt;

use serde_json::Value;

use super::format_number;

/// Runtime value of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(Vec<(String, ScriptValue)>),
    Regex {
        source: String,
        global: bool,
        ignore_case: bool,
    },
}

impl ScriptValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(*b),
            Value::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => ScriptValue::String(s.clone()),
            Value::Array(items) => ScriptValue::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => ScriptValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9e15 {
                    Value::from(*n as i64)
                } else {
                    Value::from(*n)
                }
            }
            ScriptValue::String(s) => Value::String(s.clone()),
            ScriptValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ScriptValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ScriptValue::Regex { source, .. } => Value::String(source.clone()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(b) => f64::from(u8::from(*b)),
            ScriptValue::Number(n) => *n,
            ScriptValue::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64)
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            ScriptValue::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ScriptValue::String(_))
    }

    /// Approximate heap bytes held by the value.
    pub(crate) fn weight(&self) -> usize {
        const SLOT: usize = 16;
        match self {
            ScriptValue::String(s) => s.len(),
            ScriptValue::Regex { source, .. } => source.len(),
            ScriptValue::Array(items) => items
                .iter()
                .map(|item| item.weight().saturating_add(SLOT))
                .fold(0, usize::saturating_add),
            ScriptValue::Object(entries) => entries
                .iter()
                .map(|(k, v)| k.len().saturating_add(v.weight()).saturating_add(SLOT))
                .fold(0, usize::saturating_add),
            _ => 0,
        }
    }

    pub fn get(&self, key: &str) -> ScriptValue {
        match self {
            ScriptValue::Object(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(ScriptValue::Undefined),
            _ => ScriptValue::Undefined,
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => f.write_str("undefined"),
            ScriptValue::Null => f.write_str("null"),
            ScriptValue::Bool(b) => write!(f, "{b}"),
            ScriptValue::Number(n) => f.write_str(&format_number(*n)),
            ScriptValue::String(s) => f.write_str(s),
            ScriptValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        ScriptValue::Undefined | ScriptValue::Null => {}
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
            ScriptValue::Object(_) => f.write_str("[object Object]"),
            ScriptValue::Regex {
                source,
                global,
                ignore_case,
            } => {
                write!(f, "/{source}/")?;
                if *global {
                    f.write_str("g")?;
                }
                if *ignore_case {
                    f.write_str("i")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}
