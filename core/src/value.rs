//! Dynamic values flowing through state, expressions and the DOM.
//!
//! [`Value`] mirrors the small slice of script semantics the template language
//! needs: truthiness, string and number coercion, strict/loose equality and
//! `typeof`. Containers are always [`Target`]s so they can be observed in place.

use std::{fmt, rc::Rc};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::{dom::NodeId, target::Target};

/// Signature of a host-provided callable.
pub type NativeFn = dyn Fn(&[Value]) -> anyhow::Result<Value>;

/// A named callable value (component method, global helper, bound builtin).
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    /// Wraps a closure into a callable value.
    pub fn new(
        name: impl Into<Rc<str>>,
        call: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    /// The name the function was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying closure produced.
    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.call)(args)
    }

    /// Returns `true` when both handles point at the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// A dynamically typed value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Undefined,
    /// An explicit empty value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double precision number.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered sequence.
    Array(Target),
    /// A string-keyed mapping preserving insertion order.
    Object(Target),
    /// A live DOM node.
    Node(NodeId),
    /// A callable.
    Function(Function),
}

impl Value {
    /// Returns `true` for `undefined` and `null`.
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Script truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Node(_) | Self::Function(_) => true,
        }
    }

    /// The `typeof` name of this value.
    #[must_use]
    pub const fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Node(_) => "object",
        }
    }

    /// Returns the container behind an array or object value.
    #[must_use]
    pub const fn as_target(&self) -> Option<&Target> {
        match self {
            Self::Array(target) | Self::Object(target) => Some(target),
            _ => None,
        }
    }

    /// Returns the string slice of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric coercion.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s),
            Self::Array(target) => match target.len() {
                0 => 0.0,
                1 => target.get_index(0).to_number(),
                _ => f64::NAN,
            },
            Self::Undefined | Self::Object(_) | Self::Node(_) | Self::Function(_) => f64::NAN,
        }
    }

    /// String coercion, the way interpolation prints values.
    #[must_use]
    pub fn to_display(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(target) => target
                .values()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Node(_) => "[object Node]".to_string(),
            Self::Function(f) => format!("function {}()", f.name()),
        }
    }

    /// `===` comparison: same type and value, identity for containers.
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) | (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Node(a), Self::Node(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==` comparison with the usual primitive coercions.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Self::Number(_), Self::String(_))
            | (Self::String(_), Self::Number(_))
            | (Self::Bool(_), _)
            | (_, Self::Bool(_)) => {
                #[allow(clippy::float_cmp)]
                let equal = self.to_number() == other.to_number();
                equal
            }
            (Self::Array(_) | Self::Object(_), Self::String(_) | Self::Number(_)) => {
                Self::String(self.to_display()).loose_eq(other)
            }
            (Self::String(_) | Self::Number(_), Self::Array(_) | Self::Object(_)) => {
                self.loose_eq(&Self::String(other.to_display()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// Canonical serialization, used for deep value comparison and hashing.
    #[must_use]
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deep value equality through [`Value::canonical`].
    #[must_use]
    pub fn deep_eq(&self, other: &Self) -> bool {
        self.strict_eq(other) || self.canonical() == other.canonical()
    }

    /// Builds a value from JSON, allocating fresh (unobserved) containers.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(Target::from_values(items.into_iter().map(Self::from_json)))
            }
            serde_json::Value::Object(map) => Self::Object(Target::from_entries(
                map.into_iter().map(|(k, v)| (k, Self::from_json(v))),
            )),
        }
    }

    /// Converts into JSON; nodes, functions and `undefined` become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serde_json::Value::from(*n as i64)
            }
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(target) => {
                serde_json::Value::Array(target.values().iter().map(Self::to_json).collect())
            }
            Self::Object(target) => serde_json::Value::Object(
                target
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Self::Undefined | Self::Null | Self::Node(_) | Self::Function(_) => {
                serde_json::Value::Null
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined => serializer.serialize_unit_variant("Value", 0, "undefined"),
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(target) => {
                let values = target.values();
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in &values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Self::Object(target) => {
                let entries = target.entries();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Node(id) => serializer.serialize_newtype_variant(
                "Value",
                7,
                "node",
                &(id.index(), id.generation()),
            ),
            Self::Function(f) => {
                serializer.serialize_newtype_variant("Value", 8, "function", f.name())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// Formats a number the way script string conversion does.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// Parses a string with script `Number()` rules (blank is zero, junk is NaN).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
            }
            if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            trimmed.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Target> for Value {
    fn from(value: Target) -> Self {
        if value.is_list() {
            Self::Array(value)
        } else {
            Self::Object(value)
        }
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Self::Function(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}
