//! Built-in members and process-global helpers.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;
use rill_core::{Function, Target, Value};

// ============================================================================
// Globals
// ============================================================================

/// Process-global names visible to every expression, below all other scopes.
#[derive(Default)]
pub struct Globals {
    values: RefCell<IndexMap<String, Value>>,
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.borrow().keys()).finish()
    }
}

impl Globals {
    /// Creates an empty global table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default table: `String`, `Number`, `Boolean`, `isNaN`,
    /// `parseInt`, `parseFloat`, `Math` and `JSON`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let globals = Self::new();
        globals.define_fn("String", |args| Ok(Value::from(arg(args, 0).to_display())));
        globals.define_fn("Number", |args| Ok(Value::from(arg(args, 0).to_number())));
        globals.define_fn("Boolean", |args| Ok(Value::from(arg(args, 0).is_truthy())));
        globals.define_fn("isNaN", |args| Ok(Value::from(arg(args, 0).to_number().is_nan())));
        globals.define_fn("parseInt", |args| {
            let radix = match arg(args, 1) {
                Value::Undefined => 10.0,
                other => other.to_number(),
            };
            Ok(Value::from(parse_int(&arg(args, 0).to_display(), radix)))
        });
        globals.define_fn("parseFloat", |args| {
            Ok(Value::from(parse_float(&arg(args, 0).to_display())))
        });

        let math = Target::map();
        math.set("min", native("min", |args| {
            Ok(Value::from(args.iter().map(Value::to_number).fold(f64::INFINITY, min)))
        }));
        math.set("max", native("max", |args| {
            Ok(Value::from(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, max)))
        }));
        math.set("floor", native("floor", |args| Ok(Value::from(arg(args, 0).to_number().floor()))));
        math.set("ceil", native("ceil", |args| Ok(Value::from(arg(args, 0).to_number().ceil()))));
        math.set("round", native("round", |args| {
            Ok(Value::from((arg(args, 0).to_number() + 0.5).floor()))
        }));
        math.set("abs", native("abs", |args| Ok(Value::from(arg(args, 0).to_number().abs()))));
        globals.define("Math", Value::Object(math));

        let json = Target::map();
        json.set("stringify", native("stringify", |args| {
            let value = arg(args, 0);
            if matches!(value, Value::Undefined | Value::Function(_)) {
                return Ok(Value::Undefined);
            }
            Ok(Value::from(serde_json::to_string(&value.to_json())?))
        }));
        globals.define("JSON", Value::Object(json));
        globals
    }

    /// Defines (or replaces) a global value.
    pub fn define(&self, name: &str, value: Value) {
        self.values.borrow_mut().insert(name.to_string(), value);
    }

    /// Defines a global function.
    pub fn define_fn(
        &self,
        name: &str,
        call: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    ) {
        self.define(name, native(name, call));
    }

    /// Looks up a global.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }
}

fn native(name: &str, call: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static) -> Value {
    Value::Function(Function::new(name, call))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

fn parse_int(text: &str, radix: f64) -> f64 {
    let text = text.trim();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut radix = if radix.is_nan() || radix == 0.0 { 10 } else { radix as u32 };
    let mut digits = digits;
    if (radix == 16 || radix == 10)
        && let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        radix = 16;
        digits = hex;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut result: Option<f64> = None;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(d));
    }
    result.map_or(f64::NAN, |r| sign * r)
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if text[end..].starts_with("Infinity") {
        return if text.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let mut valid = end;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                valid = end + 1;
            }
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                if matches!(bytes.get(end + 1), Some(b'+' | b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    text[..valid].parse().unwrap_or(f64::NAN)
}

// ============================================================================
// Built-in methods
// ============================================================================

/// Calls a built-in method on a primitive or sequence receiver.
///
/// Returns `None` when `receiver` has no built-in method called `name`.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Option<anyhow::Result<Value>> {
    match receiver {
        Value::String(s) => string_method(s, name, args).map(Ok),
        Value::Array(list) => array_method(list, name, args).map(Ok),
        Value::Number(n) if name == "toFixed" => Some(to_fixed(*n, &arg(args, 0))),
        _ => None,
    }
}

/// Reads a built-in property (`length`, string indices).
pub fn builtin_property(receiver: &Value, name: &str) -> Option<Value> {
    match receiver {
        Value::String(s) if name == "length" => Some(Value::from(s.chars().count())),
        Value::String(s) => name
            .parse::<usize>()
            .ok()
            .map(|i| s.chars().nth(i).map_or(Value::Undefined, |c| Value::from(c.to_string()))),
        Value::Function(f) if name == "name" => Some(Value::from(f.name())),
        _ => None,
    }
}

fn to_fixed(n: f64, digits: &Value) -> anyhow::Result<Value> {
    let digits = if digits.is_nullish() { 0.0 } else { digits.to_number() };
    anyhow::ensure!((0.0..=100.0).contains(&digits), "toFixed() digits out of range");
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let digits = digits as usize;
    Ok(Value::from(format!("{n:.digits$}")))
}

/// Resolves a possibly negative relative index against `len`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn relative(value: &Value, len: usize, default: usize) -> usize {
    if value.is_nullish() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Value> {
    let chars: Vec<char> = s.chars().collect();
    let text = |i: usize| arg(args, i).to_display();
    Some(match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "includes" => Value::from(s.contains(text(0).as_str())),
        "startsWith" => Value::from(s.starts_with(text(0).as_str())),
        "endsWith" => Value::from(s.ends_with(text(0).as_str())),
        "indexOf" => s
            .find(text(0).as_str())
            .map_or(Value::from(-1), |byte| Value::from(s[..byte].chars().count())),
        "slice" => {
            let start = relative(&arg(args, 0), chars.len(), 0);
            let end = relative(&arg(args, 1), chars.len(), chars.len());
            Value::from(chars[start..end.max(start)].iter().collect::<String>())
        }
        "charAt" => {
            let i = relative(&arg(args, 0), chars.len(), 0);
            Value::from(chars.get(i).map(char::to_string).unwrap_or_default())
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::from(s)],
                sep => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::Array(Target::from_values(parts))
        }
        "replace" => Value::from(s.replacen(text(0).as_str(), &text(1), 1)),
        "repeat" => {
            let n = arg(args, 0).to_number();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = if n.is_finite() && n > 0.0 { n as usize } else { 0 };
            Value::from(s.repeat(n))
        }
        _ => return None,
    })
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_eq(b),
    }
}

fn array_method(list: &Target, name: &str, args: &[Value]) -> Option<Value> {
    let len = list.len();
    Some(match name {
        "includes" => Value::from(list.values().iter().any(|v| same_value_zero(v, &arg(args, 0)))),
        "indexOf" => {
            let needle = arg(args, 0);
            list.values()
                .iter()
                .position(|v| v.strict_eq(&needle))
                .map_or(Value::from(-1), Value::from)
        }
        "join" => {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            Value::from(
                list.values()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let start = relative(&arg(args, 0), len, 0);
            let end = relative(&arg(args, 1), len, len);
            let values = list.values();
            Value::Array(Target::from_values(values[start..end.max(start)].to_vec()))
        }
        "concat" => {
            let mut values = list.values();
            for extra in args {
                match extra {
                    Value::Array(other) => values.extend(other.values()),
                    other => values.push(other.clone()),
                }
            }
            Value::Array(Target::from_values(values))
        }
        "push" => {
            let mut new_len = len;
            for value in args {
                new_len = list.push(value.clone());
            }
            Value::from(new_len)
        }
        "pop" => list.pop(),
        "shift" => list.shift(),
        "unshift" => {
            for value in args.iter().rev() {
                list.unshift(value.clone());
            }
            Value::from(list.len())
        }
        "splice" => {
            let start = relative(&arg(args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(value) => {
                    let n = value.to_number();
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let n = if n.is_nan() || n < 0.0 { 0 } else { n as usize };
                    n.min(len - start)
                }
            };
            let items = args.iter().skip(2).cloned().collect();
            Value::Array(Target::from_values(list.splice(start, count, items)))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, name: &str, args: &[Value]) -> Value {
        call_method(&receiver, name, args)
            .expect("builtin")
            .expect("call")
    }

    #[test]
    fn string_methods() {
        let s = Value::from("Hello, world");
        assert_eq!(call(s.clone(), "slice", &[Value::from(-5)]).to_display(), "world");
        assert_eq!(call(s.clone(), "indexOf", &[Value::from("o")]).to_display(), "4");
        assert_eq!(
            call(s.clone(), "split", &[Value::from(", ")]).to_display(),
            "Hello,world"
        );
        assert_eq!(call(s, "replace", &[Value::from("l"), Value::from("L")]).to_display(), "HeLlo, world");
    }

    #[test]
    fn array_methods_mutate_in_place() {
        let list = Target::from_values([Value::from(1), Value::from(2), Value::from(3)]);
        let value = Value::Array(list.clone());
        assert_eq!(call(value.clone(), "push", &[Value::from(4)]).to_display(), "4");
        let removed = call(value.clone(), "splice", &[Value::from(1), Value::from(2)]);
        assert_eq!(removed.to_display(), "2,3");
        assert_eq!(call(value.clone(), "join", &[Value::from("-")]).to_display(), "1-4");
        assert_eq!(call(value, "indexOf", &[Value::from(4)]).to_display(), "1");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn numeric_helpers() {
        assert!((parse_int("42px", 10.0) - 42.0).abs() < f64::EPSILON);
        assert!((parse_int("0x1f", 10.0) - 31.0).abs() < f64::EPSILON);
        assert!(parse_int("px", 10.0).is_nan());
        assert!((parse_float(" 3.5e1rem") - 35.0).abs() < f64::EPSILON);
        assert_eq!(
            call(Value::from(1.005), "toFixed", &[Value::from(1)]).to_display(),
            "1.0"
        );
    }

    #[test]
    fn globals_include_math_and_json() {
        let globals = Globals::with_defaults();
        let math = globals.get("Math").expect("Math");
        let Value::Function(max) = math.as_target().expect("object").get("max") else {
            panic!("max is a function");
        };
        let result = max.call(&[Value::from(1), Value::from(7)]).expect("call");
        assert_eq!(result.to_display(), "7");
        assert!(globals.get("JSON").is_some());
    }
}
