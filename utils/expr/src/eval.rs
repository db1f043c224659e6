//! Scope chain and tree-walking interpreter.
//!
//! Names resolve through a fixed chain, innermost first:
//!
//! 1. caller locals (loop and slot bindings),
//! 2. fields of the component `state`,
//! 3. component instance members ([`Scope::member`]),
//! 4. process globals.
//!
//! Unknown names evaluate to `undefined`.

use indexmap::IndexMap;
use rill_core::{Target, Value, value::format_number};

use crate::{
    ast::{AssignOp, BinaryOp, Expr, Literal, LogicalOp, UnaryOp},
    builtins::{Globals, builtin_property, call_method},
    error::EvalError,
};

/// Locally bound names (loop variables, slot bindings).
pub type Locals = IndexMap<String, Value>;

/// Instance members exposed to expressions by a component.
pub trait Scope {
    /// Resolves an instance member such as a method or `$event`.
    fn member(&self, name: &str) -> Option<Value>;
}

/// The ordered lookup chain an expression is evaluated against.
#[derive(Clone, Copy)]
pub struct ScopeChain<'a> {
    globals: &'a Globals,
    component: Option<&'a dyn Scope>,
    state: Option<&'a Target>,
    locals: Option<&'a Locals>,
}

impl std::fmt::Debug for ScopeChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeChain")
            .field("component", &self.component.is_some())
            .field("state", &self.state)
            .field("locals", &self.locals.map(|l| l.keys().collect::<Vec<_>>()))
            .finish_non_exhaustive()
    }
}

impl<'a> ScopeChain<'a> {
    /// A chain holding only the globals.
    #[must_use]
    pub const fn new(globals: &'a Globals) -> Self {
        Self {
            globals,
            component: None,
            state: None,
            locals: None,
        }
    }

    /// Adds the component instance.
    #[must_use]
    pub const fn with_component(mut self, component: &'a dyn Scope) -> Self {
        self.component = Some(component);
        self
    }

    /// Adds the component state.
    #[must_use]
    pub const fn with_state(mut self, state: &'a Target) -> Self {
        self.state = Some(state);
        self
    }

    /// Adds caller locals.
    #[must_use]
    pub const fn with_locals(mut self, locals: &'a Locals) -> Self {
        self.locals = Some(locals);
        self
    }

    /// Resolves `name` through the chain.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.locals.and_then(|locals| locals.get(name)) {
            return value.clone();
        }
        if let Some(state) = self.state
            && state.has(name)
        {
            return state.get(name);
        }
        if let Some(value) = self.component.and_then(|c| c.member(name)) {
            return value;
        }
        self.globals.get(name).unwrap_or_default()
    }

    /// Assigns a bare identifier: always a `state` field.
    ///
    /// # Errors
    ///
    /// Fails for locals, without a state, or when the write is denied.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), EvalError> {
        if self.locals.is_some_and(|locals| locals.contains_key(name)) {
            return Err(EvalError::AssignToLocal(name.to_string()));
        }
        let state = self
            .state
            .ok_or_else(|| EvalError::InvalidTarget(name.to_string()))?;
        if state.set(name, value) {
            Ok(())
        } else {
            Err(EvalError::Denied(name.to_string()))
        }
    }
}

/// Evaluates `expr`; `args` feeds [`Expr::Arg`] placeholders.
pub fn evaluate(expr: &Expr, chain: &ScopeChain<'_>, args: &[Value]) -> Result<Value, EvalError> {
    Interpreter { chain, args }.eval(expr)
}

struct Interpreter<'c, 'a> {
    chain: &'c ScopeChain<'a>,
    args: &'c [Value],
}

/// A resolved assignment target.
enum Place {
    Name(String),
    Property(Value, String),
}

impl Interpreter<'_, '_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::String(s.clone()),
            }),
            Expr::Ident(name) => Ok(self.chain.lookup(name)),
            Expr::Arg(index) => Ok(self.args.get(*index).cloned().unwrap_or_default()),
            Expr::Array(items) => {
                let values = items.iter().map(|i| self.eval(i)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(Target::from_values(values)))
            }
            Expr::Object(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    values.push((key.clone(), self.eval(value)?));
                }
                Ok(Value::Object(Target::from_entries(values)))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                get_property(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let key = property_key(&self.eval(index)?);
                get_property(&object, &key)
            }
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::from(value.type_of()),
                })
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit { Ok(left) } else { self.eval(right) }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign(op, target, value) => self.assign(*op, target, value),
            Expr::Pipe {
                input,
                name,
                filter,
                args,
            } => {
                let input = self.eval(input)?;
                let args = self.eval_all(args)?;
                let filter = filter
                    .as_ref()
                    .ok_or_else(|| EvalError::UnknownFilter(name.clone()))?;
                Ok(filter.apply(&input, &args)?)
            }
            Expr::Sequence(statements) => {
                let mut last = Value::Undefined;
                for statement in statements {
                    last = self.eval(statement)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Value, EvalError> {
        let (receiver, name) = match callee {
            Expr::Member(object, name) => (Some(self.eval(object)?), name.clone()),
            Expr::Index(object, index) => {
                let receiver = self.eval(object)?;
                (Some(receiver), property_key(&self.eval(index)?))
            }
            _ => (None, describe(callee)),
        };
        let args = self.eval_all(args)?;

        let function = match receiver {
            Some(receiver) => {
                if let Some(result) = call_method(&receiver, &name, &args) {
                    return Ok(result?);
                }
                get_property(&receiver, &name)?
            }
            None => self.eval(callee)?,
        };
        match function {
            Value::Function(function) => Ok(function.call(&args)?),
            _ => Err(EvalError::NotCallable(name)),
        }
    }

    fn place(&self, target: &Expr) -> Result<Place, EvalError> {
        match target {
            Expr::Ident(name) => Ok(Place::Name(name.clone())),
            Expr::Member(object, name) => Ok(Place::Property(self.eval(object)?, name.clone())),
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                Ok(Place::Property(object, property_key(&self.eval(index)?)))
            }
            other => Err(EvalError::InvalidTarget(describe(other))),
        }
    }

    fn assign(&self, op: AssignOp, target: &Expr, value: &Expr) -> Result<Value, EvalError> {
        let place = self.place(target)?;
        let value = self.eval(value)?;
        let value = match op {
            AssignOp::Set => value,
            AssignOp::Add | AssignOp::Sub => {
                let current = match &place {
                    Place::Name(name) => self.chain.lookup(name),
                    Place::Property(object, key) => get_property(object, key)?,
                };
                let op = if op == AssignOp::Add { BinaryOp::Add } else { BinaryOp::Sub };
                binary(op, &current, &value)
            }
        };
        match place {
            Place::Name(name) => self.chain.assign(&name, value.clone())?,
            Place::Property(object, key) => set_property(&object, &key, value.clone())?,
        }
        Ok(value)
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member(object, name) => format!("{}.{name}", describe(object)),
        Expr::Index(object, _) => format!("{}[...]", describe(object)),
        Expr::Call(callee, _) => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

/// Converts an index value into a property name.
#[must_use]
pub fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

/// Reads `name` from `object`, including built-in properties.
///
/// # Errors
///
/// Fails when `object` is `undefined` or `null`.
pub fn get_property(object: &Value, name: &str) -> Result<Value, EvalError> {
    match object {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            property: name.to_string(),
            on: nullish_name(object),
        }),
        Value::Array(target) | Value::Object(target) => Ok(target.get(name)),
        other => Ok(builtin_property(other, name).unwrap_or_default()),
    }
}

/// Writes `name` on `object`.
///
/// # Errors
///
/// Fails for primitives, `undefined`/`null`, and denied writes.
pub fn set_property(object: &Value, name: &str, value: Value) -> Result<(), EvalError> {
    match object {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            property: name.to_string(),
            on: nullish_name(object),
        }),
        Value::Array(target) | Value::Object(target) => {
            if target.set(name, value) {
                Ok(())
            } else {
                Err(EvalError::Denied(name.to_string()))
            }
        }
        _ => Err(EvalError::InvalidTarget(name.to_string())),
    }
}

const fn nullish_name(value: &Value) -> &'static str {
    if matches!(value, Value::Null) { "null" } else { "undefined" }
}

/// Converts containers, nodes and functions into their string form.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Node(_) | Value::Function(_) => {
            Value::String(value.to_display())
        }
        other => other.clone(),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(left.to_display() + &right.to_display())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            let ordering = match (&left, &right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(ordering.is_some_and(|ordering| match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filter::FilterRegistry, parser::parse_statements, parser::parse_expression};
    use rill_core::Function;
    use serde_json::json;

    struct Instance;

    impl Scope for Instance {
        fn member(&self, name: &str) -> Option<Value> {
            match name {
                "greet" => Some(Value::Function(Function::new("greet", |args| {
                    Ok(Value::from(format!("hi {}", args[0])))
                }))),
                "x" => Some(Value::from("instance")),
                _ => None,
            }
        }
    }

    fn state(json: serde_json::Value) -> Target {
        Value::from_json(json).as_target().cloned().expect("object")
    }

    fn eval_with(source: &str, chain: &ScopeChain<'_>) -> Result<Value, EvalError> {
        let expr = parse_statements(source, &FilterRegistry::with_defaults()).expect("parse");
        evaluate(&expr, chain, &[])
    }

    #[test]
    fn locals_shadow_state_shadow_instance_shadow_globals() {
        let globals = Globals::with_defaults();
        globals.define("x", Value::from("global"));
        let instance = Instance;
        let state = state(json!({"x": 1}));
        let mut locals = Locals::new();
        locals.insert("x".to_string(), Value::from(2));

        let base = ScopeChain::new(&globals);
        assert_eq!(eval_with("x", &base).expect("eval").to_display(), "global");
        let with_instance = base.with_component(&instance);
        assert_eq!(eval_with("x", &with_instance).expect("eval").to_display(), "instance");
        let with_state = with_instance.with_state(&state);
        assert_eq!(eval_with("x", &with_state).expect("eval").to_display(), "1");
        let with_locals = with_state.with_locals(&locals);
        assert_eq!(eval_with("x", &with_locals).expect("eval").to_display(), "2");
    }

    #[test]
    fn assignment_writes_state_and_refuses_locals() {
        let globals = Globals::new();
        let state = state(json!({"count": 1, "user": {"tags": []}}));
        let mut locals = Locals::new();
        locals.insert("item".to_string(), Value::from(1));
        let chain = ScopeChain::new(&globals).with_state(&state).with_locals(&locals);

        eval_with("count += 2; user.name = 'a'; user.tags.push('t')", &chain).expect("eval");
        assert_eq!(state.get("count").to_display(), "3");
        assert_eq!(eval_with("user.name + user.tags.length", &chain).expect("eval").to_display(), "a1");
        assert!(matches!(eval_with("item = 2", &chain), Err(EvalError::AssignToLocal(_))));
        assert!(matches!(eval_with("missing.field = 2", &chain), Err(EvalError::NullAccess { .. })));
    }

    #[test]
    fn operators_follow_script_rules() {
        let globals = Globals::with_defaults();
        let chain = ScopeChain::new(&globals);
        let cases = [
            ("1 + '2'", "12"),
            ("'3' * '4'", "12"),
            ("[1, 2] + ''", "1,2"),
            ("null ?? 'fallback'", "fallback"),
            ("0 || 'or'", "or"),
            ("'' && 'never'", ""),
            ("1 == '1'", "true"),
            ("1 === '1'", "false"),
            ("'b' > 'a'", "true"),
            ("typeof greet", "undefined"),
            ("7 % 4", "3"),
            ("Math.max(1, 9, 3)", "9"),
            ("String(12.5)", "12.5"),
            ("'abc'.toUpperCase().length", "3"),
            ("{a: 1}.a ? 'yes' : 'no'", "yes"),
        ];
        for (source, expected) in cases {
            let expr = parse_expression(source, &FilterRegistry::new()).expect(source);
            let value = evaluate(&expr, &chain, &[]).expect(source);
            assert_eq!(value.to_display(), expected, "{source}");
        }
    }

    #[test]
    fn instance_methods_are_callable() {
        let globals = Globals::new();
        let instance = Instance;
        let chain = ScopeChain::new(&globals).with_component(&instance);
        assert_eq!(eval_with("greet('bob')", &chain).expect("eval").to_display(), "hi bob");
        assert!(matches!(eval_with("nope()", &chain), Err(EvalError::NotCallable(_))));
    }

    #[test]
    fn unknown_filters_fail_when_evaluated() {
        let globals = Globals::new();
        let chain = ScopeChain::new(&globals);
        assert!(matches!(
            eval_with("'x' |> nope", &chain),
            Err(EvalError::UnknownFilter(name)) if name == "nope"
        ));
    }
}
