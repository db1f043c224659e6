//! Evaluator factory and cache.
//!
//! Every compiled evaluator is memoized by its form and exact source text, so
//! compiling the same text twice returns the same [`Rc`]. The cache is
//! append-only for the lifetime of the compiler.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use rill_core::Value;

use crate::{
    ast::{AssignOp, Expr},
    builtins::Globals,
    error::{CompileError, EvalError},
    eval::{ScopeChain, evaluate},
    filter::FilterRegistry,
    parser::{parse_expression, parse_statements},
    rewrite::rewrite_stateful_calls,
    template::{Part, Segment, Template, split},
};

/// The shape of a compiled evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// `return <expr>`.
    Getter,
    /// `<path> = <value>`, the value supplied at call time.
    Setter,
    /// `;`-separated statements run for their effects.
    Handler,
}

/// A compiled expression.
#[derive(Debug)]
pub struct Evaluator {
    form: Form,
    source: String,
    body: Expr,
}

impl Evaluator {
    /// The evaluator's form.
    #[must_use]
    pub const fn form(&self) -> Form {
        self.form
    }

    /// The source text this evaluator was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates with positional `args` (the setter value is `args[0]`).
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures.
    pub fn evaluate(&self, chain: &ScopeChain<'_>, args: &[Value]) -> Result<Value, EvalError> {
        evaluate(&self.body, chain, args)
    }

    /// Evaluates a getter.
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures.
    pub fn get(&self, chain: &ScopeChain<'_>) -> Result<Value, EvalError> {
        self.evaluate(chain, &[])
    }

    /// Runs a setter with `value`.
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures, including denied writes.
    pub fn set(&self, chain: &ScopeChain<'_>, value: Value) -> Result<(), EvalError> {
        self.evaluate(chain, &[value]).map(drop)
    }

    /// Runs a handler for its effects.
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures.
    pub fn run(&self, chain: &ScopeChain<'_>) -> Result<(), EvalError> {
        self.evaluate(chain, &[]).map(drop)
    }
}

/// Compiles expression and template text against one filter registry and one
/// set of globals.
#[derive(Debug)]
pub struct Compiler {
    evaluators: RefCell<HashMap<(Form, String), Rc<Evaluator>>>,
    templates: RefCell<HashMap<String, Rc<Template>>>,
    filters: FilterRegistry,
    globals: Globals,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a compiler with the default filters and globals.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registries(FilterRegistry::with_defaults(), Globals::with_defaults())
    }

    /// Creates a compiler over the given registries.
    #[must_use]
    pub fn with_registries(filters: FilterRegistry, globals: Globals) -> Self {
        Self {
            evaluators: RefCell::new(HashMap::new()),
            templates: RefCell::new(HashMap::new()),
            filters,
            globals,
        }
    }

    /// The filter registry consulted at compile time.
    #[must_use]
    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// The process globals at the bottom of every scope chain.
    #[must_use]
    pub const fn globals(&self) -> &Globals {
        &self.globals
    }

    /// A scope chain holding only the globals.
    #[must_use]
    pub const fn scope(&self) -> ScopeChain<'_> {
        ScopeChain::new(&self.globals)
    }

    /// Number of cached evaluators.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.evaluators.borrow().len()
    }

    fn cached_or(
        &self,
        form: Form,
        source: &str,
        build: impl FnOnce() -> Result<Expr, CompileError>,
    ) -> Result<Rc<Evaluator>, CompileError> {
        let key = (form, source.to_string());
        if let Some(evaluator) = self.evaluators.borrow().get(&key) {
            return Ok(Rc::clone(evaluator));
        }
        let body = build()?;
        tracing::debug!(?form, source, "compiled expression");
        let evaluator = Rc::new(Evaluator {
            form,
            source: source.to_string(),
            body,
        });
        self.evaluators
            .borrow_mut()
            .insert(key, Rc::clone(&evaluator));
        Ok(evaluator)
    }

    /// Compiles a value-returning expression.
    ///
    /// # Errors
    ///
    /// Fails on syntax errors, malformed filters and unterminated `#calls(`.
    pub fn getter(&self, source: &str) -> Result<Rc<Evaluator>, CompileError> {
        self.cached_or(Form::Getter, source, || {
            let rewritten = rewrite_stateful_calls(source)?;
            parse_expression(&rewritten, &self.filters)
        })
    }

    /// Compiles an assignment to the path `source`.
    ///
    /// # Errors
    ///
    /// Fails when `source` does not parse or is not an assignable path.
    pub fn setter(&self, source: &str) -> Result<Rc<Evaluator>, CompileError> {
        self.cached_or(Form::Setter, source, || {
            let path = parse_expression(source, &self.filters)?;
            if !path.is_assignable() {
                return Err(CompileError::NotAssignable(source.to_string()));
            }
            Ok(Expr::Assign(AssignOp::Set, Box::new(path), Box::new(Expr::Arg(0))))
        })
    }

    /// Compiles an event handler: `#method(args)` calls are routed through
    /// `$commit`, and statements may be separated by `;`.
    ///
    /// # Errors
    ///
    /// Fails on syntax errors and unterminated `#calls(`.
    pub fn handler(&self, source: &str) -> Result<Rc<Evaluator>, CompileError> {
        self.cached_or(Form::Handler, source, || {
            let rewritten = rewrite_stateful_calls(source)?;
            parse_statements(&rewritten, &self.filters)
        })
    }

    /// Compiles interpolation text into a cached [`Template`].
    ///
    /// # Errors
    ///
    /// Fails on unterminated spans or any invalid embedded expression.
    pub fn template(&self, text: &str) -> Result<Rc<Template>, CompileError> {
        if let Some(template) = self.templates.borrow().get(text) {
            return Ok(Rc::clone(template));
        }
        let parts = split(text)?
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => Ok(Part::Text(text)),
                Segment::Expr { source, raw } => Ok(Part::Expr {
                    evaluator: self.getter(&source)?,
                    raw,
                }),
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        let template = Rc::new(Template::new(text.to_string(), parts));
        self.templates
            .borrow_mut()
            .insert(text.to_string(), Rc::clone(&template));
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Locals;
    use rill_core::Target;
    use serde_json::json;

    #[test]
    fn identical_text_yields_identical_evaluator() {
        let compiler = Compiler::new();
        let a = compiler.getter("user.name").expect("compile");
        let b = compiler.getter("user.name").expect("compile");
        assert!(Rc::ptr_eq(&a, &b));
        let setter = compiler.setter("user.name").expect("compile");
        assert!(!std::ptr::eq(Rc::as_ptr(&a), Rc::as_ptr(&setter)));
        assert_eq!(compiler.cached(), 2);
    }

    #[test]
    fn local_shadows_state_field() {
        let compiler = Compiler::new();
        let state = Value::from_json(json!({"x": 1})).as_target().cloned().expect("object");
        let getter = compiler.getter("x").expect("compile");
        let chain = compiler.scope().with_state(&state);
        assert_eq!(getter.get(&chain).expect("eval").to_display(), "1");

        let mut locals = Locals::new();
        locals.insert("x".into(), Value::from(2));
        let chain = chain.with_locals(&locals);
        assert_eq!(getter.get(&chain).expect("eval").to_display(), "2");
    }

    #[test]
    fn setter_writes_through_path() {
        let compiler = Compiler::new();
        let state = Value::from_json(json!({"form": {"name": "a"}}))
            .as_target()
            .cloned()
            .expect("object");
        let chain = compiler.scope().with_state(&state);
        compiler
            .setter("form.name")
            .expect("compile")
            .set(&chain, Value::from("b"))
            .expect("set");
        assert_eq!(state.get("form").as_target().expect("object").get("name").to_display(), "b");
        assert!(matches!(
            compiler.setter("a + b"),
            Err(CompileError::NotAssignable(_))
        ));
    }

    #[test]
    fn handlers_route_stateful_calls_through_commit() {
        let compiler = Compiler::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        compiler.globals().define_fn("$commit", move |args| {
            sink.borrow_mut().push(
                args.iter().map(Value::to_display).collect::<Vec<_>>().join(" "),
            );
            Ok(Value::Undefined)
        });
        let handler = compiler.handler("#add(1, ')'); #reset()").expect("compile");
        handler.run(&compiler.scope()).expect("run");
        assert_eq!(*calls.borrow(), vec!["add 1 )".to_string(), "reset".to_string()]);
    }

    #[test]
    fn templates_render_with_filters() {
        let compiler = Compiler::new();
        compiler.filters().register("reverse", |input, _| {
            Ok(Value::from(input.to_display().chars().rev().collect::<String>()))
        });
        let template = compiler.template("{{ 'abc' |> reverse }}").expect("compile");
        assert_eq!(template.render(&compiler.scope()).expect("render"), "cba");
        let again = compiler.template("{{ 'abc' |> reverse }}").expect("compile");
        assert!(Rc::ptr_eq(&template, &again));
    }

    #[test]
    fn template_values_normalize_nullish() {
        let compiler = Compiler::new();
        let state = Target::from_entries([("missing", Value::Null)]);
        let chain = compiler.scope().with_state(&state);
        let template = compiler.template("[{{ missing }}]").expect("compile");
        assert_eq!(template.render(&chain).expect("render"), "[]");
        let single = compiler.template("{{ missing }}").expect("compile");
        assert_eq!(single.render(&chain).expect("render"), "");
    }

    #[test]
    fn compile_errors_carry_the_source() {
        let compiler = Compiler::new();
        let error = compiler.getter("items |> ").expect_err("empty filter");
        assert!(error.to_string().contains("items |> "));
        assert!(matches!(
            compiler.handler("#save(a"),
            Err(CompileError::UnterminatedCall(_))
        ));
    }
}
