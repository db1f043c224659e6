//! Filter registry.
//!
//! Filters are looked up when an expression is compiled, so a filter must be
//! registered before the first template using it is compiled. A name that is
//! unknown at that point compiles fine and fails when evaluated.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use rill_core::Value;

/// Signature of a filter: `(input, arguments) -> output`.
pub type FilterFn = dyn Fn(&Value, &[Value]) -> anyhow::Result<Value>;

/// A named filter.
#[derive(Clone)]
pub struct Filter {
    name: Rc<str>,
    func: Rc<FilterFn>,
}

impl Filter {
    /// Creates a filter.
    pub fn new(
        name: &str,
        func: impl Fn(&Value, &[Value]) -> anyhow::Result<Value> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// The registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the filter.
    ///
    /// # Errors
    ///
    /// Propagates the filter's own failure.
    pub fn apply(&self, input: &Value, args: &[Value]) -> anyhow::Result<Value> {
        (self.func)(input, args)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.name).finish()
    }
}

/// Name to filter mapping shared by one compiler.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RefCell<IndexMap<String, Filter>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.borrow().keys()).finish()
    }
}

impl FilterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `upper`, `lower`, `trim`, `json` and `default`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("upper", |input, _| Ok(Value::from(input.to_display().to_uppercase())));
        registry.register("lower", |input, _| Ok(Value::from(input.to_display().to_lowercase())));
        registry.register("trim", |input, _| Ok(Value::from(input.to_display().trim())));
        registry.register("json", |input, args| {
            let json = input.to_json();
            let text = if args.first().is_some_and(Value::is_truthy) {
                serde_json::to_string_pretty(&json)?
            } else {
                serde_json::to_string(&json)?
            };
            Ok(Value::from(text))
        });
        registry.register("default", |input, args| {
            if input.is_nullish() || input.as_str() == Some("") {
                Ok(args.first().cloned().unwrap_or_default())
            } else {
                Ok(input.clone())
            }
        });
        registry
    }

    /// Registers (or replaces) a filter.
    pub fn register(
        &self,
        name: &str,
        func: impl Fn(&Value, &[Value]) -> anyhow::Result<Value> + 'static,
    ) {
        tracing::debug!(filter = name, "registering filter");
        self.filters
            .borrow_mut()
            .insert(name.to_string(), Filter::new(name, func));
    }

    /// Looks up a filter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Filter> {
        self.filters.borrow().get(name).cloned()
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.borrow().contains_key(name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.filters.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_behave() {
        let registry = FilterRegistry::with_defaults();
        let apply = |name: &str, input: Value, args: &[Value]| {
            registry
                .get(name)
                .expect("registered")
                .apply(&input, args)
                .expect("apply")
                .to_display()
        };
        assert_eq!(apply("upper", Value::from("abc"), &[]), "ABC");
        assert_eq!(apply("trim", Value::from("  x "), &[]), "x");
        assert_eq!(apply("default", Value::Null, &[Value::from("none")]), "none");
        assert_eq!(apply("default", Value::from(0), &[Value::from("none")]), "0");
        let list = Value::from_json(serde_json::json!([1, "a"]));
        assert_eq!(apply("json", list, &[]), r#"[1,"a"]"#);
    }

    #[test]
    fn registration_replaces() {
        let registry = FilterRegistry::new();
        registry.register("x", |_, _| Ok(Value::from(1)));
        registry.register("x", |_, _| Ok(Value::from(2)));
        assert_eq!(registry.names(), vec!["x".to_string()]);
        let result = registry.get("x").expect("x").apply(&Value::Null, &[]).expect("apply");
        assert_eq!(result.to_display(), "2");
    }
}
