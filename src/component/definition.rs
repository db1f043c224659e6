use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use rill_core::{Target, Value};

use super::Component;

/// A component method: `(component, state, args) -> result`.
pub type Method = Rc<dyn Fn(&Component, &Target, &[Value]) -> anyhow::Result<Value>>;

/// A lifecycle hook.
pub type Hook = Rc<dyn Fn(&Component) -> anyhow::Result<()>>;

/// Receives `(component, name, old, new)` for observed host attributes.
pub type AttributeHook =
    Rc<dyn Fn(&Component, &str, Option<&str>, Option<&str>) -> anyhow::Result<()>>;

type StateFactory = Rc<dyn Fn() -> Value>;

/// Everything needed to instantiate a custom element.
///
/// ```ignore
/// let counter = Definition::new("<button @click=\"#add(1)\">{{ count }}</button>")
///     .state(json!({ "count": 0 }))
///     .method("add", |_, state, args| {
///         let next = state.get("count").to_number() + args[0].to_number();
///         state.set("count", next);
///         Ok(Value::Undefined)
///     });
/// ```
#[derive(Clone)]
pub struct Definition {
    template: String,
    state: StateFactory,
    methods: IndexMap<String, Method>,
    on_created: Option<Hook>,
    on_attached: Option<Hook>,
    on_detached: Option<Hook>,
    on_attribute: Option<AttributeHook>,
    observed_attributes: Vec<String>,
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("template", &self.template)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("observed_attributes", &self.observed_attributes)
            .finish_non_exhaustive()
    }
}

impl Definition {
    /// A definition rendering `template` over an empty state object.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            state: Rc::new(|| Value::Object(Target::map())),
            methods: IndexMap::new(),
            on_created: None,
            on_attached: None,
            on_detached: None,
            on_attribute: None,
            observed_attributes: Vec::new(),
        }
    }

    /// Initial state copied from JSON for every instance.
    #[must_use]
    pub fn state(mut self, initial: serde_json::Value) -> Self {
        self.state = Rc::new(move || Value::from_json(initial.clone()));
        self
    }

    /// Initial state produced by `factory` for every instance.
    #[must_use]
    pub fn state_with(mut self, factory: impl Fn() -> Value + 'static) -> Self {
        self.state = Rc::new(factory);
        self
    }

    /// Adds a method callable from templates and through `$commit`.
    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Component, &Target, &[Value]) -> anyhow::Result<Value> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    /// Runs after construction, once pending renders settle.
    #[must_use]
    pub fn on_created(mut self, hook: impl Fn(&Component) -> anyhow::Result<()> + 'static) -> Self {
        self.on_created = Some(Rc::new(hook));
        self
    }

    /// Runs after the host is connected.
    #[must_use]
    pub fn on_attached(mut self, hook: impl Fn(&Component) -> anyhow::Result<()> + 'static) -> Self {
        self.on_attached = Some(Rc::new(hook));
        self
    }

    /// Runs after the host is disconnected.
    #[must_use]
    pub fn on_detached(mut self, hook: impl Fn(&Component) -> anyhow::Result<()> + 'static) -> Self {
        self.on_detached = Some(Rc::new(hook));
        self
    }

    /// Runs when an observed host attribute changes.
    #[must_use]
    pub fn on_attribute(
        mut self,
        hook: impl Fn(&Component, &str, Option<&str>, Option<&str>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_attribute = Some(Rc::new(hook));
        self
    }

    /// Host attributes whose changes reach [`Definition::on_attribute`].
    #[must_use]
    pub fn observed_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observed_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// The template markup.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    pub(crate) fn initial_state(&self) -> Value {
        (self.state)()
    }

    /// Looks up a method.
    #[must_use]
    pub fn get_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Method names in definition order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub(crate) const fn created_hook(&self) -> Option<&Hook> {
        self.on_created.as_ref()
    }

    pub(crate) const fn attached_hook(&self) -> Option<&Hook> {
        self.on_attached.as_ref()
    }

    pub(crate) const fn detached_hook(&self) -> Option<&Hook> {
        self.on_detached.as_ref()
    }

    pub(crate) const fn attribute_hook(&self) -> Option<&AttributeHook> {
        self.on_attribute.as_ref()
    }

    /// Returns `true` when changes of `name` are forwarded to the attribute hook.
    #[must_use]
    pub fn observes_attribute(&self, name: &str) -> bool {
        self.observed_attributes.iter().any(|a| a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_state_is_copied_per_instance() {
        let definition = Definition::new("<p></p>").state(json!({"items": [1]}));
        let a = definition.initial_state();
        let b = definition.initial_state();
        let (a, b) = (a.as_target().expect("object"), b.as_target().expect("object"));
        assert!(!a.ptr_eq(b));
        assert!(!a.get("items").as_target().expect("list").ptr_eq(
            b.get("items").as_target().expect("list")
        ));
    }

    #[test]
    fn methods_keep_definition_order() {
        let definition = Definition::new("")
            .method("b", |_, _, _| Ok(Value::Undefined))
            .method("a", |_, _, _| Ok(Value::Undefined));
        assert_eq!(definition.method_names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(definition.get_method("a").is_some());
        assert!(definition.get_method("c").is_none());
    }

    #[test]
    fn observed_attributes_filter_forwarding() {
        let definition = Definition::new("").observed_attributes(["open"]);
        assert!(definition.observes_attribute("open"));
        assert!(!definition.observes_attribute("class"));
    }
}
