//! Component instances.
//!
//! A [`Component`] owns the shadow tree of one host element, its observed
//! state and the renderer tree built from its template. Every state change
//! requests a render; requests coalesce until the scheduler flushes, and a
//! render never nests inside another render of the same component.
//!
//! Capabilities are split across files:
//!
//! - `events`: `on`/`once`/`off`/`emit` backed by host DOM events.
//! - `watch`: path watchers built on the state observer.
//!
//! # Error policy
//!
//! Render failures propagate out of the scheduler turn in debug mode. In
//! production they are wrapped in a [`RenderError`], logged, kept as
//! [`Component::last_error`] and announced with a `render:error` event on the
//! host carrying the message as detail.

mod definition;
mod events;
mod watch;

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rill_core::{
    Document, Event, NodeId, ObserveOptions, Scheduler, Subscriber, Target, Value,
    value::Function,
};
use rill_expr::{COMMIT, Compiler, Evaluator, Locals, Scope, ScopeChain};

use crate::{
    Error, Options, RenderError,
    directive::DirectiveRegistry,
    render::{BuildCx, ChildrenRenderer, RenderCx, Renderer},
    runtime::{Runtime, WeakRuntime},
};

pub use definition::{AttributeHook, Definition, Hook, Method};
pub use events::RENDER_ERROR_EVENT;
pub use watch::WatchId;

use watch::Watcher;

/// A live component bound to a host element.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

/// A non-owning handle to a [`Component`].
#[derive(Clone, Default)]
pub struct WeakComponent(Weak<ComponentInner>);

struct ComponentInner {
    tag: String,
    host: NodeId,
    shadow: NodeId,
    definition: Rc<Definition>,
    runtime: WeakRuntime,
    document: Document,
    scheduler: Scheduler,
    compiler: Rc<Compiler>,
    directives: Rc<DirectiveRegistry>,
    options: Options,
    state: Target,
    tree: RefCell<Option<ChildrenRenderer>>,
    refs: RefCell<IndexMap<String, NodeId>>,
    anchors: RefCell<HashMap<NodeId, NodeId>>,
    anchored: RefCell<HashMap<NodeId, NodeId>>,
    event: RefCell<Value>,
    watchers: RefCell<Vec<Rc<Watcher>>>,
    next_watch: Cell<u64>,
    rendering: Cell<bool>,
    scheduled: Cell<bool>,
    connected: Cell<bool>,
    renders: Cell<u64>,
    last_error: RefCell<Option<Rc<RenderError>>>,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("tag", &self.0.tag)
            .field("host", &self.0.host)
            .field("renders", &self.0.renders.get())
            .field("scheduled", &self.0.scheduled.get())
            .field("connected", &self.0.connected.get())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WeakComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakComponent")
            .field(&self.upgrade().map(|c| c.0.host))
            .finish()
    }
}

impl WeakComponent {
    /// Upgrades to a strong handle while the component is alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(Component)
    }
}

impl Component {
    // ========================================================================
    // Construction
    // ========================================================================

    pub(crate) fn create(
        runtime: &Runtime,
        host: NodeId,
        tag: &str,
        definition: Rc<Definition>,
    ) -> Result<Self, Error> {
        let document = runtime.document().clone();
        let state = match rill_core::observe(definition.initial_state(), &ObserveOptions::default())
        {
            Value::Object(state) => state,
            other => return Err(Error::StateNotObject(crate::error::describe(&other))),
        };
        let shadow = document.attach_shadow(host)?;
        let fragment = rill_core::html::parse_fragment(&document, definition.template())?;
        document.append_child(shadow, fragment)?;
        document.dispose(fragment);

        let component = Self(Rc::new(ComponentInner {
            tag: tag.to_string(),
            host,
            shadow,
            definition,
            runtime: runtime.downgrade(),
            document,
            scheduler: runtime.scheduler().clone(),
            compiler: runtime.shared_compiler(),
            directives: runtime.shared_directives(),
            options: runtime.options().clone(),
            state,
            tree: RefCell::new(None),
            refs: RefCell::new(IndexMap::new()),
            anchors: RefCell::new(HashMap::new()),
            anchored: RefCell::new(HashMap::new()),
            event: RefCell::new(Value::Undefined),
            watchers: RefCell::new(Vec::new()),
            next_watch: Cell::new(0),
            rendering: Cell::new(false),
            scheduled: Cell::new(false),
            connected: Cell::new(false),
            renders: Cell::new(0),
            last_error: RefCell::new(None),
        }));
        component.subscribe_state();

        let tree = ChildrenRenderer::new(&BuildCx::new(&component), shadow)?;
        *component.0.tree.borrow_mut() = Some(tree);
        tracing::debug!(tag, host = %host, "component constructed");

        if let Some(hook) = component.0.definition.created_hook() {
            component.defer_hook(Rc::clone(hook));
        }
        component.render();
        Ok(component)
    }

    fn subscribe_state(&self) {
        let weak = self.downgrade();
        let subscriber: Subscriber = Rc::new(move |_, _| {
            if let Some(component) = weak.upgrade() {
                component.render();
                component.notify_watchers();
            }
        });
        self.0.state.subscribe(subscriber);
    }

    fn defer_hook(&self, hook: Hook) {
        let weak = self.downgrade();
        self.0.scheduler.after_flush(move || match weak.upgrade() {
            Some(component) => hook(&component),
            None => Ok(()),
        });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Rc::downgrade(&self.0))
    }

    /// Returns `true` when both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The registered tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// The host element.
    #[must_use]
    pub fn host(&self) -> NodeId {
        self.0.host
    }

    /// The shadow root holding the rendered template.
    #[must_use]
    pub fn shadow_root(&self) -> NodeId {
        self.0.shadow
    }

    /// The observed state object.
    #[must_use]
    pub fn state(&self) -> Target {
        self.0.state.clone()
    }

    /// The definition this instance was created from.
    #[must_use]
    pub fn definition(&self) -> &Definition {
        &self.0.definition
    }

    /// The document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.0.document
    }

    /// The shared compiler.
    #[must_use]
    pub fn compiler(&self) -> &Compiler {
        &self.0.compiler
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.0.options
    }

    pub(crate) fn directives(&self) -> &DirectiveRegistry {
        &self.0.directives
    }

    /// The runtime, while it is alive.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.0.runtime.upgrade()
    }

    /// Completed renders.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.0.renders.get()
    }

    /// Returns `true` while a render is running.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.0.rendering.get()
    }

    /// Returns `true` while a flush is queued.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.0.scheduled.get()
    }

    /// The last render error swallowed in production mode.
    #[must_use]
    pub fn last_error(&self) -> Option<Rc<RenderError>> {
        self.0.last_error.borrow().clone()
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Requests a render on the next flush. Requests made before that flush
    /// runs coalesce into one.
    pub fn render(&self) {
        if self.0.scheduled.replace(true) {
            return;
        }
        let weak = self.downgrade();
        self.0
            .scheduler
            .schedule(move || weak.upgrade().map_or(Ok(()), |component| component.flush()));
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.0.scheduled.set(false);
        if !self.0.document.is_alive(self.0.host) {
            return Ok(());
        }
        match self.render_now() {
            Ok(()) => Ok(()),
            Err(error) if self.0.options.debug => Err(anyhow::Error::new(error)
                .context(format!("rendering <{}> failed", self.0.tag))),
            Err(error) => {
                self.report(error);
                Ok(())
            }
        }
    }

    /// Renders immediately. A call made while a render is already running is
    /// turned into a render request instead.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of the renderer tree.
    pub fn render_now(&self) -> Result<(), Error> {
        if self.0.rendering.get() {
            self.render();
            return Ok(());
        }
        self.0.rendering.set(true);
        let result = self.render_tree();
        self.0.rendering.set(false);
        result
    }

    fn render_tree(&self) -> Result<(), Error> {
        self.0.refs.borrow_mut().clear();
        let mut tree = self.0.tree.borrow_mut();
        let Some(tree) = tree.as_mut() else {
            return Ok(());
        };
        let locals = Locals::new();
        tree.render(&RenderCx::new(self, &locals))?;
        let renders = self.0.renders.get() + 1;
        self.0.renders.set(renders);
        tracing::trace!(tag = %self.0.tag, renders, "component rendered");
        Ok(())
    }

    fn report(&self, error: Error) {
        let error = Rc::new(RenderError::new(self.0.tag.clone(), error));
        tracing::error!(tag = %self.0.tag, error = %error, "render failed");
        let message = error.to_string();
        *self.0.last_error.borrow_mut() = Some(error);
        let event = Event::with_detail(RENDER_ERROR_EVENT, Value::from(message)).non_bubbling();
        if let Err(listener) = self.0.document.dispatch_event(self.0.host, &event) {
            tracing::error!(tag = %self.0.tag, error = %listener, "render:error listener failed");
        }
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// Calls a state-mutating method with the current state as its leading
    /// argument.
    ///
    /// # Errors
    ///
    /// Rejects `$`/`_`-prefixed and unknown names, and wraps method failures.
    pub fn commit(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        if name.starts_with('$') || name.starts_with('_') {
            return Err(Error::ReservedMethod(name.to_string()));
        }
        self.call(name, args)
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let method = self
            .0
            .definition
            .get_method(name)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod(name.to_string()))?;
        tracing::trace!(tag = %self.0.tag, method = name, "calling method");
        let state = self.state();
        method(self, &state, args).map_err(|source| Error::method(name, source))
    }

    fn bound(&self, name: &str, body: impl Fn(&Self, &[Value]) -> Result<Value, Error> + 'static) -> Value {
        let weak = self.downgrade();
        Value::from(Function::new(name, move |args| {
            let component = weak.upgrade().ok_or(Error::Dropped)?;
            body(&component, args).map_err(anyhow::Error::from)
        }))
    }

    // ========================================================================
    // Refs, anchors, events
    // ========================================================================

    /// Elements captured by `ref` during the last render.
    #[must_use]
    pub fn refs(&self) -> IndexMap<String, NodeId> {
        self.0.refs.borrow().clone()
    }

    /// One captured element.
    #[must_use]
    pub fn get_ref(&self, name: &str) -> Option<NodeId> {
        self.0.refs.borrow().get(name).copied()
    }

    pub(crate) fn register_ref(&self, name: &str, node: NodeId) {
        self.0.refs.borrow_mut().insert(name.to_string(), node);
    }

    pub(crate) fn register_anchor(&self, node: NodeId, anchor: NodeId) {
        self.0.anchors.borrow_mut().insert(node, anchor);
        self.0.anchored.borrow_mut().insert(anchor, node);
    }

    pub(crate) fn anchor_for(&self, node: NodeId) -> Option<NodeId> {
        self.0.anchors.borrow().get(&node).copied()
    }

    /// Drops the pairing `id` takes part in, as node or as anchor, and
    /// returns the other side.
    pub(crate) fn forget_pairing(&self, id: NodeId) -> Option<NodeId> {
        if let Some(anchor) = self.0.anchors.borrow_mut().remove(&id) {
            self.0.anchored.borrow_mut().remove(&anchor);
            return Some(anchor);
        }
        let node = self.0.anchored.borrow_mut().remove(&id)?;
        self.0.anchors.borrow_mut().remove(&node);
        Some(node)
    }

    /// Number of conditional anchors currently tracked.
    #[must_use]
    pub fn anchor_count(&self) -> usize {
        self.0.anchors.borrow().len()
    }

    /// The event currently being handled, as seen by `$event`.
    #[must_use]
    pub fn current_event(&self) -> Value {
        self.0.event.borrow().clone()
    }

    /// Runs a compiled handler for `event` with `$event` set for its duration.
    pub(crate) fn handle_event(
        &self,
        handler: &Evaluator,
        event: &Event,
        locals: &Locals,
    ) -> anyhow::Result<()> {
        let previous = self.0.event.replace(self.event_value(event));
        let state = self.state();
        let result = handler.run(&self.scope_chain(&state, locals));
        *self.0.event.borrow_mut() = previous;
        result.map_err(anyhow::Error::from)
    }

    fn event_value(&self, event: &Event) -> Value {
        let document = &self.0.document;
        let target = event.target();
        let mut entries = vec![
            ("type", Value::from(event.kind())),
            ("detail", event.detail().clone()),
            ("target", target.map_or(Value::Null, Value::from)),
            (
                "currentTarget",
                event.current_target().map_or(Value::Null, Value::from),
            ),
        ];
        if let Some(target) = target.filter(|t| document.is_element(*t)) {
            entries.push(("value", document.get_property(target, "value")));
            entries.push(("checked", document.get_property(target, "checked")));
        }
        Value::from(Target::from_entries(entries))
    }

    /// A scope chain over this component, `state` and `locals`.
    #[must_use]
    pub fn scope_chain<'a>(&'a self, state: &'a Target, locals: &'a Locals) -> ScopeChain<'a> {
        self.0
            .compiler
            .scope()
            .with_component(self)
            .with_state(state)
            .with_locals(locals)
    }

    // ========================================================================
    // Host lifecycle shim
    // ========================================================================

    /// The host was inserted into the document.
    pub fn connected(&self) {
        if self.0.connected.replace(true) {
            return;
        }
        tracing::debug!(tag = %self.0.tag, host = %self.0.host, "component attached");
        self.render();
        if let Some(hook) = self.0.definition.attached_hook() {
            self.defer_hook(Rc::clone(hook));
        }
    }

    /// The host was removed from the document.
    pub fn disconnected(&self) {
        if !self.0.connected.replace(false) {
            return;
        }
        tracing::debug!(tag = %self.0.tag, host = %self.0.host, "component detached");
        if let Some(hook) = self.0.definition.detached_hook() {
            // Strong handle: a released instance has no other owner.
            let (hook, component) = (Rc::clone(hook), self.clone());
            self.0.scheduler.after_flush(move || hook(&component));
        }
    }

    /// Returns `true` between [`Component::connected`] and
    /// [`Component::disconnected`].
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.0.connected.get()
    }

    /// A host attribute changed.
    pub fn attribute_changed(&self, name: &str, old: Option<&str>, new: Option<&str>) {
        if !self.0.definition.observes_attribute(name) {
            return;
        }
        if let Some(hook) = self.0.definition.attribute_hook() {
            let hook = Rc::clone(hook);
            let (name, old, new) = (
                name.to_string(),
                old.map(str::to_string),
                new.map(str::to_string),
            );
            self.defer_hook(Rc::new(move |component| {
                hook(component, &name, old.as_deref(), new.as_deref())
            }));
        }
        self.render();
    }

    /// Writes a host attribute and notifies [`Component::attribute_changed`].
    ///
    /// # Errors
    ///
    /// Fails when the host is not an element.
    pub fn set_attribute(&self, name: &str, value: Option<&str>) -> Result<(), Error> {
        let document = &self.0.document;
        let old = document.get_attribute(self.0.host, name);
        match value {
            Some(value) => document.set_attribute(self.0.host, name, value)?,
            None => {
                document.remove_attribute(self.0.host, name);
            }
        }
        self.attribute_changed(name, old.as_deref(), value);
        Ok(())
    }
}

impl Scope for Component {
    fn member(&self, name: &str) -> Option<Value> {
        match name {
            "state" => Some(Value::from(self.state())),
            "$event" => Some(self.current_event()),
            "$host" => Some(Value::from(self.0.host)),
            "$refs" => Some(Value::from(Target::from_entries(
                self.0
                    .refs
                    .borrow()
                    .iter()
                    .map(|(name, node)| (name.clone(), Value::from(*node))),
            ))),
            COMMIT => Some(self.bound(COMMIT, |component, args| {
                let name = args.first().map(Value::to_display).unwrap_or_default();
                component.commit(&name, args.get(1..).unwrap_or_default())
            })),
            "$emit" => Some(self.bound("$emit", |component, args| {
                let kind = args.first().map(Value::to_display).unwrap_or_default();
                let detail = args.get(1).cloned().unwrap_or_default();
                component
                    .emit(&kind, detail)
                    .map(Value::from)
                    .map_err(|source| Error::method("$emit", source))
            })),
            "$render" => Some(self.bound("$render", |component, _| {
                component.render();
                Ok(Value::Undefined)
            })),
            _ if self.0.definition.get_method(name).is_some() => {
                let method = name.to_string();
                Some(self.bound(name, move |component, args| component.call(&method, args)))
            }
            _ => {
                let property = self.0.document.get_property(self.0.host, name);
                (!matches!(property, Value::Undefined)).then_some(property)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mounted(definition: Definition) -> (Runtime, Component) {
        let runtime = Runtime::new(Options::debug());
        runtime.define("x-test", definition).expect("define");
        let component = runtime.mount("x-test", runtime.document().body()).expect("mount");
        (runtime, component)
    }

    #[test]
    fn state_changes_coalesce_into_one_render() {
        let (runtime, component) =
            mounted(Definition::new("<p>{{ a }} {{ b }}</p>").state(json!({"a": 1, "b": 2})));
        runtime.tick().expect("tick");
        let before = component.render_count();

        component.state().set("a", 10);
        component.state().set("b", 20);
        assert!(component.is_scheduled());
        runtime.tick().expect("tick");

        assert_eq!(component.render_count(), before + 1);
        let html = runtime.document().inner_html(component.shadow_root());
        assert_eq!(html, "<p>10 20</p>");
    }

    #[test]
    fn commit_gate_rejects_reserved_and_unknown_names() {
        let (_runtime, component) = mounted(
            Definition::new("<p></p>")
                .state(json!({"n": 1}))
                .method("bump", |_, state, args| {
                    let by = args.first().map_or(1.0, Value::to_number);
                    state.set("n", state.get("n").to_number() + by);
                    Ok(state.get("n"))
                }),
        );
        assert!(matches!(component.commit("$render", &[]), Err(Error::ReservedMethod(_))));
        assert!(matches!(component.commit("_secret", &[]), Err(Error::ReservedMethod(_))));
        assert!(matches!(component.commit("missing", &[]), Err(Error::UnknownMethod(_))));

        let result = component.commit("bump", &[Value::from(2)]).expect("commit");
        assert_eq!(result.to_display(), "3");
    }

    #[test]
    fn method_failures_are_wrapped() {
        let (_runtime, component) = mounted(
            Definition::new("<p></p>").method("fail", |_, _, _| anyhow::bail!("nope")),
        );
        let error = component.commit("fail", &[]).expect_err("fails");
        assert_eq!(error.to_string(), "method `fail` failed: nope");
    }

    #[test]
    fn scope_exposes_instance_members() {
        let (_runtime, component) = mounted(
            Definition::new("<p></p>").method("double", |_, _, args| {
                Ok(Value::from(args[0].to_number() * 2.0))
            }),
        );
        let state = component.state();
        let locals = Locals::new();
        let chain = component.scope_chain(&state, &locals);
        let value = component
            .compiler()
            .getter("double(21)")
            .expect("compile")
            .get(&chain)
            .expect("eval");
        assert_eq!(value.to_display(), "42");
        assert!(matches!(component.member("$host"), Some(Value::Node(_))));
        assert!(component.member("nothing").is_none());
    }

    #[test]
    fn hooks_run_after_pending_renders() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let (created, attached) = (Rc::clone(&order), Rc::clone(&order));
        let runtime = Runtime::new(Options::debug());
        runtime
            .define(
                "x-hooks",
                Definition::new("<p>{{ n }}</p>")
                    .state(json!({"n": 0}))
                    .on_created(move |c| {
                        created.borrow_mut().push(format!("created:{}", c.render_count()));
                        Ok(())
                    })
                    .on_attached(move |c| {
                        attached.borrow_mut().push(format!("attached:{}", c.render_count()));
                        Ok(())
                    }),
            )
            .expect("define");
        runtime.mount("x-hooks", runtime.document().body()).expect("mount");
        runtime.run_until_idle().expect("idle");
        assert_eq!(*order.borrow(), vec!["created:1", "attached:1"]);
    }
}
