//! The runtime: registries and the live instance table.
//!
//! Everything that would otherwise be process-wide (the document, the
//! scheduler, the compiler with its evaluator cache, filters and globals, the
//! directive registry and the element registry) is owned here and handed to
//! components at construction.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rill_core::{Document, NodeId, Scheduler, html::parse_fragment};
use rill_expr::Compiler;

use crate::{Error, Options, component::Component, component::Definition, directive::DirectiveRegistry};

/// Owns the document and every registry.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

#[derive(Clone, Default)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

struct RuntimeInner {
    document: Document,
    scheduler: Scheduler,
    compiler: Rc<Compiler>,
    directives: Rc<DirectiveRegistry>,
    elements: RefCell<IndexMap<String, Rc<Definition>>>,
    instances: RefCell<HashMap<NodeId, Component>>,
    options: Options,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("elements", &self.0.elements.borrow().keys().collect::<Vec<_>>())
            .field("instances", &self.0.instances.borrow().len())
            .field("options", &self.0.options)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakRuntime")
    }
}

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(Runtime)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Runtime {
    /// A runtime with the default compiler and directive set.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self::with_registries(Compiler::new(), DirectiveRegistry::with_defaults(), options)
    }

    /// A runtime over caller-provided registries.
    #[must_use]
    pub fn with_registries(
        compiler: Compiler,
        directives: DirectiveRegistry,
        options: Options,
    ) -> Self {
        Self(Rc::new(RuntimeInner {
            document: Document::new(),
            scheduler: Scheduler::new(),
            compiler: Rc::new(compiler),
            directives: Rc::new(directives),
            elements: RefCell::new(IndexMap::new()),
            instances: RefCell::new(HashMap::new()),
            options,
        }))
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.0))
    }

    /// The document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.0.document
    }

    /// The render scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.0.scheduler
    }

    /// The expression compiler, including filters and globals.
    #[must_use]
    pub fn compiler(&self) -> &Compiler {
        &self.0.compiler
    }

    pub(crate) fn shared_compiler(&self) -> Rc<Compiler> {
        Rc::clone(&self.0.compiler)
    }

    /// The directive registry.
    #[must_use]
    pub fn directives(&self) -> &DirectiveRegistry {
        &self.0.directives
    }

    pub(crate) fn shared_directives(&self) -> Rc<DirectiveRegistry> {
        Rc::clone(&self.0.directives)
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.0.options
    }

    // ========================================================================
    // Element registry
    // ========================================================================

    /// Registers `definition` under `tag`.
    ///
    /// # Errors
    ///
    /// Fails for names without a `-` (or not starting with a lowercase
    /// letter) and for tags defined before.
    pub fn define(&self, tag: &str, definition: Definition) -> Result<(), Error> {
        if !is_custom_element_name(tag) {
            return Err(Error::InvalidTag(tag.to_string()));
        }
        let mut elements = self.0.elements.borrow_mut();
        if elements.contains_key(tag) {
            return Err(Error::AlreadyDefined(tag.to_string()));
        }
        elements.insert(tag.to_string(), Rc::new(definition));
        tracing::debug!(tag, "element defined");
        Ok(())
    }

    /// Returns `true` when `tag` is registered.
    #[must_use]
    pub fn is_defined(&self, tag: &str) -> bool {
        self.0.elements.borrow().contains_key(tag)
    }

    /// Registered tags in definition order.
    #[must_use]
    pub fn defined_tags(&self) -> Vec<String> {
        self.0.elements.borrow().keys().cloned().collect()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Creates a detached host element for `tag` and upgrades it.
    ///
    /// # Errors
    ///
    /// Fails when `tag` is not defined or the component cannot be built.
    pub fn create_element(&self, tag: &str) -> Result<Component, Error> {
        let host = self.0.document.create_element(tag);
        self.upgrade(host)?
            .ok_or_else(|| Error::NotDefined(tag.to_string()))
    }

    /// Instantiates the component for `host` when its tag is defined.
    /// Upgrading an already upgraded host returns the existing instance.
    ///
    /// # Errors
    ///
    /// Propagates construction failures (template parse and compile errors,
    /// non-object state).
    pub fn upgrade(&self, host: NodeId) -> Result<Option<Component>, Error> {
        if let Some(existing) = self.component(host) {
            return Ok(Some(existing));
        }
        let Some(tag) = self.0.document.tag(host) else {
            return Ok(None);
        };
        let Some(definition) = self.0.elements.borrow().get(&tag).cloned() else {
            return Ok(None);
        };
        let component = Component::create(self, host, &tag, definition)?;
        self.0
            .instances
            .borrow_mut()
            .insert(host, component.clone());
        Ok(Some(component))
    }

    /// Upgrades every defined element below `root` in document order.
    ///
    /// # Errors
    ///
    /// Stops at the first construction failure.
    pub fn upgrade_all(&self, root: NodeId) -> Result<Vec<Component>, Error> {
        let mut upgraded = Vec::new();
        for node in self.0.document.descendants(root) {
            if let Some(component) = self.upgrade(node)? {
                upgraded.push(component);
            }
        }
        Ok(upgraded)
    }

    /// The component living on `host`.
    #[must_use]
    pub fn component(&self, host: NodeId) -> Option<Component> {
        self.0.instances.borrow().get(&host).cloned()
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.0.instances.borrow().len()
    }

    /// Creates `tag`, appends it to `parent` and reports the connection.
    ///
    /// # Errors
    ///
    /// Fails like [`Runtime::create_element`] or when `parent` cannot take
    /// children.
    pub fn mount(&self, tag: &str, parent: NodeId) -> Result<Component, Error> {
        let component = self.create_element(tag)?;
        self.0.document.append_child(parent, component.host())?;
        if self.0.document.is_connected(component.host()) {
            component.connected();
        }
        Ok(component)
    }

    /// Detaches the host of `component`, reports the disconnection of it and
    /// every component nested in it, and frees their nodes.
    pub fn unmount(&self, component: &Component) {
        self.0.document.remove(component.host());
        self.release(component, component.host());
    }

    /// Reports the connection of every component hosted at or below `root`
    /// that is now part of the document.
    pub(crate) fn connect_tree(&self, root: NodeId) {
        let document = &self.0.document;
        for node in document.composed_subtree(root) {
            if let Some(component) = self.component(node)
                && document.is_connected(node)
            {
                component.connected();
            }
        }
    }

    /// Reports the disconnection of every component hosted at or below `root`.
    pub(crate) fn disconnect_tree(&self, root: NodeId) {
        for node in self.0.document.composed_subtree(root) {
            if let Some(component) = self.component(node) {
                component.disconnected();
            }
        }
    }

    /// Tears down the detached subtree at `root`, owned by `owner`.
    ///
    /// Nodes hidden behind conditional anchors are included. Components
    /// hosted in the subtree are disconnected and dropped from the instance
    /// table, then every node is disposed.
    pub(crate) fn release(&self, owner: &Component, root: NodeId) {
        let document = &self.0.document;
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut stack = vec![(root, owner.clone())];
        while let Some((node, scope)) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            nodes.push(node);
            if let Some(partner) = scope.forget_pairing(node) {
                stack.push((partner, scope.clone()));
            }
            if let Some(shadow) = document.shadow_root(node) {
                let inner = self.component(node).unwrap_or_else(|| scope.clone());
                stack.push((shadow, inner));
            }
            for child in document.children(node) {
                stack.push((child, scope.clone()));
            }
        }

        let mut released = 0usize;
        for node in &nodes {
            let instance = self.0.instances.borrow_mut().remove(node);
            if let Some(component) = instance {
                component.disconnected();
                released += 1;
            }
        }
        for node in &nodes {
            document.dispose(*node);
        }
        tracing::trace!(nodes = nodes.len(), components = released, "subtree released");
    }

    /// Parses markup into a detached fragment.
    ///
    /// # Errors
    ///
    /// Fails on malformed markup.
    pub fn parse(&self, markup: &str) -> Result<NodeId, Error> {
        Ok(parse_fragment(&self.0.document, markup)?)
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Runs one micro-task checkpoint: every queued render flush.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the flushed tasks.
    pub fn tick(&self) -> anyhow::Result<usize> {
        self.0.scheduler.run_microtasks()
    }

    /// Runs renders and deferred lifecycle hooks until nothing is left.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn run_until_idle(&self) -> anyhow::Result<()> {
        self.0.scheduler.run_until_idle()
    }
}

/// Custom element names start with a lowercase ASCII letter and contain `-`.
#[must_use]
pub fn is_custom_element_name(tag: &str) -> bool {
    tag.contains('-')
        && tag.starts_with(|c: char| c.is_ascii_lowercase())
        && !tag.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_need_a_dash() {
        let runtime = Runtime::default();
        assert!(matches!(
            runtime.define("counter", Definition::new("")),
            Err(Error::InvalidTag(_))
        ));
        assert!(matches!(
            runtime.define("Big-box", Definition::new("")),
            Err(Error::InvalidTag(_))
        ));
        runtime.define("my-counter", Definition::new("")).expect("define");
        assert!(matches!(
            runtime.define("my-counter", Definition::new("")),
            Err(Error::AlreadyDefined(_))
        ));
        assert_eq!(runtime.defined_tags(), vec!["my-counter"]);
    }

    #[test]
    fn upgrade_is_idempotent() {
        let runtime = Runtime::default();
        runtime.define("x-box", Definition::new("<p></p>")).expect("define");
        let component = runtime.create_element("x-box").expect("create");
        let again = runtime.upgrade(component.host()).expect("upgrade").expect("defined");
        assert!(component.ptr_eq(&again));
        assert_eq!(runtime.instance_count(), 1);

        let plain = runtime.document().create_element("div");
        assert!(runtime.upgrade(plain).expect("upgrade").is_none());
        assert!(matches!(runtime.create_element("x-missing"), Err(Error::NotDefined(_))));
    }

    #[test]
    fn non_object_state_is_rejected() {
        let runtime = Runtime::default();
        runtime
            .define("x-list", Definition::new("").state(serde_json::json!([1, 2])))
            .expect("define");
        assert!(matches!(
            runtime.create_element("x-list"),
            Err(Error::StateNotObject("array"))
        ));
    }

    #[test]
    fn upgrade_all_finds_nested_hosts() {
        let runtime = Runtime::default();
        runtime.define("x-item", Definition::new("<i></i>")).expect("define");
        let fragment = runtime
            .parse("<ul><li><x-item></x-item></li><x-item></x-item></ul>")
            .expect("parse");
        assert_eq!(runtime.upgrade_all(fragment).expect("upgrade").len(), 2);
    }
}
