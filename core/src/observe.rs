//! Change observation for [`Target`] graphs.
//!
//! [`observe`] attaches an [`Observer`] to a container (and, when deep, to every
//! container reachable from it). Afterwards every successful definition or
//! deletion produces one [`Change`], delivered synchronously to subscribers in
//! mutation order. Nested observers keep weak links to the containers holding
//! them so changes deep inside a state tree also reach the root's subscribers.

use std::{cell::RefCell, fmt, rc::Rc};

use serde::Serialize;

use crate::{
    target::{Target, WeakTarget},
    value::Value,
};

/// Kind of mutation reported by a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A property that did not exist was defined.
    Add,
    /// An existing property was redefined.
    Set,
    /// A property was removed.
    Delete,
}

/// A single observed mutation.
#[derive(Debug, Clone)]
pub struct Change {
    /// What happened.
    pub kind: ChangeKind,
    /// The property that changed.
    pub property: String,
    /// The container that was mutated.
    pub target: Target,
    /// The new value (`undefined` for deletions).
    pub value: Value,
    /// The previous value, absent for additions.
    pub old: Option<Value>,
}

/// Decides whether a redefinition counts as a change:
/// `(new, old, property, target) -> changed`.
pub type Compare = Rc<dyn Fn(&Value, &Value, &str, &Target) -> bool>;

/// Receives `(change, observed container)`.
pub type Subscriber = Rc<dyn Fn(&Change, &Target)>;

/// Options for [`observe`].
#[derive(Clone)]
pub struct ObserveOptions {
    /// Wrap nested containers as well. Defaults to `true`.
    pub deep: bool,
    /// Custom comparison; defaults to deep inequality through canonical serialization.
    pub compare: Option<Compare>,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            deep: true,
            compare: None,
        }
    }
}

impl fmt::Debug for ObserveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveOptions")
            .field("deep", &self.deep)
            .field("compare", &self.compare.is_some())
            .finish()
    }
}

/// Per-container observation record.
pub struct Observer {
    options: ObserveOptions,
    compare: Compare,
    subscribers: RefCell<Vec<Subscriber>>,
    parents: RefCell<Vec<WeakTarget>>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("deep", &self.options.deep)
            .field("subscribers", &self.subscribers.borrow().len())
            .field("parents", &self.parents.borrow().len())
            .finish()
    }
}

fn default_compare() -> Compare {
    Rc::new(|new: &Value, old: &Value, _: &str, _: &Target| !new.deep_eq(old))
}

fn same_subscriber(a: &Subscriber, b: &Subscriber) -> bool {
    std::ptr::eq(Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>())
}

/// Observes `value` if it is a container; other values pass through unchanged.
#[must_use]
pub fn observe(value: Value, options: &ObserveOptions) -> Value {
    match value.as_target() {
        Some(target) => Value::from(observe_target(target, options)),
        None => value,
    }
}

/// Observes `value` and subscribes `handler` to it.
#[must_use]
pub fn observe_with(value: Value, options: &ObserveOptions, handler: Subscriber) -> Value {
    let value = observe(value, options);
    if let Some(target) = value.as_target() {
        target.subscribe(handler);
    }
    value
}

/// Attaches an observer to `target`. Idempotent: an already observed target is
/// returned unchanged with its existing observer.
pub fn observe_target(target: &Target, options: &ObserveOptions) -> Target {
    if target.is_observed() {
        return target.clone();
    }
    let observer = Rc::new(Observer {
        compare: options.compare.clone().unwrap_or_else(default_compare),
        options: options.clone(),
        subscribers: RefCell::new(Vec::new()),
        parents: RefCell::new(Vec::new()),
    });
    *target.0.observer.borrow_mut() = Some(Rc::clone(&observer));

    if observer.options.deep {
        for child in target.values() {
            if let Some(child) = child.as_target() {
                let child = observe_target(child, options);
                link(&child, target);
            }
        }
    }
    target.clone()
}

fn link(child: &Target, parent: &Target) {
    if let Some(observer) = child.observer() {
        let mut parents = observer.parents.borrow_mut();
        if !parents.iter().any(|p| p.points_to(parent)) {
            parents.push(parent.downgrade());
        }
    }
}

impl Observer {
    /// Returns the options this observer was created with.
    #[must_use]
    pub const fn options(&self) -> &ObserveOptions {
        &self.options
    }

    /// Number of current subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Wraps a value about to be stored, when deep observation applies.
    pub(crate) fn adopt(&self, value: Value) -> Value {
        if self.options.deep {
            observe(value, &self.options)
        } else {
            value
        }
    }

    pub(crate) fn defined(&self, target: &Target, property: &str, had: bool, old: &Value, value: &Value) {
        if self.options.deep
            && let Some(child) = value.as_target()
        {
            link(child, target);
        }
        if had {
            self.release(target, old);
        }
        if !had || (self.compare)(value, old, property, target) {
            let change = Change {
                kind: if had { ChangeKind::Set } else { ChangeKind::Add },
                property: property.to_string(),
                target: target.clone(),
                value: value.clone(),
                old: had.then(|| old.clone()),
            };
            self.dispatch(&change, target);
        }
    }

    pub(crate) fn deleted(&self, target: &Target, property: &str, old: &Value) {
        self.release(target, old);
        let change = Change {
            kind: ChangeKind::Delete,
            property: property.to_string(),
            target: target.clone(),
            value: Value::Undefined,
            old: Some(old.clone()),
        };
        self.dispatch(&change, target);
    }

    /// Drops the parent link from a value that left `target`.
    pub(crate) fn release(&self, target: &Target, old: &Value) {
        let Some(child) = old.as_target() else {
            return;
        };
        if target.contains_identity(old) {
            return;
        }
        if let Some(observer) = child.observer() {
            observer.parents.borrow_mut().retain(|p| !p.points_to(target));
        }
    }

    fn dispatch(&self, change: &Change, target: &Target) {
        let mut visited = vec![target.id()];
        self.propagate(change, &mut visited);
        let subscribers = self.subscribers.borrow().clone();
        for subscriber in &subscribers {
            subscriber(change, target);
        }
    }

    /// Deep propagation: hands the change to every observed ancestor.
    fn propagate(&self, change: &Change, visited: &mut Vec<usize>) {
        let parents: Vec<Target> = self
            .parents
            .borrow()
            .iter()
            .filter_map(WeakTarget::upgrade)
            .collect();
        for parent in parents {
            if visited.contains(&parent.id()) {
                continue;
            }
            visited.push(parent.id());
            let Some(observer) = parent.observer() else {
                continue;
            };
            let subscribers = observer.subscribers.borrow().clone();
            for subscriber in &subscribers {
                subscriber(change, &parent);
            }
            observer.propagate(change, visited);
        }
    }
}

impl Target {
    /// Adds a subscriber. Returns `false` when the container is not observed or
    /// the subscriber is already registered.
    pub fn subscribe(&self, subscriber: Subscriber) -> bool {
        let Some(observer) = self.observer() else {
            return false;
        };
        let mut subscribers = observer.subscribers.borrow_mut();
        if subscribers.iter().any(|s| same_subscriber(s, &subscriber)) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Removes a subscriber previously passed to [`Target::subscribe`].
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        let Some(observer) = self.observer() else {
            return false;
        };
        let mut subscribers = observer.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| !same_subscriber(s, subscriber));
        before != subscribers.len()
    }
}
