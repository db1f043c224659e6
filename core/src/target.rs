//! Shared, identity-carrying containers.
//!
//! A [`Target`] is the only way containers appear inside a [`Value`]. Cloning a
//! target clones the handle, not the data, so two values holding the same
//! target observe each other's writes. Every write goes through one of two
//! trapped operations, [`Target::set`] (property definition) and
//! [`Target::delete`], which is where an attached [`Observer`] hooks in.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;

use crate::{observe::Observer, value::Value};

/// Storage shape of a container.
#[derive(Debug, Clone)]
pub enum Shape {
    /// String-keyed mapping in insertion order.
    Map(IndexMap<String, Value>),
    /// Ordered sequence addressed by index.
    List(Vec<Value>),
}

pub(crate) struct TargetCell {
    pub(crate) shape: RefCell<Shape>,
    pub(crate) observer: RefCell<Option<Rc<Observer>>>,
    frozen: Cell<bool>,
}

/// Handle to a mapping or sequence.
#[derive(Clone)]
pub struct Target(pub(crate) Rc<TargetCell>);

/// Non-owning handle to a [`Target`].
#[derive(Clone)]
pub(crate) struct WeakTarget(Weak<TargetCell>);

impl WeakTarget {
    pub(crate) fn upgrade(&self) -> Option<Target> {
        self.0.upgrade().map(Target)
    }

    pub(crate) fn points_to(&self, target: &Target) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&target.0))
    }
}

struct Written {
    had: bool,
    old: Value,
    dropped: Vec<Value>,
}

impl Target {
    fn with_shape(shape: Shape) -> Self {
        Self(Rc::new(TargetCell {
            shape: RefCell::new(shape),
            observer: RefCell::new(None),
            frozen: Cell::new(false),
        }))
    }

    /// Creates an empty mapping.
    #[must_use]
    pub fn map() -> Self {
        Self::with_shape(Shape::Map(IndexMap::new()))
    }

    /// Creates an empty sequence.
    #[must_use]
    pub fn list() -> Self {
        Self::with_shape(Shape::List(Vec::new()))
    }

    /// Creates a mapping from key/value pairs.
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::with_shape(Shape::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Creates a sequence from values.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_shape(Shape::List(values.into_iter().collect()))
    }

    /// Returns `true` for sequences.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(*self.0.shape.borrow(), Shape::List(_))
    }

    /// Number of own entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.len(),
            Shape::List(list) => list.len(),
        }
    }

    /// Returns `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys in iteration order; indices for sequences.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.keys().cloned().collect(),
            Shape::List(list) => (0..list.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Own values in iteration order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.values().cloned().collect(),
            Shape::List(list) => list.clone(),
        }
    }

    /// Own key/value pairs in iteration order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Shape::List(list) => list
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
        }
    }

    /// Reads a property. Sequences answer indices and `length`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.get(key).cloned().unwrap_or_default(),
            Shape::List(list) => {
                if key == "length" {
                    Value::from(list.len())
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|i| list.get(i).cloned())
                        .unwrap_or_default()
                }
            }
        }
    }

    /// Reads a sequence slot (or the n-th mapping value).
    #[must_use]
    pub fn get_index(&self, index: usize) -> Value {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.get_index(index).map(|(_, v)| v.clone()).unwrap_or_default(),
            Shape::List(list) => list.get(index).cloned().unwrap_or_default(),
        }
    }

    /// Returns `true` when `key` is an own property.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        match &*self.0.shape.borrow() {
            Shape::Map(map) => map.contains_key(key),
            Shape::List(list) => {
                key == "length" || key.parse::<usize>().is_ok_and(|i| i < list.len())
            }
        }
    }

    /// Returns `true` when `value` is stored directly in this container.
    #[must_use]
    pub fn contains_identity(&self, value: &Value) -> bool {
        let Some(needle) = value.as_target() else {
            return false;
        };
        self.values()
            .iter()
            .any(|v| v.as_target().is_some_and(|t| t.ptr_eq(needle)))
    }

    /// Defines `key`. Returns `false` when the write was denied.
    ///
    /// Sequences accept decimal indices (growing with `undefined` holes) and
    /// `length`; any other key is denied.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        let observer = self.observer();
        let mut value = value.into();
        if let Some(observer) = &observer {
            value = observer.adopt(value);
        }

        let written = {
            let mut shape = self.0.shape.borrow_mut();
            match &mut *shape {
                Shape::Map(map) => {
                    let old = map.insert(key.to_string(), value.clone());
                    Some(Written {
                        had: old.is_some(),
                        old: old.unwrap_or_default(),
                        dropped: Vec::new(),
                    })
                }
                Shape::List(list) => write_list(list, key, &value),
            }
        };
        let Some(written) = written else {
            return false;
        };

        if let Some(observer) = observer {
            observer.defined(self, key, written.had, &written.old, &value);
            for dropped in written.dropped {
                observer.release(self, &dropped);
            }
        }
        true
    }

    /// Deletes `key`. Returns `false` when the deletion was denied.
    pub fn delete(&self, key: &str) -> bool {
        if self.is_frozen() {
            return false;
        }
        let removed = {
            let mut shape = self.0.shape.borrow_mut();
            match &mut *shape {
                Shape::Map(map) => Some(map.shift_remove(key)),
                Shape::List(list) => {
                    if key == "length" {
                        None
                    } else {
                        Some(
                            key.parse::<usize>()
                                .ok()
                                .and_then(|i| list.get_mut(i))
                                .map(std::mem::take),
                        )
                    }
                }
            }
        };
        match removed {
            None => false,
            Some(None) => true,
            Some(Some(old)) => {
                if let Some(observer) = self.observer() {
                    observer.deleted(self, key, &old);
                }
                true
            }
        }
    }

    /// Writes `length`, truncating or padding with `undefined`.
    pub fn set_len(&self, len: usize) -> bool {
        self.set("length", len)
    }

    /// Appends a value and returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let len = self.len();
        self.set(&len.to_string(), value);
        self.len()
    }

    /// Removes and returns the last value.
    pub fn pop(&self) -> Value {
        let len = self.len();
        if len == 0 {
            return Value::Undefined;
        }
        let last = self.get_index(len - 1);
        self.delete(&(len - 1).to_string());
        self.set_len(len - 1);
        last
    }

    /// Removes and returns the first value.
    pub fn shift(&self) -> Value {
        self.splice(0, 1, Vec::new())
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Prepends a value and returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.splice(0, 0, vec![value.into()]);
        self.len()
    }

    /// Inserts a value at `index`.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    /// Removes the value at `index`.
    pub fn remove(&self, index: usize) -> Value {
        self.splice(index, 1, Vec::new())
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Replaces `delete_count` values at `start` with `items`, returning the
    /// removed values. Expressed as per-slot definitions, trailing deletions
    /// and a final `length` write so observers see every step.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if !self.is_list() || self.is_frozen() {
            return Vec::new();
        }
        let old = self.values();
        let start = start.min(old.len());
        let end = start.saturating_add(delete_count).min(old.len());

        let mut next = Vec::with_capacity(old.len() - (end - start) + items.len());
        next.extend_from_slice(&old[..start]);
        next.extend(items);
        next.extend_from_slice(&old[end..]);
        let removed = old[start..end].to_vec();

        for (index, value) in next.iter().enumerate() {
            if index >= old.len() || !old[index].strict_eq(value) {
                self.set(&index.to_string(), value.clone());
            }
        }
        for index in (next.len()..old.len()).rev() {
            self.delete(&index.to_string());
        }
        if next.len() != old.len() {
            self.set_len(next.len());
        }
        removed
    }

    /// Denies every further definition and deletion.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    /// Returns `true` once [`Target::freeze`] was called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity for the lifetime of the container.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Observer attached to this container, if any.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    /// Returns `true` once the container is observed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.0.observer.borrow().is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakTarget {
        WeakTarget(Rc::downgrade(&self.0))
    }
}

fn write_list(list: &mut Vec<Value>, key: &str, value: &Value) -> Option<Written> {
    if key == "length" {
        let len = value.to_number();
        if !(len >= 0.0 && len.fract() == 0.0 && len < 4_294_967_296.0) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = len as usize;
        let old = Value::from(list.len());
        let dropped = if len < list.len() {
            list.split_off(len)
        } else {
            list.resize(len, Value::Undefined);
            Vec::new()
        };
        return Some(Written {
            had: true,
            old,
            dropped,
        });
    }
    let index = key.parse::<usize>().ok()?;
    if let Some(slot) = list.get_mut(index) {
        let old = std::mem::replace(slot, value.clone());
        Some(Written {
            had: true,
            old,
            dropped: Vec::new(),
        })
    } else {
        list.resize(index, Value::Undefined);
        list.push(value.clone());
        Some(Written {
            had: false,
            old: Value::Undefined,
            dropped: Vec::new(),
        })
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.0.shape.borrow();
        match &*shape {
            Shape::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Shape::List(list) => f.debug_list().entries(list.iter()).finish(),
        }
    }
}
