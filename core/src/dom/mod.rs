//! In-memory document.
//!
//! [`Document`] is an arena of nodes addressed by [`NodeId`], shared through a
//! cheap-clone handle. It implements the part of the DOM the renderer relies
//! on: tree mutation, attributes, script-level properties, class list, inline
//! style, shadow roots, bubbling events, and serialization. Detached nodes stay
//! in the arena until [`Document::dispose`] frees their slot; a freed slot is
//! reused under a new generation, so stale ids resolve to nothing.

mod event;

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;

pub use event::{Event, Listener, ListenerId};

use crate::{error::Error, value::Value};

/// Identifier of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    /// Creates a first-generation [`NodeId`] for an arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// How many times the slot was reused before this id was handed out.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}v{generation}", self.index),
        }
    }
}

/// Coarse node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root.
    Document,
    /// A detached container whose children move on insertion.
    Fragment,
    /// A shadow root attached to a host element.
    ShadowRoot,
    /// An element.
    Element,
    /// A text node.
    Text,
    /// A comment (used as anchor by the renderer).
    Comment,
}

/// Counters of DOM writes, for asserting that renders stay minimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    /// Nodes inserted or moved.
    pub inserts: usize,
    /// Nodes detached.
    pub removals: usize,
    /// Attribute writes and removals.
    pub attribute_writes: usize,
    /// Script property writes.
    pub property_writes: usize,
    /// Text/comment data writes.
    pub text_writes: usize,
    /// Class list additions and removals.
    pub class_writes: usize,
    /// Inline style writes and removals.
    pub style_writes: usize,
}

#[derive(Debug, Clone, Default)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    properties: IndexMap<String, Value>,
    style: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Fragment,
    ShadowRoot { host: NodeId },
    Element(ElementData),
    Text(String),
    Comment(String),
}

struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
    listeners: Vec<(ListenerId, String, Listener)>,
}

impl Node {
    const fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            shadow: None,
            listeners: Vec::new(),
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Node storage with a free list.
#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Arena {
    fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(self.slots.len() - 1)
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

struct DocumentInner {
    nodes: RefCell<Arena>,
    stats: Cell<MutationStats>,
    next_listener: Cell<u64>,
    root: NodeId,
    body: NodeId,
}

/// Shared handle to an arena of DOM nodes.
#[derive(Clone)]
pub struct Document(Rc<DocumentInner>);

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.0.nodes.borrow().live())
            .field("stats", &self.0.stats.get())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Returns `true` for elements that never have children or a closing tag.
#[must_use]
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

impl Document {
    /// Creates a document containing an empty `body`.
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Arena::default();
        let root = arena.insert(Node::new(NodeData::Document));
        let mut body = Node::new(NodeData::Element(ElementData {
            tag: "body".to_string(),
            ..ElementData::default()
        }));
        body.parent = Some(root);
        let body = arena.insert(body);
        if let Some(node) = arena.get_mut(root) {
            node.children.push(body);
        }
        Self(Rc::new(DocumentInner {
            nodes: RefCell::new(arena),
            stats: Cell::new(MutationStats::default()),
            next_listener: Cell::new(1),
            root,
            body,
        }))
    }

    /// The document root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.0.root
    }

    /// The `body` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.0.body
    }

    /// Returns `true` when both handles share one arena.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn push(&self, data: NodeData) -> NodeId {
        self.0.nodes.borrow_mut().insert(Node::new(data))
    }

    fn bump(&self, update: impl FnOnce(&mut MutationStats)) {
        let mut stats = self.0.stats.get();
        update(&mut stats);
        self.0.stats.set(stats);
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.0.nodes.borrow().get(id).map(f)
    }

    fn with_element<R>(&self, id: NodeId, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
        self.0.nodes.borrow().get(id).and_then(|node| match &node.data {
            NodeData::Element(element) => Some(f(element)),
            _ => None,
        })
    }

    fn with_element_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut ElementData) -> R,
    ) -> Result<R, Error> {
        let mut nodes = self.0.nodes.borrow_mut();
        match nodes.get_mut(id).map(|node| &mut node.data) {
            Some(NodeData::Element(element)) => Ok(f(element)),
            _ => Err(Error::NotAnElement(id)),
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_string(),
            ..ElementData::default()
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Creates a detached comment.
    pub fn create_comment(&self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    /// Creates an empty fragment.
    pub fn create_fragment(&self) -> NodeId {
        self.push(NodeData::Fragment)
    }

    /// Attaches a shadow root to `host`.
    ///
    /// # Errors
    ///
    /// Fails when `host` is not an element or already has a shadow root.
    pub fn attach_shadow(&self, host: NodeId) -> Result<NodeId, Error> {
        if !self.is_element(host) {
            return Err(Error::NotAnElement(host));
        }
        if self.shadow_root(host).is_some() {
            return Err(Error::ShadowExists(host));
        }
        let shadow = self.push(NodeData::ShadowRoot { host });
        if let Some(node) = self.0.nodes.borrow_mut().get_mut(host) {
            node.shadow = Some(shadow);
        }
        Ok(shadow)
    }

    /// Shadow root hosted by `host`.
    #[must_use]
    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.with_node(host, |node| node.shadow).flatten()
    }

    /// Host element of a shadow root.
    #[must_use]
    pub fn shadow_host(&self, shadow: NodeId) -> Option<NodeId> {
        self.with_node(shadow, |node| match node.data {
            NodeData::ShadowRoot { host } => Some(host),
            _ => None,
        })
        .flatten()
    }

    /// Copies a node; `deep` includes descendants. Listeners and script
    /// properties are never copied. A disposed node copies as an empty
    /// fragment.
    pub fn clone_node(&self, id: NodeId, deep: bool) -> NodeId {
        let (data, children) = {
            let nodes = self.0.nodes.borrow();
            let Some(node) = nodes.get(id) else {
                drop(nodes);
                return self.create_fragment();
            };
            let data = match &node.data {
                NodeData::Element(element) => NodeData::Element(ElementData {
                    tag: element.tag.clone(),
                    attributes: element.attributes.clone(),
                    properties: IndexMap::new(),
                    style: element.style.clone(),
                }),
                NodeData::ShadowRoot { .. } | NodeData::Document => NodeData::Fragment,
                other => other.clone(),
            };
            (data, node.children.clone())
        };
        let copy = self.push(data);
        if deep {
            for child in children {
                let child_copy = self.clone_node(child, true);
                self.link(copy, child_copy, None);
            }
        }
        copy
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Classification of `id`.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.with_node(id, |node| match node.data {
            NodeData::Document => NodeKind::Document,
            NodeData::Fragment => NodeKind::Fragment,
            NodeData::ShadowRoot { .. } => NodeKind::ShadowRoot,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        })
        .unwrap_or(NodeKind::Fragment)
    }

    /// Returns `true` for elements.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Element
    }

    /// Tag name of an element.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<String> {
        self.with_element(id, |element| element.tag.clone())
    }

    /// Data of a text or comment node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<String> {
        self.with_node(id, |node| match &node.data {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text.clone()),
            _ => None,
        })
        .flatten()
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text => out.push_str(&self.text(id).unwrap_or_default()),
            NodeKind::Comment => {}
            _ => {
                for child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Replaces the data of a text or comment node.
    pub fn set_text(&self, id: NodeId, text: &str) {
        let written = {
            let mut nodes = self.0.nodes.borrow_mut();
            match nodes.get_mut(id).map(|node| &mut node.data) {
                Some(NodeData::Text(data) | NodeData::Comment(data)) => {
                    text.clone_into(data);
                    true
                }
                _ => false,
            }
        };
        if written {
            self.bump(|s| s.text_writes += 1);
        }
    }

    /// Parent of `id`.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.with_node(id, |node| node.parent).flatten()
    }

    /// Children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.with_node(id, |node| node.children.clone())
            .unwrap_or_default()
    }

    /// First child of `id`.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.with_node(id, |node| node.children.first().copied())
            .flatten()
    }

    /// Following sibling of `id`.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.with_node(parent, |node| {
            let position = node.children.iter().position(|c| *c == id)?;
            node.children.get(position + 1).copied()
        })
        .flatten()
    }

    /// Returns `true` when `node` is `ancestor` or lies beneath it.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Returns `true` when `id` is reachable from the document root, crossing
    /// shadow roots to their hosts.
    #[must_use]
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.0.root {
                return true;
            }
            match self.parent(current).or_else(|| self.shadow_host(current)) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself and shadow trees.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    /// `id`, its descendants and everything inside shadow roots hosted below
    /// it, in document order with each shadow tree before the light children.
    #[must_use]
    pub fn composed_subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
            stack.extend(self.shadow_root(next));
        }
        out
    }

    /// Descendant elements of `id` with the given tag, in document order.
    #[must_use]
    pub fn elements_by_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.tag(*n).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect()
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    fn detach(&self, id: NodeId) -> bool {
        let mut nodes = self.0.nodes.borrow_mut();
        let Some(parent) = nodes.get_mut(id).and_then(|node| node.parent.take()) else {
            return false;
        };
        if let Some(parent) = nodes.get_mut(parent) {
            parent.children.retain(|c| *c != id);
        }
        true
    }

    fn link(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let mut nodes = self.0.nodes.borrow_mut();
        let Some(siblings) = nodes.get_mut(parent).map(|node| &mut node.children) else {
            return;
        };
        let position = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        if let Some(child) = nodes.get_mut(child) {
            child.parent = Some(parent);
        }
    }

    /// Appends `child` to `parent`, moving it from its current position.
    ///
    /// # Errors
    ///
    /// See [`Document::insert_before`].
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` before `reference` (or last). Fragments insert their
    /// children instead of themselves.
    ///
    /// # Errors
    ///
    /// Fails when `child` is an ancestor of `parent`, when `reference` is not a
    /// child of `parent`, or when `parent` cannot have children.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), Error> {
        for id in [parent, child] {
            if !self.is_alive(id) {
                return Err(Error::Disposed(id));
            }
        }
        if matches!(self.kind(parent), NodeKind::Text | NodeKind::Comment) {
            return Err(Error::Hierarchy {
                parent,
                child,
                reason: "parent cannot have children",
            });
        }
        if self.contains(child, parent) {
            return Err(Error::Hierarchy {
                parent,
                child,
                reason: "node is an ancestor of the parent",
            });
        }
        if let Some(reference) = reference
            && self.parent(reference) != Some(parent)
        {
            return Err(Error::Hierarchy {
                parent,
                child,
                reason: "reference is not a child of the parent",
            });
        }
        if reference == Some(child) {
            return Ok(());
        }

        if self.kind(child) == NodeKind::Fragment {
            for grandchild in self.children(child) {
                self.detach(grandchild);
                self.link(parent, grandchild, reference);
                self.bump(|s| s.inserts += 1);
            }
            return Ok(());
        }

        self.detach(child);
        self.link(parent, child, reference);
        self.bump(|s| s.inserts += 1);
        Ok(())
    }

    /// Detaches `id` from its parent. No-op for detached nodes.
    pub fn remove(&self, id: NodeId) {
        if self.detach(id) {
            self.bump(|s| s.removals += 1);
        }
    }

    /// Frees the slot of `id`, detaching it first. Its listeners are dropped
    /// with it and every later use of `id` sees a missing node. Children keep
    /// pointing at the freed parent until they are disposed too.
    ///
    /// Returns `false` when `id` was already disposed.
    pub fn dispose(&self, id: NodeId) -> bool {
        self.detach(id);
        let released = self.0.nodes.borrow_mut().release(id);
        // Dropped after the borrow ends; listeners may own document handles.
        released.is_some()
    }

    /// Returns `true` while `id` refers to a node that was not disposed.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.with_node(id, |_| ()).is_some()
    }

    /// Number of nodes currently held by the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.0.nodes.borrow().live()
    }

    /// Puts `new` where `old` is and detaches `old`.
    ///
    /// # Errors
    ///
    /// Fails when `old` has no parent or the insertion is invalid.
    pub fn replace(&self, old: NodeId, new: NodeId) -> Result<(), Error> {
        let parent = self.parent(old).ok_or(Error::Detached(old))?;
        self.insert_before(parent, new, Some(old))?;
        self.remove(old);
        Ok(())
    }

    /// Exchanges the positions of two attached nodes, keeping their subtrees.
    ///
    /// # Errors
    ///
    /// Fails when either node is detached.
    pub fn swap(&self, a: NodeId, b: NodeId) -> Result<(), Error> {
        if a == b {
            return Ok(());
        }
        let parent_a = self.parent(a).ok_or(Error::Detached(a))?;
        let parent_b = self.parent(b).ok_or(Error::Detached(b))?;
        let next_a = self.next_sibling(a);
        let next_b = self.next_sibling(b);

        if next_a == Some(b) {
            self.insert_before(parent_a, b, Some(a))
        } else if next_b == Some(a) {
            self.insert_before(parent_b, a, Some(b))
        } else {
            self.insert_before(parent_b, a, next_b)?;
            self.insert_before(parent_a, b, next_a)
        }
    }

    // ------------------------------------------------------------------
    // Attributes, properties, classes, style
    // ------------------------------------------------------------------

    /// Attributes of an element, in source order.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        self.with_element(id, |element| element.attributes.clone())
            .unwrap_or_default()
    }

    /// Value of an attribute.
    #[must_use]
    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.with_element(id, |element| {
            element
                .attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    /// Returns `true` when the attribute is present.
    #[must_use]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    /// Sets an attribute, keeping its position when it already exists.
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an element.
    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) -> Result<(), Error> {
        self.with_element_mut(id, |element| {
            match element.attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => value.clone_into(existing),
                None => element
                    .attributes
                    .push((name.to_string(), value.to_string())),
            }
        })?;
        self.bump(|s| s.attribute_writes += 1);
        Ok(())
    }

    /// Removes an attribute, returning whether it was present.
    pub fn remove_attribute(&self, id: NodeId, name: &str) -> bool {
        let removed = self
            .with_element_mut(id, |element| {
                let before = element.attributes.len();
                element.attributes.retain(|(n, _)| n != name);
                before != element.attributes.len()
            })
            .unwrap_or(false);
        if removed {
            self.bump(|s| s.attribute_writes += 1);
        }
        removed
    }

    /// Reads a script property. Unset `value`, `checked` and `selected`
    /// fall back to their reflecting attributes.
    #[must_use]
    pub fn get_property(&self, id: NodeId, name: &str) -> Value {
        let stored = self
            .with_element(id, |element| element.properties.get(name).cloned())
            .flatten();
        if let Some(value) = stored {
            return value;
        }
        match name {
            "value" => Value::String(self.get_attribute(id, "value").unwrap_or_default()),
            "checked" | "selected" | "disabled" | "multiple" => {
                Value::Bool(self.has_attribute(id, name))
            }
            _ => Value::Undefined,
        }
    }

    /// Writes a script property.
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an element.
    pub fn set_property(&self, id: NodeId, name: &str, value: Value) -> Result<(), Error> {
        self.with_element_mut(id, |element| {
            element.properties.insert(name.to_string(), value);
        })?;
        self.bump(|s| s.property_writes += 1);
        Ok(())
    }

    /// Class names from the `class` attribute.
    #[must_use]
    pub fn classes(&self, id: NodeId) -> Vec<String> {
        self.get_attribute(id, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Returns `true` when the class is present.
    #[must_use]
    pub fn has_class(&self, id: NodeId, name: &str) -> bool {
        self.classes(id).iter().any(|c| c == name)
    }

    /// Adds a class. Returns `false` when it was already present.
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an element.
    pub fn add_class(&self, id: NodeId, name: &str) -> Result<bool, Error> {
        let mut classes = self.classes(id);
        if classes.iter().any(|c| c == name) {
            return Ok(false);
        }
        classes.push(name.to_string());
        self.write_classes(id, &classes)?;
        Ok(true)
    }

    /// Removes a class. Returns `false` when it was absent.
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an element.
    pub fn remove_class(&self, id: NodeId, name: &str) -> Result<bool, Error> {
        let mut classes = self.classes(id);
        let before = classes.len();
        classes.retain(|c| c != name);
        if before == classes.len() {
            return Ok(false);
        }
        self.write_classes(id, &classes)?;
        Ok(true)
    }

    fn write_classes(&self, id: NodeId, classes: &[String]) -> Result<(), Error> {
        let joined = classes.join(" ");
        self.with_element_mut(id, |element| {
            match element.attributes.iter_mut().find(|(n, _)| n == "class") {
                Some((_, existing)) => *existing = joined,
                None => element.attributes.push(("class".to_string(), joined)),
            }
        })?;
        self.bump(|s| s.class_writes += 1);
        Ok(())
    }

    /// Inline style declarations.
    #[must_use]
    pub fn style(&self, id: NodeId) -> Vec<(String, String)> {
        self.with_element(id, |element| {
            element
                .style
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    /// One inline style declaration.
    #[must_use]
    pub fn get_style(&self, id: NodeId, property: &str) -> Option<String> {
        self.with_element(id, |element| element.style.get(property).cloned())
            .flatten()
    }

    /// Sets an inline style declaration. A `unit` is appended to the value the
    /// way typed CSS values serialize (`10` + `px` is `10px`).
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an element.
    pub fn set_style(
        &self,
        id: NodeId,
        property: &str,
        value: &str,
        unit: Option<&str>,
    ) -> Result<(), Error> {
        let text = match unit {
            Some(unit) => format!("{value}{unit}"),
            None => value.to_string(),
        };
        self.with_element_mut(id, |element| {
            element.style.insert(property.to_string(), text);
        })?;
        self.bump(|s| s.style_writes += 1);
        Ok(())
    }

    /// Removes an inline style declaration.
    pub fn remove_style(&self, id: NodeId, property: &str) -> bool {
        let removed = self
            .with_element_mut(id, |element| element.style.shift_remove(property).is_some())
            .unwrap_or(false);
        if removed {
            self.bump(|s| s.style_writes += 1);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Attaches a listener for `kind` events on `id`.
    pub fn add_event_listener(&self, id: NodeId, kind: &str, listener: Listener) -> ListenerId {
        let handle = ListenerId(self.0.next_listener.get());
        self.0.next_listener.set(handle.0 + 1);
        if let Some(node) = self.0.nodes.borrow_mut().get_mut(id) {
            node.listeners.push((handle, kind.to_string(), listener));
        }
        handle
    }

    /// Detaches a listener. Returns `false` when it was not attached to `id`.
    pub fn remove_event_listener(&self, id: NodeId, handle: ListenerId) -> bool {
        let mut nodes = self.0.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(id) else {
            return false;
        };
        let before = node.listeners.len();
        node.listeners.retain(|(h, _, _)| *h != handle);
        before != node.listeners.len()
    }

    /// Number of listeners for `kind` on `id`.
    #[must_use]
    pub fn listener_count(&self, id: NodeId, kind: &str) -> usize {
        self.with_node(id, |node| node.listeners.iter().filter(|(_, k, _)| k == kind).count())
            .unwrap_or(0)
    }

    fn event_path(&self, target: NodeId, bubbles: bool) -> Vec<NodeId> {
        let mut path = vec![target];
        if !bubbles {
            return path;
        }
        let mut current = target;
        while let Some(next) = self.parent(current).or_else(|| self.shadow_host(current)) {
            path.push(next);
            current = next;
        }
        path
    }

    /// Dispatches `event` at `target`, bubbling through ancestors.
    ///
    /// Returns `false` when a listener cancelled the default action. Listeners
    /// keep running after one fails.
    ///
    /// # Errors
    ///
    /// Returns the first listener error.
    pub fn dispatch_event(&self, target: NodeId, event: &Event) -> anyhow::Result<bool> {
        event.set_target(target);
        let mut first_error = None;
        for node in self.event_path(target, event.bubbles()) {
            if event.propagation_stopped() {
                break;
            }
            let listeners: Vec<(ListenerId, Listener)> = self
                .with_node(node, |n| {
                    n.listeners
                        .iter()
                        .filter(|(_, kind, _)| kind == event.kind())
                        .map(|(h, _, l)| (*h, Rc::clone(l)))
                        .collect()
                })
                .unwrap_or_default();
            event.set_current_target(Some(node));
            for (handle, listener) in listeners {
                // A listener removed by an earlier one in this pass does not run.
                let attached = self
                    .with_node(node, |n| n.listeners.iter().any(|(h, _, _)| *h == handle))
                    .unwrap_or(false);
                if !attached {
                    continue;
                }
                if let Err(error) = listener(event) {
                    first_error.get_or_insert(error);
                }
            }
        }
        event.set_current_target(None);
        match first_error {
            Some(error) => Err(error),
            None => Ok(!event.default_prevented()),
        }
    }

    // ------------------------------------------------------------------
    // Statistics and serialization
    // ------------------------------------------------------------------

    /// Write counters accumulated since creation or the last reset.
    #[must_use]
    pub fn stats(&self) -> MutationStats {
        self.0.stats.get()
    }

    /// Zeroes the write counters.
    pub fn reset_stats(&self) {
        self.0.stats.set(MutationStats::default());
    }

    /// Serializes `id` including itself.
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serializes the children of `id`.
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text => out.push_str(&escape_html(&self.text(id).unwrap_or_default())),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&self.text(id).unwrap_or_default());
                out.push_str("-->");
            }
            NodeKind::Element => {
                let tag = self.tag(id).unwrap_or_default();
                out.push('<');
                out.push_str(&tag);
                for (name, value) in self.attributes(id) {
                    out.push(' ');
                    out.push_str(&name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_html(&value));
                        out.push('"');
                    }
                }
                let style = self.style(id);
                if !style.is_empty() {
                    let declarations: Vec<String> =
                        style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    out.push_str(" style=\"");
                    out.push_str(&escape_html(&declarations.join("; ")));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(&tag) {
                    return;
                }
                for child in self.children(id) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
            NodeKind::Document | NodeKind::Fragment | NodeKind::ShadowRoot => {
                for child in self.children(id) {
                    self.write_html(child, out);
                }
            }
        }
    }
}

/// Escapes text for inclusion in markup.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(doc: &Document, items: &[&str]) -> (NodeId, Vec<NodeId>) {
        let ul = doc.create_element("ul");
        doc.append_child(doc.body(), ul).expect("append");
        let lis = items
            .iter()
            .map(|text| {
                let li = doc.create_element("li");
                let t = doc.create_text(text);
                doc.append_child(li, t).expect("append");
                doc.append_child(ul, li).expect("append");
                li
            })
            .collect();
        (ul, lis)
    }

    #[test]
    fn swap_handles_adjacent_and_distant_nodes() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, &["a", "b", "c", "d"]);
        doc.swap(lis[0], lis[1]).expect("swap");
        assert_eq!(doc.text_content(ul), "bacd");
        doc.swap(lis[3], lis[2]).expect("swap");
        assert_eq!(doc.text_content(ul), "badc");
        doc.swap(lis[1], lis[2]).expect("swap");
        assert_eq!(doc.text_content(ul), "cadb");
    }

    #[test]
    fn connectivity_crosses_shadow_roots() {
        let doc = Document::new();
        let host = doc.create_element("x-app");
        let shadow = doc.attach_shadow(host).expect("shadow");
        let inner = doc.create_element("p");
        doc.append_child(shadow, inner).expect("append");
        assert!(!doc.is_connected(inner));
        doc.append_child(doc.body(), host).expect("append");
        assert!(doc.is_connected(inner));
        assert!(doc.attach_shadow(host).is_err());
    }

    #[test]
    fn fragments_move_their_children() {
        let doc = Document::new();
        let fragment = doc.create_fragment();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.append_child(fragment, a).expect("append");
        doc.append_child(fragment, b).expect("append");
        doc.append_child(doc.body(), fragment).expect("append");
        assert!(doc.children(fragment).is_empty());
        assert_eq!(doc.text_content(doc.body()), "ab");
    }

    #[test]
    fn refuses_cycles() {
        let doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).expect("append");
        assert!(doc.append_child(inner, outer).is_err());
    }

    #[test]
    fn class_list_reflects_into_attribute() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "a").expect("attr");
        assert!(doc.add_class(div, "b").expect("class"));
        assert!(!doc.add_class(div, "a").expect("class"));
        assert!(doc.remove_class(div, "a").expect("class"));
        assert_eq!(doc.get_attribute(div, "class").as_deref(), Some("b"));
    }

    #[test]
    fn events_bubble_and_track_targets() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, &["a"]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        doc.add_event_listener(
            ul,
            "click",
            Rc::new(move |event: &Event| {
                sink.borrow_mut()
                    .push((event.target(), event.current_target()));
                event.prevent_default();
                Ok(())
            }),
        );
        let proceed = doc.dispatch_event(lis[0], &Event::new("click")).expect("dispatch");
        assert!(!proceed);
        assert_eq!(*seen.borrow(), vec![(Some(lis[0]), Some(ul))]);

        let quiet = doc
            .dispatch_event(lis[0], &Event::new("click").non_bubbling())
            .expect("dispatch");
        assert!(quiet);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn removed_listeners_stop_firing() {
        let doc = Document::new();
        let button = doc.create_element("button");
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let handle = doc.add_event_listener(
            button,
            "click",
            Rc::new(move |_: &Event| {
                sink.set(sink.get() + 1);
                Ok(())
            }),
        );
        doc.dispatch_event(button, &Event::new("click")).expect("dispatch");
        assert!(doc.remove_event_listener(button, handle));
        doc.dispatch_event(button, &Event::new("click")).expect("dispatch");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn serializes_markup() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "title", "a\"b").expect("attr");
        doc.set_style(div, "width", "10", Some("px")).expect("style");
        let text = doc.create_text("<x>");
        doc.append_child(div, text).expect("append");
        let input = doc.create_element("input");
        doc.append_child(div, input).expect("append");
        assert_eq!(
            doc.outer_html(div),
            "<div title=\"a&quot;b\" style=\"width: 10px\">&lt;x&gt;<input></div>"
        );
    }

    #[test]
    fn property_defaults_follow_attributes() {
        let doc = Document::new();
        let input = doc.create_element("input");
        doc.set_attribute(input, "value", "x").expect("attr");
        doc.set_attribute(input, "checked", "").expect("attr");
        assert_eq!(doc.get_property(input, "value").to_display(), "x");
        assert!(doc.get_property(input, "checked").is_truthy());
        doc.set_property(input, "value", Value::from("y")).expect("prop");
        assert_eq!(doc.get_property(input, "value").to_display(), "y");
        let copy = doc.clone_node(input, true);
        assert_eq!(doc.get_property(copy, "value").to_display(), "x");
    }

    #[test]
    fn disposed_slots_are_reused_under_a_new_generation() {
        let doc = Document::new();
        let before = doc.node_count();
        let div = doc.create_element("div");
        doc.append_child(doc.body(), div).expect("append");
        doc.add_event_listener(div, "click", Rc::new(|_: &Event| Ok(())));

        assert!(doc.dispose(div));
        assert!(!doc.dispose(div));
        assert_eq!(doc.node_count(), before);
        assert!(doc.children(doc.body()).is_empty());
        assert!(!doc.is_alive(div));
        assert_eq!(doc.listener_count(div, "click"), 0);
        assert_eq!(doc.tag(div), None);

        let span = doc.create_element("span");
        assert_eq!(span.index(), div.index());
        assert_ne!(span, div);
        assert!(matches!(
            doc.append_child(doc.body(), div),
            Err(Error::Disposed(_))
        ));
    }

    #[test]
    fn composed_subtree_enters_shadow_roots() {
        let doc = Document::new();
        let host = doc.create_element("x-card");
        let shadow = doc.attach_shadow(host).expect("shadow");
        let inner = doc.create_element("p");
        doc.append_child(shadow, inner).expect("append");
        let light = doc.create_text("light");
        doc.append_child(host, light).expect("append");
        assert_eq!(doc.composed_subtree(host), vec![host, shadow, inner, light]);
        assert_eq!(doc.descendants(host), vec![light]);
    }
}
