//! DOM events and listeners.

use std::{cell::Cell, fmt, rc::Rc};

use super::NodeId;
use crate::value::Value;

/// Callback attached to a node for one event type.
pub type Listener = Rc<dyn Fn(&Event) -> anyhow::Result<()>>;

/// Handle returned by [`Document::add_event_listener`](super::Document::add_event_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// An event travelling from its target up through the ancestors.
pub struct Event {
    kind: String,
    bubbles: bool,
    detail: Value,
    target: Cell<Option<NodeId>>,
    current_target: Cell<Option<NodeId>>,
    default_prevented: Cell<bool>,
    stopped: Cell<bool>,
}

impl Event {
    /// Creates a bubbling event without detail.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_detail(kind, Value::Undefined)
    }

    /// Creates a bubbling event carrying `detail`.
    #[must_use]
    pub fn with_detail(kind: impl Into<String>, detail: Value) -> Self {
        Self {
            kind: kind.into(),
            bubbles: true,
            detail,
            target: Cell::new(None),
            current_target: Cell::new(None),
            default_prevented: Cell::new(false),
            stopped: Cell::new(false),
        }
    }

    /// Makes the event stay on its target.
    #[must_use]
    pub fn non_bubbling(mut self) -> Self {
        self.bubbles = false;
        self
    }

    /// The event type, e.g. `click`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the event bubbles.
    #[must_use]
    pub const fn bubbles(&self) -> bool {
        self.bubbles
    }

    /// Payload supplied by the dispatcher.
    #[must_use]
    pub const fn detail(&self) -> &Value {
        &self.detail
    }

    /// The node the event was dispatched at.
    #[must_use]
    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    /// The node whose listener is currently running.
    #[must_use]
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target.get()
    }

    /// Cancels the default action.
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    /// Returns `true` once a listener called [`Event::prevent_default`].
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Stops the event from reaching further ancestors.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub(crate) fn propagation_stopped(&self) -> bool {
        self.stopped.get()
    }

    pub(crate) fn set_target(&self, node: NodeId) {
        self.target.set(Some(node));
    }

    pub(crate) fn set_current_target(&self, node: Option<NodeId>) {
        self.current_target.set(node);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("target", &self.target.get())
            .field("current_target", &self.current_target.get())
            .field("default_prevented", &self.default_prevented.get())
            .finish_non_exhaustive()
    }
}
