//! Host-event backed pub/sub.

use std::{cell::Cell, rc::Rc};

use rill_core::{Event, Listener, ListenerId, Value};

use super::Component;

/// Event dispatched on the host when a production-mode render fails.
pub const RENDER_ERROR_EVENT: &str = "render:error";

impl Component {
    /// Listens for `kind` events on the host.
    pub fn on(
        &self,
        kind: &str,
        handler: impl Fn(&Event) -> anyhow::Result<()> + 'static,
    ) -> ListenerId {
        self.document()
            .add_event_listener(self.host(), kind, Rc::new(handler))
    }

    /// Listens for the next `kind` event only.
    pub fn once(
        &self,
        kind: &str,
        handler: impl Fn(&Event) -> anyhow::Result<()> + 'static,
    ) -> ListenerId {
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let weak = self.downgrade();
        let own = Rc::clone(&slot);
        let listener: Listener = Rc::new(move |event| {
            if let (Some(id), Some(component)) = (own.take(), weak.upgrade()) {
                component.off(id);
            }
            handler(event)
        });
        let id = self.document().add_event_listener(self.host(), kind, listener);
        slot.set(Some(id));
        id
    }

    /// Removes a listener added with [`Component::on`] or [`Component::once`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.document().remove_event_listener(self.host(), id)
    }

    /// Dispatches a non-bubbling `kind` event on the host.
    ///
    /// Returns `false` when a listener prevented the default action.
    ///
    /// # Errors
    ///
    /// Returns the first listener failure.
    pub fn emit(&self, kind: &str, detail: impl Into<Value>) -> anyhow::Result<bool> {
        let event = Event::with_detail(kind, detail.into()).non_bubbling();
        self.document().dispatch_event(self.host(), &event)
    }
}
