use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use rill_core::{Event, Listener, ListenerId, NodeId};
use rill_expr::{Evaluator, Locals};

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// Guards recognized after an event name.
///
/// They apply in a fixed order whatever order they were written in:
/// `self`, then `prevent`, then `once`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Modifiers {
    /// Ignore events dispatched on descendants.
    pub self_only: bool,
    /// Call `preventDefault` before the handler.
    pub prevent: bool,
    /// Detach after the first handled event.
    pub once: bool,
}

impl Modifiers {
    /// Reads the modifiers of a match; unknown ones are ignored.
    #[must_use]
    pub fn from_match(matched: &Match) -> Self {
        Self {
            self_only: matched.has_modifier("self"),
            prevent: matched.has_modifier("prevent"),
            once: matched.has_modifier("once"),
        }
    }
}

/// `@name[.self][.prevent][.once]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFactory;

impl DirectiveFactory for EventFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(EventBinding {
            node,
            kind: matched.name.clone(),
            modifiers: Modifiers::from_match(matched),
            handler: cx.compiler().handler(&matched.value)?,
            locals: Rc::new(RefCell::new(Locals::new())),
        }))
    }
}

#[derive(Debug)]
struct EventBinding {
    node: NodeId,
    kind: String,
    modifiers: Modifiers,
    handler: Rc<Evaluator>,
    locals: Rc<RefCell<Locals>>,
}

impl Directive for EventBinding {
    fn init(&mut self, cx: &BuildCx<'_>) -> Result<(), Error> {
        let owner = cx.component().downgrade();
        let modifiers = self.modifiers;
        let handler = Rc::clone(&self.handler);
        let locals = Rc::clone(&self.locals);
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let node = self.node;

        let own = Rc::clone(&slot);
        let guarded = move |event: &Event| -> anyhow::Result<()> {
            if modifiers.self_only && event.target() != event.current_target() {
                return Ok(());
            }
            if modifiers.prevent {
                event.prevent_default();
            }
            let Some(component) = owner.upgrade() else {
                return Ok(());
            };
            if let Some(id) = own.take() {
                component.document().remove_event_listener(node, id);
            }
            let locals = locals.borrow().clone();
            component.handle_event(&handler, event, &locals)
        };

        let child = cx.runtime()?.component(self.node);
        match child {
            Some(child) if modifiers.once => {
                child.once(&self.kind, guarded);
            }
            _ => {
                let listener: Listener = Rc::new(guarded);
                let id = cx
                    .document()
                    .add_event_listener(self.node, &self.kind, listener);
                if modifiers.once {
                    slot.set(Some(id));
                }
            }
        }
        tracing::trace!(kind = %self.kind, ?modifiers, "event listener attached");
        Ok(())
    }

    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.locals.borrow_mut().clone_from(cx.locals());
        Ok(())
    }
}
