//! Path watchers.
//!
//! A watcher re-evaluates its path after every state change reaching the
//! component and calls its handler when the canonical form of the value
//! differs from the last one seen.

use std::{cell::RefCell, fmt, rc::Rc};

use rill_core::Value;
use rill_expr::{Evaluator, Locals};

use super::Component;
use crate::Error;

/// Handle returned by [`Component::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

type WatchHandler = Rc<dyn Fn(&Component, &Value, &Value)>;

pub(super) struct Watcher {
    id: WatchId,
    getter: Rc<Evaluator>,
    last: RefCell<(Value, String)>,
    handler: WatchHandler,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("path", &self.getter.source())
            .finish_non_exhaustive()
    }
}

impl Component {
    /// Calls `handler(component, new, old)` whenever the value at `path`
    /// changes.
    ///
    /// # Errors
    ///
    /// Fails when `path` does not compile or cannot be evaluated now.
    pub fn watch(
        &self,
        path: &str,
        handler: impl Fn(&Self, &Value, &Value) + 'static,
    ) -> Result<WatchId, Error> {
        let getter = self.compiler().getter(path)?;
        let current = self.evaluate(&getter)?;
        let canonical = current.canonical();
        let id = WatchId(self.0.next_watch.get());
        self.0.next_watch.set(id.0 + 1);
        self.0.watchers.borrow_mut().push(Rc::new(Watcher {
            id,
            getter,
            last: RefCell::new((current, canonical)),
            handler: Rc::new(handler),
        }));
        Ok(id)
    }

    /// Removes a watcher. Returns `false` when it was already gone.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut watchers = self.0.watchers.borrow_mut();
        let before = watchers.len();
        watchers.retain(|w| w.id != id);
        before != watchers.len()
    }

    fn evaluate(&self, getter: &Evaluator) -> Result<Value, Error> {
        let state = self.state();
        let locals = Locals::new();
        Ok(getter.get(&self.scope_chain(&state, &locals))?)
    }

    pub(super) fn notify_watchers(&self) {
        let watchers: Vec<Rc<Watcher>> = self.0.watchers.borrow().clone();
        for watcher in watchers {
            let current = match self.evaluate(&watcher.getter) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(
                        path = watcher.getter.source(),
                        error = %error,
                        "watched path failed to evaluate"
                    );
                    continue;
                }
            };
            let canonical = current.canonical();
            if watcher.last.borrow().1 == canonical {
                continue;
            }
            let (old, _) = watcher.last.replace((current.clone(), canonical));
            (watcher.handler)(self, &current, &old);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use crate::{Definition, Options, Runtime};

    #[test]
    fn watchers_fire_on_path_changes_only() {
        let runtime = Runtime::new(Options::debug());
        runtime
            .define(
                "x-watch",
                Definition::new("<p></p>").state(json!({"user": {"name": "a"}, "other": 1})),
            )
            .expect("define");
        let component = runtime.create_element("x-watch").expect("create");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = component
            .watch("user.name", move |_, new, old| {
                sink.borrow_mut()
                    .push(format!("{}->{}", old.to_display(), new.to_display()));
            })
            .expect("watch");

        component.state().set("other", 2);
        let user = component.state().get("user");
        user.as_target().expect("object").set("name", "b");
        assert_eq!(*seen.borrow(), vec!["a->b"]);

        assert!(component.unwatch(id));
        user.as_target().expect("object").set("name", "c");
        assert_eq!(seen.borrow().len(), 1);
        assert!(!component.unwatch(id));
    }
}
