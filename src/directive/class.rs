use std::rc::Rc;

use indexmap::IndexSet;
use rill_core::{NodeId, Value};
use rill_expr::Evaluator;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// `:class` and `::class`.
///
/// Accepts a class string, a mapping of class names to conditions, or an
/// array mixing both. Only classes entering or leaving the active set are
/// written.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFactory;

impl DirectiveFactory for ClassFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(ClassList {
            node,
            getter: cx.compiler().getter(&matched.value)?,
            active: IndexSet::new(),
            one_time: matched.is_one_time(),
            done: false,
        }))
    }
}

#[derive(Debug)]
struct ClassList {
    node: NodeId,
    getter: Rc<Evaluator>,
    active: IndexSet<String>,
    one_time: bool,
    done: bool,
}

impl Directive for ClassList {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let document = cx.document();
        let next = class_set(&self.getter.get(&cx.scope())?);
        for stale in self.active.difference(&next) {
            document.remove_class(self.node, stale)?;
        }
        for fresh in next.difference(&self.active) {
            document.add_class(self.node, fresh)?;
        }
        self.active = next;
        self.done = self.one_time;
        Ok(())
    }

    fn is_retired(&self) -> bool {
        self.done
    }
}

fn class_set(value: &Value) -> IndexSet<String> {
    let mut set = IndexSet::new();
    collect(value, &mut set);
    set
}

fn collect(value: &Value, set: &mut IndexSet<String>) {
    match value {
        Value::String(names) => {
            set.extend(names.split_whitespace().map(str::to_string));
        }
        Value::Array(list) => {
            for item in list.values() {
                collect(&item, set);
            }
        }
        Value::Object(map) => {
            for (names, on) in map.entries() {
                if on.is_truthy() {
                    set.extend(names.split_whitespace().map(str::to_string));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(value: serde_json::Value) -> Vec<String> {
        class_set(&Value::from_json(value)).into_iter().collect()
    }

    #[test]
    fn normalizes_every_accepted_shape() {
        assert_eq!(names(json!("a  b")), ["a", "b"]);
        assert_eq!(names(json!({"on": true, "off": 0, "x y": "yes"})), ["on", "x", "y"]);
        assert_eq!(names(json!(["a", {"b": true, "c": false}, null])), ["a", "b"]);
        assert!(names(json!(null)).is_empty());
    }
}
