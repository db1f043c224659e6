use std::rc::Rc;

use rill_core::{NodeId, Value};
use rill_expr::Evaluator;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// `:name` and `::name`: mirrors an expression onto an attribute.
///
/// Booleans and nullish values toggle the attribute's presence; anything
/// else is written as its display string.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingFactory;

impl DirectiveFactory for BindingFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(Binding {
            node,
            name: matched.name.clone(),
            getter: cx.compiler().getter(&matched.value)?,
            one_time: matched.is_one_time(),
            done: false,
        }))
    }
}

#[derive(Debug)]
struct Binding {
    node: NodeId,
    name: String,
    getter: Rc<Evaluator>,
    one_time: bool,
    done: bool,
}

impl Directive for Binding {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let document = cx.document();
        let value = self.getter.get(&cx.scope())?;
        match value {
            Value::Bool(false) | Value::Undefined | Value::Null => {
                document.remove_attribute(self.node, &self.name);
            }
            Value::Bool(true) => {
                if !document.has_attribute(self.node, &self.name) {
                    document.set_attribute(self.node, &self.name, "")?;
                }
            }
            other => {
                let text = other.to_display();
                if document.get_attribute(self.node, &self.name).as_deref() != Some(text.as_str()) {
                    document.set_attribute(self.node, &self.name, &text)?;
                }
            }
        }
        self.done = self.one_time;
        Ok(())
    }

    fn is_retired(&self) -> bool {
        self.done
    }
}
