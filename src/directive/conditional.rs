use std::rc::Rc;

use rill_core::NodeId;
use rill_expr::Evaluator;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// `*if`: toggles presence by trading places with a comment anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalFactory;

impl DirectiveFactory for ConditionalFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        let condition = cx.compiler().getter(&matched.value)?;
        let anchor = cx.document().create_comment("if");
        cx.component().register_anchor(node, anchor);
        Ok(Box::new(Conditional {
            node,
            anchor,
            condition,
        }))
    }
}

#[derive(Debug)]
struct Conditional {
    node: NodeId,
    anchor: NodeId,
    condition: Rc<Evaluator>,
}

impl Directive for Conditional {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let document = cx.document();
        let visible = self.condition.get(&cx.scope())?.is_truthy();
        if visible {
            if document.parent(self.anchor).is_some() {
                document.replace(self.anchor, self.node)?;
                if let Some(runtime) = cx.component().runtime() {
                    runtime.connect_tree(self.node);
                }
            }
        } else if document.parent(self.node).is_some() {
            document.replace(self.node, self.anchor)?;
            if let Some(runtime) = cx.component().runtime() {
                runtime.disconnect_tree(self.node);
            }
        }
        Ok(())
    }
}
