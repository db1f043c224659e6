use rill_core::NodeId;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// `ref="name"`: publishes the element in the component's reference table
/// while it is connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFactory;

impl DirectiveFactory for ReferenceFactory {
    fn create(
        &self,
        _cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(Reference {
            node,
            name: matched.value.trim().to_string(),
        }))
    }
}

#[derive(Debug)]
struct Reference {
    node: NodeId,
    name: String,
}

impl Directive for Reference {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        if cx.document().is_connected(self.node) {
            cx.component().register_ref(&self.name, self.node);
        }
        Ok(())
    }
}
