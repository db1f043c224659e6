use std::rc::Rc;

use rill_core::NodeId;
use rill_expr::Evaluator;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    component::WeakComponent,
    render::{BuildCx, RenderCx},
};

/// `.name`: assigns a script property on every render.
///
/// Attribute names arrive lowercased, so `.item-count` targets `itemCount`.
/// When the element hosts a component, that component is asked to render
/// afterwards since property writes are not observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyFactory;

impl DirectiveFactory for PropertyFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(Property {
            node,
            name: camel_case(&matched.name),
            getter: cx.compiler().getter(&matched.value)?,
            child: WeakComponent::default(),
        }))
    }
}

#[derive(Debug)]
struct Property {
    node: NodeId,
    name: String,
    getter: Rc<Evaluator>,
    child: WeakComponent,
}

impl Directive for Property {
    fn init(&mut self, cx: &BuildCx<'_>) -> Result<(), Error> {
        if let Some(child) = cx.runtime()?.component(self.node) {
            self.child = child.downgrade();
        }
        Ok(())
    }

    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let value = self.getter.get(&cx.scope())?;
        cx.document().set_property(self.node, &self.name, value)?;
        if let Some(child) = self.child.upgrade() {
            child.render();
        }
        Ok(())
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::camel_case;

    #[test]
    fn dashes_become_camel_case() {
        assert_eq!(camel_case("value"), "value");
        assert_eq!(camel_case("item-count"), "itemCount");
        assert_eq!(camel_case("a-b-c"), "aBC");
    }
}
