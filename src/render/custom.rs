use rill_core::NodeId;

use super::{BuildCx, ChildrenRenderer, RenderCx, Renderer, VoidRenderer};
use crate::{Error, component::Component};

/// A nested component host.
///
/// The host's own attributes and light-DOM children are evaluated in the
/// outer component's scope; the nested component renders its shadow tree on
/// its own schedule. Connection changes of the host are forwarded to the
/// nested component's lifecycle hooks.
#[derive(Debug)]
pub struct CustomRenderer {
    node: NodeId,
    component: Component,
    element: VoidRenderer,
    children: ChildrenRenderer,
    attached: bool,
}

impl CustomRenderer {
    /// Upgrades `node` and classifies its attributes and light DOM.
    ///
    /// # Errors
    ///
    /// Fails when the nested component cannot be constructed or its host
    /// attributes do not compile.
    pub fn new(cx: &BuildCx<'_>, node: NodeId) -> Result<Self, Error> {
        let tag = cx.document().tag(node).unwrap_or_default();
        let component = cx
            .runtime()?
            .upgrade(node)?
            .ok_or(Error::NotDefined(tag))?;
        Ok(Self {
            node,
            component,
            element: VoidRenderer::new(cx, node)?,
            children: ChildrenRenderer::new(cx, node)?,
            attached: false,
        })
    }

    /// The nested component.
    #[must_use]
    pub const fn component(&self) -> &Component {
        &self.component
    }
}

impl Renderer for CustomRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.element.render_directives(cx)?;
        let connected = cx.document().is_connected(self.node);
        if connected {
            self.element.render_bindings(cx)?;
            self.children.render(cx)?;
        }
        if connected != self.attached {
            self.attached = connected;
            if connected {
                self.component.connected();
            } else {
                self.component.disconnected();
            }
        }
        Ok(())
    }
}
