use rill_core::NodeId;
use rill_expr::has_interpolation;

use super::{AttributeTemplate, BuildCx, RenderCx, Renderer, build_children};
use crate::{Error, directive::Directive};

/// Directives and interpolated attributes of a single element.
#[derive(Debug)]
pub struct VoidRenderer {
    node: NodeId,
    directives: Vec<Box<dyn Directive>>,
    bindings: Vec<AttributeTemplate>,
}

impl VoidRenderer {
    /// Scans the attributes of `node` once.
    ///
    /// # Errors
    ///
    /// Fails when a directive or attribute template does not compile.
    pub fn new(cx: &BuildCx<'_>, node: NodeId) -> Result<Self, Error> {
        let document = cx.document();
        let mut directives = Vec::new();
        let mut bindings = Vec::new();
        for (name, value) in document.attributes(node) {
            if let Some(resolved) = cx.directives().resolve(&name, &value) {
                let mut directive = resolved.factory.create(cx, node, &resolved.matched)?;
                directive.init(cx)?;
                directives.push((resolved.priority, directive));
                cx.consume_attribute(node, &name);
            } else if has_interpolation(&value) {
                bindings.push(AttributeTemplate::new(cx, node, &name, &value)?);
            }
        }
        directives.sort_by_key(|(priority, _)| *priority);
        Ok(Self {
            node,
            directives: directives.into_iter().map(|(_, d)| d).collect(),
            bindings,
        })
    }

    /// The element.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Returns `true` when the element produced any directive or binding.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        !self.directives.is_empty() || !self.bindings.is_empty()
    }

    /// Prunes retired directives, then renders the rest.
    ///
    /// # Errors
    ///
    /// Propagates the first directive failure.
    pub fn render_directives(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.directives.retain(|d| !d.is_retired());
        for directive in &mut self.directives {
            directive.render(cx)?;
        }
        Ok(())
    }

    /// Renders interpolated attributes.
    ///
    /// # Errors
    ///
    /// Propagates the first evaluation failure.
    pub fn render_bindings(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        for binding in &mut self.bindings {
            binding.render(cx)?;
        }
        Ok(())
    }
}

impl Renderer for VoidRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.render_directives(cx)?;
        if cx.document().is_connected(self.node) {
            self.render_bindings(cx)?;
        }
        Ok(())
    }
}

/// An element with children.
#[derive(Debug)]
pub struct ElementRenderer {
    element: VoidRenderer,
    children: ChildrenRenderer,
}

impl ElementRenderer {
    /// Classifies `node` and its subtree.
    ///
    /// # Errors
    ///
    /// Fails when anything in the subtree does not compile.
    pub fn new(cx: &BuildCx<'_>, node: NodeId) -> Result<Self, Error> {
        Ok(Self {
            element: VoidRenderer::new(cx, node)?,
            children: ChildrenRenderer::new(cx, node)?,
        })
    }

    /// Returns `true` when the element or a descendant has work to do.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.element.is_renderable() || !self.children.is_empty()
    }

    /// Returns `true` for a pass-through wrapper whose children can be
    /// spliced into the parent list.
    #[must_use]
    pub fn is_flattenable(&self) -> bool {
        !self.element.is_renderable() && !self.children.is_empty()
    }

    pub(crate) fn into_children(self) -> Vec<Box<dyn Renderer>> {
        self.children.renderers
    }
}

impl Renderer for ElementRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.element.render_directives(cx)?;
        if !cx.document().is_connected(self.element.node()) {
            return Ok(());
        }
        self.element.render_bindings(cx)?;
        self.children.render(cx)
    }
}

/// Renderers of the direct children of one node.
#[derive(Debug, Default)]
pub struct ChildrenRenderer {
    renderers: Vec<Box<dyn Renderer>>,
}

impl ChildrenRenderer {
    /// Classifies every child of `parent`.
    ///
    /// # Errors
    ///
    /// Fails when anything below `parent` does not compile.
    pub fn new(cx: &BuildCx<'_>, parent: NodeId) -> Result<Self, Error> {
        let mut renderers = Vec::new();
        build_children(cx, parent, &mut renderers)?;
        Ok(Self { renderers })
    }

    /// Number of child renderers after flattening.
    #[must_use]
    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    /// Returns `true` when no child needs rendering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl Renderer for ChildrenRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        for renderer in &mut self.renderers {
            renderer.render(cx)?;
        }
        Ok(())
    }
}
