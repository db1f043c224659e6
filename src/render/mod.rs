//! The renderer tree.
//!
//! A component's shadow tree is classified once, at construction, into a
//! tree of [`Renderer`]s:
//!
//! - [`VoidRenderer`]: directives and interpolated attributes of one element.
//! - [`ElementRenderer`]: a void renderer plus a [`ChildrenRenderer`].
//! - [`ChildrenRenderer`]: the renderers of a node's direct children.
//! - [`TextRenderer`] / [`RawHtmlRenderer`]: interpolated text.
//! - [`LoopRenderer`]: a `*for` template and its keyed items.
//! - [`CustomRenderer`]: a nested component host.
//!
//! Rendering a composite runs its directives first and then, only while its
//! node is still connected, its bindings and children. Elements without own
//! directives or bindings are flattened into their parent's list.

mod custom;
mod element;
mod repeat;
mod text;

use std::fmt;

use rill_core::{Document, NodeId, NodeKind, Target};
use rill_expr::{Compiler, Locals, ScopeChain};

use crate::{
    Error, Options,
    component::Component,
    directive::DirectiveRegistry,
    runtime::Runtime,
};

pub use custom::CustomRenderer;
pub use element::{ChildrenRenderer, ElementRenderer, VoidRenderer};
pub use repeat::{LoopBinding, LoopRenderer};
pub use text::{AttributeTemplate, RawHtmlRenderer, TextRenderer};

/// Attribute that excludes an element and its subtree from compilation.
pub const SKIP_ATTRIBUTE: &str = "*skip";
/// Attribute that turns an element into a loop template.
pub const LOOP_ATTRIBUTE: &str = "*for";
/// Track-by expression of a loop template.
pub const TRACK_BY_ATTRIBUTE: &str = "by";

/// A node of the renderer tree.
pub trait Renderer: fmt::Debug {
    /// Brings the owned DOM in line with the current state.
    ///
    /// # Errors
    ///
    /// Evaluation, DOM and data-shape failures.
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error>;
}

// ============================================================================
// Contexts
// ============================================================================

/// Construction-time context: everything needed to classify nodes.
#[derive(Debug, Clone, Copy)]
pub struct BuildCx<'a> {
    component: &'a Component,
}

impl<'a> BuildCx<'a> {
    pub(crate) const fn new(component: &'a Component) -> Self {
        Self { component }
    }

    /// The component being built.
    #[must_use]
    pub const fn component(&self) -> &'a Component {
        self.component
    }

    /// The document the component lives in.
    #[must_use]
    pub fn document(&self) -> &'a Document {
        self.component.document()
    }

    /// The shared expression compiler.
    #[must_use]
    pub fn compiler(&self) -> &'a Compiler {
        self.component.compiler()
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> &'a Options {
        self.component.options()
    }

    /// The directive registry.
    #[must_use]
    pub fn directives(&self) -> &'a DirectiveRegistry {
        self.component.directives()
    }

    /// The owning runtime.
    ///
    /// # Errors
    ///
    /// Fails when the runtime has been dropped.
    pub fn runtime(&self) -> Result<Runtime, Error> {
        self.component.runtime().ok_or(Error::Dropped)
    }

    /// Removes a consumed attribute unless debug mode keeps it visible.
    pub fn consume_attribute(&self, node: NodeId, name: &str) {
        if !self.options().debug {
            self.document().remove_attribute(node, name);
        }
    }
}

/// Render-time context: the component, its state and the caller locals.
#[derive(Debug)]
pub struct RenderCx<'a> {
    component: &'a Component,
    state: Target,
    locals: &'a Locals,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(component: &'a Component, locals: &'a Locals) -> Self {
        Self {
            component,
            state: component.state(),
            locals,
        }
    }

    /// A context with different locals, used for loop items.
    #[must_use]
    pub fn with_locals<'b>(&'b self, locals: &'b Locals) -> RenderCx<'b> {
        RenderCx {
            component: self.component,
            state: self.state.clone(),
            locals,
        }
    }

    /// The component being rendered.
    #[must_use]
    pub const fn component(&self) -> &'a Component {
        self.component
    }

    /// The document.
    #[must_use]
    pub fn document(&self) -> &'a Document {
        self.component.document()
    }

    /// Locals visible at this point of the tree.
    #[must_use]
    pub const fn locals(&self) -> &'a Locals {
        self.locals
    }

    /// The scope chain expressions evaluate against.
    #[must_use]
    pub fn scope(&self) -> ScopeChain<'_> {
        self.component
            .compiler()
            .scope()
            .with_component(self.component)
            .with_state(&self.state)
            .with_locals(self.locals)
    }

    /// A build context for renderers created during render (loop items).
    #[must_use]
    pub const fn build(&self) -> BuildCx<'a> {
        BuildCx::new(self.component)
    }
}

// ============================================================================
// Classification
// ============================================================================

fn is_custom(cx: &BuildCx<'_>, node: NodeId) -> bool {
    cx.document().tag(node).is_some_and(|tag| {
        tag.contains('-') && cx.component().runtime().is_some_and(|rt| rt.is_defined(&tag))
    })
}

/// Builds the renderer for one element that must not be flattened away
/// (loop items).
///
/// # Errors
///
/// Propagates compile and DOM errors from the subtree.
pub fn build_element(cx: &BuildCx<'_>, node: NodeId) -> Result<Box<dyn Renderer>, Error> {
    if is_custom(cx, node) {
        return Ok(Box::new(CustomRenderer::new(cx, node)?));
    }
    if cx.document().children(node).is_empty() {
        Ok(Box::new(VoidRenderer::new(cx, node)?))
    } else {
        Ok(Box::new(ElementRenderer::new(cx, node)?))
    }
}

/// Classifies the children of `parent`, appending renderers to `out`.
pub(crate) fn build_children(
    cx: &BuildCx<'_>,
    parent: NodeId,
    out: &mut Vec<Box<dyn Renderer>>,
) -> Result<(), Error> {
    let document = cx.document();
    for child in document.children(parent) {
        match document.kind(child) {
            NodeKind::Text => {
                let text = document.text(child).unwrap_or_default();
                if let Some(renderer) = text::build_text(cx, child, &text)? {
                    out.push(renderer);
                }
                continue;
            }
            NodeKind::Element => {}
            _ => continue,
        }
        if document.has_attribute(child, SKIP_ATTRIBUTE) {
            cx.consume_attribute(child, SKIP_ATTRIBUTE);
            continue;
        }
        if document.has_attribute(child, LOOP_ATTRIBUTE) {
            out.push(Box::new(LoopRenderer::new(cx, child)?));
            continue;
        }
        if is_custom(cx, child) {
            out.push(Box::new(CustomRenderer::new(cx, child)?));
            continue;
        }
        if document.children(child).is_empty() {
            let void = VoidRenderer::new(cx, child)?;
            if void.is_renderable() {
                out.push(Box::new(void));
            }
            continue;
        }
        let element = ElementRenderer::new(cx, child)?;
        if element.is_flattenable() {
            out.extend(element.into_children());
        } else if element.is_renderable() {
            out.push(Box::new(element));
        }
    }
    Ok(())
}
