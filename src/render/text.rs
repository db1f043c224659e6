use std::{collections::HashMap, rc::Rc};

use rill_core::{NodeId, dom::escape_html, html::parse_fragment};
use rill_expr::{
    Template, has_interpolation,
    template::{Part, display},
};

use super::{BuildCx, RenderCx, Renderer};
use crate::Error;

pub(super) fn build_text(
    cx: &BuildCx<'_>,
    node: NodeId,
    text: &str,
) -> Result<Option<Box<dyn Renderer>>, Error> {
    if !has_interpolation(text) {
        return Ok(None);
    }
    let template = cx.compiler().template(text)?;
    if template.has_raw() {
        Ok(Some(Box::new(RawHtmlRenderer::new(cx, node, template)?)))
    } else {
        Ok(Some(Box::new(TextRenderer { node, template })))
    }
}

/// An interpolated text node.
#[derive(Debug)]
pub struct TextRenderer {
    node: NodeId,
    template: Rc<Template>,
}

impl Renderer for TextRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let text = self.template.render(&cx.scope())?;
        let document = cx.document();
        if document.text(self.node).as_deref() != Some(text.as_str()) {
            document.set_text(self.node, &text);
        }
        Ok(())
    }
}

/// Text containing `{{{ }}}`: the rendered markup is parsed and inserted
/// after a comment anchor. Parsed nodes are cached per rendered string.
#[derive(Debug)]
pub struct RawHtmlRenderer {
    anchor: NodeId,
    template: Rc<Template>,
    current: Option<String>,
    nodes: Vec<NodeId>,
    cache: HashMap<String, Vec<NodeId>>,
}

impl RawHtmlRenderer {
    /// Replaces the text node with an anchor comment.
    ///
    /// # Errors
    ///
    /// Fails when the text node is detached.
    pub fn new(cx: &BuildCx<'_>, node: NodeId, template: Rc<Template>) -> Result<Self, Error> {
        let document = cx.document();
        let anchor = document.create_comment("html");
        document.replace(node, anchor)?;
        Ok(Self {
            anchor,
            template,
            current: None,
            nodes: Vec::new(),
            cache: HashMap::new(),
        })
    }

    fn markup(&self, cx: &RenderCx<'_>) -> Result<String, Error> {
        let scope = cx.scope();
        let mut out = String::new();
        for part in self.template.parts() {
            match part {
                Part::Text(text) => out.push_str(&escape_html(text)),
                Part::Expr {
                    evaluator,
                    raw: true,
                } => out.push_str(&display(&evaluator.get(&scope)?)),
                Part::Expr {
                    evaluator,
                    raw: false,
                } => out.push_str(&escape_html(&display(&evaluator.get(&scope)?))),
            }
        }
        Ok(out)
    }
}

impl Renderer for RawHtmlRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let markup = self.markup(cx)?;
        if self.current.as_deref() == Some(markup.as_str()) {
            return Ok(());
        }
        let document = cx.document();
        for node in self.nodes.drain(..) {
            document.remove(node);
        }
        let nodes = match self.cache.get(&markup) {
            Some(nodes) => nodes.clone(),
            None => {
                let fragment = parse_fragment(document, &markup)?;
                let nodes = document.children(fragment);
                document.dispose(fragment);
                self.cache.insert(markup.clone(), nodes.clone());
                nodes
            }
        };
        let parent = document
            .parent(self.anchor)
            .ok_or(rill_core::Error::Detached(self.anchor))?;
        let next = document.next_sibling(self.anchor);
        for node in &nodes {
            document.insert_before(parent, *node, next)?;
        }
        self.nodes = nodes;
        self.current = Some(markup);
        Ok(())
    }
}

/// An attribute whose value contains interpolation.
#[derive(Debug)]
pub struct AttributeTemplate {
    node: NodeId,
    name: String,
    template: Rc<Template>,
}

impl AttributeTemplate {
    /// Compiles the attribute value.
    ///
    /// # Errors
    ///
    /// Fails when an embedded expression does not compile.
    pub fn new(cx: &BuildCx<'_>, node: NodeId, name: &str, value: &str) -> Result<Self, Error> {
        Ok(Self {
            node,
            name: name.to_string(),
            template: cx.compiler().template(value)?,
        })
    }
}

impl Renderer for AttributeTemplate {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let value = self.template.render(&cx.scope())?;
        let document = cx.document();
        if document.get_attribute(self.node, &self.name).as_deref() != Some(value.as_str()) {
            document.set_attribute(self.node, &self.name, &value)?;
        }
        Ok(())
    }
}
