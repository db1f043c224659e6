//! Keyed list rendering for `*for`.
//!
//! The template element is taken out of the tree and replaced by a
//! `<!--for-->` end anchor; each collection entry gets a deep clone of the
//! template inserted before that anchor. Items are identified by their
//! track-by key (the `by` expression, or the position when absent), so a
//! reordered collection moves existing nodes instead of recreating them.

use std::rc::Rc;

use rill_core::{NodeId, Value};
use rill_expr::{Evaluator, Locals};

use super::{BuildCx, LOOP_ATTRIBUTE, RenderCx, Renderer, TRACK_BY_ATTRIBUTE, build_element};
use crate::Error;

/// Local name always bound to the item position.
pub const INDEX_LOCAL: &str = "$index";

/// The left-hand side of a `*for` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBinding {
    /// Name bound to each entry's value.
    pub value: String,
    /// Name bound to the entry key (array index or object key).
    pub key: Option<String>,
    /// Name bound to the position.
    pub index: Option<String>,
    /// The collection expression.
    pub source: String,
}

impl LoopBinding {
    /// Parses `value[, key[, index]] in expr`, optionally parenthesized.
    ///
    /// # Errors
    ///
    /// Fails on a missing `in`, an empty collection expression, or names that
    /// are not identifiers.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let invalid = || Error::LoopSyntax(text.to_string());
        let split = find_in_keyword(text).ok_or_else(invalid)?;
        let (names, source) = (text[..split].trim(), text[split + 2..].trim());
        if source.is_empty() {
            return Err(invalid());
        }
        let names = names
            .strip_prefix('(')
            .and_then(|n| n.strip_suffix(')'))
            .unwrap_or(names);
        let names: Vec<&str> = names.split(',').map(str::trim).collect();
        if names.len() > 3 || !names.iter().all(|n| is_identifier(n)) {
            return Err(invalid());
        }
        Ok(Self {
            value: names[0].to_string(),
            key: names.get(1).map(|n| (*n).to_string()),
            index: names.get(2).map(|n| (*n).to_string()),
            source: source.to_string(),
        })
    }

    fn locals(&self, parent: &Locals, key: Value, value: Value, index: usize) -> Locals {
        let mut locals = parent.clone();
        locals.insert(self.value.clone(), value);
        if let Some(name) = &self.key {
            locals.insert(name.clone(), key);
        }
        if let Some(name) = &self.index {
            locals.insert(name.clone(), Value::from(index));
        }
        locals.insert(INDEX_LOCAL.to_string(), Value::from(index));
        locals
    }
}

fn find_in_keyword(text: &str) -> Option<usize> {
    text.match_indices("in").map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back();
        let after = text[i + 2..].chars().next();
        before.is_some_and(|c| c.is_whitespace() || c == ')') && after.is_some_and(char::is_whitespace)
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Coerces a collection into `(key, value)` entries.
fn entries(collection: &Value) -> Result<Vec<(Value, Value)>, Error> {
    match collection {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::Array(list) => Ok(list
            .values()
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v))
            .collect()),
        Value::Object(map) => Ok(map
            .entries()
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect()),
        Value::Number(n) if n.is_finite() && *n >= 0.0 => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = *n as usize;
            Ok((0..count).map(|i| (Value::from(i), Value::from(i))).collect())
        }
        other => Err(Error::Shape {
            directive: LOOP_ATTRIBUTE.to_string(),
            expected: "an array, an object or a count",
            found: crate::error::describe(other),
        }),
    }
}

#[derive(Debug)]
struct LoopItem {
    node: NodeId,
    key: String,
    locals: Locals,
    renderer: Box<dyn Renderer>,
    reused: bool,
}

/// A `*for` loop.
#[derive(Debug)]
pub struct LoopRenderer {
    template: NodeId,
    anchor: NodeId,
    binding: LoopBinding,
    source: Rc<Evaluator>,
    track_by: Option<Rc<Evaluator>>,
    items: Vec<LoopItem>,
}

impl LoopRenderer {
    /// Detaches the template element `node` and leaves an end anchor in its
    /// place.
    ///
    /// # Errors
    ///
    /// Fails on malformed loop or track-by expressions.
    pub fn new(cx: &BuildCx<'_>, node: NodeId) -> Result<Self, Error> {
        let document = cx.document();
        let text = document.get_attribute(node, LOOP_ATTRIBUTE).unwrap_or_default();
        let binding = LoopBinding::parse(&text)?;
        let source = cx.compiler().getter(&binding.source)?;
        let track_by = document
            .get_attribute(node, TRACK_BY_ATTRIBUTE)
            .map(|by| cx.compiler().getter(&by))
            .transpose()?;
        if track_by.is_none() && cx.options().warn_default_track_by {
            tracing::warn!(
                expression = %text,
                "loop has no `by` attribute; items are keyed by position"
            );
        }
        document.remove_attribute(node, LOOP_ATTRIBUTE);
        document.remove_attribute(node, TRACK_BY_ATTRIBUTE);

        let anchor = document.create_comment("for");
        document.replace(node, anchor)?;
        // Releasing an enclosing item frees the template through this pairing.
        cx.component().register_anchor(node, anchor);
        Ok(Self {
            template: node,
            anchor,
            binding,
            source,
            track_by,
            items: Vec::new(),
        })
    }

    /// The parsed loop expression.
    #[must_use]
    pub const fn binding(&self) -> &LoopBinding {
        &self.binding
    }

    /// Nodes of the current items, in order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.items.iter().map(|item| item.node).collect()
    }

    fn track_key(&self, cx: &RenderCx<'_>, index: usize) -> Result<String, Error> {
        match &self.track_by {
            Some(by) => Ok(by.get(&cx.scope())?.canonical()),
            None => Ok(index.to_string()),
        }
    }

    /// Where an item currently sits in the tree: the node itself, or the
    /// anchor standing in for it while a conditional hides it.
    fn placed(cx: &RenderCx<'_>, node: NodeId) -> NodeId {
        let document = cx.document();
        if document.parent(node).is_some() {
            return node;
        }
        cx.component()
            .anchor_for(node)
            .filter(|anchor| document.parent(*anchor).is_some())
            .unwrap_or(node)
    }

    fn create_item(
        &self,
        cx: &RenderCx<'_>,
        key: String,
        before: NodeId,
    ) -> Result<LoopItem, Error> {
        let document = cx.document();
        let parent = document
            .parent(self.anchor)
            .ok_or(rill_core::Error::Detached(self.anchor))?;
        let node = document.clone_node(self.template, true);
        document.insert_before(parent, node, Some(before))?;
        let renderer = match build_element(&cx.build(), node) {
            Ok(renderer) => renderer,
            Err(error) => {
                document.remove(node);
                Self::release(cx, node);
                return Err(error);
            }
        };
        Ok(LoopItem {
            node,
            key,
            locals: Locals::new(),
            renderer,
            reused: false,
        })
    }

    fn remove_item(cx: &RenderCx<'_>, item: &LoopItem) {
        let document = cx.document();
        document.remove(item.node);
        if let Some(anchor) = cx.component().anchor_for(item.node) {
            document.remove(anchor);
        }
        Self::release(cx, item.node);
    }

    /// Frees a detached item subtree and the components living in it.
    fn release(cx: &RenderCx<'_>, node: NodeId) {
        match cx.component().runtime() {
            Some(runtime) => runtime.release(cx.component(), node),
            None => {
                cx.component().forget_pairing(node);
            }
        }
    }
}

impl Renderer for LoopRenderer {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        // A failed pass may leave marks behind; start every pass unmarked.
        for item in &mut self.items {
            item.reused = false;
        }
        let collection = self.source.get(&cx.scope())?;
        let document = cx.document();

        for (index, (key, value)) in entries(&collection)?.into_iter().enumerate() {
            let locals = self.binding.locals(cx.locals(), key, value, index);
            let item_key = self.track_key(&cx.with_locals(&locals), index)?;

            if index >= self.items.len() {
                let item = self.create_item(cx, item_key, self.anchor)?;
                self.items.push(item);
            } else if self.items[index].key != item_key {
                let owner = (index + 1..self.items.len()).find(|&i| self.items[i].key == item_key);
                if let Some(owner) = owner {
                    let a = Self::placed(cx, self.items[index].node);
                    let b = Self::placed(cx, self.items[owner].node);
                    document.swap(a, b)?;
                    self.items.swap(index, owner);
                } else {
                    let before = Self::placed(cx, self.items[index].node);
                    let item = self.create_item(cx, item_key, before)?;
                    self.items.insert(index, item);
                }
            }

            let item = &mut self.items[index];
            item.reused = true;
            item.locals = locals;
            item.renderer.render(&cx.with_locals(&item.locals))?;
        }

        let mut removed = 0usize;
        self.items.retain_mut(|item| {
            if item.reused {
                item.reused = false;
                true
            } else {
                Self::remove_item(cx, item);
                removed += 1;
                false
            }
        });
        tracing::trace!(items = self.items.len(), removed, "loop reconciled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loop_bindings() {
        let binding = LoopBinding::parse("item in items").expect("parse");
        assert_eq!(binding.value, "item");
        assert_eq!(binding.key, None);
        assert_eq!(binding.source, "items");

        let binding = LoopBinding::parse("(value, key) in user.tags").expect("parse");
        assert_eq!(binding.value, "value");
        assert_eq!(binding.key.as_deref(), Some("key"));
        assert_eq!(binding.source, "user.tags");

        let binding = LoopBinding::parse("v, k, i in rows |> visible").expect("parse");
        assert_eq!(binding.index.as_deref(), Some("i"));
        assert_eq!(binding.source, "rows |> visible");
    }

    #[test]
    fn names_containing_in_are_not_the_keyword() {
        let binding = LoopBinding::parse("index in inbox").expect("parse");
        assert_eq!(binding.value, "index");
        assert_eq!(binding.source, "inbox");
    }

    #[test]
    fn rejects_malformed_loops() {
        assert!(matches!(LoopBinding::parse("items"), Err(Error::LoopSyntax(_))));
        assert!(matches!(LoopBinding::parse("item in "), Err(Error::LoopSyntax(_))));
        assert!(matches!(LoopBinding::parse("a, b, c, d in x"), Err(Error::LoopSyntax(_))));
        assert!(matches!(LoopBinding::parse("1x in x"), Err(Error::LoopSyntax(_))));
    }

    #[test]
    fn coerces_collections() {
        let list = Value::from_json(serde_json::json!(["a", "b"]));
        let pairs = entries(&list).expect("entries");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0.to_display(), "1");

        let map = Value::from_json(serde_json::json!({"x": 1}));
        assert_eq!(entries(&map).expect("entries")[0].0.to_display(), "x");
        assert_eq!(entries(&Value::from(3)).expect("entries").len(), 3);
        assert!(entries(&Value::Null).expect("entries").is_empty());
        assert!(matches!(entries(&Value::from(true)), Err(Error::Shape { .. })));
    }
}
