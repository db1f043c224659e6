use std::rc::Rc;

use indexmap::IndexMap;
use rill_core::{NodeId, Value};
use rill_expr::Evaluator;

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

/// `:style` and `::style`.
///
/// Mapping keys are `property` or `property.unit` (`width.px`), in either
/// kebab or camel case. A string value is read as declaration text. Nullish
/// and `false` values drop the property.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleFactory;

impl DirectiveFactory for StyleFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        Ok(Box::new(InlineStyle {
            node,
            getter: cx.compiler().getter(&matched.value)?,
            applied: IndexMap::new(),
            one_time: matched.is_one_time(),
            done: false,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    value: String,
    unit: Option<String>,
}

impl Declaration {
    fn text(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{}{unit}", self.value),
            None => self.value.clone(),
        }
    }
}

#[derive(Debug)]
struct InlineStyle {
    node: NodeId,
    getter: Rc<Evaluator>,
    applied: IndexMap<String, Declaration>,
    one_time: bool,
    done: bool,
}

impl Directive for InlineStyle {
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        let document = cx.document();
        let next = declarations(&self.getter.get(&cx.scope())?);
        for property in self.applied.keys() {
            if !next.contains_key(property) {
                document.remove_style(self.node, property);
            }
        }
        for (property, declaration) in &next {
            let current = document.get_style(self.node, property);
            if current.as_deref() != Some(declaration.text().as_str()) {
                document.set_style(
                    self.node,
                    property,
                    &declaration.value,
                    declaration.unit.as_deref(),
                )?;
            }
        }
        self.applied = next;
        self.done = self.one_time;
        Ok(())
    }

    fn is_retired(&self) -> bool {
        self.done
    }
}

fn declarations(value: &Value) -> IndexMap<String, Declaration> {
    let mut out = IndexMap::new();
    match value {
        Value::String(text) => {
            for declaration in text.split(';') {
                if let Some((property, value)) = declaration.split_once(':') {
                    let (property, value) = (property.trim(), value.trim());
                    if !property.is_empty() && !value.is_empty() {
                        out.insert(
                            property.to_string(),
                            Declaration {
                                value: value.to_string(),
                                unit: None,
                            },
                        );
                    }
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map.entries() {
                if matches!(value, Value::Undefined | Value::Null | Value::Bool(false)) {
                    continue;
                }
                let (property, unit) = match key.split_once('.') {
                    Some((property, unit)) => (property, Some(unit.to_string())),
                    None => (key.as_str(), None),
                };
                out.insert(
                    kebab_case(property),
                    Declaration {
                        value: value.to_display(),
                        unit,
                    },
                );
            }
        }
        _ => {}
    }
    out
}

/// `backgroundColor` → `background-color`; custom properties pass through.
fn kebab_case(property: &str) -> String {
    if property.starts_with("--") {
        return property.to_string();
    }
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
