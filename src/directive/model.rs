//! `*bind`: two-way binding between a form control and a state path.
//!
//! Rendering pushes the bound value into the control. Native `input` or
//! `change` events pull the control's value back through the compiled
//! setter and raise a `setting` flag, so the render that follows does not
//! write the value it just read back into the control.
//!
//! Checkbox groups bound to an array and multi-selects edit the array in
//! place instead of replacing it.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use rill_core::{Document, Event, Listener, NodeId, Target, Value, value::parse_number};
use rill_expr::{Evaluator, Locals};

use super::{Directive, DirectiveFactory, Match};
use crate::{
    Error,
    component::Component,
    error::describe,
    render::{BuildCx, RenderCx},
};

const DIRECTIVE: &str = "*bind";

/// Two-way control binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFactory;

impl DirectiveFactory for ModelFactory {
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error> {
        let compiler = cx.compiler();
        Ok(Box::new(Model {
            shared: Rc::new(Shared {
                node,
                control: Control::detect(cx.document(), node),
                getter: compiler.getter(&matched.value)?,
                setter: compiler.setter(&matched.value)?,
                locals: RefCell::new(Locals::new()),
                setting: Cell::new(false),
            }),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Checkbox,
    Radio,
    Select { multiple: bool },
    Number,
    Text,
}

impl Control {
    fn detect(document: &Document, node: NodeId) -> Self {
        match document.tag(node).as_deref() {
            Some("select") => Self::Select {
                multiple: document.has_attribute(node, "multiple"),
            },
            Some("input") => match document
                .get_attribute(node, "type")
                .map(|t| t.to_ascii_lowercase())
                .as_deref()
            {
                Some("checkbox") => Self::Checkbox,
                Some("radio") => Self::Radio,
                Some("number" | "range") => Self::Number,
                _ => Self::Text,
            },
            _ => Self::Text,
        }
    }

    const fn event(self) -> &'static str {
        match self {
            Self::Checkbox | Self::Radio | Self::Select { .. } => "change",
            Self::Number | Self::Text => "input",
        }
    }
}

#[derive(Debug)]
struct Shared {
    node: NodeId,
    control: Control,
    getter: Rc<Evaluator>,
    setter: Rc<Evaluator>,
    locals: RefCell<Locals>,
    setting: Cell<bool>,
}

#[derive(Debug)]
struct Model {
    shared: Rc<Shared>,
}

impl Directive for Model {
    fn init(&mut self, cx: &BuildCx<'_>) -> Result<(), Error> {
        let owner = cx.component().downgrade();
        let shared = Rc::clone(&self.shared);
        let listener: Listener = Rc::new(move |_event: &Event| {
            let Some(component) = owner.upgrade() else {
                return Ok(());
            };
            shared.pull(&component).map_err(anyhow::Error::from)
        });
        let kind = self.shared.control.event();
        cx.document().add_event_listener(self.shared.node, kind, listener);
        Ok(())
    }

    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error> {
        self.shared.locals.borrow_mut().clone_from(cx.locals());
        if self.shared.setting.replace(false) {
            return Ok(());
        }
        let value = self.shared.getter.get(&cx.scope())?;
        self.shared.push(cx.document(), &value)
    }
}

impl Shared {
    // ------------------------------------------------------------------
    // State → control
    // ------------------------------------------------------------------

    fn push(&self, document: &Document, value: &Value) -> Result<(), Error> {
        let node = self.node;
        match self.control {
            Control::Checkbox => {
                let checked = match value {
                    Value::Array(list) => position(list, &checkbox_value(document, node)).is_some(),
                    other => other.is_truthy(),
                };
                write_flag(document, node, "checked", checked)?;
            }
            Control::Radio => {
                let own = document.get_property(node, "value").to_display();
                write_flag(document, node, "checked", value.to_display() == own)?;
            }
            Control::Select { multiple: true } => {
                let Value::Array(list) = value else {
                    return Err(Error::Shape {
                        directive: DIRECTIVE.to_string(),
                        expected: "an array",
                        found: describe(value),
                    });
                };
                for option in document.elements_by_tag(node, "option") {
                    let selected = position(list, &option_value(document, option)).is_some();
                    write_flag(document, option, "selected", selected)?;
                }
            }
            Control::Select { multiple: false } => {
                let wanted = value.to_display();
                for option in document.elements_by_tag(node, "option") {
                    let selected = !value.is_nullish() && option_value(document, option) == wanted;
                    write_flag(document, option, "selected", selected)?;
                }
            }
            Control::Number | Control::Text => {
                let text = if value.is_nullish() {
                    String::new()
                } else {
                    value.to_display()
                };
                if document.get_property(node, "value").to_display() != text {
                    document.set_property(node, "value", Value::String(text))?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control → state
    // ------------------------------------------------------------------

    fn pull(&self, component: &Component) -> Result<(), Error> {
        let document = component.document();
        let node = self.node;
        let state = component.state();
        let locals = self.locals.borrow().clone();
        let scope = component.scope_chain(&state, &locals);
        let current = self.getter.get(&scope)?;

        let next = match self.control {
            Control::Checkbox => {
                let checked = document.get_property(node, "checked").is_truthy();
                if let Value::Array(list) = &current {
                    let own = checkbox_value(document, node);
                    self.setting.set(true);
                    match (checked, position(list, &own)) {
                        (true, None) => {
                            list.push(own);
                        }
                        (false, Some(index)) => {
                            list.remove(index);
                        }
                        _ => self.setting.set(false),
                    }
                    return Ok(());
                }
                Value::Bool(checked)
            }
            Control::Radio => {
                if !document.get_property(node, "checked").is_truthy() {
                    return Ok(());
                }
                document.get_property(node, "value")
            }
            Control::Select { multiple: true } => {
                let Value::Array(list) = &current else {
                    return Err(Error::Shape {
                        directive: DIRECTIVE.to_string(),
                        expected: "an array",
                        found: describe(&current),
                    });
                };
                let selected = selected_values(document, node);
                self.setting.set(sync_in_place(list, &selected));
                return Ok(());
            }
            Control::Select { multiple: false } => selected_values(document, node)
                .into_iter()
                .next()
                .map_or(Value::Null, Value::String),
            Control::Number => {
                let text = document.get_property(node, "value").to_display();
                if text.trim().is_empty() {
                    Value::Null
                } else {
                    Value::Number(parse_number(&text))
                }
            }
            Control::Text => Value::String(document.get_property(node, "value").to_display()),
        };

        if next.deep_eq(&current) {
            return Ok(());
        }
        self.setting.set(true);
        if let Err(error) = self.setter.set(&scope, next) {
            self.setting.set(false);
            return Err(error.into());
        }
        Ok(())
    }
}

fn write_flag(document: &Document, node: NodeId, name: &str, on: bool) -> Result<(), Error> {
    if document.get_property(node, name).is_truthy() != on {
        document.set_property(node, name, Value::Bool(on))?;
    }
    Ok(())
}

fn checkbox_value(document: &Document, node: NodeId) -> String {
    document
        .get_attribute(node, "value")
        .unwrap_or_else(|| "on".to_string())
}

fn option_value(document: &Document, option: NodeId) -> String {
    document
        .get_attribute(option, "value")
        .unwrap_or_else(|| document.text_content(option).trim().to_string())
}

fn selected_values(document: &Document, select: NodeId) -> Vec<String> {
    document
        .elements_by_tag(select, "option")
        .into_iter()
        .filter(|option| document.get_property(*option, "selected").is_truthy())
        .map(|option| option_value(document, option))
        .collect()
}

fn position(list: &Target, value: &str) -> Option<usize> {
    list.values().iter().position(|item| item.to_display() == value)
}

/// Makes `list` hold exactly `selected`, keeping surviving entries in place.
/// Returns `true` when anything changed.
fn sync_in_place(list: &Target, selected: &[String]) -> bool {
    let mut changed = false;
    let mut index = list.len();
    while index > 0 {
        index -= 1;
        let item = list.get_index(index).to_display();
        if !selected.contains(&item) {
            list.remove(index);
            changed = true;
        }
    }
    for value in selected {
        if position(list, value).is_none() {
            list.push(value.as_str());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_select_sync_keeps_survivors() {
        let list = Target::from_values(["a", "b", "c"].map(Value::from));
        let changed = sync_in_place(&list, &["c".to_string(), "d".to_string()]);
        assert!(changed);
        let values: Vec<String> = list.values().iter().map(Value::to_display).collect();
        assert_eq!(values, ["c", "d"]);
        assert!(!sync_in_place(&list, &["c".to_string(), "d".to_string()]));
    }

    #[test]
    fn controls_are_detected_from_markup() {
        let document = Document::new();
        let checkbox = document.create_element("input");
        document.set_attribute(checkbox, "type", "Checkbox").expect("attr");
        assert_eq!(Control::detect(&document, checkbox), Control::Checkbox);

        let select = document.create_element("select");
        document.set_attribute(select, "multiple", "").expect("attr");
        assert_eq!(Control::detect(&document, select), Control::Select { multiple: true });
        assert_eq!(Control::detect(&document, select).event(), "change");

        let area = document.create_element("textarea");
        assert_eq!(Control::detect(&document, area).event(), "input");
    }
}
