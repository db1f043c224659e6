//! Attribute directives.
//!
//! A directive is spawned by a [`DirectiveFactory`] when an element attribute
//! matches the factory's [`Pattern`]. Patterns are either exact literals
//! (`*if`, `ref`) or a prefix followed by a `{name}` capture (`@{name}`),
//! where the capture also collects dot-separated modifiers:
//!
//! ```text
//! @click.once.prevent   pattern "@{name}"   name "click", modifiers [once, prevent]
//! ```
//!
//! When several patterns match, the most specific wins: a literal beats any
//! capture, and a longer prefix beats a shorter one. Directives on one element
//! render in registration order of their factories, so the conditional
//! directive registered first always decides presence before anything else
//! touches the node.
//!
//! # Lifecycle
//!
//! [`Directive::init`] runs once right after construction; [`Directive::render`]
//! runs on every flush of the owning component. A directive reporting
//! [`Directive::is_retired`] is dropped before the next render.

mod binding;
mod class;
mod conditional;
mod event;
mod model;
mod property;
mod reference;
mod style;

use std::{cell::RefCell, fmt, rc::Rc};

use rill_core::NodeId;

use crate::{
    Error,
    render::{BuildCx, RenderCx},
};

pub use binding::BindingFactory;
pub use class::ClassFactory;
pub use conditional::ConditionalFactory;
pub use event::{EventFactory, Modifiers};
pub use model::ModelFactory;
pub use property::PropertyFactory;
pub use reference::ReferenceFactory;
pub use style::StyleFactory;

/// A live directive bound to one element.
pub trait Directive: fmt::Debug {
    /// One-time setup after construction (listeners, anchors).
    ///
    /// # Errors
    ///
    /// Implementations report setup failures.
    fn init(&mut self, cx: &BuildCx<'_>) -> Result<(), Error> {
        let _ = cx;
        Ok(())
    }

    /// Applies the directive for the current flush.
    ///
    /// # Errors
    ///
    /// Evaluation, DOM and data-shape failures propagate to the component.
    fn render(&mut self, cx: &RenderCx<'_>) -> Result<(), Error>;

    /// Returns `true` once the directive has nothing left to do.
    fn is_retired(&self) -> bool {
        false
    }
}

/// Creates directives for matching attributes.
pub trait DirectiveFactory: fmt::Debug {
    /// Builds the directive for `node`.
    ///
    /// # Errors
    ///
    /// Compile errors in the attribute value are fatal to construction.
    fn create(
        &self,
        cx: &BuildCx<'_>,
        node: NodeId,
        matched: &Match,
    ) -> Result<Box<dyn Directive>, Error>;
}

// ============================================================================
// Patterns
// ============================================================================

const CAPTURE: &str = "{name}";

/// A compiled attribute-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Matches exactly this attribute name.
    Literal(String),
    /// Matches `prefix` followed by a non-empty name and optional modifiers.
    Capture {
        /// Text before the capture.
        prefix: String,
    },
}

impl Pattern {
    /// Compiles `source`; a trailing `{name}` makes it a capture pattern.
    #[must_use]
    pub fn new(source: &str) -> Self {
        source.strip_suffix(CAPTURE).map_or_else(
            || Self::Literal(source.to_string()),
            |prefix| Self::Capture {
                prefix: prefix.to_string(),
            },
        )
    }

    /// Higher is more specific.
    #[must_use]
    pub fn specificity(&self) -> usize {
        match self {
            Self::Literal(_) => usize::MAX,
            Self::Capture { prefix } => prefix.len(),
        }
    }

    /// Matches an attribute, capturing name and modifiers.
    #[must_use]
    pub fn matches(&self, attribute: &str, value: &str) -> Option<Match> {
        match self {
            Self::Literal(literal) => (literal == attribute).then(|| Match {
                attribute: attribute.to_string(),
                name: attribute.to_string(),
                modifiers: Vec::new(),
                value: value.to_string(),
            }),
            Self::Capture { prefix } => {
                let rest = attribute.strip_prefix(prefix.as_str())?;
                let mut parts = rest.split('.');
                let name = parts.next().filter(|n| !n.is_empty())?;
                Some(Match {
                    attribute: attribute.to_string(),
                    name: name.to_string(),
                    modifiers: parts.filter(|m| !m.is_empty()).map(str::to_string).collect(),
                    value: value.to_string(),
                })
            }
        }
    }
}

/// A successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// The full attribute name.
    pub attribute: String,
    /// The captured name (the attribute itself for literals).
    pub name: String,
    /// Dot-separated modifiers after the name.
    pub modifiers: Vec<String>,
    /// The attribute value.
    pub value: String,
}

impl Match {
    /// Returns `true` when `modifier` was written.
    #[must_use]
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// `::`-prefixed bindings render once.
    #[must_use]
    pub fn is_one_time(&self) -> bool {
        self.attribute.starts_with("::")
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug)]
struct Entry {
    pattern: Pattern,
    factory: Rc<dyn DirectiveFactory>,
}

/// A resolved attribute: the factory to use and its render priority.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Registration index; lower renders first.
    pub priority: usize,
    /// The factory to build with.
    pub factory: Rc<dyn DirectiveFactory>,
    /// What the pattern captured.
    pub matched: Match,
}

/// Ordered pattern → factory table.
#[derive(Debug, Default)]
pub struct DirectiveRegistry {
    entries: RefCell<Vec<Entry>>,
}

impl DirectiveRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in directive set.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("*if", ConditionalFactory);
        registry.register("ref", ReferenceFactory);
        registry.register("*bind", ModelFactory);
        registry.register(":class", ClassFactory);
        registry.register("::class", ClassFactory);
        registry.register(":style", StyleFactory);
        registry.register("::style", StyleFactory);
        registry.register("::{name}", BindingFactory);
        registry.register(":{name}", BindingFactory);
        registry.register(".{name}", PropertyFactory);
        registry.register("@{name}", EventFactory);
        registry
    }

    /// Appends a factory for `pattern`.
    pub fn register(&self, pattern: &str, factory: impl DirectiveFactory + 'static) {
        self.entries.borrow_mut().push(Entry {
            pattern: Pattern::new(pattern),
            factory: Rc::new(factory),
        });
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Finds the most specific pattern matching `attribute`.
    #[must_use]
    pub fn resolve(&self, attribute: &str, value: &str) -> Option<Resolved> {
        let entries = self.entries.borrow();
        let mut best: Option<(usize, usize, Match)> = None;
        for (priority, entry) in entries.iter().enumerate() {
            let Some(matched) = entry.pattern.matches(attribute, value) else {
                continue;
            };
            let specificity = entry.pattern.specificity();
            if best.as_ref().is_none_or(|(s, _, _)| specificity > *s) {
                best = Some((specificity, priority, matched));
            }
        }
        best.map(|(_, priority, matched)| Resolved {
            priority,
            factory: Rc::clone(&entries[priority].factory),
            matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_name_and_modifiers() {
        let pattern = Pattern::new("@{name}");
        let matched = pattern.matches("@click.once.prevent", "go()").expect("match");
        assert_eq!(matched.name, "click");
        assert_eq!(matched.modifiers, vec!["once", "prevent"]);
        assert!(matched.has_modifier("prevent"));
        assert!(pattern.matches("@", "").is_none());
        assert!(pattern.matches("click", "").is_none());
    }

    #[test]
    fn literal_patterns_match_exactly() {
        let pattern = Pattern::new("*if");
        assert!(pattern.matches("*if", "x").is_some());
        assert!(pattern.matches("*iff", "x").is_none());
    }

    #[test]
    fn most_specific_pattern_wins() {
        let registry = DirectiveRegistry::with_defaults();
        let class = registry.resolve(":class", "c").expect("resolve");
        let title = registry.resolve(":title", "t").expect("resolve");
        let once = registry.resolve("::title", "t").expect("resolve");
        assert_eq!(title.matched.name, "title");
        assert_eq!(once.matched.name, "title");
        assert!(once.matched.is_one_time());
        assert!(!title.matched.is_one_time());
        assert_ne!(class.priority, title.priority);
        assert!(registry.resolve("title", "t").is_none());
    }

    #[test]
    fn conditional_renders_first() {
        let registry = DirectiveRegistry::with_defaults();
        let conditional = registry.resolve("*if", "x").expect("resolve");
        let event = registry.resolve("@click", "x").expect("resolve");
        assert!(conditional.priority < event.priority);
    }
}
