//! Engine errors.

use rill_core::Value;
use rill_expr::{CompileError, EvalError};

/// Boxed failure raised by user code (component methods, hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while defining, compiling or rendering components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A DOM operation or template parse failed.
    #[error(transparent)]
    Dom(#[from] rill_core::Error),
    /// An expression failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// An expression failed while being evaluated.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// `$commit` was asked for a `$`- or `_`-prefixed name.
    #[error("`{0}` is reserved and cannot be committed")]
    ReservedMethod(String),
    /// `$commit` was asked for a name that is not a method.
    #[error("`{0}` is not a method of this component")]
    UnknownMethod(String),
    /// A component method returned an error.
    #[error("method `{name}` failed: {source}")]
    Method {
        /// Method name.
        name: String,
        /// What the method reported.
        #[source]
        source: BoxError,
    },
    /// Bound data does not have the shape a directive needs.
    #[error("`{directive}` expects {expected}, found {found}")]
    Shape {
        /// The directive attribute, e.g. `*bind`.
        directive: String,
        /// The expected shape.
        expected: &'static str,
        /// `typeof` of the value found.
        found: &'static str,
    },
    /// `*for` text did not match `value[, key[, index]] in expr`.
    #[error("invalid loop expression `{0}`")]
    LoopSyntax(String),
    /// A custom element name lacks a `-`.
    #[error("`{0}` is not a valid custom element name")]
    InvalidTag(String),
    /// A tag was registered twice.
    #[error("`{0}` is already defined")]
    AlreadyDefined(String),
    /// A state factory produced a non-object.
    #[error("component state must be an object, found {0}")]
    StateNotObject(&'static str),
    /// No definition is registered for this tag.
    #[error("<{0}> is not a defined element")]
    NotDefined(String),
    /// The component or the runtime that created it was dropped.
    #[error("the component or its runtime has been dropped")]
    Dropped,
    /// Options could not be parsed.
    #[error("invalid options: {0}")]
    Config(#[source] serde_json::Error),
}

/// Names the shape of `value` for error messages (`array` and `null` are
/// told apart from `object`).
pub(crate) const fn describe(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "array",
        Value::Null => "null",
        Value::Node(_) => "node",
        other => other.type_of(),
    }
}

impl Error {
    pub(crate) fn method(name: &str, source: anyhow::Error) -> Self {
        Self::Method {
            name: name.to_string(),
            source: source.into(),
        }
    }
}

/// A render failure reported in production mode.
///
/// Wraps the original error, which stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
#[error("rendering <{tag}> failed: {source}")]
pub struct RenderError {
    tag: String,
    #[source]
    source: Error,
}

impl RenderError {
    pub(crate) const fn new(tag: String, source: Error) -> Self {
        Self { tag, source }
    }

    /// Tag of the component whose render failed.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The underlying error.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn render_errors_keep_their_cause() {
        let error = RenderError::new("todo-list".into(), Error::UnknownMethod("save".into()));
        assert_eq!(
            error.to_string(),
            "rendering <todo-list> failed: `save` is not a method of this component"
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn method_failures_chain_the_host_error() {
        let error = Error::method("save", anyhow::anyhow!("disk full"));
        assert_eq!(error.to_string(), "method `save` failed: disk full");
        assert_eq!(error.source().map(ToString::to_string).as_deref(), Some("disk full"));
    }
}
