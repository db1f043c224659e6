//! Compile-time and evaluation errors.

/// Errors raised while compiling expression or template text.
///
/// Every variant carries the offending source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The expression does not follow the grammar.
    #[error("syntax error in `{source_text}` at {offset}: {message}")]
    Syntax {
        /// Expression text.
        source_text: String,
        /// Byte offset of the failure.
        offset: usize,
        /// What was expected.
        message: String,
    },
    /// A `|>` segment is not a filter name optionally followed by arguments.
    #[error("malformed filter in `{0}`")]
    MalformedFilter(String),
    /// The filter chain ends with an empty segment.
    #[error("empty filter at the end of `{0}`")]
    EmptyFilter(String),
    /// A `#method(` call is missing its closing parenthesis.
    #[error("unterminated stateful call in `{0}`")]
    UnterminatedCall(String),
    /// A `{{` or `{{{` has no matching close.
    #[error("unterminated interpolation in `{0}`")]
    UnterminatedInterpolation(String),
    /// A setter was requested for something that cannot be assigned.
    #[error("`{0}` is not assignable")]
    NotAssignable(String),
}

impl CompileError {
    pub(crate) fn syntax(source_text: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            source_text: source_text.to_string(),
            offset,
            message: message.into(),
        }
    }
}

/// Errors raised while evaluating a compiled expression.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The filter was not registered when the expression was compiled.
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    /// Something that is not a function was called.
    #[error("`{0}` is not a function")]
    NotCallable(String),
    /// A property was read from or written to `undefined`/`null`.
    #[error("cannot access `{property}` of {on}")]
    NullAccess {
        /// The property being accessed.
        property: String,
        /// `undefined` or `null`.
        on: &'static str,
    },
    /// Loop and slot locals are read-only.
    #[error("cannot assign to local `{0}`")]
    AssignToLocal(String),
    /// The write was denied by the container (frozen, or not a valid key).
    #[error("cannot assign `{0}`")]
    Denied(String),
    /// Assignment outside of a component scope, or onto a primitive.
    #[error("invalid assignment target `{0}`")]
    InvalidTarget(String),
    /// A host function, filter or method failed.
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_quote_the_source() {
        let error = CompileError::EmptyFilter("name |> ".to_string());
        assert_eq!(error.to_string(), "empty filter at the end of `name |> `");
        let error = CompileError::syntax("a +", 3, "unexpected end");
        assert_eq!(error.to_string(), "syntax error in `a +` at 3: unexpected end");
    }

    #[test]
    fn host_errors_are_transparent() {
        let error = EvalError::from(anyhow::anyhow!("boom"));
        assert_eq!(error.to_string(), "boom");
    }
}
