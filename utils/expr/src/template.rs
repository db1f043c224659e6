//! Interpolation templates.
//!
//! A template string mixes literal text with `{{ expr }}` (escaped) and
//! `{{{ expr }}}` (raw) spans. [`split`] decomposes it into [`Segment`]s; the
//! compiler turns those into a [`Template`] whose parts are cached getters.

use std::rc::Rc;

use rill_core::Value;

use crate::{
    compiler::Evaluator,
    error::{CompileError, EvalError},
    eval::ScopeChain,
};

/// Returns `true` when `text` contains an interpolation span.
#[must_use]
pub fn has_interpolation(text: &str) -> bool {
    text.find("{{").is_some_and(|open| text[open + 2..].contains("}}"))
}

/// A piece of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Text(String),
    /// Expression source, trimmed; `raw` for `{{{ }}}`.
    Expr {
        /// Expression text.
        source: String,
        /// Whether the value is inserted as markup.
        raw: bool,
    },
}

/// Splits `text` into literal and expression segments.
///
/// # Errors
///
/// Fails when an opening `{{`/`{{{` has no matching close.
pub fn split(text: &str) -> Result<Vec<Segment>, CompileError> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let raw = rest[open..].starts_with("{{{");
        let (body_start, close) = if raw { (open + 3, "}}}") } else { (open + 2, "}}") };
        let body = &rest[body_start..];
        let end = body
            .find(close)
            .ok_or_else(|| CompileError::UnterminatedInterpolation(text.to_string()))?;
        segments.push(Segment::Expr {
            source: body[..end].trim().to_string(),
            raw,
        });
        rest = &body[end + close.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

/// A compiled template part.
#[derive(Debug, Clone)]
pub enum Part {
    /// Literal text.
    Text(String),
    /// A cached getter; `raw` for `{{{ }}}`.
    Expr {
        /// The compiled getter.
        evaluator: Rc<Evaluator>,
        /// Whether the value is inserted as markup.
        raw: bool,
    },
}

/// A compiled interpolation template.
#[derive(Debug)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub(crate) const fn new(source: String, parts: Vec<Part>) -> Self {
        Self { source, parts }
    }

    /// The template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled parts in order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns `true` when some part is a raw (`{{{ }}}`) interpolation.
    #[must_use]
    pub fn has_raw(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Expr { raw: true, .. }))
    }

    /// Renders the concatenation; `null`/`undefined` results print as nothing.
    ///
    /// # Errors
    ///
    /// Propagates the first failing expression.
    pub fn render(&self, chain: &ScopeChain<'_>) -> Result<String, EvalError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr { evaluator, .. } => out.push_str(&display(&evaluator.get(chain)?)),
            }
        }
        Ok(out)
    }
}

/// Interpolation string form: nullish values become empty.
#[must_use]
pub fn display(value: &Value) -> String {
    if value.is_nullish() {
        String::new()
    } else {
        value.to_display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_text() {
        let segments = split("Hi {{ name }}, you have {{{ html }}}!").expect("split");
        assert_eq!(
            segments,
            vec![
                Segment::Text("Hi ".into()),
                Segment::Expr { source: "name".into(), raw: false },
                Segment::Text(", you have ".into()),
                Segment::Expr { source: "html".into(), raw: true },
                Segment::Text("!".into()),
            ]
        );
    }

    #[test]
    fn detects_interpolation() {
        assert!(has_interpolation("a {{ b }}"));
        assert!(!has_interpolation("a { b }"));
        assert!(!has_interpolation("{{ never closed"));
    }

    #[test]
    fn unterminated_spans_fail() {
        assert!(matches!(split("{{ a"), Err(CompileError::UnterminatedInterpolation(_))));
        assert!(matches!(split("{{{ a }}"), Err(CompileError::UnterminatedInterpolation(_))));
    }

    #[test]
    fn nullish_values_print_empty() {
        assert_eq!(display(&Value::Null), "");
        assert_eq!(display(&Value::from(0)), "0");
    }
}
