//! Stateful-call rewriting.
//!
//! `#method(args)` is shorthand for `$commit("method", args)`: the call goes
//! through the component's commit gate, which validates the name and passes
//! the current state as the leading argument.

use crate::{
    error::CompileError,
    lexer::{is_ident_continue, is_ident_start},
};

/// Name of the commit gate in scope.
pub const COMMIT: &str = "$commit";

/// Rewrites every `#name(` call outside string literals.
///
/// # Errors
///
/// Returns [`CompileError::UnterminatedCall`] when a call has no closing
/// parenthesis.
pub fn rewrite_stateful_calls(source: &str) -> Result<String, CompileError> {
    if !source.contains('#') {
        return Ok(source.to_string());
    }
    let mut out = String::with_capacity(source.len() + 16);
    let mut i = 0;
    while i < source.len() {
        let rest = &source[i..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c == '"' || c == '\'' {
            // An unterminated literal is left for the parser to report.
            let len = quoted_len(rest, c).unwrap_or(rest.len());
            out.push_str(&rest[..len]);
            i += len;
            continue;
        }
        if c == '#'
            && let Some((name, open)) = call_head(&rest[1..])
        {
            let args_start = i + 1 + open + 1;
            let close = matching_paren(source, args_start).ok_or_else(|| unterminated(source))?;
            let inner = rewrite_stateful_calls(&source[args_start..close])?;
            out.push_str(COMMIT);
            out.push_str("(\"");
            out.push_str(name);
            out.push('"');
            if !inner.trim().is_empty() {
                out.push_str(", ");
                out.push_str(&inner);
            }
            out.push(')');
            i = close + 1;
            continue;
        }
        out.push(c);
        i += c.len_utf8();
    }
    Ok(out)
}

fn unterminated(source: &str) -> CompileError {
    CompileError::UnterminatedCall(source.to_string())
}

/// Returns the identifier and the byte offset of the `(` that immediately follows it.
fn call_head(text: &str) -> Option<(&str, usize)> {
    if !text.starts_with(is_ident_start) {
        return None;
    }
    let len = text.find(|c| !is_ident_continue(c)).unwrap_or(text.len());
    text[len..].starts_with('(').then(|| (&text[..len], len))
}

/// Length of the string literal at the start of `text`, including quotes.
fn quoted_len(text: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i + 1);
        }
    }
    None
}

/// Byte index of the `)` closing the group whose contents begin at `start`.
fn matching_paren(source: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < source.len() {
        let rest = &source[i..];
        let c = rest.chars().next()?;
        match c {
            '"' | '\'' => {
                i += quoted_len(rest, c)?;
                continue;
            }
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
        i += c.len_utf8();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_calls_with_and_without_arguments() {
        assert_eq!(
            rewrite_stateful_calls("#toggle()").expect("rewrite"),
            "$commit(\"toggle\")"
        );
        assert_eq!(
            rewrite_stateful_calls("#add(item, 2)").expect("rewrite"),
            "$commit(\"add\", item, 2)"
        );
    }

    #[test]
    fn skips_parentheses_inside_strings() {
        assert_eq!(
            rewrite_stateful_calls(r#"#say(')', "a\")(", f(1))"#).expect("rewrite"),
            r#"$commit("say", ')', "a\")(", f(1))"#
        );
    }

    #[test]
    fn leaves_string_contents_alone() {
        assert_eq!(
            rewrite_stateful_calls("'#notacall()' + #real()").expect("rewrite"),
            "'#notacall()' + $commit(\"real\")"
        );
    }

    #[test]
    fn nested_calls_are_rewritten() {
        assert_eq!(
            rewrite_stateful_calls("#outer(#inner(x))").expect("rewrite"),
            "$commit(\"outer\", $commit(\"inner\", x))"
        );
    }

    #[test]
    fn unterminated_calls_fail() {
        assert!(matches!(
            rewrite_stateful_calls("#save(a, ')'"),
            Err(CompileError::UnterminatedCall(_))
        ));
    }
}
