//! Tokenizer for the expression language.

use crate::error::CompileError;

/// A lexical token with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(Punct),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,
    Question,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    And,
    Or,
    Nullish,
    Pipe,
}

// Longest spellings first so `===` wins over `==`.
const PUNCTUATION: &[(&str, Punct)] = &[
    ("===", Punct::StrictEq),
    ("!==", Punct::StrictNotEq),
    ("==", Punct::Eq),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("&&", Punct::And),
    ("||", Punct::Or),
    ("??", Punct::Nullish),
    ("|>", Punct::Pipe),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (".", Punct::Dot),
    (";", Punct::Semi),
    ("?", Punct::Question),
    (":", Punct::Colon),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
];

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Splits `source` into tokens, ending with [`TokenKind::End`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    loop {
        let trimmed = rest.trim_start();
        let offset = source.len() - trimmed.len();
        rest = trimmed;
        let Some(c) = rest.chars().next() else {
            tokens.push(Token {
                kind: TokenKind::End,
                offset,
            });
            return Ok(tokens);
        };

        let (kind, len) = if c.is_ascii_digit()
            || (c == '.' && rest[1..].starts_with(|d: char| d.is_ascii_digit()))
        {
            number(source, rest, offset)?
        } else if c == '"' || c == '\'' {
            string(source, rest, offset, c)?
        } else if is_ident_start(c) {
            let len = rest.find(|c| !is_ident_continue(c)).unwrap_or(rest.len());
            (TokenKind::Ident(rest[..len].to_string()), len)
        } else if let Some((text, punct)) = PUNCTUATION.iter().find(|(p, _)| rest.starts_with(p)) {
            (TokenKind::Punct(*punct), text.len())
        } else {
            return Err(CompileError::syntax(
                source,
                offset,
                format!("unexpected character `{c}`"),
            ));
        };
        tokens.push(Token { kind, offset });
        rest = &rest[len..];
    }
}

fn number(source: &str, rest: &str, offset: usize) -> Result<(TokenKind, usize), CompileError> {
    if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        let len = hex.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(hex.len());
        #[allow(clippy::cast_precision_loss)]
        let value = i64::from_str_radix(&hex[..len], 16)
            .map(|v| v as f64)
            .map_err(|_| CompileError::syntax(source, offset, "invalid hex literal"))?;
        return Ok((TokenKind::Number(value), len + 2));
    }

    let bytes = rest.as_bytes();
    let mut len = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while len < bytes.len() {
        match bytes[len] {
            b'0'..=b'9' => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if !seen_exp => {
                seen_exp = true;
                if matches!(bytes.get(len + 1), Some(b'+' | b'-')) {
                    len += 1;
                }
            }
            _ => break,
        }
        len += 1;
    }
    let value = rest[..len]
        .parse::<f64>()
        .map_err(|_| CompileError::syntax(source, offset, "invalid number literal"))?;
    Ok((TokenKind::Number(value), len))
}

fn string(
    source: &str,
    rest: &str,
    offset: usize,
    quote: char,
) -> Result<(TokenKind, usize), CompileError> {
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((TokenKind::Str(out), i + 1)),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            c => out.push(c),
        }
    }
    Err(CompileError::syntax(source, offset, "unterminated string literal"))
}
