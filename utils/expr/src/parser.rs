//! Recursive-descent parser.
//!
//! Precedence, lowest first: `;` sequence, `|>` pipeline, assignment, `?:`,
//! `||`/`??`, `&&`, equality, relational, additive, multiplicative, unary,
//! postfix (member, index, call), primary.

use crate::{
    ast::{AssignOp, BinaryOp, Expr, Literal, LogicalOp, UnaryOp},
    error::CompileError,
    filter::FilterRegistry,
    lexer::{Punct, Token, TokenKind, tokenize},
};

/// Parses a single expression (no `;`).
pub fn parse_expression(source: &str, filters: &FilterRegistry) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(source, filters)?;
    let expr = parser.pipeline()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses `;`-separated statements. Empty statements are skipped.
pub fn parse_statements(source: &str, filters: &FilterRegistry) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(source, filters)?;
    let mut statements = Vec::new();
    loop {
        while parser.eat(Punct::Semi) {}
        if parser.at_end() {
            break;
        }
        statements.push(parser.pipeline()?);
        if !parser.eat(Punct::Semi) {
            parser.expect_end()?;
            break;
        }
    }
    Ok(Expr::Sequence(statements))
}

struct Parser<'a> {
    source: &'a str,
    filters: &'a FilterRegistry,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, filters: &'a FilterRegistry) -> Result<Self, CompileError> {
        Ok(Self {
            source,
            filters,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::End)
    }

    fn check(&self, punct: Punct) -> bool {
        matches!(self.peek(), TokenKind::Punct(p) if *p == punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.source, self.offset(), message)
    }

    fn expect(&mut self, punct: Punct, what: &str) -> Result<(), CompileError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected token"))
        }
    }

    // ============================================================================
    // Pipeline and assignment
    // ============================================================================

    fn pipeline(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.assignment()?;
        while self.eat(Punct::Pipe) {
            let name = match self.advance() {
                TokenKind::Ident(name) => name,
                TokenKind::End => return Err(CompileError::EmptyFilter(self.source.to_string())),
                TokenKind::Punct(Punct::Pipe | Punct::Semi) => {
                    return Err(CompileError::EmptyFilter(self.source.to_string()));
                }
                _ => return Err(CompileError::MalformedFilter(self.source.to_string())),
            };
            let args = if self.eat(Punct::LParen) {
                self.arguments(Punct::RParen)
                    .map_err(|_| CompileError::MalformedFilter(self.source.to_string()))?
            } else {
                Vec::new()
            };
            if !self.at_segment_end() {
                return Err(CompileError::MalformedFilter(self.source.to_string()));
            }
            let filter = self.filters.get(&name);
            if filter.is_none() {
                tracing::debug!(filter = %name, "filter not registered at compile time");
            }
            expr = Expr::Pipe {
                input: Box::new(expr),
                name,
                filter,
                args,
            };
        }
        Ok(expr)
    }

    fn at_segment_end(&self) -> bool {
        self.at_end()
            || [
                Punct::Pipe,
                Punct::Semi,
                Punct::Comma,
                Punct::Colon,
                Punct::RParen,
                Punct::RBracket,
                Punct::RBrace,
            ]
            .into_iter()
            .any(|p| self.check(p))
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let start = self.offset();
        let target = self.conditional()?;
        let op = match self.peek() {
            TokenKind::Punct(Punct::Assign) => AssignOp::Set,
            TokenKind::Punct(Punct::PlusAssign) => AssignOp::Add,
            TokenKind::Punct(Punct::MinusAssign) => AssignOp::Sub,
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(CompileError::syntax(
                self.source,
                start,
                "invalid assignment target",
            ));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
    }

    fn conditional(&mut self) -> Result<Expr, CompileError> {
        let test = self.logical_or()?;
        if !self.eat(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(Punct::Colon, "`:` in conditional")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(consequent),
            Box::new(alternate),
        ))
    }

    // ============================================================================
    // Binary operators
    // ============================================================================

    fn logical_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.logical_and()?;
        loop {
            let op = if self.eat(Punct::Or) {
                LogicalOp::Or
            } else if self.eat(Punct::Nullish) {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            let right = self.logical_and()?;
            left = Expr::Logical(op, Box::new(left), Box::new(right));
        }
    }

    fn logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.equality()?;
        while self.eat(Punct::And) {
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        table: &[(Punct, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in table {
                if self.eat(*punct) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (Punct::StrictEq, BinaryOp::StrictEq),
                (Punct::StrictNotEq, BinaryOp::StrictNotEq),
                (Punct::Eq, BinaryOp::Eq),
                (Punct::NotEq, BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (Punct::LtEq, BinaryOp::LtEq),
                (Punct::GtEq, BinaryOp::GtEq),
                (Punct::Lt, BinaryOp::Lt),
                (Punct::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (Punct::Star, BinaryOp::Mul),
                (Punct::Slash, BinaryOp::Div),
                (Punct::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
            TokenKind::Punct(Punct::Minus) => UnaryOp::Negate,
            TokenKind::Punct(Punct::Plus) => UnaryOp::Plus,
            TokenKind::Ident(name) if name == "typeof" => UnaryOp::TypeOf,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    // ============================================================================
    // Postfix and primary
    // ============================================================================

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(Punct::Dot) {
                match self.advance() {
                    TokenKind::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    _ => return Err(self.error("expected property name after `.`")),
                }
            } else if self.eat(Punct::LBracket) {
                let index = self.pipeline()?;
                self.expect(Punct::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(Punct::LParen) {
                let args = self.arguments(Punct::RParen)?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Parses a comma-separated list after its opening token, consuming `close`.
    fn arguments(&mut self, close: Punct) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.pipeline()?);
            if !self.eat(Punct::Comma) {
                self.expect(close, "`,` or closing bracket")?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            TokenKind::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                "undefined" => Expr::Literal(Literal::Undefined),
                _ => Expr::Ident(name),
            }),
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.pipeline()?;
                self.expect(Punct::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBracket) => Ok(Expr::Array(self.arguments(Punct::RBracket)?)),
            TokenKind::Punct(Punct::LBrace) => self.object(),
            TokenKind::End => Err(CompileError::syntax(self.source, offset, "unexpected end of expression")),
            TokenKind::Punct(_) => Err(CompileError::syntax(self.source, offset, "unexpected token")),
        }
    }

    fn object(&mut self) -> Result<Expr, CompileError> {
        let mut entries = Vec::new();
        loop {
            if self.eat(Punct::RBrace) {
                return Ok(Expr::Object(entries));
            }
            let key = match self.advance() {
                TokenKind::Ident(name) | TokenKind::Str(name) => name,
                TokenKind::Number(n) => rill_core::value::format_number(n),
                _ => return Err(self.error("expected object key")),
            };
            let value = if self.eat(Punct::Colon) {
                self.pipeline()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace, "`,` or `}`")?;
                return Ok(Expr::Object(entries));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Expr, CompileError> {
        parse_expression(source, &FilterRegistry::with_defaults())
    }

    #[test]
    fn precedence() {
        let expr = parse("a + b * c").expect("parse");
        assert!(matches!(
            expr,
            Expr::Binary(BinaryOp::Add, _, ref right) if matches!(**right, Expr::Binary(BinaryOp::Mul, ..))
        ));
    }

    #[test]
    fn pipeline_binds_loosest() {
        let expr = parse("a || b |> upper").expect("parse");
        let Expr::Pipe { input, name, filter, .. } = expr else {
            panic!("expected pipe");
        };
        assert_eq!(name, "upper");
        assert!(filter.is_some());
        assert!(matches!(*input, Expr::Logical(LogicalOp::Or, ..)));
    }

    #[test]
    fn unknown_filters_still_compile() {
        let expr = parse("a |> missing(1, 2)").expect("parse");
        assert!(matches!(expr, Expr::Pipe { filter: None, ref args, .. } if args.len() == 2));
    }

    #[test]
    fn malformed_filters() {
        assert!(matches!(parse("a |> "), Err(CompileError::EmptyFilter(_))));
        assert!(matches!(parse("a |> upper |>"), Err(CompileError::EmptyFilter(_))));
        assert!(matches!(parse("a |> 'x'"), Err(CompileError::MalformedFilter(_))));
        assert!(matches!(parse("a |> f(1"), Err(CompileError::MalformedFilter(_))));
        assert!(matches!(parse("a |> f g"), Err(CompileError::MalformedFilter(_))));
    }

    #[test]
    fn assignments_need_paths() {
        assert!(parse("a.b[0] = 1").is_ok());
        assert!(parse("count += 2").is_ok());
        assert!(parse("1 = 2").is_err());
        assert!(parse("f() = 2").is_err());
    }

    #[test]
    fn statements() {
        let expr = parse_statements("a = 1; ; b()", &FilterRegistry::new()).expect("parse");
        assert!(matches!(expr, Expr::Sequence(ref items) if items.len() == 2));
        assert!(parse("a; b").is_err());
    }

    #[test]
    fn literals() {
        assert!(parse("{ a: 1, 'b': [1, 2,], c }").is_ok());
        assert!(parse("typeof x === 'string' ? x : ''").is_ok());
        assert!(parse("(a").is_err());
        assert!(parse("items[(a |> upper)]").is_ok());
    }
}
