//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including error types, helper methods, and the main parse entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, token buffer, helpers and coordination
//! - `declarations`: `let`, `fn`, `rule` and `fragment` declarations
//! - `statements`: control flow, blocks and expression statements
//! - `expressions`: expressions with one function per precedence level
//! - `patterns`: the lexeme sublanguage of rule bodies
//!
//! # Lexical modes
//!
//! Rule bodies are lexed in [`LexMode::Pattern`]. The parser switches modes
//! with [`Parser::set_mode`]; tokens already looked ahead at are re-lexed in
//! the new mode.

use crate::parser::ast::*;
use crate::parser::lexer::{LexError, LexMode, Lexer, Token, TokenKind};
use std::collections::VecDeque;
use std::mem::discriminant;
use std::rc::Rc;
use thiserror::Error;

/// Parser error type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Parse error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

/// Recursive descent parser
pub struct Parser {
    lexer: Lexer,
    mode: LexMode,
    lookahead: VecDeque<Token>,
    previous: SourceLocation,
    pub(crate) ast: Ast,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let mut parser = Self {
            lexer: Lexer::new(source),
            mode: LexMode::Code,
            lookahead: VecDeque::new(),
            previous: SourceLocation::new(1, 1),
            ast: Ast::new(),
        };
        parser.fill(1)?;
        Ok(parser)
    }

    /// Parse the entire program
    pub fn parse_program(&mut self) -> Result<Ast, ParseError> {
        let loc = self.current_location()?;
        let mut body = Vec::new();
        while !self.is_at_end()? {
            body.push(self.parse_statement()?);
        }
        let root = self.ast.add(NodeKind::Program { body }, loc);
        self.ast.set_root(root);
        Ok(std::mem::take(&mut self.ast))
    }

    // ---------------------------------------------------------------
    // Modes
    // ---------------------------------------------------------------

    /// Switch lexical mode, returning the previous one
    pub(crate) fn set_mode(&mut self, mode: LexMode) -> LexMode {
        let previous = self.mode;
        if mode != previous {
            if let Some(first) = self.lookahead.front() {
                self.lexer.reset_to(first.start);
            }
            self.lookahead.clear();
            self.mode = mode;
        }
        previous
    }

    /// Run `f` in `mode`, restoring the current mode afterwards
    pub(crate) fn in_mode<T>(
        &mut self,
        mode: LexMode,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let previous = self.set_mode(mode);
        let result = f(self);
        self.set_mode(previous);
        result
    }

    // ---------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------

    fn fill(&mut self, count: usize) -> Result<(), ParseError> {
        while self.lookahead.len() < count {
            if self.lookahead.back().is_some_and(|t| t.kind == TokenKind::Eof) {
                break;
            }
            let token = self.lexer.next_token(self.mode)?;
            self.lookahead.push_back(token);
        }
        Ok(())
    }

    pub(crate) fn peek(&mut self) -> Result<&TokenKind, ParseError> {
        self.fill(1)?;
        Ok(self
            .lookahead
            .front()
            .map_or(&TokenKind::Eof, |t| &t.kind))
    }

    /// Owned copy of the next token kind
    pub(crate) fn peek_kind(&mut self) -> Result<TokenKind, ParseError> {
        self.peek().cloned()
    }

    pub(crate) fn peek_ahead(&mut self, n: usize) -> Result<&TokenKind, ParseError> {
        self.fill(n + 1)?;
        Ok(self.lookahead.get(n).map_or(&TokenKind::Eof, |t| &t.kind))
    }

    pub(crate) fn advance(&mut self) -> Result<TokenKind, ParseError> {
        self.fill(1)?;
        match self.lookahead.pop_front() {
            Some(token) => {
                self.previous = token.location;
                Ok(token.kind)
            }
            None => Ok(TokenKind::Eof),
        }
    }

    pub(crate) fn is_at_end(&mut self) -> Result<bool, ParseError> {
        Ok(*self.peek()? == TokenKind::Eof)
    }

    /// Whether the next token has the same kind as `token` (payload ignored)
    pub(crate) fn check(&mut self, token: &TokenKind) -> Result<bool, ParseError> {
        Ok(discriminant(self.peek()?) == discriminant(token))
    }

    pub(crate) fn match_token(&mut self, token: &TokenKind) -> Result<bool, ParseError> {
        if self.check(token)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn expect_token(&mut self, token: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check(token)? {
            self.advance()?;
            Ok(())
        } else {
            let found = self.peek_kind()?;
            Err(self.error(format!("{}, found {}", message, found)))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<Rc<str>, ParseError> {
        match self.peek_kind()? {
            TokenKind::Ident(name) => {
                self.advance()?;
                Ok(Rc::from(name.as_str()))
            }
            found => Err(self.error(format!("Expected identifier, found {}", found))),
        }
    }

    pub(crate) fn previous_location(&self) -> SourceLocation {
        self.previous
    }

    pub(crate) fn current_location(&mut self) -> Result<SourceLocation, ParseError> {
        self.fill(1)?;
        Ok(self
            .lookahead
            .front()
            .map_or(self.previous, |t| t.location))
    }

    /// Error at the current token
    pub(crate) fn error(&mut self, message: String) -> ParseError {
        let location = self.current_location().unwrap_or(self.previous);
        ParseError { message, location }
    }

    pub(crate) fn add(&mut self, kind: NodeKind, location: SourceLocation) -> NodeId {
        self.ast.add(kind, location)
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&NodeKind> {
        self.ast.kind(id)
    }

    /// `(a, b, c)` parameter names, after the opening parenthesis
    pub(crate) fn parse_parameter_list(&mut self) -> Result<Rc<[Rc<str>]>, ParseError> {
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen)? {
            loop {
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect_token(&TokenKind::RParen, "Expected ')' after parameters")?;
        Ok(params.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Ast {
        Parser::new(source).unwrap().parse_program().unwrap()
    }

    fn body(ast: &Ast) -> Vec<NodeId> {
        match ast.kind(ast.root()) {
            Some(NodeKind::Program { body }) => body.clone(),
            other => panic!("expected program, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_declarations() {
        let ast = parse("let x = 1; fn f(a, b) { return a + b; } rule R = \"a\";");
        let body = body(&ast);
        assert_eq!(body.len(), 3);
        assert_eq!(ast.kind(body[0]).map(NodeKind::tag), Some("let"));
        match ast.kind(body[1]) {
            Some(NodeKind::FnDecl { name, params, .. }) => {
                assert_eq!(&**name, "f");
                assert_eq!(params.len(), 2);
            }
            other => panic!("expected fn, got {:?}", other),
        }
        assert_eq!(ast.kind(body[2]).map(NodeKind::tag), Some("rule"));
    }

    #[test]
    fn test_mode_switch_relexes_lookahead() {
        // `[` is a class in the rule body and a list afterwards
        let ast = parse("rule R = [ab]; let l = [1, 2];");
        let body = body(&ast);
        match ast.kind(body[1]) {
            Some(NodeKind::Let { init, .. }) => {
                assert!(matches!(ast.kind(*init), Some(NodeKind::ListLit { items }) if items.len() == 2));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_location() {
        let err = Parser::new("let = 3;").unwrap().parse_program().unwrap_err();
        assert_eq!(err.location.line, 1);
        assert!(err.message.contains("identifier"));
    }
}
