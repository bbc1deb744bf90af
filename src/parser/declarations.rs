//! Declaration parsing implementation
//!
//! This module handles parsing of declarations:
//!
//! - Variables: `let name = expr;`
//! - Functions: `fn name(params) { ... }`
//! - Rules: `rule Name = pattern;` (captures under its name) and
//!   `fragment Name = pattern;` (no capture)
//!
//! # Grammar
//!
//! ```text
//! declaration ::= let_decl | fn_decl | rule_decl
//! let_decl    ::= "let" identifier "=" expression ";"
//! fn_decl     ::= "fn" identifier "(" params ")" block
//! rule_decl   ::= ("rule" | "fragment") identifier "=" pattern ";"
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::{LexMode, TokenKind};
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// `let` already consumed
    pub(crate) fn parse_let(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.previous_location();
        let name = self.expect_identifier()?;
        self.expect_token(&TokenKind::Eq, "Expected '=' after variable name")?;
        let init = self.parse_expression()?;
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after variable declaration")?;
        Ok(self.add(NodeKind::Let { name, init }, loc))
    }

    /// `fn` already consumed, name follows
    pub(crate) fn parse_function_declaration(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.previous_location();
        let name = self.expect_identifier()?;
        self.expect_token(&TokenKind::LParen, "Expected '(' after function name")?;
        let params = self.parse_parameter_list()?;
        let body = self.parse_block()?;
        Ok(self.add(NodeKind::FnDecl { name, params, body }, loc))
    }

    /// `rule` or `fragment` already consumed
    pub(crate) fn parse_rule_declaration(&mut self, capture: bool) -> Result<NodeId, ParseError> {
        let loc = self.previous_location();
        let name = self.expect_identifier()?;
        self.expect_token(&TokenKind::Eq, "Expected '=' after rule name")?;
        let pattern = self.in_mode(LexMode::Pattern, |p| p.parse_pattern())?;
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after rule body")?;
        Ok(self.add(
            NodeKind::RuleDecl {
                name,
                pattern,
                capture,
            },
            loc,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::NodeKind;
    use crate::parser::parse::Parser;

    #[test]
    fn test_fragment_does_not_capture() {
        let ast = Parser::new("fragment Digit = [0-9];")
            .unwrap()
            .parse_program()
            .unwrap();
        let Some(NodeKind::Program { body }) = ast.kind(ast.root()) else {
            panic!("expected program");
        };
        assert!(matches!(
            ast.kind(body[0]),
            Some(NodeKind::RuleDecl { capture: false, .. })
        ));
    }
}
