//! Statement parsing implementation
//!
//! This module handles parsing of all statement types:
//!
//! - Declarations: `let`, `fn`, `rule`, `fragment` (see `declarations`)
//! - Control flow: `if`/`else`, `while`, `for ... in`
//! - Jump statements: `return`, `break`, `continue`
//! - Blocks: `{ ... }`
//! - Expression statements: calls, assignments
//!
//! # Grammar
//!
//! ```text
//! statement ::= declaration | if_stmt | while_stmt | for_stmt
//!             | return_stmt | break_stmt | continue_stmt | block | expr_stmt
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse a statement
    pub(crate) fn parse_statement(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;

        match self.peek_kind()? {
            TokenKind::Let => {
                self.advance()?;
                self.parse_let()
            }
            TokenKind::Fn if matches!(self.peek_ahead(1)?, TokenKind::Ident(_)) => {
                self.advance()?;
                self.parse_function_declaration()
            }
            TokenKind::Rule => {
                self.advance()?;
                self.parse_rule_declaration(true)
            }
            TokenKind::Fragment => {
                self.advance()?;
                self.parse_rule_declaration(false)
            }
            TokenKind::If => {
                self.advance()?;
                self.parse_if_statement()
            }
            TokenKind::While => {
                self.advance()?;
                let condition = self.parse_condition()?;
                let body = self.parse_block()?;
                Ok(self.add(NodeKind::While { condition, body }, loc))
            }
            TokenKind::For => {
                self.advance()?;
                let var = self.expect_identifier()?;
                self.expect_token(&TokenKind::In, "Expected 'in' after loop variable")?;
                let iterable = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(self.add(
                    NodeKind::For {
                        var,
                        iterable,
                        body,
                    },
                    loc,
                ))
            }
            TokenKind::Return => {
                self.advance()?;
                let value = if self.check(&TokenKind::Semicolon)? {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after return")?;
                Ok(self.add(NodeKind::Return { value }, loc))
            }
            TokenKind::Break => {
                self.advance()?;
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after 'break'")?;
                Ok(self.add(NodeKind::Break, loc))
            }
            TokenKind::Continue => {
                self.advance()?;
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after 'continue'")?;
                Ok(self.add(NodeKind::Continue, loc))
            }
            TokenKind::LBrace => self.parse_block(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after expression")?;
                Ok(self.add(NodeKind::ExprStmt { expr }, loc))
            }
        }
    }

    /// `{ statements }`
    pub(crate) fn parse_block(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        self.expect_token(&TokenKind::LBrace, "Expected '{'")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace)? && !self.is_at_end()? {
            body.push(self.parse_statement()?);
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' after block")?;
        Ok(self.add(NodeKind::Block { body }, loc))
    }

    /// `( expression )`
    fn parse_condition(&mut self) -> Result<NodeId, ParseError> {
        self.expect_token(&TokenKind::LParen, "Expected '(' before condition")?;
        let condition = self.parse_expression()?;
        self.expect_token(&TokenKind::RParen, "Expected ')' after condition")?;
        Ok(condition)
    }

    /// `if` already consumed
    fn parse_if_statement(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.previous_location();
        let condition = self.parse_condition()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.match_token(&TokenKind::Else)? {
            if self.match_token(&TokenKind::If)? {
                Some(self.parse_if_statement()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(self.add(
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
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
    fn test_parse_if_else_chain() {
        let ast = Parser::new("if (x) { y; } else if (z) { w; } else { v; }")
            .unwrap()
            .parse_program()
            .unwrap();
        let Some(NodeKind::Program { body }) = ast.kind(ast.root()) else {
            panic!("expected program");
        };
        match ast.kind(body[0]) {
            Some(NodeKind::If {
                else_branch: Some(else_branch),
                ..
            }) => assert!(matches!(ast.kind(*else_branch), Some(NodeKind::If { .. }))),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_loops() {
        let source = "while (i < 3) { i = i + 1; } for x in xs { break; }";
        let ast = Parser::new(source).unwrap().parse_program().unwrap();
        let Some(NodeKind::Program { body }) = ast.kind(ast.root()) else {
            panic!("expected program");
        };
        assert_eq!(body.len(), 2);
    }
}
