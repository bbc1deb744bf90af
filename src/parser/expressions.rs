//! Expression parsing implementation
//!
//! This module handles parsing of expressions using one recursive descent
//! function per precedence level.
//!
//! # Supported Expressions
//!
//! - Literals: integers, floats, strings, bits (`0b1010`), `true`, `false`, `nil`
//! - Lists `[a, b]`, objects `{key: value}`, lambdas `fn(x) { ... }`
//! - Binary operators: arithmetic, comparison, short-circuit logical
//! - Unary operators: `-`, `!`
//! - Postfix: calls `()`, indexing `[]`, member access `.`
//! - Assignment to variables, elements and members
//!
//! # Precedence (lowest first)
//!
//! ```text
//! =  ||  &&  == !=  < <= > >=  + -  * / %  unary  postfix
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};
use std::rc::Rc;

impl Parser {
    /// Parse expression (top-level entry point)
    pub(crate) fn parse_expression(&mut self) -> Result<NodeId, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<NodeId, ParseError> {
        let target = self.parse_logical_or()?;
        if self.check(&TokenKind::Eq)? {
            let loc = self.current_location()?;
            let assignable = matches!(
                self.node(target),
                Some(NodeKind::Ident(_) | NodeKind::Index { .. } | NodeKind::Member { .. })
            );
            if !assignable {
                return Err(self.error("Invalid assignment target".to_string()));
            }
            self.advance()?;
            let value = self.parse_assignment()?;
            return Ok(self.add(NodeKind::Assign { target, value }, loc));
        }
        Ok(target)
    }

    /// Left-associative binary level
    fn parse_binary_level(
        &mut self,
        operators: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<NodeId, ParseError>,
    ) -> Result<NodeId, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in operators {
                if self.check(token)? {
                    let loc = self.current_location()?;
                    self.advance()?;
                    let right = next(self)?;
                    left = self.add(
                        NodeKind::Binary {
                            op: *op,
                            left,
                            right,
                        },
                        loc,
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_logical_or(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(&[(TokenKind::OrOr, BinOp::Or)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(&[(TokenKind::AndAnd, BinOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(
            &[
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Ge, BinOp::Ge),
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Gt, BinOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<NodeId, ParseError> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let op = match self.peek_kind()? {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Bang => UnOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let operand = self.parse_unary()?;
        Ok(self.add(NodeKind::Unary { op, operand }, loc))
    }

    fn parse_postfix(&mut self) -> Result<NodeId, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let loc = self.current_location()?;
            if self.match_token(&TokenKind::LParen)? {
                let args = self.parse_argument_list()?;
                expr = self.add(NodeKind::Call { callee: expr, args }, loc);
            } else if self.match_token(&TokenKind::LBracket)? {
                let index = self.parse_expression()?;
                self.expect_token(&TokenKind::RBracket, "Expected ']' after index")?;
                expr = self.add(NodeKind::Index { object: expr, index }, loc);
            } else if self.match_token(&TokenKind::Dot)? {
                let name = self.expect_identifier()?;
                expr = self.add(NodeKind::Member { object: expr, name }, loc);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after the opening parenthesis
    pub(crate) fn parse_argument_list(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen)? {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect_token(&TokenKind::RParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let token = self.peek_kind()?;
        let kind = match token {
            TokenKind::Int(n) => NodeKind::Literal(Literal::Int(n)),
            TokenKind::Float(x) => NodeKind::Literal(Literal::Float(x)),
            TokenKind::Str(s) => NodeKind::Literal(Literal::Str(Rc::from(s.as_str()))),
            TokenKind::Bits(b) => NodeKind::Literal(Literal::Bits(b)),
            TokenKind::True => NodeKind::Literal(Literal::Bool(true)),
            TokenKind::False => NodeKind::Literal(Literal::Bool(false)),
            TokenKind::Nil => NodeKind::Literal(Literal::Nil),
            TokenKind::Ident(name) => NodeKind::Ident(Rc::from(name.as_str())),
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect_token(&TokenKind::RParen, "Expected ')' after expression")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance()?;
                return self.parse_list_literal(loc);
            }
            TokenKind::LBrace => {
                self.advance()?;
                return self.parse_object_literal(loc);
            }
            TokenKind::Fn => {
                self.advance()?;
                self.expect_token(&TokenKind::LParen, "Expected '(' after 'fn'")?;
                let params = self.parse_parameter_list()?;
                let body = self.parse_block()?;
                return Ok(self.add(NodeKind::Lambda { params, body }, loc));
            }
            other => {
                return Err(self.error(format!("Expected expression, found {}", other)));
            }
        };
        self.advance()?;
        Ok(self.add(kind, loc))
    }

    fn parse_list_literal(&mut self, loc: SourceLocation) -> Result<NodeId, ParseError> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket)? {
            items.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect_token(&TokenKind::RBracket, "Expected ']' after list items")?;
        Ok(self.add(NodeKind::ListLit { items }, loc))
    }

    fn parse_object_literal(&mut self, loc: SourceLocation) -> Result<NodeId, ParseError> {
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace)? {
            let key: Rc<str> = match self.advance()? {
                TokenKind::Ident(name) | TokenKind::Str(name) => Rc::from(name.as_str()),
                other => {
                    return Err(self.error(format!("Expected field name, found {}", other)));
                }
            };
            self.expect_token(&TokenKind::Colon, "Expected ':' after field name")?;
            let value = self.parse_expression()?;
            fields.push((key, value));
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' after object fields")?;
        Ok(self.add(NodeKind::ObjectLit { fields }, loc))
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn expr(source: &str) -> (Ast, NodeId) {
        let ast = Parser::new(&format!("{};", source))
            .unwrap()
            .parse_program()
            .unwrap();
        let Some(NodeKind::Program { body }) = ast.kind(ast.root()) else {
            panic!("expected program");
        };
        let Some(NodeKind::ExprStmt { expr }) = ast.kind(body[0]) else {
            panic!("expected expression statement");
        };
        let expr = *expr;
        (ast, expr)
    }

    #[test]
    fn test_precedence() {
        let (ast, root) = expr("1 + 2 * 3");
        match ast.kind(root) {
            Some(NodeKind::Binary {
                op: BinOp::Add,
                right,
                ..
            }) => assert!(matches!(
                ast.kind(*right),
                Some(NodeKind::Binary { op: BinOp::Mul, .. })
            )),
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_chain() {
        let (ast, root) = expr("a.b[0](1, 2)");
        match ast.kind(root) {
            Some(NodeKind::Call { callee, args }) => {
                assert_eq!(args.len(), 2);
                assert!(matches!(ast.kind(*callee), Some(NodeKind::Index { .. })));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = Parser::new("1 = 2;").unwrap().parse_program().unwrap_err();
        assert!(err.message.contains("assignment"));
    }

    #[test]
    fn test_object_and_lambda_literals() {
        let (ast, root) = expr("({name: \"x\", \"n\": fn(a) { return a; }})");
        match ast.kind(root) {
            Some(NodeKind::ObjectLit { fields }) => {
                assert_eq!(fields.len(), 2);
                assert!(matches!(ast.kind(fields[1].1), Some(NodeKind::Lambda { .. })));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
