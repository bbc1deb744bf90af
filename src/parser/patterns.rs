//! Pattern parsing implementation
//!
//! Rule bodies are parsed in pattern mode. Code fragments embedded in a
//! pattern (filter and addition functions, executor blocks, group header
//! properties) switch back to code mode for their duration.
//!
//! # Grammar
//!
//! ```text
//! pattern     ::= alternative ("|" alternative)*
//! alternative ::= element*
//! element     ::= "!"? (identifier ":")? atom quantifier?
//! atom        ::= string modifiers? | class modifiers? | hex | "." modifiers? | "$"
//!               | "(" header? pattern ")" modifiers?
//!               | "<<" option ("," option)* ">>" quantifier?
//!               | identifier
//!               | "@" (identifier | "*") ("(" expression ")")?
//!               | "%" ("(" expression ")")? block
//!               | "^" identifier ("(" expression ")")?
//! header      ::= "{" "prop" item ("," item)* "}"
//! item        ::= "!"? identifier ("=" expression)?
//! quantifier  ::= ("?" | "*" | "+" | "{" n "}" | "{" n "," "}" | "{" n "," n "}")
//!                 ("?" | "+")?
//! ```

use crate::parser::ast::*;
use crate::parser::lexer::{LexMode, TokenKind};
use crate::parser::parse::{ParseError, Parser};
use std::rc::Rc;

impl Parser {
    /// Alternatives separated by `|`. A single alternative is returned as is;
    /// several are wrapped in a plain group.
    pub(crate) fn parse_pattern(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let alternatives = self.parse_alternatives()?;
        if alternatives.len() == 1 {
            return Ok(alternatives[0]);
        }
        Ok(self.add(
            NodeKind::Group {
                header: GroupHeader::plain(),
                alternatives,
            },
            loc,
        ))
    }

    fn parse_alternatives(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut alternatives = vec![self.parse_alternative()?];
        while self.match_token(&TokenKind::Pipe)? {
            alternatives.push(self.parse_alternative()?);
        }
        Ok(alternatives)
    }

    fn ends_alternative(token: &TokenKind) -> bool {
        matches!(
            token,
            TokenKind::Pipe
                | TokenKind::RParen
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::GtGt
                | TokenKind::RBrace
                | TokenKind::Eof
        )
    }

    /// A sequence of elements; one element is returned unwrapped
    fn parse_alternative(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let mut items = Vec::new();
        while !Self::ends_alternative(self.peek()?) {
            items.push(self.parse_element()?);
        }
        if items.len() == 1 {
            return Ok(items[0]);
        }
        Ok(self.add(NodeKind::Sequence { items }, loc))
    }

    fn parse_element(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let negated = self.match_token(&TokenKind::Bang)?;

        let label = match (self.peek_kind()?, self.peek_ahead(1)?) {
            (TokenKind::Ident(name), TokenKind::Colon) => Some(Rc::from(name.as_str())),
            _ => None,
        };
        if label.is_some() {
            self.advance()?;
            self.advance()?;
        }

        let mut element = self.parse_atom()?;
        if let Some(quantifier) = self.parse_quantifier()? {
            element = self.add(
                NodeKind::Quantified {
                    inner: element,
                    quantifier,
                },
                loc,
            );
        }
        if let Some(name) = label {
            element = self.add(
                NodeKind::Capture {
                    name,
                    inner: element,
                },
                loc,
            );
        }
        if negated {
            element = self.add(NodeKind::Not { inner: element }, loc);
        }
        Ok(element)
    }

    fn parse_atom(&mut self) -> Result<NodeId, ParseError> {
        let loc = self.current_location()?;
        let kind = match self.advance()? {
            TokenKind::Str(text) => NodeKind::Text {
                text: Rc::from(text.as_str()),
                modifiers: self.parse_modifiers()?,
            },
            TokenKind::Class(class) => NodeKind::Class {
                class,
                modifiers: self.parse_modifiers()?,
            },
            TokenKind::Hex(bytes) => NodeKind::Bytes {
                bytes: bytes.into(),
            },
            TokenKind::Dot => NodeKind::Any {
                modifiers: self.parse_modifiers()?,
            },
            TokenKind::Dollar => NodeKind::End,
            TokenKind::LParen => self.parse_group()?,
            TokenKind::LtLt => self.parse_quantified_group()?,
            TokenKind::Ident(name) => NodeKind::RuleRef {
                name: Rc::from(name.as_str()),
            },
            TokenKind::At => {
                let name = if self.match_token(&TokenKind::Star)? {
                    None
                } else {
                    Some(self.expect_identifier()?)
                };
                let func = self.parse_pattern_function()?;
                NodeKind::Filter { name, func }
            }
            TokenKind::Percent => {
                let (guard, body) = self.in_mode(LexMode::Code, |p| {
                    let guard = if p.match_token(&TokenKind::LParen)? {
                        let guard = p.parse_expression()?;
                        p.expect_token(&TokenKind::RParen, "Expected ')' after executor guard")?;
                        Some(guard)
                    } else {
                        None
                    };
                    Ok((guard, p.parse_block()?))
                })?;
                NodeKind::Executor { guard, body }
            }
            TokenKind::Caret => {
                let name = self.expect_identifier()?;
                let func = self.parse_pattern_function()?;
                NodeKind::Addition { name, func }
            }
            other => {
                return Err(ParseError {
                    message: format!("Expected lexeme, found {}", other),
                    location: loc,
                })
            }
        };
        Ok(self.add(kind, loc))
    }

    /// Optional `( expression )` after a filter or addition
    fn parse_pattern_function(&mut self) -> Result<Option<NodeId>, ParseError> {
        if !self.check(&TokenKind::LParen)? {
            return Ok(None);
        }
        self.in_mode(LexMode::Code, |p| {
            p.expect_token(&TokenKind::LParen, "Expected '('")?;
            let func = p.parse_expression()?;
            p.expect_token(&TokenKind::RParen, "Expected ')' after function")?;
            Ok(Some(func))
        })
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers, ParseError> {
        if let TokenKind::Modifiers(insensitive, reverse) = self.peek_kind()? {
            self.advance()?;
            return Ok(Modifiers {
                insensitive: insensitive.then_some(true),
                reverse: reverse.then_some(true),
            });
        }
        Ok(Modifiers::default())
    }

    /// After `(`
    fn parse_group(&mut self) -> Result<NodeKind, ParseError> {
        let is_header = self.check(&TokenKind::LBrace)?
            && matches!(self.peek_ahead(1)?, TokenKind::Ident(word) if word == "prop");
        let mut header = if is_header {
            self.parse_group_header()?
        } else {
            GroupHeader::plain()
        };
        let alternatives = self.parse_alternatives()?;
        self.expect_token(&TokenKind::RParen, "Expected ')' after group")?;

        let modifiers = self.parse_modifiers()?;
        header.modifiers.insensitive = modifiers.insensitive.or(header.modifiers.insensitive);
        header.modifiers.reverse = modifiers.reverse.or(header.modifiers.reverse);
        Ok(NodeKind::Group {
            header,
            alternatives,
        })
    }

    fn parse_group_header(&mut self) -> Result<GroupHeader, ParseError> {
        self.in_mode(LexMode::Code, |p| {
            p.expect_token(&TokenKind::LBrace, "Expected '{'")?;
            p.advance()?; // prop
            let mut header = GroupHeader::plain();
            while !p.check(&TokenKind::RBrace)? {
                p.parse_header_item(&mut header)?;
                if !p.match_token(&TokenKind::Comma)? {
                    break;
                }
            }
            p.expect_token(&TokenKind::RBrace, "Expected '}' after group header")?;
            Ok(header)
        })
    }

    fn parse_header_item(&mut self, header: &mut GroupHeader) -> Result<(), ParseError> {
        let negated = self.match_token(&TokenKind::Bang)?;
        let key = self.expect_identifier()?;
        let value = if self.match_token(&TokenKind::Eq)? {
            if negated {
                return Err(self.error(format!("'!{}' cannot take a value", key)));
            }
            Some(self.parse_expression()?)
        } else {
            None
        };

        let flag = |p: &mut Parser| -> Result<bool, ParseError> {
            match value.map(|v| p.node(v).cloned()) {
                None => Ok(!negated),
                Some(Some(NodeKind::Literal(Literal::Bool(b)))) => Ok(b),
                Some(_) => Err(p.error(format!("'{}' must be true or false", key))),
            }
        };

        match &*key {
            "name" => match value.and_then(|v| self.node(v).cloned()) {
                Some(NodeKind::Literal(Literal::Str(name))) => header.name = Some(name),
                _ => return Err(self.error("group name must be a string literal".to_string())),
            },
            "capture" => header.capture = Some(flag(self)?),
            "consume" => header.consume = flag(self)?,
            "backtrack" => header.backtrack = flag(self)?,
            "insensitive" => header.modifiers.insensitive = Some(flag(self)?),
            "reverse" => header.modifiers.reverse = Some(flag(self)?),
            _ => match value {
                Some(value) => header.props.push((key.clone(), value)),
                None => {
                    let loc = self.previous_location();
                    let literal = self.add(NodeKind::Literal(Literal::Bool(!negated)), loc);
                    header.props.push((key.clone(), literal));
                }
            },
        }
        Ok(())
    }

    /// After `<<`
    fn parse_quantified_group(&mut self) -> Result<NodeKind, ParseError> {
        let mut options = Vec::new();
        loop {
            let option = self.parse_alternative()?;
            let option = match self.node(option).cloned() {
                Some(NodeKind::Quantified { inner, quantifier }) => GroupOption {
                    pattern: inner,
                    quantifier,
                },
                _ => GroupOption {
                    pattern: option,
                    quantifier: Quantifier::exactly(1),
                },
            };
            options.push(option);
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect_token(&TokenKind::GtGt, "Expected '>>' after quantified group")?;
        let bound = self.parse_quantifier()?;
        Ok(NodeKind::QuantGroup { options, bound })
    }

    /// Optional quantifier with its lazy/atomic suffix
    pub(crate) fn parse_quantifier(&mut self) -> Result<Option<Quantifier>, ParseError> {
        let mut quantifier = match self.peek_kind()? {
            TokenKind::Question => Quantifier {
                max: 1,
                ..Quantifier::exactly(0)
            },
            TokenKind::Star => Quantifier::at_least(0),
            TokenKind::Plus => Quantifier::at_least(1),
            TokenKind::LBrace if matches!(self.peek_ahead(1)?, TokenKind::Int(_)) => {
                self.advance()?;
                return self.parse_braced_quantifier().map(Some);
            }
            _ => return Ok(None),
        };
        self.advance()?;
        self.parse_quantifier_suffix(&mut quantifier)?;
        Ok(Some(quantifier))
    }

    /// `{m}`, `{m,}` or `{m,n}` after the brace
    fn parse_braced_quantifier(&mut self) -> Result<Quantifier, ParseError> {
        let min = self.expect_count()?;
        let mut quantifier = if self.match_token(&TokenKind::Comma)? {
            if self.check(&TokenKind::RBrace)? {
                Quantifier::at_least(min)
            } else {
                let max = self.expect_count()?;
                Quantifier::between(min, max).ok_or_else(|| {
                    self.error(format!("Invalid quantifier bounds {{{},{}}}", min, max))
                })?
            }
        } else {
            Quantifier::exactly(min)
        };
        self.expect_token(&TokenKind::RBrace, "Expected '}' after quantifier")?;
        self.parse_quantifier_suffix(&mut quantifier)?;
        Ok(quantifier)
    }

    fn parse_quantifier_suffix(&mut self, quantifier: &mut Quantifier) -> Result<(), ParseError> {
        if self.match_token(&TokenKind::Question)? {
            quantifier.lazy = true;
        } else if self.match_token(&TokenKind::Plus)? {
            quantifier.atomic = true;
        }
        Ok(())
    }

    fn expect_count(&mut self) -> Result<u32, ParseError> {
        match self.peek_kind()? {
            TokenKind::Int(n) if (0..=i64::from(u32::MAX)).contains(&n) => {
                self.advance()?;
                Ok(n as u32)
            }
            other => Err(self.error(format!("Expected repetition count, found {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn rule(source: &str) -> (Ast, NodeId) {
        let ast = Parser::new(&format!("rule R = {};", source))
            .unwrap()
            .parse_program()
            .unwrap();
        let Some(NodeKind::Program { body }) = ast.kind(ast.root()) else {
            panic!("expected program");
        };
        let Some(NodeKind::RuleDecl { pattern, .. }) = ast.kind(body[0]) else {
            panic!("expected rule");
        };
        let pattern = *pattern;
        (ast, pattern)
    }

    #[test]
    fn test_quantifier_forms() {
        let (ast, root) = rule("\"a\"{5}");
        match ast.kind(root) {
            Some(NodeKind::Quantified { quantifier, .. }) => {
                assert_eq!(*quantifier, Quantifier::exactly(5));
            }
            other => panic!("expected quantifier, got {:?}", other),
        }

        let (ast, root) = rule("[a-z]{2,}?");
        match ast.kind(root) {
            Some(NodeKind::Quantified { quantifier, .. }) => {
                assert!(quantifier.infinite && quantifier.lazy);
                assert_eq!(quantifier.min, 2);
            }
            other => panic!("expected quantifier, got {:?}", other),
        }

        let (ast, root) = rule("\"x\"*+");
        assert!(matches!(
            ast.kind(root),
            Some(NodeKind::Quantified { quantifier, .. }) if quantifier.atomic
        ));
    }

    #[test]
    fn test_group_header() {
        let (ast, root) = rule("({prop name = \"word\", !consume, level = 1 + 1} \"a\" | \"b\")/i");
        match ast.kind(root) {
            Some(NodeKind::Group {
                header,
                alternatives,
            }) => {
                assert_eq!(header.name.as_deref(), Some("word"));
                assert!(header.captures());
                assert!(!header.consume);
                assert!(header.backtrack);
                assert_eq!(header.modifiers.insensitive, Some(true));
                assert_eq!(header.props.len(), 1);
                assert_eq!(alternatives.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_quantified_group_options() {
        let (ast, root) = rule("<< \"a\"{1}, \"b\"?, \"c\"{1,2} >>");
        match ast.kind(root) {
            Some(NodeKind::QuantGroup { options, bound }) => {
                assert_eq!(options.len(), 3);
                assert_eq!(options[1].quantifier.min, 0);
                assert_eq!(options[2].quantifier.max, 2);
                assert!(bound.is_none());
            }
            other => panic!("expected quantified group, got {:?}", other),
        }
    }

    #[test]
    fn test_negation_label_and_embedded_code() {
        let (ast, root) = rule("!\"x\" word:[a-z]+ %(ok) { n = n + 1; } @item(fn(x) { return x; }) ^mark");
        let Some(NodeKind::Sequence { items }) = ast.kind(root) else {
            panic!("expected sequence");
        };
        let tags: Vec<&str> = items
            .iter()
            .map(|id| ast.kind(*id).map_or("?", NodeKind::tag))
            .collect();
        assert_eq!(tags, vec!["not", "capture", "executor", "filter", "addition"]);
    }

    #[test]
    fn test_invalid_bounds_are_rejected() {
        let err = Parser::new("rule R = \"a\"{3,1};")
            .unwrap()
            .parse_program()
            .unwrap_err();
        assert!(err.message.contains("bounds"));
    }
}
