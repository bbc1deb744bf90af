//! Lexer (tokenizer)
//!
//! The language has two lexical modes:
//! - [`LexMode::Code`]: expressions and statements
//! - [`LexMode::Pattern`]: rule bodies, where `[...]` is a character class,
//!   `/ir` a modifier suffix, `0x...` a byte string and `<<`/`>>` delimit a
//!   quantified group
//!
//! The parser drives the mode. Tokens are produced on demand, so a mode switch
//! only has to re-lex the tokens it had already looked ahead at.

use super::ast::{CharClass, ClassItem, SourceLocation};
use crate::memory::value::BitList;
use std::fmt;
use thiserror::Error;

/// Lexical mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    Code,
    Pattern,
}

/// Token kinds produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Bits(BitList),
    Ident(String),

    // Pattern-mode literals
    Class(CharClass),
    Hex(Vec<u8>),
    /// `/i`, `/r`, `/ir`: (insensitive, reverse)
    Modifiers(bool, bool),

    // Keywords
    Let,
    Fn,
    Rule,
    Fragment,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    True,
    False,
    Nil,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eq,

    // Pattern operators
    Pipe,
    Question,
    Dollar,
    At,
    Caret,
    LtLt,
    GtGt,

    // Punctuation
    Dot,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "int literal {}", n),
            TokenKind::Float(x) => write!(f, "float literal {}", x),
            TokenKind::Str(s) => write!(f, "string literal \"{}\"", s),
            TokenKind::Bits(b) => write!(f, "bits literal 0b{}", b),
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::Class(_) => write!(f, "character class"),
            TokenKind::Hex(_) => write!(f, "byte string"),
            TokenKind::Modifiers(..) => write!(f, "modifiers"),
            TokenKind::Let => write!(f, "'let'"),
            TokenKind::Fn => write!(f, "'fn'"),
            TokenKind::Rule => write!(f, "'rule'"),
            TokenKind::Fragment => write!(f, "'fragment'"),
            TokenKind::If => write!(f, "'if'"),
            TokenKind::Else => write!(f, "'else'"),
            TokenKind::While => write!(f, "'while'"),
            TokenKind::For => write!(f, "'for'"),
            TokenKind::In => write!(f, "'in'"),
            TokenKind::Return => write!(f, "'return'"),
            TokenKind::Break => write!(f, "'break'"),
            TokenKind::Continue => write!(f, "'continue'"),
            TokenKind::True => write!(f, "'true'"),
            TokenKind::False => write!(f, "'false'"),
            TokenKind::Nil => write!(f, "'nil'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::AndAnd => write!(f, "'&&'"),
            TokenKind::OrOr => write!(f, "'||'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::Pipe => write!(f, "'|'"),
            TokenKind::Question => write!(f, "'?'"),
            TokenKind::Dollar => write!(f, "'$'"),
            TokenKind::At => write!(f, "'@'"),
            TokenKind::Caret => write!(f, "'^'"),
            TokenKind::LtLt => write!(f, "'<<'"),
            TokenKind::GtGt => write!(f, "'>>'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

/// Where the lexer was before producing a token, so it can back up to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexPosition {
    position: usize,
    line: usize,
    column: usize,
}

/// A token with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub start: LexPosition,
}

/// Lexer error type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Lexer error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

/// On-demand lexer
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input in one mode
    pub fn tokenize(&mut self, mode: LexMode) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(mode)?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Move back to where `token` started
    pub fn reset_to(&mut self, start: LexPosition) {
        self.position = start.position;
        self.line = start.line;
        self.column = start.column;
    }

    /// Produce the next token in `mode`
    pub fn next_token(&mut self, mode: LexMode) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;
        let start = LexPosition {
            position: self.position,
            line: self.line,
            column: self.column,
        };
        let location = self.current_location();
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(_) => self.token_kind(mode)?,
        };
        Ok(Token {
            kind,
            location,
            start,
        })
    }

    fn token_kind(&mut self, mode: LexMode) -> Result<TokenKind, LexError> {
        let loc = self.current_location();
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file".to_string(),
            location: loc,
        })?;

        let kind = match ch {
            '"' | '\'' => TokenKind::Str(self.string_literal(ch, loc)?),
            '0' if mode == LexMode::Pattern && self.peek() == Some('x') => {
                self.advance();
                self.hex_bytes(loc)?
            }
            '0'..='9' => self.number_literal(ch, loc)?,
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),
            '[' if mode == LexMode::Pattern => TokenKind::Class(self.char_class(loc)?),
            '/' if mode == LexMode::Pattern => self.modifiers(loc)?,

            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => self.either('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => self.either('=', TokenKind::NotEq, TokenKind::Bang),
            '<' if mode == LexMode::Pattern => self.either('<', TokenKind::LtLt, TokenKind::Lt),
            '>' if mode == LexMode::Pattern => self.either('>', TokenKind::GtGt, TokenKind::Gt),
            '<' => self.either('=', TokenKind::Le, TokenKind::Lt),
            '>' => self.either('=', TokenKind::Ge, TokenKind::Gt),
            '&' if self.peek() == Some('&') => {
                self.advance();
                TokenKind::AndAnd
            }
            '|' => self.either('|', TokenKind::OrOr, TokenKind::Pipe),
            '?' => TokenKind::Question,
            '$' => TokenKind::Dollar,
            '@' => TokenKind::At,
            '^' => TokenKind::Caret,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => {
                return Err(LexError {
                    message: format!("Unexpected character: '{}'", ch),
                    location: loc,
                })
            }
        };
        Ok(kind)
    }

    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            long
        } else {
            short
        }
    }

    /// Parse string literal
    fn string_literal(&mut self, quote: char, loc: SourceLocation) -> Result<String, LexError> {
        let mut string = String::new();
        while let Some(ch) = self.advance() {
            if ch == quote {
                return Ok(string);
            }
            if ch == '\\' {
                string.push(self.escape(loc)?);
            } else {
                string.push(ch);
            }
        }
        Err(LexError {
            message: "Unterminated string literal".to_string(),
            location: loc,
        })
    }

    fn escape(&mut self, loc: SourceLocation) -> Result<char, LexError> {
        let escaped = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file in escape sequence".to_string(),
            location: loc,
        })?;
        let unescaped = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'x' => {
                let hi = self.hex_digit(loc)?;
                let lo = self.hex_digit(loc)?;
                char::from(hi * 16 + lo)
            }
            '\\' | '"' | '\'' | ']' | '[' | '-' | '^' => escaped,
            _ => {
                return Err(LexError {
                    message: format!("Unknown escape sequence: \\{}", escaped),
                    location: self.current_location(),
                })
            }
        };
        Ok(unescaped)
    }

    fn hex_digit(&mut self, loc: SourceLocation) -> Result<u8, LexError> {
        self.advance()
            .and_then(|c| c.to_digit(16))
            .map(|d| d as u8)
            .ok_or_else(|| LexError {
                message: "Expected hex digit".to_string(),
                location: loc,
            })
    }

    /// `0x89504E47` in a pattern: a byte string
    fn hex_bytes(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut digits = Vec::new();
        while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
            digits.push(d as u8);
            self.advance();
        }
        if digits.is_empty() || digits.len() % 2 != 0 {
            return Err(LexError {
                message: "Byte string needs an even, non-zero number of hex digits".to_string(),
                location: loc,
            });
        }
        Ok(TokenKind::Hex(
            digits.chunks(2).map(|pair| pair[0] * 16 + pair[1]).collect(),
        ))
    }

    /// Parse integer, float, `0x` and `0b` literals
    fn number_literal(&mut self, first: char, loc: SourceLocation) -> Result<TokenKind, LexError> {
        if first == '0' && matches!(self.peek(), Some('x') | Some('b')) {
            let radix_char = self.advance().unwrap_or('x');
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric()) {
                digits.push(c);
                self.advance();
            }
            if radix_char == 'b' {
                return BitList::parse(&digits)
                    .filter(|b| !b.is_empty())
                    .map(TokenKind::Bits)
                    .ok_or_else(|| LexError {
                        message: format!("Invalid bits literal: 0b{}", digits),
                        location: loc,
                    });
            }
            return i64::from_str_radix(&digits, 16)
                .map(TokenKind::Int)
                .map_err(|_| LexError {
                    message: format!("Invalid hex literal: 0x{}", digits),
                    location: loc,
                });
        }

        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.advance();
        }
        let is_float = self.peek() == Some('.')
            && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.advance();
            }
            return text.parse().map(TokenKind::Float).map_err(|_| LexError {
                message: format!("Invalid float literal: {}", text),
                location: loc,
            });
        }
        text.parse().map(TokenKind::Int).map_err(|_| LexError {
            message: format!("Integer literal out of range: {}", text),
            location: loc,
        })
    }

    /// Parse identifier or keyword
    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let mut ident = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            ident.push(c);
            self.advance();
        }
        match ident.as_str() {
            "let" => TokenKind::Let,
            "fn" => TokenKind::Fn,
            "rule" => TokenKind::Rule,
            "fragment" => TokenKind::Fragment,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            _ => TokenKind::Ident(ident),
        }
    }

    /// `[...]` after the opening bracket
    fn char_class(&mut self, loc: SourceLocation) -> Result<CharClass, LexError> {
        let negated = self.peek() == Some('^');
        if negated {
            self.advance();
        }
        let mut items = Vec::new();
        loop {
            let c = match self.advance() {
                None => {
                    return Err(LexError {
                        message: "Unterminated character class".to_string(),
                        location: loc,
                    })
                }
                Some(']') => break,
                Some('\\') => self.escape(loc)?,
                Some(c) => c,
            };
            let is_range = self.peek() == Some('-')
                && self.peek_ahead(1).is_some_and(|next| next != ']');
            if is_range {
                self.advance();
                let hi = match self.advance() {
                    Some('\\') => self.escape(loc)?,
                    Some(hi) => hi,
                    None => c,
                };
                if hi < c {
                    return Err(LexError {
                        message: format!("Invalid class range {}-{}", c, hi),
                        location: loc,
                    });
                }
                items.push(ClassItem::Range(c, hi));
            } else {
                items.push(ClassItem::Char(c));
            }
        }
        Ok(CharClass { negated, items })
    }

    /// `/ir` after the slash
    fn modifiers(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut insensitive = false;
        let mut reverse = false;
        while let Some(c) = self.peek() {
            match c {
                'i' => insensitive = true,
                'r' => reverse = true,
                _ => break,
            }
            self.advance();
        }
        if !insensitive && !reverse {
            return Err(LexError {
                message: "Expected modifiers 'i' and/or 'r' after '/'".to_string(),
                location: loc,
            });
        }
        Ok(TokenKind::Modifiers(insensitive, reverse))
    }

    /// Skip whitespace, `//` and `/* */` comments
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_ahead(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_ahead(1) == Some('*') => {
                    let loc = self.current_location();
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(LexError {
                                    message: "Unterminated block comment".to_string(),
                                    location: loc,
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, mode: LexMode) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize(mode)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn code_mode_tokens() {
        assert_eq!(
            kinds("let x = a[1] / 2.5;", LexMode::Code),
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::Ident("a".into()),
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::RBracket,
                TokenKind::Slash,
                TokenKind::Float(2.5),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn pattern_mode_tokens() {
        let tokens = kinds("\"ab\"/i [a-c]+ 0x8950 << >>", LexMode::Pattern);
        assert_eq!(tokens[0], TokenKind::Str("ab".into()));
        assert_eq!(tokens[1], TokenKind::Modifiers(true, false));
        assert!(matches!(&tokens[2], TokenKind::Class(c) if c.items == vec![ClassItem::Range('a', 'c')]));
        assert_eq!(tokens[3], TokenKind::Plus);
        assert_eq!(tokens[4], TokenKind::Hex(vec![0x89, 0x50]));
        assert_eq!(tokens[5], TokenKind::LtLt);
        assert_eq!(tokens[6], TokenKind::GtGt);
    }

    #[test]
    fn relexing_after_reset() {
        let mut lexer = Lexer::new("[1]");
        let class = lexer.next_token(LexMode::Pattern).unwrap();
        assert!(matches!(class.kind, TokenKind::Class(_)));
        lexer.reset_to(class.start);
        let bracket = lexer.next_token(LexMode::Code).unwrap();
        assert_eq!(bracket.kind, TokenKind::LBracket);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("\"abc").tokenize(LexMode::Code).unwrap_err();
        assert!(err.message.contains("Unterminated"));
    }
}
