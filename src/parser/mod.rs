//! Source parser
//!
//! This module transforms program text into an arena [`Ast`](ast::Ast):
//! - [`lexer`]: Tokenization in code or pattern mode (source text → tokens)
//! - [`parse`]: The [`Parser`](parse::Parser) and its helpers (tokens → AST),
//!   split across `declarations`, `statements`, `expressions` and `patterns`
//! - [`ast`]: AST node definitions
//!
//! # Language
//!
//! The code half is a small dynamically typed language: `let`, functions and
//! lambdas, `if`/`while`/`for`, lists, objects and bit lists.
//!
//! The pattern half appears in `rule` and `fragment` bodies: literal text,
//! character classes, byte strings, groups with a `{prop ...}` header,
//! quantifiers (greedy, lazy `?` and atomic `+`), quantified groups `<< >>`,
//! negation `!`, labels `name:`, filters `@`, executors `%` and
//! additions `^`.
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent parser with one function per precedence
//! level. No external parser generator dependencies.

pub mod ast;
mod declarations;
mod expressions;
pub mod lexer;
pub mod parse;
mod patterns;
mod statements;

use ast::Ast;
use parse::{ParseError, Parser};

/// Parse a whole program
pub fn parse(source: &str) -> Result<Ast, ParseError> {
    Parser::new(source)?.parse_program()
}
