//! # Introduction
//!
//! Lexa runs programs in a small language whose rules are backtracking
//! patterns. A rule is matched against text, bytes or a tree captured by an
//! earlier match; every attempt runs inside a heap generation that is thrown
//! away when the attempt fails, so code executed during a failed branch
//! leaves no trace.
//!
//! ## Execution pipeline
//!
//! ```text
//! Source → Lexer → Parser → AST → Engine ⇄ Heap generations → Capture tree
//!                                   ↓
//!                                 Trace → TUI
//! ```
//!
//! 1. [`parser`]: tokenises the source in code or pattern mode and builds an
//!    arena AST.
//! 2. [`interpreter`]: the trampoline that evaluates statements, expressions
//!    and lexemes as resumable state machines, with checkpoints and choice
//!    points.
//! 3. [`memory`]: the transactional heap: generations, copy-on-write cells,
//!    the journaled root stack and garbage collection.
//! 4. [`reader`]: unit and tree cursors that lexemes consume.
//! 5. [`trace`]: lexeme event recording and captured `print` output.
//! 6. [`ui`]: ratatui-based trace viewer; not part of the stable library API.
//!
//! ## Example
//!
//! ```
//! use lexa::interpreter::config::EngineConfig;
//! use lexa::interpreter::engine::Engine;
//!
//! let mut engine = Engine::from_source(r#"rule Greeting = "hello" " " name:[a-z]+;"#, EngineConfig::default())
//!     .expect("valid program");
//! let outcome = engine.match_text("Greeting", "hello world").expect("no fault");
//! assert!(outcome.is_match());
//! ```

pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod reader;
pub mod trace;
pub mod ui;
