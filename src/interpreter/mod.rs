//! Evaluation engine
//!
//! This module provides the signal-driven evaluator:
//! - [`engine`]: The [`Engine`](engine::Engine), its trampoline and the
//!   checkpoint and choice-point machinery
//! - [`frame`]: Frames, steps and choice points
//! - [`errors`]: Runtime error types
//! - [`config`]: Limits and switches
//!
//! Node functions live in `statements`, `expressions` and `lexemes`; value
//! operators in `ops`; built-in functions in [`builtins`].
//!
//! # Execution Model
//!
//! Nothing recurses on the host stack. Every AST node is evaluated by a node
//! function that receives its frame and a resumption signal, does a bounded
//! amount of work and returns a [`Step`](frame::Step). The trampoline pushes
//! child frames, pops finished ones and, on a failed match, restores the
//! newest choice point: the heap generation, frame stack, registers and
//! reader positions all return to the state recorded when it was taken.

pub mod builtins;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
mod expressions;
pub mod frame;
mod lexemes;
mod ops;
mod statements;
