//! Memory model for the interpreter
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation (primitives and handles)
//! - [`heap`]: The transactional heap with generations and copy-on-write
//! - [`journal`]: Undo logs shared by the heap's root stack and the frame stack
//! - [`stack`]: The root stack of values and named registers
//! - [`gc`]: Deferred reference counting and the spatial mark-sweep pass
//!
//! # Generations
//!
//! Every checkpoint of the pattern engine forks a generation. Forking copies
//! nothing; it records where the cell table, the handle table and the journal
//! end. Rolling back truncates to those marks and replays the journal:
//! ```text
//! fork()        gen 0 ── gen 1 ── gen 2
//! discard_to(0) gen 0                     (cells, handles, stack as at fork)
//! squash_to(0)  gen 0 (with 1 and 2 folded in)
//! ```

pub mod gc;
pub mod heap;
pub mod journal;
pub mod stack;
pub mod value;
