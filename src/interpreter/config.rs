//! Engine configuration

use crate::interpreter::constants::{DEFAULT_GC_THRESHOLD, DEFAULT_MAX_FRAMES, DEFAULT_TRACE_LIMIT};

/// Limits and switches of an [`Engine`](crate::interpreter::engine::Engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum depth of the frame stack. Exceeding it is a fatal fault
    /// (runaway recursion, left-recursive rules).
    pub max_frames: usize,

    /// Maximum number of trampoline steps per evaluation; `None` is unbounded
    pub max_steps: Option<u64>,

    /// Minimum allocations between two spatial collections; the gap grows
    /// with the amount of live data
    pub gc_threshold: usize,

    /// Record lexeme events for the trace viewer
    pub trace: bool,

    /// Maximum number of recorded trace events
    pub trace_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_frames: DEFAULT_MAX_FRAMES,
            max_steps: None,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            trace: false,
            trace_limit: DEFAULT_TRACE_LIMIT,
        }
    }
}
