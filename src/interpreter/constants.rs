// Constants for the evaluation engine

/// Resumption signal of a frame's first entry
pub const ENTRY: u32 = 0;

/// Delivered to the owner of a restored choice point: what it tried failed
pub const FAILED: u32 = u32::MAX;

/// Delivered to a function body frame when `return` unwinds to it
pub const RETURN: u32 = u32::MAX - 1;

/// Delivered to the nearest loop frame on `break`
pub const BREAK: u32 = u32::MAX - 2;

/// Delivered to the nearest loop frame on `continue`
pub const CONTINUE: u32 = u32::MAX - 3;

/// Active capture node
pub const NODE_REGISTER: &str = "$node";

/// Node handed to a filter function
pub const FILTERED_REGISTER: &str = "$filtered";

/// Node synthesized by an addition
pub const ADDED_REGISTER: &str = "$added";

/// Pinned result of the last top-level evaluation
pub const RESULT_REGISTER: &str = "$result";

/// Default bound on the frame stack
pub const DEFAULT_MAX_FRAMES: usize = 10_000;

/// Default allocation count between spatial collections
pub const DEFAULT_GC_THRESHOLD: usize = 4096;

/// Default number of recorded trace events
pub const DEFAULT_TRACE_LIMIT: usize = 100_000;

/// Nesting depth at which value formatting and deep equality stop descending
pub const MAX_VALUE_DEPTH: usize = 64;
