//! Frames, steps and choice points
//!
//! The engine never recurses on the host stack. A node function receives its
//! [`Frame`] and the resumption signal, does a bounded amount of work and
//! returns a [`Step`] telling the trampoline what to do next.

use crate::memory::heap::GenerationId;
use crate::memory::value::{Handle, Value};
use crate::parser::ast::{Modifiers, NodeId};
use crate::reader::Cursor;

/// Matching modes inherited from enclosing lexemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub insensitive: bool,
    pub reverse: bool,
}

impl Modes {
    /// Overlay explicit modifiers on the inherited modes
    pub fn with(self, modifiers: &Modifiers) -> Modes {
        Modes {
            insensitive: modifiers.insensitive.unwrap_or(self.insensitive),
            reverse: modifiers.reverse.unwrap_or(self.reverse),
        }
    }
}

/// What a frame stands for when control is transferred structurally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    #[default]
    None,
    /// The whole program
    Program,
    /// A function body; `return` stops here
    Call,
    /// An executor block
    Executor,
    /// A rule body
    Rule,
}

/// Start of a lexeme evaluation: the generation to fold into or discard to,
/// and what to cut back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Generation that was current before the checkpoint forked
    pub generation: GenerationId,
    /// Number of choice points when the checkpoint was taken
    pub choices: usize,
    pub cursor: Cursor,
}

/// One activation on the frame stack
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub node: NodeId,
    /// Signal the frame is invoked with on its next step
    pub signal: u32,
    pub scope: Handle,
    /// Node-specific heap state (a quantifier, a pattern union, loop state)
    pub state: Value,
    pub modes: Modes,
    pub checkpoint: Option<Checkpoint>,
    /// Value stack length at entry
    pub base: usize,
    pub boundary: Boundary,
}

impl Frame {
    pub fn new(node: NodeId, scope: Handle, modes: Modes, base: usize, boundary: Boundary) -> Self {
        Frame {
            node,
            signal: 0,
            scope,
            state: Value::Nil,
            modes,
            checkpoint: None,
            base,
            boundary,
        }
    }
}

/// Outcome of one node function invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Evaluate `node` in a child frame, then re-enter with `resume`
    Call { node: NodeId, resume: u32 },
    /// As `Call`, with an explicit scope and boundary
    Enter {
        node: NodeId,
        scope: Handle,
        resume: u32,
        boundary: Boundary,
    },
    /// Completed; expressions leave their value on the stack
    Done,
    /// Match failure
    Fail,
    Return,
    Break,
    Continue,
}

/// A recorded alternative: restoring it discards every generation, frame,
/// register and reader position created after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoicePoint {
    pub generation: GenerationId,
    pub frame_depth: usize,
    pub cursor: Cursor,
    /// Signal delivered to the owner frame; `None` marks the barrier of a
    /// top-level match, which ends the run as "no match"
    pub resume: Option<u32>,
}

/// Whether evaluation proceeds normally or is backtracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Advancing,
    Unwinding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_override_inherited_modes() {
        let inherited = Modes {
            insensitive: true,
            reverse: false,
        };
        let modes = inherited.with(&Modifiers {
            insensitive: None,
            reverse: Some(true),
        });
        assert_eq!(
            modes,
            Modes {
                insensitive: true,
                reverse: true
            }
        );
    }
}
