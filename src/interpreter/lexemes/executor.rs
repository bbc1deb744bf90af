//! Executors: code blocks run during a match
//!
//! Effects of an executor are made inside the enclosing lexeme's
//! generation, so backtracking past the executor undoes them.

use crate::interpreter::constants::ENTRY;
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::frame::{Boundary, Frame, Step};
use crate::parser::ast::NodeId;

const GUARD_DONE: u32 = 1;
const BODY_DONE: u32 = 2;

impl Engine {
    /// `%{ body }` or `%(guard) { body }`. A falsy guard skips the body;
    /// the executor still matches.
    pub(crate) fn lex_executor(
        &mut self,
        frame: &mut Frame,
        guard: Option<NodeId>,
        body: NodeId,
        signal: u32,
    ) -> Result<Step, RuntimeError> {
        let location = self.ast().location(frame.node);
        match (signal, guard) {
            (ENTRY, Some(guard)) => Ok(Step::Call {
                node: guard,
                resume: GUARD_DONE,
            }),
            (ENTRY, None) => Ok(enter_body(frame, body)),
            (GUARD_DONE, _) => {
                if self.pop_value(location)?.is_truthy() {
                    Ok(enter_body(frame, body))
                } else {
                    Ok(Step::Done)
                }
            }
            _ => Ok(Step::Done),
        }
    }
}

fn enter_body(frame: &Frame, body: NodeId) -> Step {
    Step::Enter {
        node: body,
        scope: frame.scope,
        resume: BODY_DONE,
        boundary: Boundary::Executor,
    }
}
