//! Negative lookahead
//!
//! `!p` succeeds without consuming when `p` fails. Whatever `p` did on the
//! way to a successful match is undone by backtracking past the choice point
//! taken on entry.

use crate::interpreter::constants::{ENTRY, FAILED};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::frame::{Frame, Step};
use crate::parser::ast::{NodeId, SourceLocation};

// The inner pattern matched, so the negation fails
const INNER_MATCHED: u32 = 1;

impl Engine {
    pub(crate) fn lex_not(
        &mut self,
        frame: &mut Frame,
        inner: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                self.open_checkpoint(frame);
                self.push_choice(frame);
                Ok(Step::Call {
                    node: inner,
                    resume: INNER_MATCHED,
                })
            }
            FAILED => {
                self.commit_checkpoint(frame, location)?;
                Ok(Step::Done)
            }
            INNER_MATCHED => {
                let checkpoint = self.checkpoint(frame, location)?;
                self.cut_choices(checkpoint.choices);
                Ok(Step::Fail)
            }
            other => Err(RuntimeError::internal(
                format!("negation resumed with signal {}", other),
                location,
            )),
        }
    }
}
