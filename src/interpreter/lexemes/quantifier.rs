//! Repetition of a single lexeme
//!
//! Greedy repetition records a choice point before each optional iteration
//! and stops when a later failure returns to it. Lazy repetition records the
//! choice point and stops first, iterating once more only when resumed.
//! Atomic repetition drops the choice points of every finished iteration.

use crate::interpreter::constants::{ENTRY, FAILED};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::frame::{Frame, Step};
use crate::memory::heap::{HeapObject, QuantifierState};
use crate::memory::value::Value;
use crate::parser::ast::{NodeId, Quantifier, SourceLocation};

// One iteration matched
const ITERATION_DONE: u32 = 1;

impl Engine {
    pub(crate) fn lex_quantified(
        &mut self,
        frame: &mut Frame,
        inner: NodeId,
        quantifier: Quantifier,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                self.open_checkpoint(frame);
                let state = self.heap.allocate(HeapObject::Quantifier(QuantifierState {
                    quantifier,
                    count: 0,
                    last_cursor: self.cursor_pos(location)?,
                }));
                self.set_state(frame, Value::Handle(state));
                self.next_iteration(frame, inner, location)
            }
            ITERATION_DONE => {
                let pos = self.cursor_pos(location)?;
                let state = self.quantifier_state(frame, location)?;
                let count = state.count + 1;
                self.update_quantifier(frame, location, |state| state.count = count)?;
                if quantifier.atomic {
                    let checkpoint = self.checkpoint(frame, location)?;
                    self.cut_choices(checkpoint.choices);
                }
                // An empty iteration would repeat forever
                if pos == state.last_cursor && quantifier.satisfied(count) {
                    return self.finish_quantified(frame, location);
                }
                self.next_iteration(frame, inner, location)
            }
            FAILED if quantifier.lazy => self.begin_iteration(frame, inner, location),
            FAILED => self.finish_quantified(frame, location),
            other => Err(RuntimeError::internal(
                format!("quantifier resumed with signal {}", other),
                location,
            )),
        }
    }

    fn next_iteration(&mut self, frame: &mut Frame, inner: NodeId, location: SourceLocation) -> Result<Step, RuntimeError> {
        let state = self.quantifier_state(frame, location)?;
        let quantifier = state.quantifier;
        if !quantifier.satisfied(state.count) {
            return self.begin_iteration(frame, inner, location);
        }
        if !quantifier.allows_more(state.count) {
            return self.finish_quantified(frame, location);
        }
        self.push_choice(frame);
        if quantifier.lazy {
            self.finish_quantified(frame, location)
        } else {
            self.begin_iteration(frame, inner, location)
        }
    }

    fn begin_iteration(&mut self, frame: &mut Frame, inner: NodeId, location: SourceLocation) -> Result<Step, RuntimeError> {
        let pos = self.cursor_pos(location)?;
        self.update_quantifier(frame, location, |state| state.last_cursor = pos)?;
        Ok(Step::Call {
            node: inner,
            resume: ITERATION_DONE,
        })
    }

    fn finish_quantified(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<Step, RuntimeError> {
        self.commit_checkpoint(frame, location)?;
        Ok(Step::Done)
    }
}
