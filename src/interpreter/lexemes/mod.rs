//! Lexeme node functions
//!
//! A lexeme runs against the reader on top of the reader stack. Composite
//! lexemes follow one state machine:
//! - **Start**: take a checkpoint (record the cursor, fork a generation)
//! - **Matching**: call children, recording choice points for the
//!   alternatives they have not tried
//! - **Committed**: squash the checkpoint generation into its parent when no
//!   live choice point still depends on it
//! - **Failed**: return [`Step::Fail`]; the trampoline restores the newest
//!   choice point, which discards the checkpoint with everything else
//!
//! Leaves (text, class, bytes, any, end) change nothing but the cursor and
//! take no checkpoint.

mod capture;
mod executor;
mod filter;
mod group;
mod negation;
mod quantified_group;
mod quantifier;
mod text;

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Frame, Step};
use crate::memory::heap::{PatternUnion, QuantifierState};
use crate::parser::ast::{NodeId, SourceLocation};

impl Engine {
    /// Items in order; the signal is the index of the next item
    pub(crate) fn lex_sequence(&mut self, items: &[NodeId], signal: u32) -> Step {
        match items.get(signal as usize) {
            Some(&item) => Step::Call {
                node: item,
                resume: signal + 1,
            },
            None => Step::Done,
        }
    }

    pub(crate) fn union_state(&self, frame: &Frame, location: SourceLocation) -> Result<PatternUnion, RuntimeError> {
        let handle = self.state_handle(frame, location)?;
        let union = self.heap.get(handle).at(location)?.as_union().at(location)?.clone();
        Ok(union)
    }

    pub(crate) fn update_union(
        &mut self,
        frame: &Frame,
        location: SourceLocation,
        update: impl FnOnce(&mut PatternUnion),
    ) -> Result<(), RuntimeError> {
        let handle = self.state_handle(frame, location)?;
        let mut obj = self.heap.get_mut(handle).at(location)?;
        update(obj.as_union_mut().at(location)?);
        Ok(())
    }

    pub(crate) fn quantifier_state(&self, frame: &Frame, location: SourceLocation) -> Result<QuantifierState, RuntimeError> {
        let handle = self.state_handle(frame, location)?;
        let state = *self.heap.get(handle).at(location)?.as_quantifier().at(location)?;
        Ok(state)
    }

    pub(crate) fn update_quantifier(
        &mut self,
        frame: &Frame,
        location: SourceLocation,
        update: impl FnOnce(&mut QuantifierState),
    ) -> Result<(), RuntimeError> {
        let handle = self.state_handle(frame, location)?;
        let mut obj = self.heap.get_mut(handle).at(location)?;
        update(obj.as_quantifier_mut().at(location)?);
        Ok(())
    }

    /// Current reader position
    pub(crate) fn cursor_pos(&self, location: SourceLocation) -> Result<usize, RuntimeError> {
        Ok(self.reader(location)?.pos())
    }
}
