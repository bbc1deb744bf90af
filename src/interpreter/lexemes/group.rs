//! Ordered alternation with an optional header
//!
//! Alternatives are tried in order. Every alternative but the last gets a
//! choice point, so a failure after the group has matched re-enters it with
//! the next alternative (unless the header turns backtracking off).

use crate::interpreter::constants::{ENTRY, FAILED};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Frame, Step};
use crate::memory::heap::{HeapObject, PatternUnion};
use crate::memory::value::{Handle, Value};
use crate::parser::ast::{GroupHeader, NodeId, SourceLocation};
use log::trace;
use std::rc::Rc;

// An alternative matched
const ALTERNATIVE_DONE: u32 = 1;
// Property `i` has been evaluated when resumed with PROPERTY_BASE + i
const PROPERTY_BASE: u32 = 2;

impl Engine {
    pub(crate) fn lex_group(
        &mut self,
        frame: &mut Frame,
        header: &GroupHeader,
        alternatives: &[NodeId],
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                frame.modes = frame.modes.with(&header.modifiers);
                self.open_checkpoint(frame);
                if header.captures() {
                    let name = header.name.clone().unwrap_or_else(|| Rc::from("group"));
                    let node = self.open_node(name, location)?;
                    self.record_flags(node, frame, header, location)?;
                }
                let union = self.heap.allocate(HeapObject::PatternUnion(PatternUnion {
                    last_cursor: self.cursor_pos(location)?,
                    ..PatternUnion::default()
                }));
                self.set_state(frame, Value::Handle(union));
                self.try_alternative(frame, header, alternatives, 0, location)
            }
            FAILED => {
                let next = self.union_state(frame, location)?.alternative + 1;
                self.try_alternative(frame, header, alternatives, next, location)
            }
            ALTERNATIVE_DONE => {
                if !header.backtrack {
                    let checkpoint = self.checkpoint(frame, location)?;
                    self.cut_choices(checkpoint.choices);
                }
                self.next_property(frame, header, 0, location)
            }
            property => {
                let index = (property - PROPERTY_BASE) as usize;
                let value = self.pop_value(location)?;
                let (key, _) = header
                    .props
                    .get(index)
                    .ok_or_else(|| RuntimeError::internal("group resumed past its properties", location))?;
                if let Some(node) = self.active_node() {
                    self.heap.node_set_prop(node, key.clone(), value).at(location)?;
                }
                self.next_property(frame, header, index + 1, location)
            }
        }
    }

    /// Store the header flags in effect on the group's node
    fn record_flags(
        &mut self,
        node: Handle,
        frame: &Frame,
        header: &GroupHeader,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        let flags = [
            ("capture", true),
            ("consume", header.consume),
            ("backtrack", header.backtrack),
            ("insensitive", frame.modes.insensitive),
            ("reverse", frame.modes.reverse),
        ];
        for (key, flag) in flags {
            self.heap.node_set_prop(node, Rc::from(key), Value::Bool(flag)).at(location)?;
        }
        Ok(())
    }

    fn try_alternative(
        &mut self,
        frame: &mut Frame,
        header: &GroupHeader,
        alternatives: &[NodeId],
        index: usize,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if alternatives.is_empty() {
            return self.next_property(frame, header, 0, location);
        }
        let Some(&alternative) = alternatives.get(index) else {
            return Ok(Step::Fail);
        };
        trace!("group #{} trying alternative {}", frame.node, index);
        self.update_union(frame, location, |union| union.alternative = index)?;
        if index + 1 < alternatives.len() {
            self.push_choice(frame);
        }
        Ok(Step::Call {
            node: alternative,
            resume: ALTERNATIVE_DONE,
        })
    }

    /// Evaluate header properties in order, then finish the group
    fn next_property(
        &mut self,
        frame: &mut Frame,
        header: &GroupHeader,
        index: usize,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if let Some((_, expr)) = header.props.get(index) {
            return Ok(Step::Call {
                node: *expr,
                resume: PROPERTY_BASE + index as u32,
            });
        }

        let checkpoint = self.checkpoint(frame, location)?;
        if header.captures() {
            self.close_capture(frame, location)?;
        } else {
            self.commit_checkpoint(frame, location)?;
        }
        if !header.consume {
            self.reader_mut(location)?.set_pos(checkpoint.cursor.pos);
        }
        Ok(Step::Done)
    }
}
