//! Tree filters
//!
//! A filter reads the children of a node captured earlier. `@name` matches
//! the next child if it has that name, `@*` any child, and `@name(f)`
//! additionally asks `f(child)` for a verdict. The child is held in
//! `$filtered` while `f` runs.

use crate::interpreter::constants::{ENTRY, FILTERED_REGISTER};
use crate::interpreter::engine::{Engine, Invocation};
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Frame, Step};
use crate::memory::value::Value;
use crate::parser::ast::{NodeId, SourceLocation};
use crate::reader::Reader;
use log::debug;
use std::rc::Rc;

// The filter function expression has been evaluated
const FILTER_FUNCTION: u32 = 1;
// The filter function returned its verdict
const FILTER_VERDICT: u32 = 2;

impl Engine {
    pub(crate) fn lex_filter(
        &mut self,
        frame: &mut Frame,
        name: Option<&Rc<str>>,
        func: Option<NodeId>,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                let Some(child) = self.next_child(frame, name, location)? else {
                    return Ok(Step::Fail);
                };
                let Some(func) = func else {
                    return Ok(Step::Done);
                };
                self.open_checkpoint(frame);
                self.heap.push_named(FILTERED_REGISTER, child);
                Ok(Step::Call {
                    node: func,
                    resume: FILTER_FUNCTION,
                })
            }
            FILTER_FUNCTION => {
                let callee = self.pop_value(location)?;
                let child = self
                    .heap
                    .get_by_name(FILTERED_REGISTER)
                    .ok_or_else(|| RuntimeError::internal("filter lost its node", location))?;
                let label = name.map_or("*", |n| &**n);
                match self.invoke(&callee, label, vec![child], FILTER_VERDICT, location)? {
                    Invocation::Value(verdict) => self.filter_verdict(frame, verdict, location),
                    Invocation::Step(step) => Ok(step),
                }
            }
            FILTER_VERDICT => {
                let verdict = self.pop_value(location)?;
                self.filter_verdict(frame, verdict, location)
            }
            other => Err(RuntimeError::internal(
                format!("filter resumed with signal {}", other),
                location,
            )),
        }
    }

    /// Take the next child from the tree reader if its name fits
    fn next_child(
        &mut self,
        frame: &Frame,
        name: Option<&Rc<str>>,
        location: SourceLocation,
    ) -> Result<Option<Value>, RuntimeError> {
        let reverse = frame.modes.reverse;
        let reader = self.reader(location)?;
        let Reader::Tree { parent, pos, .. } = *reader else {
            debug!("filter at line {} applied to a text reader", location.line);
            return Ok(None);
        };
        if reader.at_end(reverse) {
            return Ok(None);
        }
        let index = if reverse { pos - 1 } else { pos };
        let child = {
            let obj = self.heap.get(parent).at(location)?;
            obj.as_node().at(location)?.children.get(index).copied()
        };
        let Some(child) = child else {
            return Ok(None);
        };
        if let Some(name) = name {
            let obj = self.heap.get(child).at(location)?;
            if obj.as_node().at(location)?.name != *name {
                return Ok(None);
            }
        }
        self.reader_mut(location)?.advance(1, reverse);
        Ok(Some(Value::Handle(child)))
    }

    fn filter_verdict(&mut self, frame: &mut Frame, verdict: Value, location: SourceLocation) -> Result<Step, RuntimeError> {
        self.heap.remove(FILTERED_REGISTER);
        if verdict.is_truthy() {
            self.commit_checkpoint(frame, location)?;
            Ok(Step::Done)
        } else {
            Ok(Step::Fail)
        }
    }
}
