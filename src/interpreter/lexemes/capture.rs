//! Captures, rule references and additions
//!
//! A capturing lexeme opens a node at the cursor and makes it the active
//! `$node`; nodes closed inside it become its children. When it completes,
//! the node is extended to the cursor and attached to the enclosing node.

use crate::interpreter::constants::{ADDED_REGISTER, ENTRY};
use crate::interpreter::engine::{Engine, Invocation};
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Boundary, Frame, Step};
use crate::memory::heap::{CaptureNode, FunctionKind, HeapObject};
use crate::memory::value::{Handle, Value};
use crate::parser::ast::{NodeId, SourceLocation};
use std::rc::Rc;

// Inner pattern (or rule body) matched
const INNER_DONE: u32 = 1;
// Addition: the callback expression has been evaluated
const ADDITION_FUNCTION: u32 = 1;
// Addition: the callback returned
const ADDITION_DONE: u32 = 2;

impl Engine {
    /// `name:p`
    pub(crate) fn lex_capture(
        &mut self,
        frame: &mut Frame,
        name: &Rc<str>,
        inner: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if signal == ENTRY {
            self.open_checkpoint(frame);
            self.open_node(name.clone(), location)?;
            return Ok(Step::Call {
                node: inner,
                resume: INNER_DONE,
            });
        }
        self.close_capture(frame, location)?;
        Ok(Step::Done)
    }

    /// Close the active node, attach it to its parent and commit
    pub(crate) fn close_capture(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<Handle, RuntimeError> {
        let node = self.close_node(location)?;
        if let Some(parent) = self.active_node() {
            self.heap.node_attach(parent, node).at(location)?;
        }
        self.commit_checkpoint(frame, location)?;
        Ok(node)
    }

    /// A named rule. Rules capture a node of their own name; fragments
    /// match in place.
    pub(crate) fn lex_rule_ref(
        &mut self,
        frame: &mut Frame,
        name: &Rc<str>,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if signal != ENTRY {
            if frame.checkpoint.is_some() {
                self.close_capture(frame, location)?;
            }
            return Ok(Step::Done);
        }

        let rule = self.rule_of(frame.scope, name, location)?;
        let FunctionKind::Rule { body, capture } = rule.kind else {
            return Err(RuntimeError::NotARule {
                name: name.to_string(),
                location,
            });
        };
        if capture {
            self.open_checkpoint(frame);
            self.open_node(rule.name.clone(), location)?;
        }
        Ok(Step::Enter {
            node: body,
            scope: rule.scope.unwrap_or(self.globals),
            resume: INNER_DONE,
            boundary: Boundary::Rule,
        })
    }

    /// `^name` or `^name(f)`: a zero-width node synthesized at the cursor.
    /// The optional callback receives the new node.
    pub(crate) fn lex_addition(
        &mut self,
        name: &Rc<str>,
        func: Option<NodeId>,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                let reader = self.reader(location)?;
                let node = CaptureNode::new(name.clone(), reader.pos(), reader.input());
                let handle = self.heap.allocate(HeapObject::Node(node));
                let parent = self
                    .active_node()
                    .ok_or_else(|| RuntimeError::internal("addition outside of a capture", location))?;
                self.heap.node_attach(parent, handle).at(location)?;
                match func {
                    Some(func) => {
                        self.heap.push_named(ADDED_REGISTER, Value::Handle(handle));
                        Ok(Step::Call {
                            node: func,
                            resume: ADDITION_FUNCTION,
                        })
                    }
                    None => Ok(Step::Done),
                }
            }
            ADDITION_FUNCTION => {
                let callee = self.pop_value(location)?;
                let added = self
                    .heap
                    .get_by_name(ADDED_REGISTER)
                    .ok_or_else(|| RuntimeError::internal("addition lost its node", location))?;
                match self.invoke(&callee, name, vec![added], ADDITION_DONE, location)? {
                    Invocation::Value(_) => {
                        self.heap.remove(ADDED_REGISTER);
                        Ok(Step::Done)
                    }
                    Invocation::Step(step) => Ok(step),
                }
            }
            ADDITION_DONE => {
                self.pop_value(location)?;
                self.heap.remove(ADDED_REGISTER);
                Ok(Step::Done)
            }
            other => Err(RuntimeError::internal(
                format!("addition resumed with signal {}", other),
                location,
            )),
        }
    }
}
