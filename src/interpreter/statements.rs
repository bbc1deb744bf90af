//! Statement node functions
//!
//! Each function is one step of a statement's state machine. The signal
//! numbers are local to the node: `ENTRY` on first entry, then whatever the
//! node asked to be resumed with.

use crate::interpreter::constants::{BREAK, CONTINUE, ENTRY, RETURN};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Boundary, Frame, Step};
use crate::memory::heap::{Function, FunctionKind, HeapObject};
use crate::memory::value::Value;
use crate::parser::ast::{NodeId, SourceLocation};
use std::rc::Rc;

// For loop: the iterable has been evaluated
const FOR_ITERABLE: u32 = 1;
// For loop: one body run finished
const FOR_NEXT: u32 = 2;

impl Engine {
    /// Program and block: run statements in order
    pub(crate) fn exec_block(&mut self, frame: &mut Frame, body: &[NodeId], signal: u32) -> Result<Step, RuntimeError> {
        if signal == RETURN {
            return Ok(Step::Done);
        }
        match body.get(signal as usize) {
            Some(&statement) => Ok(Step::Call {
                node: statement,
                resume: signal + 1,
            }),
            None => {
                // Falling off the end of a function body returns nil
                if frame.boundary == Boundary::Call {
                    self.heap.push(Value::Nil);
                }
                Ok(Step::Done)
            }
        }
    }

    pub(crate) fn exec_let(
        &mut self,
        frame: &mut Frame,
        name: &Rc<str>,
        init: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if signal == ENTRY {
            return Ok(Step::Call { node: init, resume: 1 });
        }
        let value = self.pop_value(location)?;
        self.heap.scope_define(frame.scope, name.clone(), value).at(location)?;
        Ok(Step::Done)
    }

    pub(crate) fn exec_fn_decl(
        &mut self,
        frame: &mut Frame,
        name: &Rc<str>,
        params: &Rc<[Rc<str>]>,
        body: NodeId,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let function = Function {
            name: name.clone(),
            params: params.clone(),
            scope: Some(frame.scope),
            kind: FunctionKind::User { body },
        };
        let handle = self.heap.allocate(HeapObject::Function(function));
        self.heap
            .scope_define(frame.scope, name.clone(), Value::Handle(handle))
            .at(location)?;
        Ok(Step::Done)
    }

    /// `rule` and `fragment` declarations bind a rule function
    pub(crate) fn exec_rule_decl(
        &mut self,
        frame: &mut Frame,
        name: &Rc<str>,
        pattern: NodeId,
        capture: bool,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let function = Function {
            name: name.clone(),
            params: Rc::from([]),
            scope: Some(frame.scope),
            kind: FunctionKind::Rule { body: pattern, capture },
        };
        let handle = self.heap.allocate(HeapObject::Function(function));
        self.heap
            .scope_define(frame.scope, name.clone(), Value::Handle(handle))
            .at(location)?;
        Ok(Step::Done)
    }

    pub(crate) fn exec_if(
        &mut self,
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => Ok(Step::Call {
                node: condition,
                resume: 1,
            }),
            1 => {
                let taken = if self.pop_value(location)?.is_truthy() {
                    Some(then_branch)
                } else {
                    else_branch
                };
                Ok(match taken {
                    Some(branch) => Step::Call { node: branch, resume: 2 },
                    None => Step::Done,
                })
            }
            _ => Ok(Step::Done),
        }
    }

    pub(crate) fn exec_while(
        &mut self,
        condition: NodeId,
        body: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            BREAK => Ok(Step::Done),
            1 => {
                if self.pop_value(location)?.is_truthy() {
                    Ok(Step::Call { node: body, resume: ENTRY })
                } else {
                    Ok(Step::Done)
                }
            }
            // ENTRY, CONTINUE and the end of a body run
            _ => Ok(Step::Call {
                node: condition,
                resume: 1,
            }),
        }
    }

    /// `for x in items`. The loop iterates a snapshot of the items taken
    /// when the loop starts; the state is `args(snapshot, next index)`.
    pub(crate) fn exec_for(
        &mut self,
        frame: &mut Frame,
        var: &Rc<str>,
        iterable: NodeId,
        body: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => return Ok(Step::Call { node: iterable, resume: FOR_ITERABLE }),
            BREAK => return Ok(Step::Done),
            FOR_ITERABLE => {
                let iterable = self.pop_value(location)?;
                let items = self.iteration_items(&iterable, location)?;
                let list = self.heap.allocate(HeapObject::List(items));
                let state = self
                    .heap
                    .allocate(HeapObject::Arguments(vec![Value::Handle(list), Value::Int(0)]));
                self.set_state(frame, Value::Handle(state));
            }
            FOR_NEXT | CONTINUE => {}
            other => {
                return Err(RuntimeError::internal(format!("for loop resumed with signal {}", other), location));
            }
        }

        let state = self.state_handle(frame, location)?;
        let (list, index) = {
            let obj = self.heap.get(state).at(location)?;
            let slots = obj.as_arguments().at(location)?;
            (slots[0].clone(), slots[1].as_int().unwrap_or(0))
        };
        let item = match list.as_handle() {
            Some(h) => self.heap.get(h).at(location)?.as_list().at(location)?.get(index as usize).cloned(),
            None => None,
        };
        let Some(item) = item else {
            return Ok(Step::Done);
        };
        self.heap.get_mut(state).at(location)?.as_arguments_mut().at(location)?[1] = Value::Int(index + 1);
        self.heap.scope_define(frame.scope, var.clone(), item).at(location)?;
        Ok(Step::Call {
            node: body,
            resume: FOR_NEXT,
        })
    }

    /// Values a `for` loop visits
    fn iteration_items(&mut self, value: &Value, location: SourceLocation) -> Result<Vec<Value>, RuntimeError> {
        let items = match value {
            Value::Int(n) => (0..*n).map(Value::Int).collect(),
            Value::Str(s) => s.chars().map(|c| Value::str(&c.to_string())).collect(),
            Value::Bits(bits) => (0..bits.len()).filter_map(|i| bits.get(i)).map(Value::Bool).collect(),
            Value::Handle(h) => match &*self.heap.get(*h).at(location)? {
                HeapObject::List(items) | HeapObject::Arguments(items) => items.clone(),
                HeapObject::Map(entries) => entries.keys().map(Value::from).collect(),
                HeapObject::Set(keys) => keys.iter().map(Value::from).collect(),
                HeapObject::Node(node) => node.children.iter().map(|c| Value::Handle(*c)).collect(),
                _ => return Err(RuntimeError::type_error("iterable", value.type_name(), location)),
            },
            other => return Err(RuntimeError::type_error("iterable", other.type_name(), location)),
        };
        Ok(items)
    }

    pub(crate) fn exec_return(&mut self, value: Option<NodeId>, signal: u32) -> Result<Step, RuntimeError> {
        match (signal, value) {
            (ENTRY, Some(value)) => Ok(Step::Call { node: value, resume: 1 }),
            (ENTRY, None) => {
                self.heap.push(Value::Nil);
                Ok(Step::Return)
            }
            _ => Ok(Step::Return),
        }
    }

    pub(crate) fn exec_expr_stmt(
        &mut self,
        frame: &mut Frame,
        expr: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if signal == ENTRY {
            return Ok(Step::Call { node: expr, resume: 1 });
        }
        let value = self.pop_value(location)?;
        if frame.scope == self.globals && self.readers.depth() == 0 {
            self.pin_result(value);
        }
        Ok(Step::Done)
    }
}
