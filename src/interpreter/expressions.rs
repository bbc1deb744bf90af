//! Expression node functions
//!
//! Every expression leaves exactly one value on the root stack when it
//! completes. Operands are evaluated by child frames, left to right.

use crate::interpreter::builtins::{map_key, Builtin};
use crate::interpreter::constants::{ENTRY, FAILED};
use crate::interpreter::engine::{Engine, Invocation};
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Boundary, Checkpoint, Frame, Step};
use crate::memory::heap::{Function, FunctionKind, HeapObject};
use crate::memory::value::{HandleKind, Value};
use crate::parser::ast::{BinOp, Literal, NodeId, NodeKind, SourceLocation, UnOp};
use crate::reader::{Input, Reader};
use rustc_hash::FxHashMap;
use std::rc::Rc;

// Call: the receiver of a method call has been evaluated
const CALL_METHOD: u32 = 1;
// Call: first signal of argument evaluation
const CALL_ARGS: u32 = 2;

/// Node members that are not properties
const NODE_MEMBERS: &[&str] = &["name", "text", "from", "to", "parent", "children"];

impl Engine {
    pub(crate) fn eval_literal(&mut self, literal: &Literal) -> Result<Step, RuntimeError> {
        let value = match literal {
            Literal::Nil => Value::Nil,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bits(b) => Value::Bits(b.clone()),
        };
        self.heap.push(value);
        Ok(Step::Done)
    }

    pub(crate) fn eval_ident(&mut self, frame: &Frame, name: &str, location: SourceLocation) -> Result<Step, RuntimeError> {
        let value = self.lookup(frame.scope, name, location)?;
        self.heap.push(value);
        Ok(Step::Done)
    }

    pub(crate) fn eval_list(&mut self, items: &[NodeId], signal: u32, location: SourceLocation) -> Result<Step, RuntimeError> {
        if let Some(&item) = items.get(signal as usize) {
            return Ok(Step::Call {
                node: item,
                resume: signal + 1,
            });
        }
        let values = self.pop_values(items.len(), location)?;
        let list = self.heap.allocate(HeapObject::List(values));
        self.heap.push(Value::Handle(list));
        Ok(Step::Done)
    }

    pub(crate) fn eval_object(
        &mut self,
        fields: &[(Rc<str>, NodeId)],
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if let Some((_, value)) = fields.get(signal as usize) {
            return Ok(Step::Call {
                node: *value,
                resume: signal + 1,
            });
        }
        let values = self.pop_values(fields.len(), location)?;
        let object: FxHashMap<Rc<str>, Value> = fields
            .iter()
            .map(|(name, _)| name.clone())
            .zip(values)
            .collect();
        let handle = self.heap.allocate(HeapObject::Object(object));
        self.heap.push(Value::Handle(handle));
        Ok(Step::Done)
    }

    pub(crate) fn eval_lambda(&mut self, frame: &Frame, params: &Rc<[Rc<str>]>, body: NodeId) -> Result<Step, RuntimeError> {
        let function = self.heap.allocate(HeapObject::Function(Function {
            name: Rc::from("<lambda>"),
            params: params.clone(),
            scope: Some(frame.scope),
            kind: FunctionKind::User { body },
        }));
        self.heap.push(Value::Handle(function));
        Ok(Step::Done)
    }

    pub(crate) fn eval_unary(&mut self, op: UnOp, operand: NodeId, signal: u32, location: SourceLocation) -> Result<Step, RuntimeError> {
        if signal == ENTRY {
            return Ok(Step::Call { node: operand, resume: 1 });
        }
        let value = self.pop_value(location)?;
        let result = self.unary_op(op, value, location)?;
        self.heap.push(result);
        Ok(Step::Done)
    }

    pub(crate) fn eval_binary(
        &mut self,
        op: BinOp,
        left: NodeId,
        right: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => Ok(Step::Call { node: left, resume: 1 }),
            1 if matches!(op, BinOp::And | BinOp::Or) => {
                let truthy = self.pop_value(location)?.is_truthy();
                if truthy == (op == BinOp::Or) {
                    self.heap.push(Value::Bool(truthy));
                    Ok(Step::Done)
                } else {
                    Ok(Step::Call { node: right, resume: 2 })
                }
            }
            1 => Ok(Step::Call { node: right, resume: 2 }),
            _ if matches!(op, BinOp::And | BinOp::Or) => {
                let truthy = self.pop_value(location)?.is_truthy();
                self.heap.push(Value::Bool(truthy));
                Ok(Step::Done)
            }
            _ => {
                let rhs = self.pop_value(location)?;
                let lhs = self.pop_value(location)?;
                let result = self.binary_op(op, lhs, rhs, location)?;
                self.heap.push(result);
                Ok(Step::Done)
            }
        }
    }

    pub(crate) fn eval_assign(
        &mut self,
        frame: &Frame,
        target: NodeId,
        value: NodeId,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let ast = Rc::clone(&self.ast);
        match ast.kind(target) {
            Some(NodeKind::Ident(name)) => {
                if signal == ENTRY {
                    return Ok(Step::Call { node: value, resume: 1 });
                }
                let v = self.pop_value(location)?;
                if !self.heap.scope_assign(frame.scope, name, v.clone()).at(location)? {
                    return Err(RuntimeError::UndefinedVariable {
                        name: name.to_string(),
                        location,
                    });
                }
                self.heap.push(v);
                Ok(Step::Done)
            }
            Some(NodeKind::Index { object, index }) => match signal {
                ENTRY => Ok(Step::Call { node: *object, resume: 1 }),
                1 => Ok(Step::Call { node: *index, resume: 2 }),
                2 => Ok(Step::Call { node: value, resume: 3 }),
                _ => {
                    let v = self.pop_value(location)?;
                    let key = self.pop_value(location)?;
                    let container = self.pop_value(location)?;
                    self.assign_index(&container, &key, v.clone(), location)?;
                    self.heap.push(v);
                    Ok(Step::Done)
                }
            },
            Some(NodeKind::Member { object, name }) => match signal {
                ENTRY => Ok(Step::Call { node: *object, resume: 1 }),
                1 => Ok(Step::Call { node: value, resume: 2 }),
                _ => {
                    let v = self.pop_value(location)?;
                    let container = self.pop_value(location)?;
                    self.assign_member(&container, name, v.clone(), location)?;
                    self.heap.push(v);
                    Ok(Step::Done)
                }
            },
            other => Err(RuntimeError::type_error(
                "assignable target",
                other.map_or("nothing", NodeKind::tag).to_string(),
                location,
            )),
        }
    }

    fn assign_index(&mut self, container: &Value, key: &Value, value: Value, location: SourceLocation) -> Result<(), RuntimeError> {
        let kind = container
            .as_handle()
            .map(|h| h.kind())
            .ok_or_else(|| RuntimeError::type_error("list, map or object", container.type_name(), location))?;
        let handle = self.mutable(container, kind, location)?;
        match kind {
            HandleKind::List => {
                let index = key
                    .as_int()
                    .ok_or_else(|| RuntimeError::type_error("int", key.type_name(), location))?;
                let stored = match usize::try_from(index) {
                    Ok(i) => self.heap.list_set(handle, i, value).at(location)?,
                    Err(_) => false,
                };
                if !stored {
                    let len = self.heap.get(handle).at(location)?.as_list().at(location)?.len();
                    return Err(RuntimeError::IndexOutOfBounds { index, len, location });
                }
                Ok(())
            }
            HandleKind::Map => {
                let key = map_key(key, location)?;
                self.heap.map_insert(handle, key, value).at(location)
            }
            HandleKind::Object => {
                let key = key
                    .expect_str()
                    .map_err(|_| RuntimeError::type_error("string", key.type_name(), location))?;
                self.heap.object_set(handle, key, value).at(location)
            }
            _ => Err(RuntimeError::type_error("list, map or object", container.type_name(), location)),
        }
    }

    fn assign_member(&mut self, container: &Value, name: &Rc<str>, value: Value, location: SourceLocation) -> Result<(), RuntimeError> {
        match container.as_handle().map(|h| h.kind()) {
            Some(HandleKind::Object) => {
                let handle = self.mutable(container, HandleKind::Object, location)?;
                self.heap.object_set(handle, name.clone(), value).at(location)
            }
            Some(HandleKind::Node) if !NODE_MEMBERS.contains(&&**name) => {
                let handle = self.mutable(container, HandleKind::Node, location)?;
                self.heap.node_set_prop(handle, name.clone(), value).at(location)
            }
            _ => Err(RuntimeError::UndefinedProperty {
                name: name.to_string(),
                on: container.type_name(),
                location,
            }),
        }
    }

    pub(crate) fn eval_index(&mut self, object: NodeId, index: NodeId, signal: u32, location: SourceLocation) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => Ok(Step::Call { node: object, resume: 1 }),
            1 => Ok(Step::Call { node: index, resume: 2 }),
            _ => {
                let key = self.pop_value(location)?;
                let container = self.pop_value(location)?;
                let value = self.index_value(&container, &key, location)?;
                self.heap.push(value);
                Ok(Step::Done)
            }
        }
    }

    pub(crate) fn eval_member(&mut self, object: NodeId, name: &str, signal: u32, location: SourceLocation) -> Result<Step, RuntimeError> {
        if signal == ENTRY {
            return Ok(Step::Call { node: object, resume: 1 });
        }
        let container = self.pop_value(location)?;
        let value = self
            .member_value(&container, name, location)?
            .ok_or_else(|| RuntimeError::UndefinedProperty {
                name: name.to_string(),
                on: container.type_name(),
                location,
            })?;
        self.heap.push(value);
        Ok(Step::Done)
    }

    // ---------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------

    /// `callee(args)`. Stack layout while arguments are evaluated:
    /// `callee [receiver] arg0 arg1 ...`; the frame state holds the number of
    /// receiver slots (1 for method sugar).
    pub(crate) fn eval_call(
        &mut self,
        frame: &mut Frame,
        callee: NodeId,
        args: &[NodeId],
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let ast = Rc::clone(&self.ast);
        let finished = CALL_ARGS + args.len() as u32 + 1;
        match signal {
            ENTRY => match ast.kind(callee) {
                Some(NodeKind::Member { object, .. }) => Ok(Step::Call {
                    node: *object,
                    resume: CALL_METHOD,
                }),
                _ => Ok(Step::Call {
                    node: callee,
                    resume: CALL_ARGS,
                }),
            },
            CALL_METHOD => {
                let Some(NodeKind::Member { name, .. }) = ast.kind(callee) else {
                    return Err(RuntimeError::internal("method call without a member callee", location));
                };
                let receiver = self.pop_value(location)?;
                match self.member_value(&receiver, name, location)? {
                    Some(field) => self.heap.push(field),
                    None => {
                        let method = self.lookup(frame.scope, name, location).map_err(|_| {
                            RuntimeError::UndefinedProperty {
                                name: name.to_string(),
                                on: receiver.type_name(),
                                location,
                            }
                        })?;
                        self.heap.push(method);
                        self.heap.push(receiver);
                        self.set_state(frame, Value::Int(1));
                    }
                }
                self.next_argument(frame, callee, args, 0, location)
            }
            FAILED => self.fail_match_call(frame, location),
            s if s == finished => {
                if frame.checkpoint.is_some() {
                    self.finish_match_call(frame, location)
                } else {
                    Ok(Step::Done)
                }
            }
            s => self.next_argument(frame, callee, args, (s - CALL_ARGS) as usize, location),
        }
    }

    /// Evaluate argument `k`, or call once every argument is on the stack
    fn next_argument(
        &mut self,
        frame: &mut Frame,
        callee: NodeId,
        args: &[NodeId],
        k: usize,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        if let Some(&arg) = args.get(k) {
            return Ok(Step::Call {
                node: arg,
                resume: CALL_ARGS + k as u32 + 1,
            });
        }

        let receiver = frame.state.as_int().unwrap_or(0) as usize;
        let values = self.pop_values(args.len() + receiver, location)?;
        let function = self.pop_value(location)?;
        let resume = CALL_ARGS + args.len() as u32 + 1;
        let name = match self.ast.kind(callee) {
            Some(NodeKind::Ident(name)) | Some(NodeKind::Member { name, .. }) => name.to_string(),
            _ => function.type_name(),
        };

        if let Some(builtin) = self.match_builtin(&function, location)? {
            return self.start_match_call(frame, builtin, values, resume, location);
        }
        match self.invoke(&function, &name, values, resume, location)? {
            Invocation::Value(value) => {
                self.heap.push(value);
                Ok(Step::Done)
            }
            Invocation::Step(step) => Ok(step),
        }
    }

    fn match_builtin(&self, callee: &Value, location: SourceLocation) -> Result<Option<Builtin>, RuntimeError> {
        let Some(handle) = callee.as_kind(HandleKind::Function) else {
            return Ok(None);
        };
        match self.heap.get(handle).at(location)?.as_function().at(location)?.kind {
            FunctionKind::Builtin(builtin) if builtin.is_match() => Ok(Some(builtin)),
            _ => Ok(None),
        }
    }

    /// Set up `match(rule, input)`: push a reader and a root node, then run
    /// the rule body behind a choice point owned by this call frame
    fn start_match_call(
        &mut self,
        frame: &mut Frame,
        builtin: Builtin,
        args: Vec<Value>,
        resume: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        self.check_arity(builtin, args.len(), location)?;
        let function = match &args[0] {
            Value::Str(name) => self.rule_of(frame.scope, name, location)?,
            other => {
                let function = self.function_of(other, &other.type_name(), location)?;
                if !matches!(function.kind, FunctionKind::Rule { .. }) {
                    return Err(RuntimeError::NotARule {
                        name: function.name.to_string(),
                        location,
                    });
                }
                function
            }
        };
        let FunctionKind::Rule { body, .. } = function.kind else {
            return Err(RuntimeError::NotARule {
                name: function.name.to_string(),
                location,
            });
        };

        let reader = match builtin {
            Builtin::MatchTree => {
                let parent = self.expect_node(&args[1], location)?;
                let len = self.heap.get(parent).at(location)?.as_node().at(location)?.children.len();
                Reader::Tree { parent, pos: 0, len }
            }
            Builtin::MatchBytes => Reader::Units {
                input: Rc::new(Input::from_bytes(&self.bytes_of(&args[1], location)?)),
                pos: 0,
            },
            _ => {
                let text = args[1]
                    .as_str()
                    .ok_or_else(|| RuntimeError::type_error("string", args[1].type_name(), location))?;
                Reader::Units {
                    input: Rc::new(Input::from_text(text)),
                    pos: 0,
                }
            }
        };

        self.push_reader(reader);
        frame.checkpoint = Some(Checkpoint {
            generation: self.heap.current_generation(),
            choices: self.choices.len(),
            cursor: self.readers.save(),
        });
        self.push_choice(frame);
        self.open_node(function.name.clone(), location)?;
        Ok(Step::Enter {
            node: body,
            scope: function.scope.unwrap_or(self.globals),
            resume,
            boundary: Boundary::Rule,
        })
    }

    fn finish_match_call(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<Step, RuntimeError> {
        let checkpoint = self.checkpoint(frame, location)?;
        frame.checkpoint = None;
        let node = self.close_node(location)?;
        self.cut_choices(checkpoint.choices);
        self.squash_to(checkpoint.generation, location)?;
        self.pop_reader();
        self.heap.push(Value::Handle(node));
        Ok(Step::Done)
    }

    /// The rule did not match: the choice point already undid its effects,
    /// the root node included
    fn fail_match_call(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<Step, RuntimeError> {
        if frame.checkpoint.take().is_none() {
            return Err(RuntimeError::internal("call resumed after a failure it did not own", location));
        }
        self.pop_reader();
        self.heap.push(Value::Nil);
        Ok(Step::Done)
    }

    /// Binary input for `match_bytes`: a list of byte values or a string of
    /// code points below 256
    fn bytes_of(&self, value: &Value, location: SourceLocation) -> Result<Vec<u8>, RuntimeError> {
        let bad = |got: String| RuntimeError::type_error("list of bytes", got, location);
        match value {
            Value::Str(s) => s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| bad(format!("character {:?}", c))))
                .collect(),
            Value::Handle(h) if h.kind() == HandleKind::List => {
                let obj = self.heap.get(*h).at(location)?;
                let bytes = obj
                    .as_list()
                    .at(location)?
                    .iter()
                    .map(|v| match v {
                        Value::Int(n) => u8::try_from(*n).map_err(|_| bad(format!("{}", n))),
                        other => Err(bad(other.type_name())),
                    })
                    .collect();
                bytes
            }
            other => Err(bad(other.type_name())),
        }
    }
}
