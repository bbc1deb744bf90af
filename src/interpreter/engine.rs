// Resumable evaluation engine

use crate::interpreter::builtins::Builtin;
use crate::interpreter::config::EngineConfig;
use crate::interpreter::constants::{BREAK, CONTINUE, FAILED, NODE_REGISTER, RESULT_REGISTER, RETURN};
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::interpreter::frame::{Boundary, Checkpoint, ChoicePoint, Frame, Modes, RunStatus, Step};
use crate::memory::gc::GcStats;
use crate::memory::heap::{CaptureNode, Function, FunctionKind, GenerationId, Heap, HeapObject, Scope};
use crate::memory::journal::Journaled;
use crate::memory::value::{Handle, HandleKind, Value};
use crate::parser::ast::{Ast, NodeId, NodeKind, SourceLocation};
use crate::parser::parse::ParseError;
use crate::reader::{Input, Reader, Readers};
use crate::trace::{Terminal, TraceEvent, TraceKind, TraceLog};
use log::{debug, info, trace, warn};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Result of a top-level match
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The root capture node
    Matched(Value),
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    pub fn node(&self) -> Option<Handle> {
        match self {
            MatchOutcome::Matched(value) => value.as_kind(HandleKind::Node),
            MatchOutcome::NoMatch => None,
        }
    }
}

/// How a run of the trampoline ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    /// The barrier choice point of a top-level match was restored
    Failed,
}

/// What a function call turned into
pub(crate) enum Invocation {
    /// The callee finished within the current step
    Value(Value),
    /// The callee runs in a new frame
    Step(Step),
}

/// Engine state at the start of an API call, restored on a fatal fault
#[derive(Debug, Clone, Copy)]
struct EntryMark {
    frames: usize,
    choices: usize,
    generation: GenerationId,
    readers: usize,
    stack: usize,
}

/// The interpreter: a trampoline over an explicit frame stack
#[derive(Debug)]
pub struct Engine {
    /// Parsed program, shared with node functions while they mutate the engine
    pub(crate) ast: Rc<Ast>,

    /// Transactional heap, including the root stack and registers
    pub(crate) heap: Heap,

    /// Frame stack, journaled in lockstep with heap generations
    pub(crate) frames: Journaled<Frame>,

    /// Recorded alternatives, newest last
    pub(crate) choices: Vec<ChoicePoint>,

    pub(crate) readers: Readers,

    /// Global scope; built-ins are predefined here
    pub(crate) globals: Handle,

    pub(crate) status: RunStatus,

    pub(crate) config: EngineConfig,

    /// Captured `print` output
    pub(crate) terminal: Terminal,

    pub(crate) trace: TraceLog,

    /// Trampoline steps taken
    steps: u64,

    /// Allocations that trigger the next spatial collection
    gc_budget: usize,

    /// Whether the program's top level has run
    loaded: bool,
}

impl Engine {
    /// Create an engine for a parsed program
    pub fn new(ast: Ast, config: EngineConfig) -> Self {
        let mut heap = Heap::new();
        let mut vars = FxHashMap::default();
        for builtin in Builtin::ALL {
            let function = heap.allocate(HeapObject::Function(Function {
                name: Rc::from(builtin.name()),
                params: Rc::from([]),
                scope: None,
                kind: FunctionKind::Builtin(*builtin),
            }));
            vars.insert(Rc::from(builtin.name()), Value::Handle(function));
        }
        let globals = heap.allocate(HeapObject::Context(Scope { vars, parent: None }));
        heap.retain_handle(globals);
        heap.collect_zero_counts();
        let gc_budget = config.gc_threshold;

        Engine {
            ast: Rc::new(ast),
            heap,
            frames: Journaled::new(),
            choices: Vec::new(),
            readers: Readers::new(),
            globals,
            status: RunStatus::Advancing,
            trace: TraceLog::new(config.trace_limit),
            config,
            terminal: Terminal::new(),
            steps: 0,
            gc_budget,
            loaded: false,
        }
    }

    /// Parse `source` and create an engine for it
    pub fn from_source(source: &str, config: EngineConfig) -> Result<Self, ParseError> {
        Ok(Engine::new(crate::parser::parse(source)?, config))
    }

    // ---------------------------------------------------------------
    // Public API
    // ---------------------------------------------------------------

    /// Run the program's top level. Returns the value of the last top-level
    /// expression statement, or nil.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        info!("running program ({} nodes)", self.ast.len());
        self.loaded = true;
        let mark = self.mark();
        let root = self.ast.root();
        let frame = Frame::new(root, self.globals, Modes::default(), self.heap.stack_len(), Boundary::Program);
        let result = self.push_frame(frame).and_then(|_| self.run_frames(mark.frames));
        match result {
            Ok(RunOutcome::Completed) => {
                self.heap.collect_zero_counts();
                info!("program finished after {} step(s)", self.steps);
                Ok(self.result())
            }
            Ok(RunOutcome::Failed) => {
                let location = self.ast.location(root);
                self.abort(&mark);
                Err(RuntimeError::internal("match failure escaped the program", location))
            }
            Err(err) => {
                warn!("program aborted: {}", err);
                self.abort(&mark);
                Err(err)
            }
        }
    }

    /// Match the rule `rule` against `text`
    pub fn match_text(&mut self, rule: &str, text: &str) -> Result<MatchOutcome, RuntimeError> {
        self.match_input(
            rule,
            Reader::Units {
                input: Rc::new(Input::from_text(text)),
                pos: 0,
            },
        )
    }

    /// Match the rule `rule` against binary input
    pub fn match_bytes(&mut self, rule: &str, bytes: &[u8]) -> Result<MatchOutcome, RuntimeError> {
        self.match_input(
            rule,
            Reader::Units {
                input: Rc::new(Input::from_bytes(bytes)),
                pos: 0,
            },
        )
    }

    /// Call a global function with primitive arguments
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.ensure_loaded()?;
        let location = SourceLocation::default();
        let callee = self.lookup(self.globals, name, location)?;
        let function = self.function_of(&callee, name, location)?;
        let mark = self.mark();
        let result = match function.kind {
            FunctionKind::User { body } => self.call_scope(&function, args, location).and_then(|scope| {
                let frame = Frame::new(body, scope, Modes::default(), self.heap.stack_len(), Boundary::Call);
                self.push_frame(frame)?;
                match self.run_frames(mark.frames)? {
                    RunOutcome::Completed => self.heap.pop().at(location),
                    RunOutcome::Failed => Err(RuntimeError::internal("match failure escaped a call", location)),
                }
            }),
            FunctionKind::Builtin(builtin) if builtin.is_match() => {
                return match (args.first(), args.get(1)) {
                    (Some(Value::Str(rule)), Some(Value::Str(text))) => {
                        let (rule, text) = (rule.clone(), text.clone());
                        let outcome = self.match_text(&rule, &text)?;
                        Ok(match outcome {
                            MatchOutcome::Matched(node) => node,
                            MatchOutcome::NoMatch => Value::Nil,
                        })
                    }
                    _ => Err(RuntimeError::type_error("rule name and text", format!("{} argument(s)", args.len()), location)),
                };
            }
            FunctionKind::Builtin(builtin) => self.call_builtin(builtin, &args, location),
            FunctionKind::Rule { .. } => Err(RuntimeError::NotCallable {
                name: name.to_string(),
                location,
            }),
        };
        match result {
            Ok(value) => {
                self.pin_result(value.clone());
                self.heap.collect_zero_counts();
                Ok(value)
            }
            Err(err) => {
                self.abort(&mark);
                Err(err)
            }
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Lines printed so far
    pub fn output(&self) -> Vec<String> {
        self.terminal.get_output()
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Value bound to `name` in the global scope
    pub fn global(&self, name: &str) -> Option<Value> {
        self.heap.scope_lookup(self.globals, name).ok().flatten()
    }

    /// The pinned result of the last top-level evaluation
    pub fn result(&self) -> Value {
        self.heap.get_by_name(RESULT_REGISTER).unwrap_or_default()
    }

    /// Mark-sweep from every root the engine holds
    pub fn collect_garbage(&mut self) -> GcStats {
        let mut roots = vec![self.globals];
        for frame in self.frames.iter() {
            roots.push(frame.scope);
            if let Value::Handle(h) = frame.state {
                roots.push(h);
            }
        }
        roots.extend(self.readers.handles());
        let stats = self.heap.collect_spatial(&roots);
        // Collect again once as much has been allocated as survived
        self.gc_budget = stats.marked.max(self.config.gc_threshold);
        stats
    }

    // ---------------------------------------------------------------
    // Trampoline
    // ---------------------------------------------------------------

    /// Drive frames until the stack is back at `floor`
    pub(crate) fn run_frames(&mut self, floor: usize) -> Result<RunOutcome, RuntimeError> {
        while self.frames.len() > floor {
            let Some(mut frame) = self.frames.last().cloned() else {
                break;
            };
            self.safe_point(&frame)?;
            let signal = frame.signal;
            trace!(
                "step {}: {} #{} signal {}",
                self.steps,
                self.ast.kind(frame.node).map_or("?", NodeKind::tag),
                frame.node,
                signal
            );

            match self.dispatch(&mut frame, signal)? {
                Step::Call { node, resume } => {
                    frame.signal = resume;
                    let child = Frame::new(node, frame.scope, frame.modes, self.heap.stack_len(), Boundary::None);
                    self.store_top(frame);
                    self.push_frame(child)?;
                }
                Step::Enter {
                    node,
                    scope,
                    resume,
                    boundary,
                } => {
                    frame.signal = resume;
                    let child = Frame::new(node, scope, frame.modes, self.heap.stack_len(), boundary);
                    self.store_top(frame);
                    self.push_frame(child)?;
                }
                Step::Done => {
                    self.record(TraceKind::Match, frame.node);
                    self.finish_frame(frame);
                }
                Step::Fail => {
                    self.record(TraceKind::Fail, frame.node);
                    self.store_top(frame);
                    self.status = RunStatus::Unwinding;
                    if let Some(outcome) = self.backtrack()? {
                        return Ok(outcome);
                    }
                }
                Step::Return => {
                    let location = self.ast.location(frame.node);
                    self.store_top(frame);
                    self.unwind_return(location)?;
                }
                Step::Break => {
                    let location = self.ast.location(frame.node);
                    self.store_top(frame);
                    self.unwind_loop(BREAK, location)?;
                }
                Step::Continue => {
                    let location = self.ast.location(frame.node);
                    self.store_top(frame);
                    self.unwind_loop(CONTINUE, location)?;
                }
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Evaluate one step of `frame`'s node
    fn dispatch(&mut self, frame: &mut Frame, signal: u32) -> Result<Step, RuntimeError> {
        let ast = Rc::clone(&self.ast);
        let Some(node) = ast.get(frame.node) else {
            return Err(RuntimeError::internal(
                format!("frame refers to missing node #{}", frame.node),
                SourceLocation::default(),
            ));
        };
        let location = node.location;

        match &node.kind {
            NodeKind::Program { body } | NodeKind::Block { body } => self.exec_block(frame, body, signal),
            NodeKind::Let { name, init } => self.exec_let(frame, name, *init, signal, location),
            NodeKind::FnDecl { name, params, body } => self.exec_fn_decl(frame, name, params, *body, location),
            NodeKind::RuleDecl {
                name,
                pattern,
                capture,
            } => self.exec_rule_decl(frame, name, *pattern, *capture, location),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.exec_if(*condition, *then_branch, *else_branch, signal, location),
            NodeKind::While { condition, body } => self.exec_while(*condition, *body, signal, location),
            NodeKind::For { var, iterable, body } => self.exec_for(frame, var, *iterable, *body, signal, location),
            NodeKind::Return { value } => self.exec_return(*value, signal),
            NodeKind::Break => Ok(Step::Break),
            NodeKind::Continue => Ok(Step::Continue),
            NodeKind::ExprStmt { expr } => self.exec_expr_stmt(frame, *expr, signal, location),

            NodeKind::Literal(literal) => self.eval_literal(literal),
            NodeKind::Ident(name) => self.eval_ident(frame, name, location),
            NodeKind::ListLit { items } => self.eval_list(items, signal, location),
            NodeKind::ObjectLit { fields } => self.eval_object(fields, signal, location),
            NodeKind::Lambda { params, body } => self.eval_lambda(frame, params, *body),
            NodeKind::Unary { op, operand } => self.eval_unary(*op, *operand, signal, location),
            NodeKind::Binary { op, left, right } => self.eval_binary(*op, *left, *right, signal, location),
            NodeKind::Assign { target, value } => self.eval_assign(frame, *target, *value, signal, location),
            NodeKind::Call { callee, args } => self.eval_call(frame, *callee, args, signal, location),
            NodeKind::Index { object, index } => self.eval_index(*object, *index, signal, location),
            NodeKind::Member { object, name } => self.eval_member(*object, name, signal, location),

            NodeKind::Text { text, modifiers } => self.lex_text(frame, text, modifiers, location),
            NodeKind::Class { class, modifiers } => self.lex_class(frame, class, modifiers, location),
            NodeKind::Bytes { bytes } => self.lex_bytes(frame, bytes, location),
            NodeKind::Any { modifiers } => self.lex_any(frame, modifiers, location),
            NodeKind::End => self.lex_end(frame, location),
            NodeKind::Sequence { items } => Ok(self.lex_sequence(items, signal)),
            NodeKind::Group {
                header,
                alternatives,
            } => self.lex_group(frame, header, alternatives, signal, location),
            NodeKind::QuantGroup { options, bound } => {
                self.lex_quantified_group(frame, options, *bound, signal, location)
            }
            NodeKind::Quantified { inner, quantifier } => {
                self.lex_quantified(frame, *inner, *quantifier, signal, location)
            }
            NodeKind::Not { inner } => self.lex_not(frame, *inner, signal, location),
            NodeKind::Capture { name, inner } => self.lex_capture(frame, name, *inner, signal, location),
            NodeKind::RuleRef { name } => self.lex_rule_ref(frame, name, signal, location),
            NodeKind::Filter { name, func } => self.lex_filter(frame, name.as_ref(), *func, signal, location),
            NodeKind::Executor { guard, body } => self.lex_executor(frame, *guard, *body, signal),
            NodeKind::Addition { name, func } => self.lex_addition(name, *func, signal, location),
        }
    }

    /// Per-step housekeeping: the step budget and deferred collection
    fn safe_point(&mut self, frame: &Frame) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeError::StepLimitExceeded {
                    limit,
                    location: self.ast.location(frame.node),
                });
            }
        }
        self.heap.collect_zero_counts();
        if self.heap.allocations() >= self.gc_budget {
            let stats = self.collect_garbage();
            debug!(
                "gc at step {}: freed {} handle(s), {} cell(s)",
                self.steps, stats.freed_handles, stats.freed_cells
            );
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Frames
    // ---------------------------------------------------------------

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeError::FrameLimitExceeded {
                limit: self.config.max_frames,
                location: self.ast.location(frame.node),
            });
        }
        self.heap.retain_handle(frame.scope);
        self.heap.retain(&frame.state);
        let node = frame.node;
        self.frames.push(frame);
        self.record(TraceKind::Enter, node);
        Ok(())
    }

    /// Write a frame back to the top of the stack
    fn store_top(&mut self, frame: Frame) {
        if let Some(top) = self.frames.len().checked_sub(1) {
            self.frames.set(top, frame);
        }
    }

    /// Pop the top frame; `frame` is its current content
    fn finish_frame(&mut self, frame: Frame) {
        self.frames.pop();
        self.heap.release_handle(frame.scope);
        self.heap.release(&frame.state);
    }

    fn pop_top_frame(&mut self) {
        if let Some(frame) = self.frames.last().cloned() {
            self.finish_frame(frame);
        }
    }

    /// Replace a frame's node state, keeping reference counts exact
    pub(crate) fn set_state(&mut self, frame: &mut Frame, value: Value) {
        self.heap.retain(&value);
        let old = std::mem::replace(&mut frame.state, value);
        self.heap.release(&old);
    }

    /// Heap handle of a frame's node state
    pub(crate) fn state_handle(&self, frame: &Frame, location: SourceLocation) -> Result<Handle, RuntimeError> {
        frame
            .state
            .as_handle()
            .ok_or_else(|| RuntimeError::internal("frame has no state", location))
    }

    // ---------------------------------------------------------------
    // Generations, checkpoints and choice points
    // ---------------------------------------------------------------

    /// Fork a heap generation and open a matching frame journal mark
    pub(crate) fn fork(&mut self) -> GenerationId {
        let id = self.heap.fork();
        self.frames.begin();
        id
    }

    fn discard_to(&mut self, target: GenerationId, location: SourceLocation) -> Result<(), RuntimeError> {
        let dropped = self.heap.discard_to(target).at(location)?;
        for _ in 0..dropped {
            self.frames.rollback();
        }
        Ok(())
    }

    pub(crate) fn squash_to(&mut self, target: GenerationId, location: SourceLocation) -> Result<(), RuntimeError> {
        let folded = self.heap.squash_to(target).at(location)?;
        for _ in 0..folded {
            self.frames.commit();
        }
        Ok(())
    }

    /// Record the reader cursor and fork: the start of a lexeme attempt
    pub(crate) fn open_checkpoint(&mut self, frame: &mut Frame) {
        let generation = self.heap.current_generation();
        frame.checkpoint = Some(Checkpoint {
            generation,
            choices: self.choices.len(),
            cursor: self.readers.save(),
        });
        self.fork();
    }

    /// Keep the effects of a successful attempt. The checkpoint generation is
    /// folded into its parent unless a live choice point still needs it.
    pub(crate) fn commit_checkpoint(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<(), RuntimeError> {
        let Some(checkpoint) = frame.checkpoint.take() else {
            return Ok(());
        };
        let independent = self
            .choices
            .last()
            .map_or(true, |choice| choice.generation <= checkpoint.generation);
        if independent {
            self.squash_to(checkpoint.generation, location)?;
        }
        Ok(())
    }

    /// Checkpoint of a frame that must have one
    pub(crate) fn checkpoint(&self, frame: &Frame, location: SourceLocation) -> Result<Checkpoint, RuntimeError> {
        frame
            .checkpoint
            .ok_or_else(|| RuntimeError::internal("lexeme has no checkpoint", location))
    }

    /// Record an alternative for `frame`: on failure downstream, everything
    /// after this point is discarded and the frame resumes with [`FAILED`]
    pub(crate) fn push_choice(&mut self, frame: &Frame) {
        self.store_top(frame.clone());
        let generation = self.heap.current_generation();
        self.fork();
        self.choices.push(ChoicePoint {
            generation,
            frame_depth: self.frames.len(),
            cursor: self.readers.save(),
            resume: Some(FAILED),
        });
    }

    /// Push the barrier of a match: restoring it ends the run as a failure
    fn push_barrier(&mut self, frame_depth: usize) -> GenerationId {
        let generation = self.heap.current_generation();
        self.fork();
        self.choices.push(ChoicePoint {
            generation,
            frame_depth,
            cursor: self.readers.save(),
            resume: None,
        });
        generation
    }

    /// Forget choice points newer than `len`
    pub(crate) fn cut_choices(&mut self, len: usize) {
        self.choices.truncate(len);
    }

    /// Restore the newest choice point
    fn backtrack(&mut self) -> Result<Option<RunOutcome>, RuntimeError> {
        let location = self
            .frames
            .last()
            .map(|f| self.ast.location(f.node))
            .unwrap_or_default();
        let Some(choice) = self.choices.pop() else {
            return Err(RuntimeError::internal("pattern failed outside of a match", location));
        };
        self.discard_to(choice.generation, location)?;
        self.readers.restore(choice.cursor);
        self.status = RunStatus::Advancing;
        debug!(
            "backtrack to generation {} at depth {}, cursor {}",
            choice.generation.0, choice.frame_depth, choice.cursor.pos
        );

        if self.frames.len() != choice.frame_depth {
            return Err(RuntimeError::internal("frame stack out of step with its choice point", location));
        }

        match choice.resume {
            None => Ok(Some(RunOutcome::Failed)),
            Some(signal) => {
                if let Some(mut owner) = self.frames.last().cloned() {
                    owner.signal = signal;
                    let node = owner.node;
                    self.store_top(owner);
                    self.record(TraceKind::Backtrack, node);
                }
                Ok(None)
            }
        }
    }

    // ---------------------------------------------------------------
    // Structured control flow
    // ---------------------------------------------------------------

    fn unwind_return(&mut self, location: SourceLocation) -> Result<(), RuntimeError> {
        let index = self
            .frames
            .as_slice()
            .iter()
            .rposition(|f| f.boundary != Boundary::None);
        let Some(index) = index.filter(|i| self.frames.get(*i).is_some_and(|f| f.boundary == Boundary::Call)) else {
            return Err(RuntimeError::InvalidControlFlow {
                statement: "return",
                expected: "function",
                location,
            });
        };
        let value = self.heap.pop().at(location)?;
        while self.frames.len() > index + 1 {
            self.pop_top_frame();
        }
        if let Some(mut body) = self.frames.last().cloned() {
            self.heap.truncate_stack(body.base).at(location)?;
            self.heap.push(value);
            body.signal = RETURN;
            self.store_top(body);
        }
        Ok(())
    }

    /// Deliver `signal` (`BREAK` or `CONTINUE`) to the innermost loop
    fn unwind_loop(&mut self, signal: u32, location: SourceLocation) -> Result<(), RuntimeError> {
        let statement = if signal == BREAK { "break" } else { "continue" };
        let mut target = None;
        for (i, f) in self.frames.as_slice().iter().enumerate().rev() {
            if matches!(self.ast.kind(f.node), Some(NodeKind::While { .. } | NodeKind::For { .. })) {
                target = Some(i);
                break;
            }
            if f.boundary != Boundary::None {
                break;
            }
        }
        let Some(index) = target else {
            return Err(RuntimeError::InvalidControlFlow {
                statement,
                expected: "loop",
                location,
            });
        };
        while self.frames.len() > index + 1 {
            self.pop_top_frame();
        }
        if let Some(mut looping) = self.frames.last().cloned() {
            self.heap.truncate_stack(looping.base).at(location)?;
            looping.signal = signal;
            self.store_top(looping);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Values, scopes and calls
    // ---------------------------------------------------------------

    pub(crate) fn pop_value(&mut self, location: SourceLocation) -> Result<Value, RuntimeError> {
        self.heap.pop().at(location)
    }

    /// Pop `count` values, returned in push order
    pub(crate) fn pop_values(&mut self, count: usize, location: SourceLocation) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop_value(location)?);
        }
        values.reverse();
        Ok(values)
    }

    pub(crate) fn lookup(&self, scope: Handle, name: &str, location: SourceLocation) -> Result<Value, RuntimeError> {
        self.heap
            .scope_lookup(scope, name)
            .at(location)?
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
                location,
            })
    }

    pub(crate) fn function_of(&self, callee: &Value, name: &str, location: SourceLocation) -> Result<Function, RuntimeError> {
        let not_callable = || RuntimeError::NotCallable {
            name: name.to_string(),
            location,
        };
        let handle = callee.as_kind(HandleKind::Function).ok_or_else(not_callable)?;
        let function = self.heap.get(handle).at(location)?.as_function().at(location)?.clone();
        Ok(function)
    }

    /// The rule bound to `name`, visible from `scope`
    pub(crate) fn rule_of(&self, scope: Handle, name: &str, location: SourceLocation) -> Result<Function, RuntimeError> {
        let value = self.lookup(scope, name, location)?;
        let function = self
            .function_of(&value, name, location)
            .map_err(|_| RuntimeError::NotARule {
                name: name.to_string(),
                location,
            })?;
        match function.kind {
            FunctionKind::Rule { .. } => Ok(function),
            _ => Err(RuntimeError::NotARule {
                name: name.to_string(),
                location,
            }),
        }
    }

    /// Fresh scope for a user function call, binding the parameters and `args`
    pub(crate) fn call_scope(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        location: SourceLocation,
    ) -> Result<Handle, RuntimeError> {
        if args.len() < function.params.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: function.name.to_string(),
                expected: function.params.len(),
                got: args.len(),
                location,
            });
        }
        let mut vars = FxHashMap::default();
        for (param, arg) in function.params.iter().zip(&args) {
            vars.insert(param.clone(), arg.clone());
        }
        let arguments = self.heap.allocate(HeapObject::Arguments(args));
        vars.insert(Rc::from("args"), Value::Handle(arguments));
        Ok(self.heap.allocate(HeapObject::Context(Scope {
            vars,
            parent: Some(function.scope.unwrap_or(self.globals)),
        })))
    }

    /// Call `callee` from a lexeme or call frame, resuming with `resume`
    pub(crate) fn invoke(
        &mut self,
        callee: &Value,
        name: &str,
        args: Vec<Value>,
        resume: u32,
        location: SourceLocation,
    ) -> Result<Invocation, RuntimeError> {
        let function = self.function_of(callee, name, location)?;
        match function.kind {
            FunctionKind::User { body } => {
                let scope = self.call_scope(&function, args, location)?;
                Ok(Invocation::Step(Step::Enter {
                    node: body,
                    scope,
                    resume,
                    boundary: Boundary::Call,
                }))
            }
            FunctionKind::Builtin(builtin) if !builtin.is_match() => {
                self.call_builtin(builtin, &args, location).map(Invocation::Value)
            }
            _ => Err(RuntimeError::NotCallable {
                name: function.name.to_string(),
                location,
            }),
        }
    }

    /// Remember `value` as the latest result
    pub(crate) fn pin_result(&mut self, value: Value) {
        if !self.heap.set_named(RESULT_REGISTER, value.clone()) {
            self.heap.push_named(RESULT_REGISTER, value);
        }
    }

    // ---------------------------------------------------------------
    // Readers and capture roots
    // ---------------------------------------------------------------

    pub(crate) fn push_reader(&mut self, reader: Reader) {
        if let Some(parent) = reader.tree_parent() {
            self.heap.retain_handle(parent);
        }
        self.readers.push(reader);
    }

    pub(crate) fn pop_reader(&mut self) {
        if let Some(parent) = self.readers.pop().and_then(|r| r.tree_parent()) {
            self.heap.release_handle(parent);
        }
    }

    pub(crate) fn reader(&self, location: SourceLocation) -> Result<&Reader, RuntimeError> {
        self.readers
            .top()
            .ok_or_else(|| RuntimeError::internal("lexeme evaluated outside of a match", location))
    }

    pub(crate) fn reader_mut(&mut self, location: SourceLocation) -> Result<&mut Reader, RuntimeError> {
        self.readers
            .top_mut()
            .ok_or_else(|| RuntimeError::internal("lexeme evaluated outside of a match", location))
    }

    /// Allocate a capture node at the cursor and make it the active `$node`
    pub(crate) fn open_node(&mut self, name: Rc<str>, location: SourceLocation) -> Result<Handle, RuntimeError> {
        let reader = self.reader(location)?;
        let node = CaptureNode::new(name, reader.pos(), reader.input());
        let handle = self.heap.allocate(HeapObject::Node(node));
        self.heap.push_named(NODE_REGISTER, Value::Handle(handle));
        Ok(handle)
    }

    /// Retire the active `$node`, extending it to the cursor
    pub(crate) fn close_node(&mut self, location: SourceLocation) -> Result<Handle, RuntimeError> {
        let pos = self.reader(location)?.pos();
        let node = self
            .heap
            .remove(NODE_REGISTER)
            .and_then(|v| v.as_kind(HandleKind::Node))
            .ok_or_else(|| RuntimeError::internal("no active capture node", location))?;
        let mut obj = self.heap.get_mut(node).at(location)?;
        let capture = obj.as_node_mut().at(location)?;
        let start = capture.from;
        capture.from = start.min(pos);
        capture.to = start.max(pos);
        Ok(node)
    }

    /// The active `$node`, if any
    pub(crate) fn active_node(&self) -> Option<Handle> {
        self.heap
            .get_by_name(NODE_REGISTER)
            .and_then(|v| v.as_kind(HandleKind::Node))
    }

    /// Match `function` against `reader` from the API
    fn match_input(&mut self, rule: &str, reader: Reader) -> Result<MatchOutcome, RuntimeError> {
        self.ensure_loaded()?;
        let location = SourceLocation::default();
        let function = self.rule_of(self.globals, rule, location)?;
        info!("matching rule '{}' against {} unit(s)", rule, reader.len());
        self.status = RunStatus::Advancing;
        let mark = self.mark();
        match self.run_match(&function, reader, &mark, location) {
            Ok(outcome) => {
                self.heap.collect_zero_counts();
                self.collect_garbage();
                info!(
                    "rule '{}' {} after {} step(s)",
                    rule,
                    if outcome.is_match() { "matched" } else { "did not match" },
                    self.steps
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!("match of '{}' aborted: {}", rule, err);
                self.abort(&mark);
                Err(err)
            }
        }
    }

    fn run_match(
        &mut self,
        function: &Function,
        reader: Reader,
        mark: &EntryMark,
        location: SourceLocation,
    ) -> Result<MatchOutcome, RuntimeError> {
        let FunctionKind::Rule { body, .. } = function.kind else {
            return Err(RuntimeError::NotARule {
                name: function.name.to_string(),
                location,
            });
        };
        self.push_reader(reader);
        // The root node belongs to the barrier's generation so a failed
        // match leaves no trace of it
        let generation = self.push_barrier(mark.frames);
        self.open_node(function.name.clone(), location)?;
        let scope = function.scope.unwrap_or(self.globals);
        let frame = Frame::new(body, scope, Modes::default(), self.heap.stack_len(), Boundary::Rule);
        self.push_frame(frame)?;

        match self.run_frames(mark.frames)? {
            RunOutcome::Completed => {
                let node = self.close_node(location)?;
                self.cut_choices(mark.choices);
                self.squash_to(generation, location)?;
                self.pop_reader();
                self.pin_result(Value::Handle(node));
                Ok(MatchOutcome::Matched(Value::Handle(node)))
            }
            RunOutcome::Failed => {
                self.pop_reader();
                Ok(MatchOutcome::NoMatch)
            }
        }
    }

    fn ensure_loaded(&mut self) -> Result<(), RuntimeError> {
        if !self.loaded {
            self.run()?;
        }
        Ok(())
    }

    fn mark(&self) -> EntryMark {
        EntryMark {
            frames: self.frames.len(),
            choices: self.choices.len(),
            generation: self.heap.current_generation(),
            readers: self.readers.depth(),
            stack: self.heap.stack_len(),
        }
    }

    /// Return to the state recorded by `mark` after a fatal fault
    fn abort(&mut self, mark: &EntryMark) {
        self.cut_choices(mark.choices);
        if self.heap.current_generation() > mark.generation {
            if let Err(err) = self.discard_to(mark.generation, SourceLocation::default()) {
                warn!("rollback after fault failed: {}", err);
            }
        }
        while self.frames.len() > mark.frames {
            self.pop_top_frame();
        }
        while self.readers.depth() > mark.readers {
            self.pop_reader();
        }
        if let Err(err) = self.heap.truncate_stack(mark.stack) {
            warn!("stack cleanup after fault failed: {}", err);
        }
        self.status = RunStatus::Advancing;
        self.heap.collect_zero_counts();
    }

    // ---------------------------------------------------------------
    // Tracing
    // ---------------------------------------------------------------

    fn record(&mut self, kind: TraceKind, node: NodeId) {
        if !self.config.trace {
            return;
        }
        let Some(tag) = self.ast.kind(node).filter(|k| k.is_lexeme()).map(NodeKind::tag) else {
            return;
        };
        self.trace.push(TraceEvent {
            step: self.steps,
            kind,
            node,
            tag,
            location: self.ast.location(node),
            cursor: self.readers.save().pos,
            depth: self.frames.len(),
            generations: self.heap.generation_count(),
            choices: self.choices.len(),
        });
    }
}
