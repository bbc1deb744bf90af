//! Transactional heap
//!
//! The heap is a table of cells reached through a table of handles,
//! organised as a linear chain of *generations*:
//! - [`Heap::fork`] opens a generation in O(1) by recording high-water marks
//! - [`Heap::discard_to`] drops every newer generation, truncating cells and
//!   handles to their marks and undoing the journal
//! - [`Heap::squash_to`] folds newer generations into an older one
//!
//! Dead cells and handles that no generation can restore go on free lists
//! and are handed out again by later allocations. Reuse inside a child
//! generation is journaled like any other write to older state.
//!
//! # Access discipline
//!
//! Reads go through [`Heap::get`] and return a [`Ref`]. Writes go through
//! [`Heap::get_mut`] and return a [`RefMut`]; if the target cell was born
//! before the current generation, is frozen, or is shared by several handles,
//! it is first cloned into the current generation and *only the writing
//! handle* is retargeted. Older generations and other sharers keep the old
//! cell.
//!
//! A `RefMut` does not count references it stores. Anything that stores a
//! [`Value`] into a cell uses the store operations below (`list_push`,
//! `object_set`, `node_attach`, ...), which keep reference counts exact.
//!
//! # Journal
//!
//! In-place changes to state that predates the current generation (handle
//! retargets, reference and owner counts, live/frozen flags) are journaled.
//! The root [`Stack`] keeps its own journal in lockstep.

use super::stack::{Stack, StackSlot};
use super::value::{Handle, HandleKind, MapKey, Value};
use crate::interpreter::builtins::Builtin;
use crate::parser::ast::{NodeId, Quantifier};
use crate::reader::Input;
use log::debug;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use thiserror::Error;

/// Heap invariant violations. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapFault {
    #[error("dangling handle #{0}: its generation was discarded")]
    Dangling(u32),

    #[error("handle #{0} refers to a reclaimed cell")]
    Reclaimed(u32),

    #[error("generation {0} does not exist")]
    UnknownGeneration(u64),

    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: HandleKind,
        found: HandleKind,
    },

    #[error("value stack underflow")]
    StackUnderflow,
}

/// Identifier of a heap generation. The root generation is `GenerationId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationId(pub u64);

/// How a function value is evaluated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionKind {
    User { body: NodeId },
    /// A `rule` (captures under its name) or `fragment` declaration
    Rule { body: NodeId, capture: bool },
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Rc<[Rc<str>]>,
    /// Defining scope, for closures
    pub scope: Option<Handle>,
    pub kind: FunctionKind,
}

/// A node of the capture tree
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureNode {
    pub name: Rc<str>,
    pub from: usize,
    pub to: usize,
    pub parent: Option<Handle>,
    pub children: Vec<Handle>,
    pub props: BTreeMap<Rc<str>, Value>,
    /// The input this node spans, if it was matched against units
    pub input: Option<Rc<Input>>,
}

impl CaptureNode {
    pub fn new(name: Rc<str>, at: usize, input: Option<Rc<Input>>) -> Self {
        CaptureNode {
            name,
            from: at,
            to: at,
            parent: None,
            children: Vec::new(),
            props: BTreeMap::new(),
            input,
        }
    }

    /// Matched text, or an empty string for tree matches
    pub fn text(&self) -> String {
        match &self.input {
            Some(input) => input.text(self.from.min(self.to), self.to.max(self.from)),
            None => String::new(),
        }
    }
}

/// A lexical scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub vars: FxHashMap<Rc<str>, Value>,
    pub parent: Option<Handle>,
}

/// Runtime state of an alternation or quantified group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternUnion {
    /// Alternative (or option) currently being tried
    pub alternative: usize,
    /// Per-option repetition counts
    pub counts: Vec<u32>,
    /// Completed repetitions of the whole group
    pub total: u32,
    /// Cursor at the start of the current repetition
    pub last_cursor: usize,
}

/// A running repetition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantifierState {
    pub quantifier: Quantifier,
    pub count: u32,
    pub last_cursor: usize,
}

/// One heap object
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Object(FxHashMap<Rc<str>, Value>),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    Set(BTreeSet<MapKey>),
    Function(Function),
    Node(CaptureNode),
    Context(Scope),
    PatternUnion(PatternUnion),
    Quantifier(QuantifierState),
    Arguments(Vec<Value>),
    /// Storage of a reclaimed cell once no generation can restore it
    Reclaimed,
}

macro_rules! accessors {
    ($($variant:ident => $get:ident, $get_mut:ident, $ty:ty;)*) => {
        impl HeapObject {
            $(
                pub fn $get(&self) -> Result<&$ty, HeapFault> {
                    match self {
                        HeapObject::$variant(inner) => Ok(inner),
                        other => Err(other.mismatch(HandleKind::$variant)),
                    }
                }

                pub fn $get_mut(&mut self) -> Result<&mut $ty, HeapFault> {
                    match self {
                        HeapObject::$variant(inner) => Ok(inner),
                        other => Err(other.mismatch(HandleKind::$variant)),
                    }
                }
            )*
        }
    };
}

accessors! {
    Object => as_object, as_object_mut, FxHashMap<Rc<str>, Value>;
    List => as_list, as_list_mut, Vec<Value>;
    Map => as_map, as_map_mut, BTreeMap<MapKey, Value>;
    Set => as_set, as_set_mut, BTreeSet<MapKey>;
    Function => as_function, as_function_mut, Function;
    Node => as_node, as_node_mut, CaptureNode;
    Context => as_scope, as_scope_mut, Scope;
    PatternUnion => as_union, as_union_mut, PatternUnion;
    Quantifier => as_quantifier, as_quantifier_mut, QuantifierState;
    Arguments => as_arguments, as_arguments_mut, Vec<Value>;
}

impl HeapObject {
    pub fn kind(&self) -> HandleKind {
        match self {
            HeapObject::Object(_) => HandleKind::Object,
            HeapObject::List(_) => HandleKind::List,
            HeapObject::Map(_) => HandleKind::Map,
            HeapObject::Set(_) => HandleKind::Set,
            HeapObject::Function(_) => HandleKind::Function,
            HeapObject::Node(_) => HandleKind::Node,
            HeapObject::Context(_) => HandleKind::Context,
            HeapObject::PatternUnion(_) => HandleKind::PatternUnion,
            HeapObject::Quantifier(_) => HandleKind::Quantifier,
            HeapObject::Arguments(_) | HeapObject::Reclaimed => HandleKind::Arguments,
        }
    }

    fn mismatch(&self, expected: HandleKind) -> HeapFault {
        HeapFault::KindMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Append every handle this object references, with multiplicity
    pub fn collect_handles(&self, out: &mut Vec<Handle>) {
        fn value(out: &mut Vec<Handle>, v: &Value) {
            if let Value::Handle(h) = v {
                out.push(*h);
            }
        }
        fn key(out: &mut Vec<Handle>, k: &MapKey) {
            if let MapKey::Handle(h) = k {
                out.push(*h);
            }
        }
        match self {
            HeapObject::Object(fields) => fields.values().for_each(|v| value(out, v)),
            HeapObject::List(items) | HeapObject::Arguments(items) => {
                items.iter().for_each(|v| value(out, v))
            }
            HeapObject::Map(entries) => {
                for (k, v) in entries {
                    key(out, k);
                    value(out, v);
                }
            }
            HeapObject::Set(keys) => keys.iter().for_each(|k| key(out, k)),
            HeapObject::Function(function) => out.extend(function.scope),
            HeapObject::Node(node) => {
                out.extend(node.parent);
                out.extend(node.children.iter().copied());
                node.props.values().for_each(|v| value(out, v));
            }
            HeapObject::Context(scope) => {
                out.extend(scope.parent);
                scope.vars.values().for_each(|v| value(out, v));
            }
            HeapObject::PatternUnion(_) | HeapObject::Quantifier(_) | HeapObject::Reclaimed => {}
        }
    }

    fn handles(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        self.collect_handles(&mut out);
        out
    }
}

/// Read access to a cell
#[derive(Debug)]
pub struct Ref<'a> {
    object: &'a HeapObject,
    frozen: bool,
}

impl Ref<'_> {
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Deref for Ref<'_> {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.object
    }
}

/// Write access to a cell owned by the current generation
#[derive(Debug)]
pub struct RefMut<'a> {
    object: &'a mut HeapObject,
}

impl Deref for RefMut<'_> {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.object
    }
}

impl DerefMut for RefMut<'_> {
    fn deref_mut(&mut self) -> &mut HeapObject {
        self.object
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Cell {
    pub(crate) object: HeapObject,
    pub(crate) owners: u32,
    pub(crate) frozen: bool,
    pub(crate) live: bool,
    /// Generation that allocated (or last reused) the cell
    pub(crate) born: GenerationId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CellMeta {
    pub(crate) owners: u32,
    pub(crate) frozen: bool,
    pub(crate) live: bool,
    pub(crate) born: GenerationId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Slot {
    pub(crate) cell: u32,
    pub(crate) refs: u32,
    pub(crate) live: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum Undo {
    Slot { handle: u32, old: Slot },
    Cell { cell: u32, old: CellMeta },
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    id: GenerationId,
    cells: usize,
    handles: usize,
    journal: usize,
    free_cells: usize,
    free_handles: usize,
}

/// Indices of dead entries available for reuse.
///
/// Entries are only added in the root generation, so while a child
/// generation is open the list only shrinks and rewinding `top` undoes every
/// reuse since a fork.
#[derive(Debug, Clone, Default)]
pub(crate) struct FreeList {
    indices: Vec<u32>,
    top: usize,
}

impl FreeList {
    pub(crate) fn add(&mut self, index: u32) {
        self.indices.truncate(self.top);
        self.indices.push(index);
        self.top = self.indices.len();
    }

    fn take(&mut self) -> Option<u32> {
        self.top = self.top.checked_sub(1)?;
        Some(self.indices[self.top])
    }

    pub(crate) fn clear(&mut self) {
        self.indices.clear();
        self.top = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.top
    }
}

/// Heap statistics, for tests, logging and the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub generations: usize,
    pub cells: usize,
    pub live_cells: usize,
    pub handles: usize,
    pub live_handles: usize,
    pub journal_len: usize,
    pub stack_len: usize,
    /// Dead cells and handles waiting to be reused
    pub free: usize,
}

/// The transactional heap
#[derive(Debug)]
pub struct Heap {
    pub(crate) cells: Vec<Cell>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) journal: Vec<Undo>,
    generations: Vec<Generation>,
    next_generation: u64,
    pub(crate) stack: Stack,
    /// Handles whose count dropped to zero since the last safe point
    pub(crate) zero_counts: Vec<Handle>,
    pub(crate) allocations: usize,
    pub(crate) free_cells: FreeList,
    pub(crate) free_handles: FreeList,
    /// A collection inside a child generation left dead entries that only
    /// become reusable once the chain is squashed back to the root
    pub(crate) reclaim_pending: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            cells: Vec::new(),
            slots: Vec::new(),
            journal: Vec::new(),
            generations: vec![Generation {
                id: GenerationId(0),
                cells: 0,
                handles: 0,
                journal: 0,
                free_cells: 0,
                free_handles: 0,
            }],
            next_generation: 1,
            stack: Stack::new(),
            zero_counts: Vec::new(),
            allocations: 0,
            free_cells: FreeList::default(),
            free_handles: FreeList::default(),
            reclaim_pending: false,
        }
    }

    // ---------------------------------------------------------------
    // Generations
    // ---------------------------------------------------------------

    fn current(&self) -> Generation {
        // The root generation is never removed
        self.generations[self.generations.len() - 1]
    }

    pub fn current_generation(&self) -> GenerationId {
        self.current().id
    }

    pub fn generation_count(&self) -> usize {
        self.generations.len()
    }

    pub(crate) fn journaling(&self) -> bool {
        self.generations.len() > 1
    }

    /// Open a new generation
    pub fn fork(&mut self) -> GenerationId {
        let id = GenerationId(self.next_generation);
        self.next_generation += 1;
        self.generations.push(Generation {
            id,
            cells: self.cells.len(),
            handles: self.slots.len(),
            journal: self.journal.len(),
            free_cells: self.free_cells.len(),
            free_handles: self.free_handles.len(),
        });
        self.stack.begin();
        id
    }

    /// Number of generations newer than `target`. Ids increase along the
    /// chain, so the scan stops as soon as it passes `target`.
    fn newer_than(&self, target: GenerationId) -> Result<usize, HeapFault> {
        let mut count = 0;
        for generation in self.generations.iter().rev() {
            match generation.id.cmp(&target) {
                Ordering::Greater => count += 1,
                Ordering::Equal => return Ok(count),
                Ordering::Less => break,
            }
        }
        Err(HeapFault::UnknownGeneration(target.0))
    }

    /// Drop every generation newer than `target`, restoring heap and stack to
    /// their state right after the oldest dropped generation was forked.
    ///
    /// Returns the number of generations dropped.
    pub fn discard_to(&mut self, target: GenerationId) -> Result<usize, HeapFault> {
        let count = self.newer_than(target)?;
        if count == 0 {
            return Ok(0);
        }
        let oldest = self.generations[self.generations.len() - count];
        while self.journal.len() > oldest.journal {
            match self.journal.pop() {
                Some(Undo::Slot { handle, old }) => self.slots[handle as usize] = old,
                Some(Undo::Cell { cell, old }) => {
                    let cell = &mut self.cells[cell as usize];
                    cell.owners = old.owners;
                    cell.frozen = old.frozen;
                    cell.live = old.live;
                    cell.born = old.born;
                }
                None => break,
            }
        }
        self.cells.truncate(oldest.cells);
        self.slots.truncate(oldest.handles);
        self.free_cells.top = oldest.free_cells;
        self.free_handles.top = oldest.free_handles;
        self.generations.truncate(self.generations.len() - count);
        for _ in 0..count {
            self.stack.rollback();
        }
        let limit = self.slots.len() as u32;
        self.zero_counts.retain(|h| h.index < limit);
        debug!(
            "heap: discarded {} generation(s) down to {:?}, {} cells remain",
            count,
            target,
            self.cells.len()
        );
        Ok(count)
    }

    /// Fold every generation newer than `target` into it, keeping effects.
    ///
    /// Returns the number of generations folded.
    pub fn squash_to(&mut self, target: GenerationId) -> Result<usize, HeapFault> {
        let count = self.newer_than(target)?;
        self.generations.truncate(self.generations.len() - count);
        for _ in 0..count {
            self.stack.commit();
        }
        if !self.journaling() {
            self.journal.clear();
            if self.reclaim_pending {
                self.rebuild_free_lists();
            }
        }
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Journaled bookkeeping
    // ---------------------------------------------------------------

    fn set_slot(&mut self, handle: u32, slot: Slot) {
        let index = handle as usize;
        if self.journaling() && index < self.current().handles {
            self.journal.push(Undo::Slot {
                handle,
                old: self.slots[index],
            });
        }
        self.slots[index] = slot;
    }

    pub(crate) fn kill_slot(&mut self, handle: u32) {
        let slot = self.slots[handle as usize];
        self.set_slot(
            handle,
            Slot {
                refs: 0,
                live: false,
                ..slot
            },
        );
        if !self.journaling() {
            self.free_handles.add(handle);
        }
    }

    pub(crate) fn recount_slot(&mut self, handle: u32, refs: u32) {
        let slot = self.slots[handle as usize];
        self.set_slot(handle, Slot { refs, ..slot });
    }

    pub(crate) fn set_cell_meta(&mut self, cell: u32, meta: CellMeta) {
        let index = cell as usize;
        if self.journaling() && index < self.current().cells {
            let old = &self.cells[index];
            self.journal.push(Undo::Cell {
                cell,
                old: CellMeta {
                    owners: old.owners,
                    frozen: old.frozen,
                    live: old.live,
                    born: old.born,
                },
            });
        }
        let target = &mut self.cells[index];
        target.owners = meta.owners;
        target.frozen = meta.frozen;
        target.live = meta.live;
        target.born = meta.born;
    }

    pub(crate) fn meta(&self, cell: u32) -> CellMeta {
        let cell = &self.cells[cell as usize];
        CellMeta {
            owners: cell.owners,
            frozen: cell.frozen,
            live: cell.live,
            born: cell.born,
        }
    }

    fn resolve(&self, handle: Handle) -> Result<Slot, HeapFault> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .copied()
            .ok_or(HeapFault::Dangling(handle.index))?;
        if !slot.live || !self.cells[slot.cell as usize].live {
            return Err(HeapFault::Reclaimed(handle.index));
        }
        Ok(slot)
    }

    /// Count one more reference to `value`
    pub fn retain(&mut self, value: &Value) {
        if let Value::Handle(h) = value {
            self.retain_handle(*h);
        }
    }

    pub(crate) fn retain_handle(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get(handle.index as usize).copied() {
            self.set_slot(
                handle.index,
                Slot {
                    refs: slot.refs + 1,
                    ..slot
                },
            );
        }
    }

    /// Drop one reference to `value`. A count reaching zero is only acted on
    /// at the next safe point.
    pub fn release(&mut self, value: &Value) {
        if let Value::Handle(h) = value {
            self.release_handle(*h);
        }
    }

    pub(crate) fn release_handle(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get(handle.index as usize).copied() {
            let refs = slot.refs.saturating_sub(1);
            self.set_slot(handle.index, Slot { refs, ..slot });
            if refs == 0 {
                self.zero_counts.push(handle);
            }
        }
    }

    // ---------------------------------------------------------------
    // Allocation and access
    // ---------------------------------------------------------------

    /// Place a fresh cell owned by the current generation, reusing a dead
    /// one when possible
    fn new_cell(&mut self, object: HeapObject) -> u32 {
        let born = self.current_generation();
        let Some(index) = self.free_cells.take() else {
            self.cells.push(Cell {
                object,
                owners: 1,
                frozen: false,
                live: true,
                born,
            });
            return (self.cells.len() - 1) as u32;
        };
        self.set_cell_meta(
            index,
            CellMeta {
                owners: 1,
                frozen: false,
                live: true,
                born,
            },
        );
        self.cells[index as usize].object = object;
        index
    }

    /// Place a fresh handle slot, reusing a dead one when possible
    fn new_slot(&mut self, cell: u32) -> u32 {
        let slot = Slot {
            cell,
            refs: 0,
            live: true,
        };
        match self.free_handles.take() {
            Some(index) => {
                self.set_slot(index, slot);
                index
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Allocate a new cell and a handle to it. The handle starts with no
    /// references; store it somewhere before the next safe point.
    pub fn allocate(&mut self, object: HeapObject) -> Handle {
        for h in object.handles() {
            self.retain_handle(h);
        }
        let kind = object.kind();
        let cell = self.new_cell(object);
        let handle = Handle::new(self.new_slot(cell), kind);
        self.zero_counts.push(handle);
        self.allocations += 1;
        handle
    }

    /// Read access
    pub fn get(&self, handle: Handle) -> Result<Ref<'_>, HeapFault> {
        let slot = self.resolve(handle)?;
        let cell = &self.cells[slot.cell as usize];
        Ok(Ref {
            object: &cell.object,
            frozen: cell.frozen,
        })
    }

    /// Write access, cloning the cell into the current generation if needed
    pub fn get_mut(&mut self, handle: Handle) -> Result<RefMut<'_>, HeapFault> {
        let slot = self.resolve(handle)?;
        let cell = &self.cells[slot.cell as usize];
        let owned = cell.born >= self.current_generation();
        let index = if owned && !cell.frozen && cell.owners == 1 {
            slot.cell
        } else {
            self.detach(handle.index, slot)
        };
        Ok(RefMut {
            object: &mut self.cells[index as usize].object,
        })
    }

    /// Clone the handle's cell into the current generation and retarget the
    /// handle to the clone. Returns the new cell index.
    fn detach(&mut self, handle: u32, slot: Slot) -> u32 {
        let old = slot.cell;
        let object = self.cells[old as usize].object.clone();
        let meta = self.meta(old);
        let shared = meta.owners > 1;
        if shared {
            // The clone adds references; a sole owner hands its references over
            for h in object.handles() {
                self.retain_handle(h);
            }
        }
        let cell = self.new_cell(object);
        self.set_slot(handle, Slot { cell, ..slot });
        self.set_cell_meta(
            old,
            CellMeta {
                owners: meta.owners - 1,
                live: shared,
                ..meta
            },
        );
        if !shared {
            self.scrub(old);
        }
        cell
    }

    /// Create a second handle sharing `handle`'s cell. Writes through either
    /// handle clone the cell first, so neither sees the other's changes.
    pub fn share(&mut self, handle: Handle) -> Result<Handle, HeapFault> {
        let slot = self.resolve(handle)?;
        let meta = self.meta(slot.cell);
        self.set_cell_meta(
            slot.cell,
            CellMeta {
                owners: meta.owners + 1,
                ..meta
            },
        );
        let copy = Handle::new(self.new_slot(slot.cell), handle.kind);
        self.zero_counts.push(copy);
        Ok(copy)
    }

    /// Mark the handle's cell frozen. Freezing is shallow: handles stored in
    /// the cell keep their own state.
    pub fn freeze(&mut self, handle: Handle) -> Result<(), HeapFault> {
        let mut slot = self.resolve(handle)?;
        if self.cells[slot.cell as usize].owners > 1 {
            let cell = self.detach(handle.index, slot);
            slot.cell = cell;
        }
        let meta = self.meta(slot.cell);
        self.set_cell_meta(
            slot.cell,
            CellMeta {
                frozen: true,
                ..meta
            },
        );
        Ok(())
    }

    pub fn is_frozen(&self, handle: Handle) -> Result<bool, HeapFault> {
        Ok(self.get(handle)?.is_frozen())
    }

    /// Run `f` against a writable cell
    fn modify<R>(
        &mut self,
        handle: Handle,
        f: impl FnOnce(&mut HeapObject) -> Result<R, HeapFault>,
    ) -> Result<R, HeapFault> {
        let mut cell = self.get_mut(handle)?;
        f(&mut cell)
    }

    // ---------------------------------------------------------------
    // Counted stores
    // ---------------------------------------------------------------

    pub fn list_push(&mut self, list: Handle, value: Value) -> Result<(), HeapFault> {
        self.retain(&value);
        self.modify(list, |obj| {
            obj.as_list_mut()?.push(value);
            Ok(())
        })
    }

    pub fn list_pop(&mut self, list: Handle) -> Result<Option<Value>, HeapFault> {
        let popped = self.modify(list, |obj| Ok(obj.as_list_mut()?.pop()))?;
        if let Some(value) = &popped {
            self.release(value);
        }
        Ok(popped)
    }

    /// Replace element `index`; `false` when out of range
    pub fn list_set(&mut self, list: Handle, index: usize, value: Value) -> Result<bool, HeapFault> {
        if index >= self.get(list)?.as_list()?.len() {
            return Ok(false);
        }
        self.retain(&value);
        let old = self.modify(list, |obj| {
            Ok(std::mem::replace(&mut obj.as_list_mut()?[index], value))
        })?;
        self.release(&old);
        Ok(true)
    }

    pub fn list_insert(&mut self, list: Handle, index: usize, value: Value) -> Result<bool, HeapFault> {
        if index > self.get(list)?.as_list()?.len() {
            return Ok(false);
        }
        self.retain(&value);
        self.modify(list, |obj| {
            obj.as_list_mut()?.insert(index, value);
            Ok(true)
        })
    }

    pub fn list_remove(&mut self, list: Handle, index: usize) -> Result<Option<Value>, HeapFault> {
        if index >= self.get(list)?.as_list()?.len() {
            return Ok(None);
        }
        let old = self.modify(list, |obj| Ok(obj.as_list_mut()?.remove(index)))?;
        self.release(&old);
        Ok(Some(old))
    }

    pub fn object_set(&mut self, object: Handle, key: Rc<str>, value: Value) -> Result<(), HeapFault> {
        self.retain(&value);
        let old = self.modify(object, |obj| Ok(obj.as_object_mut()?.insert(key, value)))?;
        if let Some(old) = old {
            self.release(&old);
        }
        Ok(())
    }

    pub fn map_insert(&mut self, map: Handle, key: MapKey, value: Value) -> Result<(), HeapFault> {
        self.retain(&value);
        let (old, fresh) = self.modify(map, |obj| {
            let entries = obj.as_map_mut()?;
            let fresh = !entries.contains_key(&key);
            Ok((entries.insert(key.clone(), value), fresh))
        })?;
        if fresh {
            self.retain(&Value::from(&key));
        }
        if let Some(old) = old {
            self.release(&old);
        }
        Ok(())
    }

    pub fn map_remove(&mut self, map: Handle, key: &MapKey) -> Result<Option<Value>, HeapFault> {
        if !self.get(map)?.as_map()?.contains_key(key) {
            return Ok(None);
        }
        let old = self.modify(map, |obj| Ok(obj.as_map_mut()?.remove(key)))?;
        self.release(&Value::from(key));
        if let Some(old) = &old {
            self.release(old);
        }
        Ok(old)
    }

    /// Insert into a set; `false` if already present
    pub fn set_insert(&mut self, set: Handle, key: MapKey) -> Result<bool, HeapFault> {
        if self.get(set)?.as_set()?.contains(&key) {
            return Ok(false);
        }
        self.retain(&Value::from(&key));
        self.modify(set, |obj| Ok(obj.as_set_mut()?.insert(key)))
    }

    pub fn set_remove(&mut self, set: Handle, key: &MapKey) -> Result<bool, HeapFault> {
        if !self.get(set)?.as_set()?.contains(key) {
            return Ok(false);
        }
        self.modify(set, |obj| Ok(obj.as_set_mut()?.remove(key)))?;
        self.release(&Value::from(key));
        Ok(true)
    }

    /// Bind `name` in this scope, shadowing any outer binding
    pub fn scope_define(&mut self, scope: Handle, name: Rc<str>, value: Value) -> Result<(), HeapFault> {
        self.retain(&value);
        let old = self.modify(scope, |obj| Ok(obj.as_scope_mut()?.vars.insert(name, value)))?;
        if let Some(old) = old {
            self.release(&old);
        }
        Ok(())
    }

    /// Find the scope in the chain that binds `name`
    pub fn scope_owner(&self, scope: Handle, name: &str) -> Result<Option<Handle>, HeapFault> {
        let mut current = Some(scope);
        while let Some(handle) = current {
            let obj = self.get(handle)?;
            let scope = obj.as_scope()?;
            if scope.vars.contains_key(name) {
                return Ok(Some(handle));
            }
            current = scope.parent;
        }
        Ok(None)
    }

    pub fn scope_lookup(&self, scope: Handle, name: &str) -> Result<Option<Value>, HeapFault> {
        match self.scope_owner(scope, name)? {
            Some(owner) => Ok(self.get(owner)?.as_scope()?.vars.get(name).cloned()),
            None => Ok(None),
        }
    }

    /// Rebind an existing variable; `false` if no scope in the chain binds it
    pub fn scope_assign(&mut self, scope: Handle, name: &str, value: Value) -> Result<bool, HeapFault> {
        match self.scope_owner(scope, name)? {
            Some(owner) => {
                self.scope_define(owner, Rc::from(name), value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Append `child` to `parent`'s children and point it back at `parent`
    pub fn node_attach(&mut self, parent: Handle, child: Handle) -> Result<(), HeapFault> {
        self.retain_handle(child);
        self.modify(parent, |obj| {
            obj.as_node_mut()?.children.push(child);
            Ok(())
        })?;
        self.retain_handle(parent);
        let old = self.modify(child, |obj| Ok(obj.as_node_mut()?.parent.replace(parent)))?;
        if let Some(old) = old {
            self.release_handle(old);
        }
        Ok(())
    }

    pub fn node_set_prop(&mut self, node: Handle, key: Rc<str>, value: Value) -> Result<(), HeapFault> {
        self.retain(&value);
        let old = self.modify(node, |obj| Ok(obj.as_node_mut()?.props.insert(key, value)))?;
        if let Some(old) = old {
            self.release(&old);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Root stack
    // ---------------------------------------------------------------

    pub fn push(&mut self, value: Value) {
        self.retain(&value);
        self.stack.push(StackSlot::anonymous(value));
    }

    pub fn pop(&mut self) -> Result<Value, HeapFault> {
        let slot = self.stack.pop().ok_or(HeapFault::StackUnderflow)?;
        self.release(&slot.value);
        Ok(slot.value)
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack.peek()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_values(&self) -> impl Iterator<Item = &Value> {
        self.stack.values()
    }

    /// Pop until the stack holds `len` slots
    pub fn truncate_stack(&mut self, len: usize) -> Result<(), HeapFault> {
        while self.stack.len() > len {
            self.pop()?;
        }
        Ok(())
    }

    /// Push a named register
    pub fn push_named(&mut self, name: &str, value: Value) {
        self.retain(&value);
        self.stack.push(StackSlot::named(name, value));
    }

    /// Value of the newest register called `name`
    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        let index = self.stack.find(name)?;
        self.stack.get(index).map(|slot| slot.value.clone())
    }

    /// Overwrite the newest register called `name`; `false` if absent
    pub fn set_named(&mut self, name: &str, value: Value) -> bool {
        let Some(index) = self.stack.find(name) else {
            return false;
        };
        self.retain(&value);
        if let Some(old) = self.stack.set(index, StackSlot::named(name, value)) {
            self.release(&old.value);
        }
        true
    }

    /// Rename the newest register called `from`; `false` if absent
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        let Some(index) = self.stack.find(from) else {
            return false;
        };
        match self.stack.get(index).cloned() {
            Some(slot) => {
                self.stack.set(index, StackSlot::named(to, slot.value));
                true
            }
            None => false,
        }
    }

    /// Remove the newest register called `name` and return its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.stack.find(name)?;
        let slot = self.stack.remove(index)?;
        self.release(&slot.value);
        Some(slot.value)
    }

    // ---------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            generations: self.generations.len(),
            cells: self.cells.len(),
            live_cells: self.cells.iter().filter(|c| c.live).count(),
            handles: self.slots.len(),
            live_handles: self.slots.iter().filter(|s| s.live).count(),
            journal_len: self.journal.len() + self.stack.journal_len(),
            stack_len: self.stack.len(),
            free: self.free_cells.len() + self.free_handles.len(),
        }
    }

    /// Reference count of a handle
    pub fn ref_count(&self, handle: Handle) -> Option<u32> {
        self.slots.get(handle.index as usize).map(|s| s.refs)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Allocations since the last spatial collection
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(heap: &mut Heap, items: Vec<Value>) -> Handle {
        let h = heap.allocate(HeapObject::List(items));
        heap.push(Value::Handle(h));
        h
    }

    fn items(heap: &Heap, h: Handle) -> Vec<Value> {
        heap.get(h).unwrap().as_list().unwrap().clone()
    }

    #[test]
    fn fork_then_discard_is_a_no_op() {
        let mut heap = Heap::new();
        let h = list(&mut heap, vec![Value::Int(1)]);
        let before = heap.stats();

        let g = heap.fork();
        heap.discard_to(GenerationId(0)).unwrap();

        assert_eq!(heap.stats(), before);
        assert_eq!(items(&heap, h), vec![Value::Int(1)]);
        assert!(g > GenerationId(0));
    }

    #[test]
    fn write_in_child_generation_is_undone() {
        let mut heap = Heap::new();
        let h = list(&mut heap, vec![Value::Int(1)]);
        let root = heap.current_generation();

        heap.fork();
        heap.list_push(h, Value::Int(2)).unwrap();
        assert_eq!(items(&heap, h), vec![Value::Int(1), Value::Int(2)]);

        heap.discard_to(root).unwrap();
        assert_eq!(items(&heap, h), vec![Value::Int(1)]);
    }

    #[test]
    fn allocations_inside_failed_checkpoint_are_truncated() {
        let mut heap = Heap::new();
        list(&mut heap, vec![]);
        let before = heap.stats();
        let root = heap.current_generation();

        heap.fork();
        for i in 0..10 {
            list(&mut heap, vec![Value::Int(i)]);
        }
        heap.discard_to(root).unwrap();

        let after = heap.stats();
        assert_eq!(after.generations, before.generations);
        assert_eq!(after.cells, before.cells);
        assert_eq!(after.stack_len, before.stack_len);
    }

    #[test]
    fn squash_keeps_effects_and_clears_journal() {
        let mut heap = Heap::new();
        let h = list(&mut heap, vec![]);
        let root = heap.current_generation();

        heap.fork();
        heap.list_push(h, Value::Int(7)).unwrap();
        heap.squash_to(root).unwrap();

        assert_eq!(items(&heap, h), vec![Value::Int(7)]);
        assert_eq!(heap.stats().journal_len, 0);
        assert_eq!(heap.generation_count(), 1);
    }

    #[test]
    fn discarding_unknown_generation_is_a_fault() {
        let mut heap = Heap::new();
        assert_eq!(
            heap.discard_to(GenerationId(42)),
            Err(HeapFault::UnknownGeneration(42))
        );
    }

    #[test]
    fn handles_from_discarded_generations_dangle() {
        let mut heap = Heap::new();
        let root = heap.current_generation();
        heap.fork();
        let h = list(&mut heap, vec![]);
        heap.discard_to(root).unwrap();
        assert!(matches!(heap.get(h), Err(HeapFault::Dangling(_))));
    }

    #[test]
    fn shared_cells_copy_on_write() {
        let mut heap = Heap::new();
        let a = list(&mut heap, vec![Value::Int(1)]);
        let b = heap.share(a).unwrap();
        heap.push(Value::Handle(b));

        heap.list_push(b, Value::Int(2)).unwrap();
        assert_eq!(items(&heap, a), vec![Value::Int(1)]);
        assert_eq!(items(&heap, b), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn frozen_cell_is_never_written_in_place() {
        let mut heap = Heap::new();
        let a = list(&mut heap, vec![]);
        heap.freeze(a).unwrap();
        let old_cell = heap.slots[a.index as usize].cell;

        heap.list_push(a, Value::Int(1)).unwrap();

        let new_cell = heap.slots[a.index as usize].cell;
        assert_ne!(old_cell, new_cell);
        // The handle was the only owner, so the frozen original is reclaimed
        assert!(!heap.cells[old_cell as usize].live);
        assert!(!heap.is_frozen(a).unwrap());
    }

    #[test]
    fn dead_entries_are_reused_in_the_root_generation() {
        let mut heap = Heap::new();
        list(&mut heap, vec![]);
        for _ in 0..50 {
            heap.allocate(HeapObject::List(vec![Value::Int(1)]));
            heap.collect_zero_counts();
        }
        let stats = heap.stats();
        assert_eq!(stats.cells, 2);
        assert_eq!(stats.handles, 2);
        assert_eq!(stats.live_cells, 1);
    }

    #[test]
    fn reuse_inside_a_generation_is_undone_by_rollback() {
        let mut heap = Heap::new();
        let kept = list(&mut heap, vec![]);
        let dropped = heap.allocate(HeapObject::List(vec![Value::Int(1)]));
        heap.collect_zero_counts();
        let before = heap.stats();
        assert_eq!(before.free, 2);
        let root = heap.current_generation();

        heap.fork();
        let reused = list(&mut heap, vec![Value::Int(2)]);
        assert_eq!(reused.index, dropped.index);
        heap.list_push(reused, Value::Int(3)).unwrap();
        assert_eq!(heap.stats().cells, before.cells);
        heap.list_push(kept, Value::Handle(reused)).unwrap();

        heap.discard_to(root).unwrap();
        assert_eq!(heap.stats(), before);
        assert!(!heap.is_live(reused));
        assert_eq!(items(&heap, kept), vec![]);
    }

    #[test]
    fn squash_reuses_cells_in_place() {
        let mut heap = Heap::new();
        list(&mut heap, vec![]);
        heap.allocate(HeapObject::List(vec![]));
        heap.collect_zero_counts();
        let root = heap.current_generation();

        heap.fork();
        let h = list(&mut heap, vec![]);
        heap.list_push(h, Value::Int(1)).unwrap();
        heap.squash_to(root).unwrap();

        assert_eq!(items(&heap, h), vec![Value::Int(1)]);
        assert_eq!(heap.stats().cells, 2);
    }

    #[test]
    fn rollback_finds_generations_from_the_top() {
        let mut heap = Heap::new();
        let root = heap.current_generation();
        let ids: Vec<GenerationId> = (0..100).map(|_| heap.fork()).collect();
        assert_eq!(heap.newer_than(ids[98]), Ok(1));
        assert_eq!(heap.discard_to(ids[49]), Ok(50));
        assert_eq!(heap.discard_to(ids[60]), Err(HeapFault::UnknownGeneration(ids[60].0)));
        assert_eq!(heap.squash_to(root), Ok(50));
        assert_eq!(heap.generation_count(), 1);
    }

    #[test]
    fn registers_participate_in_rollback() {
        let mut heap = Heap::new();
        heap.push_named("$result", Value::Int(1));
        let root = heap.current_generation();

        heap.fork();
        heap.set_named("$result", Value::Int(2));
        heap.rename("$result", "$old");
        heap.push_named("$node", Value::Nil);
        assert_eq!(heap.get_by_name("$old"), Some(Value::Int(2)));

        heap.discard_to(root).unwrap();
        assert_eq!(heap.get_by_name("$result"), Some(Value::Int(1)));
        assert_eq!(heap.get_by_name("$node"), None);
    }

    #[test]
    fn counts_follow_stores() {
        let mut heap = Heap::new();
        let outer = list(&mut heap, vec![]);
        let inner = heap.allocate(HeapObject::List(vec![]));
        heap.list_push(outer, Value::Handle(inner)).unwrap();
        heap.list_push(outer, Value::Handle(inner)).unwrap();
        assert_eq!(heap.ref_count(inner), Some(2));

        heap.list_pop(outer).unwrap();
        assert_eq!(heap.ref_count(inner), Some(1));
    }
}
