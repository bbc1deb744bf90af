//! Garbage collection
//!
//! Two passes share the heap's bookkeeping:
//! - [`Heap::collect_zero_counts`] processes the deferred zero-count table.
//!   It runs at safe points, where every live value is reachable from a
//!   counted root, so a handle with no references is garbage.
//! - [`Heap::collect_spatial`] is a mark-sweep over the current roots. It
//!   reclaims cycles (a capture node and its parent reference each other) and
//!   rebuilds every count from scratch.
//!
//! Both passes journal their changes to cells older than the current
//! generation, so a later rollback resurrects whatever they reclaimed.
//! Only the root generation hands dead entries to the free lists; a
//! spatial pass inside a child generation defers that until the chain is
//! squashed back to the root.

use super::heap::{CellMeta, Heap, HeapObject};
use super::value::{Handle, Value};
use log::debug;

/// Outcome of a spatial collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub marked: usize,
    pub freed_handles: usize,
    pub freed_cells: usize,
}

impl Heap {
    /// Release every handle whose count is zero, cascading into the objects
    /// they kept alive. Returns the number of handles released.
    pub fn collect_zero_counts(&mut self) -> usize {
        let mut released = 0;
        while let Some(handle) = self.zero_counts.pop() {
            let Some(slot) = self.slots.get(handle.index as usize).copied() else {
                continue;
            };
            if !slot.live || slot.refs > 0 {
                continue;
            }
            self.kill_slot(handle.index);
            released += 1;

            let meta = self.meta(slot.cell);
            if !meta.live {
                continue;
            }
            let owners = meta.owners.saturating_sub(1);
            self.set_cell_meta(
                slot.cell,
                CellMeta {
                    owners,
                    live: owners > 0,
                    ..meta
                },
            );
            if owners == 0 {
                let mut children = Vec::new();
                self.cells[slot.cell as usize]
                    .object
                    .collect_handles(&mut children);
                for child in children {
                    self.release_handle(child);
                }
                self.scrub(slot.cell);
            }
        }
        released
    }

    /// Mark everything reachable from the root stack and `roots`, free the
    /// rest and recompute reference and owner counts.
    ///
    /// `roots` lists the references held outside the heap (frames, readers),
    /// one entry per reference.
    pub fn collect_spatial(&mut self, roots: &[Handle]) -> GcStats {
        let mut marked = vec![false; self.slots.len()];
        let mut refs = vec![0u32; self.slots.len()];
        let mut work: Vec<Handle> = Vec::new();

        let stack_roots: Vec<Handle> = self
            .stack_values()
            .filter_map(Value::as_handle)
            .collect();
        for handle in stack_roots.iter().chain(roots) {
            if let Some(count) = refs.get_mut(handle.index as usize) {
                *count += 1;
                work.push(*handle);
            }
        }

        let mut marked_cells = vec![false; self.cells.len()];
        let mut children = Vec::new();
        while let Some(handle) = work.pop() {
            let index = handle.index as usize;
            if index >= marked.len() || marked[index] || !self.slots[index].live {
                continue;
            }
            marked[index] = true;
            let cell = self.slots[index].cell as usize;
            if marked_cells[cell] || !self.cells[cell].live {
                continue;
            }
            marked_cells[cell] = true;
            children.clear();
            self.cells[cell].object.collect_handles(&mut children);
            for child in &children {
                if let Some(count) = refs.get_mut(child.index as usize) {
                    *count += 1;
                }
            }
            work.extend(children.iter().copied());
        }

        let mut stats = GcStats {
            marked: marked.iter().filter(|m| **m).count(),
            ..GcStats::default()
        };

        let mut owners = vec![0u32; self.cells.len()];
        for index in 0..self.slots.len() {
            let slot = self.slots[index];
            if !slot.live {
                continue;
            }
            if marked[index] {
                owners[slot.cell as usize] += 1;
                if slot.refs != refs[index] {
                    self.recount_slot(index as u32, refs[index]);
                }
            } else {
                self.kill_slot(index as u32);
                stats.freed_handles += 1;
            }
        }

        for cell in 0..self.cells.len() {
            let meta = self.meta(cell as u32);
            if !meta.live {
                continue;
            }
            if marked_cells[cell] {
                if meta.owners != owners[cell] {
                    self.set_cell_meta(
                        cell as u32,
                        CellMeta {
                            owners: owners[cell],
                            ..meta
                        },
                    );
                }
            } else {
                self.set_cell_meta(
                    cell as u32,
                    CellMeta {
                        owners: 0,
                        live: false,
                        ..meta
                    },
                );
                self.scrub(cell as u32);
                stats.freed_cells += 1;
            }
        }

        self.zero_counts.clear();
        self.allocations = 0;
        if self.journaling() {
            self.reclaim_pending = true;
        } else {
            self.rebuild_free_lists();
        }
        debug!(
            "gc: marked {} handle(s), freed {} handle(s) and {} cell(s)",
            stats.marked, stats.freed_handles, stats.freed_cells
        );
        stats
    }

    /// Drop a dead cell's storage and offer it for reuse once no open
    /// generation can restore it
    pub(crate) fn scrub(&mut self, cell: u32) {
        if !self.journaling() {
            self.cells[cell as usize].object = HeapObject::Reclaimed;
            self.free_cells.add(cell);
        }
    }

    /// Trim dead entries off the end of both tables and list the remaining
    /// dead ones for reuse. Root generation only.
    pub(crate) fn rebuild_free_lists(&mut self) {
        let mut pinned = vec![false; self.cells.len()];
        for slot in self.slots.iter().filter(|s| s.live) {
            pinned[slot.cell as usize] = true;
        }
        while self.slots.last().is_some_and(|s| !s.live) {
            self.slots.pop();
        }
        while let Some(last) = self.cells.len().checked_sub(1) {
            if self.cells[last].live || pinned[last] {
                break;
            }
            self.cells.pop();
        }

        self.free_handles.clear();
        for index in 0..self.slots.len() {
            if !self.slots[index].live {
                self.free_handles.add(index as u32);
            }
        }
        self.free_cells.clear();
        for index in 0..self.cells.len() {
            if !self.cells[index].live && !pinned[index] {
                self.cells[index].object = HeapObject::Reclaimed;
                self.free_cells.add(index as u32);
            }
        }

        let limit = self.slots.len() as u32;
        self.zero_counts.retain(|h| h.index < limit);
        self.reclaim_pending = false;
        debug!(
            "gc: {} cell(s) and {} handle(s) after trimming, {} free",
            self.cells.len(),
            self.slots.len(),
            self.free_cells.len() + self.free_handles.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::heap::{CaptureNode, HeapObject};
    use std::rc::Rc;

    fn node(heap: &mut Heap, name: &str) -> Handle {
        heap.allocate(HeapObject::Node(CaptureNode::new(Rc::from(name), 0, None)))
    }

    #[test]
    fn unreferenced_allocations_are_released_at_safe_points() {
        let mut heap = Heap::new();
        let kept = heap.allocate(HeapObject::List(vec![]));
        heap.push(Value::Handle(kept));
        let dropped = heap.allocate(HeapObject::List(vec![]));

        heap.collect_zero_counts();

        assert!(heap.is_live(kept));
        assert!(!heap.is_live(dropped));
    }

    #[test]
    fn releasing_a_container_cascades() {
        let mut heap = Heap::new();
        let inner = heap.allocate(HeapObject::List(vec![]));
        let outer = heap.allocate(HeapObject::List(vec![Value::Handle(inner)]));
        heap.push(Value::Handle(outer));
        heap.collect_zero_counts();
        assert!(heap.is_live(inner));

        heap.pop().unwrap();
        heap.collect_zero_counts();
        assert!(!heap.is_live(outer));
        assert!(!heap.is_live(inner));
    }

    #[test]
    fn spatial_pass_reclaims_capture_cycles() {
        let mut heap = Heap::new();
        let parent = node(&mut heap, "parent");
        let child = node(&mut heap, "child");
        heap.node_attach(parent, child).unwrap();
        heap.push(Value::Handle(parent));
        heap.collect_zero_counts();

        heap.pop().unwrap();
        // The cycle keeps both counts above zero
        heap.collect_zero_counts();
        assert!(heap.is_live(parent));

        let stats = heap.collect_spatial(&[]);
        assert_eq!(stats.freed_handles, 2);
        assert!(!heap.is_live(parent));
        assert!(!heap.is_live(child));
    }

    #[test]
    fn spatial_pass_keeps_extra_roots() {
        let mut heap = Heap::new();
        let scope = heap.allocate(HeapObject::Context(Default::default()));
        heap.retain_handle(scope);

        let stats = heap.collect_spatial(&[scope]);
        assert_eq!(stats.freed_handles, 0);
        assert_eq!(heap.ref_count(scope), Some(1));
    }

    #[test]
    fn collection_inside_a_generation_is_undone_by_rollback() {
        let mut heap = Heap::new();
        let h = heap.allocate(HeapObject::List(vec![Value::Int(1)]));
        heap.push(Value::Handle(h));
        heap.collect_zero_counts();
        let root = heap.current_generation();

        heap.fork();
        heap.pop().unwrap();
        heap.collect_spatial(&[]);
        assert!(!heap.is_live(h));

        heap.discard_to(root).unwrap();
        assert!(heap.is_live(h));
        assert_eq!(heap.ref_count(h), Some(1));
    }
}
