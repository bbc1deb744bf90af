//! Journaled vectors
//!
//! A [`Journaled`] vector records enough undo information to roll back to any
//! open mark. Marks nest: `begin` opens one, `rollback` undoes everything
//! since the newest mark, `commit` folds the newest mark into its parent.
//!
//! Writes to slots that were pushed after the newest mark are not journaled;
//! those slots disappear on rollback anyway. The `floor` of a mark tracks the
//! lowest index that existed when the mark was opened and has not since been
//! popped or shifted.

#[derive(Debug, Clone)]
enum Edit<T> {
    Pushed,
    Popped(T),
    Set(usize, T),
    Inserted(usize),
    Removed(usize, T),
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    undo: usize,
    floor: usize,
}

/// A vector whose edits can be undone back to a mark
#[derive(Debug, Clone)]
pub struct Journaled<T: Clone> {
    items: Vec<T>,
    undo: Vec<Edit<T>>,
    marks: Vec<Mark>,
}

impl<T: Clone> Default for Journaled<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Journaled<T> {
    pub fn new() -> Self {
        Journaled {
            items: Vec::new(),
            undo: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Number of open marks
    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// Number of pending undo entries
    pub fn journal_len(&self) -> usize {
        self.undo.len()
    }

    pub fn begin(&mut self) {
        self.marks.push(Mark {
            undo: self.undo.len(),
            floor: self.items.len(),
        });
    }

    /// Undo every edit since the newest mark and close it
    pub fn rollback(&mut self) {
        let Some(mark) = self.marks.pop() else {
            return;
        };
        while self.undo.len() > mark.undo {
            match self.undo.pop() {
                Some(Edit::Pushed) => {
                    self.items.pop();
                }
                Some(Edit::Popped(item)) => self.items.push(item),
                Some(Edit::Set(index, old)) => self.items[index] = old,
                Some(Edit::Inserted(index)) => {
                    self.items.remove(index);
                }
                Some(Edit::Removed(index, item)) => self.items.insert(index, item),
                None => break,
            }
        }
    }

    /// Close the newest mark, keeping its edits
    pub fn commit(&mut self) {
        let Some(mark) = self.marks.pop() else {
            return;
        };
        match self.marks.last_mut() {
            Some(parent) => parent.floor = parent.floor.min(mark.floor),
            None => self.undo.clear(),
        }
    }

    fn journaling(&self) -> bool {
        !self.marks.is_empty()
    }

    fn lower_floor(&mut self, index: usize) {
        if let Some(mark) = self.marks.last_mut() {
            mark.floor = mark.floor.min(index);
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        if self.journaling() {
            self.undo.push(Edit::Pushed);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = self.items.pop()?;
        if self.journaling() {
            let len = self.items.len();
            self.lower_floor(len);
            self.undo.push(Edit::Popped(item.clone()));
        }
        Some(item)
    }

    /// Replace the item at `index`, returning the previous one
    pub fn set(&mut self, index: usize, item: T) -> Option<T> {
        let slot = self.items.get_mut(index)?;
        let old = std::mem::replace(slot, item);
        if let Some(mark) = self.marks.last() {
            if index < mark.floor {
                self.undo.push(Edit::Set(index, old.clone()));
            }
        }
        Some(old)
    }

    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        if self.journaling() {
            self.lower_floor(index);
            self.undo.push(Edit::Inserted(index));
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        if self.journaling() {
            self.lower_floor(index);
            self.undo.push(Edit::Removed(index, item.clone()));
        }
        Some(item)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_every_edit_kind() {
        let mut stack: Journaled<i32> = Journaled::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);

        stack.begin();
        stack.set(0, 10);
        stack.pop();
        stack.push(4);
        stack.set(2, 40);
        stack.insert(1, 99);
        stack.remove(0);
        stack.rollback();

        assert_eq!(stack.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn commit_folds_into_parent_mark() {
        let mut stack: Journaled<i32> = Journaled::new();
        stack.push(1);
        stack.begin();
        stack.push(2);
        stack.begin();
        stack.pop();
        stack.pop();
        stack.commit();
        stack.push(7);
        stack.set(0, 8);
        stack.rollback();
        assert_eq!(stack.as_slice(), &[1]);
        assert_eq!(stack.journal_len(), 0);
    }

    #[test]
    fn no_journal_without_marks() {
        let mut stack: Journaled<i32> = Journaled::new();
        stack.push(1);
        stack.set(0, 2);
        stack.pop();
        assert_eq!(stack.journal_len(), 0);
    }
}
