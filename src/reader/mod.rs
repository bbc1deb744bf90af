//! Input readers
//!
//! A match runs against a reader pushed on the engine's reader stack:
//! - [`Reader::Units`] walks a text (one unit per `char`) or binary (one unit
//!   per byte) [`Input`]
//! - [`Reader::Tree`] walks the children of a capture node, for filters
//!
//! A [`Cursor`] is the pair (reader depth, position). Choice points save one
//! and restore it on backtracking.

use crate::memory::value::Handle;
use std::rc::Rc;

/// Matchable input, stored as units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    units: Vec<u32>,
    binary: bool,
}

impl Input {
    pub fn from_text(text: &str) -> Self {
        Input {
            units: text.chars().map(u32::from).collect(),
            binary: false,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Input {
            units: bytes.iter().map(|&b| u32::from(b)).collect(),
            binary: true,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn unit(&self, index: usize) -> Option<u32> {
        self.units.get(index).copied()
    }

    pub fn units(&self) -> &[u32] {
        &self.units
    }

    /// Units `from..to` rendered as text. Bytes map to the first 256 code
    /// points.
    pub fn text(&self, from: usize, to: usize) -> String {
        let to = to.min(self.units.len());
        let from = from.min(to);
        self.units[from..to]
            .iter()
            .filter_map(|&u| char::from_u32(u))
            .collect()
    }
}

/// A position on the reader stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub depth: usize,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reader {
    Units { input: Rc<Input>, pos: usize },
    /// Children of `parent`; `len` is fixed when the reader is pushed
    Tree { parent: Handle, pos: usize, len: usize },
}

impl Reader {
    pub fn pos(&self) -> usize {
        match self {
            Reader::Units { pos, .. } | Reader::Tree { pos, .. } => *pos,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Reader::Units { input, .. } => input.len(),
            Reader::Tree { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_pos(&mut self, to: usize) {
        match self {
            Reader::Units { pos, .. } | Reader::Tree { pos, .. } => *pos = to,
        }
    }

    pub fn at_end(&self, reverse: bool) -> bool {
        if reverse {
            self.pos() == 0
        } else {
            self.pos() >= self.len()
        }
    }

    /// The `count` units after the cursor, or before it when `reverse`
    pub fn peek_units(&self, count: usize, reverse: bool) -> Option<&[u32]> {
        let Reader::Units { input, pos } = self else {
            return None;
        };
        let units = input.units();
        if reverse {
            let start = pos.checked_sub(count)?;
            units.get(start..*pos)
        } else {
            units.get(*pos..pos.checked_add(count)?)
        }
    }

    /// Move the cursor `count` units in the matching direction
    pub fn advance(&mut self, count: usize, reverse: bool) {
        let pos = self.pos();
        let to = if reverse {
            pos.saturating_sub(count)
        } else {
            (pos + count).min(self.len())
        };
        self.set_pos(to);
    }

    pub fn input(&self) -> Option<Rc<Input>> {
        match self {
            Reader::Units { input, .. } => Some(input.clone()),
            Reader::Tree { .. } => None,
        }
    }

    pub fn tree_parent(&self) -> Option<Handle> {
        match self {
            Reader::Tree { parent, .. } => Some(*parent),
            Reader::Units { .. } => None,
        }
    }
}

/// The reader stack
#[derive(Debug, Clone, Default)]
pub struct Readers {
    stack: Vec<Reader>,
}

impl Readers {
    pub fn new() -> Self {
        Readers { stack: Vec::new() }
    }

    pub fn push(&mut self, reader: Reader) {
        self.stack.push(reader);
    }

    pub fn pop(&mut self) -> Option<Reader> {
        self.stack.pop()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&Reader> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Reader> {
        self.stack.last_mut()
    }

    pub fn save(&self) -> Cursor {
        Cursor {
            depth: self.stack.len(),
            pos: self.top().map_or(0, Reader::pos),
        }
    }

    /// Drop readers above the cursor's depth and restore its position
    pub fn restore(&mut self, cursor: Cursor) {
        self.stack.truncate(cursor.depth);
        if let Some(top) = self.stack.last_mut() {
            top.set_pos(cursor.pos);
        }
    }

    /// Tree parents, for the collector's root set
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.stack.iter().filter_map(Reader::tree_parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_reads_look_behind_the_cursor() {
        let input = Rc::new(Input::from_text("abcd"));
        let reader = Reader::Units { input, pos: 3 };
        let expected: Vec<u32> = "bc".chars().map(u32::from).collect();
        assert_eq!(reader.peek_units(2, true), Some(expected.as_slice()));
        assert_eq!(reader.peek_units(4, true), None);
    }

    #[test]
    fn restore_truncates_nested_readers() {
        let mut readers = Readers::new();
        readers.push(Reader::Units {
            input: Rc::new(Input::from_text("xyz")),
            pos: 1,
        });
        let saved = readers.save();
        readers.top_mut().unwrap().advance(2, false);
        readers.push(Reader::Units {
            input: Rc::new(Input::from_bytes(&[1, 2])),
            pos: 0,
        });

        readers.restore(saved);
        assert_eq!(readers.depth(), 1);
        assert_eq!(readers.save().pos, 1);
    }

    #[test]
    fn binary_text_maps_bytes_to_latin1() {
        let input = Input::from_bytes(b"PNG");
        assert!(input.is_binary());
        assert_eq!(input.text(0, 3), "PNG");
    }
}
