//! Root stack
//!
//! The value stack is the heap's root set: every value an in-flight expression
//! is holding lives here. Slots may carry a name, which turns them into
//! *registers* the engine uses to pass intermediate results across suspension
//! points (`$node`, `$filtered`, `$result`).
//!
//! The stack is [`Journaled`], so it forks and rolls back in lockstep with the
//! heap generations. Reference counting is the heap's job; this type only
//! stores slots.

use super::journal::Journaled;
use super::value::Value;
use std::rc::Rc;

/// A value slot, optionally named
#[derive(Debug, Clone, PartialEq)]
pub struct StackSlot {
    pub name: Option<Rc<str>>,
    pub value: Value,
}

impl StackSlot {
    pub fn anonymous(value: Value) -> Self {
        StackSlot { name: None, value }
    }

    pub fn named(name: &str, value: Value) -> Self {
        StackSlot {
            name: Some(Rc::from(name)),
            value,
        }
    }
}

/// The journaled value stack
#[derive(Debug, Clone, Default)]
pub struct Stack {
    slots: Journaled<StackSlot>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            slots: Journaled::new(),
        }
    }

    pub fn push(&mut self, slot: StackSlot) {
        self.slots.push(slot);
    }

    pub fn pop(&mut self) -> Option<StackSlot> {
        self.slots.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.slots.last().map(|slot| &slot.value)
    }

    pub fn get(&self, index: usize) -> Option<&StackSlot> {
        self.slots.get(index)
    }

    pub fn set(&mut self, index: usize, slot: StackSlot) -> Option<StackSlot> {
        self.slots.set(index, slot)
    }

    pub fn remove(&mut self, index: usize) -> Option<StackSlot> {
        self.slots.remove(index)
    }

    /// Index of the newest slot carrying `name`
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .rposition(|slot| slot.name.as_deref() == Some(name))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackSlot> {
        self.slots.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.slots.iter().map(|slot| &slot.value)
    }

    pub(crate) fn begin(&mut self) {
        self.slots.begin();
    }

    pub(crate) fn rollback(&mut self) {
        self.slots.rollback();
    }

    pub(crate) fn commit(&mut self) {
        self.slots.commit();
    }

    pub fn journal_len(&self) -> usize {
        self.slots.journal_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_resolve_to_the_newest_slot() {
        let mut stack = Stack::new();
        stack.push(StackSlot::named("$node", Value::Int(1)));
        stack.push(StackSlot::anonymous(Value::Int(2)));
        stack.push(StackSlot::named("$node", Value::Int(3)));

        let index = stack.find("$node");
        assert_eq!(index, Some(2));
        assert_eq!(stack.find("$missing"), None);
    }

    #[test]
    fn rollback_restores_named_slots() {
        let mut stack = Stack::new();
        stack.push(StackSlot::named("$result", Value::Int(1)));
        stack.begin();
        stack.set(0, StackSlot::named("$result", Value::Int(2)));
        stack.pop();
        stack.rollback();
        assert_eq!(stack.peek(), Some(&Value::Int(1)));
    }
}
