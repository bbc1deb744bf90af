//! Runtime value representation
//!
//! This module defines the [`Value`] enum, the closed set of values the
//! interpreter manipulates. Primitives are stored inline and compared by value;
//! everything else lives in the [`Heap`](super::heap::Heap) and is reached
//! through a [`Handle`] that compares by identity.
//!
//! # Value Types
//!
//! - [`Value::Nil`], [`Value::Bool`], [`Value::Int`], [`Value::Float`]
//! - [`Value::Str`]: immutable, reference-counted string
//! - [`Value::Bits`]: immutable bit-list
//! - [`Value::Handle`]: object, list, map, set, function, capture node,
//!   context, pattern-union, quantifier or argument vector

use std::fmt;
use std::rc::Rc;

/// Heap value kinds reachable through a [`Handle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    Object,
    List,
    Map,
    Set,
    Function,
    Node,
    Context,
    PatternUnion,
    Quantifier,
    Arguments,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Object => "object",
            HandleKind::List => "list",
            HandleKind::Map => "map",
            HandleKind::Set => "set",
            HandleKind::Function => "function",
            HandleKind::Node => "node",
            HandleKind::Context => "context",
            HandleKind::PatternUnion => "pattern-union",
            HandleKind::Quantifier => "quantifier",
            HandleKind::Arguments => "arguments",
        };
        f.write_str(name)
    }
}

/// Non-owning reference to a heap cell.
///
/// A handle is an index into the heap's handle table. It stays valid for as
/// long as the generation that created it has not been discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub(crate) index: u32,
    pub(crate) kind: HandleKind,
}

impl Handle {
    pub(crate) fn new(index: u32, kind: HandleKind) -> Self {
        Handle { index, kind }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

/// Immutable list of bits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitList {
    bits: Rc<[bool]>,
}

impl BitList {
    pub fn new(bits: Vec<bool>) -> Self {
        BitList { bits: bits.into() }
    }

    /// Parse a string of `0` and `1` characters
    pub fn parse(text: &str) -> Option<Self> {
        text.chars()
            .map(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(BitList::new)
    }

    /// Build a bit-list of `width` bits from the low bits of `value`, most
    /// significant bit first
    pub fn from_int(value: i64, width: usize) -> Self {
        let width = width.min(64);
        let bits = (0..width)
            .rev()
            .map(|i| (value >> i) & 1 == 1)
            .collect();
        BitList::new(bits)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    /// Interpret the bits as an unsigned integer (most significant first)
    pub fn to_int(&self) -> i64 {
        self.bits
            .iter()
            .fold(0i64, |acc, &b| (acc << 1) | i64::from(b))
    }

    pub fn concat(&self, other: &BitList) -> BitList {
        let mut bits = self.bits.to_vec();
        bits.extend_from_slice(&other.bits);
        BitList::new(bits)
    }
}

impl fmt::Display for BitList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.bits.iter() {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Runtime values in the interpreter
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bits(BitList),
    Handle(Handle),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    /// Short name of the value's type, as reported by `type()` and in errors
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Bits(_) => "bits".to_string(),
            Value::Handle(h) => h.kind.to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bits(b) => !b.is_empty(),
            Value::Handle(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Handle of the requested kind, or `None`
    pub fn as_kind(&self, kind: HandleKind) -> Option<Handle> {
        self.as_handle().filter(|h| h.kind == kind)
    }

    /// Expect an integer value, returns error message if not an Int
    pub fn expect_int(&self) -> Result<i64, String> {
        self.as_int()
            .ok_or_else(|| format!("expected int, got {}", self.type_name()))
    }

    /// Expect a string value, returns error message if not a Str
    pub fn expect_str(&self) -> Result<Rc<str>, String> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            other => Err(format!("expected string, got {}", other.type_name())),
        }
    }

    /// Expect a handle of the given kind
    pub fn expect_kind(&self, kind: HandleKind) -> Result<Handle, String> {
        self.as_kind(kind)
            .ok_or_else(|| format!("expected {}, got {}", kind, self.type_name()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

/// Key type for maps and sets.
///
/// Floats are excluded so that keys have a total order; handles are keyed by
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Bits(BitList),
    Handle(Handle),
}

impl TryFrom<&Value> for MapKey {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Nil => Ok(MapKey::Nil),
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(n) => Ok(MapKey::Int(*n)),
            Value::Str(s) => Ok(MapKey::Str(s.clone())),
            Value::Bits(b) => Ok(MapKey::Bits(b.clone())),
            Value::Handle(h) => Ok(MapKey::Handle(*h)),
            Value::Float(_) => Err("float values cannot be used as keys".to_string()),
        }
    }
}

impl From<&MapKey> for Value {
    fn from(key: &MapKey) -> Self {
        match key {
            MapKey::Nil => Value::Nil,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Str(s) => Value::Str(s.clone()),
            MapKey::Bits(b) => Value::Bits(b.clone()),
            MapKey::Handle(h) => Value::Handle(*h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_list_round_trips_through_int() {
        let bits = BitList::from_int(0b1011, 4);
        assert_eq!(bits.to_string(), "1011");
        assert_eq!(bits.to_int(), 11);
        assert_eq!(BitList::parse("0110").map(|b| b.to_int()), Some(6));
        assert!(BitList::parse("012").is_none());
    }

    #[test]
    fn float_keys_are_rejected() {
        assert!(MapKey::try_from(&Value::Float(1.5)).is_err());
        assert_eq!(MapKey::try_from(&Value::Int(3)), Ok(MapKey::Int(3)));
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(!Value::Int(0).is_truthy());
    }
}
