//! Built-in function implementations
//!
//! Built-ins are bound in the global scope as ordinary function values, so
//! they can be shadowed, passed around and called through method syntax
//! (`list.push(1)` is `push(list, 1)` when `list` has no `push` field).
//!
//! # Supported Built-ins
//!
//! - `print(...)`: write the values, space separated, to the terminal
//! - `len`, `push`, `pop`, `insert`, `remove`, `contains`, `keys`: collections
//! - `str`, `int`, `float`, `type`, `bits`: conversions
//! - `copy`, `freeze`, `is_frozen`, `equals`: value identity and mutability
//! - `map`, `set`: constructors for ordered maps and sets
//! - `text`, `children`: capture node inspection
//! - `gc`: run a spatial collection now
//! - `match`, `match_bytes`, `match_tree`: run a rule; these suspend into the
//!   pattern engine and are driven by the call frame, not by [`Engine::call_builtin`]
//!
//! Language mutators refuse frozen values with
//! [`RuntimeError::FrozenModification`]; the heap itself would clone the cell.

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::memory::heap::HeapObject;
use crate::memory::value::{BitList, Handle, HandleKind, MapKey, Value};
use crate::parser::ast::SourceLocation;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Every built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Len,
    Push,
    Pop,
    Str,
    Int,
    Float,
    Type,
    Keys,
    Contains,
    Insert,
    Remove,
    Copy,
    Freeze,
    IsFrozen,
    Equals,
    Map,
    Set,
    Bits,
    Match,
    MatchBytes,
    MatchTree,
    Text,
    Children,
    Gc,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Print,
        Builtin::Len,
        Builtin::Push,
        Builtin::Pop,
        Builtin::Str,
        Builtin::Int,
        Builtin::Float,
        Builtin::Type,
        Builtin::Keys,
        Builtin::Contains,
        Builtin::Insert,
        Builtin::Remove,
        Builtin::Copy,
        Builtin::Freeze,
        Builtin::IsFrozen,
        Builtin::Equals,
        Builtin::Map,
        Builtin::Set,
        Builtin::Bits,
        Builtin::Match,
        Builtin::MatchBytes,
        Builtin::MatchTree,
        Builtin::Text,
        Builtin::Children,
        Builtin::Gc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Push => "push",
            Builtin::Pop => "pop",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Type => "type",
            Builtin::Keys => "keys",
            Builtin::Contains => "contains",
            Builtin::Insert => "insert",
            Builtin::Remove => "remove",
            Builtin::Copy => "copy",
            Builtin::Freeze => "freeze",
            Builtin::IsFrozen => "is_frozen",
            Builtin::Equals => "equals",
            Builtin::Map => "map",
            Builtin::Set => "set",
            Builtin::Bits => "bits",
            Builtin::Match => "match",
            Builtin::MatchBytes => "match_bytes",
            Builtin::MatchTree => "match_tree",
            Builtin::Text => "text",
            Builtin::Children => "children",
            Builtin::Gc => "gc",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// Minimum and maximum argument count; `None` is variadic
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Builtin::Print | Builtin::Set => (0, None),
            Builtin::Map | Builtin::Gc => (0, Some(0)),
            Builtin::Len
            | Builtin::Pop
            | Builtin::Str
            | Builtin::Int
            | Builtin::Float
            | Builtin::Type
            | Builtin::Keys
            | Builtin::Copy
            | Builtin::Freeze
            | Builtin::IsFrozen
            | Builtin::Text
            | Builtin::Children => (1, Some(1)),
            Builtin::Bits => (1, Some(2)),
            Builtin::Insert => (2, Some(3)),
            Builtin::Push
            | Builtin::Contains
            | Builtin::Remove
            | Builtin::Equals
            | Builtin::Match
            | Builtin::MatchBytes
            | Builtin::MatchTree => (2, Some(2)),
        }
    }

    /// Whether the built-in runs a rule and therefore suspends
    pub fn is_match(self) -> bool {
        matches!(
            self,
            Builtin::Match | Builtin::MatchBytes | Builtin::MatchTree
        )
    }
}

impl Engine {
    pub(crate) fn check_arity(
        &self,
        builtin: Builtin,
        got: usize,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        let (min, max) = builtin.arity();
        if got < min || max.is_some_and(|max| got > max) {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: builtin.name().to_string(),
                expected: if got < min { min } else { max.unwrap_or(min) },
                got,
                location,
            });
        }
        Ok(())
    }

    /// Run a built-in that completes within the current step
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: &[Value],
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        self.check_arity(builtin, args.len(), location)?;
        match builtin {
            Builtin::Print => self.builtin_print(args, location),
            Builtin::Len => self.builtin_len(&args[0], location),
            Builtin::Push => self.builtin_push(&args[0], args[1].clone(), location),
            Builtin::Pop => self.builtin_pop(&args[0], location),
            Builtin::Str => Ok(match &args[0] {
                Value::Str(s) => Value::Str(s.clone()),
                other => Value::str(&self.format_value(other)),
            }),
            Builtin::Int => builtin_int(&args[0], location),
            Builtin::Float => builtin_float(&args[0], location),
            Builtin::Type => Ok(Value::str(&args[0].type_name())),
            Builtin::Keys => self.builtin_keys(&args[0], location),
            Builtin::Contains => self.builtin_contains(&args[0], &args[1], location),
            Builtin::Insert => self.builtin_insert(args, location),
            Builtin::Remove => self.builtin_remove(&args[0], &args[1], location),
            Builtin::Copy => self.builtin_copy(&args[0], location),
            Builtin::Freeze => {
                if let Value::Handle(h) = &args[0] {
                    self.heap.freeze(*h).at(location)?;
                }
                Ok(args[0].clone())
            }
            Builtin::IsFrozen => match &args[0] {
                Value::Handle(h) => Ok(Value::Bool(self.heap.is_frozen(*h).at(location)?)),
                _ => Ok(Value::Bool(false)),
            },
            Builtin::Equals => Ok(Value::Bool(self.values_equal(&args[0], &args[1]))),
            Builtin::Map => Ok(Value::Handle(
                self.heap.allocate(HeapObject::Map(BTreeMap::new())),
            )),
            Builtin::Set => {
                let keys = args
                    .iter()
                    .map(|v| map_key(v, location))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(Value::Handle(self.heap.allocate(HeapObject::Set(keys))))
            }
            Builtin::Bits => builtin_bits(args, location),
            Builtin::Text => {
                let node = self.expect_node(&args[0], location)?;
                let text = self.heap.get(node).at(location)?.as_node().at(location)?.text();
                Ok(Value::str(&text))
            }
            Builtin::Children => {
                let node = self.expect_node(&args[0], location)?;
                let children = self
                    .heap
                    .get(node)
                    .at(location)?
                    .as_node()
                    .at(location)?
                    .children
                    .iter()
                    .map(|h| Value::Handle(*h))
                    .collect();
                Ok(Value::Handle(self.heap.allocate(HeapObject::List(children))))
            }
            Builtin::Gc => {
                self.heap.collect_zero_counts();
                let stats = self.collect_garbage();
                Ok(Value::Int(stats.freed_handles as i64))
            }
            Builtin::Match | Builtin::MatchBytes | Builtin::MatchTree => Err(
                RuntimeError::internal(format!("'{}' must be driven by a call frame", builtin.name()), location),
            ),
        }
    }

    fn builtin_print(&mut self, args: &[Value], location: SourceLocation) -> Result<Value, RuntimeError> {
        let line = args
            .iter()
            .map(|v| self.format_value(v))
            .collect::<Vec<_>>()
            .join(" ");
        self.terminal.print(line, location);
        Ok(Value::Nil)
    }

    fn builtin_len(&self, value: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let len = match value {
            Value::Str(s) => s.chars().count(),
            Value::Bits(b) => b.len(),
            Value::Handle(h) => match &*self.heap.get(*h).at(location)? {
                HeapObject::List(items) | HeapObject::Arguments(items) => items.len(),
                HeapObject::Object(fields) => fields.len(),
                HeapObject::Map(entries) => entries.len(),
                HeapObject::Set(keys) => keys.len(),
                HeapObject::Node(node) => node.children.len(),
                _ => return Err(RuntimeError::type_error("collection", value.type_name(), location)),
            },
            other => return Err(RuntimeError::type_error("collection", other.type_name(), location)),
        };
        Ok(Value::Int(len as i64))
    }

    fn builtin_push(&mut self, list: &Value, value: Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let list = self.mutable(list, HandleKind::List, location)?;
        self.heap.list_push(list, value).at(location)?;
        Ok(Value::Nil)
    }

    fn builtin_pop(&mut self, list: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let list = self.mutable(list, HandleKind::List, location)?;
        Ok(self.heap.list_pop(list).at(location)?.unwrap_or(Value::Nil))
    }

    fn builtin_keys(&mut self, value: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let Value::Handle(h) = value else {
            return Err(RuntimeError::type_error("object, map, set or node", value.type_name(), location));
        };
        let keys: Vec<Value> = match &*self.heap.get(*h).at(location)? {
            HeapObject::Object(fields) => {
                let mut names: Vec<&Rc<str>> = fields.keys().collect();
                names.sort();
                names.into_iter().map(|k| Value::Str(k.clone())).collect()
            }
            HeapObject::Map(entries) => entries.keys().map(Value::from).collect(),
            HeapObject::Set(keys) => keys.iter().map(Value::from).collect(),
            HeapObject::Node(node) => node.props.keys().map(|k| Value::Str(k.clone())).collect(),
            _ => return Err(RuntimeError::type_error("object, map, set or node", value.type_name(), location)),
        };
        Ok(Value::Handle(self.heap.allocate(HeapObject::List(keys))))
    }

    fn builtin_contains(&self, container: &Value, item: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let found = match container {
            Value::Str(s) => match item {
                Value::Str(needle) => s.contains(&**needle),
                other => return Err(RuntimeError::type_error("string", other.type_name(), location)),
            },
            Value::Handle(h) => match &*self.heap.get(*h).at(location)? {
                HeapObject::List(items) | HeapObject::Arguments(items) => {
                    items.iter().any(|v| self.values_equal(v, item))
                }
                HeapObject::Object(fields) => item.as_str().is_some_and(|k| fields.contains_key(k)),
                HeapObject::Map(entries) => entries.contains_key(&map_key(item, location)?),
                HeapObject::Set(keys) => keys.contains(&map_key(item, location)?),
                _ => return Err(RuntimeError::type_error("collection", container.type_name(), location)),
            },
            other => return Err(RuntimeError::type_error("collection", other.type_name(), location)),
        };
        Ok(Value::Bool(found))
    }

    fn builtin_insert(&mut self, args: &[Value], location: SourceLocation) -> Result<Value, RuntimeError> {
        let target = &args[0];
        let handle = target
            .as_handle()
            .ok_or_else(|| RuntimeError::type_error("list, map, set or object", target.type_name(), location))?;
        let handle = self.mutable(target, handle.kind, location)?;
        let value = args.get(2).cloned();
        match (handle.kind, value) {
            (HandleKind::List, Some(value)) => {
                let index = args[1]
                    .as_int()
                    .ok_or_else(|| RuntimeError::type_error("int", args[1].type_name(), location))?;
                let len = self.list_len(handle, location)?;
                let slot = usize::try_from(index).ok().filter(|i| *i <= len);
                match slot {
                    Some(i) => {
                        self.heap.list_insert(handle, i, value).at(location)?;
                        Ok(Value::Nil)
                    }
                    None => Err(RuntimeError::IndexOutOfBounds { index, len, location }),
                }
            }
            (HandleKind::Map, Some(value)) => {
                let key = map_key(&args[1], location)?;
                self.heap.map_insert(handle, key, value).at(location)?;
                Ok(Value::Nil)
            }
            (HandleKind::Object, Some(value)) => {
                let key = args[1]
                    .expect_str()
                    .map_err(|_| RuntimeError::type_error("string", args[1].type_name(), location))?;
                self.heap.object_set(handle, key, value).at(location)?;
                Ok(Value::Nil)
            }
            (HandleKind::Set, None) => {
                let key = map_key(&args[1], location)?;
                Ok(Value::Bool(self.heap.set_insert(handle, key).at(location)?))
            }
            (kind, _) => Err(RuntimeError::ArgumentCountMismatch {
                function: format!("insert on {}", kind),
                expected: if kind == HandleKind::Set { 2 } else { 3 },
                got: args.len(),
                location,
            }),
        }
    }

    fn builtin_remove(&mut self, target: &Value, key: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let handle = target
            .as_handle()
            .ok_or_else(|| RuntimeError::type_error("list, map or set", target.type_name(), location))?;
        let handle = self.mutable(target, handle.kind, location)?;
        match handle.kind {
            HandleKind::List => {
                let index = key
                    .as_int()
                    .ok_or_else(|| RuntimeError::type_error("int", key.type_name(), location))?;
                let len = self.list_len(handle, location)?;
                match usize::try_from(index).ok().filter(|i| *i < len) {
                    Some(i) => Ok(self.heap.list_remove(handle, i).at(location)?.unwrap_or(Value::Nil)),
                    None => Err(RuntimeError::IndexOutOfBounds { index, len, location }),
                }
            }
            HandleKind::Map => {
                let key = map_key(key, location)?;
                Ok(self.heap.map_remove(handle, &key).at(location)?.unwrap_or(Value::Nil))
            }
            HandleKind::Set => {
                let key = map_key(key, location)?;
                Ok(Value::Bool(self.heap.set_remove(handle, &key).at(location)?))
            }
            _ => Err(RuntimeError::type_error("list, map or set", target.type_name(), location)),
        }
    }

    /// `copy` shares the cell; the first write through either handle clones
    /// it. A frozen value yields an unfrozen clone.
    fn builtin_copy(&mut self, value: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let Value::Handle(h) = value else {
            return Ok(value.clone());
        };
        let obj = self.heap.get(*h).at(location)?;
        if obj.is_frozen() {
            let object = (*obj).clone();
            return Ok(Value::Handle(self.heap.allocate(object)));
        }
        Ok(Value::Handle(self.heap.share(*h).at(location)?))
    }

    /// A handle of `kind` that a language mutator may write through
    pub(crate) fn mutable(&self, value: &Value, kind: HandleKind, location: SourceLocation) -> Result<Handle, RuntimeError> {
        let handle = value
            .as_kind(kind)
            .ok_or_else(|| RuntimeError::type_error(&kind.to_string(), value.type_name(), location))?;
        if self.heap.is_frozen(handle).at(location)? {
            return Err(RuntimeError::FrozenModification {
                kind: kind.to_string(),
                location,
            });
        }
        Ok(handle)
    }

    pub(crate) fn expect_node(&self, value: &Value, location: SourceLocation) -> Result<Handle, RuntimeError> {
        value
            .as_kind(HandleKind::Node)
            .ok_or_else(|| RuntimeError::type_error("node", value.type_name(), location))
    }

    fn list_len(&self, list: Handle, location: SourceLocation) -> Result<usize, RuntimeError> {
        Ok(self.heap.get(list).at(location)?.as_list().at(location)?.len())
    }
}

pub(crate) fn map_key(value: &Value, location: SourceLocation) -> Result<MapKey, RuntimeError> {
    MapKey::try_from(value).map_err(|_| RuntimeError::type_error("key", value.type_name(), location))
}

fn builtin_int(value: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(x) => Ok(Value::Int(x.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Bits(bits) => Ok(Value::Int(bits.to_int())),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RuntimeError::type_error("integer string", format!("{:?}", &**s), location)),
        other => Err(RuntimeError::type_error("number", other.type_name(), location)),
    }
}

fn builtin_float(value: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::type_error("number string", format!("{:?}", &**s), location)),
        other => Err(RuntimeError::type_error("number", other.type_name(), location)),
    }
}

/// `bits("0101")` or `bits(value, width)`
fn builtin_bits(args: &[Value], location: SourceLocation) -> Result<Value, RuntimeError> {
    match (&args[0], args.get(1)) {
        (Value::Str(s), None) => BitList::parse(s)
            .map(Value::Bits)
            .ok_or_else(|| RuntimeError::type_error("string of 0 and 1", format!("{:?}", &**s), location)),
        (Value::Bits(b), None) => Ok(Value::Bits(b.clone())),
        (Value::Int(n), Some(Value::Int(width))) if (0..=64).contains(width) => {
            Ok(Value::Bits(BitList::from_int(*n, *width as usize)))
        }
        (Value::Int(_), Some(other)) => Err(RuntimeError::type_error("width between 0 and 64", format!("{:?}", other), location)),
        (other, _) => Err(RuntimeError::type_error("bits, int or string", other.type_name(), location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(*builtin));
        }
        assert_eq!(Builtin::from_name("printf"), None);
    }

    #[test]
    fn test_bits_from_int_and_string() {
        let loc = SourceLocation::new(1, 1);
        assert_eq!(
            builtin_bits(&[Value::Int(5), Value::Int(4)], loc),
            Ok(Value::Bits(BitList::from_int(5, 4)))
        );
        assert_eq!(
            builtin_bits(&[Value::str("101")], loc).map(|v| v.type_name()),
            Ok("bits".to_string())
        );
        assert!(builtin_bits(&[Value::str("12")], loc).is_err());
    }

    #[test]
    fn test_int_parses_strings() {
        let loc = SourceLocation::new(1, 1);
        assert_eq!(builtin_int(&Value::str(" 42 "), loc), Ok(Value::Int(42)));
        assert_eq!(builtin_int(&Value::Float(-2.7), loc), Ok(Value::Int(-2)));
        assert!(builtin_int(&Value::str("x"), loc).is_err());
    }
}
