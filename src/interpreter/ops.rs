//! Operators, value formatting and structural equality

use crate::interpreter::builtins::map_key;
use crate::interpreter::constants::MAX_VALUE_DEPTH;
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::{AtLocation, RuntimeError};
use crate::memory::heap::{FunctionKind, HeapObject};
use crate::memory::value::{HandleKind, Value};
use crate::parser::ast::{BinOp, SourceLocation, UnOp};
use std::cmp::Ordering;
use std::fmt::Write;

impl Engine {
    pub(crate) fn unary_op(&self, op: UnOp, value: Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        match (op, value) {
            (UnOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
            (UnOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                RuntimeError::IntegerOverflow {
                    operation: "negation".to_string(),
                    location,
                }
            }),
            (UnOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
            (UnOp::Neg, v) => Err(RuntimeError::type_error("number", v.type_name(), location)),
        }
    }

    /// Evaluate a non-short-circuit binary operator
    pub(crate) fn binary_op(
        &mut self,
        op: BinOp,
        left: Value,
        right: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        let overflow = |operation: &str| RuntimeError::IntegerOverflow {
            operation: operation.to_string(),
            location,
        };

        match (op, &left, &right) {
            (BinOp::Eq, ..) => Ok(Value::Bool(primitive_eq(&left, &right))),
            (BinOp::Ne, ..) => Ok(Value::Bool(!primitive_eq(&left, &right))),

            (BinOp::Div | BinOp::Mod, Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionError {
                operation: if op == BinOp::Div {
                    "Division by zero".to_string()
                } else {
                    "Modulo by zero".to_string()
                },
                location,
            }),
            (_, Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                match op {
                    BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow("addition")),
                    BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow("subtraction")),
                    BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow("multiplication")),
                    BinOp::Div => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow("division")),
                    BinOp::Mod => a.checked_rem(b).map(Value::Int).ok_or_else(|| overflow("modulo")),
                    _ => Ok(Value::Bool(compare(op, a.cmp(&b)))),
                }
            }

            (BinOp::Add, Value::Str(a), _) => Ok(Value::str(&format!("{}{}", a, self.format_value(&right)))),
            (BinOp::Add, _, Value::Str(b)) => Ok(Value::str(&format!("{}{}", self.format_value(&left), b))),
            (BinOp::Add, Value::Bits(a), Value::Bits(b)) => Ok(Value::Bits(a.concat(b))),
            (BinOp::Add, Value::Handle(a), Value::Handle(b))
                if a.kind() == HandleKind::List && b.kind() == HandleKind::List =>
            {
                let mut items = self.heap.get(*a).at(location)?.as_list().at(location)?.clone();
                items.extend(self.heap.get(*b).at(location)?.as_list().at(location)?.iter().cloned());
                Ok(Value::Handle(self.heap.allocate(HeapObject::List(items))))
            }
            (BinOp::Mul, Value::Str(s), Value::Int(n)) if *n >= 0 => Ok(Value::str(&s.repeat(*n as usize))),

            (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Value::Str(a), Value::Str(b)) => {
                Ok(Value::Bool(compare(op, a.cmp(b))))
            }

            _ => match (as_float(&left), as_float(&right)) {
                (Some(a), Some(b)) => Ok(match op {
                    BinOp::Add => Value::Float(a + b),
                    BinOp::Sub => Value::Float(a - b),
                    BinOp::Mul => Value::Float(a * b),
                    BinOp::Div => Value::Float(a / b),
                    BinOp::Mod => Value::Float(a % b),
                    _ => Value::Bool(a.partial_cmp(&b).is_some_and(|ord| compare(op, ord))),
                }),
                _ => Err(RuntimeError::TypeError {
                    expected: format!("operands for {:?}", op),
                    got: format!("{} and {}", left.type_name(), right.type_name()),
                    location,
                }),
            },
        }
    }

    /// `object[index]`
    pub(crate) fn index_value(&self, object: &Value, index: &Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let position = |len: usize| -> Result<usize, RuntimeError> {
            let i = index
                .as_int()
                .ok_or_else(|| RuntimeError::type_error("int", index.type_name(), location))?;
            usize::try_from(i)
                .ok()
                .filter(|i| *i < len)
                .ok_or(RuntimeError::IndexOutOfBounds { index: i, len, location })
        };

        match object {
            Value::Str(s) => {
                let len = s.chars().count();
                let i = position(len)?;
                Ok(s.chars().nth(i).map(|c| Value::str(&c.to_string())).unwrap_or_default())
            }
            Value::Bits(bits) => {
                let i = position(bits.len())?;
                Ok(bits.get(i).map(Value::Bool).unwrap_or_default())
            }
            Value::Handle(h) => match &*self.heap.get(*h).at(location)? {
                HeapObject::List(items) | HeapObject::Arguments(items) => Ok(items[position(items.len())?].clone()),
                HeapObject::Node(node) => Ok(Value::Handle(node.children[position(node.children.len())?])),
                HeapObject::Map(entries) => Ok(entries.get(&map_key(index, location)?).cloned().unwrap_or_default()),
                HeapObject::Object(fields) => {
                    let key = index
                        .as_str()
                        .ok_or_else(|| RuntimeError::type_error("string", index.type_name(), location))?;
                    fields.get(key).cloned().ok_or_else(|| RuntimeError::UndefinedProperty {
                        name: key.to_string(),
                        on: "object".to_string(),
                        location,
                    })
                }
                _ => Err(RuntimeError::type_error("indexable value", object.type_name(), location)),
            },
            other => Err(RuntimeError::type_error("indexable value", other.type_name(), location)),
        }
    }

    /// `object.name`; `None` when the value has no such member
    pub(crate) fn member_value(
        &mut self,
        object: &Value,
        name: &str,
        location: SourceLocation,
    ) -> Result<Option<Value>, RuntimeError> {
        let Value::Handle(h) = object else {
            return Ok(None);
        };
        let children = match &*self.heap.get(*h).at(location)? {
            HeapObject::Object(fields) => return Ok(fields.get(name).cloned()),
            HeapObject::Node(node) => match name {
                "name" => return Ok(Some(Value::Str(node.name.clone()))),
                "text" => return Ok(Some(Value::str(&node.text()))),
                "from" => return Ok(Some(Value::Int(node.from as i64))),
                "to" => return Ok(Some(Value::Int(node.to as i64))),
                "parent" => return Ok(Some(node.parent.map(Value::Handle).unwrap_or_default())),
                "children" => node.children.iter().map(|c| Value::Handle(*c)).collect(),
                _ => return Ok(node.props.get(name).cloned()),
            },
            _ => return Ok(None),
        };
        Ok(Some(Value::Handle(self.heap.allocate(HeapObject::List(children)))))
    }

    /// Render a value the way `print` shows it
    pub fn format_value(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value, depth: usize) {
        match value {
            Value::Nil => out.push_str("nil"),
            Value::Bool(b) => write!(out, "{}", b).unwrap_or_default(),
            Value::Int(n) => write!(out, "{}", n).unwrap_or_default(),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(out, "{:.1}", x).unwrap_or_default(),
            Value::Float(x) => write!(out, "{}", x).unwrap_or_default(),
            Value::Str(s) if depth == 0 => out.push_str(s),
            Value::Str(s) => write!(out, "{:?}", &**s).unwrap_or_default(),
            Value::Bits(b) => write!(out, "0b{}", b).unwrap_or_default(),
            Value::Handle(h) => {
                if depth >= MAX_VALUE_DEPTH {
                    out.push_str("...");
                    return;
                }
                let Ok(obj) = self.heap.get(*h) else {
                    write!(out, "<dangling #{}>", h.index()).unwrap_or_default();
                    return;
                };
                match &*obj {
                    HeapObject::List(items) => self.write_seq(out, "[", items.iter(), "]", depth),
                    HeapObject::Arguments(items) => self.write_seq(out, "args(", items.iter(), ")", depth),
                    HeapObject::Object(fields) => {
                        let mut names: Vec<_> = fields.keys().collect();
                        names.sort();
                        out.push('{');
                        for (i, name) in names.into_iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            write!(out, "{}: ", name).unwrap_or_default();
                            self.write_value(out, &fields[name], depth + 1);
                        }
                        out.push('}');
                    }
                    HeapObject::Map(entries) => {
                        out.push_str("map{");
                        for (i, (key, v)) in entries.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.write_value(out, &Value::from(key), depth + 1);
                            out.push_str(": ");
                            self.write_value(out, v, depth + 1);
                        }
                        out.push('}');
                    }
                    HeapObject::Set(keys) => {
                        let values: Vec<Value> = keys.iter().map(Value::from).collect();
                        self.write_seq(out, "set{", values.iter(), "}", depth);
                    }
                    HeapObject::Function(f) => match f.kind {
                        FunctionKind::User { .. } => write!(out, "<fn {}>", f.name).unwrap_or_default(),
                        FunctionKind::Rule { .. } => write!(out, "<rule {}>", f.name).unwrap_or_default(),
                        FunctionKind::Builtin(b) => write!(out, "<builtin {}>", b.name()).unwrap_or_default(),
                    },
                    HeapObject::Node(node) => {
                        write!(out, "{}({:?})", node.name, node.text()).unwrap_or_default();
                        if !node.children.is_empty() {
                            let children: Vec<Value> = node.children.iter().map(|c| Value::Handle(*c)).collect();
                            self.write_seq(out, "[", children.iter(), "]", depth);
                        }
                    }
                    HeapObject::Context(_) => out.push_str("<scope>"),
                    HeapObject::PatternUnion(_) | HeapObject::Quantifier(_) => out.push_str("<state>"),
                    HeapObject::Reclaimed => out.push_str("<reclaimed>"),
                }
            }
        }
    }

    fn write_seq<'a>(
        &self,
        out: &mut String,
        open: &str,
        items: impl Iterator<Item = &'a Value>,
        close: &str,
        depth: usize,
    ) {
        out.push_str(open);
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_value(out, item, depth + 1);
        }
        out.push_str(close);
    }

    /// Deep structural equality, the `equals` built-in
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        self.equal_at(a, b, 0)
    }

    fn equal_at(&self, a: &Value, b: &Value, depth: usize) -> bool {
        let (Value::Handle(x), Value::Handle(y)) = (a, b) else {
            return primitive_eq(a, b);
        };
        if x == y {
            return true;
        }
        if depth >= MAX_VALUE_DEPTH || x.kind() != y.kind() {
            return false;
        }
        let (Ok(left), Ok(right)) = (self.heap.get(*x), self.heap.get(*y)) else {
            return false;
        };
        let all = |l: &[Value], r: &[Value]| {
            l.len() == r.len() && l.iter().zip(r).all(|(p, q)| self.equal_at(p, q, depth + 1))
        };
        match (&*left, &*right) {
            (HeapObject::List(l), HeapObject::List(r)) | (HeapObject::Arguments(l), HeapObject::Arguments(r)) => all(l, r),
            (HeapObject::Object(l), HeapObject::Object(r)) => {
                l.len() == r.len()
                    && l.iter().all(|(k, v)| r.get(k).is_some_and(|w| self.equal_at(v, w, depth + 1)))
            }
            (HeapObject::Map(l), HeapObject::Map(r)) => {
                l.len() == r.len()
                    && l.iter().zip(r).all(|((k, v), (j, w))| k == j && self.equal_at(v, w, depth + 1))
            }
            (HeapObject::Set(l), HeapObject::Set(r)) => l == r,
            (HeapObject::Node(l), HeapObject::Node(r)) => {
                let children = |n: &crate::memory::heap::CaptureNode| -> Vec<Value> {
                    n.children.iter().map(|c| Value::Handle(*c)).collect()
                };
                l.name == r.name
                    && l.text() == r.text()
                    && (l.from, l.to) == (r.from, r.to)
                    && l.props.len() == r.props.len()
                    && l.props.iter().zip(&r.props).all(|((k, v), (j, w))| k == j && self.equal_at(v, w, depth + 1))
                    && all(&children(l), &children(r))
            }
            (HeapObject::Function(l), HeapObject::Function(r)) => l == r,
            _ => false,
        }
    }
}

/// `==`: primitives by value (ints and floats numerically), handles by identity
pub(crate) fn primitive_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        _ => a == b,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn compare(op: BinOp, ordering: Ordering) -> bool {
    match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_numeric_equality() {
        assert!(primitive_eq(&Value::Int(2), &Value::Float(2.0)));
        assert!(!primitive_eq(&Value::Int(2), &Value::str("2")));
    }

    #[test]
    fn test_compare_orderings() {
        assert!(compare(BinOp::Le, Ordering::Equal));
        assert!(!compare(BinOp::Gt, Ordering::Less));
    }
}
