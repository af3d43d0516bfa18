//! Runtime values.
//!
//! AquaScript's Non-goals explicitly accept "simple tracing/reference
//! semantics" in place of a full manual heap, and §9 suggests storing
//! classes in a flat table keyed by id rather than giving instances a
//! direct reference to their class. We follow both: compound values use
//! `Rc`/`RefCell` for shared mutable state, and classes live in
//! [`crate::vm::ClassTable`] indexed by [`ClassId`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// Opaque handle into the VM's flat class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// An exception object as seen at the value level.
#[derive(Debug)]
pub struct ExceptionObj {
    pub type_name: String,
    pub message: String,
}

/// Iteration state for `GET_ITER`/`FOR_ITER`, covering lists, tuples and
/// strings. Dicts and sets are not iterable, per the Open Question
/// resolution recorded in DESIGN.md.
#[derive(Debug)]
pub struct IterState {
    pub sequence: Value,
    pub cursor: usize,
    pub length: usize,
}

/// An object instance: which class it belongs to, plus its own attributes.
#[derive(Debug)]
pub struct Instance {
    pub class: ClassId,
    pub attrs: IndexMap<String, Value>,
}

/// A dynamically-typed AquaScript runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<IndexMap<DictKey, Value>>>),
    Tuple(Rc<Vec<Value>>),
    /// Functions are addressed by their name in the function table, so
    /// first-class function values are cheap to copy and compare.
    FunctionRef(Rc<str>),
    Class(ClassId),
    Instance(Rc<RefCell<Instance>>),
    Iterator(Rc<RefCell<IterState>>),
    Exception(Rc<ExceptionObj>),
}

impl Value {
    #[must_use]
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn dict(entries: IndexMap<DictKey, Value>) -> Self {
        Self::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Truthiness per spec.md §4.6: `nil`, `false`, `0`/`0.0`, and empty
    /// string/list/dict/tuple are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::FunctionRef(_)
            | Self::Class(_)
            | Self::Instance(_)
            | Self::Iterator(_)
            | Self::Exception(_) => true,
        }
    }

    /// The name reported by the `type()` builtin and `TYPE_CHECK`, per
    /// spec.md's GLOSSARY: `nil` reports as `"NoneType"` and strings as
    /// `"str"`, matching the original VM's `type(x).__name__` convention
    /// rather than this crate's internal variant names.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Tuple(_) => "tuple",
            Self::FunctionRef(_) => "function",
            Self::Class(_) => "class",
            Self::Instance(_) => "instance",
            Self::Iterator(_) => "iterator",
            Self::Exception(_) => "exception",
        }
    }

    /// Cross-type numeric equality promotes int to float; every other pair
    /// of differing types compares unequal rather than erroring.
    #[must_use]
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                let x = x.borrow();
                let y = y.borrow();
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| Value::values_equal(a, b))
            }
            (Value::Tuple(x), Value::Tuple(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| Value::values_equal(a, b))
            }
            (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
            (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
            (Value::Class(x), Value::Class(y)) => x == y,
            (Value::FunctionRef(x), Value::FunctionRef(y)) => x == y,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::FunctionRef(name) => write!(f, "<function {name}>"),
            Self::Class(id) => write!(f, "<class #{}>", id.0),
            Self::Instance(inst) => write!(f, "<instance of class #{}>", inst.borrow().class.0),
            Self::Iterator(_) => write!(f, "<iterator>"),
            Self::Exception(exc) => write!(f, "{}: {}", exc.type_name, exc.message),
        }
    }
}

/// A hashable projection of [`Value`], used as dict keys. Lists and dicts
/// are unhashable and rejected when a value is converted to a key.
#[derive(Debug, Clone)]
pub enum DictKey {
    Nil,
    Bool(bool),
    Int(i64),
    /// Stored as bits so `DictKey` can implement `Eq`/`Hash`.
    Float(u64),
    Str(Rc<str>),
}

impl DictKey {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        Ok(match value {
            Value::Nil => Self::Nil,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(x) => Self::Float(x.to_bits()),
            Value::Str(s) => Self::Str(s.clone()),
            other => return Err(format!("unhashable type: '{}'", other.type_name())),
        })
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Nil => Value::Nil,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Self::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl PartialEq for DictKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DictKey {}

impl std::hash::Hash for DictKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(bits) => bits.hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}
