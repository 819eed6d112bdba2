//! Runtime values.

use crate::gc::{GcIdx, LuaClosure, NativeFunction, Userdata};
use crate::table::Table;
use std::fmt;
use std::sync::Arc;

/// Identity of a script thread (coroutine or main thread).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

/// A callable value: a script closure or a native function.
#[derive(Clone)]
pub enum Function {
    Script(Arc<LuaClosure>),
    Native(Arc<NativeFunction>),
}

impl Function {
    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Script(a), Function::Script(b)) => Arc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address of the underlying object, usable as an identity key.
    pub fn addr(&self) -> usize {
        match self {
            Function::Script(c) => Arc::as_ptr(c) as usize,
            Function::Native(n) => Arc::as_ptr(n) as usize,
        }
    }

    pub fn as_script(&self) -> Option<&Arc<LuaClosure>> {
        match self {
            Function::Script(c) => Some(c),
            Function::Native(_) => None,
        }
    }

    pub fn as_native(&self) -> Option<&Arc<NativeFunction>> {
        match self {
            Function::Native(n) => Some(n),
            Function::Script(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Function::Native(_))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Script(c) => write!(f, "function: {}", c.proto.source_name()),
            Function::Native(n) => write!(f, "function: builtin '{}'", n.name),
        }
    }
}

impl From<Arc<LuaClosure>> for Function {
    fn from(c: Arc<LuaClosure>) -> Self {
        Function::Script(c)
    }
}

impl From<Arc<NativeFunction>> for Function {
    fn from(n: Arc<NativeFunction>) -> Self {
        Function::Native(n)
    }
}

/// A runtime value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    Table(GcIdx<Table>),
    Function(Function),
    Userdata(GcIdx<Userdata>),
    LightUserdata(usize),
    Thread(ThreadId),
}

impl Value {
    pub fn nil() -> Self {
        Value::Nil
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Integer view: integers, and floats with an exact integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table_idx(&self) -> Option<GcIdx<Table>> {
        match self {
            Value::Table(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Script-visible type name.
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }
}

impl PartialEq for Value {
    /// Raw equality (no metamethods). Integers and floats compare by value.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
                *i as f64 == *f && f.fract() == 0.0
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Userdata(a), Value::Userdata(b)) => a == b,
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            (Value::Thread(a), Value::Thread(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{x:.1}")
                } else if x.is_nan() {
                    write!(f, "nan")
                } else if x.is_infinite() {
                    write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
                } else {
                    write!(f, "{x}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Table(t) => write!(f, "table: 0x{:08x}", t.index()),
            Value::Function(func) => write!(f, "function: 0x{:08x}", func.addr()),
            Value::Userdata(u) => write!(f, "userdata: 0x{:08x}", u.index()),
            Value::LightUserdata(p) => write!(f, "userdata: 0x{p:08x}"),
            Value::Thread(t) => write!(f, "thread: 0x{:08x}", t.0),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<GcIdx<Table>> for Value {
    fn from(t: GcIdx<Table>) -> Self {
        Value::Table(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}
