//! Register windows and vararg lists shared between the interpreter and the
//! debug facilities.

use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// The live registers of one active call.
///
/// Cloning yields another handle to the same storage: the interpreter and
/// every debug view observe each other's writes.
#[derive(Clone, Default)]
pub struct RegisterWindow(Arc<RwLock<Vec<Value>>>);

impl RegisterWindow {
    /// A window of `size` nil registers.
    pub fn new(size: usize) -> Self {
        RegisterWindow(Arc::new(RwLock::new(vec![Value::Nil; size])))
    }

    /// Register `idx` (0-based); nil when out of range.
    pub fn get(&self, idx: usize) -> Value {
        self.0.read().get(idx).cloned().unwrap_or_default()
    }

    /// Write register `idx`. Returns false if out of range.
    pub fn set(&self, idx: usize, value: Value) -> bool {
        match self.0.write().get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Copy of the current register contents.
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Do both handles share the same storage?
    pub fn ptr_eq(&self, other: &RegisterWindow) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RegisterWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.read().iter()).finish()
    }
}

/// Extra arguments passed to a vararg function.
#[derive(Clone, Debug)]
pub struct Varargs(Arc<[Value]>);

impl Varargs {
    pub fn new(values: Vec<Value>) -> Self {
        Varargs(values.into())
    }

    pub fn none() -> Self {
        Varargs::default()
    }

    /// Vararg `n` (1-based).
    pub fn get(&self, n: usize) -> Option<&Value> {
        n.checked_sub(1).and_then(|i| self.0.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Varargs {
    fn default() -> Self {
        Varargs(Arc::from(Vec::new()))
    }
}
