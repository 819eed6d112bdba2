//! Hybrid array+hash table.

use crate::gc::GcIdx;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// A key in the hash part of a table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableKey {
    Integer(i64),
    String(Arc<str>),
    /// Non-integral float key, stored as raw bits for hashing.
    Float(u64),
    Boolean(bool),
    Table(u32),
    Userdata(u32),
    LightUserdata(usize),
    /// Function key by object address.
    Function(usize),
    Thread(u32),
}

impl TableKey {
    /// Normalize a value into a key. `None` for nil and NaN.
    pub fn from_value(v: &Value) -> Option<TableKey> {
        Some(match v {
            Value::Nil => return None,
            Value::Boolean(b) => TableKey::Boolean(*b),
            Value::Integer(i) => TableKey::Integer(*i),
            Value::Float(f) if f.is_nan() => return None,
            Value::Float(f) => match v.as_integer() {
                Some(i) => TableKey::Integer(i),
                None => TableKey::Float(f.to_bits()),
            },
            Value::String(s) => TableKey::String(s.clone()),
            Value::Table(t) => TableKey::Table(t.index()),
            Value::Userdata(u) => TableKey::Userdata(u.index()),
            Value::LightUserdata(p) => TableKey::LightUserdata(*p),
            Value::Function(f) => TableKey::Function(f.addr()),
            Value::Thread(t) => TableKey::Thread(t.0),
        })
    }
}

/// A table: hybrid array + hash map.
#[derive(Debug, Default)]
pub struct Table {
    /// Array part (1-indexed: array[0] corresponds to key 1).
    array: Vec<Value>,
    /// Hash part (insertion-order preserving). Keeps the original key value
    /// so iteration can hand it back.
    hash: IndexMap<TableKey, (Value, Value)>,
    /// Metatable (if any).
    pub metatable: Option<GcIdx<Table>>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Raw get (no metamethods).
    pub fn raw_get(&self, key: &Value) -> Value {
        match TableKey::from_value(key) {
            Some(TableKey::Integer(i)) => self.raw_geti(i),
            Some(tk) => self.hash.get(&tk).map(|(_, v)| v.clone()).unwrap_or_default(),
            None => Value::Nil,
        }
    }

    /// Raw set (no metamethods).
    pub fn raw_set(&mut self, key: Value, value: Value) -> Result<(), &'static str> {
        match TableKey::from_value(&key) {
            Some(TableKey::Integer(i)) => {
                self.raw_seti(i, value);
                Ok(())
            }
            Some(tk) => {
                self.set_hash(tk, key, value);
                Ok(())
            }
            None if key.is_nil() => Err("table index is nil"),
            None => Err("table index is NaN"),
        }
    }

    /// Fast integer get (1-indexed).
    pub fn raw_geti(&self, key: i64) -> Value {
        if key >= 1 && (key as usize) <= self.array.len() {
            self.array[(key - 1) as usize].clone()
        } else {
            self.hash
                .get(&TableKey::Integer(key))
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        }
    }

    /// Fast integer set (1-indexed).
    pub fn raw_seti(&mut self, key: i64, value: Value) {
        if key >= 1 {
            let idx = (key - 1) as usize;
            if idx < self.array.len() {
                self.array[idx] = value;
                self.trim_array();
                return;
            }
            if idx == self.array.len() {
                if value.is_nil() {
                    return;
                }
                self.array.push(value);
                self.migrate_to_array();
                return;
            }
        }
        self.set_hash(TableKey::Integer(key), Value::Integer(key), value);
    }

    pub fn raw_get_str(&self, key: &str) -> Value {
        self.hash
            .get(&TableKey::String(Arc::from(key)))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    pub fn raw_set_str(&mut self, key: &str, value: Value) {
        let k: Arc<str> = Arc::from(key);
        self.set_hash(TableKey::String(k.clone()), Value::String(k), value);
    }

    /// Border of the array part.
    pub fn length(&self) -> i64 {
        self.array.len() as i64
    }

    fn set_hash(&mut self, tk: TableKey, key: Value, value: Value) {
        if value.is_nil() {
            self.hash.shift_remove(&tk);
        } else {
            self.hash.insert(tk, (key, value));
        }
    }

    fn trim_array(&mut self) {
        while self.array.last().is_some_and(Value::is_nil) {
            self.array.pop();
        }
    }

    /// Move hash entries that now continue the array part.
    fn migrate_to_array(&mut self) {
        loop {
            let next = TableKey::Integer(self.array.len() as i64 + 1);
            match self.hash.shift_remove(&next) {
                Some((_, v)) => self.array.push(v),
                None => break,
            }
        }
    }
}
