//! Value kinds and type name helpers.

use crate::value::Value;

/// Coarse classification of a value. Kinds without their own per-object
/// metatable share one process-wide slot per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Userdata,
    LightUserdata,
    Thread,
}

impl ValueKind {
    /// Script-visible type name.
    pub fn type_name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Table => "table",
            ValueKind::Function => "function",
            ValueKind::Userdata | ValueKind::LightUserdata => "userdata",
            ValueKind::Thread => "thread",
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) | Value::Float(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Table(_) => ValueKind::Table,
            Value::Function(_) => ValueKind::Function,
            Value::Userdata(_) => ValueKind::Userdata,
            Value::LightUserdata(_) => ValueKind::LightUserdata,
            Value::Thread(_) => ValueKind::Thread,
        }
    }
}
