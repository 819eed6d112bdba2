//! Errors raised by native functions.

use crate::value::Value;
use thiserror::Error;

/// Error returned by a native function.
#[derive(Debug, Clone, Error)]
pub enum NativeError {
    /// Error with a plain message.
    #[error("{0}")]
    Message(String),
    /// Error carrying an arbitrary value (as raised by `error(v)`).
    #[error("{0}")]
    Value(Value),
}

impl NativeError {
    /// `bad argument #<position> to '<function>' (<msg>)`
    pub fn bad_argument(position: usize, function: &str, msg: impl AsRef<str>) -> Self {
        NativeError::Message(format!(
            "bad argument #{position} to '{function}' ({})",
            msg.as_ref()
        ))
    }

    /// `bad argument ... (<expected> expected, got <actual>)`
    pub fn type_mismatch(position: usize, function: &str, expected: &str, got: &Value) -> Self {
        let got = if got.is_nil() { "no value" } else { got.type_name() };
        Self::bad_argument(position, function, format!("{expected} expected, got {got}"))
    }

    /// The error as a script value.
    pub fn to_value(&self) -> Value {
        match self {
            NativeError::Message(msg) => Value::from(msg.as_str()),
            NativeError::Value(v) => v.clone(),
        }
    }
}

impl From<String> for NativeError {
    fn from(msg: String) -> Self {
        NativeError::Message(msg)
    }
}

impl From<&str> for NativeError {
    fn from(msg: &str) -> Self {
        NativeError::Message(msg.to_string())
    }
}
