//! Runtime error types.

use lunatrace_core::{NativeError, Value};
use thiserror::Error;

/// A runtime error surfaced to the embedder or the calling script.
#[derive(Clone, Debug, Error)]
pub enum LuaError {
    /// General runtime error with message.
    #[error("{0}")]
    Runtime(String),
    /// Wrong or out-of-range argument to a debug function.
    #[error("bad argument #{position} to '{function}' ({expected})")]
    BadArgument {
        position: usize,
        function: String,
        expected: String,
    },
    /// error() with an arbitrary value (string, number, table, etc.).
    #[error("{0}")]
    Value(Value),
    /// A script function was called but no interpreter is attached.
    #[error("attempt to call a script function: no interpreter attached")]
    NoInterpreter,
}

impl LuaError {
    pub fn bad_argument(position: usize, function: &str, expected: impl Into<String>) -> Self {
        LuaError::BadArgument {
            position,
            function: function.to_string(),
            expected: expected.into(),
        }
    }

    /// The error as a script value (what `pcall` would hand back).
    pub fn to_value(&self) -> Value {
        match self {
            LuaError::Value(v) => v.clone(),
            other => Value::from(other.to_string()),
        }
    }
}

impl From<NativeError> for LuaError {
    fn from(e: NativeError) -> Self {
        match e {
            NativeError::Message(msg) => LuaError::Runtime(msg),
            NativeError::Value(v) => LuaError::Value(v),
        }
    }
}

impl From<LuaError> for NativeError {
    fn from(e: LuaError) -> Self {
        match e {
            LuaError::Value(v) => NativeError::Value(v),
            other => NativeError::Message(other.to_string()),
        }
    }
}

pub type LuaResult<T> = Result<T, LuaError>;

/// Errors loading a [`DebugConfig`](crate::config::DebugConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse debug configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid debug configuration: {0}")]
    Validation(String),
}
