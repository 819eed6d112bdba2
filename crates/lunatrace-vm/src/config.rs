//! Debug subsystem configuration.

use crate::error::ConfigError;
use serde::Deserialize;

/// Smallest usable short-source width (room for `[string "..."]`).
pub const MIN_SOURCE_ID_SIZE: usize = 16;

/// Tunables for the debug subsystem.
///
/// ```toml
/// trace = true
/// source_id_size = 80
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    /// Emit a TRACE event with the machine state for every instruction.
    pub trace: bool,
    /// Maximum width of short source names, terminator included.
    pub source_id_size: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        DebugConfig {
            trace: false,
            source_id_size: 60,
        }
    }
}

impl DebugConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DebugConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_id_size < MIN_SOURCE_ID_SIZE {
            return Err(ConfigError::Validation(format!(
                "source_id_size must be at least {MIN_SOURCE_ID_SIZE}, got {}",
                self.source_id_size
            )));
        }
        Ok(())
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
