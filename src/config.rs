//! Host configuration.
//!
//! A JSON file describing the machine a program runs on. Every field is
//! optional; missing fields take their defaults. Command-line flags
//! override whatever the file says.
//!
//! ```json
//! { "cpu": { "pc_register": 0, "sp_register": 1 }, "memory_size": 4096 }
//! ```

use crate::cpu::memory::DEFAULT_MEMORY_SIZE;
use crate::cpu::registers::{ConfigError as RegisterConfigError, CpuConfig};
use crate::cpu::Word;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Special register assignment.
    pub cpu: CpuConfig,
    /// Cells of flat memory.
    pub memory_size: usize,
    /// Where the image is loaded; the PC starts here.
    pub load_address: Word,
    /// Stop after this many cycles, if set.
    pub max_cycles: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cpu: CpuConfig::default(),
            memory_size: DEFAULT_MEMORY_SIZE,
            load_address: 0,
            max_cycles: None,
        }
    }
}

impl HostConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cpu.validate()?;
        if self.memory_size == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error(transparent)]
    Registers(#[from] RegisterConfigError),

    #[error("memory size must be at least one word")]
    EmptyMemory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(HostConfig::from_json("{}").unwrap(), HostConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config =
            HostConfig::from_json(r#"{ "cpu": { "pc_register": 7 }, "max_cycles": 100 }"#).unwrap();
        assert_eq!(config.cpu.pc_register, 7);
        assert_eq!(config.cpu.sp_register, 1);
        assert_eq!(config.max_cycles, Some(100));
        assert_eq!(config.memory_size, DEFAULT_MEMORY_SIZE);
    }

    #[test]
    fn test_rejects_bad_registers() {
        let err = HostConfig::from_json(r#"{ "cpu": { "pc_register": 1 } }"#).unwrap_err();
        assert_eq!(err, ConfigError::Registers(RegisterConfigError::SharedRegister(1)));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            HostConfig::from_json(r#"{ "memory": 5 }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = HostConfig { memory_size: 128, ..HostConfig::default() };
        assert_eq!(HostConfig::from_json(&config.to_json()).unwrap(), config);
    }
}
