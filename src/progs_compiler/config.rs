// Compiler options
//
// Loaded from TOML or built in code. Every key is optional; missing keys
// take the defaults below.

use super::error::CompilerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// First global after null (0), return (1..=3) and eight 3-slot parameters
pub const DEFAULT_USER_STORAGE_START: i32 = 28;
pub const PROGS_VERSION: i32 = 6;
/// Header CRC the stock engine expects for its progdefs
pub const DEFAULT_CRC: i32 = 5927;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    pub user_storage_start: i32,
    /// Share one global slot between equal constants
    pub merge_constants: bool,
    /// Reuse local slots once their lexical scope closes
    pub scope_folding: bool,
    /// Keep the free list alive across function boundaries
    pub overlap_locals: bool,
    pub version: i32,
    pub crc: i32,
    pub source_name: String,
    /// Builtin numbers bound to `__builtin_mod` / `__builtin_xor` when the
    /// program does not declare them itself
    pub builtin_mod: i32,
    pub builtin_xor: i32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            user_storage_start: DEFAULT_USER_STORAGE_START,
            merge_constants: true,
            scope_folding: false,
            overlap_locals: false,
            version: PROGS_VERSION,
            crc: DEFAULT_CRC,
            source_name: String::new(),
            builtin_mod: 245,
            builtin_xor: 246,
        }
    }
}

impl CompilerOptions {
    pub fn from_toml(text: &str) -> Result<Self, CompilerError> {
        let options: CompilerOptions =
            toml::from_str(text).map_err(|e| CompilerError::ConfigError(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CompilerError::IOError(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loading compiler options from {}", path.display());
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), CompilerError> {
        if self.user_storage_start < DEFAULT_USER_STORAGE_START {
            return Err(CompilerError::ConfigError(format!(
                "user_storage_start {} overlaps the reserved globals (minimum {})",
                self.user_storage_start, DEFAULT_USER_STORAGE_START
            )));
        }
        if self.builtin_mod <= 0 || self.builtin_xor <= 0 {
            return Err(CompilerError::ConfigError(
                "builtin numbers must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
