//! Compiler configuration: the handful of backend behaviors left as
//! configurable rather than fixed. Resolved by a `CompilerConfig`, loadable
//! from a TOML file the way `crates/compiler/src/config.rs` loads its
//! extensibility settings via `serde`/`toml`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::CompileError;

/// Which `syscall` code `print` uses for a floating-point operand.
/// MIPS32 reserves code 1 for integers and code 2 for single-precision
/// floats; both are always available, so this is a pure style choice
/// rather than a platform constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatPrintMode {
    /// `syscall` 2, printing the IEEE-754 value directly (default).
    NativeFloat,
    /// `syscall` 1 after truncating to an integer; matches engines with no
    /// float-print syscall available.
    TruncateToInt,
}

impl Default for FloatPrintMode {
    fn default() -> Self {
        FloatPrintMode::NativeFloat
    }
}

/// Whether integer arithmetic wraps silently or traps on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// `addu`/`subu`/`mul`: silent two's-complement wraparound (default).
    Wrapping,
    /// `add`/`sub`: traps to the MIPS overflow exception handler.
    Trapping,
}

impl Default for OverflowMode {
    fn default() -> Self {
        OverflowMode::Wrapping
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub float_print_mode: FloatPrintMode,
    pub overflow_mode: OverflowMode,
    /// Whether `new ClassName()` stores an explicit default value into every
    /// field with no initializer (`true`, the default) or leaves backend
    /// memory for those fields unwritten.
    pub zero_fill_new_fields: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            float_print_mode: FloatPrintMode::default(),
            overflow_mode: OverflowMode::default(),
            zero_fill_new_fields: true,
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CompileError> {
        toml::from_str(s).map_err(|e| CompileError::resource(format!("invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::resource(format!("cannot read config '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

impl fmt::Display for FloatPrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatPrintMode::NativeFloat => write!(f, "native_float"),
            FloatPrintMode::TruncateToInt => write!(f, "truncate_to_int"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.float_print_mode, FloatPrintMode::NativeFloat);
        assert_eq!(cfg.overflow_mode, OverflowMode::Wrapping);
        assert!(cfg.zero_fill_new_fields);
    }

    #[test]
    fn parses_partial_toml_overrides() {
        let cfg = CompilerConfig::from_toml_str("overflow_mode = \"trapping\"\n").unwrap();
        assert_eq!(cfg.overflow_mode, OverflowMode::Trapping);
        assert_eq!(cfg.float_print_mode, FloatPrintMode::NativeFloat);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = CompilerConfig::from_toml_str("overflow_mode = not valid toml {{{").unwrap_err();
        assert_eq!(err.kind(), "ResourceError");
    }
}
