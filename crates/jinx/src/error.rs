//! Error types for the compile and execution pipelines.
//!
//! Errors never cross the host boundary as panics. Compilation failures are
//! logged through the runtime's sink and surface as `None` from
//! [`Runtime::compile`](crate::Runtime::compile); runtime errors poison the
//! script, making [`Script::execute`](crate::Script::execute) return `false`.

use std::fmt;

/// A lexing or parsing failure, carrying the source position it occurred at.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Script name given at compile time (may be empty).
    pub script_name: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column (tabs count as 4 columns).
    pub column: u32,
    /// Human-readable description.
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(
        script_name: impl Into<String>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.script_name.is_empty() {
            write!(
                f,
                "Error at line {}, column {}: {}",
                self.line, self.column, self.message
            )
        } else {
            write!(
                f,
                "Error in '{}' at line {}, column {}: {}",
                self.script_name, self.line, self.column, self.message
            )
        }
    }
}

impl std::error::Error for CompileError {}

/// An error raised while executing bytecode.
#[derive(Debug, Clone)]
pub(crate) struct RunError {
    pub message: String,
}

impl RunError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for RunError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RunError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
