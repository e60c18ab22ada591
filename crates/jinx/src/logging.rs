//! Log sink plumbing.
//!
//! All diagnostics (compile errors, runtime errors, symbol and bytecode dumps,
//! and the core library's `write` functions) flow through a per-runtime
//! [`LogSink`]. Hosts install their own callback via
//! [`GlobalParams::log_fn`](crate::GlobalParams); the default sink writes
//! informational output to stdout and errors to stderr.

use std::sync::Arc;

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Informational or debugging output, including script `write` output.
    Info,
    /// A potential problem that did not stop compilation or execution.
    Warning,
    /// A compile-time or run-time error.
    Error,
}

/// Host-provided logging callback.
///
/// The text passed to the callback is raw: newline characters are included
/// where the source of the message intends them (the core `write` function,
/// for example, emits no trailing newline).
pub type LogFn = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Per-runtime log sink.
pub(crate) struct LogSink {
    enabled: bool,
    log_fn: Option<LogFn>,
}

impl LogSink {
    pub(crate) fn new(enabled: bool, log_fn: Option<LogFn>) -> Self {
        Self { enabled, log_fn }
    }

    /// Writes raw text to the sink without appending a newline.
    pub(crate) fn write(&self, level: LogLevel, text: &str) {
        if !self.enabled {
            return;
        }
        match &self.log_fn {
            Some(f) => f(level, text),
            None => {
                if level == LogLevel::Error {
                    eprint!("{text}");
                } else {
                    print!("{text}");
                }
            }
        }
    }

    /// Writes a line of text to the sink.
    pub(crate) fn write_line(&self, level: LogLevel, text: &str) {
        if !self.enabled {
            return;
        }
        match &self.log_fn {
            Some(f) => f(level, &format!("{text}\n")),
            None => {
                if level == LogLevel::Error {
                    eprintln!("{text}");
                } else {
                    println!("{text}");
                }
            }
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("enabled", &self.enabled)
            .field("log_fn", &self.log_fn.as_ref().map(|_| "..."))
            .finish()
    }
}
