//! Error type for the engine boundary.
//!
//! Corresponds to the error-kind taxonomy of a `ConfigError { line, message }`
//! style (collected rather than propagated) and generalizes it to every
//! failure mode the orchestration layer can hit:
//! user errors (no state mutation), environmental errors (abort the line),
//! signal-driven cancellation, and non-fatal config diagnostics.

use thiserror::Error;

/// Everything that can cause a `read_line` call to end without a submitted
/// line, or a non-fatal diagnostic to be reported during config loading.
#[derive(Debug, Error)]
pub enum ReadlineError {
    /// The underlying stream is not a terminal (no raw mode available).
    #[error("not a terminal")]
    NotATerminal,

    /// An I/O error from the underlying stream or terminal control calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SIGINT (or Ctrl-C via the read path) interrupted the read.
    #[error("interrupted")]
    Interrupted,

    /// End of input (Ctrl-D on an empty line, or EOF on the stream).
    #[error("end of file")]
    Eof,

    /// The terminal was resized mid-read; callers using the callback form
    /// may treat this as informational and keep reading.
    #[error("window resized")]
    WindowResized,

    /// A keymap operation referenced a slot outside `0..=255` plus the
    /// any-other-key slot.
    #[error("key index {0} out of range")]
    KeyOutOfRange(u16),

    /// A directory could not be opened for filename completion.
    #[error("cannot read directory {path}: {source}")]
    CompletionIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal diagnostic produced while parsing a configuration file
/// (`set ...` / key-binding directives / `$if` blocks). Parsing continues
/// past the offending line; these are collected rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub file: Option<String>,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}: {}", self.line, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for ConfigError {}
