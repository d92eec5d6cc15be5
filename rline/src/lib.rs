//! `rline` — an embeddable interactive line-editing engine.
//!
//! This crate is the orchestration layer beneath an interactive shell or
//! REPL: it turns raw terminal bytes into logical keystrokes, maintains an
//! editable line buffer with undo, drives a completion engine, and keeps an
//! on-screen redraw in sync with the buffer. It does not implement a
//! terminal emulator, persist history to disk, or ship a vi command set —
//! those are external collaborators whose interfaces are specified and
//! consumed here.
//!
//! The top-level entry point is [`Editor`].

pub mod buffer;
pub mod completion;
pub mod config;
pub mod display;
pub mod dispatch;
pub mod editor;
pub mod error;
pub mod history;
pub mod input;
pub mod keymap;
pub mod term;

pub use buffer::{LineBuffer, Mark, UndoEntry, UndoPos};
pub use config::Policy;
pub use editor::Editor;
pub use error::ReadlineError;
pub use history::{InputHistory, RecallMode};
pub use keymap::{KeyAction, Keymap, KeymapArena, KeymapId, KeymapSetName};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReadlineError>;
