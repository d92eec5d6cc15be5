//! Public facade: wires the keymap arena, dispatcher, line buffer,
//! completion engine, display engine, history, and terminal glue into the
//! two entry points callers actually use.
//!
//! Owns a keymap arena plus a terminal guard and drives the read loop, in
//! the shape of a library-facing type an embedder constructs once and
//! calls repeatedly.

use std::io::{Read, Write};
use std::ops::ControlFlow;

use crate::buffer::LineBuffer;
use crate::completion::{self, CompletionAction, CompletionConfig, CompletionHooks, CompletionOutcome};
use crate::config::Policy;
use crate::dispatch::{Commands, DispatchSignal, Dispatcher};
use crate::display::{Display, DisplayConfig};
use crate::error::ReadlineError;
use crate::history::{InputHistory, RecallMode};
use crate::input::{InputPipeline, ReadOutcome};
use crate::keymap::{CommandId, KeymapArena, KeymapId, KeymapSetName};
use crate::term::{poll_signals, SignalAction, TermGuard};

/// Read the next byte of a mid-walk key sequence, applying the keyseq
/// timeout on platforms that can poll a raw descriptor. Polls the process's
/// own stdin, matching [`crate::term::TermGuard`]'s assumption that the
/// terminal being edited on is always the process's controlling terminal.
#[cfg(unix)]
fn read_keyseq_byte<R: Read>(
    pipeline: &mut InputPipeline,
    source: &mut R,
    timeout_ms: u64,
) -> Result<ReadOutcome, ReadlineError> {
    pipeline.next_byte_timeout(source, libc::STDIN_FILENO, timeout_ms)
}

#[cfg(not(unix))]
fn read_keyseq_byte<R: Read>(
    pipeline: &mut InputPipeline,
    source: &mut R,
    _timeout_ms: u64,
) -> Result<ReadOutcome, ReadlineError> {
    pipeline.next_byte(source)
}

/// Whether the engine has built its keymaps yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
}

/// The engine's default command set, assigned ids starting at
/// [`crate::dispatch::FIRST_USER_COMMAND`]. An embedder may register more
/// by binding additional [`CommandId`]s and handling them in its own
/// [`Commands`] implementation; these are the ones `Editor` itself drives
/// directly (self-insert, accept-line, completion, history recall).
pub mod builtin {
    use crate::dispatch::FIRST_USER_COMMAND;
    use crate::keymap::CommandId;

    pub const SELF_INSERT: CommandId = CommandId(FIRST_USER_COMMAND);
    pub const ACCEPT_LINE: CommandId = CommandId(FIRST_USER_COMMAND + 1);
    pub const BACKWARD_DELETE_CHAR: CommandId = CommandId(FIRST_USER_COMMAND + 2);
    pub const DELETE_CHAR: CommandId = CommandId(FIRST_USER_COMMAND + 3);
    pub const FORWARD_CHAR: CommandId = CommandId(FIRST_USER_COMMAND + 4);
    pub const BACKWARD_CHAR: CommandId = CommandId(FIRST_USER_COMMAND + 5);
    pub const BEGINNING_OF_LINE: CommandId = CommandId(FIRST_USER_COMMAND + 6);
    pub const END_OF_LINE: CommandId = CommandId(FIRST_USER_COMMAND + 7);
    pub const KILL_LINE: CommandId = CommandId(FIRST_USER_COMMAND + 8);
    pub const YANK: CommandId = CommandId(FIRST_USER_COMMAND + 9);
    pub const YANK_POP: CommandId = CommandId(FIRST_USER_COMMAND + 10);
    pub const UNDO: CommandId = CommandId(FIRST_USER_COMMAND + 11);
    pub const COMPLETE: CommandId = CommandId(FIRST_USER_COMMAND + 12);
    pub const POSSIBLE_COMPLETIONS: CommandId = CommandId(FIRST_USER_COMMAND + 13);
    pub const HISTORY_PREVIOUS: CommandId = CommandId(FIRST_USER_COMMAND + 14);
    pub const HISTORY_NEXT: CommandId = CommandId(FIRST_USER_COMMAND + 15);
    pub const EOF_OR_DELETE: CommandId = CommandId(FIRST_USER_COMMAND + 16);
}

/// Everything one `read_line` call needs beyond what persists across
/// calls on the same `Editor` (history, kill ring, keymaps, macros).
struct Session {
    buffer: LineBuffer,
    last_yank_len: usize,
    /// A completions listing awaiting render, set by `EditorCommands` when
    /// `completion::complete` returns `CompletionOutcome::List` and
    /// consumed by `drive`'s read loop right after dispatch.
    pending_listing: Option<completion::Listing>,
}

impl Session {
    fn new() -> Self {
        Self {
            buffer: LineBuffer::new(),
            last_yank_len: 0,
            pending_listing: None,
        }
    }
}

/// The line-editing engine. Owns keymaps, dispatch state, history, the
/// kill ring (via the per-call `LineBuffer`), policy/config state, and
/// (while reading) the terminal guard and display snapshot.
///
/// One `Editor` is used serially: construct it once, call
/// [`Editor::read_line`] or [`Editor::feed_byte`] repeatedly.
pub struct Editor {
    lifecycle: Lifecycle,
    arena: KeymapArena,
    root: KeymapId,
    dispatcher: Dispatcher,
    history: InputHistory,
    policy: Policy,
    completion_config: CompletionConfig,
    display_config: DisplayConfig,
}

impl Editor {
    /// Build the engine, constructing the default `emacs-standard` keymap
    /// set with a representative binding set.
    pub fn new() -> Self {
        let mut arena = KeymapArena::new();
        let root = arena.standard_set(KeymapSetName::EmacsStandard);
        Self::bind_defaults(&mut arena, root);
        let dispatcher = Dispatcher::new(root);
        Self {
            lifecycle: Lifecycle::Initialized,
            arena,
            root,
            dispatcher,
            history: InputHistory::new(500),
            policy: Policy::default(),
            completion_config: CompletionConfig::default(),
            display_config: DisplayConfig::default(),
        }
    }

    fn bind_defaults(arena: &mut KeymapArena, root: KeymapId) {
        use crate::dispatch::{
            CMD_CALL_LAST_KBD_MACRO, CMD_END_KBD_MACRO, CMD_START_KBD_MACRO, CMD_UNIVERSAL_ARGUMENT,
        };
        use crate::keymap::KeyAction;
        use builtin::*;

        for b in 0x20u8..0x7f {
            arena.get_mut(root).bind(b, Some(KeyAction::Function(SELF_INSERT)));
        }
        arena.get_mut(root).bind(b'\r', Some(KeyAction::Function(ACCEPT_LINE)));
        arena.get_mut(root).bind(b'\n', Some(KeyAction::Function(ACCEPT_LINE)));
        arena.get_mut(root).bind(0x7f, Some(KeyAction::Function(BACKWARD_DELETE_CHAR)));
        arena.get_mut(root).bind(0x04, Some(KeyAction::Function(EOF_OR_DELETE)));
        arena.get_mut(root).bind(0x02, Some(KeyAction::Function(BACKWARD_CHAR))); // ^B
        arena.get_mut(root).bind(0x06, Some(KeyAction::Function(FORWARD_CHAR))); // ^F
        arena.get_mut(root).bind(0x01, Some(KeyAction::Function(BEGINNING_OF_LINE))); // ^A
        arena.get_mut(root).bind(0x05, Some(KeyAction::Function(END_OF_LINE))); // ^E
        arena.get_mut(root).bind(0x0b, Some(KeyAction::Function(KILL_LINE))); // ^K
        arena.get_mut(root).bind(0x19, Some(KeyAction::Function(YANK))); // ^Y
        arena.get_mut(root).bind(0x1f, Some(KeyAction::Function(UNDO))); // ^_
        arena.get_mut(root).bind(b'\t', Some(KeyAction::Function(COMPLETE)));
        arena.get_mut(root).bind(0x10, Some(KeyAction::Function(HISTORY_PREVIOUS))); // ^P
        arena.get_mut(root).bind(0x0e, Some(KeyAction::Function(HISTORY_NEXT))); // ^N
        arena.get_mut(root).bind(0x15, Some(KeyAction::Function(CMD_UNIVERSAL_ARGUMENT))); // ^U

        let meta = arena.standard_set(KeymapSetName::EmacsMeta);
        arena.get_mut(root).bind(0x1b, Some(KeyAction::Submap(meta)));
        arena.get_mut(meta).bind(b'?', Some(KeyAction::Function(POSSIBLE_COMPLETIONS)));
        arena.get_mut(meta).bind(b'*', Some(KeyAction::Function(CommandId(
            crate::dispatch::FIRST_USER_COMMAND + 100,
        ))));
        arena.get_mut(meta).bind(b'y', Some(KeyAction::Function(YANK_POP)));
        arena.get_mut(meta).bind(0x28, Some(KeyAction::Function(CMD_START_KBD_MACRO))); // M-(
        arena.get_mut(meta).bind(0x29, Some(KeyAction::Function(CMD_END_KBD_MACRO))); // M-)
        arena.get_mut(meta).bind(b'e', Some(KeyAction::Function(CMD_CALL_LAST_KBD_MACRO)));
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut InputHistory {
        &mut self.history
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    pub fn completion_config_mut(&mut self) -> &mut CompletionConfig {
        &mut self.completion_config
    }

    pub fn display_config_mut(&mut self) -> &mut DisplayConfig {
        &mut self.display_config
    }

    pub fn arena_mut(&mut self) -> (&mut KeymapArena, KeymapId) {
        (&mut self.arena, self.root)
    }

    /// Blocking entry point: read and edit a line from `source`,
    /// rendering through `out`, until it is submitted or an error/signal
    /// unwinds the read. Acquires a [`TermGuard`] for the duration of the
    /// call.
    pub fn read_line<R: Read, W: Write>(
        &mut self,
        prompt: &str,
        source: &mut R,
        out: W,
        hooks: &mut CompletionHooks,
    ) -> Result<String, ReadlineError> {
        debug_assert_eq!(self.lifecycle, Lifecycle::Initialized);

        let _guard = TermGuard::acquire()?;
        let (w, h) = TermGuard::size();
        self.display_config.screen_width = w as usize;
        self.display_config.screen_height = h as usize;
        self.drive(prompt, source, out, hooks)
    }

    /// The read-dispatch-redraw cycle itself, without terminal acquisition.
    /// Split out from [`Editor::read_line`] so it can be exercised against
    /// a plain `Vec<u8>` writer and a non-terminal reader in tests, while
    /// real callers always go through `read_line`'s `TermGuard` scope.
    fn drive<R: Read, W: Write>(
        &mut self,
        prompt: &str,
        source: &mut R,
        out: W,
        hooks: &mut CompletionHooks,
    ) -> Result<String, ReadlineError> {
        let mut pipeline = InputPipeline::new();
        let mut session = Session::new();
        let mut display = Display::new(out);
        let expanded = crate::display::expand_prompt(prompt);

        display.redraw(&expanded, session.buffer.chars(), session.buffer.point(), None, &self.display_config)?;

        loop {
            match poll_signals() {
                ControlFlow::Break(err) => return Err(err),
                ControlFlow::Continue(Some(SignalAction::Resize)) => {
                    let (w, h) = TermGuard::size();
                    self.display_config.screen_width = w as usize;
                    self.display_config.screen_height = h as usize;
                    display.force_update();
                }
                ControlFlow::Continue(Some(SignalAction::Suspended)) => {
                    display.force_update();
                }
                ControlFlow::Continue(None) => {}
            }

            // A multi-byte key sequence (an `ESC`-prefixed escape code, say)
            // leaves the dispatcher mid-walk in a submap between bytes; wait
            // only up to `keyseq-timeout` for the next one so a lone `ESC`
            // doesn't block forever; outside a submap, read normally.
            let signal = if self.dispatcher.is_mid_sequence() {
                let timeout_ms = self.policy.int_or("keyseq-timeout", 500).max(0) as u64;
                match read_keyseq_byte(&mut pipeline, source, timeout_ms)? {
                    ReadOutcome::Byte(b) => {
                        let mut facade = EditorCommands {
                            session: &mut session,
                            history: &mut self.history,
                            policy: &mut self.policy,
                            completion_config: &self.completion_config,
                            hooks,
                        };
                        self.dispatcher.dispatch_byte(&self.arena, self.root, b, &mut pipeline, &mut facade)
                    }
                    ReadOutcome::TimedOut => {
                        let mut facade = EditorCommands {
                            session: &mut session,
                            history: &mut self.history,
                            policy: &mut self.policy,
                            completion_config: &self.completion_config,
                            hooks,
                        };
                        self.dispatcher.timeout_abandon(&self.arena, self.root, &mut pipeline, &mut facade)
                    }
                    ReadOutcome::Eof => return Err(ReadlineError::Eof),
                    ReadOutcome::WouldBlock => continue,
                }
            } else {
                let ch = match pipeline.next_char(source)? {
                    Some(c) => c,
                    None => return Err(ReadlineError::Eof),
                };

                // The keymap tree is byte-indexed (it must distinguish escape
                // sequences byte by byte), so an ASCII key walks the dispatcher
                // normally. A non-ASCII character has no useful per-byte keymap
                // meaning, so it bypasses dispatch and inserts directly, the way
                // `_rl_insert_char` handles multibyte input outside the keymap.
                if ch.is_ascii() {
                    let mut byte_buf = [0u8; 1];
                    let b = ch.encode_utf8(&mut byte_buf).as_bytes()[0];
                    let mut facade = EditorCommands {
                        session: &mut session,
                        history: &mut self.history,
                        policy: &mut self.policy,
                        completion_config: &self.completion_config,
                        hooks,
                    };
                    self.dispatcher.dispatch_byte(&self.arena, self.root, b, &mut pipeline, &mut facade)
                } else {
                    session.buffer.insert(&ch.to_string());
                    DispatchSignal::Continue
                }
            };

            match signal {
                DispatchSignal::Continue => {}
                DispatchSignal::Bell => {
                    display.bell()?;
                }
                DispatchSignal::Submit(line) => {
                    self.history.record(&line);
                    return Ok(line);
                }
            }

            if let Some(listing) = session.pending_listing.take() {
                let mut show = true;
                if let Some(n) = listing.confirm_count {
                    display.print_listing(&[format!("Display all {n} possibilities? (y or n)")])?;
                    loop {
                        match pipeline.next_char(source)? {
                            Some('y') | Some('Y') => break,
                            Some('n') | Some('N') | None => {
                                show = false;
                                break;
                            }
                            Some(_) => continue,
                        }
                    }
                }
                if show {
                    let page_size = self.display_config.screen_height.saturating_sub(1).max(1);
                    if listing.rows.len() <= page_size {
                        display.print_listing(&listing.rows)?;
                    } else {
                        let mut pager = completion::Pager::new(&listing.rows, page_size);
                        'paging: while let Some(page) = pager.next_page() {
                            display.print_listing(page)?;
                            if pager.is_done() {
                                break;
                            }
                            display.print_listing(&["--More--".to_string()])?;
                            loop {
                                match pipeline.next_char(source)? {
                                    Some(c) => match completion::classify_pager_key(c) {
                                        completion::PagerKey::Continue => break,
                                        completion::PagerKey::Stop => break 'paging,
                                        completion::PagerKey::OneLine => {
                                            if let Some(line) = pager.next_lines(1) {
                                                display.print_listing(line)?;
                                            }
                                            if pager.is_done() {
                                                break 'paging;
                                            }
                                        }
                                        completion::PagerKey::Other => continue,
                                    },
                                    None => break 'paging,
                                }
                            }
                        }
                    }
                }
                display.force_update();
            }

            let region = session.buffer.region();
            display.redraw(&expanded, session.buffer.chars(), session.buffer.point(), region, &self.display_config)?;
        }
    }

    /// Callback entry point: feed one byte of already-read input and
    /// report whether the line is complete. The caller owns reading from
    /// the terminal and redraw timing; `Editor` only advances dispatch
    /// state and the buffer. Returns `Some(line)` once accepted.
    pub fn feed_byte(&mut self, byte: u8, session_buffer: &mut LineBuffer, hooks: &mut CompletionHooks) -> Result<Option<String>, ReadlineError> {
        let mut pipeline = InputPipeline::new();
        let mut session = Session {
            buffer: std::mem::replace(session_buffer, LineBuffer::new()),
            last_yank_len: 0,
            pending_listing: None,
        };
        let mut facade = EditorCommands {
            session: &mut session,
            history: &mut self.history,
            policy: &mut self.policy,
            completion_config: &self.completion_config,
            hooks,
        };
        let signal = self
            .dispatcher
            .dispatch_byte(&self.arena, self.root, byte, &mut pipeline, &mut facade);
        *session_buffer = session.buffer;

        match signal {
            DispatchSignal::Continue => Ok(None),
            DispatchSignal::Bell => Ok(None),
            DispatchSignal::Submit(line) => {
                self.history.record(&line);
                Ok(Some(line))
            }
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges [`Dispatcher::dispatch_byte`]'s [`Commands`] trait to the
/// engine's actual state, without requiring `Editor` itself to hand out
/// more than one `&mut` borrow at a time.
struct EditorCommands<'a> {
    session: &'a mut Session,
    history: &'a mut InputHistory,
    policy: &'a mut Policy,
    completion_config: &'a CompletionConfig,
    hooks: &'a mut CompletionHooks,
}

impl Commands for EditorCommands<'_> {
    fn invoke(&mut self, id: CommandId, count: i32, key: u8) -> DispatchSignal {
        use builtin::*;

        let buf = &mut self.session.buffer;
        let reps = count.unsigned_abs().max(1) as usize;
        let backward = count < 0;

        match id {
            SELF_INSERT => {
                let ch = key as char;
                for _ in 0..reps {
                    buf.insert(&ch.to_string());
                }
                DispatchSignal::Continue
            }
            ACCEPT_LINE => DispatchSignal::Submit(buf.take_line()),
            BACKWARD_DELETE_CHAR => {
                let p = buf.point();
                let start = p.saturating_sub(reps);
                if start == p {
                    return DispatchSignal::Bell;
                }
                buf.delete(start, p);
                DispatchSignal::Continue
            }
            DELETE_CHAR | EOF_OR_DELETE => {
                let p = buf.point();
                if buf.is_empty() && id == EOF_OR_DELETE {
                    return DispatchSignal::Submit(String::new());
                }
                let end = (p + reps).min(buf.len());
                if end == p {
                    return DispatchSignal::Bell;
                }
                buf.delete(p, end);
                DispatchSignal::Continue
            }
            FORWARD_CHAR => {
                let p = buf.point();
                buf.set_point(if backward { p.saturating_sub(reps) } else { p + reps });
                DispatchSignal::Continue
            }
            BACKWARD_CHAR => {
                let p = buf.point();
                buf.set_point(if backward { p + reps } else { p.saturating_sub(reps) });
                DispatchSignal::Continue
            }
            BEGINNING_OF_LINE => {
                buf.set_point(0);
                DispatchSignal::Continue
            }
            END_OF_LINE => {
                buf.set_point(buf.len());
                DispatchSignal::Continue
            }
            KILL_LINE => {
                let p = buf.point();
                buf.kill(p, buf.len());
                DispatchSignal::Continue
            }
            YANK => {
                self.session.last_yank_len = buf.yank();
                DispatchSignal::Continue
            }
            YANK_POP => match buf.yank_pop(self.session.last_yank_len) {
                Ok(n) => {
                    self.session.last_yank_len = n;
                    DispatchSignal::Continue
                }
                Err(_) => DispatchSignal::Bell,
            },
            UNDO => {
                if buf.do_undo() {
                    DispatchSignal::Continue
                } else {
                    DispatchSignal::Bell
                }
            }
            COMPLETE => {
                match completion::complete(buf, CompletionAction::Insert, self.hooks, self.completion_config) {
                    Ok(CompletionOutcome::Inserted) => DispatchSignal::Continue,
                    Ok(CompletionOutcome::InsertedAmbiguous) => DispatchSignal::Bell,
                    Ok(CompletionOutcome::Bell) => DispatchSignal::Bell,
                    Ok(CompletionOutcome::List(_)) => DispatchSignal::Continue,
                    Ok(CompletionOutcome::Displayed) => DispatchSignal::Continue,
                    Err(_) => DispatchSignal::Bell,
                }
            }
            POSSIBLE_COMPLETIONS => {
                match completion::complete(buf, CompletionAction::List, self.hooks, self.completion_config) {
                    Ok(CompletionOutcome::List(listing)) => {
                        self.session.pending_listing = Some(listing);
                        DispatchSignal::Continue
                    }
                    Ok(_) => DispatchSignal::Continue,
                    Err(_) => DispatchSignal::Bell,
                }
            }
            HISTORY_PREVIOUS => {
                let current = buf.text();
                match self.history.recall(1, RecallMode::Exact, &current) {
                    Some(text) => {
                        let text = text.to_owned();
                        buf.set_text(&text);
                        DispatchSignal::Continue
                    }
                    None => DispatchSignal::Bell,
                }
            }
            HISTORY_NEXT => {
                let current = buf.text();
                match self.history.recall(-1, RecallMode::Exact, &current) {
                    Some(text) => {
                        let text = text.to_owned();
                        buf.set_text(&text);
                        DispatchSignal::Continue
                    }
                    None => DispatchSignal::Bell,
                }
            }
            _ if id == CommandId(crate::dispatch::FIRST_USER_COMMAND + 100) => {
                match completion::complete(buf, CompletionAction::InsertAll, self.hooks, self.completion_config) {
                    Ok(_) => DispatchSignal::Continue,
                    Err(_) => DispatchSignal::Bell,
                }
            }
            _ => DispatchSignal::Bell,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn typing_and_accept_line_round_trips() {
        let mut editor = Editor::new();
        let mut input = Cursor::new(b"hello\r".to_vec());
        let out = Vec::new();
        let mut hooks = CompletionHooks::default();
        let line = editor.drive("> ", &mut input, out, &mut hooks).unwrap();
        assert_eq!(line, "hello");
    }

    #[test]
    fn backward_delete_char_removes_last_byte() {
        let mut editor = Editor::new();
        let mut input = Cursor::new(b"helloo\x7f\r".to_vec());
        let out = Vec::new();
        let mut hooks = CompletionHooks::default();
        let line = editor.drive("> ", &mut input, out, &mut hooks).unwrap();
        assert_eq!(line, "hello");
    }

    #[test]
    fn history_previous_recalls_last_submitted_line() {
        let mut editor = Editor::new();
        {
            let mut input = Cursor::new(b"first\r".to_vec());
            let mut hooks = CompletionHooks::default();
            editor.drive("> ", &mut input, Vec::new(), &mut hooks).unwrap();
        }
        let mut input = Cursor::new(vec![0x10, b'\r']); // ^P then enter
        let mut hooks = CompletionHooks::default();
        let line = editor.drive("> ", &mut input, Vec::new(), &mut hooks).unwrap();
        assert_eq!(line, "first");
    }

    #[test]
    fn eof_on_empty_line_submits_empty_string() {
        let mut editor = Editor::new();
        let mut input = Cursor::new(vec![0x04]); // ^D on empty buffer
        let mut hooks = CompletionHooks::default();
        let line = editor.drive("> ", &mut input, Vec::new(), &mut hooks).unwrap();
        assert_eq!(line, "");
    }

    #[test]
    fn feed_byte_form_accumulates_and_submits() {
        let mut editor = Editor::new();
        let mut buf = LineBuffer::new();
        let mut hooks = CompletionHooks::default();
        assert_eq!(editor.feed_byte(b'h', &mut buf, &mut hooks).unwrap(), None);
        assert_eq!(editor.feed_byte(b'i', &mut buf, &mut hooks).unwrap(), None);
        assert_eq!(buf.text(), "hi");
        let result = editor.feed_byte(b'\r', &mut buf, &mut hooks).unwrap();
        assert_eq!(result, Some("hi".to_owned()));
    }
}
