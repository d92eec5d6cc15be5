//! Input pipeline: ring buffer, macro replay stack, pushback, multibyte
//! assembly, event hook, and bracketed paste.
//!
//! Corresponds to `input.cc`'s layered read path (`rl_getc`, the pending
//! "execute next" character, the macro stack, and `_rl_pushed_input_available`).
//! The four layers are drained in priority order: pending char,
//! macro stack, pushback, then the underlying stream.

use std::collections::VecDeque;
use std::io::Read;

use crate::error::ReadlineError;

/// Usable capacity of the low-level ring buffer (one less than its storage
/// size, so head==tail can mean "empty" without an extra flag).
const RING_CAPACITY: usize = 511;

/// How many macros may be nested (a macro that replays another, etc.)
/// before `push_macro` refuses, so the caller can ring the bell instead of
/// overflowing the stack.
const MAX_MACRO_DEPTH: usize = 32;

/// Byte sequence the terminal sends just before pasted text, when
/// bracketed paste is enabled.
pub const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
/// Byte sequence the terminal sends just after pasted text.
pub const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

/// A fixed-capacity ring of raw input bytes, mirroring the 512-byte
/// `ibuffer` with explicit head/tail indices.
#[derive(Debug)]
struct InputRing {
    storage: Vec<u8>,
    head: usize,
    tail: usize,
}

impl InputRing {
    fn new() -> Self {
        Self {
            storage: vec![0; RING_CAPACITY + 1],
            head: 0,
            tail: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        (self.tail + 1) % self.storage.len() == self.head
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.storage[self.tail] = byte;
        self.tail = (self.tail + 1) % self.storage.len();
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let b = self.storage[self.head];
        self.head = (self.head + 1) % self.storage.len();
        Some(b)
    }
}

/// Outcome of a single layered byte read.
pub enum ReadOutcome {
    Byte(u8),
    /// Nothing available yet; the event hook was invoked and the caller
    /// should poll again.
    WouldBlock,
    Eof,
    /// No byte arrived within the requested keyseq timeout; only returned
    /// by [`InputPipeline::next_byte_timeout`].
    TimedOut,
}

/// The layered byte source feeding the dispatcher, plus bracketed-paste
/// assembly.
pub struct InputPipeline {
    ring: InputRing,
    /// A single character set by an `execute_next`-equivalent: the highest
    /// priority source, drained before everything else.
    pending: Option<u8>,
    /// Bytes pushed back after an abandoned key-sequence prefix, or a
    /// convert-meta expansion (`ESC` + cleared byte).
    pushback: VecDeque<u8>,
    /// Stack of in-flight macro replay buffers; top of stack drains first.
    macro_stack: Vec<VecDeque<u8>>,
    /// Optional cooperative yield point invoked while blocking for input.
    /// Returns `true` to tell the caller to stop waiting and report
    /// `WouldBlock` immediately.
    pub event_hook: Option<Box<dyn FnMut() -> bool>>,
    /// UTF-8 assembly scratch space for partial multibyte sequences.
    partial_char: Vec<u8>,
    /// Skip UTF-8 assembly entirely for pure-ASCII/byte-oriented streams.
    pub byte_oriented: bool,
    /// Whether bracketed paste mode is currently enabled.
    pub bracketed_paste_enabled: bool,
}

impl InputPipeline {
    pub fn new() -> Self {
        Self {
            ring: InputRing::new(),
            pending: None,
            pushback: VecDeque::new(),
            macro_stack: Vec::new(),
            event_hook: None,
            partial_char: Vec::new(),
            byte_oriented: false,
            bracketed_paste_enabled: false,
        }
    }

    /// Highest-priority one-shot byte, consumed before any other layer.
    pub fn set_pending(&mut self, byte: u8) {
        self.pending = Some(byte);
    }

    /// Push bytes to replay immediately (abandoned prefix / convert-meta
    /// expansion). Highest priority after `pending`.
    pub fn push_back(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.pushback.push_front(b);
        }
    }

    /// Begin replaying a macro's recorded bytes. Fails if the nesting depth
    /// would exceed [`MAX_MACRO_DEPTH`] (bounds runaway self-replaying
    /// macros per the dispatcher's macro-recording contract).
    pub fn push_macro(&mut self, bytes: Vec<u8>) -> Result<(), ReadlineError> {
        if self.macro_stack.len() >= MAX_MACRO_DEPTH {
            return Err(ReadlineError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "macro replay stack exceeded maximum depth",
            )));
        }
        self.macro_stack.push(bytes.into_iter().collect());
        Ok(())
    }

    fn drain_next_raw(&mut self) -> Option<u8> {
        if let Some(b) = self.pending.take() {
            return Some(b);
        }
        while let Some(top) = self.macro_stack.last_mut() {
            if let Some(b) = top.pop_front() {
                return Some(b);
            }
            self.macro_stack.pop();
        }
        if let Some(b) = self.pushback.pop_front() {
            return Some(b);
        }
        self.ring.pop()
    }

    /// Feed a raw byte into the low-level ring (e.g. bytes read from the
    /// terminal in one `read(2)` call). Returns `false` if the ring is full
    /// and the byte was dropped.
    pub fn feed_ring(&mut self, byte: u8) -> bool {
        self.ring.push(byte)
    }

    pub fn ring_has_space(&self) -> bool {
        !self.ring.is_full()
    }

    /// Whether any layered source (pending/macro/pushback/ring) has a byte
    /// ready without touching the underlying stream.
    pub fn has_buffered_input(&self) -> bool {
        self.pending.is_some()
            || self.macro_stack.iter().any(|m| !m.is_empty())
            || !self.pushback.is_empty()
            || !self.ring.is_empty()
    }

    /// Read one byte, trying the layered sources first and falling back to
    /// `source`. Invokes `event_hook` once if nothing is immediately
    /// available from any layer and `source` would block.
    pub fn next_byte<R: Read>(&mut self, source: &mut R) -> Result<ReadOutcome, ReadlineError> {
        if let Some(b) = self.drain_next_raw() {
            return Ok(ReadOutcome::Byte(b));
        }
        let mut buf = [0u8; 1];
        match source.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if let Some(hook) = self.event_hook.as_mut() {
                    hook();
                }
                Ok(ReadOutcome::WouldBlock)
            }
            Err(e) => Err(ReadlineError::Io(e)),
        }
    }

    /// Read one byte like [`InputPipeline::next_byte`], but wait at most
    /// `timeout_ms` for `fd` to become readable before falling back to the
    /// blocking `source.read`. Used while a key sequence is mid-walk in a
    /// submap, so an ambiguous prefix (e.g. a bare `ESC`) doesn't hang the
    /// dispatch loop forever waiting for a byte that will never come.
    #[cfg(unix)]
    pub fn next_byte_timeout<R: Read>(
        &mut self,
        source: &mut R,
        fd: std::os::fd::RawFd,
        timeout_ms: u64,
    ) -> Result<ReadOutcome, ReadlineError> {
        if let Some(b) = self.drain_next_raw() {
            return Ok(ReadOutcome::Byte(b));
        }
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(timeout_ms.min(u16::MAX as u64) as u16).unwrap_or(PollTimeout::MAX);
        match poll(&mut fds, timeout) {
            Ok(0) => Ok(ReadOutcome::TimedOut),
            Ok(_) => self.next_byte(source),
            Err(nix::errno::Errno::EINTR) => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(ReadlineError::Io(std::io::Error::from(e))),
        }
    }

    /// Assemble one complete UTF-8 `char` from the byte source, buffering
    /// partial sequences across calls. In `byte_oriented` mode, every byte
    /// decodes as its own Latin-1 scalar value (fast ASCII path).
    pub fn next_char<R: Read>(&mut self, source: &mut R) -> Result<Option<char>, ReadlineError> {
        loop {
            let byte = match self.next_byte(source)? {
                ReadOutcome::Byte(b) => b,
                ReadOutcome::Eof => return Ok(None),
                ReadOutcome::WouldBlock => continue,
            };
            if self.byte_oriented {
                return Ok(Some(byte as char));
            }
            self.partial_char.push(byte);
            match std::str::from_utf8(&self.partial_char) {
                Ok(s) => {
                    let ch = s.chars().next();
                    self.partial_char.clear();
                    return Ok(ch);
                }
                Err(e) if e.error_len().is_none() => {
                    // A valid prefix of a longer sequence; keep buffering,
                    // unless we've hit the max UTF-8 width (corrupt stream).
                    if self.partial_char.len() >= 4 {
                        self.partial_char.clear();
                        return Ok(Some(char::REPLACEMENT_CHARACTER));
                    }
                    continue;
                }
                Err(_) => {
                    self.partial_char.clear();
                    return Ok(Some(char::REPLACEMENT_CHARACTER));
                }
            }
        }
    }

    /// Read bytes until the bracketed-paste end marker is seen, returning
    /// the pasted text. Assumes the start marker has already been consumed.
    pub fn read_bracketed_paste<R: Read>(&mut self, source: &mut R) -> Result<String, ReadlineError> {
        let mut collected = Vec::new();
        loop {
            let byte = match self.next_byte(source)? {
                ReadOutcome::Byte(b) => b,
                ReadOutcome::Eof => break,
                ReadOutcome::WouldBlock => continue,
            };
            collected.push(byte);
            if collected.ends_with(BRACKETED_PASTE_END) {
                collected.truncate(collected.len() - BRACKETED_PASTE_END.len());
                break;
            }
        }
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }
}

impl Default for InputPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
