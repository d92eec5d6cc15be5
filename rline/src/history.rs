//! Input history: a bounded ring of submitted lines with absolute, prefix,
//! and jump recall, plus csh-style `^old^new^` quick substitution.
//!
//! The ring holds only completed lines; the line currently being edited is
//! kept out-of-band in `live_line` and restored once recall walks back past
//! the newest entry. Persisting the ring to disk is left to an embedder —
//! this module only manages the in-memory contract `^P`/`^N`/`^R`-style
//! bindings need.
//!
//! ## Recall modes
//!
//! | Mode | Behaviour |
//! |------|-----------|
//! | [`RecallMode::Exact`] | Step n entries back (n>0) or forward (n<0) |
//! | [`RecallMode::Prefix`] | Find the nth entry (in the requested direction) whose text starts with the live line |
//! | [`RecallMode::Jump`] | Jump straight to the oldest (n<0) or newest (n>0) entry |

use std::collections::VecDeque;

// ── RecallMode ────────────────────────────────────────────────────────────────

/// How [`InputHistory::recall`] searches the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallMode {
    /// Absolute step: move n entries back (n>0) or forward (n<0).
    Exact,
    /// Prefix search: find the nth entry whose text starts with the live line.
    Prefix,
    /// Jump: n<0 → oldest entry, n>0 → newest saved entry.
    Jump,
}

// ── InputHistory ──────────────────────────────────────────────────────────────

/// A ring buffer of past input lines plus a cursor into it.
///
/// Entries are stored newest-first. Cursor position `0` means "at the live
/// line being edited"; position `k` (`k >= 1`) means "at `entries[k - 1]`".
#[derive(Debug, Clone)]
pub struct InputHistory {
    /// Past input lines, newest first.
    entries: VecDeque<String>,
    /// Maximum number of entries to keep.
    capacity: usize,
    /// `0` = at the live line; `k` = `k` entries back in the ring.
    cursor: usize,
    /// The line being edited, captured the moment recall first leaves it.
    live_line: String,
}

impl InputHistory {
    /// Create an empty history that retains at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            cursor: 0,
            live_line: String::new(),
        }
    }

    /// Number of entries stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored entries, newest first. For a host that wants to persist
    /// the ring itself; this module implements no file format.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Repopulate the ring from a saved sequence, newest first, trimming to
    /// `capacity` if the source is longer. Does not disturb the live cursor.
    pub fn extend(&mut self, saved: impl IntoIterator<Item = String>) {
        for line in saved {
            self.entries.push_back(line);
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    /// Record `line` as the most recently submitted input.
    ///
    /// Consecutive duplicate lines are collapsed to one entry, and the
    /// cursor resets to the live line.
    pub fn record(&mut self, line: &str) {
        self.cursor = 0;
        self.live_line.clear();

        if line.is_empty() {
            return;
        }
        if self.entries.front().is_some_and(|e| e == line) {
            return;
        }
        self.entries.push_front(line.to_owned());
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    // ── Recall ────────────────────────────────────────────────────────────────

    /// Capture `current` as the live line, the first time recall leaves it.
    pub fn sync(&mut self, current: &str) {
        if self.cursor == 0 {
            self.live_line = current.to_owned();
        }
    }

    /// Move the recall cursor by `n` steps (positive = older, negative =
    /// newer), returning the text to load into the editor or `None` if the
    /// boundary was already reached (the caller should ring the bell).
    ///
    /// `current` is the live editing text, used for prefix matching and
    /// captured by [`InputHistory::sync`] when recall first leaves it.
    pub fn recall(&mut self, n: i32, mode: RecallMode, current: &str) -> Option<&str> {
        self.sync(current);

        let next_cursor = match mode {
            RecallMode::Jump => self.jump_cursor(n)?,
            RecallMode::Exact => self.exact_cursor(n)?,
            RecallMode::Prefix => self.prefix_cursor(n)?,
        };
        self.cursor = next_cursor;
        Some(self.entry_at_cursor())
    }

    fn entry_at_cursor(&self) -> &str {
        if self.cursor == 0 {
            &self.live_line
        } else {
            &self.entries[self.cursor - 1]
        }
    }

    fn jump_cursor(&self, n: i32) -> Option<usize> {
        if n < 0 {
            if self.entries.is_empty() {
                return None;
            }
            Some(self.entries.len())
        } else if self.cursor == 0 {
            None
        } else {
            Some(1)
        }
    }

    fn exact_cursor(&self, n: i32) -> Option<usize> {
        let target = self.cursor as i64 + n as i64;
        if target < 0 {
            None
        } else if target as usize > self.entries.len() {
            None
        } else {
            Some(target as usize)
        }
    }

    /// Walk away from `cursor` in the direction `n` indicates, returning the
    /// 1-based cursor of the `steps`-th entry (by ring index) that starts
    /// with `prefix`, or `None` if fewer than `steps` such entries exist in
    /// that direction.
    fn prefix_cursor(&self, n: i32) -> Option<usize> {
        let prefix = self.live_line.clone();
        let steps = n.unsigned_abs() as usize;
        let start = self.cursor;

        let steps = steps.checked_sub(1)?;

        if n > 0 {
            (start..self.entries.len())
                .filter(|&i| self.entries[i].starts_with(&prefix))
                .nth(steps)
                .map(|i| i + 1)
        } else {
            if start == 0 {
                return None;
            }
            // Cursor `0` (the live line) always counts as a match once the
            // search runs out of older candidates, so falling off the front
            // of this range lands back on the live line rather than failing.
            match (0..start - 1)
                .rev()
                .filter(|&i| self.entries[i].starts_with(&prefix))
                .nth(steps)
            {
                Some(i) => Some(i + 1),
                None => Some(0),
            }
        }
    }

    /// Reset the recall cursor back to the live line without clearing history.
    pub fn reset_recall(&mut self) {
        self.cursor = 0;
        self.live_line.clear();
    }

    // ── ^old^new substitution ─────────────────────────────────────────────────

    /// Perform csh-style `^old^new^` substitution against the most recent
    /// entry: replace the first occurrence of `old` in that entry with `new`
    /// and return the result, or `None` if `old` was not found there.
    ///
    /// Accepts both `^old^new` and `old^new` (the leading `^` is usually
    /// stripped by the caller before this is reached).
    pub fn history_sub(&self, spec: &str) -> Option<String> {
        let spec = spec.strip_prefix('^').unwrap_or(spec);
        let (old, new) = spec.split_once('^')?;
        let last = self.entries.front()?;
        if !last.contains(old) {
            return None;
        }
        Some(last.replacen(old, new, 1))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
