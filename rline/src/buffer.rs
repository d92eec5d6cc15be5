//! The line buffer: point/mark, insertion/deletion, and grouped undo.
//!
//! Corresponds to `readline.cc`'s `rl_line_buffer`/`rl_point`/`rl_mark` state
//! and to `undo.cc`'s `rl_do_undo`/`rl_modifying`, as well as
//! `tf-rs/src/input.rs`'s `LineEditor`. Positions are character indices into a `Vec<char>`
//! rather than byte indices into a UTF-8 `String` — idiomatic for Rust, and
//! equivalent to the C source's byte-index convention in the ASCII case that
//! dominates line editing; every public method takes and returns char
//! indices consistently, so the distinction never leaks.

use std::collections::VecDeque;

use crate::error::ReadlineError;

/// Maximum number of fragments retained in the kill ring.
const KILL_RING_CAPACITY: usize = 16;

// ── UndoPos ───────────────────────────────────────────────────────────────────

/// A position recorded in an undo entry.
///
/// The C source encodes "resolve to `rl_point`" and "resolve to
/// end-of-buffer" as the sentinel values `-1` and `-2` inside an otherwise
/// unsigned position; this is a proper enum instead of magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoPos {
    /// An absolute, already-resolved character index.
    Abs(usize),
    /// Resolve to `point` at the moment the undo entry is popped.
    AtPoint,
    /// Resolve to the buffer length at the moment the undo entry is popped.
    AtEnd,
}

impl UndoPos {
    fn resolve(self, point: usize, end: usize) -> usize {
        match self {
            UndoPos::Abs(p) => p,
            UndoPos::AtPoint => point,
            UndoPos::AtEnd => end,
        }
    }
}

// ── UndoEntry ─────────────────────────────────────────────────────────────────

/// One entry in the undo list.
///
/// Corresponds to `UNDO_ENTRY` / the `UNDO_DELETE`/`UNDO_INSERT`/
/// `UNDO_BEGIN`/`UNDO_END` tags in `undo.cc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    /// Text was inserted in `[start, end)`; undoing deletes it.
    Insert { start: UndoPos, end: UndoPos },
    /// Text was deleted from `[start, end)`; undoing reinserts `text`.
    Delete {
        start: UndoPos,
        end: UndoPos,
        text: String,
    },
    /// Fence marking the start of a group (nearer the tail once pushed,
    /// i.e. popped *last* within the group).
    Begin,
    /// Fence marking the end of a group (popped *first* within the group).
    End,
}

// ── Mark ──────────────────────────────────────────────────────────────────────

/// The active region, if any: `point` and a saved counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mark {
    pub pos: Option<usize>,
}

impl Mark {
    /// `[min(point,mark), max(point,mark))`, or `None` if no mark is set.
    pub fn region(&self, point: usize) -> Option<(usize, usize)> {
        self.pos.map(|m| (point.min(m), point.max(m)))
    }
}

// ── LineBuffer ────────────────────────────────────────────────────────────────

/// A mutable line of text with point, mark, grouped undo, and a kill ring.
pub struct LineBuffer {
    buffer: Vec<char>,
    point: usize,
    mark: Mark,

    undo_list: Vec<UndoEntry>,
    doing_an_undo: bool,

    kill_ring: VecDeque<String>,
    kill_cursor: usize,

    /// Extra word-constituent characters (beyond alphanumeric), mirroring
    /// `tf-rs`'s `wordpunct`.
    pub wordpunct: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            point: 0,
            mark: Mark::default(),
            undo_list: Vec::new(),
            doing_an_undo: false,
            kill_ring: VecDeque::new(),
            kill_cursor: 0,
            wordpunct: String::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.buffer
    }

    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn mark(&self) -> Mark {
        self.mark
    }

    pub fn set_mark(&mut self, pos: Option<usize>) {
        self.mark.pos = pos.map(|p| p.min(self.buffer.len()));
    }

    /// The active region under the current mark, if any.
    pub fn region(&self) -> Option<(usize, usize)> {
        self.mark.region(self.point)
    }

    fn fix_point(&mut self) {
        self.point = self.point.min(self.buffer.len());
        if let Some(m) = self.mark.pos {
            self.mark.pos = Some(m.min(self.buffer.len()));
        }
    }

    // ── Point movement ────────────────────────────────────────────────────

    pub fn set_point(&mut self, pos: usize) {
        self.point = pos.min(self.buffer.len());
    }

    // ── Undo group discipline ─────────────────────────────────────────────

    pub fn begin_undo_group(&mut self) {
        if !self.doing_an_undo {
            self.undo_list.push(UndoEntry::Begin);
        }
    }

    pub fn end_undo_group(&mut self) {
        if !self.doing_an_undo {
            self.undo_list.push(UndoEntry::End);
        }
    }

    /// RAII guard: `begin_undo_group` on construction, `end_undo_group` on
    /// drop, so a balanced fence survives early returns.
    pub fn undo_group(&mut self) -> UndoGroupGuard<'_> {
        self.begin_undo_group();
        UndoGroupGuard { buf: self }
    }

    fn record_undo(&mut self, entry: UndoEntry) {
        if !self.doing_an_undo {
            self.undo_list.push(entry);
        }
    }

    pub fn undo_list_is_empty(&self) -> bool {
        self.undo_list.is_empty()
    }

    // ── Mutators ──────────────────────────────────────────────────────────

    /// Insert `text` at `point`, advancing point past it.
    pub fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let start = self.point;
        let mut n = 0;
        for ch in text.chars() {
            self.buffer.insert(self.point + n, ch);
            n += 1;
        }
        self.point += n;
        self.record_undo(UndoEntry::Insert {
            start: UndoPos::Abs(start),
            end: UndoPos::Abs(start + n),
        });
    }

    /// Delete `[start, end)`. `point` is clamped afterward. Returns the
    /// deleted text.
    pub fn delete(&mut self, start: usize, end: usize) -> String {
        let start = start.min(self.buffer.len());
        let end = end.min(self.buffer.len());
        if start >= end {
            return String::new();
        }
        let removed: String = self.buffer.drain(start..end).collect();
        self.record_undo(UndoEntry::Delete {
            start: UndoPos::Abs(start),
            end: UndoPos::Abs(end),
            text: removed.clone(),
        });
        let removed_len = end - start;
        self.point = if self.point <= start {
            self.point
        } else if self.point >= end {
            self.point - removed_len
        } else {
            start
        };
        self.fix_point();
        removed
    }

    /// Replace `[start, end)` with `text`.
    pub fn replace(&mut self, text: &str, start: usize, end: usize) {
        let group = self.undo_group();
        group.buf.delete(start, end);
        group.buf.set_point(start);
        group.buf.insert(text);
    }

    /// Return a copy of `[start, end)` without mutating the buffer.
    pub fn copy(&self, start: usize, end: usize) -> String {
        let start = start.min(self.buffer.len());
        let end = end.min(self.buffer.len());
        if start >= end {
            return String::new();
        }
        self.buffer[start..end].iter().collect()
    }

    /// Delete `[start, end)` and push the removed text to the kill ring.
    pub fn kill(&mut self, start: usize, end: usize) -> String {
        let (lo, hi) = (start.min(end), start.max(end));
        let removed = self.delete(lo, hi);
        if !removed.is_empty() {
            self.kill_ring_push(removed.clone());
        }
        removed
    }

    /// Save a pre-image of `[start, end)` so a later non-atomic edit on
    /// that range can still be undone. Corresponds to `rl_modifying`.
    pub fn modifying(&mut self, start: usize, end: usize) {
        let (lo, hi) = (start.min(end), start.max(end).min(self.buffer.len()));
        if lo >= hi {
            return;
        }
        let text = self.copy(lo, hi);
        self.record_undo(UndoEntry::Delete {
            start: UndoPos::Abs(lo),
            end: UndoPos::Abs(hi),
            text,
        });
    }

    /// Replace `[start, end)` with `text` directly, without recording an
    /// undo entry of its own. Pairs with [`LineBuffer::modifying`], which
    /// already recorded the pre-image: calling a self-recording mutator
    /// (`insert`/`delete`/`replace`) here instead would push a second,
    /// redundant undo entry and corrupt a later undo past the pre-image.
    pub fn splice_raw(&mut self, start: usize, end: usize, text: &str) {
        let start = start.min(self.buffer.len());
        let end = end.min(self.buffer.len()).max(start);
        self.buffer.splice(start..end, text.chars());
        self.point = start + text.chars().count();
        self.fix_point();
    }

    // ── Undo ──────────────────────────────────────────────────────────────

    /// Pop and apply one undo step (a whole balanced group counts as one
    /// step). Returns `true` if anything was undone.
    pub fn do_undo(&mut self) -> bool {
        let mut waiting_for_begin = 0i32;
        let mut undid_anything = false;
        loop {
            let Some(entry) = self.undo_list.pop() else {
                return undid_anything;
            };
            undid_anything = true;
            self.doing_an_undo = true;
            match entry {
                UndoEntry::Delete { start, end, text } => {
                    let start = start.resolve(self.point, self.buffer.len());
                    self.point = start;
                    self.fix_point();
                    self.insert(&text);
                    // insert() pushed its own undo record while
                    // doing_an_undo is true; record_undo() is a no-op then,
                    // so the list stays correctly shaped.
                    self.point = start;
                }
                UndoEntry::Insert { start, end } => {
                    let start = start.resolve(self.point, self.buffer.len());
                    let end = end.resolve(self.point, self.buffer.len());
                    self.delete(start, end);
                    self.point = start;
                }
                UndoEntry::End => {
                    waiting_for_begin += 1;
                }
                UndoEntry::Begin => {
                    if waiting_for_begin > 0 {
                        waiting_for_begin -= 1;
                    }
                    // A stray Begin with no matching End rings the bell in
                    // the caller (the dispatcher owns bell signaling); here
                    // we simply stop this undo step.
                }
            }
            self.doing_an_undo = false;
            if waiting_for_begin <= 0 {
                return undid_anything;
            }
        }
    }

    /// Undo everything back to the start of the current read cycle.
    pub fn revert_line(&mut self) {
        while self.do_undo() {}
    }

    // ── Kill ring ─────────────────────────────────────────────────────────

    fn kill_ring_push(&mut self, text: String) {
        if self.kill_ring.len() == KILL_RING_CAPACITY {
            self.kill_ring.pop_front();
        }
        self.kill_ring.push_back(text);
        self.kill_cursor = self.kill_ring.len() - 1;
    }

    /// Insert the current kill-ring entry at `point`. Returns the number of
    /// characters inserted (0 if the ring is empty).
    pub fn yank(&mut self) -> usize {
        let Some(text) = self.kill_ring.get(self.kill_cursor).cloned() else {
            return 0;
        };
        let n = text.chars().count();
        self.insert(&text);
        n
    }

    /// Replace the just-yanked span with the previous kill-ring entry.
    /// `yanked_len` is the character length of the text last yanked at
    /// `point - yanked_len .. point`.
    pub fn yank_pop(&mut self, yanked_len: usize) -> Result<usize, ReadlineError> {
        if self.kill_ring.is_empty() {
            return Ok(0);
        }
        let start = self.point.saturating_sub(yanked_len);
        self.delete(start, self.point);
        self.point = start;
        self.kill_cursor = if self.kill_cursor == 0 {
            self.kill_ring.len() - 1
        } else {
            self.kill_cursor - 1
        };
        Ok(self.yank())
    }

    pub fn kill_ring_front(&self) -> Option<&str> {
        self.kill_ring.get(self.kill_cursor).map(String::as_str)
    }

    // ── Word / char helpers ────────────────────────────────────────────────

    fn is_word_char(&self, idx: usize) -> bool {
        let ch = self.buffer[idx];
        ch.is_alphanumeric() || self.wordpunct.contains(ch)
    }

    /// Mirrors `do_kbword(start, dir)`: the far edge of the word reached by
    /// skipping non-word then word characters in direction `dir`.
    pub fn word_boundary(&self, start: usize, dir: i32) -> usize {
        let len = self.buffer.len();
        let stop: i64 = if dir < 0 { -1 } else { len as i64 };
        let mut place = start.min(len) as i64 - if dir < 0 { 1 } else { 0 };

        while place != stop && !self.is_word_char(place as usize) {
            place += dir as i64;
        }
        while place != stop && self.is_word_char(place as usize) {
            place += dir as i64;
        }

        if dir < 0 {
            (place + 1).max(0) as usize
        } else {
            place.min(len as i64) as usize
        }
    }

    pub fn take_line(&mut self) -> String {
        let line = self.text();
        self.buffer.clear();
        self.point = 0;
        self.mark = Mark::default();
        self.undo_list.clear();
        line
    }

    pub fn set_text(&mut self, text: &str) {
        self.buffer = text.chars().collect();
        self.point = self.buffer.len();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII undo-group fence: `end_undo_group` fires on drop even across an
/// early `?` return, so callers cannot forget to balance the group.
pub struct UndoGroupGuard<'a> {
    buf: &'a mut LineBuffer,
}

impl Drop for UndoGroupGuard<'_> {
    fn drop(&mut self) {
        self.buf.end_undo_group();
    }
}

impl std::ops::Deref for UndoGroupGuard<'_> {
    type Target = LineBuffer;
    fn deref(&self) -> &LineBuffer {
        self.buf
    }
}

impl std::ops::DerefMut for UndoGroupGuard<'_> {
    fn deref_mut(&mut self) -> &mut LineBuffer {
        self.buf
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_roundtrip_via_undo() {
        let mut buf = LineBuffer::new();
        buf.insert("hello");
        let before = buf.text();
        buf.delete(1, 3);
        assert_eq!(buf.text(), "hlo");
        buf.do_undo();
        assert_eq!(buf.text(), before);
    }

    #[test]
    fn insert_then_undo_is_empty() {
        let mut buf = LineBuffer::new();
        buf.insert("abc");
        buf.do_undo();
        assert_eq!(buf.text(), "");
        assert!(buf.undo_list_is_empty());
    }

    #[test]
    fn undo_group_reverses_as_one_step() {
        let mut buf = LineBuffer::new();
        {
            let g = buf.undo_group();
            g.buf.insert("abc");
            g.buf.insert("def");
        }
        assert_eq!(buf.text(), "abcdef");
        buf.do_undo();
        assert_eq!(buf.text(), "");
        assert!(buf.undo_list_is_empty());
    }

    #[test]
    fn nested_undo_groups() {
        let mut buf = LineBuffer::new();
        buf.begin_undo_group();
        buf.insert("a");
        buf.begin_undo_group();
        buf.insert("b");
        buf.end_undo_group();
        buf.insert("c");
        buf.end_undo_group();
        assert_eq!(buf.text(), "abc");
        buf.do_undo();
        assert_eq!(buf.text(), "");
    }

    #[test]
    fn point_and_mark_always_in_range() {
        let mut buf = LineBuffer::new();
        buf.insert("hello world");
        buf.set_mark(Some(3));
        buf.delete(5, 100);
        assert!(buf.point() <= buf.len());
        assert!(buf.mark().pos.unwrap() <= buf.len());
    }

    #[test]
    fn region_is_min_max_of_point_and_mark() {
        let mut buf = LineBuffer::new();
        buf.insert("hello world");
        buf.set_point(2);
        buf.set_mark(Some(8));
        assert_eq!(buf.region(), Some((2, 8)));
    }

    #[test]
    fn kill_then_yank_restores_text() {
        let mut buf = LineBuffer::new();
        buf.insert("hello world");
        buf.set_point(0);
        buf.kill(0, 6);
        assert_eq!(buf.text(), "world");
        buf.set_point(buf.len());
        buf.yank();
        assert_eq!(buf.text(), "worldhello ");
    }

    #[test]
    fn yank_pop_cycles_kill_ring() {
        let mut buf = LineBuffer::new();
        buf.insert("one two three ");
        buf.set_point(0);
        buf.kill(0, 4); // "one "
        buf.kill(0, 4); // "two "
        buf.set_point(buf.len());
        let n = buf.yank();
        assert_eq!(buf.kill_ring_front(), Some("two "));
        buf.yank_pop(n).unwrap();
        assert_eq!(buf.kill_ring_front(), Some("one "));
    }

    #[test]
    fn modifying_then_manual_edit_is_undoable() {
        let mut buf = LineBuffer::new();
        buf.insert("hello");
        buf.modifying(1, 4);
        // Simulate a non-atomic external rewrite of [1,4) -> "ELL", bypassing
        // the self-recording mutators since modifying() already saved the
        // pre-image.
        buf.splice_raw(1, 4, "ELL");
        assert_eq!(buf.text(), "hELLo");
        buf.do_undo(); // undo via the modifying() pre-image
        assert_eq!(buf.text(), "hello");
        assert!(buf.undo_list_is_empty());
    }

    #[test]
    fn word_boundary_matches_teacher_semantics() {
        let mut buf = LineBuffer::new();
        buf.insert("hello world");
        buf.set_point(0);
        assert_eq!(buf.word_boundary(0, 1), 5);
    }

    #[test]
    fn revert_line_undoes_everything() {
        let mut buf = LineBuffer::new();
        buf.insert("a");
        buf.insert("b");
        buf.insert("c");
        buf.revert_line();
        assert_eq!(buf.text(), "");
        assert!(buf.undo_list_is_empty());
    }

    proptest::proptest! {
        #[test]
        fn prop_insert_delete_undo_restores(s in "[a-zA-Z0-9 ]{0,20}", cut in 0usize..20) {
            let mut buf = LineBuffer::new();
            buf.insert(&s);
            let before = buf.text();
            let len = buf.len();
            if len > 0 {
                let start = cut.min(len.saturating_sub(1));
                let end = (start + 1).min(len);
                buf.delete(start, end);
                buf.do_undo();
                assert_eq!(buf.text(), before);
            }
        }

        #[test]
        fn prop_point_mark_always_bounded(s in "[a-zA-Z0-9]{0,20}", p in 0usize..30, m in 0usize..30) {
            let mut buf = LineBuffer::new();
            buf.insert(&s);
            buf.set_point(p);
            buf.set_mark(Some(m));
            assert!(buf.point() <= buf.len());
            assert!(buf.mark().pos.unwrap() <= buf.len());
        }
    }
}
