//! Keymap tree: byte → action resolution, submap arena, and key-sequence
//! translation.
//!
//! Corresponds to `keymap.cc`/`bind.cc` (the C `KEYMAP_ENTRY` table and
//! `rl_translate_keyseq`). The C source owns keymaps as a cyclic graph of
//! raw pointers; here submaps are owned by a single [`KeymapArena`] indexed
//! by [`KeymapId`], so a slot never owns the map it points to and disposal
//! is just dropping the arena.

use std::collections::HashMap;

use crate::error::ReadlineError;

/// Identifies a command handler registered with the dispatcher. Opaque to
/// this module; the dispatcher owns the id → handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u32);

/// Index of a [`Keymap`] owned by a [`KeymapArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeymapId(usize);

/// What a single keymap slot resolves to.
///
/// Corresponds to the `KEYMAP_ENTRY` tagged union: `ISFUNC` / `ISKMAP` /
/// `ISMACR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Invoke a registered command.
    Function(CommandId),
    /// Descend into a submap, awaiting the next key.
    Submap(KeymapId),
    /// Replay these bytes (pushed to the front of the input stream).
    Macro(Vec<u8>),
}

/// A fixed-size table from byte value to [`KeyAction`], plus one
/// "any-other-key" slot used when no specific entry matches.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    slots: [Option<KeyAction>; 256],
    any_other_key: Option<KeyAction>,
}

impl Keymap {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            any_other_key: None,
        }
    }

    /// Bind `key` (`0..=255`) to `action`. `Function`/`Submap`/`Macro` with
    /// nothing unbinds by passing `None`.
    pub fn bind(&mut self, key: u8, action: Option<KeyAction>) {
        self.slots[key as usize] = action;
    }

    pub fn bind_any_other(&mut self, action: Option<KeyAction>) {
        self.any_other_key = action;
    }

    /// Resolve a single byte to an action, falling back to the
    /// any-other-key slot.
    pub fn lookup(&self, key: u8) -> Option<&KeyAction> {
        self.slots[key as usize]
            .as_ref()
            .or(self.any_other_key.as_ref())
    }

    pub fn is_bound(&self, key: u8) -> bool {
        self.slots[key as usize].is_some()
    }
}

/// Names of the standard keymap sets the engine constructs lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeymapSetName {
    EmacsStandard,
    EmacsMeta,
    EmacsCtlx,
    ViInsertion,
    ViMovement,
}

impl KeymapSetName {
    fn as_str(self) -> &'static str {
        match self {
            KeymapSetName::EmacsStandard => "emacs-standard",
            KeymapSetName::EmacsMeta => "emacs-meta",
            KeymapSetName::EmacsCtlx => "emacs-ctlx",
            KeymapSetName::ViInsertion => "vi-insertion",
            KeymapSetName::ViMovement => "vi-movement",
        }
    }
}

/// Owns every [`Keymap`] by [`KeymapId`], including named sets registered
/// by the application. Submap slots hold ids, never `&Keymap`/`Box<Keymap>`,
/// so the DAG of maps referencing maps can never be an ownership cycle.
#[derive(Debug, Default)]
pub struct KeymapArena {
    maps: Vec<Keymap>,
    named: HashMap<String, KeymapId>,
}

impl KeymapArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, empty keymap and return its id.
    pub fn alloc(&mut self) -> KeymapId {
        self.maps.push(Keymap::new());
        KeymapId(self.maps.len() - 1)
    }

    pub fn get(&self, id: KeymapId) -> &Keymap {
        &self.maps[id.0]
    }

    pub fn get_mut(&mut self, id: KeymapId) -> &mut Keymap {
        &mut self.maps[id.0]
    }

    /// Register `id` under a stable name (one of the standard sets, or a
    /// user-chosen name).
    pub fn register_named(&mut self, name: impl Into<String>, id: KeymapId) {
        self.named.insert(name.into(), id);
    }

    pub fn named(&self, name: &str) -> Option<KeymapId> {
        self.named.get(name).copied()
    }

    /// Lazily build (or fetch) one of the standard named sets.
    pub fn standard_set(&mut self, name: KeymapSetName) -> KeymapId {
        if let Some(id) = self.named(name.as_str()) {
            return id;
        }
        let id = self.alloc();
        self.register_named(name.as_str(), id);
        id
    }

    /// Walk `seq`, creating submaps as needed, and bind the final byte to
    /// `action` in the keymap reached by all but the last byte. Corresponds
    /// to `bind_keyseq_in_map`.
    pub fn bind_keyseq(&mut self, root: KeymapId, seq: &[u8], action: KeyAction) {
        if seq.is_empty() {
            return;
        }
        let mut current = root;
        for &byte in &seq[..seq.len() - 1] {
            current = match self.get(current).lookup(byte) {
                Some(KeyAction::Submap(next)) => *next,
                _ => {
                    let next = self.alloc();
                    self.get_mut(current)
                        .bind(byte, Some(KeyAction::Submap(next)));
                    next
                }
            };
        }
        let last = *seq.last().expect("checked non-empty above");
        self.get_mut(current).bind(last, Some(action));
    }

    pub fn unbind_keyseq(&mut self, root: KeymapId, seq: &[u8]) {
        if seq.is_empty() {
            return;
        }
        let mut current = root;
        for &byte in &seq[..seq.len() - 1] {
            match self.get(current).lookup(byte) {
                Some(KeyAction::Submap(next)) => current = *next,
                _ => return,
            }
        }
        let last = *seq.last().expect("checked non-empty above");
        self.get_mut(current).bind(last, None);
    }

    /// Resolve a full key sequence starting from `root`. Returns the action
    /// found, or `Err` if any prefix byte indexes past a non-submap (i.e.
    /// the sequence is not a valid walk of the DAG).
    pub fn resolve(&self, root: KeymapId, seq: &[u8]) -> Option<&KeyAction> {
        let mut current = root;
        let (last, prefix) = seq.split_last()?;
        for &byte in prefix {
            match self.get(current).lookup(byte) {
                Some(KeyAction::Submap(next)) => current = *next,
                _ => return None,
            }
        }
        self.get(current).lookup(*last)
    }
}

// ── Key-sequence translation ──────────────────────────────────────────────────

/// Translate a human-readable key sequence (`"\C-x\M-a"`, `"^A"`, `"\e[A"`,
/// `\nnn` octal, `\xHH` hex, the usual `\n`/`\t`/... escapes) into raw bytes.
///
/// Corresponds to `rl_translate_keyseq`. This and [`untranslate_keyseq`] form
/// a bijection between canonical escaped text and byte sequences.
pub fn translate_keyseq(s: &str) -> Result<Vec<u8>, ReadlineError> {
    let mut out = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 1;
                if i >= chars.len() {
                    out.push(b'\\');
                    break;
                }
                match chars[i] {
                    'C' if chars.get(i + 1) == Some(&'-') => {
                        i += 2;
                        if i < chars.len() {
                            out.push(ctrl_byte(chars[i]));
                            i += 1;
                        }
                        continue;
                    }
                    'M' if chars.get(i + 1) == Some(&'-') => {
                        i += 2;
                        if i < chars.len() {
                            out.push(0x1b);
                            // Meta-X is re-encoded as ESC X by this
                            // translator; the dispatcher's "convert meta"
                            // policy operates on raw input bytes, not on
                            // the binding text.
                            out.push(chars[i] as u8);
                            i += 1;
                        }
                        continue;
                    }
                    'e' | 'E' => out.push(0x1b),
                    '\\' => out.push(b'\\'),
                    '"' => out.push(b'"'),
                    '\'' => out.push(b'\''),
                    'n' => out.push(b'\n'),
                    't' => out.push(b'\t'),
                    'r' => out.push(b'\r'),
                    'b' => out.push(0x08),
                    'f' => out.push(0x0c),
                    'a' => out.push(0x07),
                    'v' => out.push(0x0b),
                    'd' => out.push(0x7f),
                    'x' => {
                        let mut val: u32 = 0;
                        let mut n = 0;
                        i += 1;
                        while n < 2 && i < chars.len() && chars[i].is_ascii_hexdigit() {
                            val = val * 16 + chars[i].to_digit(16).unwrap();
                            i += 1;
                            n += 1;
                        }
                        out.push(val as u8);
                        continue;
                    }
                    c if c.is_digit(8) => {
                        let mut val: u32 = 0;
                        let mut n = 0;
                        while n < 3 && i < chars.len() && chars[i].is_digit(8) {
                            val = val * 8 + chars[i].to_digit(8).unwrap();
                            i += 1;
                            n += 1;
                        }
                        out.push(val as u8);
                        continue;
                    }
                    other => out.push(other as u8),
                }
                i += 1;
            }
            '^' if chars.get(i + 1).is_some() => {
                out.push(ctrl_byte(chars[i + 1]));
                i += 2;
            }
            c => {
                out.push(c as u8);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn ctrl_byte(c: char) -> u8 {
    if c == '?' {
        0x7f
    } else {
        (c.to_ascii_uppercase() as u8).wrapping_sub(b'@') & 0x7f
    }
}

/// Inverse of [`translate_keyseq`]: render bytes as canonical `\C-x`/`\M-x`/
/// `\e`/printable-literal escaped text.
pub fn untranslate_keyseq(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            0x1b => out.push_str("\\e"),
            0x7f => out.push_str("\\C-?"),
            b'\n' => out.push_str("\\C-j"),
            b'\t' => out.push_str("\\C-i"),
            b'\r' => out.push_str("\\C-m"),
            0..=0x1f => {
                out.push_str("\\C-");
                out.push((b + b'@') as char);
            }
            b'\\' => out.push_str("\\\\"),
            b'^' => out.push_str("\\^"),
            _ => out.push(b as char),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
