//! `LS_COLORS` parsing and per-file-type indicator lookup.
//!
//! Corresponds to `colors.cc`/`colors.hh`'s `_rl_parse_colors`,
//! `_rl_color_indicator` table, and `_rl_print_color_indicator`.
//! `LS_COLORS` parsing sits behind the interface the completion engine
//! specifies for it; this module is that interface's concrete
//! implementation, since the completion list display needs it to be
//! testable end-to-end.

use std::collections::HashMap;

/// One of the fixed file-type slots `colors.hh`'s `enum indicator_no` names
/// (`C_DIR`, `C_LINK`, ...), minus the handful this crate never classifies
/// (capability bits, setuid/setgid, multi-hardlink) since filename
/// completion candidates are not `stat`-classified to that depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileTypeSlot {
    Normal,
    File,
    Dir,
    Link,
    OrphanLink,
    MissingFile,
    Fifo,
    Socket,
    BlockDev,
    CharDev,
    Executable,
    /// The sequence emitted around a colored indicator (`lc`/`rc` in real
    /// `LS_COLORS`, or the reset code `rs`).
    Left,
    Right,
    End,
}

/// The type indicator character appended after a directory/symlink/etc. in
/// a completion listing: trailing `/` `@` `*` `=` `|` `%` `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeIndicator {
    Directory,
    Symlink,
    Executable,
    Socket,
    Fifo,
    CharDevice,
    BlockDevice,
    None,
}

impl TypeIndicator {
    pub fn suffix(self) -> &'static str {
        match self {
            TypeIndicator::Directory => "/",
            TypeIndicator::Symlink => "@",
            TypeIndicator::Executable => "*",
            TypeIndicator::Socket => "=",
            TypeIndicator::Fifo => "|",
            TypeIndicator::CharDevice => "%",
            TypeIndicator::BlockDevice => "#",
            TypeIndicator::None => "",
        }
    }
}

/// Parsed `LS_COLORS` table: per-file-type default sequences plus a
/// per-extension override list, in the order the variable listed them (a
/// later `*.ext=` entry for the same extension in the same string wins,
/// matching GNU `ls`/readline's left-to-right parse).
#[derive(Debug, Clone, Default)]
pub struct LsColors {
    indicators: HashMap<&'static str, String>,
    /// Extension (without the leading `.`) to escape sequence, most
    /// recently parsed entry for a duplicate extension wins.
    extensions: Vec<(String, String)>,
}

const KEY_SLOTS: &[(&str, &str)] = &[
    ("no", "normal"),
    ("fi", "file"),
    ("di", "dir"),
    ("ln", "link"),
    ("or", "orphan"),
    ("mi", "missing"),
    ("pi", "fifo"),
    ("so", "socket"),
    ("bd", "blockdev"),
    ("cd", "chardev"),
    ("ex", "exec"),
    ("lc", "left"),
    ("rc", "right"),
    ("rs", "reset"),
    ("ec", "end"),
];

impl LsColors {
    /// Parse a termcap-like `LS_COLORS` string: colon-separated
    /// `key=value` pairs, where `key` is either a two-letter slot code
    /// (`di`, `ln`, `ex`, ...) or `*.ext` for an extension override.
    /// Malformed entries (missing `=`, unknown key) are skipped, matching
    /// the C parser's "be lenient, just stop recognizing this one field"
    /// behavior.
    pub fn parse(spec: &str) -> Self {
        let mut out = Self::default();
        for field in spec.split(':') {
            if field.is_empty() {
                continue;
            }
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            if let Some(ext) = key.strip_prefix("*.") {
                out.extensions.push((ext.to_owned(), value.to_owned()));
            } else if let Some(ext) = key.strip_prefix('*') {
                out.extensions.push((ext.to_owned(), value.to_owned()));
            } else if let Some((_, canon)) = KEY_SLOTS.iter().find(|(k, _)| *k == key) {
                out.indicators.insert(canon, value.to_owned());
            }
        }
        out
    }

    /// Parse from the current process environment's `LS_COLORS`, or an
    /// empty (no-op) table if unset.
    pub fn from_env() -> Self {
        match std::env::var("LS_COLORS") {
            Ok(spec) => Self::parse(&spec),
            Err(_) => Self::default(),
        }
    }

    fn slot_key(slot: FileTypeSlot) -> &'static str {
        match slot {
            FileTypeSlot::Normal => "normal",
            FileTypeSlot::File => "file",
            FileTypeSlot::Dir => "dir",
            FileTypeSlot::Link => "link",
            FileTypeSlot::OrphanLink => "orphan",
            FileTypeSlot::MissingFile => "missing",
            FileTypeSlot::Fifo => "fifo",
            FileTypeSlot::Socket => "socket",
            FileTypeSlot::BlockDev => "blockdev",
            FileTypeSlot::CharDev => "chardev",
            FileTypeSlot::Executable => "exec",
            FileTypeSlot::Left => "left",
            FileTypeSlot::Right => "right",
            FileTypeSlot::End => "end",
        }
    }

    /// The raw escape-sequence body (without `\x1b[`/`m` wrapping — callers
    /// compose with [`LsColors::left`]/[`LsColors::right`]) for a file type,
    /// or `None` if unconfigured (no coloring for that type).
    pub fn indicator(&self, slot: FileTypeSlot) -> Option<&str> {
        self.indicators.get(Self::slot_key(slot)).map(String::as_str)
    }

    /// Extension-specific override for a regular file's name, if any.
    /// Last matching entry in the parsed string wins (mirrors the `no: ext
    /// found, break on first match` C loop, but C walks a singly linked
    /// list built by prepending, so *last parsed* also ends up *first
    /// matched* there — same externally observable precedence).
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions
            .iter()
            .rev()
            .find(|(ext, _)| name.len() > ext.len() && name.ends_with(ext.as_str()))
            .map(|(_, seq)| seq.as_str())
    }

    fn wrap(&self, body: &str) -> String {
        let left = self.indicator(FileTypeSlot::Left).unwrap_or("\x1b[");
        let right = self.indicator(FileTypeSlot::Right).unwrap_or("m");
        format!("{left}{body}{right}")
    }

    /// The reset sequence printed after a colored name: `ec` if configured,
    /// else `lc` + `rs` (default `"0"`) + `rc`.
    pub fn reset_sequence(&self) -> String {
        match self.indicator(FileTypeSlot::End) {
            Some(end) => self.wrap(end),
            None => {
                let reset = self.indicators.get("reset").map(String::as_str).unwrap_or("0");
                self.wrap(reset)
            }
        }
    }

    /// Compute the full ANSI-wrapped color prefix for a candidate, given its
    /// classified type and (if a plain file) name for extension lookup.
    /// Returns `None` if nothing is configured for this classification
    /// (caller should print the name uncolored).
    pub fn color_for(&self, slot: FileTypeSlot, name: &str) -> Option<String> {
        let body = if matches!(slot, FileTypeSlot::File) {
            self.extension(name).or_else(|| self.indicator(slot))
        } else {
            self.indicator(slot)
        }?;
        Some(self.wrap(body))
    }
}

/// Classify a directory entry into the [`FileTypeSlot`]/[`TypeIndicator`]
/// pair used by listing and color lookup, from a `std::fs::Metadata`.
/// Grounded on `_rl_print_color_indicator`'s `S_ISDIR`/`S_ISLNK`/.../`S_IXUGO`
/// cascade, using `std::os::unix::fs::FileTypeExt`/`PermissionsExt` instead
/// of raw `st_mode` bit tests.
#[cfg(unix)]
pub fn classify(metadata: &std::fs::Metadata) -> (FileTypeSlot, TypeIndicator) {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let ft = metadata.file_type();
    if ft.is_dir() {
        (FileTypeSlot::Dir, TypeIndicator::Directory)
    } else if ft.is_symlink() {
        (FileTypeSlot::Link, TypeIndicator::Symlink)
    } else if ft.is_socket() {
        (FileTypeSlot::Socket, TypeIndicator::Socket)
    } else if ft.is_fifo() {
        (FileTypeSlot::Fifo, TypeIndicator::Fifo)
    } else if ft.is_char_device() {
        (FileTypeSlot::CharDev, TypeIndicator::CharDevice)
    } else if ft.is_block_device() {
        (FileTypeSlot::BlockDev, TypeIndicator::BlockDevice)
    } else if metadata.permissions().mode() & 0o111 != 0 {
        (FileTypeSlot::Executable, TypeIndicator::Executable)
    } else {
        (FileTypeSlot::File, TypeIndicator::None)
    }
}

#[cfg(not(unix))]
pub fn classify(metadata: &std::fs::Metadata) -> (FileTypeSlot, TypeIndicator) {
    if metadata.is_dir() {
        (FileTypeSlot::Dir, TypeIndicator::Directory)
    } else {
        (FileTypeSlot::File, TypeIndicator::None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_slots() {
        let c = LsColors::parse("di=01;34:ln=01;36:ex=01;32");
        assert_eq!(c.indicator(FileTypeSlot::Dir), Some("01;34"));
        assert_eq!(c.indicator(FileTypeSlot::Link), Some("01;36"));
        assert_eq!(c.indicator(FileTypeSlot::Executable), Some("01;32"));
    }

    #[test]
    fn parse_extension_entries() {
        let c = LsColors::parse("di=01;34:*.tar=01;31:*.zip=01;31");
        assert_eq!(c.extension("archive.tar"), Some("01;31"));
        assert_eq!(c.extension("nope.txt"), None);
    }

    #[test]
    fn malformed_fields_are_skipped() {
        let c = LsColors::parse("di=01;34:garbage:ex=01;32");
        assert_eq!(c.indicator(FileTypeSlot::Dir), Some("01;34"));
        assert_eq!(c.indicator(FileTypeSlot::Executable), Some("01;32"));
    }

    #[test]
    fn color_for_wraps_with_left_right() {
        let c = LsColors::parse("lc=\x1b[:rc=m:di=01;34");
        let s = c.color_for(FileTypeSlot::Dir, "somedir").unwrap();
        assert_eq!(s, "\x1b[01;34m");
    }

    #[test]
    fn color_for_unconfigured_type_is_none() {
        let c = LsColors::parse("di=01;34");
        assert_eq!(c.color_for(FileTypeSlot::Socket, "x"), None);
    }

    #[test]
    fn type_indicator_suffixes_match_spec() {
        assert_eq!(TypeIndicator::Directory.suffix(), "/");
        assert_eq!(TypeIndicator::Symlink.suffix(), "@");
        assert_eq!(TypeIndicator::Executable.suffix(), "*");
        assert_eq!(TypeIndicator::Socket.suffix(), "=");
        assert_eq!(TypeIndicator::Fifo.suffix(), "|");
        assert_eq!(TypeIndicator::CharDevice.suffix(), "%");
        assert_eq!(TypeIndicator::BlockDevice.suffix(), "#");
    }

    #[test]
    fn empty_spec_colors_nothing() {
        let c = LsColors::default();
        assert_eq!(c.color_for(FileTypeSlot::Dir, "x"), None);
    }
}
