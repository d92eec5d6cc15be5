//! Completion engine: word-bound discovery, candidate generation, LCD
//! computation, display formatting, and insertion/quoting.
//!
//! Corresponds to `complete.cc`'s `rl_complete_internal`/
//! `gen_completion_matches`/`compute_lcd_of_matches`/`append_to_match`/
//! `rl_menu_complete`, and to `colors.cc` (see [`colors`]) for list coloring.
//! This is the deepest part of the engine and has no analogous subsystem
//! to adapt, so every operation here is grounded directly on `complete.cc`'s
//! numbered algorithm rather than adapted from elsewhere.

pub mod colors;

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use unicode_segmentation::UnicodeSegmentation;

use crate::buffer::LineBuffer;
use crate::error::ReadlineError;

bitflags! {
    /// Which quote characters were seen while scanning backward for the
    /// word being completed. Corresponds to `RL_QF_*` in `complete.cc`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FoundQuote: u8 {
        const SINGLE_QUOTE = 0b0001;
        const DOUBLE_QUOTE = 0b0010;
        const BACKSLASH    = 0b0100;
        const OTHER        = 0b1000;
    }
}

/// Result of word-bound discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordBreak {
    /// Character index where the word being completed begins.
    pub start: usize,
    pub found_quote: FoundQuote,
    /// The opening quote of an unclosed quoted region at `point`, if any.
    pub quote_char: Option<char>,
    /// The word-break character that ended the word, set only when that
    /// character is also a completer quote character (matches GNU
    /// Readline's `_rl_find_completion_word`, which only records a
    /// delimiter for quote-character breaks, not ordinary ones like space
    /// or `;`).
    pub delimiter: Option<char>,
}

/// Default set of characters that end a word when unquoted. Corresponds to
/// `rl_basic_word_break_characters`.
pub const DEFAULT_WORD_BREAK_CHARACTERS: &str = " \t\n\"'`@$><=;|&{(";
/// Default set of characters whose unclosed occurrence opens a quoted
/// region. Corresponds to `rl_completer_quote_characters`.
pub const DEFAULT_COMPLETER_QUOTE_CHARACTERS: &str = "'\"";

/// Per-call completion policy knobs. Corresponds to the scattered
/// `rl_complete_*`/`rl_filename_*` globals, collected into one record
/// instead of global mutable function pointers.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub word_break_characters: String,
    pub completer_quote_characters: String,
    /// Case-insensitive candidate comparison.
    pub case_fold: bool,
    /// Treat `-`/`_` as equivalent during comparison (implies `case_fold`
    /// semantics for that pair only).
    pub hyphens_as_underscores: bool,
    /// Above this many candidates, ask "Display all N possibilities?"
    /// before listing. `0` disables the prompt.
    pub query_items: usize,
    /// Terminal width used for column layout.
    pub screen_width: usize,
    /// Terminal height used for the `--More--` pager. `0` disables paging.
    pub screen_height: usize,
    /// Lay out the match list down-then-across (`false`) or
    /// across-then-down (`true`).
    pub horizontal_layout: bool,
    /// Append `/` after a completed directory name.
    pub mark_directories: bool,
    /// When the completed name is a symlink to a directory, also append
    /// `/` (subject to `mark_directories`).
    pub mark_symlinked_directories: bool,
    /// Character appended after a single unambiguous completion, unless
    /// `delimiter` from word-bound discovery overrides it.
    pub append_character: Option<char>,
    /// If the text to the right of point already matches the replacement
    /// suffix, do not re-insert it.
    pub skip_completed_text: bool,
    /// Collapse a common prefix longer than this many columns to an
    /// ellipsis in the listing. `0` disables.
    pub prefix_display_ellipsis_threshold: usize,
    /// Color the listing using `LS_COLORS`.
    pub colored_stats: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            word_break_characters: DEFAULT_WORD_BREAK_CHARACTERS.to_owned(),
            completer_quote_characters: DEFAULT_COMPLETER_QUOTE_CHARACTERS.to_owned(),
            case_fold: false,
            hyphens_as_underscores: false,
            query_items: 100,
            screen_width: 80,
            screen_height: 24,
            horizontal_layout: false,
            mark_directories: true,
            mark_symlinked_directories: false,
            append_character: Some(' '),
            skip_completed_text: false,
            prefix_display_ellipsis_threshold: 0,
            colored_stats: false,
        }
    }
}

/// Which opening quote, if any, a filename-quoting hook should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
    None,
}

/// Application hooks the completion engine consumes. Modeled as a
/// record of boxed closures passed explicitly to [`complete`], never as
/// global function pointers.
#[derive(Default)]
pub struct CompletionHooks {
    /// `(text, start, end) -> matches`. If present, called first; its
    /// result (even `Some(empty)`, meaning "handled, no matches") replaces
    /// the default entry-generator path.
    pub attempted_completion: Option<Box<dyn FnMut(&str, usize, usize) -> Option<CompletionMatches>>>,
    /// `(text, state) -> candidate`, called with `state = 0, 1, 2, ...`
    /// until it returns `None`. Used only when `attempted_completion` is
    /// absent; defaults to [`filename_completion_function`] otherwise.
    pub completion_entry: Option<Box<dyn FnMut(&str, i32) -> Option<String>>>,
    /// Mutates the candidate list in place, e.g. to drop dotfiles.
    pub ignore_some_completions: Option<Box<dyn FnMut(&mut Vec<String>)>>,
    /// Fully overrides listing display; if present, [`complete`] does not
    /// render its own list.
    pub display_matches_hook: Option<Box<dyn FnMut(&[String], usize)>>,
    /// Rewrites (mutates) the directory path to open for filename
    /// completion and what's displayed.
    pub directory_completion_hook: Option<Box<dyn FnMut(&mut String) -> bool>>,
    /// Rewrites (mutates) only the directory path to open, not displayed.
    pub directory_rewrite_hook: Option<Box<dyn FnMut(&mut String) -> bool>>,
    /// Mutates a candidate path before `stat`-based classification (e.g.
    /// undoing shell quoting so `stat` sees a real path).
    pub filename_stat_hook: Option<Box<dyn FnMut(&mut String)>>,
    /// `(name, len) -> rewritten name`, applied to each raw directory
    /// entry before comparison/display.
    pub filename_rewrite_hook: Option<Box<dyn FnMut(&str, usize) -> String>>,
    /// `(text, quote_kind, quote_char) -> quoted text`, applied to the
    /// chosen replacement before insertion.
    pub filename_quoting_function: Option<Box<dyn FnMut(&str, QuoteKind, Option<char>) -> String>>,
    /// Inverse of `filename_quoting_function`, applied to the typed word
    /// before it's used to open a directory / compare candidates.
    pub filename_dequoting_function: Option<Box<dyn FnMut(&str, Option<char>) -> String>>,
    /// `(buf, index) -> bool`overrides word-break semantics at `index`
    /// (shell-specific backslash quoting).
    pub char_is_quoted: Option<Box<dyn FnMut(&[char], usize) -> bool>>,
    /// Overrides `word_break_characters` for one completion attempt.
    pub completion_word_break_hook: Option<Box<dyn FnMut() -> String>>,
}

/// The outcome of candidate generation + postprocessing: an explicit `lcd`
/// field rather than overloading index 0 of `candidates`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionMatches {
    pub lcd: Option<String>,
    pub candidates: Vec<String>,
}

impl CompletionMatches {
    pub fn single(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            lcd: Some(text),
            candidates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lcd.is_none() && self.candidates.is_empty()
    }

    /// True when there is exactly one real candidate (the LCD coincides
    /// with the sole match, or there are zero listed candidates and an
    /// LCD — the usual "single match" convention).
    pub fn is_single(&self) -> bool {
        self.lcd.is_some() && self.candidates.len() <= 1
    }
}

/// The action code selected by the invoking command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    /// `TAB`: insert the LCD only.
    Insert,
    /// `?`: list candidates, never insert.
    List,
    /// `!`: insert the LCD, then list if there were ≥2 candidates.
    InsertOrList,
    /// `@`: insert the LCD, then list iff the LCD added nothing new.
    InsertOrListIfNoop,
    /// `*`: insert all candidates, space-separated.
    InsertAll,
}

/// What the caller should do with the terminal after [`complete`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The buffer was edited; nothing further to display.
    Inserted,
    /// The buffer was edited with the longest common denominator of
    /// multiple remaining candidates, but the match is still ambiguous —
    /// ring the bell without listing (an `Insert` action over >1 match).
    InsertedAmbiguous,
    /// Ring the bell: no matches, or an `Insert`-only action found nothing
    /// new to add.
    Bell,
    /// Render this listing (already formatted, one entry per display
    /// cell) to the terminal, honoring the pager if `needs_confirmation`
    /// carries a prompt.
    List(Listing),
    /// The listing was already handed to `display_matches_hook`; nothing
    /// further for the caller to render and no bell warranted.
    Displayed,
}

/// A prepared completions listing, ready for a display engine to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// If `Some(n)`, the caller must first ask
    /// `"Display all {n} possibilities? (y or n)"` and only render `rows`
    /// if the answer is yes.
    pub confirm_count: Option<usize>,
    /// Fully formatted rows (already columnized, type indicators and any
    /// color escapes applied), top to bottom.
    pub rows: Vec<String>,
}

// ── 1. Word-bound discovery ────────────────────────────────────────────────

/// Scan backward from `point` to find the start of the word being
/// completed, honoring nested quoting. Corresponds to
/// `rl_complete_internal`'s initial call into `_rl_find_completion_word`.
pub fn find_completion_word(
    buffer: &[char],
    point: usize,
    config: &CompletionConfig,
    hooks: &mut CompletionHooks,
) -> WordBreak {
    let point = point.min(buffer.len());
    let break_chars = match &mut hooks.completion_word_break_hook {
        Some(hook) => hook(),
        None => config.word_break_characters.clone(),
    };
    let quote_chars = &config.completer_quote_characters;

    let mut scan_end = 0usize;
    let mut quote_char: Option<char> = None;
    let mut found_quote = FoundQuote::empty();
    let mut delimiter: Option<char> = None;
    let mut i = 0usize;

    while i < point {
        let ch = buffer[i];
        let is_quoted = hooks
            .char_is_quoted
            .as_mut()
            .map(|hook| hook(buffer, i))
            .unwrap_or(false);

        if let Some(qc) = quote_char {
            found_quote.insert(quote_kind_flag(qc));
            if ch == qc && !is_quoted {
                quote_char = None;
                scan_end = i + 1;
            }
        } else if quote_chars.contains(ch) && !is_quoted {
            quote_char = Some(ch);
            found_quote.insert(quote_kind_flag(ch));
            scan_end = i + 1;
        } else if ch == '\\' && !is_quoted {
            found_quote.insert(FoundQuote::BACKSLASH);
        } else if break_chars.contains(ch) && !is_quoted {
            scan_end = i + 1;
            // Only remember the break character as the delimiter when it is
            // also a quote character (matches `_rl_find_completion_word`'s
            // `rl_basic_quote_characters` check) — an ordinary word-break
            // character like a space or `;` leaves no delimiter.
            if quote_chars.contains(ch) {
                delimiter = Some(ch);
            }
        }
        i += 1;
    }

    WordBreak {
        start: scan_end,
        found_quote,
        quote_char,
        delimiter: if quote_char.is_some() { None } else { delimiter },
    }
}

fn quote_kind_flag(c: char) -> FoundQuote {
    match c {
        '\'' => FoundQuote::SINGLE_QUOTE,
        '"' => FoundQuote::DOUBLE_QUOTE,
        _ => FoundQuote::OTHER,
    }
}

// ── 2. Candidate generation ────────────────────────────────────────────────

/// Generate raw candidates for `text` (the dequoted word found by
/// [`find_completion_word`]), trying the application hook first and
/// falling back to [`filename_completion_function`].
pub fn gen_completion_matches(
    text: &str,
    start: usize,
    end: usize,
    hooks: &mut CompletionHooks,
    config: &CompletionConfig,
) -> CompletionMatches {
    if let Some(attempt) = &mut hooks.attempted_completion {
        if let Some(matches) = attempt(text, start, end) {
            return matches;
        }
    }

    let mut candidates = Vec::new();
    let mut state = 0i32;
    loop {
        let next = match &mut hooks.completion_entry {
            Some(entry) => entry(text, state),
            None => filename_completion_function(text, state, hooks, config),
        };
        match next {
            Some(cand) => candidates.push(cand),
            None => break,
        }
        state += 1;
    }

    CompletionMatches {
        lcd: None,
        candidates,
    }
}

/// Stateful directory-entry generator used as the default completion
/// source. Corresponds to `rl_filename_completion_function`: `state == 0`
/// opens (and caches) the directory implied by `text`; subsequent calls
/// scan cached entries for the next case-matching one.
///
/// A real embedding would keep generator state across calls in a struct
/// rather than reopening the directory each call (as the C source's
/// static locals do); this crate exposes [`FilenameCompleter`] for that,
/// and this free function is the `state`-threaded convenience wrapper
/// `completion_entry` defaults to.
pub fn filename_completion_function(
    text: &str,
    state: i32,
    hooks: &mut CompletionHooks,
    config: &CompletionConfig,
) -> Option<String> {
    thread_local! {
        static GENERATOR: std::cell::RefCell<Option<(String, FilenameCompleter)>> = std::cell::RefCell::new(None);
    }
    GENERATOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        if state == 0 || slot.as_ref().map(|(t, _)| t != text).unwrap_or(true) {
            *slot = Some((text.to_owned(), FilenameCompleter::new(text, hooks, config)));
        }
        slot.as_mut().and_then(|(_, gen)| gen.next(hooks, config))
    })
}

/// Owns the directory-read state for filename completion: the directory
/// handle, the already-dequoted/rewritten prefix to match against, and an
/// iterator over its entries.
pub struct FilenameCompleter {
    dirname: PathBuf,
    /// The portion of `text` after the last `/`, used for prefix matching.
    filename_prefix: String,
    /// Whether `dirname` should be prepended to returned names (it is
    /// omitted when `text` had no `/`).
    prepend_dir: Option<String>,
    entries: std::vec::IntoIter<std::fs::DirEntry>,
}

impl FilenameCompleter {
    pub fn new(text: &str, hooks: &mut CompletionHooks, _config: &CompletionConfig) -> Self {
        let dequoted = match &mut hooks.filename_dequoting_function {
            Some(f) => f(text, None),
            None => text.to_owned(),
        };

        let (dir_part, file_part) = match dequoted.rfind('/') {
            Some(idx) => (dequoted[..=idx].to_owned(), dequoted[idx + 1..].to_owned()),
            None => (String::new(), dequoted.clone()),
        };

        let mut open_dir = if dir_part.is_empty() {
            ".".to_owned()
        } else {
            dir_part.clone()
        };

        if let Some(hook) = &mut hooks.directory_rewrite_hook {
            hook(&mut open_dir);
        }
        if let Some(hook) = &mut hooks.directory_completion_hook {
            hook(&mut open_dir);
        }

        let entries: Vec<std::fs::DirEntry> = std::fs::read_dir(&open_dir)
            .map(|rd| rd.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();

        Self {
            dirname: PathBuf::from(open_dir),
            filename_prefix: file_part,
            prepend_dir: if dir_part.is_empty() { None } else { Some(dir_part) },
            entries: entries.into_iter(),
        }
    }

    pub fn next(&mut self, hooks: &mut CompletionHooks, config: &CompletionConfig) -> Option<String> {
        for entry in self.entries.by_ref() {
            let raw_name = entry.file_name().to_string_lossy().into_owned();
            let name = match &mut hooks.filename_rewrite_hook {
                Some(hook) => hook(&raw_name, raw_name.len()),
                None => raw_name,
            };
            if complete_fncmp(&name, &self.filename_prefix, config) {
                let mut full = match &self.prepend_dir {
                    Some(dir) => format!("{dir}{name}"),
                    None => name,
                };
                if entry.path().is_dir() {
                    full.push('/');
                }
                return Some(full);
            }
        }
        None
    }

    pub fn dirname(&self) -> &Path {
        &self.dirname
    }
}

/// Compare a directory entry name against the typed prefix under the
/// active case/`-`/`_` folding policy. Corresponds to `complete_fncmp`.
///
/// Compares grapheme clusters rather than `char`s, so a combining-mark
/// sequence (e.g. `"e\u{301}"`) and its precomposed form (`"\u{e9}"`) count
/// as the same user-perceived character instead of mismatching on the
/// first codepoint.
pub fn complete_fncmp(name: &str, prefix: &str, config: &CompletionConfig) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let name_graphemes: Vec<&str> = name.graphemes(true).collect();
    let prefix_graphemes: Vec<&str> = prefix.graphemes(true).collect();
    if name_graphemes.len() < prefix_graphemes.len() {
        return false;
    }
    name_graphemes
        .iter()
        .zip(prefix_graphemes.iter())
        .all(|(n, p)| graphemes_equal(n, p, config))
}

fn graphemes_equal(a: &str, b: &str, config: &CompletionConfig) -> bool {
    if a == b {
        return true;
    }
    if config.hyphens_as_underscores && is_dash_or_underscore(a) && is_dash_or_underscore(b) {
        return true;
    }
    if config.case_fold {
        return a.to_lowercase() == b.to_lowercase();
    }
    false
}

fn is_dash_or_underscore(g: &str) -> bool {
    g == "-" || g == "_"
}

// ── 3. Postprocessing ──────────────────────────────────────────────────────

/// Remove duplicate candidates (stable, first occurrence wins), then apply
/// `ignore_some_completions_function`, then recompute the LCD. `typed` is
/// the user's original (unexpanded) word, used as the LCD fallback when
/// the computed LCD is empty but `typed` is not.
pub fn postprocess_matches(
    mut matches: CompletionMatches,
    typed: &str,
    dedupe: bool,
    hooks: &mut CompletionHooks,
    config: &CompletionConfig,
) -> CompletionMatches {
    if dedupe {
        let mut seen = std::collections::HashSet::new();
        matches.candidates.retain(|c| seen.insert(c.clone()));
    }
    if let Some(hook) = &mut hooks.ignore_some_completions {
        hook(&mut matches.candidates);
    }

    matches.lcd = compute_lcd(&matches.candidates, typed, config);
    matches
}

/// The longest prefix shared by every candidate under the active
/// comparison policy. Falls back to `typed`
/// when the computed LCD would be empty but the user had typed something.
pub fn compute_lcd(candidates: &[String], typed: &str, config: &CompletionConfig) -> Option<String> {
    if candidates.is_empty() {
        return if typed.is_empty() { None } else { Some(typed.to_owned()) };
    }
    if candidates.len() == 1 {
        return Some(candidates[0].clone());
    }

    let first: Vec<&str> = candidates[0].graphemes(true).collect();
    let mut lcd_len = first.len();
    for cand in &candidates[1..] {
        let graphemes: Vec<&str> = cand.graphemes(true).collect();
        let mut matched = 0;
        while matched < lcd_len
            && matched < graphemes.len()
            && graphemes_equal(first[matched], graphemes[matched], config)
        {
            matched += 1;
        }
        lcd_len = matched;
        if lcd_len == 0 {
            break;
        }
    }

    if lcd_len == 0 {
        return if typed.is_empty() { None } else { Some(typed.to_owned()) };
    }
    // Case folding: prefer the original typed case on a tie — use the
    // first candidate's casing for the shared prefix unless `typed`
    // itself is at least that long and case-folds equal to it.
    let prefix: String = first[..lcd_len].concat();
    let typed_graphemes: Vec<&str> = typed.graphemes(true).collect();
    if config.case_fold && typed_graphemes.len() >= lcd_len {
        let typed_prefix: String = typed_graphemes[..lcd_len].concat();
        if typed_prefix.to_lowercase() == prefix.to_lowercase() {
            return Some(typed_prefix);
        }
    }
    Some(prefix)
}

// ── 5. Listing ──────────────────────────────────────────────────────────────

/// Render candidates into column-formatted, type-indicator-and-color
/// annotated rows, applying the query-items pager threshold.
pub fn build_listing(
    candidates: &[String],
    config: &CompletionConfig,
    ls_colors: Option<&colors::LsColors>,
    stat_fn: impl Fn(&str) -> Option<std::fs::Metadata>,
) -> Listing {
    let mut sorted: Vec<&String> = candidates.iter().collect();
    sorted.sort();

    let entries: Vec<(String, colors::TypeIndicator, Option<String>)> = sorted
        .iter()
        .map(|name| {
            let trimmed = name.trim_end_matches('/');
            let basename = trimmed.rsplit('/').next().unwrap_or(trimmed).to_owned();
            match stat_fn(name) {
                Some(meta) => {
                    let (slot, indicator) = colors::classify(&meta);
                    let color = if config.colored_stats {
                        ls_colors.and_then(|lc| lc.color_for(slot, &basename))
                    } else {
                        None
                    };
                    (basename, indicator, color)
                }
                None => (basename, colors::TypeIndicator::None, None),
            }
        })
        .collect();

    let width = entries
        .iter()
        .map(|(name, ind, _)| name.chars().count() + ind.suffix().len())
        .max()
        .unwrap_or(1)
        .max(1);
    let col_width = width + 2;
    let columns = (config.screen_width / col_width).max(1);
    let rows_needed = entries.len().div_ceil(columns);

    let mut rows = Vec::with_capacity(rows_needed);
    for r in 0..rows_needed {
        let mut line = String::new();
        for c in 0..columns {
            let idx = if config.horizontal_layout {
                r * columns + c
            } else {
                c * rows_needed + r
            };
            let Some((name, indicator, color)) = entries.get(idx) else {
                continue;
            };
            let reset = ls_colors.map(|lc| lc.reset_sequence()).unwrap_or_default();
            match color {
                Some(seq) => line.push_str(&format!("{seq}{name}{reset}{}", indicator.suffix())),
                None => line.push_str(&format!("{name}{}", indicator.suffix())),
            }
            let printed = name.chars().count() + indicator.suffix().len();
            if c + 1 < columns && idx + 1 < entries.len() {
                line.push_str(&" ".repeat(col_width - printed));
            }
        }
        rows.push(line);
    }

    let confirm_count = if config.query_items > 0 && entries.len() >= config.query_items {
        Some(entries.len())
    } else {
        None
    };

    Listing { confirm_count, rows }
}

/// Drive the `--More--` pager over already-formatted `rows`, yielding one
/// screenful at a time. `input` supplies one pager keystroke (`y`/space,
/// `q`, `\n`) per call; returns `false` once the caller answered `q` (stop
/// before exhausting `rows`).
pub struct Pager<'a> {
    rows: &'a [String],
    next: usize,
    page_size: usize,
}

impl<'a> Pager<'a> {
    pub fn new(rows: &'a [String], page_size: usize) -> Self {
        Self {
            rows,
            next: 0,
            page_size: page_size.max(1),
        }
    }

    /// Pull the next screenful (or remaining rows if fewer). Returns
    /// `None` once everything has been emitted.
    pub fn next_page(&mut self) -> Option<&'a [String]> {
        self.next_lines(self.page_size)
    }

    /// Pull the next `n` rows regardless of the configured page size, for
    /// the `\n`-advances-one-row-only `--More--` response. Returns `None`
    /// once everything has been emitted.
    pub fn next_lines(&mut self, n: usize) -> Option<&'a [String]> {
        if self.next >= self.rows.len() {
            return None;
        }
        let end = (self.next + n.max(1)).min(self.rows.len());
        let page = &self.rows[self.next..end];
        self.next = end;
        Some(page)
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.rows.len()
    }
}

/// Interpret one `--More--` keystroke. `y`/space continues a full page,
/// `q` stops, `\n` advances by one row only (modeled by the caller
/// re-driving [`Pager::next_page`] with `page_size = 1` for that step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerKey {
    Continue,
    Stop,
    OneLine,
    Other,
}

pub fn classify_pager_key(ch: char) -> PagerKey {
    match ch {
        'y' | ' ' => PagerKey::Continue,
        'q' => PagerKey::Stop,
        '\n' | '\r' => PagerKey::OneLine,
        _ => PagerKey::Other,
    }
}

// ── 7/8. Insertion and trailing character ──────────────────────────────────

/// Build the final text to insert for a chosen replacement, applying
/// re-quoting and computing the trailing character. Does not touch the
/// buffer; [`complete`] performs the edit.
pub fn prepare_insertion(
    replacement: &str,
    word: &WordBreak,
    hooks: &mut CompletionHooks,
    config: &CompletionConfig,
    is_single_match: bool,
    is_dir: bool,
    is_symlink_to_dir: bool,
) -> (String, Option<char>) {
    let needs_quote = word.quote_char.is_some()
        || replacement.chars().any(|c| config.word_break_characters.contains(c));

    let mut text = if needs_quote {
        if let Some(hook) = &mut hooks.filename_quoting_function {
            let kind = match word.quote_char {
                Some('\'') => QuoteKind::Single,
                Some('"') => QuoteKind::Double,
                _ => QuoteKind::None,
            };
            hook(replacement, kind, word.quote_char)
        } else {
            replacement.to_owned()
        }
    } else {
        replacement.to_owned()
    };

    // De-duplicate a leading quote the hook re-added against one already
    // present in the buffer (the opening quote that started this word).
    if let Some(qc) = word.quote_char {
        if text.starts_with(qc) {
            text.remove(0);
        }
    }

    if !is_single_match {
        return (text, None);
    }

    let trailing = if let Some(d) = word.delimiter {
        Some(d)
    } else if is_dir && config.mark_directories {
        Some('/')
    } else if is_symlink_to_dir && config.mark_symlinked_directories && config.mark_directories {
        Some('/')
    } else {
        config.append_character
    };

    (text, trailing)
}

// ── Menu completion ─────────────────────────────────────────────────────────

/// Cycling state for menu completion: repeated invocations insert
/// successive candidates, wrapping back to the originally typed text
/// between full cycles.
pub struct MenuCompletion {
    typed: String,
    candidates: Vec<String>,
    /// `None` means "currently showing the original typed text".
    index: Option<usize>,
}

impl MenuCompletion {
    pub fn new(typed: impl Into<String>, matches: CompletionMatches) -> Self {
        let mut candidates = matches.candidates;
        if candidates.is_empty() {
            if let Some(lcd) = matches.lcd {
                candidates.push(lcd);
            }
        }
        Self {
            typed: typed.into(),
            candidates,
            index: None,
        }
    }

    /// Advance to the next candidate in the cycle (or back to the typed
    /// text, wrapping). Returns the text that should now be in the buffer.
    pub fn advance(&mut self) -> &str {
        if self.candidates.is_empty() {
            return &self.typed;
        }
        self.index = match self.index {
            None => Some(0),
            Some(i) if i + 1 < self.candidates.len() => Some(i + 1),
            Some(_) => None,
        };
        match self.index {
            Some(i) => &self.candidates[i],
            None => &self.typed,
        }
    }

    pub fn current(&self) -> &str {
        match self.index {
            Some(i) => &self.candidates[i],
            None => &self.typed,
        }
    }
}

// ── Top-level entry point ──────────────────────────────────────────────────

/// Run one completion attempt against `buffer` at its current point,
/// performing word-bound discovery, candidate generation, postprocessing,
/// and — per `action` — either editing the buffer or returning a listing
/// for the caller's display engine to render.
pub fn complete(
    buffer: &mut LineBuffer,
    action: CompletionAction,
    hooks: &mut CompletionHooks,
    config: &CompletionConfig,
) -> Result<CompletionOutcome, ReadlineError> {
    let point = buffer.point();
    let chars = buffer.chars().to_vec();
    let word = find_completion_word(&chars, point, config, hooks);
    let typed: String = chars[word.start..point].iter().collect();

    let dequoted = match &mut hooks.filename_dequoting_function {
        Some(f) => f(&typed, word.quote_char),
        None => typed.clone(),
    };

    let raw = gen_completion_matches(&dequoted, word.start, point, hooks, config);
    let matches = postprocess_matches(raw, &typed, true, hooks, config);

    if matches.is_empty() {
        return Ok(CompletionOutcome::Bell);
    }

    let is_single = matches.is_single();
    let chosen = matches.lcd.clone().unwrap_or_default();

    let should_insert = matches!(
        action,
        CompletionAction::Insert | CompletionAction::InsertOrList | CompletionAction::InsertOrListIfNoop
    );
    let insert_added_nothing = chosen == typed;

    if should_insert {
        let is_dir = chosen.ends_with('/');
        let (mut text, trailing) =
            prepare_insertion(&chosen, &word, hooks, config, is_single, is_dir, false);

        if config.skip_completed_text {
            let after: String = chars[point..].iter().collect();
            if after.starts_with(text.as_str()) {
                text.clear();
            }
        }

        {
            let group_start = word.start;
            buffer.set_point(point);
            buffer.replace(&text, group_start, point);
            let mut new_point = group_start + text.chars().count();
            buffer.set_point(new_point);
            if let Some(t) = trailing {
                buffer.insert(&t.to_string());
                new_point += 1;
            }
            buffer.set_point(new_point);
        }
    }

    let should_list = match action {
        CompletionAction::List => true,
        CompletionAction::InsertOrList => !is_single,
        CompletionAction::InsertOrListIfNoop => insert_added_nothing && !is_single,
        CompletionAction::Insert => false,
        CompletionAction::InsertAll => false,
    };

    if action == CompletionAction::InsertAll {
        let joined = matches.candidates.join(" ");
        let group_start = word.start;
        buffer.replace(&joined, group_start, point);
        let np = group_start + joined.chars().count();
        buffer.set_point(np);
        return Ok(CompletionOutcome::Inserted);
    }

    if should_list {
        let listing = build_listing(&matches.candidates, config, None, |_| None);
        if let Some(hook) = &mut hooks.display_matches_hook {
            hook(&matches.candidates, matches.candidates.iter().map(|c| c.len()).max().unwrap_or(0));
            return Ok(CompletionOutcome::Displayed);
        }
        return Ok(CompletionOutcome::List(listing));
    }

    if !should_insert {
        return Ok(CompletionOutcome::Bell);
    }

    if action == CompletionAction::Insert && !is_single {
        return Ok(CompletionOutcome::InsertedAmbiguous);
    }

    Ok(CompletionOutcome::Inserted)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn word_boundary_on_plain_space_separated_text() {
        let b = chars("ls /us");
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let w = find_completion_word(&b, b.len(), &config, &mut hooks);
        assert_eq!(w.start, 3);
        assert_eq!(w.quote_char, None);
    }

    #[test]
    fn word_boundary_honors_unclosed_double_quote() {
        let b = chars(r#"echo "hello wo"#);
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let w = find_completion_word(&b, b.len(), &config, &mut hooks);
        assert_eq!(w.start, 6); // index of 'h' in "hello
        assert_eq!(w.quote_char, Some('"'));
        assert!(w.found_quote.contains(FoundQuote::DOUBLE_QUOTE));
    }

    #[test]
    fn compute_lcd_of_three_candidates() {
        let config = CompletionConfig::default();
        let cands = vec!["foobar".to_owned(), "foobaz".to_owned(), "foobaq".to_owned()];
        let lcd = compute_lcd(&cands, "foo", &config);
        assert_eq!(lcd.as_deref(), Some("fooba"));
    }

    #[test]
    fn compute_lcd_single_candidate_is_itself() {
        let config = CompletionConfig::default();
        let cands = vec!["usr".to_owned()];
        assert_eq!(compute_lcd(&cands, "us", &config).as_deref(), Some("usr"));
    }

    #[test]
    fn compute_lcd_falls_back_to_typed_on_zero_overlap() {
        let config = CompletionConfig::default();
        let cands = vec!["abc".to_owned(), "xyz".to_owned()];
        assert_eq!(compute_lcd(&cands, "q", &config).as_deref(), Some("q"));
    }

    #[test]
    fn complete_fncmp_case_fold() {
        let mut config = CompletionConfig::default();
        config.case_fold = true;
        assert!(complete_fncmp("USR", "us", &config));
    }

    #[test]
    fn complete_fncmp_hyphen_underscore_equivalence() {
        let mut config = CompletionConfig::default();
        config.hyphens_as_underscores = true;
        assert!(complete_fncmp("foo-bar", "foo_bar", &config));
    }

    #[test]
    fn compute_lcd_does_not_split_a_combining_mark_from_its_base() {
        // The first candidate's second character is "e" + a combining
        // acute accent (one grapheme cluster); the second candidate's
        // second character is a plain "e". Comparing codepoint by
        // codepoint would match the bare "e" and only diverge at the
        // combining mark, yielding "ae" as the shared prefix even though
        // the two candidates' second *characters* don't match at all.
        // Comparing grapheme clusters stops one character earlier.
        let config = CompletionConfig::default();
        let cands = vec!["ae\u{301}b".to_owned(), "aex".to_owned()];
        assert_eq!(compute_lcd(&cands, "", &config).as_deref(), Some("a"));
    }

    #[test]
    fn postprocess_dedupes_preserving_lcd() {
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let raw = CompletionMatches {
            lcd: None,
            candidates: vec!["a".into(), "a".into(), "b".into()],
        };
        let out = postprocess_matches(raw, "", true, &mut hooks, &config);
        assert_eq!(out.candidates, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn menu_completion_cycles_and_wraps_to_typed() {
        let matches = CompletionMatches {
            lcd: Some("fooba".into()),
            candidates: vec!["foobar".into(), "foobaz".into()],
        };
        let mut menu = MenuCompletion::new("foo", matches);
        assert_eq!(menu.advance(), "foobar");
        assert_eq!(menu.advance(), "foobaz");
        assert_eq!(menu.advance(), "foo"); // wraps to typed text
        assert_eq!(menu.advance(), "foobar"); // cycles again
    }

    #[test]
    fn prepare_insertion_quotes_and_avoids_doubling_opening_quote() {
        let word = WordBreak {
            start: 6,
            found_quote: FoundQuote::DOUBLE_QUOTE,
            quote_char: Some('"'),
            delimiter: None,
        };
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        hooks.filename_quoting_function = Some(Box::new(|s, _kind, qc| {
            let q = qc.unwrap_or('"');
            format!("{q}{s}{q}")
        }));
        let (text, _) = prepare_insertion("hello world!", &word, &mut hooks, &config, true, false, false);
        // The hook re-added the opening quote; prepare_insertion strips the
        // duplicate leading one since the buffer already has it.
        assert_eq!(text, r#"hello world!""#);
    }

    #[test]
    fn trailing_char_is_slash_for_directory() {
        let word = WordBreak {
            start: 0,
            found_quote: FoundQuote::empty(),
            quote_char: None,
            delimiter: None,
        };
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let (_, trailing) = prepare_insertion("usr", &word, &mut hooks, &config, true, true, false);
        assert_eq!(trailing, Some('/'));
    }

    #[test]
    fn trailing_char_defaults_to_space() {
        let word = WordBreak {
            start: 0,
            found_quote: FoundQuote::empty(),
            quote_char: None,
            delimiter: None,
        };
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let (_, trailing) = prepare_insertion("foo", &word, &mut hooks, &config, true, false, false);
        assert_eq!(trailing, Some(' '));
    }

    #[test]
    fn build_listing_applies_query_threshold() {
        let mut config = CompletionConfig::default();
        config.query_items = 2;
        let cands = vec!["a".into(), "b".into(), "c".into()];
        let listing = build_listing(&cands, &config, None, |_| None);
        assert_eq!(listing.confirm_count, Some(3));
    }

    #[test]
    fn build_listing_below_threshold_skips_confirmation() {
        let mut config = CompletionConfig::default();
        config.query_items = 10;
        let cands = vec!["a".into(), "b".into()];
        let listing = build_listing(&cands, &config, None, |_| None);
        assert_eq!(listing.confirm_count, None);
    }

    #[test]
    fn build_listing_keeps_directory_basename_visible() {
        let config = CompletionConfig::default();
        let cands = vec!["/usr/lib/".to_owned(), "/usr/local/".to_owned()];
        let listing = build_listing(&cands, &config, None, |_| None);
        assert!(listing.rows.iter().any(|r| r.contains("lib")));
        assert!(listing.rows.iter().any(|r| r.contains("local")));
    }

    #[test]
    fn pager_yields_pages_of_requested_size() {
        let rows = vec!["1".to_owned(), "2".to_owned(), "3".to_owned(), "4".to_owned(), "5".to_owned()];
        let mut pager = Pager::new(&rows, 2);
        assert_eq!(pager.next_page(), Some(&["1".to_owned(), "2".to_owned()][..]));
        assert_eq!(pager.next_page(), Some(&["3".to_owned(), "4".to_owned()][..]));
        assert_eq!(pager.next_page(), Some(&["5".to_owned()][..]));
        assert_eq!(pager.next_page(), None);
        assert!(pager.is_done());
    }

    #[test]
    fn pager_key_classification() {
        assert_eq!(classify_pager_key('y'), PagerKey::Continue);
        assert_eq!(classify_pager_key(' '), PagerKey::Continue);
        assert_eq!(classify_pager_key('q'), PagerKey::Stop);
        assert_eq!(classify_pager_key('\n'), PagerKey::OneLine);
        assert_eq!(classify_pager_key('z'), PagerKey::Other);
    }

    #[test]
    fn complete_single_match_directory_appends_slash() {
        let dir = tempdir();
        std::fs::create_dir(dir.join("usr")).unwrap();
        let mut buffer = LineBuffer::new();
        buffer.insert(&format!("ls {}/us", dir.display()));
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let outcome = complete(&mut buffer, CompletionAction::Insert, &mut hooks, &config).unwrap();
        assert_eq!(outcome, CompletionOutcome::Inserted);
        assert!(buffer.text().ends_with("usr/"));
        cleanup(&dir);
    }

    #[test]
    fn complete_multiple_candidates_rings_bell_with_lcd_inserted() {
        let dir = tempdir();
        std::fs::create_dir(dir.join("foobar")).unwrap();
        std::fs::create_dir(dir.join("foobaz")).unwrap();
        std::fs::create_dir(dir.join("foobaq")).unwrap();
        let mut buffer = LineBuffer::new();
        buffer.insert(&format!("{}/foo", dir.display()));
        let config = CompletionConfig::default();
        let mut hooks = CompletionHooks::default();
        let outcome = complete(&mut buffer, CompletionAction::Insert, &mut hooks, &config).unwrap();
        assert_eq!(outcome, CompletionOutcome::InsertedAmbiguous);
        assert!(buffer.text().ends_with("fooba"));
        cleanup(&dir);
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rline-completion-test-{}-{}", std::process::id(), unique()));
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    fn unique() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }
}
