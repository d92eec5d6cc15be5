//! Configuration file grammar and policy state.
//!
//! Corresponds to `bind.cc`'s `_rl_read_init_file` (the `set`/keybinding/
//! `$if`/`$include` directive grammar), kept as a line-oriented parser
//! (collect [`ConfigError`]s rather than abort, report with file/line
//! context, skip unrecognized directives). Variable storage generalizes a
//! `VarStore`-style untyped string table into the typed bool/string/int/enum
//! policy readline actually exposes through `set`.

use std::path::Path;

use tracing::warn;

use crate::error::ConfigError;
use crate::keymap::{translate_keyseq, KeyAction, KeymapArena, KeymapId};

// ── Policy state ──────────────────────────────────────────────────────────────

/// One `set`-able value's current type, mirroring the handful of shapes
/// `set <name> <value>` accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl PolicyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PolicyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PolicyValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PolicyValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

fn parse_value(raw: &str) -> PolicyValue {
    match raw {
        "on" | "On" | "ON" | "yes" | "true" | "1" => PolicyValue::Bool(true),
        "off" | "Off" | "OFF" | "no" | "false" | "0" => PolicyValue::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => PolicyValue::Int(n),
            Err(_) => PolicyValue::Str(raw.to_owned()),
        },
    }
}

/// The engine's named configuration variables: flags, variables, editing
/// mode. Distinct from [`crate::completion::CompletionConfig`]
/// and [`crate::display::DisplayConfig`], which this type's `apply_to_*`
/// helpers populate from the parsed table; everything else (arbitrary
/// application-defined `set` names) lives only in `vars`.
#[derive(Debug, Clone)]
pub struct Policy {
    vars: std::collections::HashMap<String, PolicyValue>,
}

impl Policy {
    pub fn get(&self, name: &str) -> Option<&PolicyValue> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: PolicyValue) {
        self.vars.insert(name.into(), value);
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(PolicyValue::as_bool).unwrap_or(default)
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(PolicyValue::as_int).unwrap_or(default)
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).and_then(PolicyValue::as_str).unwrap_or(default)
    }
}

impl Default for Policy {
    fn default() -> Self {
        let mut vars = std::collections::HashMap::new();
        vars.insert("editing-mode".to_owned(), PolicyValue::Str("emacs".to_owned()));
        vars.insert("bell-style".to_owned(), PolicyValue::Str("audible".to_owned()));
        vars.insert("horizontal-scroll-mode".to_owned(), PolicyValue::Bool(false));
        vars.insert("mark-directories".to_owned(), PolicyValue::Bool(true));
        vars.insert("completion-query-items".to_owned(), PolicyValue::Int(100));
        vars.insert("keyseq-timeout".to_owned(), PolicyValue::Int(500));
        Self { vars }
    }
}

// ── Directive kinds ───────────────────────────────────────────────────────────

/// A single parsed directive, independent of whether its surrounding `$if`
/// was taken. The caller applies [`Directive::Set`]/[`Directive::Bind`]
/// against live [`Policy`]/[`KeymapArena`] state; conditionals and
/// `$include` are handled internally by [`load_str`]/[`load_file`].
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Set { name: String, value: PolicyValue },
    BindFunction { keyseq: String, function: String },
    BindMacro { keyseq: String, macro_text: String },
}

/// Evaluate a `$if` condition: `mode=<emacs|vi>`, `term=<name>`,
/// a bare application name, or `<var>=<value>`.
fn eval_condition(cond: &str, mode: &str, term: &str, app_name: &str, policy: &Policy) -> bool {
    let cond = cond.trim();
    if let Some(val) = cond.strip_prefix("mode=") {
        return val == mode;
    }
    if let Some(val) = cond.strip_prefix("term=") {
        return val.eq_ignore_ascii_case(term);
    }
    if let Some((var, val)) = cond.split_once('=') {
        return policy.get(var).and_then(PolicyValue::as_str) == Some(val)
            || policy.get(var).map(|v| format!("{v:?}")).as_deref() == Some(val);
    }
    cond.eq_ignore_ascii_case(app_name)
}

/// Parsed configuration: every directive actually taken (conditionals
/// already resolved), in file order, plus diagnostics for malformed or
/// unreadable lines. Parsing never aborts on an error: a bad line is
/// reported and skipped.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    pub directives: Vec<Directive>,
    pub errors: Vec<ConfigError>,
}

/// Context `$if` conditions are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub mode: &'a str,
    pub term: &'a str,
    pub app_name: &'a str,
}

impl Default for ConditionContext<'static> {
    fn default() -> Self {
        Self {
            mode: "emacs",
            term: "",
            app_name: "rline",
        }
    }
}

/// Parse a configuration source string. `file` is
/// used only for diagnostic messages; pass `None` for an in-memory string
/// with no originating path. `$include` directives are resolved relative
/// to `base_dir`.
pub fn load_str(
    src: &str,
    file: Option<&str>,
    base_dir: Option<&Path>,
    ctx: ConditionContext,
    policy: &Policy,
) -> ParsedConfig {
    let mut out = ParsedConfig::default();
    let mut if_stack: Vec<bool> = Vec::new();

    for (i, raw) in src.lines().enumerate() {
        let lineno = i + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(cond) = line.strip_prefix("$if") {
            let active = if_stack.iter().all(|&b| b);
            let taken = active && eval_condition(cond, ctx.mode, ctx.term, ctx.app_name, policy);
            if_stack.push(taken);
            continue;
        }
        if line == "$else" {
            match if_stack.last_mut() {
                Some(top) => *top = !*top,
                None => out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message: "$else without matching $if".to_owned(),
                }),
            }
            continue;
        }
        if line == "$endif" {
            if if_stack.pop().is_none() {
                out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message: "$endif without matching $if".to_owned(),
                });
            }
            continue;
        }

        if !if_stack.iter().all(|&b| b) {
            continue;
        }

        if let Some(rest) = line.strip_prefix("$include") {
            let path_str = rest.trim();
            let Some(base) = base_dir else {
                out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message: "$include used with no base directory to resolve against".to_owned(),
                });
                continue;
            };
            let path = base.join(path_str);
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    let nested = load_str(
                        &contents,
                        Some(&path.display().to_string()),
                        path.parent(),
                        ctx,
                        policy,
                    );
                    out.directives.extend(nested.directives);
                    out.errors.extend(nested.errors);
                }
                Err(e) => out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message: format!("cannot read {}: {e}", path.display()),
                }),
            }
            continue;
        }

        if line.starts_with('"') {
            match parse_binding(line) {
                Ok(directive) => out.directives.push(directive),
                Err(message) => out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message,
                }),
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("set ") {
            match parse_set(rest) {
                Ok(directive) => out.directives.push(directive),
                Err(message) => out.errors.push(ConfigError {
                    file: file.map(str::to_owned),
                    line: lineno,
                    message,
                }),
            }
            continue;
        }

        out.errors.push(ConfigError {
            file: file.map(str::to_owned),
            line: lineno,
            message: format!("unrecognized directive: {line}"),
        });
    }

    if !if_stack.is_empty() {
        out.errors.push(ConfigError {
            file: file.map(str::to_owned),
            line: src.lines().count(),
            message: format!("{} unterminated $if block(s)", if_stack.len()),
        });
    }

    out
}

/// Read and parse a configuration file from disk, logging each diagnostic
/// via `tracing::warn!` (reported, not fatal) as it's produced.
pub fn load_file(path: &Path, ctx: ConditionContext, policy: &Policy) -> std::io::Result<ParsedConfig> {
    let src = std::fs::read_to_string(path)?;
    let parsed = load_str(
        &src,
        Some(&path.display().to_string()),
        path.parent(),
        ctx,
        policy,
    );
    for err in &parsed.errors {
        warn!(%err, "config parse diagnostic");
    }
    Ok(parsed)
}

fn parse_set(rest: &str) -> Result<Directive, String> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").trim();
    let value = parts.next().unwrap_or("").trim();
    if name.is_empty() {
        return Err("set: missing variable name".to_owned());
    }
    if value.is_empty() {
        return Err(format!("set: missing value for '{name}'"));
    }
    Ok(Directive::Set {
        name: name.to_owned(),
        value: parse_value(value),
    })
}

/// Parse `"<keyseq>": <function-name>` or `"<keyseq>": "<macro>"`.
fn parse_binding(line: &str) -> Result<Directive, String> {
    let rest = &line[1..];
    let Some(end_quote) = rest.find('"') else {
        return Err("unterminated key sequence string".to_owned());
    };
    let keyseq = rest[..end_quote].to_owned();
    let after = rest[end_quote + 1..].trim_start();
    let Some(after) = after.strip_prefix(':') else {
        return Err("expected ':' after key sequence".to_owned());
    };
    let after = after.trim();

    if let Some(quoted) = after.strip_prefix('"') {
        let Some(close) = quoted.rfind('"') else {
            return Err("unterminated macro string".to_owned());
        };
        Ok(Directive::BindMacro {
            keyseq,
            macro_text: quoted[..close].to_owned(),
        })
    } else if after.is_empty() {
        Err("missing function name or macro after ':'".to_owned())
    } else {
        Ok(Directive::BindFunction {
            keyseq,
            function: after.to_owned(),
        })
    }
}

/// Apply a parsed [`Directive::Set`] directly to a [`Policy`].
pub fn apply_set(policy: &mut Policy, name: &str, value: PolicyValue) {
    policy.set(name, value);
}

/// Apply a parsed [`Directive::BindFunction`]/[`Directive::BindMacro`] to a
/// keymap, resolving the function name through `lookup` (the embedder's own
/// name → [`crate::keymap::CommandId`] table; unknown names are reported by
/// the caller, not here).
pub fn apply_binding(
    arena: &mut KeymapArena,
    root: KeymapId,
    directive: &Directive,
    lookup: impl Fn(&str) -> Option<crate::keymap::CommandId>,
) -> Result<(), String> {
    match directive {
        Directive::BindFunction { keyseq, function } => {
            let bytes = translate_keyseq(keyseq).map_err(|e| e.to_string())?;
            let id = lookup(function).ok_or_else(|| format!("unknown function: {function}"))?;
            arena.bind_keyseq(root, &bytes, KeyAction::Function(id));
            Ok(())
        }
        Directive::BindMacro { keyseq, macro_text } => {
            let bytes = translate_keyseq(keyseq).map_err(|e| e.to_string())?;
            let macro_bytes = translate_keyseq(macro_text).map_err(|e| e.to_string())?;
            arena.bind_keyseq(root, &bytes, KeyAction::Macro(macro_bytes));
            Ok(())
        }
        Directive::Set { .. } => Err("not a binding directive".to_owned()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ConditionContext<'static> {
        ConditionContext::default()
    }

    #[test]
    fn set_bool_on_off() {
        let parsed = load_str("set horizontal-scroll-mode on", None, None, ctx(), &Policy::default());
        assert!(parsed.errors.is_empty());
        assert_eq!(
            parsed.directives,
            vec![Directive::Set {
                name: "horizontal-scroll-mode".into(),
                value: PolicyValue::Bool(true)
            }]
        );
    }

    #[test]
    fn set_int_value() {
        let parsed = load_str("set completion-query-items 200", None, None, ctx(), &Policy::default());
        assert_eq!(
            parsed.directives,
            vec![Directive::Set {
                name: "completion-query-items".into(),
                value: PolicyValue::Int(200)
            }]
        );
    }

    #[test]
    fn bind_function_directive() {
        let parsed = load_str(r#""\C-x\C-r": re-read-init-file"#, None, None, ctx(), &Policy::default());
        assert_eq!(
            parsed.directives,
            vec![Directive::BindFunction {
                keyseq: r"\C-x\C-r".into(),
                function: "re-read-init-file".into()
            }]
        );
    }

    #[test]
    fn bind_macro_directive() {
        let parsed = load_str(r#""\C-xq": "quoted text""#, None, None, ctx(), &Policy::default());
        assert_eq!(
            parsed.directives,
            vec![Directive::BindMacro {
                keyseq: r"\C-xq".into(),
                macro_text: "quoted text".into()
            }]
        );
    }

    #[test]
    fn if_mode_gates_directives() {
        let src = "$if mode=vi\nset editing-mode vi\n$else\nset editing-mode emacs\n$endif\n";
        let parsed = load_str(src, None, None, ctx(), &Policy::default());
        assert_eq!(parsed.errors.len(), 0);
        assert_eq!(
            parsed.directives,
            vec![Directive::Set {
                name: "editing-mode".into(),
                value: PolicyValue::Str("emacs".into())
            }]
        );
    }

    #[test]
    fn nested_if_else_endif() {
        let src = "$if term=xterm\n$if mode=emacs\nset a 1\n$endif\n$endif\n";
        let ctx = ConditionContext { term: "xterm", ..ctx() };
        let parsed = load_str(src, None, None, ctx, &Policy::default());
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.directives.len(), 1);
    }

    #[test]
    fn unterminated_if_is_reported() {
        let parsed = load_str("$if mode=emacs\nset a 1\n", None, None, ctx(), &Policy::default());
        assert!(!parsed.errors.is_empty());
    }

    #[test]
    fn unknown_directive_is_reported_and_parsing_continues() {
        let src = "bogus directive\nset a 1\n";
        let parsed = load_str(src, None, None, ctx(), &Policy::default());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.directives.len(), 1);
    }

    #[test]
    fn malformed_binding_missing_colon_is_reported() {
        let parsed = load_str(r#""\C-a" foo"#, None, None, ctx(), &Policy::default());
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let src = "# a comment\n\nset a 1\n";
        let parsed = load_str(src, None, None, ctx(), &Policy::default());
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.directives.len(), 1);
    }

    #[test]
    fn include_resolves_relative_to_base_dir() {
        let dir = std::env::temp_dir().join(format!(
            "rline-config-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("included.rc"), "set included yes\n").unwrap();
        let src = "$include included.rc\n";
        let parsed = load_str(src, Some("main.rc"), Some(&dir), ctx(), &Policy::default());
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(
            parsed.directives,
            vec![Directive::Set {
                name: "included".into(),
                value: PolicyValue::Bool(true)
            }]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn policy_default_has_expected_baseline() {
        let p = Policy::default();
        assert_eq!(p.str_or("editing-mode", ""), "emacs");
        assert_eq!(p.int_or("completion-query-items", 0), 100);
        assert!(!p.bool_or("horizontal-scroll-mode", true));
    }

    #[test]
    fn apply_binding_resolves_function_name() {
        let mut arena = KeymapArena::new();
        let root = arena.alloc();
        let directive = Directive::BindFunction {
            keyseq: r"\C-a".into(),
            function: "beginning-of-line".into(),
        };
        apply_binding(&mut arena, root, &directive, |name| {
            (name == "beginning-of-line").then_some(crate::keymap::CommandId(42))
        })
        .unwrap();
        assert_eq!(
            arena.resolve(root, &[0x01]),
            Some(&KeyAction::Function(crate::keymap::CommandId(42)))
        );
    }
}
