//! Keymap-walk dispatcher: numeric argument accumulation, keyboard macro
//! recording/replay, and prefix-abandonment fallback.
//!
//! Corresponds to `readline.cc`'s `_rl_dispatch`/`_rl_subseq_result` (the
//! byte-at-a-time keymap walk with a pending "in a submap" state) and to
//! `macro.cc`'s `rl_start_kbd_macro`/`rl_end_kbd_macro`/`rl_call_last_kbd_macro`
//! (recording and replaying keystrokes). A flat `HashMap`-based keymap
//! walked one byte at a time drives the same shape of dispatch loop; this
//! module generalizes that walk onto the arena-based
//! [`crate::keymap::KeymapArena`] and adds the numeric-argument and macro
//! bookkeeping a plain command dispatcher never needed.

use crate::input::InputPipeline;
use crate::keymap::{CommandId, KeyAction, KeymapArena, KeymapId};

/// Reserved command ids the dispatcher recognizes and handles itself,
/// rather than forwarding to [`Commands::invoke`]. Application commands
/// must be registered at [`FIRST_USER_COMMAND`] or above.
pub const CMD_DIGIT_ARGUMENT: CommandId = CommandId(0);
pub const CMD_UNIVERSAL_ARGUMENT: CommandId = CommandId(1);
pub const CMD_START_KBD_MACRO: CommandId = CommandId(2);
pub const CMD_END_KBD_MACRO: CommandId = CommandId(3);
pub const CMD_CALL_LAST_KBD_MACRO: CommandId = CommandId(4);

/// First id an embedding application may assign to its own commands.
pub const FIRST_USER_COMMAND: u32 = 16;

/// What a dispatched command asks the driving loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchSignal {
    /// Keep reading; no line has been submitted.
    Continue,
    /// Ring the bell: unbound key, empty kill ring, no macro defined, etc.
    Bell,
    /// The line is complete; hand it to the caller.
    Submit(String),
}

/// The host application's command table. The dispatcher never inspects
/// `id` itself (other than the reserved ids above) — it is opaque routing
/// information the embedder defined when building its keymaps.
pub trait Commands {
    fn invoke(&mut self, id: CommandId, count: i32, key: u8) -> DispatchSignal;
}

/// Per-session dispatch state: position in an in-progress key sequence,
/// numeric argument accumulation, and keyboard macro recording.
///
/// One `Dispatcher` is created per [`crate::editor::Editor`] and persists
/// across calls to `dispatch_byte` for the lifetime of a read-line session
/// (macros recorded on one line remain callable on the next, matching
/// `rl_call_last_kbd_macro`'s behavior across calls to `readline()`).
pub struct Dispatcher {
    current_map: KeymapId,
    /// Bytes consumed so far while walking a (possibly multi-byte) key
    /// sequence; re-injected verbatim if the walk is abandoned.
    pending_prefix: Vec<u8>,
    numeric_arg: Option<i32>,
    numeric_arg_sign: i32,
    collecting_numeric_arg: bool,
    recording: Option<Vec<u8>>,
    last_macro: Vec<u8>,
}

impl Dispatcher {
    pub fn new(root: KeymapId) -> Self {
        Self {
            current_map: root,
            pending_prefix: Vec::new(),
            numeric_arg: None,
            numeric_arg_sign: 1,
            collecting_numeric_arg: false,
            recording: None,
            last_macro: Vec::new(),
        }
    }

    /// True while a multi-byte key sequence is mid-walk (awaiting its next
    /// byte in a submap). The read loop should apply the keyseq timeout
    /// only in this state.
    pub fn is_mid_sequence(&self) -> bool {
        !self.pending_prefix.is_empty()
    }

    pub fn is_recording_macro(&self) -> bool {
        self.recording.is_some()
    }

    /// Resolve the accumulated prefix as abandoned (e.g. the keyseq timeout
    /// elapsed with no further byte). Re-dispatches the consumed bytes
    /// through the root keymap one at a time.
    pub fn timeout_abandon<C: Commands>(
        &mut self,
        arena: &KeymapArena,
        root: KeymapId,
        pipeline: &mut InputPipeline,
        commands: &mut C,
    ) -> DispatchSignal {
        if self.pending_prefix.is_empty() {
            return DispatchSignal::Continue;
        }
        let bytes = std::mem::take(&mut self.pending_prefix);
        self.current_map = root;
        let mut last = DispatchSignal::Continue;
        for b in bytes {
            last = self.dispatch_byte(arena, root, b, pipeline, commands);
        }
        last
    }

    /// Feed one raw byte through the keymap walk.
    pub fn dispatch_byte<C: Commands>(
        &mut self,
        arena: &KeymapArena,
        root: KeymapId,
        byte: u8,
        pipeline: &mut InputPipeline,
        commands: &mut C,
    ) -> DispatchSignal {
        if self.collecting_numeric_arg {
            if byte.is_ascii_digit() {
                let digit = (byte - b'0') as i32;
                self.numeric_arg = Some(self.numeric_arg.unwrap_or(0) * 10 + digit);
                return DispatchSignal::Continue;
            }
            if byte == b'-' && self.numeric_arg.is_none() {
                self.numeric_arg_sign = -self.numeric_arg_sign;
                return DispatchSignal::Continue;
            }
            self.collecting_numeric_arg = false;
            // Fall through: this byte is dispatched normally, with the
            // accumulated count applied to whatever it resolves to.
        }

        self.pending_prefix.push(byte);
        match arena.get(self.current_map).lookup(byte).cloned() {
            None => {
                if self.current_map != root {
                    // Abandon the submap walk: replay the consumed prefix
                    // (now including this non-matching byte) through the
                    // root keymap, so e.g. a bare ESC binding still fires
                    // even when `ESC x` doesn't match in the meta submap.
                    let bytes = std::mem::take(&mut self.pending_prefix);
                    self.current_map = root;
                    pipeline.push_back(&bytes);
                    DispatchSignal::Continue
                } else {
                    self.pending_prefix.clear();
                    self.reset_numeric_arg();
                    DispatchSignal::Bell
                }
            }
            Some(KeyAction::Submap(next)) => {
                self.current_map = next;
                DispatchSignal::Continue
            }
            Some(KeyAction::Function(id)) => {
                let seq = std::mem::take(&mut self.pending_prefix);
                self.current_map = root;
                self.record_if_active(&seq, id);
                self.invoke(id, byte, pipeline, commands)
            }
            Some(KeyAction::Macro(bytes)) => {
                let seq = std::mem::take(&mut self.pending_prefix);
                self.current_map = root;
                self.record_if_active(&seq, CommandId(u32::MAX));
                match pipeline.push_macro(bytes) {
                    Ok(()) => DispatchSignal::Continue,
                    Err(_) => DispatchSignal::Bell,
                }
            }
        }
    }

    fn record_if_active(&mut self, seq: &[u8], id: CommandId) {
        if id == CMD_START_KBD_MACRO || id == CMD_END_KBD_MACRO {
            return;
        }
        if let Some(rec) = &mut self.recording {
            rec.extend_from_slice(seq);
        }
    }

    fn reset_numeric_arg(&mut self) {
        self.numeric_arg = None;
        self.numeric_arg_sign = 1;
        self.collecting_numeric_arg = false;
    }

    fn invoke<C: Commands>(
        &mut self,
        id: CommandId,
        key: u8,
        pipeline: &mut InputPipeline,
        commands: &mut C,
    ) -> DispatchSignal {
        match id {
            CMD_DIGIT_ARGUMENT => {
                self.collecting_numeric_arg = true;
                if key.is_ascii_digit() {
                    let digit = (key - b'0') as i32;
                    self.numeric_arg = Some(self.numeric_arg.unwrap_or(0) * 10 + digit);
                } else if key == b'-' {
                    self.numeric_arg_sign = -1;
                }
                DispatchSignal::Continue
            }
            CMD_UNIVERSAL_ARGUMENT => {
                self.collecting_numeric_arg = true;
                self.numeric_arg = Some(self.numeric_arg.unwrap_or(1) * 4);
                DispatchSignal::Continue
            }
            CMD_START_KBD_MACRO => {
                if self.recording.is_some() {
                    DispatchSignal::Bell
                } else {
                    self.recording = Some(Vec::new());
                    DispatchSignal::Continue
                }
            }
            CMD_END_KBD_MACRO => match self.recording.take() {
                Some(buf) => {
                    self.last_macro = buf;
                    DispatchSignal::Continue
                }
                None => DispatchSignal::Bell,
            },
            CMD_CALL_LAST_KBD_MACRO => {
                if self.last_macro.is_empty() {
                    return DispatchSignal::Bell;
                }
                match pipeline.push_macro(self.last_macro.clone()) {
                    Ok(()) => DispatchSignal::Continue,
                    Err(_) => DispatchSignal::Bell,
                }
            }
            _ => {
                let count = self.numeric_arg.unwrap_or(1) * self.numeric_arg_sign;
                let sig = commands.invoke(id, count, key);
                self.reset_numeric_arg();
                sig
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::Keymap;

    struct RecordingCommands {
        calls: Vec<(CommandId, i32, u8)>,
    }

    impl Commands for RecordingCommands {
        fn invoke(&mut self, id: CommandId, count: i32, key: u8) -> DispatchSignal {
            self.calls.push((id, count, key));
            if key == b'\r' {
                DispatchSignal::Submit("line".into())
            } else {
                DispatchSignal::Continue
            }
        }
    }

    const SELF_INSERT: CommandId = CommandId(FIRST_USER_COMMAND);
    const ACCEPT_LINE: CommandId = CommandId(FIRST_USER_COMMAND + 1);

    fn build_arena() -> (KeymapArena, KeymapId) {
        let mut arena = KeymapArena::new();
        let root = arena.alloc();
        for b in 0u8..=255 {
            arena.get_mut(root).bind(b, Some(KeyAction::Function(SELF_INSERT)));
        }
        arena.get_mut(root).bind(b'\r', Some(KeyAction::Function(ACCEPT_LINE)));
        arena.get_mut(root).bind(0x15, Some(KeyAction::Function(CMD_START_KBD_MACRO)));
        arena.get_mut(root).bind(0x18, Some(KeyAction::Function(CMD_END_KBD_MACRO)));
        arena.get_mut(root).bind(0x05, Some(KeyAction::Function(CMD_CALL_LAST_KBD_MACRO)));
        let meta = arena.alloc();
        arena.get_mut(root).bind(0x1b, Some(KeyAction::Submap(meta)));
        arena.get_mut(meta).bind(b'3', Some(KeyAction::Function(CMD_DIGIT_ARGUMENT)));
        (arena, root)
    }

    #[test]
    fn plain_key_invokes_with_default_count() {
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };
        disp.dispatch_byte(&arena, root, b'a', &mut pipe, &mut cmds);
        assert_eq!(cmds.calls, vec![(SELF_INSERT, 1, b'a')]);
    }

    #[test]
    fn unbound_byte_at_root_rings_bell() {
        let mut arena = KeymapArena::new();
        let root = arena.alloc();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };
        let sig = disp.dispatch_byte(&arena, root, b'z', &mut pipe, &mut cmds);
        assert_eq!(sig, DispatchSignal::Bell);
    }

    #[test]
    fn submap_miss_pushes_prefix_back_for_root_redispatch() {
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };
        // ESC then 'z' (unbound in the meta submap): should push [ESC, 'z']
        // back and leave current_map reset to root.
        disp.dispatch_byte(&arena, root, 0x1b, &mut pipe, &mut cmds);
        assert!(disp.is_mid_sequence());
        disp.dispatch_byte(&arena, root, b'z', &mut pipe, &mut cmds);
        assert!(!disp.is_mid_sequence());
        // Replaying the pushed-back bytes resolves ESC (unbound at root,
        // rings bell) then 'z' (self-insert at root).
        let byte1 = pipe.next_byte(&mut std::io::empty());
        assert!(matches!(byte1, Ok(crate::input::ReadOutcome::Byte(0x1b))));
    }

    #[test]
    fn unbound_root_key_resets_pending_numeric_arg() {
        let (mut arena, root) = build_arena();
        arena.get_mut(root).bind(0x00, None);
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };

        disp.dispatch_byte(&arena, root, 0x1b, &mut pipe, &mut cmds);
        disp.dispatch_byte(&arena, root, b'3', &mut pipe, &mut cmds);
        let sig = disp.dispatch_byte(&arena, root, 0x00, &mut pipe, &mut cmds);
        assert!(matches!(sig, DispatchSignal::Bell));

        disp.dispatch_byte(&arena, root, b'a', &mut pipe, &mut cmds);
        assert_eq!(cmds.calls.last(), Some(&(SELF_INSERT, 1, b'a')));
    }

    #[test]
    fn macro_record_and_replay_round_trips() {
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };

        disp.dispatch_byte(&arena, root, 0x15, &mut pipe, &mut cmds); // start
        assert!(disp.is_recording_macro());
        disp.dispatch_byte(&arena, root, b'h', &mut pipe, &mut cmds);
        disp.dispatch_byte(&arena, root, b'i', &mut pipe, &mut cmds);
        disp.dispatch_byte(&arena, root, 0x18, &mut pipe, &mut cmds); // end
        assert!(!disp.is_recording_macro());
        assert_eq!(disp.last_macro, vec![b'h', b'i']);

        cmds.calls.clear();
        disp.dispatch_byte(&arena, root, 0x05, &mut pipe, &mut cmds); // call last macro
        let mut src = std::io::empty();
        let b1 = pipe.next_byte(&mut src).unwrap();
        let b2 = pipe.next_byte(&mut src).unwrap();
        assert!(matches!(b1, crate::input::ReadOutcome::Byte(b'h')));
        assert!(matches!(b2, crate::input::ReadOutcome::Byte(b'i')));
    }

    #[test]
    fn macro_replay_unaffected_by_nested_recording() {
        // Scenario: macro M1 replaying while the user starts recording M2.
        // M1's replay buffer must be a private snapshot, not a live
        // reference to `last_macro`, so recording M2 doesn't perturb it.
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };

        disp.last_macro = vec![b'h', b'i'];
        pipe.push_macro(disp.last_macro.clone()).unwrap();

        // While M1 is "replaying" (bytes sitting in the macro stack),
        // start and end a new recording.
        disp.dispatch_byte(&arena, root, 0x15, &mut pipe, &mut cmds);
        disp.dispatch_byte(&arena, root, b'z', &mut pipe, &mut cmds);
        disp.dispatch_byte(&arena, root, 0x18, &mut pipe, &mut cmds);
        assert_eq!(disp.last_macro, vec![b'z']);

        // M1's originally-pushed bytes are untouched.
        let mut src = std::io::empty();
        let b1 = pipe.next_byte(&mut src).unwrap();
        let b2 = pipe.next_byte(&mut src).unwrap();
        assert!(matches!(b1, crate::input::ReadOutcome::Byte(b'h')));
        assert!(matches!(b2, crate::input::ReadOutcome::Byte(b'i')));
    }

    #[test]
    fn digit_argument_accumulates_and_applies_to_next_command() {
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };

        disp.dispatch_byte(&arena, root, 0x1b, &mut pipe, &mut cmds); // ESC
        disp.dispatch_byte(&arena, root, b'3', &mut pipe, &mut cmds); // M-3 -> digit-argument(3)
        assert!(disp.collecting_numeric_arg);
        disp.dispatch_byte(&arena, root, b'4', &mut pipe, &mut cmds); // accumulate -> 34
        disp.dispatch_byte(&arena, root, b'a', &mut pipe, &mut cmds); // dispatch with count 34
        assert_eq!(cmds.calls, vec![(SELF_INSERT, 34, b'a')]);
        assert!(!disp.collecting_numeric_arg);
    }

    #[test]
    fn submit_signal_propagates_from_commands() {
        let (arena, root) = build_arena();
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };
        let sig = disp.dispatch_byte(&arena, root, b'\r', &mut pipe, &mut cmds);
        assert_eq!(sig, DispatchSignal::Submit("line".into()));
    }

    #[test]
    fn macro_depth_overflow_rings_bell_instead_of_panicking() {
        let mut km = Keymap::new();
        km.bind(b'a', Some(KeyAction::Macro(vec![b'x'])));
        let mut arena = KeymapArena::new();
        let root = arena.alloc();
        *arena.get_mut(root) = km;
        let mut disp = Dispatcher::new(root);
        let mut pipe = InputPipeline::new();
        let mut cmds = RecordingCommands { calls: Vec::new() };
        for _ in 0..40 {
            disp.dispatch_byte(&arena, root, b'a', &mut pipe, &mut cmds);
        }
        // No panic; eventually the stack fills and push_macro starts
        // returning Bell instead.
    }
}
