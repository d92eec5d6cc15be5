//! Scoped terminal acquisition and signal glue.
//!
//! Corresponds to a `Terminal::enter_raw_mode`/`RawModeGuard` pairing,
//! generalized from a one-shot application setup into a reusable library
//! type, and to `brush-interactive`'s `basic::raw_mode` module for the
//! termios-fallback and signal-handling shape.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU8, Ordering};

use crossterm::terminal;

use crate::error::ReadlineError;

/// Values packed into [`CAUGHT_SIGNAL`]. `0` means "none caught".
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaughtSignal {
    None = 0,
    Winch = 1,
    Int = 2,
    Term = 3,
    Hup = 4,
    Quit = 5,
    Tstp = 6,
    Ttin = 7,
    Ttou = 8,
}

impl CaughtSignal {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CaughtSignal::Winch,
            2 => CaughtSignal::Int,
            3 => CaughtSignal::Term,
            4 => CaughtSignal::Hup,
            5 => CaughtSignal::Quit,
            6 => CaughtSignal::Tstp,
            7 => CaughtSignal::Ttin,
            8 => CaughtSignal::Ttou,
            _ => CaughtSignal::None,
        }
    }
}

/// The single unavoidable global: signal handlers may only set an atomic
/// word and return. The dispatch loop polls it at every safe point via
/// [`poll_signals`].
pub static CAUGHT_SIGNAL: AtomicU8 = AtomicU8::new(0);

/// Record that `signal` fired. Safe to call from a signal handler context
/// (a single non-blocking atomic store).
pub fn record_signal(signal: CaughtSignal) {
    CAUGHT_SIGNAL.store(signal as u8, Ordering::SeqCst);
}

/// Consume and clear the caught-signal word.
fn take_caught_signal() -> CaughtSignal {
    CaughtSignal::from_u8(CAUGHT_SIGNAL.swap(0, Ordering::SeqCst))
}

/// What the dispatch loop should do after observing a caught signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Re-query terminal size and force a redraw; reading continues.
    Resize,
    /// Terminal was deprepped for job control; re-prep and force a redraw
    /// once execution resumes (the caller re-enters `poll_signals` after
    /// waking from `SIGCONT`).
    Suspended,
}

/// Poll the caught-signal word at a safe point in the dispatch loop.
/// Returns `ControlFlow::Continue` with an action to take (or nothing to
/// do), or `ControlFlow::Break` with the error the caller should unwind to
/// the top of `read_line` with via `?`.
pub fn poll_signals() -> ControlFlow<ReadlineError, Option<SignalAction>> {
    match take_caught_signal() {
        CaughtSignal::None => ControlFlow::Continue(None),
        CaughtSignal::Winch => ControlFlow::Continue(Some(SignalAction::Resize)),
        CaughtSignal::Int => ControlFlow::Break(ReadlineError::Interrupted),
        CaughtSignal::Term | CaughtSignal::Hup | CaughtSignal::Quit => {
            ControlFlow::Break(ReadlineError::Interrupted)
        }
        CaughtSignal::Tstp | CaughtSignal::Ttin | CaughtSignal::Ttou => {
            ControlFlow::Continue(Some(SignalAction::Suspended))
        }
    }
}

/// RAII scoped terminal acquisition: enables raw mode on construction,
/// restores the prior mode on drop (including on unwind, so a signal or
/// an early `?` still leaves the terminal usable). Generalizes a
/// `RawModeGuard` to cover the full prep/deprep cycle rather than just
/// `enable_raw_mode`/`disable_raw_mode`.
pub struct TermGuard {
    was_raw: bool,
}

impl TermGuard {
    /// Enter raw mode. Returns [`ReadlineError::NotATerminal`] if the
    /// underlying stream has no terminal to switch.
    pub fn acquire() -> Result<Self, ReadlineError> {
        if !is_a_terminal() {
            return Err(ReadlineError::NotATerminal);
        }
        let was_raw = terminal::is_raw_mode_enabled().unwrap_or(false);
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }

    /// Re-query terminal size on `SIGWINCH`, falling back to `80×24`
    /// if the query fails (e.g. output redirected to a non-tty).
    pub fn size() -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }

    /// Temporarily leave raw mode on `SIGTSTP`; call [`TermGuard::resume`]
    /// once the process resumes on `SIGCONT`.
    pub fn suspend(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()
    }

    /// Re-enter raw mode after [`TermGuard::suspend`] (on `SIGCONT`).
    pub fn resume(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        if !self.was_raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

use std::io;

fn is_a_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}

#[cfg(unix)]
pub mod signals {
    //! Unix signal handler installation, grounded on `nix::sys::signal`.
    //! Handlers only ever call [`super::record_signal`].

    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    use super::{record_signal, CaughtSignal};

    extern "C" fn handle_winch(_: libc::c_int) {
        record_signal(CaughtSignal::Winch);
    }
    extern "C" fn handle_int(_: libc::c_int) {
        record_signal(CaughtSignal::Int);
    }
    extern "C" fn handle_term(_: libc::c_int) {
        record_signal(CaughtSignal::Term);
    }
    extern "C" fn handle_hup(_: libc::c_int) {
        record_signal(CaughtSignal::Hup);
    }
    extern "C" fn handle_quit(_: libc::c_int) {
        record_signal(CaughtSignal::Quit);
    }
    extern "C" fn handle_tstp(_: libc::c_int) {
        record_signal(CaughtSignal::Tstp);
    }
    extern "C" fn handle_ttin(_: libc::c_int) {
        record_signal(CaughtSignal::Ttin);
    }
    extern "C" fn handle_ttou(_: libc::c_int) {
        record_signal(CaughtSignal::Ttou);
    }

    /// Install handlers for `SIGWINCH`, `SIGINT`, `SIGTERM`, `SIGHUP`,
    /// `SIGQUIT`, `SIGTSTP`, `SIGTTIN`, and `SIGTTOU`. Safe to call more
    /// than once (each call just re-installs the same handlers).
    ///
    /// # Safety
    /// Installing a signal handler is inherently `unsafe` per `nix`'s API;
    /// the handlers themselves only perform an atomic store, satisfying
    /// the async-signal-safety requirement.
    pub unsafe fn install() -> nix::Result<()> {
        let flags = SaFlags::SA_RESTART;
        let mask = SigSet::empty();
        let table: &[(Signal, SigHandler)] = &[
            (Signal::SIGWINCH, SigHandler::Handler(handle_winch)),
            (Signal::SIGINT, SigHandler::Handler(handle_int)),
            (Signal::SIGTERM, SigHandler::Handler(handle_term)),
            (Signal::SIGHUP, SigHandler::Handler(handle_hup)),
            (Signal::SIGQUIT, SigHandler::Handler(handle_quit)),
            (Signal::SIGTSTP, SigHandler::Handler(handle_tstp)),
            (Signal::SIGTTIN, SigHandler::Handler(handle_ttin)),
            (Signal::SIGTTOU, SigHandler::Handler(handle_ttou)),
        ];
        for &(sig, handler) in table {
            signal::sigaction(sig, &SigAction::new(handler, flags, mask))?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_signals_none_is_continue_none() {
        CAUGHT_SIGNAL.store(0, Ordering::SeqCst);
        match poll_signals() {
            ControlFlow::Continue(None) => {}
            other => panic!("expected Continue(None), got {other:?}"),
        }
    }

    #[test]
    fn poll_signals_winch_is_resize_action() {
        record_signal(CaughtSignal::Winch);
        match poll_signals() {
            ControlFlow::Continue(Some(SignalAction::Resize)) => {}
            other => panic!("expected Continue(Some(Resize)), got {other:?}"),
        }
    }

    #[test]
    fn poll_signals_int_breaks_with_interrupted() {
        record_signal(CaughtSignal::Int);
        match poll_signals() {
            ControlFlow::Break(ReadlineError::Interrupted) => {}
            other => panic!("expected Break(Interrupted), got {other:?}"),
        }
    }

    #[test]
    fn poll_signals_tstp_is_suspended_action() {
        record_signal(CaughtSignal::Tstp);
        match poll_signals() {
            ControlFlow::Continue(Some(SignalAction::Suspended)) => {}
            other => panic!("expected Continue(Some(Suspended)), got {other:?}"),
        }
    }

    #[test]
    fn poll_signals_consumes_the_flag() {
        record_signal(CaughtSignal::Winch);
        poll_signals();
        match poll_signals() {
            ControlFlow::Continue(None) => {}
            other => panic!("expected Continue(None), got {other:?}"),
        }
    }
}
