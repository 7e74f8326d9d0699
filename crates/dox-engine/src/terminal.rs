//! Host terminal handling for interactive container sessions.
//!
//! The host terminal is switched to raw mode while an interactive session is
//! running so keystrokes (including Ctrl-C) reach the container unprocessed.
//! [`RawMode`] restores the saved state when dropped, on every exit path.

use crate::error::Result;
use nix::sys::termios::{self, SetArg, Termios};
use std::io::IsTerminal;
use tracing::debug;

/// Terminal size (width x height).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Width in columns.
    pub cols: u16,
    /// Height in rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Samples the current terminal size, if the host has a terminal.
    pub fn current() -> Option<Self> {
        crossterm::terminal::size()
            .ok()
            .filter(|(cols, rows)| *cols > 0 && *rows > 0)
            .map(|(cols, rows)| Self { cols, rows })
    }
}

/// Returns true when both host stdin and stdout are interactive terminals.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Guard that keeps the host terminal in raw mode.
///
/// If stdin is not a terminal, entering is a no-op and so is restoring.
pub struct RawMode {
    saved: Option<Termios>,
}

impl RawMode {
    /// Switches stdin to raw mode, saving the previous state.
    pub fn enter() -> Result<Self> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Ok(Self { saved: None });
        }

        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        debug!("Host terminal switched to raw mode");

        Ok(Self { saved: Some(saved) })
    }

    /// Restores the saved terminal state. Safe to call more than once.
    pub fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            let stdin = std::io::stdin();
            if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &saved) {
                debug!("Failed to restore terminal state: {}", e);
            } else {
                debug!("Host terminal restored");
            }
        }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        self.restore();
    }
}
