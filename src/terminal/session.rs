//! Terminal session: Raw mode and screen state with guaranteed restore.
//!
//! Entering a session switches the terminal into the modes the engine
//! needs. [`TerminalSession::restore`] undoes every one of them and is
//! also run on drop, so the terminal comes back in cooked mode with a
//! visible cursor even when the engine unwinds mid-frame.

use super::output::{KeyboardFlags, OutputBuffer};
use crate::error::Result;
use crossterm::{
    cursor,
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use std::io::{self, Write};

/// Which terminal modes a session turns on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Switch to the alternate screen.
    pub alternate_screen: bool,
    /// Enable mouse reporting.
    pub mouse: bool,
    /// Enable bracketed paste.
    pub bracketed_paste: bool,
    /// Report focus in/out.
    pub focus_events: bool,
    /// Kitty keyboard flags to push on entry; popped again on restore.
    pub kitty_keyboard: Option<KeyboardFlags>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            alternate_screen: true,
            mouse: true,
            bracketed_paste: true,
            focus_events: true,
            kitty_keyboard: None,
        }
    }
}

/// An active terminal session on stdout.
#[derive(Debug)]
pub struct TerminalSession {
    options: SessionOptions,
    active: bool,
    /// Kitty keyboard pushes not yet popped.
    keyboard_depth: usize,
}

impl TerminalSession {
    /// Enter raw mode and the configured screen modes.
    ///
    /// On failure, whatever was already switched on is switched off again.
    pub fn enter(options: SessionOptions) -> Result<Self> {
        let mut session = Self {
            options,
            active: true,
            keyboard_depth: 0,
        };
        if let Err(error) = session.setup() {
            let _ = session.restore();
            return Err(error);
        }
        tracing::debug!(?options, "terminal session entered");
        Ok(session)
    }

    fn setup(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        if self.options.alternate_screen {
            execute!(stdout, EnterAlternateScreen)?;
        }
        if self.options.mouse {
            execute!(stdout, EnableMouseCapture)?;
        }
        if self.options.bracketed_paste {
            execute!(stdout, EnableBracketedPaste)?;
        }
        if self.options.focus_events {
            execute!(stdout, EnableFocusChange)?;
        }
        execute!(stdout, cursor::Hide, terminal::Clear(terminal::ClearType::All))?;
        if let Some(flags) = self.options.kitty_keyboard {
            self.push_keyboard_flags(flags)?;
        }
        Ok(())
    }

    /// Current terminal size in columns and rows.
    pub fn size() -> Result<(u16, u16)> {
        Ok(terminal::size()?)
    }

    /// Whether stdin is a terminal that could answer queries.
    pub fn input_is_tty() -> bool {
        io::stdin().is_tty()
    }

    /// Whether the session still owns the terminal.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Write a frame in one system call.
    pub fn write(&mut self, out: &OutputBuffer) -> Result<()> {
        let mut stdout = io::stdout().lock();
        out.flush_to(&mut stdout)?;
        Ok(())
    }

    /// Push kitty keyboard flags; [`restore`](Self::restore) pops whatever
    /// is still pushed.
    pub fn push_keyboard_flags(&mut self, flags: KeyboardFlags) -> Result<()> {
        let mut out = OutputBuffer::with_capacity(8);
        out.kitty_keyboard_push(flags);
        self.write(&out)?;
        self.keyboard_depth += 1;
        tracing::debug!(flags = flags.bits(), depth = self.keyboard_depth, "kitty keyboard pushed");
        Ok(())
    }

    /// Pop the most recent push. Returns `false` when nothing was pushed.
    pub fn pop_keyboard_flags(&mut self) -> Result<bool> {
        if self.keyboard_depth == 0 {
            return Ok(false);
        }
        let mut out = OutputBuffer::with_capacity(4);
        out.kitty_keyboard_pop();
        self.write(&out)?;
        self.keyboard_depth -= 1;
        Ok(true)
    }

    /// Kitty keyboard pushes still in effect.
    #[inline]
    pub const fn keyboard_depth(&self) -> usize {
        self.keyboard_depth
    }

    /// Put the terminal back the way it was. Safe to call more than once.
    ///
    /// Every step is attempted; the first error is returned.
    pub fn restore(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let mut stdout = io::stdout();
        let mut reset = OutputBuffer::with_capacity(32);
        reset.reset_attrs();
        reset.cursor_style_reset();
        reset.cursor_color_reset();
        for _ in 0..std::mem::take(&mut self.keyboard_depth) {
            reset.kitty_keyboard_pop();
        }
        let mut results = vec![reset.flush_to(&mut stdout), execute!(stdout, cursor::Show)];
        if self.options.focus_events {
            results.push(execute!(stdout, DisableFocusChange));
        }
        if self.options.bracketed_paste {
            results.push(execute!(stdout, DisableBracketedPaste));
        }
        if self.options.mouse {
            results.push(execute!(stdout, DisableMouseCapture));
        }
        if self.options.alternate_screen {
            results.push(execute!(stdout, LeaveAlternateScreen));
        }
        results.push(terminal::disable_raw_mode());
        results.push(stdout.flush());
        tracing::debug!("terminal session restored");
        results.into_iter().collect::<io::Result<Vec<()>>>()?;
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(error) = self.restore() {
            tracing::warn!(%error, "terminal restore failed");
        }
    }
}
