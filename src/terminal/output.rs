//! `OutputBuffer`: Single-syscall output buffer for ANSI sequences.

use crate::buffer::{Modifiers, Rgb};
use bitflags::bitflags;
use std::io::Write;

bitflags! {
    /// Progressive enhancement flags of the kitty keyboard protocol.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct KeyboardFlags: u8 {
        /// Report ambiguous keys (Esc, Alt+key, Ctrl+key) as `CSI u`.
        const DISAMBIGUATE_ESCAPE_CODES = 0b0_0001;
        /// Report repeats and releases.
        const REPORT_EVENT_TYPES = 0b0_0010;
        /// Report shifted and base-layout keys.
        const REPORT_ALTERNATE_KEYS = 0b0_0100;
        /// Report every key, text keys included, as an escape code.
        const REPORT_ALL_KEYS_AS_ESCAPE_CODES = 0b0_1000;
        /// Append the text a key produces.
        const REPORT_ASSOCIATED_TEXT = 0b1_0000;
    }
}

/// Private modes whose support is asked for with DECRQM.
pub const QUERIED_MODES: [u16; 5] = [2026, 2004, 1004, 1006, 1049];

/// Cursor shapes understood by DECSCUSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    /// Full cell block.
    #[default]
    Block,
    /// Horizontal bar under the cell.
    Underline,
    /// Vertical bar at the left edge.
    Bar,
}

/// Pre-allocated buffer for building ANSI escape sequences.
///
/// All output is accumulated here, then flushed in a single `write()` syscall
/// to prevent terminal flickering.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
}

impl OutputBuffer {
    /// Create a new output buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer sized for a typical terminal (4KB).
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Clear the buffer for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Get the buffer contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the buffer length.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if buffer is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a string.
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Move cursor to (x, y), 0-indexed.
    ///
    /// Uses the most compact representation:
    /// - `\x1b[H` for home
    /// - `\x1b[{row}H` for column 1
    /// - `\x1b[{row};{col}H` otherwise
    #[inline]
    pub fn cursor_move(&mut self, x: u16, y: u16) {
        let row = u32::from(y) + 1;
        let col = u32::from(x) + 1;
        if row == 1 && col == 1 {
            self.data.extend_from_slice(b"\x1b[H");
        } else if col == 1 {
            let _ = write!(self.data, "\x1b[{row}H");
        } else {
            let _ = write!(self.data, "\x1b[{row};{col}H");
        }
    }

    /// Hide cursor.
    #[inline]
    pub fn cursor_hide(&mut self) {
        self.data.extend_from_slice(b"\x1b[?25l");
    }

    /// Show cursor.
    #[inline]
    pub fn cursor_show(&mut self) {
        self.data.extend_from_slice(b"\x1b[?25h");
    }

    /// Set the cursor shape (DECSCUSR).
    pub fn cursor_style(&mut self, style: CursorStyle, blinking: bool) {
        let code = match (style, blinking) {
            (CursorStyle::Block, true) => 1,
            (CursorStyle::Block, false) => 2,
            (CursorStyle::Underline, true) => 3,
            (CursorStyle::Underline, false) => 4,
            (CursorStyle::Bar, true) => 5,
            (CursorStyle::Bar, false) => 6,
        };
        let _ = write!(self.data, "\x1b[{code} q");
    }

    /// Restore the terminal's default cursor shape.
    pub fn cursor_style_reset(&mut self) {
        self.data.extend_from_slice(b"\x1b[0 q");
    }

    /// Set the cursor color (OSC 12).
    pub fn cursor_color(&mut self, color: Rgb) {
        let _ = write!(
            self.data,
            "\x1b]12;#{:02x}{:02x}{:02x}\x07",
            color.r, color.g, color.b
        );
    }

    /// Restore the terminal's default cursor color (OSC 112).
    pub fn cursor_color_reset(&mut self) {
        self.data.extend_from_slice(b"\x1b]112\x07");
    }

    /// Set foreground color (true color).
    #[inline]
    pub fn set_fg(&mut self, color: Rgb) {
        let _ = write!(self.data, "\x1b[38;2;{};{};{}m", color.r, color.g, color.b);
    }

    /// Set background color (true color).
    #[inline]
    pub fn set_bg(&mut self, color: Rgb) {
        let _ = write!(self.data, "\x1b[48;2;{};{};{}m", color.r, color.g, color.b);
    }

    /// Turn on every modifier in `modifiers`.
    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        const CODES: [(Modifiers, &[u8]); 8] = [
            (Modifiers::BOLD, b"\x1b[1m"),
            (Modifiers::DIM, b"\x1b[2m"),
            (Modifiers::ITALIC, b"\x1b[3m"),
            (Modifiers::UNDERLINE, b"\x1b[4m"),
            (Modifiers::BLINK, b"\x1b[5m"),
            (Modifiers::REVERSED, b"\x1b[7m"),
            (Modifiers::HIDDEN, b"\x1b[8m"),
            (Modifiers::STRIKETHROUGH, b"\x1b[9m"),
        ];
        for (flag, code) in CODES {
            if modifiers.contains(flag) {
                self.data.extend_from_slice(code);
            }
        }
    }

    /// Reset all attributes.
    #[inline]
    pub fn reset_attrs(&mut self) {
        self.data.extend_from_slice(b"\x1b[0m");
    }

    /// Clear the entire screen.
    #[inline]
    pub fn clear_screen(&mut self) {
        self.data.extend_from_slice(b"\x1b[2J");
    }

    /// Query palette entries with one `OSC 4 ; i ; ? BEL` per index.
    pub fn query_palette(&mut self, indices: impl IntoIterator<Item = u8>) {
        for index in indices {
            let _ = write!(self.data, "\x1b]4;{index};?\x07");
        }
    }

    /// Query the default foreground and background (OSC 10 and 11).
    pub fn query_default_colors(&mut self) {
        self.data.extend_from_slice(b"\x1b]10;?\x07\x1b]11;?\x07");
    }

    /// Begin a synchronized update; the terminal holds the screen until
    /// [`sync_end`](Self::sync_end).
    pub fn sync_begin(&mut self) {
        self.data.extend_from_slice(b"\x1b[?2026h");
    }

    /// End a synchronized update.
    pub fn sync_end(&mut self) {
        self.data.extend_from_slice(b"\x1b[?2026l");
    }

    /// Push kitty keyboard flags onto the terminal's stack (`CSI > flags u`).
    pub fn kitty_keyboard_push(&mut self, flags: KeyboardFlags) {
        let _ = write!(self.data, "\x1b[>{}u", flags.bits());
    }

    /// Pop the flags pushed by [`kitty_keyboard_push`](Self::kitty_keyboard_push).
    pub fn kitty_keyboard_pop(&mut self) {
        self.data.extend_from_slice(b"\x1b[<u");
    }

    /// Ask what the terminal supports.
    ///
    /// Sends DECRQM for each of [`QUERIED_MODES`], the kitty keyboard flag
    /// query and XTVERSION. Primary device attributes go last: every
    /// terminal answers them, so their reply marks the end of the others.
    pub fn query_capabilities(&mut self) {
        for mode in QUERIED_MODES {
            let _ = write!(self.data, "\x1b[?{mode}$p");
        }
        self.data.extend_from_slice(b"\x1b[?u\x1b[>0q\x1b[c");
    }

    /// Flush to a writer in a single syscall.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn flush_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.data)?;
        writer.flush()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
