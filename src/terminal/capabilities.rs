//! Terminal capabilities: What the terminal has said it supports.
//!
//! [`Capabilities`] starts from environment hints and is refined by the
//! replies to [`OutputBuffer::query_capabilities`](super::OutputBuffer::query_capabilities).
//! Replies travel through the ordinary input stream and may arrive at any
//! point after the query, interleaved with keys, so they are folded in as
//! the decoder produces them.

use super::input::{InputDecoder, InputEvent};
use super::output::KeyboardFlags;

/// Features the attached terminal supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 24-bit colour.
    pub truecolor: bool,
    /// Mouse reporting at all.
    pub mouse: bool,
    /// SGR extended mouse reports (mode 1006).
    pub sgr_mouse: bool,
    /// The kitty keyboard protocol answered its flag query.
    pub kitty_keyboard: bool,
    /// Kitty keyboard flags in effect when last reported.
    pub keyboard_flags: KeyboardFlags,
    /// Synchronized output (mode 2026).
    pub synchronized_output: bool,
    /// Bracketed paste (mode 2004).
    pub bracketed_paste: bool,
    /// Focus reports (mode 1004).
    pub focus_events: bool,
    /// Alternate screen (mode 1049).
    pub alternate_screen: bool,
    /// Name and version from XTVERSION.
    pub terminal_name: Option<String>,
    /// Primary device attribute parameters.
    pub device_attributes: Vec<u32>,
    /// The device attributes reply arrived, so every earlier reply has too.
    pub answered: bool,
}

impl Capabilities {
    /// Guess from `COLORTERM` and `TERM`.
    pub fn detect() -> Self {
        Self::detect_with_env(std::env::var("COLORTERM").ok(), std::env::var("TERM").ok())
    }

    /// Guess from the values of `COLORTERM` and `TERM`.
    pub fn detect_with_env(colorterm: Option<String>, term: Option<String>) -> Self {
        let capable = !matches!(term.as_deref(), None | Some("" | "dumb"));
        Self {
            truecolor: matches!(colorterm.as_deref(), Some("truecolor" | "24bit")),
            mouse: capable,
            alternate_screen: capable,
            bracketed_paste: capable,
            ..Self::default()
        }
    }

    /// Fold one decoded event in. Returns `false` for anything that is not
    /// a capability reply.
    pub fn apply(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::ModeReport { mode, setting } => {
                let supported = matches!(setting, 1..=4);
                match mode {
                    2026 => self.synchronized_output = supported,
                    2004 => self.bracketed_paste = supported,
                    1004 => self.focus_events = supported,
                    1049 => self.alternate_screen = supported,
                    1006 => {
                        self.sgr_mouse = supported;
                        self.mouse |= supported;
                    }
                    _ => tracing::trace!(mode, setting, "unrequested mode report"),
                }
            }
            InputEvent::KittyFlags(bits) => {
                self.kitty_keyboard = true;
                self.keyboard_flags = KeyboardFlags::from_bits_truncate(*bits);
            }
            InputEvent::TerminalVersion(name) => {
                let lower = name.to_ascii_lowercase();
                if ["kitty", "wezterm", "ghostty", "iterm2", "foot", "alacritty"]
                    .iter()
                    .any(|known| lower.contains(known))
                {
                    self.truecolor = true;
                }
                self.terminal_name = Some(name.clone());
            }
            InputEvent::DeviceAttributes(params) => {
                self.device_attributes.clone_from(params);
                self.answered = true;
                tracing::debug!(
                    name = self.terminal_name.as_deref().unwrap_or("unknown"),
                    kitty = self.kitty_keyboard,
                    sync = self.synchronized_output,
                    truecolor = self.truecolor,
                    "terminal capabilities answered"
                );
            }
            _ => return false,
        }
        true
    }

    /// Decode a chunk of terminal output, fold in the replies and return
    /// every other event in order.
    pub fn process_response(&mut self, decoder: &mut InputDecoder, bytes: &[u8]) -> Vec<InputEvent> {
        let mut events = decoder.feed(bytes);
        events.retain(|event| !self.apply(event));
        events
    }
}
