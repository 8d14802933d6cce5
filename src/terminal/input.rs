//! Input decoding: Raw terminal bytes to typed events.
//!
//! [`InputDecoder`] is a continuous byte-stream parser. Bytes arrive in
//! arbitrary pieces from the reader thread; a sequence split across two
//! reads is kept until the rest arrives. Recognised grammar:
//!
//! - printable ASCII and UTF-8 characters, C0 control keys
//! - CSI and SS3 cursor, editing and function keys with modifiers
//! - kitty keyboard protocol (`CSI codepoint ; modifiers u`)
//! - SGR (`CSI < b ; x ; y M/m`) and X10 (`CSI M b x y`) mouse reports
//! - focus in/out (`CSI I`, `CSI O`)
//! - bracketed paste (`CSI 200 ~ ... CSI 201 ~`)
//! - OSC 4/10/11 colour reports terminated by BEL or ST
//! - capability replies: DECRPM (`CSI ? mode ; setting $ y`), kitty flags
//!   (`CSI ? flags u`), primary device attributes (`CSI ? ... c`) and
//!   XTVERSION (`DCS > | name ST`)
//!
//! Anything else is dropped. A lone ESC is ambiguous until the escape
//! timeout passes; the caller resolves it with [`InputDecoder::flush_pending`].

use super::palette::{parse_osc_color, OscColor};
use crate::buffer::Rgb;
use bitflags::bitflags;

/// Key codes for keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character.
    Char(char),
    /// Function key (F1-F12).
    F(u8),
    /// Backspace key.
    Backspace,
    /// Enter/Return key.
    Enter,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page Up.
    PageUp,
    /// Page Down.
    PageDown,
    /// Tab key.
    Tab,
    /// Backtab (Shift+Tab).
    BackTab,
    /// Delete key.
    Delete,
    /// Insert key.
    Insert,
    /// Escape key.
    Esc,
    /// Null (Ctrl+Space on some terminals).
    Null,
}

bitflags! {
    /// Modifier keys held during a key or mouse event.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct KeyModifiers: u8 {
        /// Shift key held.
        const SHIFT = 0b0001;
        /// Alt/Option key held.
        const ALT = 0b0010;
        /// Control key held.
        const CONTROL = 0b0100;
        /// Super/Command/Windows key held.
        const SUPER = 0b1000;
    }
}

impl KeyModifiers {
    /// Decode the xterm modifier parameter (`1 + bitmask`).
    const fn from_param(param: u32) -> Self {
        Self::from_bits_truncate(param.saturating_sub(1) as u8)
    }

    /// Decode the modifier bits of a mouse button byte.
    const fn from_mouse(cb: u32) -> Self {
        let mut bits = 0;
        if cb & 4 != 0 {
            bits |= Self::SHIFT.bits();
        }
        if cb & 8 != 0 {
            bits |= Self::ALT.bits();
        }
        if cb & 16 != 0 {
            bits |= Self::CONTROL.bits();
        }
        Self::from_bits_truncate(bits)
    }
}

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Right,
}

/// What happened with the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseKind {
    /// Button pressed.
    Down(MouseButton),
    /// Button released.
    Up(MouseButton),
    /// Moved with a button held.
    Drag(MouseButton),
    /// Moved with no button held.
    Move,
    /// Wheel scrolled up.
    ScrollUp,
    /// Wheel scrolled down.
    ScrollDown,
}

/// Mouse event details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// Event kind.
    pub kind: MouseKind,
    /// X coordinate (column, 0-based).
    pub x: u16,
    /// Y coordinate (row, 0-based).
    pub y: u16,
    /// Modifiers held during the event.
    pub modifiers: KeyModifiers,
}

/// Which default colour an OSC 10/11 report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSlot {
    /// Default foreground (OSC 10).
    Foreground,
    /// Default background (OSC 11).
    Background,
}

/// A decoded terminal input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed.
    Key {
        /// The key code.
        code: KeyCode,
        /// Modifiers held during keypress.
        modifiers: KeyModifiers,
    },
    /// Mouse activity.
    Mouse(MouseEvent),
    /// Bracketed paste content.
    Paste(String),
    /// Terminal window gained focus.
    FocusGained,
    /// Terminal window lost focus.
    FocusLost,
    /// Answer to an OSC 4 palette query.
    PaletteColor {
        /// Palette index.
        index: u8,
        /// Reported colour, scaled to 8 bits per channel.
        color: Rgb,
    },
    /// Answer to an OSC 10/11 query.
    DefaultColor {
        /// Foreground or background.
        slot: ColorSlot,
        /// Reported colour, scaled to 8 bits per channel.
        color: Rgb,
    },
    /// DECRPM answer to a private mode query.
    ModeReport {
        /// The queried mode.
        mode: u32,
        /// 0 unknown, 1 set, 2 reset, 3 permanently set, 4 permanently reset.
        setting: u32,
    },
    /// Kitty keyboard flags currently in effect.
    KittyFlags(u8),
    /// Primary device attributes; answered by every terminal.
    DeviceAttributes(Vec<u32>),
    /// Terminal name and version from XTVERSION.
    TerminalVersion(String),
}

impl InputEvent {
    /// Shorthand for a key event.
    #[inline]
    pub const fn key(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self::Key { code, modifiers }
    }
}

const PASTE_START: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

enum Step {
    /// An event and the bytes it consumed.
    Event(InputEvent, usize),
    /// Bytes to drop without an event.
    Skip(usize),
    /// The sequence needs more bytes.
    Incomplete,
}

/// Streaming decoder for terminal input bytes.
#[derive(Debug, Default)]
pub struct InputDecoder {
    pending: Vec<u8>,
    dropped: u64,
}

impl InputDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(64),
            dropped: 0,
        }
    }

    /// Decode `bytes`, appending complete events to `events`.
    pub fn feed_into(&mut self, bytes: &[u8], events: &mut Vec<InputEvent>) {
        self.pending.extend_from_slice(bytes);
        let mut pos = 0;
        while pos < self.pending.len() {
            match decode_one(&self.pending[pos..]) {
                Step::Event(event, used) => {
                    events.push(event);
                    pos += used;
                }
                Step::Skip(used) => {
                    self.dropped += 1;
                    tracing::trace!(
                        bytes = ?String::from_utf8_lossy(&self.pending[pos..pos + used]),
                        "dropped unrecognised input"
                    );
                    pos += used;
                }
                Step::Incomplete => break,
            }
        }
        self.pending.drain(..pos);
    }

    /// Decode `bytes` and return the complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        self.feed_into(bytes, &mut events);
        events
    }

    /// Whether a partial sequence is waiting for more bytes.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of sequences dropped as unrecognised.
    #[inline]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Resolve a partial sequence after the escape timeout.
    ///
    /// A lone ESC becomes the Escape key and `ESC x` becomes Alt+x. A
    /// paste still waiting for its end marker is kept. Anything else
    /// pending is dropped.
    pub fn flush_pending(&mut self) -> Vec<InputEvent> {
        if self.pending.starts_with(PASTE_START) {
            return Vec::new();
        }
        let pending = std::mem::take(&mut self.pending);
        match pending.as_slice() {
            [] => Vec::new(),
            [0x1b] => vec![InputEvent::key(KeyCode::Esc, KeyModifiers::empty())],
            [0x1b, rest @ ..]
                if !matches!(rest.first(), Some(b'[' | b']' | b'O')) && !rest.starts_with(b"P>") =>
            {
                let mut events = self.feed(rest);
                if let Some(InputEvent::Key { modifiers, .. }) = events.first_mut() {
                    *modifiers |= KeyModifiers::ALT;
                }
                events
            }
            other => {
                self.dropped += 1;
                tracing::trace!(bytes = ?String::from_utf8_lossy(other), "dropped incomplete input");
                Vec::new()
            }
        }
    }
}

fn decode_one(buf: &[u8]) -> Step {
    let plain = |code| Step::Event(InputEvent::key(code, KeyModifiers::empty()), 1);
    let ctrl = |c: u8| {
        Step::Event(
            InputEvent::key(KeyCode::Char(char::from(c + b'a' - 1)), KeyModifiers::CONTROL),
            1,
        )
    };
    match buf[0] {
        0x1b => decode_escape(buf),
        0x00 => Step::Event(InputEvent::key(KeyCode::Null, KeyModifiers::CONTROL), 1),
        0x08 | 0x7f => plain(KeyCode::Backspace),
        b'\t' => plain(KeyCode::Tab),
        b'\r' | b'\n' => plain(KeyCode::Enter),
        c @ 0x01..=0x1a => ctrl(c),
        0x1c..=0x1f => Step::Skip(1),
        c @ 0x20..=0x7e => plain(KeyCode::Char(char::from(c))),
        _ => decode_utf8(buf),
    }
}

fn decode_utf8(buf: &[u8]) -> Step {
    let len = match buf[0] {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Step::Skip(1),
    };
    if buf.len() < len {
        return Step::Incomplete;
    }
    match std::str::from_utf8(&buf[..len]).ok().and_then(|s| s.chars().next()) {
        Some(c) => Step::Event(InputEvent::key(KeyCode::Char(c), KeyModifiers::empty()), len),
        None => Step::Skip(1),
    }
}

fn decode_escape(buf: &[u8]) -> Step {
    let Some(&next) = buf.get(1) else {
        return Step::Incomplete;
    };
    match next {
        b'[' => decode_csi(buf),
        b']' => decode_osc(buf),
        b'O' => decode_ss3(buf),
        b'P' => match buf.get(2) {
            None => Step::Incomplete,
            Some(b'>') => decode_dcs(buf),
            Some(_) => Step::Event(InputEvent::key(KeyCode::Char('P'), KeyModifiers::ALT), 2),
        },
        0x1b => Step::Event(InputEvent::key(KeyCode::Esc, KeyModifiers::ALT), 2),
        0x20..=0x7e => Step::Event(
            InputEvent::key(KeyCode::Char(char::from(next)), KeyModifiers::ALT),
            2,
        ),
        _ => Step::Event(InputEvent::key(KeyCode::Esc, KeyModifiers::empty()), 1),
    }
}

fn decode_ss3(buf: &[u8]) -> Step {
    let Some(&last) = buf.get(2) else {
        return Step::Incomplete;
    };
    match cursor_key(last) {
        Some(code) => Step::Event(InputEvent::key(code, KeyModifiers::empty()), 3),
        None => Step::Skip(3),
    }
}

/// Keys encoded by the final byte alone.
const fn cursor_key(last: u8) -> Option<KeyCode> {
    Some(match last {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        _ => return None,
    })
}

/// Keys encoded as `CSI number ~`.
const fn tilde_key(number: u32) -> Option<KeyCode> {
    Some(match number {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=15 => KeyCode::F((number - 10) as u8),
        17..=21 => KeyCode::F((number - 11) as u8),
        23 | 24 => KeyCode::F((number - 12) as u8),
        _ => return None,
    })
}

fn params(raw: &[u8]) -> Vec<u32> {
    raw.split(|b| *b == b';')
        .map(|p| {
            // kitty sub-parameters (`code:shifted`) keep only the first field
            let head = p.split(|b| *b == b':').next().unwrap_or_default();
            std::str::from_utf8(head)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        })
        .collect()
}

fn decode_csi(buf: &[u8]) -> Step {
    let Some(&third) = buf.get(2) else {
        return Step::Incomplete;
    };
    match third {
        b'<' => return decode_sgr_mouse(buf),
        b'M' => return decode_x10_mouse(buf),
        b'I' => return Step::Event(InputEvent::FocusGained, 3),
        b'O' => return Step::Event(InputEvent::FocusLost, 3),
        b'?' => return decode_private_reply(buf),
        _ => {}
    }
    if buf.starts_with(PASTE_START) {
        return decode_paste(buf);
    }
    let Some(end) = buf[2..].iter().position(|b| (0x40..=0x7e).contains(b)) else {
        return Step::Incomplete;
    };
    let end = end + 2;
    let used = end + 1;
    let args = params(&buf[2..end]);
    let modifiers = args
        .get(1)
        .map_or(KeyModifiers::empty(), |m| KeyModifiers::from_param(*m));

    let code = match buf[end] {
        b'u' => return decode_kitty(&args, used),
        b'Z' => Some(KeyCode::BackTab),
        b'~' => tilde_key(args.first().copied().unwrap_or(0)),
        last => cursor_key(last),
    };
    match code {
        Some(KeyCode::BackTab) => Step::Event(InputEvent::key(KeyCode::BackTab, KeyModifiers::SHIFT), used),
        Some(code) => Step::Event(InputEvent::key(code, modifiers), used),
        None => Step::Skip(used),
    }
}

fn decode_private_reply(buf: &[u8]) -> Step {
    let Some(end) = buf[3..].iter().position(|b| (0x40..=0x7e).contains(b)) else {
        return Step::Incomplete;
    };
    let end = end + 3;
    let used = end + 1;
    let body = &buf[3..end];
    let event = match (buf[end], body.strip_suffix(b"$")) {
        (b'y', Some(body)) => match params(body).as_slice() {
            &[mode, setting] => InputEvent::ModeReport { mode, setting },
            _ => return Step::Skip(used),
        },
        (b'u', None) => {
            let flags = params(body).first().copied().unwrap_or(0);
            InputEvent::KittyFlags(flags.min(u32::from(u8::MAX)) as u8)
        }
        (b'c', None) => InputEvent::DeviceAttributes(params(body)),
        _ => return Step::Skip(used),
    };
    Step::Event(event, used)
}

fn decode_dcs(buf: &[u8]) -> Step {
    let Some((body_end, used)) = osc_terminator(buf) else {
        return Step::Incomplete;
    };
    match buf[3..body_end].strip_prefix(b"|") {
        Some(name) => Step::Event(
            InputEvent::TerminalVersion(String::from_utf8_lossy(name).into_owned()),
            used,
        ),
        None => Step::Skip(used),
    }
}

fn decode_kitty(args: &[u32], used: usize) -> Step {
    let modifiers = args
        .get(1)
        .map_or(KeyModifiers::empty(), |m| KeyModifiers::from_param(*m));
    // event type 3 is a key release
    if args.get(2) == Some(&3) {
        return Step::Skip(used);
    }
    let code = match args.first().copied().unwrap_or(0) {
        9 => KeyCode::Tab,
        13 => KeyCode::Enter,
        27 => KeyCode::Esc,
        127 => KeyCode::Backspace,
        cp => match char::from_u32(cp) {
            Some(c) => KeyCode::Char(c),
            None => return Step::Skip(used),
        },
    };
    Step::Event(InputEvent::key(code, modifiers), used)
}

fn mouse_button(cb: u32) -> MouseButton {
    match cb & 3 {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        _ => MouseButton::Right,
    }
}

fn decode_sgr_mouse(buf: &[u8]) -> Step {
    let Some(end) = buf[3..].iter().position(|b| *b == b'M' || *b == b'm') else {
        return Step::Incomplete;
    };
    let end = end + 3;
    let used = end + 1;
    let args = params(&buf[3..end]);
    let &[cb, x, y] = args.as_slice() else {
        return Step::Skip(used);
    };
    let release = buf[end] == b'm';
    let kind = if cb & 64 != 0 {
        if cb & 1 == 0 {
            MouseKind::ScrollUp
        } else {
            MouseKind::ScrollDown
        }
    } else if cb & 32 != 0 {
        if cb & 3 == 3 {
            MouseKind::Move
        } else {
            MouseKind::Drag(mouse_button(cb))
        }
    } else if release {
        MouseKind::Up(mouse_button(cb))
    } else {
        MouseKind::Down(mouse_button(cb))
    };
    Step::Event(
        InputEvent::Mouse(MouseEvent {
            kind,
            x: x.saturating_sub(1).min(u32::from(u16::MAX)) as u16,
            y: y.saturating_sub(1).min(u32::from(u16::MAX)) as u16,
            modifiers: KeyModifiers::from_mouse(cb),
        }),
        used,
    )
}

fn decode_x10_mouse(buf: &[u8]) -> Step {
    if buf.len() < 6 {
        return Step::Incomplete;
    }
    let cb = u32::from(buf[3].wrapping_sub(32));
    let kind = if cb & 64 != 0 {
        if cb & 1 == 0 {
            MouseKind::ScrollUp
        } else {
            MouseKind::ScrollDown
        }
    } else if cb & 32 != 0 {
        MouseKind::Drag(mouse_button(cb))
    } else if cb & 3 == 3 {
        // X10 does not say which button was released
        MouseKind::Up(MouseButton::Left)
    } else {
        MouseKind::Down(mouse_button(cb))
    };
    Step::Event(
        InputEvent::Mouse(MouseEvent {
            kind,
            x: u16::from(buf[4].saturating_sub(33)),
            y: u16::from(buf[5].saturating_sub(33)),
            modifiers: KeyModifiers::from_mouse(cb),
        }),
        6,
    )
}

fn decode_paste(buf: &[u8]) -> Step {
    let body = &buf[PASTE_START.len()..];
    let Some(end) = body.windows(PASTE_END.len()).position(|w| w == PASTE_END) else {
        return Step::Incomplete;
    };
    let text = String::from_utf8_lossy(&body[..end]).into_owned();
    Step::Event(InputEvent::Paste(text), PASTE_START.len() + end + PASTE_END.len())
}

/// Find the end of an OSC body: `(body_end, sequence_end)`.
pub(super) fn osc_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 2;
    while i < buf.len() {
        match buf[i] {
            0x07 => return Some((i, i + 1)),
            0x1b if buf.get(i + 1) == Some(&b'\\') => return Some((i, i + 2)),
            _ => i += 1,
        }
    }
    None
}

fn decode_osc(buf: &[u8]) -> Step {
    let Some((body_end, used)) = osc_terminator(buf) else {
        return Step::Incomplete;
    };
    match parse_osc_color(&buf[2..body_end]) {
        Some(OscColor::Palette(index, color)) => Step::Event(InputEvent::PaletteColor { index, color }, used),
        Some(OscColor::Default(slot, color)) => Step::Event(InputEvent::DefaultColor { slot, color }, used),
        None => Step::Skip(used),
    }
}
