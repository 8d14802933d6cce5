//! Cell: The atomic unit of terminal display.
//!
//! # Memory Layout
//!
//! The `Cell` struct is laid out for cache efficiency:
//! - 20 bytes total, 16 of content plus a 4-byte generation stamp
//! - Inline grapheme storage covers 99%+ of real-world characters
//! - Longer clusters (emoji ZWJ sequences) spill into the
//!   [`GraphemePool`](crate::memory::GraphemePool)
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────────┐
//! │  Cell Layout (20 bytes)                                                    │
//! ├─────────────┬─────────────┬─────────┬─────────┬─────┬───────┬──────┬───────┤
//! │  grapheme   │  len + width│   fg    │   bg    │ mod │ flags │ pad  │  gen  │
//! │  [u8; 4]    │  u8 + u8    │ [u8; 3] │ [u8; 3] │ u8  │  u8   │ [u8;2]│ u32  │
//! └─────────────┴─────────────┴─────────┴─────────┴─────┴───────┴──────┴───────┘
//! ```

use crate::memory::GraphemeId;
use bitflags::bitflags;
use std::hash::{Hash, Hasher};

/// True-color RGB representation.
///
/// Uses 3 bytes for 24-bit color depth. Cells only ever store opaque
/// colors; transparency is resolved by compositing at paint time.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgb {
    /// Red channel (0-255)
    pub r: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Blue channel (0-255)
    pub b: u8,
}

impl Rgb {
    /// Create a new RGB color.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black (0, 0, 0)
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// White (255, 255, 255)
    pub const WHITE: Self = Self::new(255, 255, 255);
    /// Default foreground (white)
    pub const DEFAULT_FG: Self = Self::WHITE;
    /// Default background (black)
    pub const DEFAULT_BG: Self = Self::BLACK;

    /// Create from a 24-bit hex color (e.g., 0xFF5500).
    #[inline]
    pub const fn from_u32(hex: u32) -> Self {
        Self::new(
            ((hex >> 16) & 0xFF) as u8,
            ((hex >> 8) & 0xFF) as u8,
            (hex & 0xFF) as u8,
        )
    }
}

impl std::fmt::Debug for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<(u8, u8, u8)> for Rgb {
    #[inline]
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl From<u32> for Rgb {
    /// Convert from a 24-bit hex color (e.g., 0xFF5500)
    #[inline]
    fn from(hex: u32) -> Self {
        Self::from_u32(hex)
    }
}

/// Blend one channel: `src * a + dst * (1 - a)`, rounded.
#[inline]
fn blend_channel(src: u8, dst: u8, alpha: f32) -> u8 {
    let value = f32::from(src).mul_add(alpha, f32::from(dst) * (1.0 - alpha));
    value.round().clamp(0.0, 255.0) as u8
}

/// RGB color with an alpha channel, used for painting.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgba {
    /// Red channel (0-255)
    pub r: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Blue channel (0-255)
    pub b: u8,
    /// Alpha (0 = transparent, 255 = opaque)
    pub a: u8,
}

impl Rgba {
    /// Create a new RGBA color.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from RGB channels.
    #[inline]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::opaque(255, 255, 255);
    /// Opaque black.
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    /// The color's own alpha as a fraction.
    #[inline]
    pub fn alpha(self) -> f32 {
        f32::from(self.a) / 255.0
    }

    /// Drop the alpha channel.
    #[inline]
    pub const fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }

    /// Composite this color over `dst` with an extra opacity factor.
    ///
    /// The effective alpha is `opacity * self.alpha()`.
    #[inline]
    pub fn over(self, dst: Rgb, opacity: f32) -> Rgb {
        let alpha = (self.alpha() * opacity).clamp(0.0, 1.0);
        if alpha >= 1.0 {
            return self.rgb();
        }
        if alpha <= 0.0 {
            return dst;
        }
        Rgb::new(
            blend_channel(self.r, dst.r, alpha),
            blend_channel(self.g, dst.g, alpha),
            blend_channel(self.b, dst.b, alpha),
        )
    }
}

impl From<Rgb> for Rgba {
    #[inline]
    fn from(rgb: Rgb) -> Self {
        Self::opaque(rgb.r, rgb.g, rgb.b)
    }
}

impl std::fmt::Debug for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

bitflags! {
    /// Text style modifiers.
    ///
    /// These can be combined using bitwise OR.
    ///
    /// # Example
    /// ```
    /// use tessera::Modifiers;
    /// let style = Modifiers::BOLD | Modifiers::ITALIC;
    /// ```
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Bold text
        const BOLD = 0b0000_0001;
        /// Dim/faint text
        const DIM = 0b0000_0010;
        /// Italic text
        const ITALIC = 0b0000_0100;
        /// Underlined text
        const UNDERLINE = 0b0000_1000;
        /// Blinking text
        const BLINK = 0b0001_0000;
        /// Reversed colors (fg/bg swapped)
        const REVERSED = 0b0010_0000;
        /// Hidden/invisible text
        const HIDDEN = 0b0100_0000;
        /// Strikethrough text
        const STRIKETHROUGH = 0b1000_0000;
    }
}

impl std::fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

bitflags! {
    /// Cell-level flags for special states.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        /// Grapheme lives in the grapheme pool; inline bytes hold its id
        const POOLED = 0b0000_0001;
        /// Content unknown (front buffer after resize); never equals anything
        const STALE = 0b0000_0010;
        /// This cell is the trailing column of a wide character
        const WIDE_CONTINUATION = 0b0000_0100;
    }
}

impl std::fmt::Debug for CellFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// Paint-time style: colors may be translucent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Style {
    /// Foreground color.
    pub fg: Rgba,
    /// Background color; transparent keeps what is underneath.
    pub bg: Rgba,
    /// Text modifiers.
    pub modifiers: Modifiers,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fg: Rgba::from(Rgb::DEFAULT_FG),
            bg: Rgba::TRANSPARENT,
            modifiers: Modifiers::empty(),
        }
    }
}

impl Style {
    /// Style with the given foreground and a transparent background.
    #[inline]
    pub fn fg(fg: impl Into<Rgba>) -> Self {
        Self {
            fg: fg.into(),
            ..Self::default()
        }
    }

    /// Set the background (builder pattern).
    #[inline]
    #[must_use]
    pub fn with_bg(mut self, bg: impl Into<Rgba>) -> Self {
        self.bg = bg.into();
        self
    }

    /// Set the modifiers (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// A single terminal cell.
///
/// Each cell contains:
/// - A grapheme (the character to display), inline or pooled
/// - Foreground and background colors
/// - Text modifiers (bold, italic, etc.)
/// - A generation stamp set every time the cell is painted
///
/// Equality compares content only. Two cells with the same generation were
/// produced by the same paint, so the diff uses the stamp as a fast path.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Cell {
    /// Inline grapheme storage (UTF-8 bytes).
    /// For pooled graphemes, this contains the packed `GraphemeId`.
    grapheme: [u8; 4],
    /// Actual byte length of the grapheme (0-4, or 0 if pooled).
    grapheme_len: u8,
    /// Display width of the grapheme (0=continuation, 1=normal, 2=wide CJK).
    display_width: u8,
    /// Foreground color.
    fg: Rgb,
    /// Background color.
    bg: Rgb,
    /// Text modifiers (bold, italic, etc.).
    modifiers: Modifiers,
    /// Cell flags (pooled, continuation, stale).
    flags: CellFlags,
    /// Padding to keep the generation 4-byte aligned.
    _padding: [u8; 2],
    /// Paint stamp.
    generation: u32,
}

// Compile-time assertion: Cell must stay at 20 bytes
const _: () = assert!(
    std::mem::size_of::<Cell>() == 20,
    "Cell must be exactly 20 bytes"
);

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Cell {
    /// An empty cell (space character with default colors).
    pub const EMPTY: Self = Self {
        grapheme: [b' ', 0, 0, 0],
        grapheme_len: 1,
        display_width: 1,
        fg: Rgb::DEFAULT_FG,
        bg: Rgb::DEFAULT_BG,
        modifiers: Modifiers::empty(),
        flags: CellFlags::empty(),
        _padding: [0, 0],
        generation: 0,
    };

    /// A cell whose on-screen content is unknown.
    pub const STALE: Self = Self {
        flags: CellFlags::STALE,
        ..Self::EMPTY
    };

    /// Create a new cell with a single ASCII character.
    ///
    /// # Panics
    /// Panics in debug builds if the character is not ASCII.
    #[inline]
    pub fn new(c: char) -> Self {
        debug_assert!(c.is_ascii(), "Use Cell::from_char for non-ASCII");
        Self {
            grapheme: [c as u8, 0, 0, 0],
            ..Self::EMPTY
        }
    }

    /// Create a cell from any character.
    #[inline]
    pub fn from_char(c: char) -> Self {
        let mut grapheme = [0u8; 4];
        let len = c.encode_utf8(&mut grapheme).len();
        let width = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0).min(2);

        Self {
            grapheme,
            grapheme_len: len as u8,
            display_width: width as u8,
            ..Self::EMPTY
        }
    }

    /// Create a cell from a grapheme string.
    ///
    /// If the grapheme fits in 4 bytes, it's stored inline.
    /// Otherwise, returns `None` and the caller should use the pool.
    #[inline]
    pub fn from_grapheme(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() > 4 || bytes.is_empty() {
            return None;
        }

        let mut grapheme = [0u8; 4];
        grapheme[..bytes.len()].copy_from_slice(bytes);

        Some(Self {
            grapheme,
            grapheme_len: bytes.len() as u8,
            display_width: grapheme_width(s),
            ..Self::EMPTY
        })
    }

    /// Create a cell referring to a pooled grapheme.
    #[inline]
    pub const fn pooled(id: GraphemeId, display_width: u8) -> Self {
        Self {
            grapheme: id.to_bits().to_le_bytes(),
            grapheme_len: 0,
            display_width,
            flags: CellFlags::POOLED,
            ..Self::EMPTY
        }
    }

    /// Create a wide-character continuation cell.
    ///
    /// This is placed after a wide CJK character that takes 2 columns and
    /// has no glyph of its own.
    #[inline]
    pub const fn wide_continuation() -> Self {
        Self {
            grapheme: [0, 0, 0, 0],
            grapheme_len: 0,
            display_width: 0,
            flags: CellFlags::WIDE_CONTINUATION,
            ..Self::EMPTY
        }
    }

    /// Get the grapheme as a string slice.
    ///
    /// Returns `None` for pooled cells (look them up in the pool) and for
    /// continuation cells.
    #[inline]
    pub fn grapheme(&self) -> Option<&str> {
        if self
            .flags
            .intersects(CellFlags::POOLED | CellFlags::WIDE_CONTINUATION)
        {
            return None;
        }
        std::str::from_utf8(&self.grapheme[..self.grapheme_len as usize]).ok()
    }

    /// Get the pool handle if this is a pooled cell.
    #[inline]
    pub const fn pool_id(&self) -> Option<GraphemeId> {
        if self.flags.contains(CellFlags::POOLED) {
            Some(GraphemeId::from_bits(u32::from_le_bytes(self.grapheme)))
        } else {
            None
        }
    }

    /// Check if this cell uses pool storage.
    #[inline]
    pub const fn is_pooled(&self) -> bool {
        self.flags.contains(CellFlags::POOLED)
    }

    /// Check if this is a wide-character continuation.
    #[inline]
    pub const fn is_wide_continuation(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CONTINUATION)
    }

    /// Whether the glyph is a plain space.
    #[inline]
    pub fn is_blank(&self) -> bool {
        !self.flags.intersects(CellFlags::POOLED | CellFlags::WIDE_CONTINUATION)
            && self.grapheme_len == 1
            && self.grapheme[0] == b' '
    }

    /// Get the display width (0, 1, or 2).
    #[inline]
    pub const fn display_width(&self) -> u8 {
        self.display_width
    }

    /// Get the foreground color.
    #[inline]
    pub const fn fg(&self) -> Rgb {
        self.fg
    }

    /// Get the background color.
    #[inline]
    pub const fn bg(&self) -> Rgb {
        self.bg
    }

    /// Get the modifiers.
    #[inline]
    pub const fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Get the flags.
    #[inline]
    pub const fn flags(&self) -> CellFlags {
        self.flags
    }

    /// Get the paint generation.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether fg, bg and modifiers match another cell.
    #[inline]
    pub fn same_style(&self, other: &Self) -> bool {
        self.fg == other.fg && self.bg == other.bg && self.modifiers == other.modifiers
    }

    /// Set the foreground color.
    #[inline]
    pub const fn set_fg(&mut self, fg: Rgb) -> &mut Self {
        self.fg = fg;
        self
    }

    /// Set the background color.
    #[inline]
    pub const fn set_bg(&mut self, bg: Rgb) -> &mut Self {
        self.bg = bg;
        self
    }

    /// Set the modifiers.
    #[inline]
    pub const fn set_modifiers(&mut self, modifiers: Modifiers) -> &mut Self {
        self.modifiers = modifiers;
        self
    }

    pub(crate) const fn set_generation(&mut self, generation: u32) {
        self.generation = generation;
    }

    /// Set the foreground color (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_fg(mut self, fg: Rgb) -> Self {
        self.fg = fg;
        self
    }

    /// Set the background color (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_bg(mut self, bg: Rgb) -> Self {
        self.bg = bg;
        self
    }

    /// Set the modifiers (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Reset the cell to empty (space with default colors).
    #[inline]
    pub const fn reset(&mut self) {
        *self = Self::EMPTY;
    }
}

/// Display width of a grapheme cluster, clamped to 1..=2 for printable text.
pub fn grapheme_width(grapheme: &str) -> u8 {
    let width = unicode_width::UnicodeWidthStr::width(grapheme);
    width.clamp(1, 2) as u8
}

impl PartialEq for Cell {
    /// Content equality; the generation stamp is ignored.
    ///
    /// Compared in order of most likely difference:
    /// 1. Grapheme bytes (most frequently changing)
    /// 2. Colors (next most common)
    /// 3. Modifiers and flags (rarely differ)
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.grapheme == other.grapheme
            && self.grapheme_len == other.grapheme_len
            && self.fg == other.fg
            && self.bg == other.bg
            && self.modifiers == other.modifiers
            && self.flags == other.flags
            && self.display_width == other.display_width
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.grapheme.hash(state);
        self.grapheme_len.hash(state);
        self.display_width.hash(state);
        self.fg.hash(state);
        self.bg.hash(state);
        self.modifiers.hash(state);
        self.flags.hash(state);
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let grapheme = if self.is_pooled() {
            "<pooled>"
        } else {
            self.grapheme().unwrap_or("")
        };
        f.debug_struct("Cell")
            .field("grapheme", &grapheme)
            .field("width", &self.display_width)
            .field("fg", &self.fg)
            .field("bg", &self.bg)
            .field("modifiers", &self.modifiers)
            .field("flags", &self.flags)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GraphemePool;

    #[test]
    fn test_cell_size() {
        assert_eq!(std::mem::size_of::<Cell>(), 20);
    }

    #[test]
    fn test_rgb_from_hex() {
        let rgb: Rgb = 0xFF8000.into();
        assert_eq!(rgb, Rgb::new(255, 128, 0));
    }

    #[test]
    fn test_rgba_over_is_premultiplied_blend() {
        let white = Rgba::WHITE;
        assert_eq!(white.over(Rgb::BLACK, 1.0), Rgb::WHITE);
        assert_eq!(white.over(Rgb::BLACK, 0.0), Rgb::BLACK);
        // 255 * 0.35 = 89.25
        assert_eq!(white.over(Rgb::BLACK, 0.35), Rgb::new(89, 89, 89));
        // color alpha multiplies with opacity
        let half = Rgba::new(255, 255, 255, 128);
        assert_eq!(half.over(Rgb::BLACK, 1.0), Rgb::new(128, 128, 128));
        assert_eq!(Rgba::TRANSPARENT.over(Rgb::WHITE, 1.0), Rgb::WHITE);
    }

    #[test]
    fn test_cell_new_ascii() {
        let cell = Cell::new('A');
        assert_eq!(cell.grapheme(), Some("A"));
        assert_eq!(cell.display_width(), 1);
    }

    #[test]
    fn test_cell_from_char_unicode() {
        let cell = Cell::from_char('日');
        assert_eq!(cell.grapheme(), Some("日"));
        assert_eq!(cell.display_width(), 2); // CJK is double-width
    }

    #[test]
    fn test_cell_from_grapheme_too_long() {
        // This emoji ZWJ sequence is > 4 bytes
        assert!(Cell::from_grapheme("👨‍👩‍👧").is_none());
    }

    #[test]
    fn test_cell_pooled() {
        let mut pool = GraphemePool::new();
        let id = pool.alloc("👨‍👩‍👧");
        let cell = Cell::pooled(id, 2);
        assert!(cell.is_pooled());
        assert_eq!(cell.pool_id(), Some(id));
        assert_eq!(cell.grapheme(), None);
        assert_eq!(pool.get(cell.pool_id().unwrap()), Some("👨‍👩‍👧"));
    }

    #[test]
    fn test_equality_ignores_generation() {
        let mut a = Cell::new('A').with_fg(Rgb::new(255, 0, 0));
        let b = Cell::new('A').with_fg(Rgb::new(255, 0, 0));
        a.set_generation(7);
        assert_eq!(a, b);
        assert_ne!(a, Cell::new('A'));
    }

    #[test]
    fn test_stale_never_equals_empty() {
        assert_ne!(Cell::STALE, Cell::EMPTY);
    }

    #[test]
    fn test_cell_builder_pattern() {
        let cell = Cell::new('X')
            .with_fg(Rgb::new(255, 0, 0))
            .with_bg(Rgb::new(0, 0, 255))
            .with_modifiers(Modifiers::BOLD | Modifiers::ITALIC);

        assert_eq!(cell.fg(), Rgb::new(255, 0, 0));
        assert_eq!(cell.bg(), Rgb::new(0, 0, 255));
        assert!(cell.modifiers().contains(Modifiers::BOLD | Modifiers::ITALIC));
    }

    #[test]
    fn test_blank_detection() {
        assert!(Cell::EMPTY.is_blank());
        assert!(!Cell::new('x').is_blank());
        assert!(!Cell::wide_continuation().is_blank());
    }
}
