//! Terminal protocol layer.
//!
//! Output is encoded into an [`OutputBuffer`] and written once per frame.
//! Input bytes come from an [`InputReader`] thread and are decoded by an
//! [`InputDecoder`]. [`PaletteDetector`] runs the timed palette exchange
//! and [`TerminalSession`] owns raw mode and the screen modes.
//! [`Capabilities`] collects what the terminal answered to the feature
//! queries.

mod capabilities;
mod input;
mod output;
mod palette;
mod reader;
mod session;

pub use input::{
    ColorSlot, InputDecoder, InputEvent, KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseKind,
};
pub use capabilities::Capabilities;
pub use output::{CursorStyle, KeyboardFlags, OutputBuffer, QUERIED_MODES};
pub use palette::{
    ansi_to_rgb, parse_color_spec, parse_osc_color, scale_channel, ByteSource, OscColor, Palette,
    PaletteDetector, PaletteReport, PaletteSupport,
};
pub use reader::InputReader;
pub use session::{SessionOptions, TerminalSession};
