//! Buffer module: The double-buffered cell grid and its diff renderer.
//!
//! This module contains:
//! - [`Cell`]: The atomic unit of display, optimized for cache efficiency
//! - [`CellBuffer`]: Front/back grids with z-ordered alpha compositing
//! - [`Rgb`] / [`Rgba`]: Colors, opaque and translucent
//! - [`Modifiers`]: Text style bitflags
//! - [`diff`]: Run-based diffing that produces minimal ANSI output

mod cell;
#[allow(clippy::module_inception)]
mod buffer;
pub mod diff;

pub use buffer::{BorderStyle, CellBuffer, FrameSnapshot, Layer, RowSet, SnapshotCell};
pub use cell::{grapheme_width, Cell, CellFlags, Modifiers, Rgb, Rgba, Style};
pub use diff::{DiffResult, DiffState, Run};
