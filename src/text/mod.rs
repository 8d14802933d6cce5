//! Styled text: the chunk rope, its highlight overlay and text painting.
//!
//! A [`TextBuffer`] stores text as styled chunks in an arena. Syntax
//! highlighters publish per-line spans into the buffer's
//! [`HighlightOverlay`] from any thread; [`paint_text`] merges chunk style,
//! highlights, inline marks and the selection into cells.

mod highlight;
mod markup;
mod rope;
mod style;
mod view;

pub use highlight::{rehighlight_dirty, HighlightOverlay, HighlightSpan, Highlighter, OverlaySnapshot};
pub use markup::parse_markup;
pub use rope::{
    Chunk, ChunkRef, LinePos, Mark, RopeStats, Selection, StyledGrapheme, TextBuffer, Version,
};
pub use style::StyleOverride;
pub use view::{measure_text, paint_text, TextViewport, WrapMode};

use crate::buffer::grapheme_width;
use unicode_segmentation::UnicodeSegmentation;

/// Columns occupied by one grapheme when it starts at column `col`.
///
/// Tabs advance to the next multiple of `tab_width`; other control
/// characters take no space.
#[inline]
pub(crate) fn grapheme_columns(grapheme: &str, col: usize, tab_width: u8) -> usize {
    if grapheme == "\t" {
        let tab = usize::from(tab_width.max(1));
        tab - col % tab
    } else if grapheme.starts_with(char::is_control) {
        0
    } else {
        usize::from(grapheme_width(grapheme))
    }
}

/// Column reached after drawing `text` from column `col`.
pub(crate) fn advance_columns(col: usize, text: &str, tab_width: u8) -> usize {
    text.graphemes(true)
        .fold(col, |col, g| col + grapheme_columns(g, col, tab_width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_columns() {
        assert_eq!(advance_columns(0, "abc", 4), 3);
        assert_eq!(advance_columns(0, "日本", 4), 4);
        assert_eq!(advance_columns(1, "\t", 4), 4);
        assert_eq!(advance_columns(0, "a\tb", 8), 9);
        assert_eq!(advance_columns(0, "e\u{301}", 4), 1);
    }
}
