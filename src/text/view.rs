//! Painting a [`TextBuffer`] into a [`CellBuffer`].

use super::rope::TextBuffer;
use super::grapheme_columns;
use crate::buffer::{CellBuffer, Layer};
use crate::layout::Bounds;
use unicode_segmentation::UnicodeSegmentation;

/// How lines longer than the viewport are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Lines run past the right edge and are clipped.
    #[default]
    None,
    /// Lines break at the grapheme that would cross the right edge.
    Char,
}

/// Scroll position and wrapping for one paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextViewport {
    /// Columns scrolled off the left edge (ignored when wrapping).
    pub scroll_x: usize,
    /// Visual rows scrolled off the top edge.
    pub scroll_y: usize,
    /// Wrapping mode.
    pub wrap: WrapMode,
}

/// Visual rows needed by one line at `width` columns.
fn wrapped_rows(text: &str, width: usize, tab_width: u8) -> usize {
    if width == 0 {
        return 1;
    }
    let mut rows = 1;
    let mut col = 0;
    for grapheme in text.graphemes(true) {
        let w = grapheme_columns(grapheme, col, tab_width);
        if col > 0 && col + w > width {
            rows += 1;
            col = 0;
        }
        col += w;
    }
    rows
}

/// Size of the text in columns and rows.
///
/// With [`WrapMode::Char`] and a width limit the row count includes
/// wrapped rows and the width never exceeds the limit.
pub fn measure_text(buffer: &TextBuffer, wrap: WrapMode, max_width: Option<u16>) -> (u16, u16) {
    let clamp = |v: usize| v.min(usize::from(u16::MAX)) as u16;
    match (wrap, max_width) {
        (WrapMode::Char, Some(limit)) => {
            let limit = usize::from(limit);
            let rows: usize = (0..buffer.line_count())
                .map(|n| {
                    let text = buffer.line_text(n).unwrap_or_default();
                    wrapped_rows(&text, limit, buffer.tab_width())
                })
                .sum();
            (clamp(buffer.max_line_width().min(limit)), clamp(rows))
        }
        _ => {
            let width = buffer.max_line_width();
            let width = max_width.map_or(width, |m| width.min(usize::from(m)));
            (clamp(width), clamp(buffer.line_count()))
        }
    }
}

/// Paint the visible part of `buffer` into `bounds`.
///
/// Returns the number of visual rows the whole text occupies, which the
/// caller uses as the scroll extent.
pub fn paint_text(
    buffer: &TextBuffer,
    cells: &mut CellBuffer,
    bounds: Bounds,
    view: TextViewport,
    layer: Layer,
) -> usize {
    let width = usize::from(bounds.width);
    let height = usize::from(bounds.height);
    let tab_width = buffer.tab_width();
    let clip = Layer {
        clip: bounds.clip_to(&layer.clip),
        ..layer
    };

    if view.wrap == WrapMode::None {
        let first = view.scroll_y;
        let last = (first + height).min(buffer.line_count());
        for (row, line) in (first..last).enumerate() {
            let y = bounds.y + row as i32;
            let mut col = 0;
            for g in buffer.styled_line(line) {
                let w = grapheme_columns(g.text, col, tab_width);
                if col + w > view.scroll_x && col < view.scroll_x + width {
                    let x = bounds.x + col as i32 - view.scroll_x as i32;
                    paint_one(cells, x, y, g.text, w, g.style, clip);
                }
                col += w;
                if col >= view.scroll_x + width {
                    break;
                }
            }
        }
        return buffer.line_count();
    }

    let mut row = 0usize;
    for line in 0..buffer.line_count() {
        let mut col = 0;
        for g in buffer.styled_line(line) {
            let w = grapheme_columns(g.text, col, tab_width);
            if col > 0 && col + w > width {
                row += 1;
                col = 0;
            }
            if row >= view.scroll_y && row < view.scroll_y + height {
                let y = bounds.y + (row - view.scroll_y) as i32;
                paint_one(cells, bounds.x + col as i32, y, g.text, w, g.style, clip);
            }
            col += w;
        }
        row += 1;
    }
    row
}

/// Paint one grapheme occupying `w` columns; tabs become spaces.
fn paint_one(
    cells: &mut CellBuffer,
    x: i32,
    y: i32,
    grapheme: &str,
    w: usize,
    style: crate::buffer::Style,
    layer: Layer,
) {
    if grapheme == "\t" {
        for i in 0..w {
            cells.paint_grapheme(x + i as i32, y, " ", style, layer);
        }
    } else if w > 0 {
        cells.paint_grapheme(x, y, grapheme, style, layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Rgb, Style};
    use crate::layout::Rect;
    use crate::text::Chunk;

    fn canvas() -> CellBuffer {
        CellBuffer::new(10, 4).unwrap()
    }

    #[test]
    fn test_paint_unwrapped_clips() {
        let buffer = TextBuffer::from_text("hello world\nsecond");
        let mut cells = canvas();
        let layer = Layer::opaque(cells.area());
        let rows = paint_text(&buffer, &mut cells, Bounds::new(0, 0, 5, 2), TextViewport::default(), layer);
        assert_eq!(rows, 2);
        let snapshot = cells.snapshot();
        assert_eq!(snapshot.row_text(0), "hello");
        assert_eq!(snapshot.row_text(1), "secon");
    }

    #[test]
    fn test_paint_scrolled() {
        let buffer = TextBuffer::from_text("a\nb\nc\nd");
        let mut cells = canvas();
        let layer = Layer::opaque(cells.area());
        let view = TextViewport {
            scroll_y: 2,
            ..TextViewport::default()
        };
        paint_text(&buffer, &mut cells, Bounds::new(0, 0, 10, 4), view, layer);
        let snapshot = cells.snapshot();
        assert_eq!(snapshot.row_text(0), "c");
        assert_eq!(snapshot.row_text(1), "d");
        assert_eq!(snapshot.row_text(2), "");
    }

    #[test]
    fn test_paint_wrapped() {
        let buffer = TextBuffer::from_text("abcdefg\nxy");
        let mut cells = canvas();
        let layer = Layer::opaque(cells.area());
        let view = TextViewport {
            wrap: WrapMode::Char,
            ..TextViewport::default()
        };
        let rows = paint_text(&buffer, &mut cells, Bounds::new(1, 0, 3, 4), view, layer);
        assert_eq!(rows, 4);
        let snapshot = cells.snapshot();
        assert_eq!(snapshot.row_text(0), " abc");
        assert_eq!(snapshot.row_text(1), " def");
        assert_eq!(snapshot.row_text(2), " g");
        assert_eq!(snapshot.row_text(3), " xy");
        assert_eq!(measure_text(&buffer, WrapMode::Char, Some(3)), (3, 4));
        assert_eq!(measure_text(&buffer, WrapMode::None, None), (7, 2));
    }

    #[test]
    fn test_tabs_expand_to_spaces() {
        let buffer = TextBuffer::from_text("\tx").with_tab_width(4);
        let mut cells = canvas();
        let layer = Layer::opaque(cells.area());
        paint_text(&buffer, &mut cells, Bounds::new(0, 0, 10, 1), TextViewport::default(), layer);
        assert_eq!(cells.snapshot().row_text(0), "    x");
    }

    #[test]
    fn test_paint_uses_chunk_style() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::styled("ab", Style::fg(Rgb::new(255, 0, 0))));
        let mut cells = canvas();
        paint_text(
            &buffer,
            &mut cells,
            Bounds::new(0, 0, 10, 1),
            TextViewport::default(),
            Layer::opaque(Rect::from_size(10, 4)),
        );
        assert_eq!(cells.get(1, 0).unwrap().fg(), Rgb::new(255, 0, 0));
    }
}
