//! Renderable: The measure/paint/hit-test capability behind each node kind.

use crate::buffer::{BorderStyle, CellBuffer, Layer, Rgba, Style};
use crate::layout::{Bounds, Rect};
use crate::text::{measure_text, paint_text, TextBuffer, TextViewport, WrapMode};

/// Where a node paints during one walk of the tree.
#[derive(Debug)]
pub struct PaintContext<'a> {
    /// Target cell grid.
    pub cells: &'a mut CellBuffer,
    /// The node's laid-out bounds.
    pub bounds: Bounds,
    /// Effective z, opacity and clip for this node.
    pub layer: Layer,
}

/// A thing the scene can lay out, paint and hit-test.
///
/// Every node kind implements this; layout providers and the paint walk
/// only talk to nodes through it.
pub trait Renderable {
    /// Preferred size given the space available.
    fn measure(&self, available_width: u16, available_height: u16) -> (u16, u16);

    /// Paint into the context's cells. Must stay inside `ctx.layer.clip`.
    fn paint(&self, ctx: &mut PaintContext<'_>);

    /// Whether a point inside the node's cells belongs to the node.
    fn hit_test(&self, bounds: Bounds, x: i32, y: i32) -> bool {
        bounds.contains(x, y)
    }

    /// Cells between the node's edge and its children's origin.
    fn content_inset(&self) -> u16 {
        0
    }

    /// How far the children are scrolled, in columns and rows.
    fn scroll_offset(&self) -> (u16, u16) {
        (0, 0)
    }
}

fn fill_background(ctx: &mut PaintContext<'_>, background: Option<Rgba>) {
    if let Some(bg) = background {
        ctx.cells
            .fill_rect(ctx.bounds, Style::default().with_bg(bg), ctx.layer);
    }
}

/// A rectangle with an optional background, border and title.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxNode {
    /// Fill colour; `None` leaves whatever is underneath.
    pub background: Option<Rgba>,
    /// Border glyph set; `None` draws no border.
    pub border: Option<BorderStyle>,
    /// Border and title colour.
    pub border_color: Rgba,
    /// Title drawn into the top border.
    pub title: Option<String>,
}

impl Default for BoxNode {
    fn default() -> Self {
        Self {
            background: None,
            border: None,
            border_color: Rgba::WHITE,
            title: None,
        }
    }
}

impl Renderable for BoxNode {
    fn measure(&self, available_width: u16, available_height: u16) -> (u16, u16) {
        (available_width, available_height)
    }

    fn paint(&self, ctx: &mut PaintContext<'_>) {
        fill_background(ctx, self.background);
        if let Some(border) = self.border {
            let style = Style::fg(self.border_color);
            ctx.cells
                .draw_box(ctx.bounds, border, style, self.title.as_deref(), ctx.layer);
        }
    }

    fn content_inset(&self) -> u16 {
        u16::from(self.border.is_some())
    }
}

/// A text buffer painted inside the node's bounds.
#[derive(Debug)]
pub struct TextNode {
    /// The styled text.
    pub buffer: TextBuffer,
    /// Line wrapping.
    pub wrap: WrapMode,
    /// Fill colour behind the text.
    pub background: Option<Rgba>,
}

impl TextNode {
    /// Empty text node.
    pub fn new(tab_width: u8) -> Self {
        Self {
            buffer: TextBuffer::new().with_tab_width(tab_width),
            wrap: WrapMode::None,
            background: None,
        }
    }
}

impl Renderable for TextNode {
    fn measure(&self, available_width: u16, _available_height: u16) -> (u16, u16) {
        measure_text(&self.buffer, self.wrap, Some(available_width))
    }

    fn paint(&self, ctx: &mut PaintContext<'_>) {
        fill_background(ctx, self.background);
        let view = TextViewport {
            wrap: self.wrap,
            ..TextViewport::default()
        };
        paint_text(&self.buffer, ctx.cells, ctx.bounds, view, ctx.layer);
    }
}

/// A viewport over children that may be larger than it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollBoxNode {
    /// Fill colour.
    pub background: Option<Rgba>,
    /// Columns scrolled.
    pub scroll_x: u16,
    /// Rows scrolled.
    pub scroll_y: u16,
    /// Extent of the children as of the last layout.
    pub content: (u16, u16),
    /// Size of the viewport as of the last layout.
    pub viewport: (u16, u16),
}

impl ScrollBoxNode {
    /// Largest scroll offsets that still show content.
    pub fn max_scroll(&self) -> (u16, u16) {
        (
            self.content.0.saturating_sub(self.viewport.0),
            self.content.1.saturating_sub(self.viewport.1),
        )
    }

    /// Record a new layout and pull the offsets back into range.
    pub fn update_extent(&mut self, content: (u16, u16), viewport: (u16, u16)) {
        self.content = content;
        self.viewport = viewport;
        let (max_x, max_y) = self.max_scroll();
        self.scroll_x = self.scroll_x.min(max_x);
        self.scroll_y = self.scroll_y.min(max_y);
    }

    /// Scroll by a signed row delta; returns whether the offset moved.
    pub fn scroll_rows(&mut self, delta: i32) -> bool {
        let (_, max_y) = self.max_scroll();
        let next = (i32::from(self.scroll_y) + delta).clamp(0, i32::from(max_y)) as u16;
        let moved = next != self.scroll_y;
        self.scroll_y = next;
        moved
    }
}

impl Renderable for ScrollBoxNode {
    fn measure(&self, available_width: u16, available_height: u16) -> (u16, u16) {
        (available_width, available_height)
    }

    fn paint(&self, ctx: &mut PaintContext<'_>) {
        fill_background(ctx, self.background);
    }

    fn scroll_offset(&self) -> (u16, u16) {
        (self.scroll_x, self.scroll_y)
    }
}

/// An offscreen cell grid the application paints itself, composited into
/// the frame at the node's bounds.
#[derive(Debug)]
pub struct FrameBufferNode {
    /// The offscreen grid; only its back cells are read.
    pub cells: CellBuffer,
    /// Skip cells nothing was painted into so lower layers show through.
    pub respect_alpha: bool,
    /// First column of `cells` shown at the node's left edge.
    pub source_x: u16,
    /// First row of `cells` shown at the node's top edge.
    pub source_y: u16,
}

impl FrameBufferNode {
    /// Wrap an existing grid.
    pub const fn new(cells: CellBuffer) -> Self {
        Self {
            cells,
            respect_alpha: false,
            source_x: 0,
            source_y: 0,
        }
    }
}

impl Renderable for FrameBufferNode {
    fn measure(&self, available_width: u16, available_height: u16) -> (u16, u16) {
        (
            self.cells.width().saturating_sub(self.source_x).min(available_width),
            self.cells.height().saturating_sub(self.source_y).min(available_height),
        )
    }

    fn paint(&self, ctx: &mut PaintContext<'_>) {
        let region = Rect::new(
            self.source_x,
            self.source_y,
            ctx.bounds.width,
            ctx.bounds.height,
        );
        ctx.cells.draw_buffer(
            ctx.bounds.x,
            ctx.bounds.y,
            &self.cells,
            region,
            self.respect_alpha,
            ctx.layer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Rgb;

    #[test]
    fn test_box_paints_border_and_background() {
        let mut cells = CellBuffer::new(6, 3).unwrap();
        let node = BoxNode {
            background: Some(Rgb::new(0, 0, 255).into()),
            border: Some(BorderStyle::Single),
            ..BoxNode::default()
        };
        let mut ctx = PaintContext {
            cells: &mut cells,
            bounds: Bounds::new(0, 0, 6, 3),
            layer: Layer::opaque(Rect::from_size(6, 3)),
        };
        node.paint(&mut ctx);
        let snap = cells.snapshot();
        assert_eq!(snap.row_text(0), "┌────┐");
        assert_eq!(snap.get(2, 1).unwrap().bg, Rgb::new(0, 0, 255));
        assert_eq!(node.content_inset(), 1);
    }

    #[test]
    fn test_text_measures_content() {
        let mut node = TextNode::new(4);
        node.buffer.set_text("hello\nhi");
        assert_eq!(node.measure(80, 24), (5, 2));
        node.wrap = WrapMode::Char;
        assert_eq!(node.measure(3, 24), (3, 3));
    }

    #[test]
    fn test_framebuffer_paints_its_region() {
        let mut offscreen = CellBuffer::new(8, 2).unwrap();
        let area = offscreen.area();
        offscreen.draw_text(0, 0, "0123456", Style::default(), Layer::opaque(area));
        offscreen.draw_text(0, 1, "abcdefg", Style::default(), Layer::opaque(area));
        let mut node = FrameBufferNode::new(offscreen);
        node.source_x = 2;
        node.source_y = 1;
        assert_eq!(node.measure(80, 24), (6, 1));
        assert_eq!(node.measure(3, 24), (3, 1));

        let mut cells = CellBuffer::new(6, 2).unwrap();
        cells.draw_text(0, 0, "######", Style::default(), Layer::opaque(cells.area()));
        let mut ctx = PaintContext {
            cells: &mut cells,
            bounds: Bounds::new(1, 0, 3, 1),
            layer: Layer::opaque(Rect::from_size(6, 2)),
        };
        node.paint(&mut ctx);
        assert_eq!(cells.snapshot().row_text(0), "#cde##");
    }

    #[test]
    fn test_scroll_clamps_to_extent() {
        let mut node = ScrollBoxNode {
            scroll_y: 50,
            ..ScrollBoxNode::default()
        };
        node.update_extent((10, 30), (10, 10));
        assert_eq!(node.scroll_y, 20);
        assert!(node.scroll_rows(-5));
        assert_eq!(node.scroll_y, 15);
        assert!(node.scroll_rows(-100));
        assert_eq!(node.scroll_y, 0);
    }
}
