//! `CellBuffer`: Front/back cell grids with z-ordered alpha compositing.
//!
//! Both grids are contiguous, row-major `Vec<Cell>`s. Painting only ever
//! touches the back grid; [`CellBuffer::flush`] diffs back against front,
//! writes the difference and then brings front up to date for the rows it
//! visited.
//!
//! ```text
//!   paint_*() ──► back ──┐
//!                        ├─► flush() ──► OutputBuffer
//!            front ──────┘      │
//!              ▲                │
//!              └── copy touched rows
//! ```
//!
//! Every cell also carries a z value (the highest layer painted into it this
//! frame) and a hit-grid entry used for mouse routing.

use super::cell::{grapheme_width, Cell, Modifiers, Rgb, Style};
use super::diff::{self, DiffResult, DiffState};
use crate::error::{Error, Result};
use crate::layout::{Bounds, Rect};
use crate::memory::{GraphemeId, GraphemePool, PoolStats};
use crate::terminal::OutputBuffer;
use unicode_segmentation::UnicodeSegmentation;

/// z value of a cell nothing has been painted into this frame.
const UNPAINTED: i32 = i32::MIN;

/// Set of row indices, one bit per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    words: Vec<u64>,
    len: usize,
}

impl RowSet {
    /// An empty set able to hold rows `0..len`.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Add a row. Out-of-range rows are ignored.
    #[inline]
    pub fn insert(&mut self, row: usize) {
        if row < self.len {
            self.words[row / 64] |= 1 << (row % 64);
        }
    }

    /// Add every row.
    pub fn insert_all(&mut self) {
        for row in 0..self.len {
            self.insert(row);
        }
    }

    /// Whether a row is in the set.
    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        row < self.len && self.words[row / 64] & (1 << (row % 64)) != 0
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Whether no row is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of rows set.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set rows in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|row| self.contains(*row))
    }
}

/// Where and how a paint call lands: z layer, opacity and clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    /// Stacking order; higher wins, ties go to the later paint.
    pub z: i32,
    /// Opacity in `[0, 1]`, multiplied with each color's own alpha.
    pub opacity: f32,
    /// Cells outside this rectangle are dropped.
    pub clip: Rect,
}

impl Layer {
    /// Create a layer.
    #[inline]
    pub const fn new(z: i32, opacity: f32, clip: Rect) -> Self {
        Self { z, opacity, clip }
    }

    /// Opaque layer at z 0 clipped to the given area.
    #[inline]
    pub const fn opaque(clip: Rect) -> Self {
        Self::new(0, 1.0, clip)
    }
}

/// Border glyph sets for [`CellBuffer::draw_box`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    /// `┌─┐`
    #[default]
    Single,
    /// `╔═╗`
    Double,
    /// `╭─╮`
    Rounded,
    /// `┏━┓`
    Heavy,
}

impl BorderStyle {
    /// `[top-left, top-right, bottom-left, bottom-right, horizontal, vertical]`
    pub const fn glyphs(self) -> [&'static str; 6] {
        match self {
            Self::Single => ["┌", "┐", "└", "┘", "─", "│"],
            Self::Double => ["╔", "╗", "╚", "╝", "═", "║"],
            Self::Rounded => ["╭", "╮", "╰", "╯", "─", "│"],
            Self::Heavy => ["┏", "┓", "┗", "┛", "━", "┃"],
        }
    }
}

/// One cell of a [`FrameSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCell {
    /// Grapheme text; empty for the trailing column of a wide glyph.
    pub grapheme: String,
    /// Foreground color.
    pub fg: Rgb,
    /// Background color.
    pub bg: Rgb,
    /// Text modifiers.
    pub modifiers: Modifiers,
}

/// An owned, styled copy of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    width: u16,
    height: u16,
    cells: Vec<SnapshotCell>,
}

impl FrameSnapshot {
    /// Width in columns.
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Height in rows.
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Cell at (x, y).
    pub fn get(&self, x: u16, y: u16) -> Option<&SnapshotCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells
            .get(usize::from(y) * usize::from(self.width) + usize::from(x))
    }

    /// Text of one row with trailing whitespace removed.
    pub fn row_text(&self, y: u16) -> String {
        if y >= self.height {
            return String::new();
        }
        let start = usize::from(y) * usize::from(self.width);
        let row: String = self.cells[start..start + usize::from(self.width)]
            .iter()
            .map(|c| c.grapheme.as_str())
            .collect();
        row.trim_end().to_owned()
    }

    /// All rows joined by `\n`, trailing whitespace trimmed per row.
    pub fn to_plain_text(&self) -> String {
        (0..self.height)
            .map(|y| self.row_text(y))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Double-buffered grid of cells with compositing, a z plane and a hit grid.
pub struct CellBuffer {
    width: u16,
    height: u16,
    /// Last flushed state.
    front: Vec<Cell>,
    /// State being painted.
    back: Vec<Cell>,
    /// Highest z painted into each back cell this frame.
    z: Vec<i32>,
    /// Rows of `back` changed since the last flush.
    touched: RowSet,
    /// Hit target per cell (0 = none) and the z it was registered at.
    hits: Vec<u32>,
    hit_z: Vec<i32>,
    /// Storage for graphemes longer than four bytes, for both grids.
    pool: GraphemePool,
    generation: u32,
    /// Screen content is unknown; next flush clears it first.
    full_repaint: bool,
}

impl CellBuffer {
    /// Create a buffer with the given dimensions.
    ///
    /// The front grid starts out blank, matching a freshly cleared screen.
    pub fn new(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            tracing::error!(width, height, "refusing to create zero-sized cell buffer");
            return Err(Error::InvalidDimensions {
                width,
                height,
                kept_width: 0,
                kept_height: 0,
            });
        }
        Ok(Self::allocate(width, height))
    }

    /// Allocate a blank buffer; zero dimensions are raised to one.
    pub(crate) fn allocate(width: u16, height: u16) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let size = usize::from(width) * usize::from(height);
        Self {
            width,
            height,
            front: vec![Cell::EMPTY; size],
            back: vec![Cell::EMPTY; size],
            z: vec![UNPAINTED; size],
            touched: RowSet::new(usize::from(height)),
            hits: vec![0; size],
            hit_z: vec![UNPAINTED; size],
            pool: GraphemePool::new(),
            generation: 0,
            full_repaint: false,
        }
    }

    /// Get the buffer width.
    #[inline]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Get the buffer height.
    #[inline]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// The whole buffer as a rectangle.
    #[inline]
    pub const fn area(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Convert (x, y) coordinates to a linear index.
    ///
    /// Returns `None` if coordinates are out of bounds.
    #[inline]
    pub fn index_of(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(usize::from(y) * usize::from(self.width) + usize::from(x))
        } else {
            None
        }
    }

    /// Back-grid cell at (x, y).
    #[inline]
    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        self.index_of(x, y).map(|i| &self.back[i])
    }

    /// Grapheme of the back-grid cell at (x, y), resolving pooled storage.
    ///
    /// Returns `None` out of bounds and for continuation cells.
    pub fn get_grapheme(&self, x: u16, y: u16) -> Option<&str> {
        let cell = self.get(x, y)?;
        self.grapheme_of(cell)
    }

    pub(crate) fn grapheme_of<'a>(&'a self, cell: &'a Cell) -> Option<&'a str> {
        match cell.pool_id() {
            Some(id) => self.pool.get(id),
            None => cell.grapheme(),
        }
    }

    /// Back grid.
    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.back
    }

    /// Front grid (last flushed state).
    #[inline]
    pub fn front_cells(&self) -> &[Cell] {
        &self.front
    }

    /// Rows changed since the last flush.
    #[inline]
    pub const fn touched_rows(&self) -> &RowSet {
        &self.touched
    }

    /// Counters of the grapheme pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Whether the next flush starts by clearing the screen.
    #[inline]
    pub const fn needs_full_repaint(&self) -> bool {
        self.full_repaint
    }

    /// Start a new frame: blank the back grid, reset z plane and hit grid.
    ///
    /// Every row is touched; rows whose content ends up unchanged still cost
    /// nothing on the wire.
    pub fn clear(&mut self, bg: Rgb) {
        let blank = Cell::EMPTY.with_bg(bg);
        for idx in 0..self.back.len() {
            self.release(idx);
            self.back[idx] = blank;
        }
        self.z.fill(UNPAINTED);
        self.hits.fill(0);
        self.hit_z.fill(UNPAINTED);
        self.touched.insert_all();
    }

    /// Forget what the terminal shows; the next flush repaints everything.
    pub fn invalidate(&mut self) {
        for idx in 0..self.front.len() {
            if let Some(id) = self.front[idx].pool_id() {
                release_slot(&mut self.pool, id);
            }
            self.front[idx] = Cell::STALE;
        }
        self.touched.insert_all();
        self.full_repaint = true;
    }

    /// Reallocate both grids at a new size.
    ///
    /// Content is discarded, the screen is considered unknown and every row
    /// is touched. Zero-sized requests are rejected and the buffer keeps its
    /// dimensions.
    pub fn resize(&mut self, width: u16, height: u16) -> Result<()> {
        if width == 0 || height == 0 {
            tracing::error!(
                width,
                height,
                kept_width = self.width,
                kept_height = self.height,
                "rejected degenerate resize"
            );
            return Err(Error::InvalidDimensions {
                width,
                height,
                kept_width: self.width,
                kept_height: self.height,
            });
        }
        for cell in self.front.iter().chain(self.back.iter()) {
            if let Some(id) = cell.pool_id() {
                release_slot(&mut self.pool, id);
            }
        }
        let size = usize::from(width) * usize::from(height);
        self.width = width;
        self.height = height;
        self.front = vec![Cell::STALE; size];
        self.back = vec![Cell::EMPTY; size];
        self.z = vec![UNPAINTED; size];
        self.hits = vec![0; size];
        self.hit_z = vec![UNPAINTED; size];
        self.touched = RowSet::new(usize::from(height));
        self.touched.insert_all();
        self.full_repaint = true;
        tracing::debug!(width, height, "cell buffer resized");
        Ok(())
    }

    /// Composite a cell at (x, y).
    ///
    /// The cell's colors are treated as opaque and faded by `layer.opacity`.
    /// Pooled cells must come from this buffer's pool. Continuation cells
    /// are ignored; painting the wide glyph writes them.
    pub fn paint_cell(&mut self, x: i32, y: i32, cell: Cell, layer: Layer) {
        if cell.is_wide_continuation() {
            return;
        }
        let style = Style {
            fg: cell.fg().into(),
            bg: cell.bg().into(),
            modifiers: cell.modifiers(),
        };
        let grapheme = match cell.pool_id() {
            Some(id) => self.pool.get(id).unwrap_or("\u{FFFD}").to_owned(),
            None => cell.grapheme().unwrap_or(" ").to_owned(),
        };
        self.paint_grapheme(x, y, &grapheme, style, layer);
    }

    /// Composite one grapheme cluster at (x, y) and return its width.
    ///
    /// The width is returned even when the cell is clipped so callers can
    /// keep advancing. A wide glyph whose trailing column is unavailable is
    /// painted as a space.
    pub fn paint_grapheme(
        &mut self,
        x: i32,
        y: i32,
        grapheme: &str,
        style: Style,
        layer: Layer,
    ) -> u8 {
        let grapheme = if grapheme.is_empty() || grapheme.starts_with(char::is_control) {
            " "
        } else {
            grapheme
        };
        let width = grapheme_width(grapheme);
        let Some(idx) = self.visible(x, y, layer) else {
            return width;
        };
        if width == 2 {
            if self.visible(x + 1, y, layer).is_none() {
                self.composite(idx, " ", 1, style, layer);
                return width;
            }
            self.composite(idx, grapheme, 2, style, layer);
            self.composite_continuation(idx + 1, style, layer);
        } else {
            self.composite(idx, grapheme, width, style, layer);
        }
        width
    }

    /// Composite the `region` of another buffer's back grid with its
    /// top-left cell at (x, y).
    ///
    /// With `skip_unpainted`, source cells nothing was painted into since its
    /// last [`clear`](Self::clear) are left out so the destination shows
    /// through them.
    pub fn draw_buffer(
        &mut self,
        x: i32,
        y: i32,
        source: &Self,
        region: Rect,
        skip_unpainted: bool,
        layer: Layer,
    ) {
        let region = region.intersection(&source.area());
        for sy in region.rows() {
            let dy = y + i32::from(sy - region.y);
            for sx in region.x..region.right() {
                let Some(idx) = source.index_of(sx, sy) else {
                    continue;
                };
                let cell = &source.back[idx];
                if cell.is_wide_continuation() || (skip_unpainted && source.z[idx] == UNPAINTED) {
                    continue;
                }
                let style = Style {
                    fg: cell.fg().into(),
                    bg: cell.bg().into(),
                    modifiers: cell.modifiers(),
                };
                let grapheme = source.grapheme_of(cell).unwrap_or(" ");
                self.paint_grapheme(x + i32::from(sx - region.x), dy, grapheme, style, layer);
            }
        }
    }

    /// Paint a rectangle of blanks in `style`.
    ///
    /// With a translucent background the glyphs underneath survive and are
    /// tinted.
    pub fn fill_rect(&mut self, bounds: Bounds, style: Style, layer: Layer) {
        let visible = bounds.clip_to(&layer.clip.intersection(&self.area()));
        for y in visible.rows() {
            for x in visible.x..visible.right() {
                self.paint_grapheme(i32::from(x), i32::from(y), " ", style, layer);
            }
        }
    }

    /// Paint a single line of text starting at (x, y); returns columns used.
    ///
    /// Stops at the first newline. Other control characters are skipped.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, style: Style, layer: Layer) -> u16 {
        let right = i32::from(layer.clip.right());
        let mut col = x;
        for grapheme in text.graphemes(true) {
            if grapheme.starts_with(['\n', '\r']) {
                break;
            }
            if grapheme.starts_with(char::is_control) {
                continue;
            }
            if col >= right {
                col += i32::from(grapheme_width(grapheme));
                continue;
            }
            col += i32::from(self.paint_grapheme(col, y, grapheme, style, layer));
        }
        (col - x).clamp(0, i32::from(u16::MAX)) as u16
    }

    /// Draw a border around `bounds`, with an optional title in the top edge.
    pub fn draw_box(
        &mut self,
        bounds: Bounds,
        border: BorderStyle,
        style: Style,
        title: Option<&str>,
        layer: Layer,
    ) {
        if bounds.width < 2 || bounds.height < 2 {
            return;
        }
        let [tl, tr, bl, br, h, v] = border.glyphs();
        let (left, top) = (bounds.x, bounds.y);
        let (right, bottom) = (bounds.right() - 1, bounds.bottom() - 1);

        for x in left + 1..right {
            self.paint_grapheme(x, top, h, style, layer);
            self.paint_grapheme(x, bottom, h, style, layer);
        }
        for y in top + 1..bottom {
            self.paint_grapheme(left, y, v, style, layer);
            self.paint_grapheme(right, y, v, style, layer);
        }
        self.paint_grapheme(left, top, tl, style, layer);
        self.paint_grapheme(right, top, tr, style, layer);
        self.paint_grapheme(left, bottom, bl, style, layer);
        self.paint_grapheme(right, bottom, br, style, layer);

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            if bounds.width > 4 {
                let title_clip = Bounds::new(left + 2, top, bounds.width - 4, 1).clip_to(&layer.clip);
                let title_layer = Layer {
                    clip: title_clip,
                    ..layer
                };
                self.draw_text(left + 2, top, title, style, title_layer);
            }
        }
    }

    /// Register `id` as the mouse target for the visible part of `bounds`.
    ///
    /// Higher z wins; equal z goes to the later registration.
    pub fn register_hit(&mut self, bounds: Bounds, id: u32, z: i32, clip: Rect) {
        let visible = bounds.clip_to(&clip.intersection(&self.area()));
        for y in visible.rows() {
            for x in visible.x..visible.right() {
                if let Some(idx) = self.index_of(x, y) {
                    if z >= self.hit_z[idx] {
                        self.hits[idx] = id;
                        self.hit_z[idx] = z;
                    }
                }
            }
        }
    }

    /// Mouse target registered at (x, y) this frame.
    pub fn hit_test(&self, x: u16, y: u16) -> Option<u32> {
        self.index_of(x, y)
            .map(|idx| self.hits[idx])
            .filter(|id| *id != 0)
    }

    /// Diff back against front, write the changes and update front.
    pub fn flush(&mut self, out: &mut OutputBuffer, state: &mut DiffState) -> DiffResult {
        if self.full_repaint {
            out.reset_attrs();
            out.clear_screen();
            state.reset();
        }
        let result = diff::render_diff(self, out, state);
        self.commit();
        self.full_repaint = false;
        result
    }

    /// Owned, styled copy of the back grid.
    pub fn snapshot(&self) -> FrameSnapshot {
        let cells = self
            .back
            .iter()
            .map(|cell| SnapshotCell {
                grapheme: if cell.is_wide_continuation() {
                    String::new()
                } else {
                    self.grapheme_of(cell).unwrap_or("\u{FFFD}").to_owned()
                },
                fg: cell.fg(),
                bg: cell.bg(),
                modifiers: cell.modifiers(),
            })
            .collect();
        FrameSnapshot {
            width: self.width,
            height: self.height,
            cells,
        }
    }

    /// Whether two cells display the same thing.
    ///
    /// Pooled graphemes are compared by text since each grid owns its own
    /// slots. Matching non-zero generations skip the comparison.
    pub(crate) fn same_content(&self, a: &Cell, b: &Cell) -> bool {
        if a.generation() != 0 && a.generation() == b.generation() {
            return true;
        }
        match (a.pool_id(), b.pool_id()) {
            (Some(x), Some(y)) => {
                a.same_style(b)
                    && a.display_width() == b.display_width()
                    && self.pool.get(x) == self.pool.get(y)
            }
            _ => a == b,
        }
    }

    /// Copy touched rows back → front and clear the touched set.
    fn commit(&mut self) {
        let width = usize::from(self.width);
        let rows: Vec<usize> = self.touched.iter().collect();
        for row in rows {
            for idx in row * width..(row + 1) * width {
                let (old, new) = (self.front[idx], self.back[idx]);
                if self.same_content(&old, &new) {
                    if old.generation() != new.generation() && !new.is_pooled() {
                        self.front[idx] = new;
                    }
                    continue;
                }
                if let Some(id) = old.pool_id() {
                    release_slot(&mut self.pool, id);
                }
                self.front[idx] = match new.pool_id() {
                    Some(id) => match self.pool.duplicate(id) {
                        Ok(copy) => {
                            let mut cell = Cell::pooled(copy, new.display_width())
                                .with_fg(new.fg())
                                .with_bg(new.bg())
                                .with_modifiers(new.modifiers());
                            cell.set_generation(new.generation());
                            cell
                        }
                        Err(_) => Cell::STALE,
                    },
                    None => new,
                };
            }
        }
        self.touched.clear();
    }

    fn visible(&self, x: i32, y: i32, layer: Layer) -> Option<usize> {
        if x < 0 || y < 0 || x >= i32::from(self.width) || y >= i32::from(self.height) {
            return None;
        }
        let (x, y) = (x as u16, y as u16);
        if !layer.clip.contains(x, y) {
            return None;
        }
        let idx = self.index_of(x, y)?;
        (layer.z >= self.z[idx]).then_some(idx)
    }

    fn next_generation(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Stamps are only compared for equality; start over after a wrap.
            for cell in self.front.iter_mut().chain(self.back.iter_mut()) {
                cell.set_generation(0);
            }
            self.generation = 1;
        }
        self.generation
    }

    fn composite(&mut self, idx: usize, grapheme: &str, width: u8, style: Style, layer: Layer) {
        let opacity = layer.opacity.clamp(0.0, 1.0);
        let dst = self.back[idx];
        let bg = style.bg.over(dst.bg(), opacity);
        let cell = if grapheme == " " && style.bg.alpha() * opacity < 1.0 {
            // translucent blank: keep the glyph underneath and tint it
            let mut kept = dst;
            kept.set_fg(style.bg.over(dst.fg(), opacity)).set_bg(bg);
            kept
        } else {
            self.orphan_left(idx);
            self.orphan_right(idx);
            let fg = style.fg.over(bg, opacity);
            self.make_cell(grapheme, width)
                .with_fg(fg)
                .with_bg(bg)
                .with_modifiers(style.modifiers)
        };
        self.store(idx, cell, layer.z);
    }

    fn composite_continuation(&mut self, idx: usize, style: Style, layer: Layer) {
        let opacity = layer.opacity.clamp(0.0, 1.0);
        self.orphan_right(idx);
        let bg = style.bg.over(self.back[idx].bg(), opacity);
        let cell = Cell::wide_continuation()
            .with_fg(style.fg.over(bg, opacity))
            .with_bg(bg)
            .with_modifiers(style.modifiers);
        self.store(idx, cell, layer.z);
    }

    /// Blank the leading half of a wide glyph whose trailing column is at `idx`.
    fn orphan_left(&mut self, idx: usize) {
        let x = idx % usize::from(self.width);
        if x == 0 || !self.back[idx].is_wide_continuation() {
            return;
        }
        if self.back[idx - 1].display_width() == 2 {
            self.blank(idx - 1);
        }
    }

    /// Blank the trailing half of a wide glyph whose leading column is at `idx`.
    fn orphan_right(&mut self, idx: usize) {
        let x = idx % usize::from(self.width);
        let cell = self.back[idx];
        if cell.is_wide_continuation() || cell.display_width() != 2 {
            return;
        }
        if x + 1 < usize::from(self.width) && self.back[idx + 1].is_wide_continuation() {
            self.blank(idx + 1);
        }
    }

    fn blank(&mut self, idx: usize) {
        let old = self.back[idx];
        let z = self.z[idx];
        self.store(idx, Cell::EMPTY.with_fg(old.fg()).with_bg(old.bg()), z);
    }

    fn make_cell(&mut self, grapheme: &str, width: u8) -> Cell {
        Cell::from_grapheme(grapheme)
            .unwrap_or_else(|| Cell::pooled(self.pool.alloc(grapheme), width))
    }

    fn store(&mut self, idx: usize, mut cell: Cell, z: i32) {
        let old = self.back[idx];
        if let Some(id) = old.pool_id() {
            if cell.pool_id() != Some(id) {
                release_slot(&mut self.pool, id);
            }
        }
        cell.set_generation(self.next_generation());
        self.back[idx] = cell;
        self.z[idx] = z;
        self.touched.insert(idx / usize::from(self.width));
    }

    fn release(&mut self, idx: usize) {
        if let Some(id) = self.back[idx].pool_id() {
            release_slot(&mut self.pool, id);
        }
    }
}

/// Return a slot to the pool. A refusal means a cell was released twice.
fn release_slot(pool: &mut GraphemePool, id: GraphemeId) {
    if let Err(error) = pool.free(id) {
        tracing::warn!(%error, "grapheme slot released twice");
    }
}

impl std::fmt::Debug for CellBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("touched_rows", &self.touched.count())
            .field("pooled_slots", &self.pool.stats().used_slots())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Rgba;

    fn solid(fg: Rgb, bg: Rgb) -> Style {
        Style::fg(fg).with_bg(bg)
    }

    const RED: Rgb = Rgb::new(255, 0, 0);
    const GREEN: Rgb = Rgb::new(0, 255, 0);

    fn buffer(w: u16, h: u16) -> CellBuffer {
        CellBuffer::new(w, h).unwrap()
    }

    #[test]
    fn test_buffer_new() {
        let buffer = buffer(80, 24);
        assert_eq!(buffer.width(), 80);
        assert_eq!(buffer.height(), 24);
        assert_eq!(buffer.cells().len(), 80 * 24);
        assert!(buffer.touched_rows().is_empty());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(matches!(
            CellBuffer::new(0, 24),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_resize_rejects_degenerate_and_keeps_size() {
        let mut buffer = buffer(10, 5);
        let err = buffer.resize(0, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidDimensions {
                kept_width: 10,
                kept_height: 5,
                ..
            }
        ));
        assert_eq!((buffer.width(), buffer.height()), (10, 5));
    }

    #[test]
    fn test_resize_discards_and_touches_everything() {
        let mut buffer = buffer(10, 5);
        let layer = Layer::opaque(buffer.area());
        buffer.draw_text(0, 0, "hi", Style::default(), layer);
        buffer.resize(20, 3).unwrap();
        assert_eq!(buffer.get_grapheme(0, 0), Some(" "));
        assert_eq!(buffer.touched_rows().count(), 3);
        assert!(buffer.needs_full_repaint());
        assert!(buffer.front_cells().iter().all(|c| *c == Cell::STALE));
    }

    #[test]
    fn test_paint_marks_row_touched() {
        let mut buffer = buffer(10, 5);
        buffer.paint_grapheme(3, 2, "x", Style::default(), Layer::opaque(buffer.area()));
        assert_eq!(buffer.touched_rows().iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(buffer.get_grapheme(3, 2), Some("x"));
    }

    #[test]
    fn test_clip_drops_silently() {
        let mut buffer = buffer(10, 5);
        let layer = Layer::opaque(Rect::new(2, 0, 3, 1));
        let used = buffer.draw_text(0, 0, "abcdefg", Style::default(), layer);
        assert_eq!(used, 7);
        assert_eq!(buffer.snapshot().row_text(0), "  cde");
        // out of buffer entirely
        buffer.paint_grapheme(-1, 99, "x", Style::default(), Layer::opaque(buffer.area()));
    }

    #[test]
    fn test_lower_z_does_not_overwrite() {
        let mut buffer = buffer(4, 1);
        let area = buffer.area();
        buffer.paint_grapheme(0, 0, "a", Style::default(), Layer::new(5, 1.0, area));
        buffer.paint_grapheme(0, 0, "b", Style::default(), Layer::new(1, 1.0, area));
        assert_eq!(buffer.get_grapheme(0, 0), Some("a"));
        // equal z: later paint wins
        buffer.paint_grapheme(0, 0, "c", Style::default(), Layer::new(5, 1.0, area));
        assert_eq!(buffer.get_grapheme(0, 0), Some("c"));
    }

    #[test]
    fn test_opacity_composites_background() {
        let mut buffer = buffer(2, 1);
        let area = buffer.area();
        buffer.fill_rect(Bounds::new(0, 0, 2, 1), solid(Rgb::WHITE, Rgb::BLACK), Layer::opaque(area));
        buffer.paint_grapheme(0, 0, "x", solid(Rgb::WHITE, Rgb::WHITE), Layer::new(0, 0.35, area));
        let cell = buffer.get(0, 0).unwrap();
        assert_eq!(cell.bg(), Rgb::new(89, 89, 89));
    }

    #[test]
    fn test_translucent_blank_tints_existing_glyph() {
        let mut buffer = buffer(3, 1);
        let area = buffer.area();
        buffer.draw_text(0, 0, "abc", solid(Rgb::WHITE, Rgb::BLACK), Layer::opaque(area));
        let veil = Style::default().with_bg(Rgba::new(0, 0, 0, 255));
        buffer.fill_rect(Bounds::new(0, 0, 3, 1), veil, Layer::new(1, 0.5, area));
        assert_eq!(buffer.snapshot().row_text(0), "abc");
        assert_eq!(buffer.get(1, 0).unwrap().fg(), Rgb::new(128, 128, 128));
    }

    #[test]
    fn test_wide_glyph_writes_continuation() {
        let mut buffer = buffer(4, 1);
        let width = buffer.paint_grapheme(0, 0, "日", Style::default(), Layer::opaque(buffer.area()));
        assert_eq!(width, 2);
        assert!(buffer.get(1, 0).unwrap().is_wide_continuation());
        assert_eq!(buffer.snapshot().row_text(0), "日");
    }

    #[test]
    fn test_overwriting_half_of_wide_glyph_blanks_the_other_half() {
        let mut buffer = buffer(4, 1);
        let area = buffer.area();
        buffer.paint_grapheme(0, 0, "日", Style::default(), Layer::opaque(area));
        buffer.paint_grapheme(1, 0, "x", Style::default(), Layer::opaque(area));
        assert_eq!(buffer.get_grapheme(0, 0), Some(" "));
        assert_eq!(buffer.get_grapheme(1, 0), Some("x"));

        buffer.paint_grapheme(2, 0, "日", Style::default(), Layer::opaque(area));
        buffer.paint_grapheme(2, 0, "y", Style::default(), Layer::opaque(area));
        assert!(!buffer.get(3, 0).unwrap().is_wide_continuation());
    }

    #[test]
    fn test_wide_glyph_at_clip_edge_becomes_space() {
        let mut buffer = buffer(3, 1);
        buffer.paint_grapheme(2, 0, "日", Style::default(), Layer::opaque(buffer.area()));
        assert_eq!(buffer.get_grapheme(2, 0), Some(" "));
    }

    #[test]
    fn test_pooled_slots_follow_cells() {
        let mut buffer = buffer(4, 1);
        let area = buffer.area();
        let family = "👨\u{200d}👩\u{200d}👧";
        buffer.paint_grapheme(0, 0, family, Style::default(), Layer::opaque(area));
        assert_eq!(buffer.get_grapheme(0, 0), Some(family));
        assert_eq!(buffer.pool_stats().used_slots(), 1);

        let mut out = OutputBuffer::new();
        buffer.flush(&mut out, &mut DiffState::new());
        // front owns its own copy
        assert_eq!(buffer.pool_stats().used_slots(), 2);

        buffer.paint_grapheme(0, 0, "a", Style::default(), Layer::opaque(area));
        assert_eq!(buffer.pool_stats().used_slots(), 1);
        buffer.flush(&mut out, &mut DiffState::new());
        assert_eq!(buffer.pool_stats().used_slots(), 0);
    }

    #[test]
    fn test_pooled_cells_are_released_exactly_once() {
        let mut buffer = buffer(4, 2);
        let family = "👨\u{200d}👩\u{200d}👧";
        let mut out = OutputBuffer::new();
        let mut state = DiffState::new();
        for _ in 0..3 {
            let area = buffer.area();
            buffer.clear(Rgb::BLACK);
            buffer.paint_grapheme(0, 0, family, Style::default(), Layer::opaque(area));
            buffer.paint_grapheme(0, 0, family, Style::default(), Layer::opaque(area));
            buffer.flush(&mut out, &mut state);
        }
        buffer.invalidate();
        buffer.resize(6, 3).unwrap();
        let stats = buffer.pool_stats();
        assert_eq!(stats.rejected_frees, 0);
        assert_eq!(stats.used_slots(), 0);
        assert_eq!(stats.allocs, stats.frees);
    }

    #[test]
    fn test_flush_equalises_front_and_back() {
        let mut buffer = buffer(5, 2);
        let area = buffer.area();
        buffer.draw_text(0, 1, "hey", solid(RED, Rgb::BLACK), Layer::opaque(area));
        let mut out = OutputBuffer::new();
        buffer.flush(&mut out, &mut DiffState::new());
        assert!(buffer.touched_rows().is_empty());
        for (front, back) in buffer.front_cells().iter().zip(buffer.cells()) {
            assert_eq!(front, back);
        }
    }

    #[test]
    fn test_red_run_then_green_cell() {
        let mut buffer = buffer(10, 3);
        let area = buffer.area();
        let red = solid(RED, Rgb::BLACK);
        buffer.draw_text(2, 1, "abc", red, Layer::opaque(area));

        let mut out = OutputBuffer::new();
        let mut state = DiffState::new();
        let first = buffer.flush(&mut out, &mut state);
        assert_eq!(first.runs.len(), 1);
        assert_eq!(first.runs[0].width, 3);

        buffer.paint_grapheme(3, 1, "b", solid(GREEN, Rgb::BLACK), Layer::opaque(area));
        out.clear();
        let second = buffer.flush(&mut out, &mut state);
        assert_eq!(second.runs.len(), 1);
        assert_eq!((second.runs[0].x, second.runs[0].y, second.runs[0].width), (3, 1, 1));
    }

    #[test]
    fn test_hit_grid_prefers_higher_z() {
        let mut buffer = buffer(10, 5);
        let area = buffer.area();
        buffer.register_hit(Bounds::new(0, 0, 10, 5), 1, 0, area);
        buffer.register_hit(Bounds::new(2, 2, 2, 2), 2, 5, area);
        buffer.register_hit(Bounds::new(0, 0, 10, 5), 3, 1, area);
        assert_eq!(buffer.hit_test(2, 2), Some(2));
        assert_eq!(buffer.hit_test(0, 0), Some(3));
        buffer.clear(Rgb::BLACK);
        assert_eq!(buffer.hit_test(0, 0), None);
    }

    #[test]
    fn test_draw_box_with_title() {
        let mut buffer = buffer(10, 3);
        let area = buffer.area();
        buffer.draw_box(
            Bounds::new(0, 0, 10, 3),
            BorderStyle::Single,
            Style::default(),
            Some("Title"),
            Layer::opaque(area),
        );
        let text = buffer.snapshot().to_plain_text();
        assert_eq!(text, "┌─Title──┐\n│        │\n└────────┘");
    }

    #[test]
    fn test_long_title_is_truncated() {
        let mut buffer = buffer(8, 3);
        let area = buffer.area();
        buffer.draw_box(
            Bounds::new(0, 0, 8, 3),
            BorderStyle::Rounded,
            Style::default(),
            Some("A very long title"),
            Layer::opaque(area),
        );
        assert_eq!(buffer.snapshot().row_text(0), "╭─A ve─╮");
    }

    #[test]
    fn test_draw_buffer_composites_painted_cells() {
        let mut dest = buffer(10, 3);
        let area = dest.area();
        dest.draw_text(0, 1, "xxxxxxxxxx", Style::default(), Layer::opaque(area));
        dest.draw_text(0, 2, "yyyyyyyyyy", Style::default(), Layer::opaque(area));

        let mut source = buffer(4, 2);
        let source_area = source.area();
        source.draw_text(0, 0, "ab中", Style::default(), Layer::opaque(source_area));

        dest.draw_buffer(3, 1, &source, source_area, true, Layer::opaque(area));
        let snap = dest.snapshot();
        assert_eq!(snap.row_text(1), "xxxab中xxx");
        assert_eq!(snap.row_text(2), "yyyyyyyyyy");

        dest.draw_buffer(3, 2, &source, Rect::new(0, 1, 4, 1), false, Layer::opaque(area));
        assert_eq!(dest.snapshot().row_text(2), "yyy    yyy");
    }

    #[test]
    fn test_draw_buffer_respects_clip() {
        let mut dest = buffer(6, 1);
        let mut source = buffer(6, 1);
        let source_area = source.area();
        source.draw_text(0, 0, "abcdef", Style::default(), Layer::opaque(source_area));
        dest.draw_buffer(-2, 0, &source, source_area, true, Layer::opaque(Rect::new(0, 0, 3, 1)));
        assert_eq!(dest.snapshot().row_text(0), "cde");
    }

    #[test]
    fn test_row_set() {
        let mut rows = RowSet::new(130);
        rows.insert(0);
        rows.insert(129);
        rows.insert(500);
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![0, 129]);
        assert_eq!(rows.count(), 2);
        rows.clear();
        assert!(rows.is_empty());
    }
}
