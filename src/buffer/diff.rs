//! Diffing Engine: Turn back/front differences into minimal ANSI output.
//!
//! For every touched row the scanner walks left to right:
//! 1. Cells whose content matches the front grid are skipped
//! 2. Consecutive changed cells sharing fg, bg and modifiers form one run
//! 3. A run costs at most one cursor move and one set of SGR sequences
//! 4. Terminal color/modifier state is tracked across runs and rows
//!
//! Everything lands in one [`OutputBuffer`] that is flushed with a single
//! write.

use super::{Cell, CellBuffer, Modifiers, Rgb};
use crate::terminal::OutputBuffer;

/// State tracker for the diffing algorithm.
///
/// This tracks the "current" terminal state (cursor position, colors, modifiers)
/// to minimize the number of escape sequences we need to emit.
#[derive(Debug, Clone)]
pub struct DiffState {
    /// Last known cursor X position (0-indexed).
    cursor_x: u16,
    /// Last known cursor Y position (0-indexed).
    cursor_y: u16,
    /// Last emitted foreground color.
    fg: Option<Rgb>,
    /// Last emitted background color.
    bg: Option<Rgb>,
    /// Last emitted modifiers.
    modifiers: Option<Modifiers>,
}

impl Default for DiffState {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffState {
    /// Create a new diff state with unknown terminal state.
    pub const fn new() -> Self {
        Self {
            cursor_x: u16::MAX,
            cursor_y: u16::MAX,
            fg: None,
            bg: None,
            modifiers: None,
        }
    }

    /// Reset the state (e.g., after a full screen clear or a cursor jump
    /// the renderer did not make).
    pub const fn reset(&mut self) {
        self.fg = None;
        self.bg = None;
        self.modifiers = None;
        // Force cursor move on next write
        self.cursor_x = u16::MAX;
        self.cursor_y = u16::MAX;
    }

    /// Record a cursor move made outside the diff.
    pub const fn cursor_moved(&mut self, x: u16, y: u16) {
        self.cursor_x = x;
        self.cursor_y = y;
    }

    /// Forget only the cursor position.
    pub const fn forget_cursor(&mut self) {
        self.cursor_x = u16::MAX;
        self.cursor_y = u16::MAX;
    }
}

/// A maximal group of adjacent changed cells written with one style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// First column.
    pub x: u16,
    /// Row.
    pub y: u16,
    /// Columns covered, wide glyphs counting two.
    pub width: u16,
}

/// Result of a flush.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Runs emitted, in output order.
    pub runs: Vec<Run>,
    /// Number of cells that were different.
    pub cells_changed: usize,
    /// Number of cursor move sequences emitted.
    pub cursor_moves: usize,
    /// Number of color change sequences emitted.
    pub color_changes: usize,
    /// Number of modifier change sequences emitted.
    pub modifier_changes: usize,
    /// Bytes written to the output buffer.
    pub bytes: usize,
}

impl DiffResult {
    /// Rows that received at least one run.
    pub fn rows(&self) -> Vec<u16> {
        let mut rows: Vec<u16> = self.runs.iter().map(|r| r.y).collect();
        rows.dedup();
        rows
    }
}

/// Write the difference between the back and front grids of `buffer`.
///
/// Only rows in the buffer's touched set are scanned. The grids are not
/// modified; [`CellBuffer::flush`] commits afterwards.
pub fn render_diff(buffer: &CellBuffer, out: &mut OutputBuffer, state: &mut DiffState) -> DiffResult {
    let mut result = DiffResult::default();
    let start = out.len();
    let width = usize::from(buffer.width());
    let front = buffer.front_cells();
    let back = buffer.cells();

    for y in buffer.touched_rows().iter() {
        let row = y * width;
        let mut open: Option<(Run, Cell)> = None;
        let mut x = 0;
        while x < width {
            let idx = row + x;
            let next = &back[idx];
            if next.is_wide_continuation() {
                x += 1;
                continue;
            }
            let span = if next.display_width() == 2 && x + 1 < width { 2 } else { 1 };
            let changed = (idx..idx + span).any(|i| !buffer.same_content(&front[i], &back[i]));
            if !changed {
                if let Some((run, _)) = open.take() {
                    result.runs.push(run);
                }
                x += 1;
                continue;
            }

            result.cells_changed += 1;
            match open.as_mut() {
                Some((run, style)) if style.same_style(next) => {
                    run.width += span as u16;
                }
                _ => {
                    if let Some((run, _)) = open.take() {
                        result.runs.push(run);
                    }
                    let (col, line) = (x as u16, y as u16);
                    if state.cursor_x != col || state.cursor_y != line {
                        out.cursor_move(col, line);
                        state.cursor_x = col;
                        state.cursor_y = line;
                        result.cursor_moves += 1;
                    }
                    emit_style(out, state, next, &mut result);
                    open = Some((
                        Run {
                            x: col,
                            y: line,
                            width: span as u16,
                        },
                        *next,
                    ));
                }
            }

            emit_grapheme(out, buffer, next);
            state.cursor_x = (x + span) as u16;
            x += span;
        }
        if let Some((run, _)) = open {
            result.runs.push(run);
        }
    }

    result.bytes = out.len() - start;
    if !result.runs.is_empty() {
        tracing::trace!(
            runs = result.runs.len(),
            cells = result.cells_changed,
            bytes = result.bytes,
            "frame diff"
        );
    }
    result
}

/// Bring the terminal's SGR state in line with `cell`.
///
/// Removing a modifier requires a full reset (`\x1b[0m`), which also drops
/// both colors.
fn emit_style(out: &mut OutputBuffer, state: &mut DiffState, cell: &Cell, result: &mut DiffResult) {
    let next_mods = cell.modifiers();
    let current_mods = state.modifiers.unwrap_or(Modifiers::empty());
    if !current_mods.difference(next_mods).is_empty() {
        out.reset_attrs();
        state.fg = None;
        state.bg = None;
        state.modifiers = None;
    }

    if state.fg != Some(cell.fg()) {
        out.set_fg(cell.fg());
        state.fg = Some(cell.fg());
        result.color_changes += 1;
    }
    if state.bg != Some(cell.bg()) {
        out.set_bg(cell.bg());
        state.bg = Some(cell.bg());
        result.color_changes += 1;
    }

    let added = next_mods.difference(state.modifiers.unwrap_or(Modifiers::empty()));
    if !added.is_empty() {
        out.set_modifiers(added);
        result.modifier_changes += 1;
    }
    state.modifiers = Some(next_mods);
}

/// Emit a grapheme, resolving pooled storage.
#[inline]
fn emit_grapheme(out: &mut OutputBuffer, buffer: &CellBuffer, cell: &Cell) {
    match buffer.grapheme_of(cell) {
        Some(grapheme) => out.write_str(grapheme),
        // Pool slot gone: emit a replacement character
        None => out.write_str("\u{FFFD}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Layer, Style};
    use crate::layout::Bounds;

    fn flush(buffer: &mut CellBuffer, state: &mut DiffState) -> (DiffResult, String) {
        let mut out = OutputBuffer::new();
        let result = buffer.flush(&mut out, state);
        (result, String::from_utf8_lossy(out.as_bytes()).into_owned())
    }

    #[test]
    fn test_diff_identical_buffers() {
        let mut buffer = CellBuffer::new(80, 24).unwrap();
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);
        assert!(output.is_empty());
        assert_eq!(result.cells_changed, 0);
        assert!(result.runs.is_empty());
    }

    #[test]
    fn test_diff_single_change() {
        let mut buffer = CellBuffer::new(80, 24).unwrap();
        buffer.paint_grapheme(5, 10, "X", Style::default(), Layer::opaque(buffer.area()));
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);

        assert_eq!(result.cells_changed, 1);
        assert_eq!(result.cursor_moves, 1);
        // 1-indexed position
        assert!(output.starts_with("\x1b[11;6H"));
        assert!(output.ends_with('X'));
    }

    #[test]
    fn test_adjacent_cells_share_one_run() {
        let mut buffer = CellBuffer::new(80, 24).unwrap();
        let layer = Layer::opaque(buffer.area());
        buffer.draw_text(0, 0, "ABC", Style::default(), layer);
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);

        assert_eq!(result.cells_changed, 3);
        assert_eq!(result.cursor_moves, 1);
        assert_eq!(result.runs, vec![Run { x: 0, y: 0, width: 3 }]);
        assert!(output.ends_with("ABC"));
    }

    #[test]
    fn test_style_change_splits_run_without_cursor_move() {
        let mut buffer = CellBuffer::new(10, 1).unwrap();
        let layer = Layer::opaque(buffer.area());
        buffer.draw_text(0, 0, "ab", Style::fg(Rgb::new(255, 0, 0)), layer);
        buffer.draw_text(2, 0, "cd", Style::fg(Rgb::new(0, 0, 255)), layer);
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);

        assert_eq!(result.runs.len(), 2);
        assert_eq!(result.cursor_moves, 1);
        assert!(output.contains("\x1b[38;2;255;0;0m"));
        assert!(output.contains("\x1b[38;2;0;0;255m"));
    }

    #[test]
    fn test_unchanged_gap_costs_a_cursor_move() {
        let mut buffer = CellBuffer::new(10, 1).unwrap();
        let layer = Layer::opaque(buffer.area());
        buffer.draw_text(0, 0, "abcde", Style::default(), layer);
        let mut state = DiffState::new();
        flush(&mut buffer, &mut state);

        buffer.draw_text(0, 0, "Xbc", Style::default(), layer);
        buffer.draw_text(4, 0, "Y", Style::default(), layer);
        let (result, _) = flush(&mut buffer, &mut state);
        assert_eq!(
            result.runs,
            vec![Run { x: 0, y: 0, width: 1 }, Run { x: 4, y: 0, width: 1 }]
        );
        assert_eq!(result.cursor_moves, 2);
    }

    #[test]
    fn test_color_state_carries_across_frames() {
        let mut buffer = CellBuffer::new(10, 2).unwrap();
        let layer = Layer::opaque(buffer.area());
        let mut state = DiffState::new();
        buffer.paint_grapheme(0, 0, "a", Style::default(), layer);
        let (first, _) = flush(&mut buffer, &mut state);
        assert_eq!(first.color_changes, 2);

        buffer.paint_grapheme(0, 1, "b", Style::default(), layer);
        let (second, _) = flush(&mut buffer, &mut state);
        assert_eq!(second.color_changes, 0);
    }

    #[test]
    fn test_modifier_removal_resets() {
        let mut buffer = CellBuffer::new(10, 1).unwrap();
        let layer = Layer::opaque(buffer.area());
        buffer.paint_grapheme(0, 0, "a", Style::default().with_modifiers(Modifiers::BOLD), layer);
        buffer.paint_grapheme(1, 0, "b", Style::default(), layer);
        let mut state = DiffState::new();
        let (_, output) = flush(&mut buffer, &mut state);
        let bold = output.find("\x1b[1m").unwrap();
        let reset = output.find("\x1b[0m").unwrap();
        assert!(bold < reset);
    }

    #[test]
    fn test_only_rows_of_changed_region_are_written() {
        let mut buffer = CellBuffer::new(20, 10).unwrap();
        let layer = Layer::opaque(buffer.area());
        buffer.fill_rect(Bounds::new(0, 0, 20, 10), Style::default().with_bg(Rgb::new(1, 2, 3)), layer);
        let mut state = DiffState::new();
        flush(&mut buffer, &mut state);

        // repaint the whole frame, changing only a 3x2 block
        buffer.clear(Rgb::new(1, 2, 3));
        buffer.fill_rect(Bounds::new(0, 0, 20, 10), Style::default().with_bg(Rgb::new(1, 2, 3)), layer);
        buffer.fill_rect(Bounds::new(4, 6, 3, 2), Style::default().with_bg(Rgb::new(9, 9, 9)), layer);
        let (result, _) = flush(&mut buffer, &mut state);
        assert_eq!(result.rows(), vec![6, 7]);
        assert!(result.runs.iter().all(|r| r.x == 4 && r.width == 3));
    }

    #[test]
    fn test_wide_glyph_counts_two_columns() {
        let mut buffer = CellBuffer::new(10, 1).unwrap();
        buffer.draw_text(0, 0, "日本", Style::default(), Layer::opaque(buffer.area()));
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);
        assert_eq!(result.runs, vec![Run { x: 0, y: 0, width: 4 }]);
        assert!(output.ends_with("日本"));
    }

    #[test]
    fn test_resize_forces_clear_and_full_repaint() {
        let mut buffer = CellBuffer::new(4, 2).unwrap();
        buffer.resize(3, 2).unwrap();
        let mut state = DiffState::new();
        let (result, output) = flush(&mut buffer, &mut state);
        assert!(output.contains("\x1b[2J"));
        assert_eq!(result.cells_changed, 6);
        assert!(!buffer.needs_full_repaint());
    }
}
