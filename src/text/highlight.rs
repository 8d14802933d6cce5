//! Highlight overlay: Per-line style spans published by atomic swap.
//!
//! Syntax highlighting runs outside the frame loop, possibly on another
//! thread. It never edits spans in place: the whole overlay state lives
//! behind an [`ArcSwap`] and every publish installs a new snapshot, so a
//! reader sees either all of a line's new spans or none of them.
//!
//! ```text
//!   highlighter ──publish(line, spans)──► ArcSwap<OverlaySnapshot>
//!                                              │ load()
//!   paint walk  ◄──────────────────────────────┘
//! ```
//!
//! Lines whose text changed are kept in a dirty set until spans for them
//! are published again. The set stores ranges, and the span map sits behind
//! its own `Arc`, so marking freshly appended lines costs the same no matter
//! how many lines came before.

use super::rope::TextBuffer;
use super::style::StyleOverride;
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// A styled byte range within one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightSpan {
    /// First byte, relative to the line start.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
    /// Override applied to the covered graphemes.
    pub style: StyleOverride,
}

impl HighlightSpan {
    /// Create a span over `range`.
    #[inline]
    pub const fn new(range: Range<usize>, style: StyleOverride) -> Self {
        Self {
            start: range.start,
            end: range.end,
            style,
        }
    }

    /// Whether the span covers byte `offset`.
    #[inline]
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Set of line numbers stored as disjoint, non-adjacent ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LineSet {
    /// Range start to exclusive end.
    ranges: BTreeMap<usize, usize>,
    len: usize,
}

impl LineSet {
    fn from_range(range: Range<usize>) -> Self {
        let mut set = Self::default();
        set.insert_range(range);
        set
    }

    fn contains(&self, line: usize) -> bool {
        self.ranges
            .range(..=line)
            .next_back()
            .is_some_and(|(_, end)| line < *end)
    }

    fn insert_range(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let (mut start, mut end) = (range.start, range.end);
        if let Some((&s, &e)) = self.ranges.range(..=start).next_back() {
            if e >= start {
                self.ranges.remove(&s);
                self.len -= e - s;
                start = s;
                end = end.max(e);
            }
        }
        while let Some((&s, &e)) = self.ranges.range(start..=end).next() {
            self.ranges.remove(&s);
            self.len -= e - s;
            end = end.max(e);
        }
        self.ranges.insert(start, end);
        self.len += end - start;
    }

    fn remove(&mut self, line: usize) {
        let Some((&s, &e)) = self.ranges.range(..=line).next_back() else {
            return;
        };
        if line >= e {
            return;
        }
        self.ranges.remove(&s);
        self.len -= 1;
        if s < line {
            self.ranges.insert(s, line);
        }
        if line + 1 < e {
            self.ranges.insert(line + 1, e);
        }
    }

    /// Drop every line at or past `limit`.
    fn truncate(&mut self, limit: usize) {
        for (s, e) in self.ranges.split_off(&limit) {
            self.len -= e - s;
        }
        if let Some((_, end)) = self.ranges.iter_mut().next_back() {
            if *end > limit {
                self.len -= *end - limit;
                *end = limit;
            }
        }
    }

    fn reaches(&self, limit: usize) -> bool {
        self.ranges.values().next_back().is_some_and(|end| *end > limit)
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|(&s, &e)| s..e)
    }

    /// The set after lines `first + 1..first + old_lines` were dropped and
    /// everything from `first + old_lines` moved to `first + new_lines`.
    fn spliced(&self, first: usize, old_lines: usize, new_lines: usize) -> Self {
        let tail = first + old_lines;
        let mut next = Self::default();
        for (&s, &e) in &self.ranges {
            let keep = e.min(first + 1);
            if s < keep {
                next.insert_range(s..keep);
            }
            let moved = s.max(tail);
            if moved < e {
                next.insert_range(moved - old_lines + new_lines..e - old_lines + new_lines);
            }
        }
        next
    }
}

type SpanMap = BTreeMap<usize, Arc<[HighlightSpan]>>;

/// Immutable view of the overlay at one point in time.
#[derive(Debug, Clone, Default)]
pub struct OverlaySnapshot {
    lines: Arc<SpanMap>,
    dirty: LineSet,
}

impl OverlaySnapshot {
    /// Spans published for `line`, sorted by start.
    pub fn line(&self, line: usize) -> Option<&[HighlightSpan]> {
        self.lines.get(&line).map(|s| &s[..])
    }

    /// The span covering `offset` on `line`, if any.
    pub fn covering(&self, line: usize, offset: usize) -> Option<&HighlightSpan> {
        let spans = self.line(line)?;
        let at = spans.partition_point(|s| s.end <= offset);
        spans.get(at).filter(|s| s.contains(offset))
    }

    /// Whether `line` needs new spans.
    pub fn is_dirty(&self, line: usize) -> bool {
        self.dirty.contains(line)
    }

    /// Dirty lines in ascending order.
    pub fn dirty_lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty.iter()
    }

    /// Number of dirty lines.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len
    }

    /// Number of dirty line ranges; appends extend the last range.
    pub fn dirty_ranges(&self) -> usize {
        self.dirty.ranges.len()
    }

    /// Number of spans across all lines.
    pub fn span_count(&self) -> usize {
        self.lines.values().map(|s| s.len()).sum()
    }
}

/// Highlight spans for a text buffer, shareable across threads.
#[derive(Debug)]
pub struct HighlightOverlay {
    state: ArcSwap<OverlaySnapshot>,
}

impl Default for HighlightOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightOverlay {
    /// An overlay with no spans and nothing dirty.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(OverlaySnapshot::default()),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<OverlaySnapshot> {
        self.state.load_full()
    }

    /// Replace the spans of one line and clear its dirty mark.
    ///
    /// Spans must be sorted by start, non-empty and non-overlapping.
    pub fn publish(&self, line: usize, spans: Vec<HighlightSpan>) -> Result<()> {
        self.publish_batch(vec![(line, spans)])
    }

    /// Replace the spans of several lines in a single swap.
    pub fn publish_batch(&self, batch: Vec<(usize, Vec<HighlightSpan>)>) -> Result<()> {
        for (line, spans) in &batch {
            validate(*line, spans)?;
        }
        let batch: Vec<(usize, Arc<[HighlightSpan]>)> = batch
            .into_iter()
            .map(|(line, spans)| (line, Arc::from(spans)))
            .collect();
        self.state.rcu(|current| {
            let mut next = OverlaySnapshot::clone(current);
            let lines = Arc::make_mut(&mut next.lines);
            for (line, spans) in &batch {
                if spans.is_empty() {
                    lines.remove(line);
                } else {
                    lines.insert(*line, Arc::clone(spans));
                }
                next.dirty.remove(*line);
            }
            next
        });
        Ok(())
    }

    /// Drop every span and mark lines `0..line_count` dirty.
    pub(crate) fn reset(&self, line_count: usize) {
        self.state.store(Arc::new(OverlaySnapshot {
            lines: Arc::default(),
            dirty: LineSet::from_range(0..line_count),
        }));
    }

    /// Account for an edit that turned lines `first..first + old_lines`
    /// into `first..first + new_lines`.
    ///
    /// Line `first` keeps its spans, clipped to `first_len` bytes; the other
    /// replaced lines lose theirs. Every new line is dirty and lines after
    /// the edit move with their spans.
    pub(crate) fn splice(&self, first: usize, old_lines: usize, new_lines: usize, first_len: usize) {
        let shift = |line: usize| -> Option<usize> {
            if line <= first {
                Some(line)
            } else if line < first + old_lines {
                None
            } else {
                Some(line - old_lines + new_lines)
            }
        };
        self.state.rcu(|current| {
            let mut lines = SpanMap::new();
            for (line, spans) in current.lines.iter() {
                let Some(moved) = shift(*line) else { continue };
                if moved == first {
                    if let Some(clipped) = clip(spans, first_len) {
                        lines.insert(moved, clipped);
                    }
                } else {
                    lines.insert(moved, Arc::clone(spans));
                }
            }
            let mut dirty = current.dirty.spliced(first, old_lines, new_lines);
            dirty.insert_range(first..first + new_lines);
            OverlaySnapshot {
                lines: Arc::new(lines),
                dirty,
            }
        });
    }

    /// Account for text appended at the end of line `last`, the final line,
    /// that added `added` newlines.
    ///
    /// Nothing follows `last`, so no spans move: line `last` and the new
    /// lines become dirty and the span map is shared with the previous
    /// snapshot.
    pub(crate) fn mark_appended(&self, last: usize, added: usize) {
        self.state.rcu(|current| {
            let mut next = OverlaySnapshot::clone(current);
            if next.lines.range(last + 1..).next().is_some() {
                Arc::make_mut(&mut next.lines).split_off(&(last + 1));
            }
            next.dirty.insert_range(last..last + added + 1);
            next
        });
    }

    /// Forget dirty marks at or past `line_count`.
    pub(crate) fn truncate_dirty(&self, line_count: usize) {
        if !self.state.load().dirty.reaches(line_count) {
            return;
        }
        self.state.rcu(|current| {
            let mut next = OverlaySnapshot::clone(current);
            next.dirty.truncate(line_count);
            if next.lines.range(line_count..).next().is_some() {
                Arc::make_mut(&mut next.lines).split_off(&line_count);
            }
            next
        });
    }
}

fn validate(line: usize, spans: &[HighlightSpan]) -> Result<()> {
    let mut previous_end = 0;
    for span in spans {
        if span.start >= span.end {
            tracing::error!(line, start = span.start, end = span.end, "empty or inverted highlight span");
            return Err(Error::InvalidHighlight {
                line,
                reason: "span start must be before its end",
            });
        }
        if span.start < previous_end {
            tracing::error!(line, start = span.start, previous_end, "overlapping highlight spans");
            return Err(Error::InvalidHighlight {
                line,
                reason: "spans must be sorted and non-overlapping",
            });
        }
        previous_end = span.end;
    }
    Ok(())
}

/// Clip spans to `len` bytes; `None` when nothing is left.
fn clip(spans: &Arc<[HighlightSpan]>, len: usize) -> Option<Arc<[HighlightSpan]>> {
    if spans.last().map_or(true, |s| s.end <= len) {
        return (!spans.is_empty()).then(|| Arc::clone(spans));
    }
    let clipped: Vec<HighlightSpan> = spans
        .iter()
        .filter(|s| s.start < len)
        .map(|s| HighlightSpan {
            end: s.end.min(len),
            ..*s
        })
        .collect();
    (!clipped.is_empty()).then(|| Arc::from(clipped))
}

/// Computes spans for one line of text.
pub trait Highlighter {
    /// Spans for `text`, the content of line `line` without its newline.
    fn highlight_line(&mut self, line: usize, text: &str) -> Vec<HighlightSpan>;
}

/// Run `highlighter` over every dirty line of `buffer` and publish the
/// results in one swap. Returns the number of lines highlighted.
pub fn rehighlight_dirty<H: Highlighter + ?Sized>(
    buffer: &TextBuffer,
    highlighter: &mut H,
) -> Result<usize> {
    let overlay = buffer.overlay();
    let line_count = buffer.line_count();
    overlay.truncate_dirty(line_count);
    let snapshot = overlay.load();
    let batch: Vec<(usize, Vec<HighlightSpan>)> = snapshot
        .dirty_lines()
        .filter_map(|line| {
            let text = buffer.line_text(line)?;
            Some((line, highlighter.highlight_line(line, &text)))
        })
        .collect();
    let count = batch.len();
    overlay.publish_batch(batch)?;
    tracing::trace!(buffer = buffer.id(), lines = count, "rehighlighted dirty lines");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Modifiers;

    fn span(range: Range<usize>) -> HighlightSpan {
        HighlightSpan::new(range, StyleOverride::modifiers(Modifiers::BOLD))
    }

    #[test]
    fn test_publish_and_lookup() {
        let overlay = HighlightOverlay::new();
        overlay.publish(3, vec![span(0..2), span(4..8)]).unwrap();
        let snapshot = overlay.load();
        assert_eq!(snapshot.line(3).unwrap().len(), 2);
        assert_eq!(snapshot.covering(3, 5).map(|s| s.start), Some(4));
        assert!(snapshot.covering(3, 2).is_none());
        assert_eq!(snapshot.span_count(), 2);
    }

    #[test]
    fn test_overlapping_spans_are_rejected() {
        let overlay = HighlightOverlay::new();
        let err = overlay.publish(0, vec![span(0..5), span(3..6)]).unwrap_err();
        assert!(matches!(err, Error::InvalidHighlight { line: 0, .. }));
        let err = overlay.publish(0, vec![span(4..6), span(0..2)]).unwrap_err();
        assert!(matches!(err, Error::InvalidHighlight { .. }));
        assert!(overlay.load().line(0).is_none());
    }

    #[test]
    fn test_old_snapshot_is_unaffected_by_publish() {
        let overlay = HighlightOverlay::new();
        overlay.publish(0, vec![span(0..1)]).unwrap();
        let before = overlay.load();
        overlay.publish(0, vec![span(0..3), span(5..6)]).unwrap();
        assert_eq!(before.line(0).unwrap().len(), 1);
        assert_eq!(overlay.load().line(0).unwrap().len(), 2);
    }

    #[test]
    fn test_splice_shifts_following_lines() {
        let overlay = HighlightOverlay::new();
        overlay.publish_batch(vec![(0, vec![span(0..1)]), (2, vec![span(0..2)])]).unwrap();
        // line 0 split into three lines
        overlay.splice(0, 1, 3, 10);
        let snapshot = overlay.load();
        assert!(snapshot.line(0).is_some());
        assert_eq!(snapshot.line(4).unwrap()[0].end, 2);
        assert!(snapshot.line(2).is_none());
        assert_eq!(snapshot.dirty_lines().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_splice_clips_first_line() {
        let overlay = HighlightOverlay::new();
        overlay.publish(1, vec![span(0..2), span(4..11)]).unwrap();
        overlay.splice(1, 1, 1, 5);
        let snapshot = overlay.load();
        let spans = snapshot.line(1).unwrap();
        assert_eq!(spans, &[span(0..2), span(4..5)]);
        assert!(snapshot.is_dirty(1));
    }

    #[test]
    fn test_line_set_merges_and_splits_ranges() {
        let mut set = LineSet::default();
        set.insert_range(4..6);
        set.insert_range(0..2);
        set.insert_range(2..4);
        assert_eq!(set.ranges.len(), 1);
        assert_eq!(set.len, 6);
        set.remove(3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 4, 5]);
        assert_eq!(set.len, 5);
        set.truncate(5);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
        assert!(!set.reaches(5));
        assert!(set.reaches(4));
    }

    #[test]
    fn test_mark_appended_shares_spans_and_extends_dirty_range() {
        let overlay = HighlightOverlay::new();
        overlay.publish_batch(vec![(0, vec![span(0..1)]), (1, vec![span(0..2)])]).unwrap();
        let before = overlay.load();
        overlay.mark_appended(1, 2);
        overlay.mark_appended(3, 1);
        let after = overlay.load();
        assert!(Arc::ptr_eq(&before.lines, &after.lines));
        assert_eq!(after.dirty_lines().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(after.dirty_ranges(), 1);
        assert_eq!(after.line(1).unwrap()[0].end, 2);
    }

    #[test]
    fn test_publish_across_threads() {
        let overlay = Arc::new(HighlightOverlay::new());
        let writer = Arc::clone(&overlay);
        std::thread::spawn(move || {
            for line in 0..100 {
                writer.publish(line, vec![span(0..1)]).unwrap();
            }
        })
        .join()
        .unwrap();
        assert_eq!(overlay.load().span_count(), 100);
    }
}
