//! Text Buffer: Versioned chunk rope for styled, streaming text.
//!
//! This module provides the text storage behind text nodes, optimized for:
//! - Streaming append (token-by-token output) in O(1) amortised time
//! - Positional chunk edits that are O(number of chunks)
//! - Line lookup through a lazily built, incrementally extended index
//!
//! Chunk bytes live in a buffer-owned [`Arena`]. Chunks are never edited in
//! place except by streaming append, which grows the last chunk when the
//! style matches. Handles into the buffer are weak: a [`ChunkRef`] records
//! the version it was taken at and is rejected once the buffer has moved on.

use super::highlight::HighlightOverlay;
use super::style::StyleOverride;
use super::advance_columns;
use crate::buffer::Style;
use crate::error::{Error, Result};
use crate::memory::{Arena, ArenaSpan, ArenaStats};
use std::cell::OnceCell;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Monotonic edit counter of a [`TextBuffer`].
pub type Version = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Character-level style override inside a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    /// Byte range relative to the chunk start.
    pub range: Range<usize>,
    /// Override for the covered graphemes.
    pub style: StyleOverride,
}

impl Mark {
    /// Create a mark.
    #[inline]
    pub const fn new(range: Range<usize>, style: StyleOverride) -> Self {
        Self { range, style }
    }
}

/// A run of text with one base style, as handed to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The text.
    pub text: String,
    /// Base style of every grapheme in the chunk.
    pub style: Style,
    /// Inline overrides, applied above highlights.
    pub marks: Vec<Mark>,
}

impl Chunk {
    /// Unstyled chunk.
    pub fn new(text: impl Into<String>) -> Self {
        Self::styled(text, Style::default())
    }

    /// Chunk with a base style.
    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            marks: Vec::new(),
        }
    }

    /// Replace the inline marks (builder pattern).
    #[must_use]
    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = marks;
        self
    }

    /// Add one inline mark (builder pattern).
    #[must_use]
    pub fn with_mark(mut self, range: Range<usize>, style: StyleOverride) -> Self {
        self.marks.push(Mark::new(range, style));
        self
    }
}

/// Weak handle to a chunk: index plus the buffer version it was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    index: usize,
    version: Version,
}

impl ChunkRef {
    /// Chunk index at the time the handle was taken.
    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Buffer version at the time the handle was taken.
    #[inline]
    pub const fn version(&self) -> Version {
        self.version
    }
}

/// Start of a line: chunk index and byte offset inside that chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinePos {
    /// Chunk holding the first byte of the line.
    pub chunk: usize,
    /// Byte offset of the line start within the chunk.
    pub offset: usize,
}

/// A selected byte range and how to draw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Byte range over the whole buffer.
    pub range: Range<usize>,
    /// Override applied above everything else.
    pub style: StyleOverride,
}

/// One grapheme of a line with its effective style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyledGrapheme<'a> {
    /// Grapheme text.
    pub text: &'a str,
    /// Chunk style with highlight, mark and selection overrides applied.
    pub style: Style,
    /// Byte offset from the line start.
    pub offset: usize,
}

/// Counters for one text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RopeStats {
    /// Number of chunks.
    pub chunks: usize,
    /// Number of lines.
    pub lines: usize,
    /// Live text bytes.
    pub bytes: usize,
    /// Arena counters; dead bytes from edits show up as `used - bytes`.
    pub arena: ArenaStats,
    /// Highlight spans currently published.
    pub highlight_spans: usize,
    /// Lines waiting for new highlight spans.
    pub dirty_lines: usize,
    /// Current version.
    pub version: Version,
}

#[derive(Debug, Clone)]
struct Segment {
    span: ArenaSpan,
    style: Style,
    marks: Vec<Mark>,
    newlines: usize,
}

#[derive(Debug, Clone, Copy)]
struct LineEntry {
    pos: LinePos,
    start: usize,
    width: usize,
}

#[derive(Debug, Clone)]
struct LineIndex {
    lines: Vec<LineEntry>,
    bytes: usize,
}

impl LineIndex {
    fn new() -> Self {
        Self {
            lines: vec![LineEntry {
                pos: LinePos { chunk: 0, offset: 0 },
                start: 0,
                width: 0,
            }],
            bytes: 0,
        }
    }

    /// Account for `text` written at `offset` into chunk `chunk`.
    fn extend(&mut self, text: &str, chunk: usize, offset: usize, tab_width: u8) {
        let mut consumed = 0;
        for piece in text.split_inclusive('\n') {
            consumed += piece.len();
            let body = piece.strip_suffix('\n');
            if let Some(last) = self.lines.last_mut() {
                last.width = advance_columns(last.width, body.unwrap_or(piece), tab_width);
            }
            if body.is_some() {
                self.lines.push(LineEntry {
                    pos: LinePos {
                        chunk,
                        offset: offset + consumed,
                    },
                    start: self.bytes + consumed,
                    width: 0,
                });
            }
        }
        self.bytes += text.len();
    }
}

/// Versioned rope of styled chunks with a highlight overlay.
#[derive(Debug)]
pub struct TextBuffer {
    id: u64,
    arena: Arena,
    segments: Vec<Segment>,
    version: Version,
    newlines: usize,
    bytes: usize,
    tab_width: u8,
    index: OnceCell<LineIndex>,
    overlay: Arc<HighlightOverlay>,
    selection: Option<Selection>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            arena: Arena::new(),
            segments: Vec::new(),
            version: 0,
            newlines: 0,
            bytes: 0,
            tab_width: 4,
            index: OnceCell::new(),
            overlay: Arc::new(HighlightOverlay::new()),
            selection: None,
        }
    }

    /// A buffer holding `text` in one unstyled chunk.
    pub fn from_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.set_text(text);
        buffer
    }

    /// Set the tab stop distance used for line widths (builder pattern).
    #[must_use]
    pub fn with_tab_width(mut self, tab_width: u8) -> Self {
        self.tab_width = tab_width.max(1);
        self.index.take();
        self
    }

    /// Identifier used in error reports and metrics.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current version; every mutation increments it.
    #[inline]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Tab stop distance.
    #[inline]
    pub const fn tab_width(&self) -> u8 {
        self.tab_width
    }

    /// Number of chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.segments.len()
    }

    /// Live text bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.bytes
    }

    /// Whether the buffer holds no text.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Number of lines; an empty buffer has one empty line.
    #[inline]
    pub const fn line_count(&self) -> usize {
        self.newlines + 1
    }

    /// The highlight overlay, for sharing with a highlighter.
    pub fn overlay(&self) -> Arc<HighlightOverlay> {
        Arc::clone(&self.overlay)
    }

    /// Handle to the chunk at `index`, valid until the next mutation.
    pub fn chunk_ref(&self, index: usize) -> Option<ChunkRef> {
        (index < self.segments.len()).then_some(ChunkRef {
            index,
            version: self.version,
        })
    }

    /// Text of the chunk behind a handle.
    pub fn chunk_text(&self, chunk: ChunkRef) -> Result<&str> {
        let index = self.check(chunk)?;
        Ok(self.text_of(&self.segments[index]))
    }

    /// Base style of the chunk behind a handle.
    pub fn chunk_style(&self, chunk: ChunkRef) -> Result<Style> {
        let index = self.check(chunk)?;
        Ok(self.segments[index].style)
    }

    /// Insert `chunk` before position `at` (`at == chunk_count()` appends).
    pub fn insert(&mut self, chunk: Chunk, at: usize) -> Result<Version> {
        if at > self.segments.len() {
            tracing::error!(
                buffer = self.id,
                index = at,
                len = self.segments.len(),
                "chunk insert out of range"
            );
            return Err(Error::ChunkOutOfRange {
                buffer: self.id,
                index: at,
                len: self.segments.len(),
            });
        }
        let line = self.line_of_chunk(at);
        let offset = self.offset_of_chunk(at);
        let segment = self.store(&chunk)?;
        let added = segment.newlines;
        let len = segment.span.len();
        self.segments.insert(at, segment);
        self.shift_selection(offset, 0, len);
        self.newlines += added;
        self.bytes += len;
        if len > 0 {
            self.overlay.splice(line, 1, added + 1, self.line_len(line));
        }
        Ok(self.bump())
    }

    /// Remove the chunk behind a handle.
    pub fn remove(&mut self, chunk: ChunkRef) -> Result<Version> {
        let index = self.check(chunk)?;
        let line = self.line_of_chunk(index);
        let offset = self.offset_of_chunk(index);
        let segment = self.segments.remove(index);
        self.newlines -= segment.newlines;
        self.bytes -= segment.span.len();
        self.shift_selection(offset, segment.span.len(), 0);
        if !segment.span.is_empty() {
            self.overlay
                .splice(line, segment.newlines + 1, 1, self.line_len(line));
        }
        Ok(self.bump())
    }

    /// Replace the chunk behind a handle with `chunk`.
    ///
    /// Replacing with byte-identical text only updates style and marks and
    /// leaves highlights untouched. Any other change, even one that keeps the
    /// length, marks the affected lines dirty.
    pub fn replace(&mut self, chunk: Chunk, old: ChunkRef) -> Result<Version> {
        let index = self.check(old)?;
        if self.text_of(&self.segments[index]) == chunk.text {
            let segment = &mut self.segments[index];
            segment.style = chunk.style;
            segment.marks = chunk.marks;
            return Ok(self.bump());
        }
        let line = self.line_of_chunk(index);
        let offset = self.offset_of_chunk(index);
        let segment = self.store(&chunk)?;
        let previous = std::mem::replace(&mut self.segments[index], segment);
        self.shift_selection(offset, previous.span.len(), chunk.text.len());
        let added = self.segments[index].newlines;
        self.newlines = self.newlines - previous.newlines + added;
        self.bytes = self.bytes - previous.span.len() + chunk.text.len();
        self.overlay
            .splice(line, previous.newlines + 1, added + 1, self.line_len(line));
        Ok(self.bump())
    }

    /// Append `chunk` at the end: the streaming hot path.
    ///
    /// A chunk without marks whose style matches the last chunk is merged
    /// into it, growing the arena span in place when it is on top. The line
    /// index, if built, is extended rather than rebuilt.
    pub fn append(&mut self, chunk: Chunk) -> Version {
        if chunk.text.is_empty() {
            return self.version;
        }
        let line = self.newlines;
        let global = self.bytes;
        let added = chunk.text.bytes().filter(|b| *b == b'\n').count();

        let merged = match self.segments.last() {
            Some(last) if chunk.marks.is_empty() && last.marks.is_empty() && last.style == chunk.style => {
                let offset = last.span.len();
                self.arena
                    .extend(last.span, chunk.text.as_bytes())
                    .ok()
                    .map(|span| (span, offset))
            }
            _ => None,
        };
        let (chunk_index, offset) = if let Some((span, offset)) = merged {
            let last = self.segments.len() - 1;
            let segment = &mut self.segments[last];
            segment.span = span;
            segment.newlines += added;
            (last, offset)
        } else {
            let segment = match self.store(&chunk) {
                Ok(segment) => segment,
                Err(error) => {
                    tracing::error!(buffer = self.id, %error, "append dropped");
                    return self.version;
                }
            };
            self.segments.push(segment);
            (self.segments.len() - 1, 0)
        };

        self.newlines += added;
        self.bytes += chunk.text.len();
        self.shift_selection(global, 0, chunk.text.len());
        let tab_width = self.tab_width;
        if let Some(index) = self.index.get_mut() {
            index.extend(&chunk.text, chunk_index, offset, tab_width);
        }
        if added > 0 || !self.overlay.load().is_dirty(line) {
            self.overlay.mark_appended(line, added);
        }
        tracing::trace!(buffer = self.id, bytes = global + chunk.text.len(), "append");
        self.version += 1;
        self.version
    }

    /// Append unstyled text.
    pub fn append_str(&mut self, text: &str) -> Version {
        self.append(Chunk::new(text))
    }

    /// Replace all content with `text`, releasing the arena in bulk.
    pub fn set_text(&mut self, text: &str) -> Version {
        self.arena.reset();
        self.segments.clear();
        self.newlines = 0;
        self.bytes = 0;
        self.selection = None;
        if !text.is_empty() {
            match self.store(&Chunk::new(text)) {
                Ok(segment) => {
                    self.newlines = segment.newlines;
                    self.bytes = text.len();
                    self.segments.push(segment);
                }
                Err(error) => {
                    tracing::error!(buffer = self.id, %error, "text too large, buffer left empty");
                }
            }
        }
        self.overlay.reset(self.line_count());
        self.bump()
    }

    /// Remove all content.
    pub fn clear(&mut self) -> Version {
        self.set_text("")
    }

    /// All text flattened into one string.
    pub fn to_plain_text(&self) -> String {
        let mut text = String::with_capacity(self.bytes);
        for segment in &self.segments {
            text.push_str(self.text_of(segment));
        }
        text
    }

    /// Where line `n` starts.
    pub fn line_at(&self, n: usize) -> Option<LinePos> {
        let entry = self.lines().lines.get(n)?;
        let mut pos = entry.pos;
        // a line starting right after a chunk's final newline starts in the next chunk
        if let Some(segment) = self.segments.get(pos.chunk) {
            if pos.offset == segment.span.len() && pos.chunk + 1 < self.segments.len() {
                pos = LinePos {
                    chunk: pos.chunk + 1,
                    offset: 0,
                };
            }
        }
        Some(pos)
    }

    /// Byte range of line `n` over the whole buffer, newline excluded.
    pub fn line_span(&self, n: usize) -> Option<Range<usize>> {
        let index = self.lines();
        let start = index.lines.get(n)?.start;
        let end = index
            .lines
            .get(n + 1)
            .map_or(index.bytes, |next| next.start - 1);
        Some(start..end)
    }

    /// Text of line `n` without its newline.
    pub fn line_text(&self, n: usize) -> Option<String> {
        self.line_span(n).map(|range| self.text_range(range))
    }

    /// Display width of line `n` in columns, tabs expanded.
    pub fn line_width(&self, n: usize) -> Option<usize> {
        self.lines().lines.get(n).map(|l| l.width)
    }

    /// Widest line in columns.
    pub fn max_line_width(&self) -> usize {
        self.lines().lines.iter().map(|l| l.width).max().unwrap_or(0)
    }

    /// Text of an arbitrary byte range, clamped to the buffer.
    pub fn text_range(&self, range: Range<usize>) -> String {
        let mut text = String::with_capacity(range.len());
        let mut start = 0;
        for segment in &self.segments {
            let end = start + segment.span.len();
            if end > range.start && start < range.end {
                let from = range.start.max(start) - start;
                let to = range.end.min(end) - start;
                text.push_str(self.text_of(segment).get(from..to).unwrap_or_default());
            }
            if end >= range.end {
                break;
            }
            start = end;
        }
        text
    }

    /// Graphemes of line `n` with their effective styles.
    ///
    /// Precedence, lowest first: chunk style, highlight span, inline mark,
    /// selection.
    pub fn styled_line(&self, n: usize) -> Vec<StyledGrapheme<'_>> {
        let Some(range) = self.line_span(n) else {
            return Vec::new();
        };
        let highlights = self.overlay.load();
        let mut graphemes = Vec::new();
        let mut start = 0;
        for segment in &self.segments {
            let end = start + segment.span.len();
            if end <= range.start {
                start = end;
                continue;
            }
            if start >= range.end {
                break;
            }
            let from = range.start.max(start) - start;
            let to = range.end.min(end) - start;
            let text = self.text_of(segment).get(from..to).unwrap_or_default();
            for (i, grapheme) in text.grapheme_indices(true) {
                let local = from + i;
                let global = start + local;
                let offset = global - range.start;
                let mut style = segment.style;
                if let Some(span) = highlights.covering(n, offset) {
                    style = span.style.apply(style);
                }
                for mark in segment.marks.iter().filter(|m| m.range.contains(&local)) {
                    style = mark.style.apply(style);
                }
                if let Some(selection) = self.selection.as_ref().filter(|s| s.range.contains(&global)) {
                    style = selection.style.apply(style);
                }
                graphemes.push(StyledGrapheme {
                    text: grapheme,
                    style,
                    offset,
                });
            }
            start = end;
        }
        graphemes
    }

    /// Select a byte range, clamped to the buffer.
    pub fn set_selection(&mut self, range: Range<usize>, style: StyleOverride) {
        let end = range.end.min(self.bytes);
        let start = range.start.min(end);
        self.selection = Some(Selection {
            range: start..end,
            style,
        });
    }

    /// Drop the selection.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Current selection.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Text under the selection.
    pub fn selected_text(&self) -> Option<String> {
        self.selection
            .as_ref()
            .map(|s| self.text_range(s.range.clone()))
    }

    /// Counters for diagnostics.
    pub fn stats(&self) -> RopeStats {
        let highlights = self.overlay.load();
        RopeStats {
            chunks: self.segments.len(),
            lines: self.line_count(),
            bytes: self.bytes,
            arena: self.arena.stats(),
            highlight_spans: highlights.span_count(),
            dirty_lines: highlights.dirty_count(),
            version: self.version,
        }
    }

    fn lines(&self) -> &LineIndex {
        self.index.get_or_init(|| {
            let mut index = LineIndex::new();
            for (i, segment) in self.segments.iter().enumerate() {
                index.extend(self.text_of(segment), i, 0, self.tab_width);
            }
            tracing::trace!(buffer = self.id, lines = index.lines.len(), "line index rebuilt");
            index
        })
    }

    fn check(&self, chunk: ChunkRef) -> Result<usize> {
        if chunk.version == self.version && chunk.index < self.segments.len() {
            return Ok(chunk.index);
        }
        tracing::error!(
            buffer = self.id,
            index = chunk.index,
            anchor_version = chunk.version,
            current_version = self.version,
            "stale chunk anchor"
        );
        Err(Error::StaleAnchor {
            buffer: self.id,
            index: chunk.index,
            anchor_version: chunk.version,
            current_version: self.version,
        })
    }

    fn store(&mut self, chunk: &Chunk) -> Result<Segment> {
        let len = chunk.text.len();
        let marks = chunk
            .marks
            .iter()
            .filter(|m| m.range.start < m.range.end.min(len))
            .map(|m| Mark::new(m.range.start..m.range.end.min(len), m.style))
            .collect();
        Ok(Segment {
            span: self.arena.alloc(chunk.text.as_bytes())?,
            style: chunk.style,
            marks,
            newlines: chunk.text.bytes().filter(|b| *b == b'\n').count(),
        })
    }

    fn text_of(&self, segment: &Segment) -> &str {
        self.arena.get_str(segment.span).unwrap_or_default()
    }

    fn bump(&mut self) -> Version {
        self.version += 1;
        self.index.take();
        self.version
    }

    /// Byte offset of the start of chunk `index`.
    fn offset_of_chunk(&self, index: usize) -> usize {
        self.segments[..index.min(self.segments.len())]
            .iter()
            .map(|s| s.span.len())
            .sum()
    }

    /// Move the selection across an edit at byte `at` that replaced
    /// `removed` bytes with `inserted` bytes.
    ///
    /// Text inserted at the selection start lands before it; text inserted
    /// at its end stays outside. A selection swallowed by a deletion
    /// collapses to the edit point.
    fn shift_selection(&mut self, at: usize, removed: usize, inserted: usize) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };
        let Range { start, end } = selection.range;
        let gone = at + removed;
        let start = if start < at {
            start
        } else if start >= gone {
            start - removed + inserted
        } else {
            at + inserted
        };
        let end = if end <= at {
            end
        } else if end >= gone {
            end - removed + inserted
        } else {
            at
        };
        selection.range = start..end.max(start);
    }

    /// Line containing the start of chunk `index`.
    fn line_of_chunk(&self, index: usize) -> usize {
        self.segments[..index.min(self.segments.len())]
            .iter()
            .map(|s| s.newlines)
            .sum()
    }

    /// Byte length of `line`, computed by walking chunks.
    fn line_len(&self, line: usize) -> usize {
        let mut skip = line;
        let mut len = 0;
        for segment in &self.segments {
            let mut text = self.text_of(segment);
            if skip > 0 {
                if segment.newlines < skip {
                    skip -= segment.newlines;
                    continue;
                }
                let cut = text
                    .match_indices('\n')
                    .nth(skip - 1)
                    .map_or(text.len(), |(i, _)| i + 1);
                text = &text[cut..];
                skip = 0;
            }
            match text.find('\n') {
                Some(end) => return len + end,
                None => len += text.len(),
            }
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Modifiers, Rgb};
    use crate::text::HighlightSpan;

    fn red() -> Style {
        Style::fg(Rgb::new(255, 0, 0))
    }

    #[test]
    fn test_hello_world_stream() {
        let mut buffer = TextBuffer::new();
        buffer.insert(Chunk::new("Hello"), 0).unwrap();
        buffer.append(Chunk::new(", world"));
        assert_eq!(buffer.to_plain_text(), "Hello, world");
        assert_eq!(buffer.chunk_count(), 1);
        assert_eq!(buffer.line_at(0), Some(LinePos { chunk: 0, offset: 0 }));
        assert_eq!(buffer.line_span(0), Some(0..12));
        // grown in place: no dead bytes
        assert_eq!(buffer.stats().arena.used_bytes, 12);
    }

    #[test]
    fn test_append_with_new_style_starts_a_chunk() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::new("plain "));
        buffer.append(Chunk::styled("red", red()));
        buffer.append(Chunk::styled(" more", red()));
        assert_eq!(buffer.chunk_count(), 2);
        assert_eq!(buffer.to_plain_text(), "plain red more");
    }

    #[test]
    fn test_versions_increase() {
        let mut buffer = TextBuffer::new();
        let v1 = buffer.insert(Chunk::new("a"), 0).unwrap();
        let v2 = buffer.insert(Chunk::new("b"), 1).unwrap();
        let r = buffer.chunk_ref(0).unwrap();
        let v3 = buffer.remove(r).unwrap();
        assert!(v1 < v2 && v2 < v3);
        assert_eq!(buffer.to_plain_text(), "b");
    }

    #[test]
    fn test_stale_anchor_is_rejected() {
        let mut buffer = TextBuffer::from_text("abc");
        let anchor = buffer.chunk_ref(0).unwrap();
        buffer.append(Chunk::styled("x", red()));
        let err = buffer.remove(anchor).unwrap_err();
        match err {
            Error::StaleAnchor {
                anchor_version,
                current_version,
                ..
            } => assert!(anchor_version < current_version),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(buffer.to_plain_text(), "abcx");
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut buffer = TextBuffer::new();
        assert!(matches!(
            buffer.insert(Chunk::new("x"), 3),
            Err(Error::ChunkOutOfRange { index: 3, len: 0, .. })
        ));
    }

    #[test]
    fn test_replace_is_idempotent() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::new("one "));
        buffer.append(Chunk::styled("two", red()));
        buffer.append(Chunk::new(" three"));

        let replacement = Chunk::styled("2", red());
        buffer
            .replace(replacement.clone(), buffer.chunk_ref(1).unwrap())
            .unwrap();
        let once = buffer.to_plain_text();
        buffer
            .replace(replacement, buffer.chunk_ref(1).unwrap())
            .unwrap();
        assert_eq!(buffer.to_plain_text(), once);
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(once, "one 2 three");
    }

    #[test]
    fn test_line_index() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::new("ab\ncd"));
        buffer.append(Chunk::styled("ef\n", red()));
        buffer.append(Chunk::new("gh"));
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.line_text(0).as_deref(), Some("ab"));
        assert_eq!(buffer.line_text(1).as_deref(), Some("cdef"));
        assert_eq!(buffer.line_text(2).as_deref(), Some("gh"));
        assert_eq!(buffer.line_at(1), Some(LinePos { chunk: 0, offset: 3 }));
        // line 2 starts at the end of chunk 1, i.e. the start of chunk 2
        assert_eq!(buffer.line_at(2), Some(LinePos { chunk: 2, offset: 0 }));
        assert_eq!(buffer.line_at(3), None);
    }

    #[test]
    fn test_line_index_extends_on_append() {
        let mut buffer = TextBuffer::new();
        buffer.append_str("first\nsec");
        assert_eq!(buffer.line_width(1), Some(3));
        buffer.append_str("ond\nthird");
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.line_width(1), Some(6));
        assert_eq!(buffer.line_text(2).as_deref(), Some("third"));
    }

    #[test]
    fn test_line_width_counts_wide_and_tabs() {
        let buffer = TextBuffer::from_text("日本\n\tx").with_tab_width(4);
        assert_eq!(buffer.line_width(0), Some(4));
        assert_eq!(buffer.line_width(1), Some(5));
        assert_eq!(buffer.max_line_width(), 5);
    }

    #[test]
    fn test_set_text_resets_arena() {
        let mut buffer = TextBuffer::from_text("some text");
        buffer.append(Chunk::styled("!", red()));
        buffer.set_text("new");
        let stats = buffer.stats();
        assert_eq!(stats.arena.used_bytes, 3);
        assert_eq!(stats.arena.resets, 2);
        assert_eq!(stats.chunks, 1);
        assert_eq!(buffer.to_plain_text(), "new");
    }

    #[test]
    fn test_edit_marks_line_dirty() {
        let mut buffer = TextBuffer::from_text("let x = 1;\nlet y = 2;");
        let overlay = buffer.overlay();
        overlay
            .publish_batch(vec![
                (0, vec![HighlightSpan::new(0..3, StyleOverride::modifiers(Modifiers::BOLD))]),
                (1, vec![HighlightSpan::new(0..3, StyleOverride::modifiers(Modifiers::BOLD))]),
            ])
            .unwrap();
        assert_eq!(buffer.stats().dirty_lines, 0);

        buffer.append_str(" // done");
        let snapshot = overlay.load();
        assert!(snapshot.is_dirty(1));
        assert!(!snapshot.is_dirty(0));
    }

    #[test]
    fn test_identical_replace_keeps_highlights_clean() {
        let mut buffer = TextBuffer::from_text("abc");
        let overlay = buffer.overlay();
        overlay
            .publish(0, vec![HighlightSpan::new(0..3, StyleOverride::modifiers(Modifiers::BOLD))])
            .unwrap();
        buffer
            .replace(Chunk::styled("abc", red()), buffer.chunk_ref(0).unwrap())
            .unwrap();
        assert!(!overlay.load().is_dirty(0));

        // same length, different bytes
        buffer
            .replace(Chunk::new("xyz"), buffer.chunk_ref(0).unwrap())
            .unwrap();
        assert!(overlay.load().is_dirty(0));
        assert_eq!(overlay.load().line(0).unwrap().len(), 1);
    }

    #[test]
    fn test_deletion_clips_spans_to_line_length() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::new("hello"));
        buffer.append(Chunk::styled(" world", red()));
        let overlay = buffer.overlay();
        let bold = StyleOverride::modifiers(Modifiers::BOLD);
        overlay
            .publish(0, vec![HighlightSpan::new(0..2, bold), HighlightSpan::new(4..11, bold)])
            .unwrap();
        buffer.remove(buffer.chunk_ref(1).unwrap()).unwrap();
        let snapshot = overlay.load();
        let spans = snapshot.line(0).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].end, 5);
    }

    #[test]
    fn test_inserted_lines_shift_highlights() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::new("a\n"));
        buffer.append(Chunk::styled("b\n", red()));
        buffer.append(Chunk::new("c"));
        let overlay = buffer.overlay();
        let bold = StyleOverride::modifiers(Modifiers::BOLD);
        overlay
            .publish_batch((0..3).map(|l| (l, vec![HighlightSpan::new(0..1, bold)])).collect())
            .unwrap();
        buffer.insert(Chunk::styled("x\ny\n", red()), 1).unwrap();
        assert_eq!(buffer.line_text(4).as_deref(), Some("c"));
        let snapshot = overlay.load();
        assert!(snapshot.line(4).is_some());
        assert!(!snapshot.is_dirty(4));
        assert_eq!(snapshot.dirty_lines().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_style_precedence() {
        let mut buffer = TextBuffer::new();
        let chunk = Chunk::styled("abcd", red()).with_mark(2..4, StyleOverride::fg(Rgb::new(0, 0, 255)));
        buffer.append(chunk);
        buffer
            .overlay()
            .publish(0, vec![HighlightSpan::new(1..3, StyleOverride::fg(Rgb::new(0, 255, 0)))])
            .unwrap();
        let fgs: Vec<_> = buffer.styled_line(0).iter().map(|g| g.style.fg.rgb()).collect();
        assert_eq!(
            fgs,
            vec![
                Rgb::new(255, 0, 0),
                Rgb::new(0, 255, 0),
                Rgb::new(0, 0, 255),
                Rgb::new(0, 0, 255),
            ]
        );
    }

    #[test]
    fn test_selection() {
        let mut buffer = TextBuffer::from_text("hello\nworld");
        buffer.set_selection(3..8, StyleOverride::modifiers(Modifiers::REVERSED));
        assert_eq!(buffer.selected_text().as_deref(), Some("lo\nwo"));
        let line1 = buffer.styled_line(1);
        assert!(line1[0].style.modifiers.contains(Modifiers::REVERSED));
        assert!(!line1[2].style.modifiers.contains(Modifiers::REVERSED));
        buffer.clear_selection();
        assert!(buffer.selection().is_none());
    }

    #[test]
    fn test_selection_follows_edits() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::styled("ab", red()));
        buffer.append_str("hello");
        buffer.set_selection(2..7, StyleOverride::modifiers(Modifiers::REVERSED));

        buffer.insert(Chunk::new(">>"), 0).unwrap();
        assert_eq!(buffer.selected_text().as_deref(), Some("hello"));

        buffer.append_str("!");
        assert_eq!(buffer.selection().unwrap().range, 4..9);

        let anchor = buffer.chunk_ref(1).unwrap();
        buffer.replace(Chunk::new("x"), anchor).unwrap();
        assert_eq!(buffer.selected_text().as_deref(), Some("hello"));

        let anchor = buffer.chunk_ref(0).unwrap();
        buffer.remove(anchor).unwrap();
        assert_eq!(buffer.selection().unwrap().range, 1..6);
        assert_eq!(buffer.selected_text().as_deref(), Some("hello"));
    }

    #[test]
    fn test_selection_collapses_when_its_text_is_removed() {
        let mut buffer = TextBuffer::new();
        buffer.append(Chunk::styled("ab", red()));
        buffer.append_str("cd");
        buffer.set_selection(2..4, StyleOverride::modifiers(Modifiers::REVERSED));
        let anchor = buffer.chunk_ref(1).unwrap();
        buffer.remove(anchor).unwrap();
        assert_eq!(buffer.selection().unwrap().range, 2..2);
        assert_eq!(buffer.selected_text().as_deref(), Some(""));
    }

    #[test]
    fn test_streaming_append_keeps_overlay_compact() {
        let mut buffer = TextBuffer::new();
        let overlay = buffer.overlay();
        overlay
            .publish(0, vec![HighlightSpan::new(0..1, StyleOverride::modifiers(Modifiers::BOLD))])
            .unwrap();
        for _ in 0..10_000 {
            buffer.append_str("line\n");
        }
        let snapshot = overlay.load();
        assert_eq!(snapshot.dirty_count(), 10_001);
        assert_eq!(snapshot.dirty_ranges(), 1);
        assert_eq!(snapshot.span_count(), 1);
        assert_eq!(buffer.stats().dirty_lines, 10_001);
    }
}
