//! Arena: Bump-allocated byte region for rope chunk storage.
//!
//! Allocations only ever move the high-water mark forward. Nothing is freed
//! individually; the whole region is either dropped with its owner or reset
//! when the owner replaces all of its content. Spans carry the epoch they
//! were allocated in, so a span that survives a reset is detected on use
//! instead of silently reading someone else's bytes.
//!
//! Offsets are stored as `u32`, so one arena holds at most [`MAX_BYTES`].

use crate::error::{Error, Result};

/// Most bytes a single arena can address.
pub const MAX_BYTES: usize = u32::MAX as usize;

/// A byte range inside an [`Arena`], valid until the arena is reset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ArenaSpan {
    offset: u32,
    len: u32,
    epoch: u32,
}

impl ArenaSpan {
    /// An empty span that is valid in every epoch.
    pub const EMPTY: Self = Self {
        offset: 0,
        len: 0,
        epoch: u32::MAX,
    };

    /// Length in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the span covers no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of the span inside the arena.
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset as usize
    }

    const fn end(&self) -> usize {
        self.offset as usize + self.len as usize
    }
}

/// Live counters for one arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out since the last reset.
    pub used_bytes: usize,
    /// Bytes reserved by the backing allocation.
    pub capacity_bytes: usize,
    /// Largest `used_bytes` ever observed.
    pub high_water: usize,
    /// Number of resets.
    pub resets: u64,
}

/// A monotonically growing byte region.
#[derive(Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    epoch: u32,
    high_water: usize,
    resets: u64,
    limit: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    /// Create an empty arena.
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            epoch: 0,
            high_water: 0,
            resets: 0,
            limit: MAX_BYTES,
        }
    }

    /// Create an arena that refuses to hold more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.min(MAX_BYTES),
            ..Self::new()
        }
    }

    /// Create an arena with room for `capacity` bytes before it grows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Copy `data` into the arena and return its span.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArenaFull`] when the arena would pass its limit.
    pub fn alloc(&mut self, data: &[u8]) -> Result<ArenaSpan> {
        if data.is_empty() {
            return Ok(ArenaSpan::EMPTY);
        }
        self.ensure_room(data.len())?;
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(data);
        self.high_water = self.high_water.max(self.bytes.len());
        self.span_at(offset, data.len())
    }

    /// Grow `span` by `data`.
    ///
    /// When the span ends at the high-water mark the bytes are appended in
    /// place. Otherwise the span's content is copied to the top of the
    /// arena first; the old bytes stay dead until the next reset.
    pub fn extend(&mut self, span: ArenaSpan, data: &[u8]) -> Result<ArenaSpan> {
        if span.is_empty() {
            return self.alloc(data);
        }
        self.check(span)?;
        let len = span.len() + data.len();
        if span.end() == self.bytes.len() {
            self.ensure_room(data.len())?;
            self.bytes.extend_from_slice(data);
            self.high_water = self.high_water.max(self.bytes.len());
            return self.span_at(span.offset(), len);
        }
        self.ensure_room(len)?;
        let offset = self.bytes.len();
        self.bytes.extend_from_within(span.offset()..span.end());
        self.bytes.extend_from_slice(data);
        self.high_water = self.high_water.max(self.bytes.len());
        self.span_at(offset, len)
    }

    /// Borrow the bytes behind a span.
    pub fn get(&self, span: ArenaSpan) -> Result<&[u8]> {
        if span.is_empty() {
            return Ok(&[]);
        }
        self.check(span)?;
        Ok(&self.bytes[span.offset()..span.end()])
    }

    /// Borrow the bytes behind a span as text.
    ///
    /// Spans are only ever created from `&str` data by the text layer, so
    /// invalid UTF-8 means the span was forged or cut mid-character.
    pub fn get_str(&self, span: ArenaSpan) -> Result<&str> {
        let bytes = self.get(span)?;
        Ok(std::str::from_utf8(bytes).unwrap_or("\u{FFFD}"))
    }

    /// Invalidate every span and start again from offset zero.
    ///
    /// The backing allocation is kept for reuse.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.epoch = self.epoch.wrapping_add(1);
        // EMPTY spans use u32::MAX as a wildcard epoch
        if self.epoch == u32::MAX {
            self.epoch = 0;
        }
        self.resets += 1;
    }

    /// Bytes handed out since the last reset.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Current epoch.
    #[inline]
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Snapshot of the arena counters.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            used_bytes: self.bytes.len(),
            capacity_bytes: self.bytes.capacity(),
            high_water: self.high_water,
            resets: self.resets,
        }
    }

    fn ensure_room(&self, requested: usize) -> Result<()> {
        let used = self.bytes.len();
        if used.checked_add(requested).is_some_and(|end| end <= self.limit) {
            return Ok(());
        }
        tracing::error!(requested, used, limit = self.limit, "arena full");
        Err(Error::ArenaFull {
            requested,
            used,
            limit: self.limit,
        })
    }

    fn span_at(&self, offset: usize, len: usize) -> Result<ArenaSpan> {
        let full = || Error::ArenaFull {
            requested: len,
            used: self.bytes.len(),
            limit: self.limit,
        };
        Ok(ArenaSpan {
            offset: u32::try_from(offset).map_err(|_| full())?,
            len: u32::try_from(len).map_err(|_| full())?,
            epoch: self.epoch,
        })
    }

    fn check(&self, span: ArenaSpan) -> Result<()> {
        if span.epoch != self.epoch || span.end() > self.bytes.len() {
            return Err(Error::StaleSpan {
                span_epoch: span.epoch,
                arena_epoch: self.epoch,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut arena = Arena::new();
        let a = arena.alloc(b"hello").unwrap();
        let b = arena.alloc(b"world").unwrap();
        assert_eq!(arena.get(a).unwrap(), b"hello");
        assert_eq!(arena.get(b).unwrap(), b"world");
        assert_eq!(arena.used_bytes(), 10);
    }

    #[test]
    fn test_extend_in_place() {
        let mut arena = Arena::new();
        let a = arena.alloc(b"Hello").unwrap();
        let a = arena.extend(a, b", world").unwrap();
        assert_eq!(arena.get_str(a).unwrap(), "Hello, world");
        assert_eq!(arena.used_bytes(), 12);
    }

    #[test]
    fn test_extend_relocates_when_not_on_top() {
        let mut arena = Arena::new();
        let a = arena.alloc(b"ab").unwrap();
        let _b = arena.alloc(b"cd").unwrap();
        let a = arena.extend(a, b"e").unwrap();
        assert_eq!(arena.get_str(a).unwrap(), "abe");
        // old copy stays dead until reset
        assert_eq!(arena.used_bytes(), 7);
    }

    #[test]
    fn test_reset_invalidates_spans() {
        let mut arena = Arena::new();
        let a = arena.alloc(b"hello").unwrap();
        arena.reset();
        assert_eq!(arena.used_bytes(), 0);
        assert!(matches!(arena.get(a), Err(Error::StaleSpan { .. })));
        // empty spans survive resets
        assert_eq!(arena.get(ArenaSpan::EMPTY).unwrap(), b"");
    }

    #[test]
    fn test_limit_refuses_growth() {
        let mut arena = Arena::with_limit(8);
        let a = arena.alloc(b"hello").unwrap();
        assert!(matches!(
            arena.alloc(b"world"),
            Err(Error::ArenaFull { requested: 5, used: 5, limit: 8 })
        ));
        assert!(matches!(arena.extend(a, b", world"), Err(Error::ArenaFull { .. })));
        let a = arena.extend(a, b"!!!").unwrap();
        assert_eq!(arena.get_str(a).unwrap(), "hello!!!");
        assert_eq!(arena.used_bytes(), 8);
        arena.reset();
        assert!(arena.alloc(b"12345678").is_ok());
    }

    #[test]
    fn test_stats_track_high_water() {
        let mut arena = Arena::with_capacity(64);
        arena.alloc(&[0; 40]).unwrap();
        arena.reset();
        arena.alloc(&[0; 8]).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.used_bytes, 8);
        assert_eq!(stats.high_water, 40);
        assert_eq!(stats.resets, 1);
        assert!(stats.capacity_bytes >= 40);
    }
}
