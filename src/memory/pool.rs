//! Grapheme pool: Size-classed slot storage for long grapheme clusters.
//!
//! Cells keep up to four UTF-8 bytes inline. Anything longer (ZWJ emoji,
//! flags, stacked combining marks) is copied into a slot of the smallest
//! size class that fits and the cell stores a [`GraphemeId`] instead.
//!
//! ```text
//! class:   0     1     2     3     4      5
//! bytes:   8    16    32    64   128    256
//! ```
//!
//! Slots are never shared: each cell holding a pooled grapheme owns its own
//! slot, and freeing it pushes the slot back onto its class freelist.
//! Classes grow one page at a time and never shrink.

use crate::error::{Error, Result};

/// Slot sizes of the size classes, in bytes.
pub const CLASS_SIZES: [usize; 6] = [8, 16, 32, 64, 128, 256];

/// Slots added to a class each time its freelist runs dry.
pub const SLOTS_PER_PAGE: usize = 64;

const SLOT_BITS: u32 = 28;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

/// Stored instead of graphemes that do not fit the largest class.
const REPLACEMENT: &str = "\u{FFFD}";

/// Handle to a pooled grapheme: a size class plus a slot index.
///
/// Packs into a `u32` (class in the top four bits) so it fits in a cell's
/// inline grapheme bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GraphemeId(u32);

impl GraphemeId {
    const fn new(class: u8, slot: u32) -> Self {
        Self(((class as u32) << SLOT_BITS) | (slot & SLOT_MASK))
    }

    /// Size class index.
    #[inline]
    pub const fn class(self) -> u8 {
        (self.0 >> SLOT_BITS) as u8
    }

    /// Slot index within the class.
    #[inline]
    pub const fn slot(self) -> u32 {
        self.0 & SLOT_MASK
    }

    /// Raw packed value.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from [`to_bits`](Self::to_bits).
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

/// Counters for a single size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassStats {
    /// Slot size in bytes.
    pub slot_size: usize,
    /// Slots holding a grapheme.
    pub used: usize,
    /// Slots ever created for this class.
    pub total: usize,
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Per-class counters, smallest class first.
    pub classes: Vec<ClassStats>,
    /// Allocations since creation.
    pub allocs: u64,
    /// Frees since creation.
    pub frees: u64,
    /// Frees refused because the slot was not live.
    pub rejected_frees: u64,
}

impl PoolStats {
    /// Slots in use across all classes.
    pub fn used_slots(&self) -> usize {
        self.classes.iter().map(|c| c.used).sum()
    }

    /// Slots created across all classes.
    pub fn total_slots(&self) -> usize {
        self.classes.iter().map(|c| c.total).sum()
    }
}

#[derive(Debug)]
struct SizeClass {
    slot_size: usize,
    storage: Vec<u8>,
    lens: Vec<u16>,
    live: Vec<bool>,
    free: Vec<u32>,
}

impl SizeClass {
    const fn new(slot_size: usize) -> Self {
        Self {
            slot_size,
            storage: Vec::new(),
            lens: Vec::new(),
            live: Vec::new(),
            free: Vec::new(),
        }
    }

    fn total(&self) -> usize {
        self.live.len()
    }

    fn grow(&mut self) {
        let start = self.live.len();
        self.storage.resize((start + SLOTS_PER_PAGE) * self.slot_size, 0);
        self.lens.resize(start + SLOTS_PER_PAGE, 0);
        self.live.resize(start + SLOTS_PER_PAGE, false);
        // reversed so low slots are handed out first
        self.free
            .extend((start..start + SLOTS_PER_PAGE).rev().map(|s| s as u32));
    }

    fn bytes(&self, slot: usize) -> &[u8] {
        let start = slot * self.slot_size;
        &self.storage[start..start + self.lens[slot] as usize]
    }
}

/// Size-classed pool of grapheme slots.
#[derive(Debug)]
pub struct GraphemePool {
    classes: Vec<SizeClass>,
    allocs: u64,
    frees: u64,
    rejected_frees: u64,
}

impl Default for GraphemePool {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphemePool {
    /// Create a pool with no slots allocated yet.
    pub fn new() -> Self {
        Self {
            classes: CLASS_SIZES.iter().map(|&size| SizeClass::new(size)).collect(),
            allocs: 0,
            frees: 0,
            rejected_frees: 0,
        }
    }

    /// Index of the smallest class that holds `len` bytes.
    pub fn class_for(len: usize) -> Option<u8> {
        CLASS_SIZES.iter().position(|&size| size >= len).map(|i| i as u8)
    }

    /// Copy a grapheme into a fresh slot.
    ///
    /// Never fails: an empty freelist grows the class by one page, and
    /// graphemes longer than the largest class are stored as U+FFFD.
    pub fn alloc(&mut self, grapheme: &str) -> GraphemeId {
        let bytes = if Self::class_for(grapheme.len()).is_some() {
            grapheme.as_bytes()
        } else {
            tracing::debug!(len = grapheme.len(), "grapheme exceeds largest size class");
            REPLACEMENT.as_bytes()
        };
        let class_idx = Self::class_for(bytes.len()).unwrap_or(0);
        let class = &mut self.classes[class_idx as usize];
        if class.free.is_empty() {
            class.grow();
            tracing::trace!(
                class = class_idx,
                total = class.total(),
                "grapheme pool class grew"
            );
        }
        let slot = class.free.pop().unwrap_or_default();
        let start = slot as usize * class.slot_size;
        class.storage[start..start + bytes.len()].copy_from_slice(bytes);
        class.lens[slot as usize] = bytes.len() as u16;
        class.live[slot as usize] = true;
        self.allocs += 1;
        GraphemeId::new(class_idx, slot)
    }

    /// Return a slot to its class freelist.
    pub fn free(&mut self, id: GraphemeId) -> Result<()> {
        let class = match self.live_class_mut(id) {
            Ok(class) => class,
            Err(error) => {
                self.rejected_frees += 1;
                return Err(error);
            }
        };
        class.live[id.slot() as usize] = false;
        class.lens[id.slot() as usize] = 0;
        class.free.push(id.slot());
        self.frees += 1;
        Ok(())
    }

    /// Borrow the grapheme in a live slot.
    pub fn get(&self, id: GraphemeId) -> Option<&str> {
        let class = self.classes.get(id.class() as usize)?;
        let slot = id.slot() as usize;
        if !class.live.get(slot).copied().unwrap_or(false) {
            return None;
        }
        std::str::from_utf8(class.bytes(slot)).ok()
    }

    /// Copy a live grapheme into a second, independent slot.
    pub fn duplicate(&mut self, id: GraphemeId) -> Result<GraphemeId> {
        let text = self
            .get(id)
            .map(str::to_owned)
            .ok_or(Error::StaleGrapheme {
                class: id.class(),
                slot: id.slot(),
            })?;
        Ok(self.alloc(&text))
    }

    /// Whether a handle currently refers to a live slot.
    pub fn is_live(&self, id: GraphemeId) -> bool {
        self.classes
            .get(id.class() as usize)
            .and_then(|c| c.live.get(id.slot() as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Snapshot of the per-class counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            classes: self
                .classes
                .iter()
                .map(|c| ClassStats {
                    slot_size: c.slot_size,
                    used: c.total() - c.free.len(),
                    total: c.total(),
                })
                .collect(),
            allocs: self.allocs,
            frees: self.frees,
            rejected_frees: self.rejected_frees,
        }
    }

    fn live_class_mut(&mut self, id: GraphemeId) -> Result<&mut SizeClass> {
        let stale = Error::StaleGrapheme {
            class: id.class(),
            slot: id.slot(),
        };
        let Some(class) = self.classes.get_mut(id.class() as usize) else {
            return Err(stale);
        };
        if class.live.get(id.slot() as usize).copied().unwrap_or(false) {
            Ok(class)
        } else {
            Err(stale)
        }
    }
}
