//! Memory module: Bulk-released storage backing text and cells.
//!
//! - [`Arena`]: bump region owned by each text buffer; reset releases
//!   everything at once.
//! - [`GraphemePool`]: size-classed slots for grapheme clusters that do not
//!   fit inline in a [`Cell`](crate::Cell).
//!
//! Neither is a global. Every engine owns its own instances so that tests
//! and multiple engines never share state.

mod arena;
mod pool;

pub use arena::{Arena, ArenaSpan, ArenaStats, MAX_BYTES};
pub use pool::{ClassStats, GraphemeId, GraphemePool, PoolStats, CLASS_SIZES, SLOTS_PER_PAGE};
