//! Error types for the engine.
//!
//! Protocol timeouts and malformed terminal input are never errors: they
//! degrade to defaults inside the terminal layer. What surfaces here is
//! resource misuse by the adapter (stale handles, destroyed nodes), invalid
//! requests (degenerate sizes, malformed highlight spans) and I/O.

use crate::scene::NodeId;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the engine reports to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer was asked to take a zero-sized shape.
    #[error("invalid dimensions {width}x{height}; keeping {kept_width}x{kept_height}")]
    InvalidDimensions {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
        /// Width the buffer kept.
        kept_width: u16,
        /// Height the buffer kept.
        kept_height: u16,
    },

    /// A node handle refers to a slot that has since been reused or freed.
    #[error("stale node handle {0:?}")]
    StaleNode(NodeId),

    /// A node was mutated after `destroy()` returned.
    #[error("node {0:?} was destroyed")]
    NodeDestroyed(NodeId),

    /// A tree operation would break the ownership structure.
    #[error("invalid tree operation on {node:?}: {reason}")]
    InvalidTree {
        /// Node the operation was applied to.
        node: NodeId,
        /// What went wrong.
        reason: &'static str,
    },

    /// A chunk anchor was taken at an older buffer version.
    #[error(
        "stale chunk anchor into buffer {buffer}: index {index} at version {anchor_version}, buffer is at version {current_version}"
    )]
    StaleAnchor {
        /// Buffer identifier.
        buffer: u64,
        /// Chunk index carried by the anchor.
        index: usize,
        /// Version the anchor was taken at.
        anchor_version: u64,
        /// Version the buffer is at now.
        current_version: u64,
    },

    /// A chunk position past the end of a text buffer.
    #[error("chunk index {index} out of range for buffer {buffer} with {len} chunks")]
    ChunkOutOfRange {
        /// Buffer identifier.
        buffer: u64,
        /// Requested index.
        index: usize,
        /// Number of chunks in the buffer.
        len: usize,
    },

    /// An arena span outlived a reset of its arena.
    #[error("arena span from epoch {span_epoch} used after reset (arena epoch {arena_epoch})")]
    StaleSpan {
        /// Epoch recorded in the span.
        span_epoch: u32,
        /// Current arena epoch.
        arena_epoch: u32,
    },

    /// An arena allocation would pass the arena's addressable limit.
    #[error("arena full: {requested} more bytes on top of {used} exceeds the {limit} byte limit")]
    ArenaFull {
        /// Bytes the allocation needed.
        requested: usize,
        /// Bytes already in use.
        used: usize,
        /// Most bytes the arena may hold.
        limit: usize,
    },

    /// A grapheme pool handle was freed twice or never allocated.
    #[error("grapheme slot {slot} in class {class} is not live")]
    StaleGrapheme {
        /// Size class index.
        class: u8,
        /// Slot within the class.
        slot: u32,
    },

    /// Highlight spans for a line were unsorted or overlapping.
    #[error("invalid highlight spans for line {line}: {reason}")]
    InvalidHighlight {
        /// Line number the spans were published for.
        line: usize,
        /// What was wrong with them.
        reason: &'static str,
    },

    /// A property name the node kind does not understand.
    #[error("node {node:?} has no property {name:?}")]
    UnknownProperty {
        /// Target node.
        node: NodeId,
        /// Property name.
        name: String,
    },

    /// A property value of the wrong type.
    #[error("property {name:?} expects {expected}")]
    PropertyType {
        /// Property name.
        name: String,
        /// Human readable type expectation.
        expected: &'static str,
    },

    /// Terminal or writer I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
