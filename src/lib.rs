//! # Tessera
//!
//! A retained-mode terminal rendering engine.
//!
//! Tessera turns a tree of styled nodes into minimal escape-sequence output
//! and carries live rich text (streaming, editable, syntax-highlighted)
//! inside that tree.
//!
//! ## Core Concepts
//!
//! - **Scene graph**: Generational node handles, string-keyed properties,
//!   z-sorted paint walk with clipping and multiplicative opacity
//! - **Double-buffered cells**: Back grid composited per frame, diffed into
//!   runs against the front grid, written in one call
//! - **Chunked text**: Versioned chunk anchors over an arena, with a
//!   highlight overlay published one line at a time
//! - **Terminal layer**: Input decoding, timed palette interrogation and a
//!   session guard that always restores the terminal
//!
//! ## Example
//!
//! ```rust,no_run
//! use tessera::{Engine, EngineConfig, NodeKind};
//!
//! let mut engine = Engine::headless(80, 24, EngineConfig::default())?;
//! let text = engine.create_node(NodeKind::Text);
//! let root = engine.scene().root();
//! engine.add_child(root, text, None)?;
//! engine.text_mut(text)?.append_str("Hello");
//! engine.render_once()?;
//! assert_eq!(engine.capture_frame().lines().next(), Some("Hello"));
//! # Ok::<(), tessera::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod memory;
pub mod scene;
pub mod terminal;
pub mod text;

// Re-exports for convenience
pub use buffer::{BorderStyle, Cell, CellBuffer, CellFlags, FrameSnapshot, Layer, Modifiers, Rgb, Rgba, Style};
pub use config::{EngineConfig, PaletteConfig, PaletteMode};
pub use engine::{Engine, FrameStats, NativeMetrics};
pub use error::{Error, Result};
pub use layout::{AbsoluteLayout, Bounds, LayoutMap, LayoutProvider, Rect};
pub use scene::{Event, EventKind, NodeId, NodeKind, PropValue, Renderable, SceneGraph};
pub use terminal::{Capabilities, InputEvent, KeyCode, KeyModifiers, KeyboardFlags, Palette, PaletteSupport};
pub use text::{Chunk, ChunkRef, HighlightSpan, Highlighter, TextBuffer, WrapMode};
