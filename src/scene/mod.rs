//! Scene module: The retained node tree and its paint pipeline.
//!
//! This module contains:
//! - [`SceneGraph`]: Generational slab of nodes, tree edits, focus and the
//!   event queue
//! - [`Node`] / [`NodeKind`]: Nodes and the closed set of kinds, configured
//!   through string-keyed [`PropValue`] properties
//! - [`Renderable`]: The measure/paint/hit-test capability of each kind
//! - [`paint_scene`]: The z-sorted, clipped, opacity-multiplying walk

mod events;
mod graph;
mod node;
mod paint;
mod render;

pub use events::{Event, EventContext, EventKind, Handler, HandlerId};
pub use graph::SceneGraph;
pub use node::{Geometry, Node, NodeId, NodeKind, NodeState, PropValue};
pub use paint::{paint_scene, PaintOutcome};
pub use render::{BoxNode, FrameBufferNode, PaintContext, Renderable, ScrollBoxNode, TextNode};
