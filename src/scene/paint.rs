//! Paint walk: Depth-first over the scene, compositing into the back grid.

use super::graph::SceneGraph;
use super::node::{Node, NodeId};
use super::render::PaintContext;
use crate::buffer::{CellBuffer, Layer};
use crate::layout::{LayoutMap, Rect};

/// What one paint walk produced.
#[derive(Debug, Clone, Default)]
pub struct PaintOutcome {
    /// Nodes that painted.
    pub painted: usize,
    /// Hit-grid ids to nodes: id `n` is `hits[n - 1]`.
    pub hits: Vec<NodeId>,
}

impl PaintOutcome {
    /// Node registered under a hit-grid id.
    pub fn node_for_hit(&self, id: u32) -> Option<NodeId> {
        self.hits.get((id as usize).checked_sub(1)?).copied()
    }
}

struct Walk<'a> {
    scene: &'a SceneGraph,
    layout: &'a LayoutMap,
    cells: &'a mut CellBuffer,
    outcome: PaintOutcome,
}

impl Walk<'_> {
    fn visit(&mut self, id: NodeId, parent_z: i32, parent_opacity: f32, clip: Rect) {
        let scene = self.scene;
        let Some(node) = scene.node(id) else {
            return;
        };
        if !node.is_visible() {
            return;
        }
        let Some(bounds) = self.layout.get(id) else {
            tracing::trace!(node = ?id, "no layout; skipped");
            return;
        };
        let z = parent_z.saturating_add(node.z_index());
        let opacity = parent_opacity * node.opacity();
        if opacity <= 0.0 {
            return;
        }

        let renderable = node.renderable();
        let mut ctx = PaintContext {
            cells: &mut *self.cells,
            bounds,
            layer: Layer::new(z, opacity, clip),
        };
        renderable.paint(&mut ctx);
        self.outcome.painted += 1;
        self.outcome.hits.push(id);
        let hit_id = self.outcome.hits.len() as u32;
        self.cells.register_hit(bounds, hit_id, z, clip);

        let child_clip = bounds.inset(renderable.content_inset()).clip_to(&clip);
        if child_clip.is_empty() {
            return;
        }
        let mut children = node.children().to_vec();
        children.sort_by_key(|child| scene.node(*child).map_or(0, Node::z_index));
        for child in children {
            self.visit(child, z, opacity, child_clip);
        }
    }
}

/// Paint every visible node under the root, in tree order with children
/// sorted by z. The grid should be cleared first.
pub fn paint_scene(scene: &SceneGraph, layout: &LayoutMap, cells: &mut CellBuffer) -> PaintOutcome {
    let clip = cells.area();
    let mut walk = Walk {
        scene,
        layout,
        cells,
        outcome: PaintOutcome::default(),
    };
    walk.visit(scene.root(), 0, 1.0, clip);
    tracing::trace!(painted = walk.outcome.painted, "scene painted");
    walk.outcome
}
