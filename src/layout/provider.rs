//! Layout collaborator: Resolves every node to on-screen bounds once per frame.

use std::collections::HashMap;

use super::rect::{Bounds, Rect};
use crate::scene::{NodeId, SceneGraph};

/// Resolved bounds and scroll extents of one layout pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutMap {
    bounds: HashMap<NodeId, Bounds>,
    extents: HashMap<NodeId, (u16, u16)>,
}

impl LayoutMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds of a node, if it was laid out.
    #[inline]
    pub fn get(&self, node: NodeId) -> Option<Bounds> {
        self.bounds.get(&node).copied()
    }

    /// Record a node's bounds.
    pub fn insert(&mut self, node: NodeId, bounds: Bounds) {
        self.bounds.insert(node, bounds);
    }

    /// Size of the area a node's children cover, measured from its content
    /// origin.
    #[inline]
    pub fn extent(&self, node: NodeId) -> (u16, u16) {
        self.extents.get(&node).copied().unwrap_or_default()
    }

    /// Record a node's children extent.
    pub fn set_extent(&mut self, node: NodeId, extent: (u16, u16)) {
        self.extents.insert(node, extent);
    }

    /// Number of nodes laid out.
    #[inline]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Whether nothing was laid out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

/// Computes node geometry for the paint walk.
///
/// The engine calls [`layout`](Self::layout) once per frame, after events
/// are dispatched and before painting. Implementations may keep caches
/// across frames.
pub trait LayoutProvider {
    /// Preferred size of one node given the space available.
    fn measure(
        &mut self,
        scene: &SceneGraph,
        node: NodeId,
        available_width: u16,
        available_height: u16,
    ) -> (u16, u16);

    /// Resolve bounds for `root` and everything under it.
    fn layout(&mut self, scene: &SceneGraph, root: NodeId, viewport: Rect) -> LayoutMap;
}

/// Places nodes at their `x`/`y` properties relative to the parent's
/// content origin; unset sizes are measured.
///
/// The root always fills the viewport. Children of a bordered box start
/// inside the border, children of a scroll box are shifted by its scroll
/// offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbsoluteLayout;

impl AbsoluteLayout {
    /// Create the provider.
    pub const fn new() -> Self {
        Self
    }

    fn place(
        &mut self,
        scene: &SceneGraph,
        id: NodeId,
        origin: (i32, i32),
        available: (u16, u16),
        map: &mut LayoutMap,
    ) -> Option<Bounds> {
        let node = scene.node(id)?;
        let geometry = node.geometry();
        let (dx, dy) = (geometry.x.unwrap_or(0), geometry.y.unwrap_or(0));
        let avail_w = shrink(available.0, dx);
        let avail_h = shrink(available.1, dy);
        let (width, height) = match (geometry.width, geometry.height) {
            (Some(w), Some(h)) => (w, h),
            (w, h) => {
                let (mw, mh) = self.measure(scene, id, w.unwrap_or(avail_w), h.unwrap_or(avail_h));
                (w.unwrap_or(mw), h.unwrap_or(mh))
            }
        };
        let bounds = Bounds::new(origin.0 + dx, origin.1 + dy, width, height);
        map.insert(id, bounds);
        self.place_children(scene, id, bounds, map);
        Some(bounds)
    }

    fn place_children(&mut self, scene: &SceneGraph, id: NodeId, bounds: Bounds, map: &mut LayoutMap) {
        let Some(node) = scene.node(id) else {
            return;
        };
        let renderable = node.renderable();
        let content = bounds.inset(renderable.content_inset());
        let (sx, sy) = renderable.scroll_offset();
        let origin = (content.x - i32::from(sx), content.y - i32::from(sy));
        let (mut right, mut bottom) = (0i32, 0i32);
        for &child in node.children() {
            if let Some(child_bounds) = self.place(scene, child, origin, (content.width, content.height), map) {
                right = right.max(child_bounds.right() - origin.0);
                bottom = bottom.max(child_bounds.bottom() - origin.1);
            }
        }
        map.set_extent(id, (clamp_u16(right), clamp_u16(bottom)));
    }
}

fn shrink(available: u16, offset: i32) -> u16 {
    clamp_u16(i32::from(available) - offset.max(0))
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

impl LayoutProvider for AbsoluteLayout {
    fn measure(
        &mut self,
        scene: &SceneGraph,
        node: NodeId,
        available_width: u16,
        available_height: u16,
    ) -> (u16, u16) {
        scene.node(node).map_or((0, 0), |n| {
            n.renderable().measure(available_width, available_height)
        })
    }

    fn layout(&mut self, scene: &SceneGraph, root: NodeId, viewport: Rect) -> LayoutMap {
        let mut map = LayoutMap::new();
        let bounds = Bounds::from(viewport);
        map.insert(root, bounds);
        self.place_children(scene, root, bounds, &mut map);
        tracing::trace!(nodes = map.len(), "layout resolved");
        map
    }
}
