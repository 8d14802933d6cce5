//! Scene graph: Generational slab of nodes plus the per-frame event queue.
//!
//! Nodes live in a slab indexed by [`NodeId`]. Destroying a node bumps its
//! slot's generation at once, so every outstanding handle goes stale, but
//! the node's resources (its text buffer and arena) are parked on a
//! pending-release list and only dropped by [`SceneGraph::release_pending`]
//! at the start of the next frame.

use std::collections::VecDeque;

use super::events::{Event, EventContext, EventKind, Handler, HandlerId, Queued};
use super::node::{Content, Node, NodeId, NodeKind, NodeState, PropValue};
use super::render::Renderable;
use crate::buffer::CellBuffer;
use crate::error::{Error, Result};
use crate::layout::LayoutMap;
use crate::terminal::{InputEvent, MouseKind};
use crate::text::{RopeStats, TextBuffer};

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The retained tree of nodes.
#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    focused: Option<NodeId>,
    queue: VecDeque<Queued>,
    pending_release: Vec<(u32, Node)>,
    next_handler: u64,
    destroy_events: u64,
    tab_width: u8,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SceneGraph {
    /// Create a graph holding only the root, a plain box.
    pub fn new(tab_width: u8) -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            focused: None,
            queue: VecDeque::new(),
            pending_release: Vec::new(),
            next_handler: 1,
            destroy_events: 0,
            tab_width,
        };
        graph.root = graph.create_node(NodeKind::Box);
        graph
    }

    /// The root node; it fills the viewport and cannot be destroyed.
    #[inline]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Create an unattached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let node = Node::new(kind, self.tab_width);
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        };
        tracing::trace!(node = ?id, ?kind, "node created");
        id
    }

    fn lookup(&self, id: NodeId) -> Result<&Node> {
        let slot = self.slots.get(id.index as usize).ok_or(Error::StaleNode(id))?;
        match &slot.node {
            Some(node) if slot.generation == id.generation => Ok(node),
            Some(_) => Err(Error::StaleNode(id)),
            None => Err(Error::NodeDestroyed(id)),
        }
    }

    fn resolve(&self, id: NodeId) -> Result<&Node> {
        self.lookup(id).inspect_err(|error| {
            tracing::error!(node = ?id, %error, "invalid node handle");
        })
    }

    fn resolve_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.resolve(id)?;
        self.slots[id.index as usize]
            .node
            .as_mut()
            .ok_or(Error::NodeDestroyed(id))
    }

    /// Borrow a live node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.lookup(id).ok()
    }

    /// Whether the handle still refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.lookup(id).is_ok()
    }

    /// Whether `id` is the root or hangs under it.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.root {
                return true;
            }
            current = self.node(node_id).and_then(Node::parent);
        }
        false
    }

    /// Lifecycle state of a live node.
    pub fn state(&self, id: NodeId) -> Result<NodeState> {
        let node = self.resolve(id)?;
        Ok(if !self.is_attached(id) {
            NodeState::Unattached
        } else if node.dirty {
            NodeState::Dirty
        } else {
            NodeState::Clean
        })
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(Node::parent);
        }
        false
    }

    fn invalid_tree(node: NodeId, reason: &'static str) -> Error {
        tracing::error!(?node, reason, "invalid tree operation");
        Error::InvalidTree { node, reason }
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.node(child).and_then(Node::parent) else {
            return;
        };
        if let Some(Some(node)) = self.slots.get_mut(parent.index as usize).map(|s| s.node.as_mut()) {
            node.children.retain(|c| *c != child);
            node.dirty = true;
        }
        if let Some(node) = self.slots[child.index as usize].node.as_mut() {
            node.parent = None;
        }
    }

    /// Insert `child` under `parent` at `index` (appended when `None` or
    /// past the end). A child that already has a parent is moved.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<()> {
        self.resolve(parent)?;
        self.resolve(child)?;
        if child == self.root {
            return Err(Self::invalid_tree(child, "the root cannot be a child"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Self::invalid_tree(child, "would create a cycle"));
        }
        self.detach(child);
        let parent_node = self.resolve_mut(parent)?;
        let at = index.map_or(parent_node.children.len(), |i| i.min(parent_node.children.len()));
        parent_node.children.insert(at, child);
        parent_node.dirty = true;
        let child_node = self.resolve_mut(child)?;
        child_node.parent = Some(parent);
        child_node.dirty = true;
        tracing::trace!(?parent, ?child, at, "child added");
        Ok(())
    }

    /// Detach `child` from `parent`; the child stays alive, unattached.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.resolve(parent)?;
        if self.resolve(child)?.parent != Some(parent) {
            return Err(Self::invalid_tree(child, "not a child of the given parent"));
        }
        self.detach(child);
        tracing::trace!(?parent, ?child, "child removed");
        Ok(())
    }

    /// Destroy a node and its whole subtree; returns how many nodes died.
    ///
    /// Handles go stale immediately. Resources are released by the next
    /// [`release_pending`](Self::release_pending).
    pub fn destroy(&mut self, id: NodeId) -> Result<usize> {
        self.resolve(id)?;
        if id == self.root {
            return Err(Self::invalid_tree(id, "the root cannot be destroyed"));
        }
        self.detach(id);
        let mut stack = vec![id];
        let mut count = 0;
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            let Some(mut node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            stack.append(&mut node.children);
            node.handlers.clear();
            if self.focused == Some(current) {
                self.focused = None;
            }
            self.pending_release.push((current.index, node));
            count += 1;
        }
        self.destroy_events += count as u64;
        tracing::debug!(node = ?id, count, "subtree destroyed");
        Ok(count)
    }

    /// Drop resources of nodes destroyed since the last call and make
    /// their slots reusable. Returns the number released.
    pub fn release_pending(&mut self) -> usize {
        let released = self.pending_release.len();
        for (index, node) in self.pending_release.drain(..) {
            drop(node);
            self.free.push(index);
        }
        if released > 0 {
            tracing::trace!(released, "destroyed nodes released");
        }
        released
    }

    /// Nodes destroyed but not yet released.
    #[inline]
    pub fn pending_release(&self) -> usize {
        self.pending_release.len()
    }

    /// Set a property by name.
    pub fn set_property(&mut self, id: NodeId, name: &str, value: impl Into<PropValue>) -> Result<()> {
        let node = self.resolve_mut(id)?;
        node.set_property(id, name, value.into())?;
        node.dirty = true;
        Ok(())
    }

    /// Read a property by name.
    pub fn get_property(&self, id: NodeId, name: &str) -> Result<PropValue> {
        self.resolve(id)?.get_property(id, name)
    }

    /// The text buffer of a text node.
    pub fn text(&self, id: NodeId) -> Result<&TextBuffer> {
        match &self.resolve(id)?.content {
            Content::Text(node) => Ok(&node.buffer),
            _ => Err(wrong_kind(id, "text", "a text node")),
        }
    }

    /// Mutable access to a text node's buffer; marks the node dirty.
    pub fn text_mut(&mut self, id: NodeId) -> Result<&mut TextBuffer> {
        let node = self.resolve_mut(id)?;
        node.dirty = true;
        match &mut node.content {
            Content::Text(text) => Ok(&mut text.buffer),
            _ => Err(wrong_kind(id, "text", "a text node")),
        }
    }

    /// Create an unattached framebuffer node owning a `width` x `height` grid.
    pub fn create_framebuffer(&mut self, width: u16, height: u16) -> Result<NodeId> {
        let cells = CellBuffer::new(width, height)?;
        let id = self.create_node(NodeKind::FrameBuffer);
        if let Content::FrameBuffer(node) = &mut self.resolve_mut(id)?.content {
            node.cells = cells;
        }
        Ok(id)
    }

    /// The offscreen grid of a framebuffer node.
    pub fn framebuffer(&self, id: NodeId) -> Result<&CellBuffer> {
        match &self.resolve(id)?.content {
            Content::FrameBuffer(node) => Ok(&node.cells),
            _ => Err(wrong_kind(id, "cells", "a framebuffer node")),
        }
    }

    /// Mutable access to a framebuffer node's grid; marks the node dirty.
    pub fn framebuffer_mut(&mut self, id: NodeId) -> Result<&mut CellBuffer> {
        let node = self.resolve_mut(id)?;
        node.dirty = true;
        match &mut node.content {
            Content::FrameBuffer(framebuffer) => Ok(&mut framebuffer.cells),
            _ => Err(wrong_kind(id, "cells", "a framebuffer node")),
        }
    }

    /// Subscribe `handler` to events of `kind` on `id`.
    pub fn on(&mut self, id: NodeId, kind: EventKind, handler: Handler) -> Result<HandlerId> {
        let handler_id = HandlerId(self.next_handler);
        self.resolve_mut(id)?.handlers.push((handler_id, kind, handler));
        self.next_handler += 1;
        Ok(handler_id)
    }

    /// Unsubscribe; returns whether the handler was registered on `id`.
    pub fn off(&mut self, id: NodeId, handler: HandlerId) -> Result<bool> {
        let node = self.resolve_mut(id)?;
        let before = node.handlers.len();
        node.handlers.retain(|(h, _, _)| *h != handler);
        Ok(node.handlers.len() != before)
    }

    /// The node holding input focus.
    #[inline]
    pub const fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Move focus to `id`, queueing Blur for the previous holder and Focus
    /// for the new one.
    pub fn focus(&mut self, id: NodeId) -> Result<()> {
        self.resolve(id)?;
        if self.focused == Some(id) {
            return Ok(());
        }
        if let Some(previous) = self.focused.replace(id) {
            self.queue.push_back(Queued::Direct(previous, Event::Blur));
        }
        self.queue.push_back(Queued::Direct(id, Event::Focus));
        tracing::trace!(node = ?id, "focus moved");
        Ok(())
    }

    /// Drop focus, queueing Blur for the holder.
    pub fn blur(&mut self) {
        if let Some(previous) = self.focused.take() {
            self.queue.push_back(Queued::Direct(previous, Event::Blur));
        }
    }

    /// Queue a decoded terminal event for the next dispatch; returns
    /// whether it is routable to nodes.
    pub fn post(&mut self, input: InputEvent) -> bool {
        match Event::from_input(input) {
            Some(event) => {
                self.queue.push_back(Queued::Input(event));
                true
            }
            None => false,
        }
    }

    /// Events waiting for dispatch.
    #[inline]
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    /// Deliver every queued event; returns how many reached a node.
    ///
    /// `hit` maps a screen cell to the node painted there last frame, which
    /// is then checked with [`Renderable::hit_test`]. Keys
    /// and paste go to the focused node, mouse events to the hit node, and
    /// both bubble to ancestors until a handler stops propagation. A press
    /// focuses the nearest focusable node under the pointer and unhandled
    /// wheel events scroll the nearest scroll box.
    pub fn dispatch(&mut self, hit: impl Fn(i32, i32) -> Option<NodeId>) -> usize {
        let mut delivered = 0;
        while let Some(queued) = self.queue.pop_front() {
            let (target, event) = match queued {
                Queued::Direct(node, event) => (Some(node), event),
                Queued::Input(event) => {
                    let target = match &event {
                        Event::Mouse(mouse) => {
                            let (x, y) = (i32::from(mouse.x), i32::from(mouse.y));
                            hit(x, y).and_then(|t| self.hit_owner(t, x, y))
                        }
                        _ => self.focused,
                    };
                    (target, event)
                }
            };
            let Some(target) = target.filter(|t| self.contains(*t)) else {
                tracing::trace!(kind = ?event.kind(), "event has no target");
                continue;
            };
            if let Event::Mouse(mouse) = &event {
                if matches!(mouse.kind, MouseKind::Down(_)) {
                    self.focus_from(target);
                }
            }
            let ctx = self.deliver(target, &event);
            delivered += 1;
            if let Event::Mouse(mouse) = &event {
                if !ctx.is_stopped() {
                    self.default_scroll(target, mouse.kind);
                }
            }
        }
        delivered
    }

    fn hit_owner(&self, target: NodeId, x: i32, y: i32) -> Option<NodeId> {
        let mut current = Some(target);
        while let Some(id) = current {
            let node = self.node(id)?;
            match node.bounds {
                Some(bounds) if !node.renderable().hit_test(bounds, x, y) => current = node.parent,
                _ => return Some(id),
            }
        }
        None
    }

    fn focus_from(&mut self, target: NodeId) {
        let mut current = Some(target);
        while let Some(id) = current {
            let Some((focusable, parent)) = self.node(id).map(|n| (n.focusable, n.parent)) else {
                return;
            };
            if focusable {
                let _ = self.focus(id);
                return;
            }
            current = parent;
        }
    }

    fn default_scroll(&mut self, target: NodeId, kind: MouseKind) {
        let delta = match kind {
            MouseKind::ScrollUp => -1,
            MouseKind::ScrollDown => 1,
            _ => return,
        };
        let mut current = Some(target);
        while let Some(id) = current {
            let Ok(node) = self.resolve_mut(id) else {
                return;
            };
            if let Content::ScrollBox(scroll) = &mut node.content {
                if scroll.scroll_rows(delta) {
                    node.dirty = true;
                }
                return;
            }
            current = node.parent;
        }
    }

    fn deliver(&mut self, target: NodeId, event: &Event) -> EventContext {
        let kind = event.kind();
        let mut ctx = EventContext::new(target);
        let mut current = Some(target);
        while let Some(id) = current {
            let Ok(node) = self.resolve_mut(id) else {
                break;
            };
            ctx.set_current(id);
            for (_, subscribed, handler) in &mut node.handlers {
                if *subscribed == kind {
                    handler(event, &mut ctx);
                }
            }
            if ctx.is_stopped() || !kind.bubbles() {
                break;
            }
            current = node.parent;
        }
        ctx
    }

    /// Record node bounds and scroll extents computed by a layout pass.
    ///
    /// Returns whether any scroll offset had to be pulled back into range,
    /// in which case the layout is out of date.
    pub fn apply_layout(&mut self, layout: &LayoutMap) -> bool {
        let mut clamped = false;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let id = NodeId {
                index: index as u32,
                generation: slot.generation,
            };
            let Some(node) = slot.node.as_mut() else {
                continue;
            };
            node.bounds = layout.get(id);
            let (Content::ScrollBox(scroll), Some(bounds)) = (&mut node.content, node.bounds) else {
                continue;
            };
            let before = scroll.scroll_offset();
            scroll.update_extent(layout.extent(id), (bounds.width, bounds.height));
            clamped |= scroll.scroll_offset() != before;
        }
        clamped
    }

    /// Whether anything changed since the last [`mark_clean`](Self::mark_clean).
    pub fn is_dirty(&self) -> bool {
        !self.queue.is_empty()
            || self
                .slots
                .iter()
                .filter_map(|s| s.node.as_ref())
                .any(|n| n.dirty)
    }

    /// Mark every node painted.
    pub fn mark_clean(&mut self) {
        for node in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            node.dirty = false;
        }
    }

    /// Live nodes, the root included.
    pub fn live_nodes(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Nodes destroyed over the graph's lifetime.
    #[inline]
    pub const fn destroy_events(&self) -> u64 {
        self.destroy_events
    }

    /// Statistics for every live text node.
    pub fn text_stats(&self) -> Vec<(NodeId, RopeStats)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.node {
                Some(Node {
                    content: Content::Text(text),
                    ..
                }) => Some((
                    NodeId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    text.buffer.stats(),
                )),
                _ => None,
            })
            .collect()
    }
}

fn wrong_kind(id: NodeId, name: &str, expected: &'static str) -> Error {
    tracing::error!(node = ?id, expected, "node has the wrong kind");
    Error::PropertyType {
        name: name.to_owned(),
        expected,
    }
}
