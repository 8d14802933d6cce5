//! Scene events: What handlers receive and how propagation is controlled.

use super::node::NodeId;
use crate::terminal::{InputEvent, KeyCode, KeyModifiers, MouseEvent};

/// The event families a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Key presses, delivered to the focused node.
    Key,
    /// Mouse presses, releases, drags, moves and wheel.
    Mouse,
    /// Bracketed paste, delivered to the focused node.
    Paste,
    /// The node gained focus.
    Focus,
    /// The node lost focus.
    Blur,
}

impl EventKind {
    /// Whether events of this kind continue to ancestors.
    #[inline]
    pub const fn bubbles(self) -> bool {
        !matches!(self, Self::Focus | Self::Blur)
    }
}

/// An event as delivered to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A key press.
    Key {
        /// Which key.
        code: KeyCode,
        /// Held modifiers.
        modifiers: KeyModifiers,
    },
    /// A mouse event in screen cells.
    Mouse(MouseEvent),
    /// Pasted text.
    Paste(String),
    /// Focus arrived.
    Focus,
    /// Focus left.
    Blur,
}

impl Event {
    /// The family this event belongs to.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Key { .. } => EventKind::Key,
            Self::Mouse(_) => EventKind::Mouse,
            Self::Paste(_) => EventKind::Paste,
            Self::Focus => EventKind::Focus,
            Self::Blur => EventKind::Blur,
        }
    }

    /// Convert a decoded terminal event; terminal-level reports return `None`.
    pub fn from_input(input: InputEvent) -> Option<Self> {
        match input {
            InputEvent::Key { code, modifiers } => Some(Self::Key { code, modifiers }),
            InputEvent::Mouse(mouse) => Some(Self::Mouse(mouse)),
            InputEvent::Paste(text) => Some(Self::Paste(text)),
            InputEvent::FocusGained
            | InputEvent::FocusLost
            | InputEvent::PaletteColor { .. }
            | InputEvent::DefaultColor { .. }
            | InputEvent::ModeReport { .. }
            | InputEvent::KittyFlags(_)
            | InputEvent::DeviceAttributes(_)
            | InputEvent::TerminalVersion(_) => None,
        }
    }
}

/// Identifies a registered handler for [`off`](super::SceneGraph::off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

/// Propagation state handed to each handler.
#[derive(Debug)]
pub struct EventContext {
    target: NodeId,
    current: NodeId,
    stopped: bool,
}

impl EventContext {
    pub(crate) const fn new(target: NodeId) -> Self {
        Self {
            target,
            current: target,
            stopped: false,
        }
    }

    /// The node the event was aimed at.
    #[inline]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose handler is running.
    #[inline]
    pub const fn current(&self) -> NodeId {
        self.current
    }

    pub(crate) fn set_current(&mut self, node: NodeId) {
        self.current = node;
    }

    /// Do not deliver this event to any further ancestor.
    #[inline]
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Whether a handler stopped propagation.
    #[inline]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// A subscribed callback.
pub type Handler = Box<dyn FnMut(&Event, &mut EventContext) + 'static>;

/// An event waiting for the next dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Queued {
    /// Route by kind: keys and paste to focus, mouse to the hit target.
    Input(Event),
    /// Deliver to one node.
    Direct(NodeId, Event),
}
