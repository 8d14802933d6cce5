//! Scene nodes: handles, kinds and string-keyed properties.

use super::events::{EventKind, Handler, HandlerId};
use super::render::{BoxNode, FrameBufferNode, Renderable, ScrollBoxNode, TextNode};
use crate::buffer::{BorderStyle, CellBuffer, Rgba};
use crate::error::{Error, Result};
use crate::layout::Bounds;
use crate::text::WrapMode;

/// Handle to a scene node: slot index plus the slot's generation.
///
/// A handle whose generation no longer matches its slot refers to a node
/// that has been destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Slot index.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Rectangle with an optional background, border and title.
    Box,
    /// A [`TextBuffer`](crate::text::TextBuffer) painted inside its bounds.
    Text,
    /// Viewport that scrolls and clips its children.
    ScrollBox,
    /// An offscreen [`CellBuffer`] composited at the node's bounds.
    FrameBuffer,
}

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not in the tree.
    Unattached,
    /// In the tree and changed since the last paint.
    Dirty,
    /// In the tree and painted as is.
    Clean,
}

/// A property value passed across the adapter boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Unset (restores the default).
    None,
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(String),
    /// Colour.
    Color(Rgba),
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Rgba> for PropValue {
    fn from(v: Rgba) -> Self {
        Self::Color(v)
    }
}

impl From<crate::buffer::Rgb> for PropValue {
    fn from(v: crate::buffer::Rgb) -> Self {
        Self::Color(v.into())
    }
}

impl<T: Into<Self>> From<Option<T>> for PropValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

/// Requested position and size; unset sizes are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    /// Offset from the parent's content origin.
    pub x: Option<i32>,
    /// Offset from the parent's content origin.
    pub y: Option<i32>,
    /// Fixed width.
    pub width: Option<u16>,
    /// Fixed height.
    pub height: Option<u16>,
}

/// Kind-specific state behind the [`Renderable`] capability.
#[derive(Debug)]
pub(crate) enum Content {
    Box(BoxNode),
    Text(TextNode),
    ScrollBox(ScrollBoxNode),
    FrameBuffer(FrameBufferNode),
}

impl Content {
    pub(crate) fn new(kind: NodeKind, tab_width: u8) -> Self {
        match kind {
            NodeKind::Box => Self::Box(BoxNode::default()),
            NodeKind::Text => Self::Text(TextNode::new(tab_width)),
            NodeKind::ScrollBox => Self::ScrollBox(ScrollBoxNode::default()),
            NodeKind::FrameBuffer => {
                Self::FrameBuffer(FrameBufferNode::new(CellBuffer::allocate(1, 1)))
            }
        }
    }

    pub(crate) const fn kind(&self) -> NodeKind {
        match self {
            Self::Box(_) => NodeKind::Box,
            Self::Text(_) => NodeKind::Text,
            Self::ScrollBox(_) => NodeKind::ScrollBox,
            Self::FrameBuffer(_) => NodeKind::FrameBuffer,
        }
    }

    pub(crate) fn renderable(&self) -> &dyn Renderable {
        match self {
            Self::Box(node) => node,
            Self::Text(node) => node,
            Self::ScrollBox(node) => node,
            Self::FrameBuffer(node) => node,
        }
    }
}

/// One element of the scene tree.
pub struct Node {
    pub(crate) content: Content,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) geometry: Geometry,
    pub(crate) z: i32,
    pub(crate) opacity: f32,
    pub(crate) visible: bool,
    pub(crate) focusable: bool,
    pub(crate) dirty: bool,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) handlers: Vec<(HandlerId, EventKind, Handler)>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.content.kind())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("geometry", &self.geometry)
            .field("z", &self.z)
            .field("opacity", &self.opacity)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl Node {
    pub(crate) fn new(kind: NodeKind, tab_width: u8) -> Self {
        Self {
            content: Content::new(kind, tab_width),
            parent: None,
            children: Vec::new(),
            geometry: Geometry::default(),
            z: 0,
            opacity: 1.0,
            visible: true,
            focusable: false,
            dirty: true,
            bounds: None,
            handlers: Vec::new(),
        }
    }

    /// Node kind.
    #[inline]
    pub const fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    /// Parent, if attached.
    #[inline]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Requested geometry.
    #[inline]
    pub const fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Own z-index, relative to the parent.
    #[inline]
    pub const fn z_index(&self) -> i32 {
        self.z
    }

    /// Own opacity, before multiplying with ancestors.
    #[inline]
    pub const fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Whether the node and its subtree are painted.
    #[inline]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Bounds from the most recent layout.
    #[inline]
    pub const fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Paint, measure and hit-test behaviour of this node's kind.
    #[inline]
    pub fn renderable(&self) -> &dyn Renderable {
        self.content.renderable()
    }

    /// Apply a property by name.
    pub(crate) fn set_property(&mut self, id: NodeId, name: &str, value: PropValue) -> Result<()> {
        match name {
            "x" => self.geometry.x = opt_int(name, &value)?.map(clamp_i32),
            "y" => self.geometry.y = opt_int(name, &value)?.map(clamp_i32),
            "width" => self.geometry.width = opt_int(name, &value)?.map(clamp_u16),
            "height" => self.geometry.height = opt_int(name, &value)?.map(clamp_u16),
            "z_index" => self.z = opt_int(name, &value)?.map_or(0, clamp_i32),
            "opacity" => {
                self.opacity = match value {
                    PropValue::None => 1.0,
                    PropValue::Float(v) if v.is_finite() => v.clamp(0.0, 1.0) as f32,
                    PropValue::Int(v) => v.clamp(0, 1) as f32,
                    _ => return Err(type_error(name, "a number in [0, 1]")),
                }
            }
            "visible" => self.visible = opt_bool(name, &value)?.unwrap_or(true),
            "focusable" => self.focusable = opt_bool(name, &value)?.unwrap_or(false),
            _ => return self.set_kind_property(id, name, value),
        }
        Ok(())
    }

    fn set_kind_property(&mut self, id: NodeId, name: &str, value: PropValue) -> Result<()> {
        match (&mut self.content, name) {
            (Content::Box(node), "background") => node.background = opt_color(name, &value)?,
            (Content::Box(node), "border_color") => {
                node.border_color = opt_color(name, &value)?.unwrap_or(Rgba::WHITE);
            }
            (Content::Box(node), "border") => node.border = opt_border(name, &value)?,
            (Content::Box(node), "title") => node.title = opt_str(name, &value)?,
            (Content::Text(node), "text") => {
                node.buffer.set_text(opt_str(name, &value)?.as_deref().unwrap_or(""));
            }
            (Content::Text(node), "wrap") => {
                node.wrap = match opt_str(name, &value)?.as_deref() {
                    None | Some("none") => WrapMode::None,
                    Some("char") => WrapMode::Char,
                    Some(_) => return Err(type_error(name, "\"none\" or \"char\"")),
                }
            }
            (Content::Text(node), "background") => node.background = opt_color(name, &value)?,
            (Content::ScrollBox(node), "background") => node.background = opt_color(name, &value)?,
            (Content::ScrollBox(node), "scroll_x") => {
                node.scroll_x = opt_int(name, &value)?.map_or(0, clamp_u16);
            }
            (Content::ScrollBox(node), "scroll_y") => {
                node.scroll_y = opt_int(name, &value)?.map_or(0, clamp_u16);
            }
            (Content::FrameBuffer(node), "respect_alpha") => {
                node.respect_alpha = opt_bool(name, &value)?.unwrap_or(false);
            }
            (Content::FrameBuffer(node), "source_x") => {
                node.source_x = opt_int(name, &value)?.map_or(0, clamp_u16);
            }
            (Content::FrameBuffer(node), "source_y") => {
                node.source_y = opt_int(name, &value)?.map_or(0, clamp_u16);
            }
            _ => {
                tracing::error!(node = ?id, property = name, "unknown property");
                return Err(Error::UnknownProperty {
                    node: id,
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Read a property back.
    pub(crate) fn get_property(&self, id: NodeId, name: &str) -> Result<PropValue> {
        let int = |v: Option<i64>| v.map_or(PropValue::None, PropValue::Int);
        let color = |v: Option<Rgba>| v.map_or(PropValue::None, PropValue::Color);
        Ok(match (&self.content, name) {
            (_, "x") => int(self.geometry.x.map(i64::from)),
            (_, "y") => int(self.geometry.y.map(i64::from)),
            (_, "width") => int(self.geometry.width.map(i64::from)),
            (_, "height") => int(self.geometry.height.map(i64::from)),
            (_, "z_index") => PropValue::Int(i64::from(self.z)),
            (_, "opacity") => PropValue::Float(f64::from(self.opacity)),
            (_, "visible") => PropValue::Bool(self.visible),
            (_, "focusable") => PropValue::Bool(self.focusable),
            (Content::Box(node), "background") => color(node.background),
            (Content::Box(node), "border_color") => PropValue::Color(node.border_color),
            (Content::Box(node), "border") => node
                .border
                .map_or(PropValue::None, |b| PropValue::Str(border_name(b).to_owned())),
            (Content::Box(node), "title") => node.title.clone().map_or(PropValue::None, PropValue::Str),
            (Content::Text(node), "text") => PropValue::Str(node.buffer.to_plain_text()),
            (Content::Text(node), "wrap") => PropValue::Str(
                match node.wrap {
                    WrapMode::None => "none",
                    WrapMode::Char => "char",
                }
                .to_owned(),
            ),
            (Content::Text(node), "background") => color(node.background),
            (Content::ScrollBox(node), "background") => color(node.background),
            (Content::ScrollBox(node), "scroll_x") => PropValue::Int(i64::from(node.scroll_x)),
            (Content::ScrollBox(node), "scroll_y") => PropValue::Int(i64::from(node.scroll_y)),
            (Content::ScrollBox(node), "content_width") => PropValue::Int(i64::from(node.content.0)),
            (Content::ScrollBox(node), "content_height") => PropValue::Int(i64::from(node.content.1)),
            (Content::FrameBuffer(node), "respect_alpha") => PropValue::Bool(node.respect_alpha),
            (Content::FrameBuffer(node), "source_x") => PropValue::Int(i64::from(node.source_x)),
            (Content::FrameBuffer(node), "source_y") => PropValue::Int(i64::from(node.source_y)),
            (Content::FrameBuffer(node), "buffer_width") => PropValue::Int(i64::from(node.cells.width())),
            (Content::FrameBuffer(node), "buffer_height") => PropValue::Int(i64::from(node.cells.height())),
            _ => {
                return Err(Error::UnknownProperty {
                    node: id,
                    name: name.to_owned(),
                })
            }
        })
    }
}

fn type_error(name: &str, expected: &'static str) -> Error {
    tracing::error!(property = name, expected, "property type mismatch");
    Error::PropertyType {
        name: name.to_owned(),
        expected,
    }
}

fn opt_int(name: &str, value: &PropValue) -> Result<Option<i64>> {
    match value {
        PropValue::None => Ok(None),
        PropValue::Int(v) => Ok(Some(*v)),
        PropValue::Float(v) if v.is_finite() => Ok(Some(v.round() as i64)),
        _ => Err(type_error(name, "an integer")),
    }
}

fn opt_bool(name: &str, value: &PropValue) -> Result<Option<bool>> {
    match value {
        PropValue::None => Ok(None),
        PropValue::Bool(v) => Ok(Some(*v)),
        _ => Err(type_error(name, "a boolean")),
    }
}

fn opt_str(name: &str, value: &PropValue) -> Result<Option<String>> {
    match value {
        PropValue::None => Ok(None),
        PropValue::Str(v) => Ok(Some(v.clone())),
        _ => Err(type_error(name, "a string")),
    }
}

fn opt_color(name: &str, value: &PropValue) -> Result<Option<Rgba>> {
    match value {
        PropValue::None => Ok(None),
        PropValue::Color(v) => Ok(Some(*v)),
        PropValue::Int(v) if (0..=0xFF_FFFF).contains(v) => {
            Ok(Some(crate::buffer::Rgb::from_u32(*v as u32).into()))
        }
        _ => Err(type_error(name, "a colour")),
    }
}

fn opt_border(name: &str, value: &PropValue) -> Result<Option<BorderStyle>> {
    Ok(match opt_str(name, value)?.as_deref() {
        None | Some("none") => None,
        Some("single") => Some(BorderStyle::Single),
        Some("double") => Some(BorderStyle::Double),
        Some("rounded") => Some(BorderStyle::Rounded),
        Some("heavy") => Some(BorderStyle::Heavy),
        Some(_) => return Err(type_error(name, "none, single, double, rounded or heavy")),
    })
}

const fn border_name(border: BorderStyle) -> &'static str {
    match border {
        BorderStyle::Single => "single",
        BorderStyle::Double => "double",
        BorderStyle::Rounded => "rounded",
        BorderStyle::Heavy => "heavy",
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn clamp_u16(v: i64) -> u16 {
    v.clamp(0, i64::from(u16::MAX)) as u16
}
