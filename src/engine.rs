//! Engine: Frame driver that ties the scene, cell buffer and terminal together.
//!
//! The engine owns one [`SceneGraph`], one [`CellBuffer`] and, when attached
//! to a terminal, a [`TerminalSession`] plus the [`InputReader`] thread. It
//! never ticks on its own: the host calls [`Engine::render_once`], which
//!
//! 1. releases nodes destroyed since the last frame,
//! 2. drains and decodes pending input and dispatches queued events,
//! 3. lays the tree out and paints it into the back grid,
//! 4. diffs against the front grid and writes the result in one call.
//!
//! A headless engine does the same against an in-memory byte sink, which
//! is what the integration tests and the frame capture helpers use.

use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::buffer::{CellBuffer, DiffState, FrameSnapshot, Rgb};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::layout::{AbsoluteLayout, LayoutMap, LayoutProvider};
use crate::memory::PoolStats;
use crate::scene::{
    paint_scene, EventKind, Handler, HandlerId, NodeId, NodeKind, PaintOutcome, PropValue, SceneGraph,
};
use crate::terminal::{
    Capabilities, CursorStyle, InputDecoder, InputEvent, InputReader, KeyboardFlags, OscColor,
    OutputBuffer, Palette, PaletteDetector, PaletteSupport, SessionOptions, TerminalSession,
};
use crate::text::{RopeStats, TextBuffer};

/// Diagnostics snapshot across every engine-owned allocator.
#[derive(Debug, Clone)]
pub struct NativeMetrics {
    /// Arena bytes in use across all text buffers.
    pub arena_bytes: usize,
    /// Grapheme pool counters of the cell buffer.
    pub pool: PoolStats,
    /// Per text node statistics.
    pub buffers: Vec<(NodeId, RopeStats)>,
    /// Live nodes, the root included.
    pub nodes_live: usize,
    /// Nodes destroyed over the engine's lifetime.
    pub destroy_events: u64,
    /// Frames written.
    pub frames: u64,
}

/// What one call to [`Engine::render_once`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Destroyed nodes whose resources were released.
    pub released: usize,
    /// Events delivered to nodes.
    pub events: usize,
    /// Nodes painted.
    pub painted: usize,
    /// Cells that differed from the previous frame.
    pub cells_changed: usize,
    /// Bytes written.
    pub bytes: usize,
    /// Nothing changed, so nothing was painted or written.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CursorState {
    position: (u16, u16),
    visible: bool,
    style: Option<(CursorStyle, bool)>,
    color: Option<Rgb>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            position: (0, 0),
            visible: false,
            style: None,
            color: None,
        }
    }
}

#[derive(Debug)]
struct TerminalIo {
    session: TerminalSession,
    reader: InputReader,
    input: Receiver<Vec<u8>>,
}

/// The rendering engine.
pub struct Engine {
    config: EngineConfig,
    scene: SceneGraph,
    layout: Box<dyn LayoutProvider>,
    cells: CellBuffer,
    diff: DiffState,
    out: OutputBuffer,
    decoder: InputDecoder,
    palette: Palette,
    capabilities: Capabilities,
    terminal: Option<TerminalIo>,
    sink: Vec<u8>,
    hits: PaintOutcome,
    last_layout: LayoutMap,
    cursor: CursorState,
    cursor_written: Option<CursorState>,
    last_input: Option<Instant>,
    needs_redraw: bool,
    frames: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("width", &self.cells.width())
            .field("height", &self.cells.height())
            .field("nodes", &self.scene.live_nodes())
            .field("frames", &self.frames)
            .field("attached", &self.terminal.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    fn build(config: EngineConfig, width: u16, height: u16, terminal: Option<TerminalIo>) -> Result<Self> {
        Ok(Self {
            scene: SceneGraph::new(config.tab_width),
            layout: Box::new(AbsoluteLayout::new()),
            cells: CellBuffer::new(width, height)?,
            diff: DiffState::default(),
            out: OutputBuffer::with_capacity(usize::from(width) * usize::from(height) * 4),
            decoder: InputDecoder::new(),
            palette: Palette::fallback(PaletteSupport::Disabled),
            capabilities: Capabilities::default(),
            terminal,
            sink: Vec::new(),
            hits: PaintOutcome::default(),
            last_layout: LayoutMap::new(),
            cursor: CursorState::default(),
            cursor_written: None,
            last_input: None,
            needs_redraw: true,
            frames: 0,
            config,
        })
    }

    /// An engine that renders into memory instead of a terminal.
    ///
    /// Written frames accumulate until [`take_output`](Self::take_output);
    /// input is supplied with [`feed_input`](Self::feed_input).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`](crate::Error::InvalidDimensions)
    /// for a zero-sized screen.
    pub fn headless(width: u16, height: u16, config: EngineConfig) -> Result<Self> {
        let engine = Self::build(config, width, height, None)?;
        tracing::debug!(width, height, "headless engine created");
        Ok(engine)
    }

    /// Take over the controlling terminal.
    ///
    /// Enters raw mode and the configured screen modes, starts the input
    /// thread, sends the capability queries and runs palette detection.
    /// Bytes that arrive during detection but are not colour reports are
    /// decoded as ordinary input, which is also where the capability
    /// replies are picked up.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal setup fails; the terminal is restored
    /// before returning.
    pub fn with_terminal(config: EngineConfig) -> Result<Self> {
        let (width, height) = TerminalSession::size()?;
        let session = TerminalSession::enter(SessionOptions {
            alternate_screen: config.alternate_screen,
            mouse: config.enable_mouse,
            bracketed_paste: config.bracketed_paste,
            focus_events: true,
            kitty_keyboard: (!config.kitty_keyboard.is_empty()).then_some(config.kitty_keyboard),
        })?;
        let (reader, input) = InputReader::spawn()?;
        let mut engine = Self::build(
            config,
            width,
            height,
            Some(TerminalIo {
                session,
                reader,
                input,
            }),
        )?;
        engine.capabilities = Capabilities::detect();
        if engine.config.query_capabilities && TerminalSession::input_is_tty() {
            engine.query_capabilities()?;
        }
        engine.detect_palette();
        tracing::info!(
            width,
            height,
            palette = ?engine.palette.support,
            "terminal engine started"
        );
        Ok(engine)
    }

    fn detect_palette(&mut self) {
        let Some(io) = self.terminal.as_mut() else {
            return;
        };
        let detector = PaletteDetector::new(self.config.palette.clone());
        let mut stdout = std::io::stdout();
        let report = detector.detect(&mut stdout, &mut io.input, TerminalSession::input_is_tty());
        tracing::debug!(
            support = ?report.palette.support,
            reported = report.palette.reported_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            leftover = report.leftover.len(),
            "palette detection finished"
        );
        self.palette = report.palette;
        if !report.leftover.is_empty() {
            self.feed_input(&report.leftover);
        }
    }

    /// The scene graph.
    #[inline]
    pub const fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// The scene graph, for direct edits.
    #[inline]
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    /// Replace the layout collaborator.
    pub fn set_layout_provider(&mut self, provider: Box<dyn LayoutProvider>) {
        self.layout = provider;
        self.needs_redraw = true;
    }

    /// The palette as detected (or the fallback).
    #[inline]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// What the terminal is known to support so far.
    #[inline]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Ask the terminal which features it supports.
    ///
    /// Replies come back through the input stream and update
    /// [`capabilities`](Self::capabilities) as frames pump input.
    pub fn query_capabilities(&mut self) -> Result<()> {
        let mut out = OutputBuffer::with_capacity(64);
        out.query_capabilities();
        self.write_control(&out)
    }

    /// Push kitty keyboard flags. The session pops them on teardown.
    pub fn push_keyboard_flags(&mut self, flags: KeyboardFlags) -> Result<()> {
        if let Some(io) = self.terminal.as_mut() {
            return io.session.push_keyboard_flags(flags);
        }
        let mut out = OutputBuffer::with_capacity(8);
        out.kitty_keyboard_push(flags);
        self.write_control(&out)
    }

    /// Pop the most recent kitty keyboard push.
    ///
    /// Returns `false` when a terminal session had nothing pushed; a
    /// headless engine always writes the pop.
    pub fn pop_keyboard_flags(&mut self) -> Result<bool> {
        if let Some(io) = self.terminal.as_mut() {
            return io.session.pop_keyboard_flags();
        }
        let mut out = OutputBuffer::with_capacity(4);
        out.kitty_keyboard_pop();
        self.write_control(&out)?;
        Ok(true)
    }

    fn write_control(&mut self, out: &OutputBuffer) -> Result<()> {
        match self.terminal.as_mut() {
            Some(io) => io.session.write(out),
            None => {
                self.sink.extend_from_slice(out.as_bytes());
                Ok(())
            }
        }
    }

    /// Engine configuration.
    #[inline]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Screen width in columns.
    #[inline]
    pub const fn width(&self) -> u16 {
        self.cells.width()
    }

    /// Screen height in rows.
    #[inline]
    pub const fn height(&self) -> u16 {
        self.cells.height()
    }

    /// Frames written so far.
    #[inline]
    pub const fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Bounds of every node as of the last frame.
    #[inline]
    pub const fn last_layout(&self) -> &LayoutMap {
        &self.last_layout
    }

    /// Create an unattached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        self.scene.create_node(kind)
    }

    /// Set a node property by name.
    pub fn set_property(&mut self, node: NodeId, name: &str, value: impl Into<PropValue>) -> Result<()> {
        self.scene.set_property(node, name, value)
    }

    /// Read a node property by name.
    pub fn get_property(&self, node: NodeId, name: &str) -> Result<PropValue> {
        self.scene.get_property(node, name)
    }

    /// Insert `child` under `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<()> {
        self.scene.add_child(parent, child, index)
    }

    /// Detach `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.scene.remove_child(parent, child)
    }

    /// Destroy a subtree; resources go at the start of the next frame.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<usize> {
        self.scene.destroy(node)
    }

    /// Subscribe to events on a node.
    pub fn on(&mut self, node: NodeId, kind: EventKind, handler: Handler) -> Result<HandlerId> {
        self.scene.on(node, kind, handler)
    }

    /// Unsubscribe a handler.
    pub fn off(&mut self, node: NodeId, handler: HandlerId) -> Result<bool> {
        self.scene.off(node, handler)
    }

    /// Move input focus.
    pub fn focus(&mut self, node: NodeId) -> Result<()> {
        self.scene.focus(node)
    }

    /// Create an unattached framebuffer node with its own offscreen grid.
    pub fn create_framebuffer(&mut self, width: u16, height: u16) -> Result<NodeId> {
        self.scene.create_framebuffer(width, height)
    }

    /// A framebuffer node's grid, for painting; marks the node dirty.
    pub fn framebuffer_mut(&mut self, node: NodeId) -> Result<&mut CellBuffer> {
        self.scene.framebuffer_mut(node)
    }

    /// A text node's buffer, for streaming edits.
    pub fn text_mut(&mut self, node: NodeId) -> Result<&mut TextBuffer> {
        self.scene.text_mut(node)
    }

    /// Place the cursor after every frame, or hide it.
    pub fn set_cursor(&mut self, x: u16, y: u16, visible: bool) {
        self.cursor.position = (x, y);
        self.cursor.visible = visible;
    }

    /// Set the cursor shape.
    pub fn set_cursor_style(&mut self, style: CursorStyle, blinking: bool) {
        self.cursor.style = Some((style, blinking));
    }

    /// Set the cursor colour.
    pub fn set_cursor_color(&mut self, color: Rgb) {
        self.cursor.color = Some(color);
    }

    /// Repaint on the next frame even if nothing in the scene changed.
    ///
    /// Needed after highlight spans were published from another thread.
    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Change the screen size. The next frame clears and repaints.
    ///
    /// # Errors
    ///
    /// Zero-sized requests are rejected and the old size is kept.
    pub fn resize(&mut self, width: u16, height: u16) -> Result<()> {
        if (width, height) == (self.cells.width(), self.cells.height()) {
            return Ok(());
        }
        self.cells.resize(width, height)?;
        self.needs_redraw = true;
        tracing::debug!(width, height, "resized");
        Ok(())
    }

    /// Decode raw terminal bytes and queue the resulting events.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        let events = self.decoder.feed(bytes);
        self.last_input = Some(Instant::now());
        self.route(events);
    }

    fn route(&mut self, events: Vec<InputEvent>) {
        for event in events {
            match event {
                InputEvent::PaletteColor { index, color } => {
                    self.palette.record(OscColor::Palette(index, color));
                }
                InputEvent::DefaultColor { slot, color } => {
                    self.palette.record(OscColor::Default(slot, color));
                }
                InputEvent::FocusGained | InputEvent::FocusLost => {
                    tracing::trace!(?event, "terminal focus changed");
                }
                reply if self.capabilities.apply(&reply) => {}
                other => {
                    self.scene.post(other);
                }
            }
        }
    }

    fn pump_input(&mut self) {
        let mut bytes = Vec::new();
        if let Some(io) = &self.terminal {
            for batch in io.input.try_iter() {
                bytes.extend(batch);
            }
        }
        if !bytes.is_empty() {
            self.feed_input(&bytes);
            return;
        }
        let timed_out = self
            .last_input
            .is_some_and(|at| at.elapsed() >= self.config.escape_timeout);
        if timed_out && self.decoder.has_pending() {
            let events = self.decoder.flush_pending();
            self.route(events);
        }
    }

    fn poll_size(&mut self) -> Result<()> {
        if self.terminal.is_none() {
            return Ok(());
        }
        let (width, height) = TerminalSession::size()?;
        if let Err(error) = self.resize(width, height) {
            tracing::warn!(%error, "ignoring terminal resize");
        }
        Ok(())
    }

    /// Drive one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the frame cannot be
    /// written.
    pub fn render_once(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats {
            released: self.scene.release_pending(),
            ..FrameStats::default()
        };
        self.poll_size()?;
        self.pump_input();

        let (cells, hits) = (&self.cells, &self.hits);
        stats.events = self.scene.dispatch(|x, y| {
            let (x, y) = (u16::try_from(x).ok()?, u16::try_from(y).ok()?);
            cells.hit_test(x, y).and_then(|id| hits.node_for_hit(id))
        });

        let cursor_changed = self.cursor_written != Some(self.cursor);
        if !self.needs_redraw && !self.scene.is_dirty() && !cursor_changed {
            stats.skipped = true;
            return Ok(stats);
        }

        let area = self.cells.area();
        let root = self.scene.root();
        let mut layout = self.layout.layout(&self.scene, root, area);
        if self.scene.apply_layout(&layout) {
            layout = self.layout.layout(&self.scene, root, area);
            self.scene.apply_layout(&layout);
        }

        self.cells.clear(self.config.background);
        self.hits = paint_scene(&self.scene, &layout, &mut self.cells);
        stats.painted = self.hits.painted;
        self.last_layout = layout;

        self.out.clear();
        let synchronized = self.capabilities.synchronized_output;
        if synchronized {
            self.out.sync_begin();
        }
        let preamble = self.out.len();
        let diff = self.cells.flush(&mut self.out, &mut self.diff);
        stats.cells_changed = diff.cells_changed;
        if self.out.len() > preamble || cursor_changed {
            self.write_cursor();
        }
        if self.out.len() == preamble {
            self.out.clear();
        } else if synchronized {
            self.out.sync_end();
        }
        stats.bytes = self.out.len();
        self.write_frame()?;

        self.scene.mark_clean();
        self.needs_redraw = false;
        self.frames += 1;
        tracing::trace!(
            frame = self.frames,
            events = stats.events,
            painted = stats.painted,
            cells = stats.cells_changed,
            bytes = stats.bytes,
            "frame rendered"
        );
        Ok(stats)
    }

    fn write_cursor(&mut self) {
        let cursor = self.cursor;
        let previous = self.cursor_written;
        if cursor.style.is_some() && previous.map(|p| p.style) != Some(cursor.style) {
            if let Some((style, blinking)) = cursor.style {
                self.out.cursor_style(style, blinking);
            }
        }
        if cursor.color.is_some() && previous.map(|p| p.color) != Some(cursor.color) {
            if let Some(color) = cursor.color {
                self.out.cursor_color(color);
            }
        }
        if cursor.visible {
            let (x, y) = cursor.position;
            self.out.cursor_move(x, y);
            self.diff.cursor_moved(x, y);
            self.out.cursor_show();
        } else {
            self.out.cursor_hide();
        }
        self.cursor_written = Some(cursor);
    }

    fn write_frame(&mut self) -> Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }
        match self.terminal.as_mut() {
            Some(io) => io.session.write(&self.out),
            None => {
                self.sink.extend_from_slice(self.out.as_bytes());
                Ok(())
            }
        }
    }

    /// Bytes written by a headless engine since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sink)
    }

    /// Plain text of the last painted frame, one line per row.
    pub fn capture_frame(&self) -> String {
        self.cells.snapshot().to_plain_text()
    }

    /// Styled copy of the last painted frame.
    pub fn capture_styled(&self) -> FrameSnapshot {
        self.cells.snapshot()
    }

    /// Counters from every engine-owned allocator.
    pub fn metrics(&self) -> NativeMetrics {
        let buffers = self.scene.text_stats();
        NativeMetrics {
            arena_bytes: buffers.iter().map(|(_, s)| s.arena.used_bytes).sum(),
            pool: self.cells.pool_stats(),
            buffers,
            nodes_live: self.scene.live_nodes(),
            destroy_events: self.scene.destroy_events(),
            frames: self.frames,
        }
    }

    /// Stop the input thread and give the terminal back.
    ///
    /// Safe to call more than once; also run on drop.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while restoring the terminal.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(mut io) = self.terminal.take() else {
            return Ok(());
        };
        io.reader.stop();
        io.session.restore()?;
        tracing::info!(frames = self.frames, "engine destroyed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(error) = self.destroy() {
            tracing::warn!(%error, "engine teardown failed");
        }
    }
}
