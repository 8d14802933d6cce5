//! Streaming Demo: High-frequency token streaming into a text node.
//!
//! Simulates an agent streaming tokens at ~100 tokens/s into a scroll box
//! while a keyword highlighter marks `fn`, `let` and `mut`. Logs go to
//! `streaming_demo.log`; set `RUST_LOG=tessera=trace` for per-frame detail.
//!
//! Press 'q' or Escape to quit, 'r' to restart.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tessera::text::{rehighlight_dirty, StyleOverride};
use tessera::{
    Engine, EngineConfig, Event, EventKind, HighlightSpan, Highlighter, KeyCode, KeyModifiers, Modifiers,
    NodeKind, Rgb,
};
use tracing_subscriber::EnvFilter;

/// Sample text to stream (simulating an agent response).
const SAMPLE_TEXT: &str = r#"Here is how the frame pipeline works.

Every tick the engine releases destroyed nodes, drains the input thread,
dispatches queued events, lays the tree out, paints it into the back grid
and diffs that grid against what the terminal already shows.

    fn render_once(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        let layout = self.layout.layout(&self.scene, root, area);
        // paint, diff, write
    }

Only runs of changed cells go out, each with one colour change, and the
whole frame is written in a single call. Streaming text appends merge into
the last chunk, so a long answer stays a handful of chunks no matter how
many tokens it arrived in.
"#;

struct Keywords;

impl Highlighter for Keywords {
    fn highlight_line(&mut self, _line: usize, text: &str) -> Vec<HighlightSpan> {
        let style = StyleOverride::fg(Rgb::new(255, 170, 60)).with_modifiers(Modifiers::BOLD);
        let mut spans = Vec::new();
        let mut offset = 0;
        for word in text.split_inclusive(|c: char| !c.is_alphanumeric() && c != '_') {
            let bare = word.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if matches!(bare, "fn" | "let" | "mut" | "self") {
                spans.push(HighlightSpan::new(offset..offset + bare.len(), style));
            }
            offset += word.len();
        }
        spans
    }
}

fn main() -> tessera::Result<()> {
    let log = std::fs::File::create("streaming_demo.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessera=debug")))
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .init();

    let mut engine = Engine::with_terminal(EngineConfig::default())?;
    let root = engine.scene().root();
    let width = i64::from(engine.width());

    // Header
    let header = engine.create_node(NodeKind::Text);
    engine.set_property(header, "text", " Tessera Streaming Demo")?;
    engine.set_property(header, "width", width)?;
    engine.set_property(header, "background", Rgb::new(40, 80, 120))?;
    engine.add_child(root, header, None)?;

    // Content
    let panel = engine.create_node(NodeKind::Box);
    engine.set_property(panel, "y", 1)?;
    engine.set_property(panel, "height", i64::from(engine.height().saturating_sub(2)))?;
    engine.set_property(panel, "border", "rounded")?;
    engine.set_property(panel, "title", " agent ")?;
    engine.set_property(panel, "border_color", Rgb::new(90, 90, 120))?;
    engine.add_child(root, panel, None)?;
    let scroll = engine.create_node(NodeKind::ScrollBox);
    engine.add_child(panel, scroll, None)?;
    let stream = engine.create_node(NodeKind::Text);
    engine.set_property(stream, "wrap", "char")?;
    engine.add_child(scroll, stream, None)?;

    // Footer
    let footer = engine.create_node(NodeKind::Text);
    engine.set_property(footer, "y", i64::from(engine.height().saturating_sub(1)))?;
    engine.set_property(footer, "width", width)?;
    engine.set_property(footer, "background", Rgb::new(30, 30, 30))?;
    engine.add_child(root, footer, None)?;

    // Keys go to the root
    let quit = Rc::new(Cell::new(false));
    let restart = Rc::new(Cell::new(false));
    let (q, r) = (Rc::clone(&quit), Rc::clone(&restart));
    engine.on(
        root,
        EventKind::Key,
        Box::new(move |event: &Event, _: &mut tessera::scene::EventContext| {
            if let Event::Key { code, modifiers } = event {
                match code {
                    KeyCode::Char('q') | KeyCode::Esc => q.set(true),
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => q.set(true),
                    KeyCode::Char('r') => r.set(true),
                    _ => {}
                }
            }
        }),
    )?;
    engine.focus(root)?;

    // Streaming state
    let chars: Vec<char> = SAMPLE_TEXT.chars().collect();
    let mut char_index = 0;
    let mut token_count = 0u64;
    let mut last_token = Instant::now();
    let token_interval = Duration::from_millis(10); // ~100 tokens/s
    let frame_interval = Duration::from_millis(16);
    let start = Instant::now();

    while !quit.get() {
        let frame_start = Instant::now();

        if restart.replace(false) {
            engine.text_mut(stream)?.clear();
            char_index = 0;
            token_count = 0;
        }

        if char_index < chars.len() && last_token.elapsed() >= token_interval {
            // 1-3 chars per "token"
            let end = (char_index + (char_index * 7) % 3 + 1).min(chars.len());
            let token: String = chars[char_index..end].iter().collect();
            let text = engine.text_mut(stream)?;
            text.append_str(&token);
            rehighlight_dirty(text, &mut Keywords)?;
            engine.set_property(scroll, "scroll_y", i64::MAX)?;
            char_index = end;
            token_count += 1;
            last_token = Instant::now();
        }

        let elapsed = start.elapsed().as_secs_f32();
        let fps = if elapsed > 0.0 {
            engine.frame_count() as f32 / elapsed
        } else {
            0.0
        };
        let status = if char_index < chars.len() {
            format!(" 'q' quit | tokens: {token_count} | fps: {fps:.1} | {char_index}/{}", chars.len())
        } else {
            format!(" Done! {token_count} tokens streamed. 'r' restart, 'q' quit.")
        };
        engine.set_property(footer, "text", status)?;

        engine.render_once()?;

        if let Some(rest) = frame_interval.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let metrics = engine.metrics();
    tracing::info!(
        frames = metrics.frames,
        arena_bytes = metrics.arena_bytes,
        nodes = metrics.nodes_live,
        "demo finished"
    );
    engine.destroy()
}
