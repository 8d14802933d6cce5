//! End-to-end frames checked against an independent terminal emulator.
//!
//! A headless engine writes its escape sequences into memory; feeding them
//! to `vt100` must reproduce exactly what `capture_frame` claims is on
//! screen.

use tessera::{Engine, EngineConfig, Layer, NodeId, NodeKind, Rgb, Style};

fn engine(width: u16, height: u16) -> Engine {
    Engine::headless(width, height, EngineConfig::default()).unwrap()
}

/// Rows of the emulated screen, trailing whitespace trimmed.
fn screen_rows(parser: &vt100::Parser) -> Vec<String> {
    let screen = parser.screen();
    let (rows, cols) = screen.size();
    (0..rows)
        .map(|row| {
            let line: String = (0..cols)
                .filter_map(|col| screen.cell(row, col))
                .filter(|cell| !cell.is_wide_continuation())
                .map(|cell| {
                    let text = cell.contents();
                    if text.is_empty() {
                        " ".to_owned()
                    } else {
                        text
                    }
                })
                .collect();
            line.trim_end().to_owned()
        })
        .collect()
}

fn assert_screen_matches(engine: &mut Engine, parser: &mut vt100::Parser) {
    parser.process(&engine.take_output());
    let expected: Vec<String> = engine.capture_frame().lines().map(str::to_owned).collect();
    assert_eq!(screen_rows(parser), expected);
}

fn filled_box(engine: &mut Engine, parent: NodeId, x: i64, width: i64, color: Rgb) -> NodeId {
    let id = engine.create_node(NodeKind::Box);
    engine.set_property(id, "x", x).unwrap();
    engine.set_property(id, "width", width).unwrap();
    engine.set_property(id, "height", 1).unwrap();
    engine.set_property(id, "background", color).unwrap();
    engine.add_child(parent, id, None).unwrap();
    id
}

#[test]
fn test_streamed_text_lands_on_screen() {
    let mut engine = engine(20, 3);
    let mut parser = vt100::Parser::new(3, 20, 0);
    let root = engine.scene().root();
    let text = engine.create_node(NodeKind::Text);
    engine.add_child(root, text, None).unwrap();

    engine.text_mut(text).unwrap().append_str("Hello");
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);

    engine.text_mut(text).unwrap().append_str(", world");
    let stats = engine.render_once().unwrap();
    assert_eq!(stats.cells_changed, 7);
    assert_eq!(engine.scene().text(text).unwrap().chunk_count(), 1);
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "Hello, world");
}

#[test]
fn test_single_changed_cell_emits_one_color_change() {
    let mut engine = engine(3, 1);
    let mut parser = vt100::Parser::new(1, 3, 0);
    let root = engine.scene().root();
    filled_box(&mut engine, root, 0, 3, Rgb::new(255, 0, 0));
    engine.render_once().unwrap();
    parser.process(&engine.take_output());

    let green = filled_box(&mut engine, root, 1, 1, Rgb::new(0, 255, 0));
    engine.set_property(green, "z_index", 1).unwrap();
    let stats = engine.render_once().unwrap();
    assert_eq!(stats.cells_changed, 1);

    let output = engine.take_output();
    let text = String::from_utf8_lossy(&output);
    assert_eq!(text.matches("48;2;0;255;0").count(), 1);
    assert!(!text.contains("48;2;255;0;0"));

    parser.process(&output);
    let screen = parser.screen();
    assert_eq!(screen.cell(0, 0).unwrap().bgcolor(), vt100::Color::Rgb(255, 0, 0));
    assert_eq!(screen.cell(0, 1).unwrap().bgcolor(), vt100::Color::Rgb(0, 255, 0));
    assert_eq!(screen.cell(0, 2).unwrap().bgcolor(), vt100::Color::Rgb(255, 0, 0));
}

#[test]
fn test_translucent_box_blends_with_background() {
    let mut engine = engine(2, 1);
    let mut parser = vt100::Parser::new(1, 2, 0);
    let root = engine.scene().root();
    let tinted = filled_box(&mut engine, root, 0, 1, Rgb::new(255, 0, 0));
    engine.set_property(tinted, "opacity", 0.35).unwrap();
    engine.render_once().unwrap();
    parser.process(&engine.take_output());

    assert_eq!(
        parser.screen().cell(0, 0).unwrap().bgcolor(),
        vt100::Color::Rgb(89, 0, 0)
    );
    assert_eq!(engine.capture_styled().get(0, 0).unwrap().bg, Rgb::new(89, 0, 0));
}

#[test]
fn test_bordered_panel_and_moves() {
    let mut engine = engine(12, 4);
    let mut parser = vt100::Parser::new(4, 12, 0);
    let root = engine.scene().root();
    let panel = engine.create_node(NodeKind::Box);
    engine.set_property(panel, "width", 10).unwrap();
    engine.set_property(panel, "height", 3).unwrap();
    engine.set_property(panel, "border", "single").unwrap();
    engine.set_property(panel, "title", "log").unwrap();
    engine.add_child(root, panel, None).unwrap();
    let label = engine.create_node(NodeKind::Text);
    engine.set_property(label, "text", "ok").unwrap();
    engine.add_child(panel, label, None).unwrap();

    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[1], "│ok      │");

    engine.set_property(panel, "x", 2).unwrap();
    engine.set_property(panel, "y", 1).unwrap();
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "");
    assert_eq!(screen_rows(&parser)[2], "  │ok      │");
}

#[test]
fn test_wide_glyphs_survive_the_round_trip() {
    let mut engine = engine(10, 1);
    let mut parser = vt100::Parser::new(1, 10, 0);
    let root = engine.scene().root();
    let text = engine.create_node(NodeKind::Text);
    engine.add_child(root, text, None).unwrap();
    engine.text_mut(text).unwrap().append_str("日本語ok");
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "日本語ok");
}

#[test]
fn test_resize_repaints_whole_screen() {
    let mut engine = engine(6, 2);
    let root = engine.scene().root();
    let text = engine.create_node(NodeKind::Text);
    engine.set_property(text, "text", "abc").unwrap();
    engine.add_child(root, text, None).unwrap();
    engine.render_once().unwrap();
    let _ = engine.take_output();

    engine.resize(8, 3).unwrap();
    let stats = engine.render_once().unwrap();
    assert!(!stats.skipped);
    assert_eq!(stats.cells_changed, 24);

    let mut parser = vt100::Parser::new(3, 8, 0);
    parser.process(b"garbage everywhere");
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "abc");
}

#[test]
fn test_destroyed_subtree_disappears() {
    let mut engine = engine(8, 2);
    let mut parser = vt100::Parser::new(2, 8, 0);
    let root = engine.scene().root();
    let group = engine.create_node(NodeKind::Box);
    engine.add_child(root, group, None).unwrap();
    let text = engine.create_node(NodeKind::Text);
    engine.set_property(text, "text", "bye").unwrap();
    engine.add_child(group, text, None).unwrap();
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);

    assert_eq!(engine.destroy_node(group).unwrap(), 2);
    let stats = engine.render_once().unwrap();
    assert_eq!(stats.released, 2);
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "");
}

#[test]
fn test_visible_cursor_does_not_misplace_next_frame() {
    let mut engine = engine(10, 3);
    let mut parser = vt100::Parser::new(3, 10, 0);
    let root = engine.scene().root();
    let text = engine.create_node(NodeKind::Text);
    engine.add_child(root, text, None).unwrap();

    engine.text_mut(text).unwrap().append_str("abc");
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);

    engine.set_cursor(0, 2, true);
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(parser.screen().cursor_position(), (2, 0));

    engine.text_mut(text).unwrap().append_str("d");
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "abcd");
    assert_eq!(parser.screen().cursor_position(), (2, 0));
    assert!(!parser.screen().hide_cursor());
}

#[test]
fn test_framebuffer_shows_lower_layers_through_unpainted_cells() {
    let mut engine = engine(6, 2);
    let mut parser = vt100::Parser::new(2, 6, 0);
    let root = engine.scene().root();
    filled_box(&mut engine, root, 0, 6, Rgb::new(0, 0, 255));

    let fb = engine.create_framebuffer(4, 2).unwrap();
    engine.set_property(fb, "respect_alpha", true).unwrap();
    engine.set_property(fb, "z_index", 1).unwrap();
    engine.add_child(root, fb, None).unwrap();
    let grid = engine.framebuffer_mut(fb).unwrap();
    let area = grid.area();
    grid.draw_text(0, 0, "ab", Style::default(), Layer::opaque(area));
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_eq!(screen_rows(&parser)[0], "ab");
    assert_eq!(
        parser.screen().cell(0, 3).unwrap().bgcolor(),
        vt100::Color::Rgb(0, 0, 255)
    );

    engine.set_property(fb, "respect_alpha", false).unwrap();
    engine.render_once().unwrap();
    assert_screen_matches(&mut engine, &mut parser);
    assert_ne!(
        parser.screen().cell(0, 3).unwrap().bgcolor(),
        vt100::Color::Rgb(0, 0, 255)
    );
}
