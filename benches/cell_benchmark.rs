//! Cell benchmark: Comparison and compositing cost of single cells.
//!
//! Target: < 1ns per comparison

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera::{Bounds, Cell, CellBuffer, Layer, Modifiers, Rect, Rgb, Rgba, Style};

fn cell_equality_same(c: &mut Criterion) {
    let cell_a = Cell::new('A')
        .with_fg(Rgb::new(255, 128, 64))
        .with_bg(Rgb::new(32, 32, 32))
        .with_modifiers(Modifiers::BOLD);
    let cell_b = cell_a;

    c.bench_function("cell_eq_same", |b| {
        b.iter(|| black_box(&cell_a) == black_box(&cell_b))
    });
}

fn cell_equality_different_color(c: &mut Criterion) {
    let cell_a = Cell::new('A').with_fg(Rgb::new(255, 0, 0));
    let cell_b = Cell::new('A').with_fg(Rgb::new(0, 255, 0));

    c.bench_function("cell_eq_diff_color", |b| {
        b.iter(|| black_box(&cell_a) == black_box(&cell_b))
    });
}

fn cell_from_char(c: &mut Criterion) {
    c.bench_function("cell_from_char_ascii", |b| {
        b.iter(|| Cell::from_char(black_box('A')))
    });

    c.bench_function("cell_from_char_cjk", |b| {
        b.iter(|| Cell::from_char(black_box('日')))
    });
}

fn composite_opaque_and_translucent(c: &mut Criterion) {
    let mut cells = CellBuffer::new(200, 50).unwrap();
    let area = Rect::from_size(200, 50);
    let opaque = Style::fg(Rgb::WHITE).with_bg(Rgb::new(20, 20, 30));
    let tint = Style::default().with_bg(Rgba::new(255, 0, 0, 128));

    c.bench_function("fill_200x50_opaque", |b| {
        b.iter(|| {
            cells.fill_rect(Bounds::from(area), black_box(opaque), Layer::opaque(area));
        })
    });

    c.bench_function("fill_200x50_half_alpha", |b| {
        b.iter(|| {
            cells.fill_rect(Bounds::from(area), black_box(tint), Layer::new(1, 0.5, area));
        })
    });
}

fn paint_grapheme_clusters(c: &mut Criterion) {
    let mut cells = CellBuffer::new(80, 1).unwrap();
    let layer = Layer::opaque(Rect::from_size(80, 1));
    let style = Style::default();

    c.bench_function("paint_family_emoji", |b| {
        b.iter(|| {
            cells.clear(Rgb::BLACK);
            for x in (0..80).step_by(2) {
                cells.paint_grapheme(x, 0, black_box("👨‍👩‍👧"), style, layer);
            }
        })
    });
}

criterion_group!(
    benches,
    cell_equality_same,
    cell_equality_different_color,
    cell_from_char,
    composite_opaque_and_translucent,
    paint_grapheme_clusters,
);
criterion_main!(benches);
