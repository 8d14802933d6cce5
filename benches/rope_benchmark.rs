//! TextBuffer benchmark: Measure chunked text storage performance.
//!
//! Target: < 1µs per streamed append, efficient at scale

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera::text::{rehighlight_dirty, StyleOverride};
use tessera::{Chunk, HighlightSpan, Highlighter, Modifiers, Rgb, Style, TextBuffer};

struct Keywords;

impl Highlighter for Keywords {
    fn highlight_line(&mut self, _line: usize, text: &str) -> Vec<HighlightSpan> {
        text.match_indices("fn")
            .map(|(at, m)| HighlightSpan::new(at..at + m.len(), StyleOverride::modifiers(Modifiers::BOLD)))
            .collect()
    }
}

fn text_append_token(c: &mut Criterion) {
    c.bench_function("text_append_token", |b| {
        let mut buffer = TextBuffer::new();
        b.iter(|| {
            buffer.append_str(black_box("token "));
        });
    });
}

fn text_append_styled_line(c: &mut Criterion) {
    let style = Style::fg(Rgb::new(128, 200, 100));

    c.bench_function("text_append_styled_line", |b| {
        let mut buffer = TextBuffer::new();
        b.iter(|| {
            buffer.append(Chunk::styled(black_box("fn main() { println!(\"hi\"); }\n"), style));
        });
    });
}

fn text_append_line_at_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_append_line");

    for line_count in [1_000, 100_000] {
        let mut buffer = TextBuffer::new();
        for _ in 0..line_count {
            buffer.append_str("line\n");
        }
        group.bench_with_input(BenchmarkId::new("onto_lines", line_count), &line_count, |b, _| {
            b.iter(|| buffer.append_str(black_box("line\n")));
        });
    }

    group.finish();
}

fn text_line_lookup(c: &mut Criterion) {
    let mut buffer = TextBuffer::new();
    for i in 0..50_000 {
        buffer.append_str(&format!("line {i}\n"));
    }
    buffer.line_count();

    c.bench_function("text_line_at_50k", |b| {
        b.iter(|| buffer.line_at(black_box(25_000)))
    });
}

fn text_replace_middle(c: &mut Criterion) {
    let mut buffer = TextBuffer::new();
    for i in 0..1_000 {
        buffer.append(Chunk::styled(format!("chunk {i}\n"), Style::fg(Rgb::new(i as u8, 0, 0))));
    }

    c.bench_function("text_replace_middle_1k", |b| {
        b.iter(|| {
            let anchor = buffer.chunk_ref(500).unwrap();
            buffer.replace(Chunk::new(black_box("replaced\n")), anchor).unwrap()
        });
    });
}

fn text_rehighlight(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_rehighlight");

    for line_count in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("dirty_lines", line_count), &line_count, |b, &count| {
            b.iter(|| {
                let mut buffer = TextBuffer::new();
                for _ in 0..count {
                    buffer.append_str("fn demo() {}\n");
                }
                black_box(rehighlight_dirty(&buffer, &mut Keywords).unwrap())
            });
        });
    }

    group.finish();
}

fn text_stats(c: &mut Criterion) {
    let mut buffer = TextBuffer::new();
    for _ in 0..50_000 {
        buffer.append_str("xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\n");
    }

    c.bench_function("text_stats_50k", |b| b.iter(|| black_box(buffer.stats())));
}

criterion_group!(
    benches,
    text_append_token,
    text_append_styled_line,
    text_append_line_at_scale,
    text_line_lookup,
    text_replace_middle,
    text_rehighlight,
    text_stats,
);
criterion_main!(benches);
