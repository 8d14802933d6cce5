//! Inline markup: `**bold**`, `*italic*`, `__underline__`, `~~strike~~`.
//!
//! Markers are paired per kind in order of appearance; a marker without a
//! partner stays in the text literally. A backslash escapes the next
//! character. The result is a single [`Chunk`] whose inline marks carry the
//! modifiers.

use super::rope::{Chunk, Mark};
use super::style::StyleOverride;
use crate::buffer::{Modifiers, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Text,
    Escape,
    Marker(Modifiers),
}

const MARKERS: [(&str, Modifiers); 4] = [
    ("**", Modifiers::BOLD),
    ("__", Modifiers::UNDERLINE),
    ("~~", Modifiers::STRIKETHROUGH),
    ("*", Modifiers::ITALIC),
];

fn tokenize(source: &str) -> Vec<(Token, &str)> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut text_start: Option<usize> = None;
    let mut pos = 0;
    while !rest.is_empty() {
        let hit = if rest.starts_with('\\') && rest.len() > 1 {
            let escaped = rest[1..].chars().next().map_or(1, char::len_utf8);
            Some((Token::Escape, 1 + escaped))
        } else {
            MARKERS
                .iter()
                .find(|(m, _)| rest.starts_with(*m))
                .map(|(m, flag)| (Token::Marker(*flag), m.len()))
        };
        match hit {
            Some((token, len)) => {
                if let Some(start) = text_start.take() {
                    tokens.push((Token::Text, &source[start..pos]));
                }
                tokens.push((token, &rest[..len]));
                rest = &rest[len..];
                pos += len;
            }
            None => {
                text_start.get_or_insert(pos);
                let len = rest.chars().next().map_or(1, char::len_utf8);
                rest = &rest[len..];
                pos += len;
            }
        }
    }
    if let Some(start) = text_start {
        tokens.push((Token::Text, &source[start..]));
    }
    tokens
}

/// Parse `source` into a chunk with inline marks on top of `base`.
pub fn parse_markup(source: &str, base: Style) -> Chunk {
    let tokens = tokenize(source);

    // pair markers of each kind in order; an odd one out is literal
    let mut paired = vec![false; tokens.len()];
    for (_, flag) in MARKERS {
        let positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, (t, _))| *t == Token::Marker(flag))
            .map(|(i, _)| i)
            .collect();
        for pair in positions.chunks_exact(2) {
            paired[pair[0]] = true;
            paired[pair[1]] = true;
        }
    }

    let mut text = String::with_capacity(source.len());
    let mut open: Vec<(Modifiers, usize)> = Vec::new();
    let mut marks = Vec::new();
    for (i, (token, raw)) in tokens.iter().enumerate() {
        match token {
            Token::Text => text.push_str(raw),
            Token::Escape => text.push_str(&raw[1..]),
            Token::Marker(flag) if paired[i] => {
                if let Some(at) = open.iter().rposition(|(f, _)| f == flag) {
                    let (_, start) = open.remove(at);
                    if start < text.len() {
                        marks.push(Mark::new(
                            start..text.len(),
                            StyleOverride::modifiers(*flag),
                        ));
                    }
                } else {
                    open.push((*flag, text.len()));
                }
            }
            Token::Marker(_) => text.push_str(raw),
        }
    }
    marks.sort_by_key(|m| m.range.start);
    Chunk::styled(text, base).with_marks(marks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark_list(chunk: &Chunk) -> Vec<(std::ops::Range<usize>, Modifiers)> {
        chunk
            .marks
            .iter()
            .map(|m| (m.range.clone(), m.style.modifiers))
            .collect()
    }

    #[test]
    fn test_plain_text_has_no_marks() {
        let chunk = parse_markup("hello", Style::default());
        assert_eq!(chunk.text, "hello");
        assert!(chunk.marks.is_empty());
    }

    #[test]
    fn test_each_marker_kind() {
        let chunk = parse_markup("**b** *i* __u__ ~~s~~", Style::default());
        assert_eq!(chunk.text, "b i u s");
        assert_eq!(
            mark_list(&chunk),
            vec![
                (0..1, Modifiers::BOLD),
                (2..3, Modifiers::ITALIC),
                (4..5, Modifiers::UNDERLINE),
                (6..7, Modifiers::STRIKETHROUGH),
            ]
        );
    }

    #[test]
    fn test_nesting() {
        let chunk = parse_markup("**bold *both***", Style::default());
        assert_eq!(chunk.text, "bold both");
        let marks = mark_list(&chunk);
        assert!(marks.contains(&(0..9, Modifiers::BOLD)));
        assert!(marks.contains(&(5..9, Modifiers::ITALIC)));
    }

    #[test]
    fn test_unpaired_marker_is_literal() {
        let chunk = parse_markup("2 * 3 = 6", Style::default());
        assert_eq!(chunk.text, "2 * 3 = 6");
        assert!(chunk.marks.is_empty());
    }

    #[test]
    fn test_escape() {
        let chunk = parse_markup(r"\*not italic\*", Style::default());
        assert_eq!(chunk.text, "*not italic*");
        assert!(chunk.marks.is_empty());
    }
}
