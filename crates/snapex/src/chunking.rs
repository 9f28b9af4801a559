//! Boundary-aware text chunking.
//!
//! Chunks are contiguous slices of the source text, so `offset` is the byte
//! offset of the chunk's first character and `text == &source[offset..]`
//! up to the chunk length. Sizes are measured in bytes of UTF-8 text.

use serde::Serialize;

/// Unit a chunk may be split at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Blank-line separated paragraphs; oversized paragraphs fall back to
    /// lines, then whitespace.
    Paragraph,
    /// Single lines; oversized lines fall back to whitespace.
    Line,
    /// Records (one per line). A record is never split, even when it alone
    /// exceeds the chunk size.
    Row,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub offset: usize,
    pub text: String,
}

pub fn chunk_text(text: &str, chunk_size: usize, boundary: Boundary) -> Vec<TextChunk> {
    let chunk_size = chunk_size.max(1);
    let spans = match boundary {
        Boundary::Paragraph => paragraph_spans(text)
            .into_iter()
            .flat_map(|span| split_oversized(text, span, chunk_size, true))
            .collect(),
        Boundary::Line => line_spans(text)
            .into_iter()
            .flat_map(|span| split_oversized(text, span, chunk_size, false))
            .collect(),
        Boundary::Row => line_spans(text),
    };
    pack(text, &spans, chunk_size)
}

type Span = (usize, usize);

/// Greedily merges consecutive spans while the covering slice fits.
fn pack(text: &str, spans: &[Span], chunk_size: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current: Option<Span> = None;

    for &(start, end) in spans {
        current = match current {
            None => Some((start, end)),
            Some((chunk_start, _)) if end - chunk_start <= chunk_size => Some((chunk_start, end)),
            Some(done) => {
                chunks.push(to_chunk(text, done));
                Some((start, end))
            }
        };
    }
    if let Some(done) = current {
        chunks.push(to_chunk(text, done));
    }
    chunks
}

fn to_chunk(text: &str, (start, end): Span) -> TextChunk {
    TextChunk {
        offset: start,
        text: text[start..end].to_string(),
    }
}

/// Non-blank lines, excluding the newline and any trailing `\r`.
fn line_spans(text: &str) -> Vec<Span> {
    all_lines(text)
        .into_iter()
        .filter(|&(s, e)| !text[s..e].trim().is_empty())
        .collect()
}

fn all_lines(text: &str) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(trim_cr(text, start, i));
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(trim_cr(text, start, text.len()));
    }
    lines
}

fn trim_cr(text: &str, start: usize, end: usize) -> Span {
    if end > start && text.as_bytes()[end - 1] == b'\r' {
        (start, end - 1)
    } else {
        (start, end)
    }
}

fn paragraph_spans(text: &str) -> Vec<Span> {
    let mut paragraphs = Vec::new();
    let mut current: Option<Span> = None;
    for (start, end) in all_lines(text) {
        if text[start..end].trim().is_empty() {
            if let Some(p) = current.take() {
                paragraphs.push(p);
            }
            continue;
        }
        current = Some(match current {
            Some((p_start, _)) => (p_start, end),
            None => (start, end),
        });
    }
    if let Some(p) = current {
        paragraphs.push(p);
    }
    paragraphs
}

/// Splits a span larger than `chunk_size` into smaller spans: at lines first
/// (when `by_line`), then at whitespace, then at char boundaries.
fn split_oversized(text: &str, span: Span, chunk_size: usize, by_line: bool) -> Vec<Span> {
    let (start, end) = span;
    if end - start <= chunk_size {
        return vec![span];
    }
    if by_line {
        let inner: Vec<Span> = line_spans(&text[start..end])
            .into_iter()
            .map(|(s, e)| (start + s, start + e))
            .collect();
        if inner.len() > 1 {
            return inner
                .into_iter()
                .flat_map(|s| split_oversized(text, s, chunk_size, false))
                .collect();
        }
    }
    split_at_whitespace(text, span, chunk_size)
}

fn split_at_whitespace(text: &str, (start, end): Span, chunk_size: usize) -> Vec<Span> {
    let mut pieces = Vec::new();
    let mut piece_start = start;

    while end - piece_start > chunk_size {
        let window_end = floor_char_boundary(text, piece_start + chunk_size);
        let window = &text[piece_start..window_end];
        let cut = match window.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => piece_start + pos,
            _ => window_end.max(next_char_boundary(text, piece_start)),
        };
        pieces.push((piece_start, cut));

        piece_start = cut;
        while piece_start < end {
            match text[piece_start..].chars().next() {
                Some(c) if c.is_whitespace() => piece_start += c.len_utf8(),
                _ => break,
            }
        }
    }
    if piece_start < end {
        pieces.push((piece_start, end));
    }
    pieces
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    text[index..]
        .chars()
        .next()
        .map(|c| index + c.len_utf8())
        .unwrap_or(text.len())
}
