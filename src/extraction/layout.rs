//! Heuristic reflow for text produced by structured PDF extraction.
//!
//! Extractors often emit one physical line per visual fragment. Runs of short lines are merged
//! into paragraphs; blank lines and long lines are hard boundaries that are never merged across.

use regex::Regex;
use std::sync::LazyLock;

/// Lines with at least this many characters are emitted as standalone paragraphs.
pub const LONG_LINE_CHARS: usize = 120;

/// Merge runs of short lines into paragraphs separated by blank lines.
pub fn normalize(raw_text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for line in physical_lines(raw_text) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut buffer, &mut paragraphs);
            continue;
        }
        if line.chars().count() < LONG_LINE_CHARS {
            buffer.push(trimmed);
        } else {
            flush(&mut buffer, &mut paragraphs);
            paragraphs.push(trimmed.to_string());
        }
    }
    flush(&mut buffer, &mut paragraphs);

    paragraphs.join("\n\n").trim().to_string()
}

/// Split on every line boundary an extractor may emit, not only `\n` and `\r\n`.
///
/// A `\r\n` pair counts as one break. A trailing boundary does not produce an empty last line.
fn physical_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if !is_line_boundary(ch) {
            continue;
        }
        lines.push(&text[start..index]);
        start = index + ch.len_utf8();
        if ch == '\r' && matches!(chars.peek(), Some(&(_, '\n'))) {
            chars.next();
            start += 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn is_line_boundary(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

fn flush(buffer: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if !buffer.is_empty() {
        paragraphs.push(buffer.join(" "));
        buffer.clear();
    }
}

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static REFERENCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"References|REFERENCES|Bibliography").expect("valid references pattern")
});

/// Collapse whitespace and drop everything from the references section onward.
///
/// Paragraph breaks are lost, so this runs after extraction and only when requested.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(text, " ");
    let body = match REFERENCES_HEADING.find(&collapsed) {
        Some(heading) => &collapsed[..heading.start()],
        None => &collapsed[..],
    };
    body.trim().to_string()
}
