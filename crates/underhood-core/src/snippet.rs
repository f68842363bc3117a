//! Matched lines rendered as display snippets.

use serde::Serialize;
use underhood_index::{FileMatch, LineMatch};

/// Lines longer than this many characters are clipped.
pub const MAX_LINE_CHARS: usize = 250;
/// Characters kept on each side of a clipped line.
pub const CLIP_CONTEXT_CHARS: usize = 30;
pub const CLIP_MARKER: &str = " [...] ";

/// 0-based line, byte column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Point {
    pub line: usize,
    pub column: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Range {
    pub from: Point,
    pub to: Point,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub snippet_text: String,
    /// The whole line.
    pub full_span: Range,
    /// The first match on the line.
    pub occurrence_span: Range,
}

pub fn snippet(line: &LineMatch) -> Snippet {
    let row = line.line_number.saturating_sub(1);
    let full_span = Range {
        from: Point { line: row, column: 0 },
        to: Point {
            line: row,
            column: line.line_end.saturating_sub(line.line_start),
        },
    };
    let occurrence_span = match line.fragments.first() {
        Some(fragment) => Range {
            from: Point {
                line: row,
                column: fragment.line_offset,
            },
            to: Point {
                line: row,
                column: fragment.line_offset + fragment.match_length,
            },
        },
        None => Range {
            from: full_span.from,
            to: full_span.from,
        },
    };
    Snippet {
        snippet_text: clip_line(&String::from_utf8_lossy(&line.line)),
        full_span,
        occurrence_span,
    }
}

pub fn file_snippets(file: &FileMatch) -> Vec<Snippet> {
    file.line_matches.iter().map(snippet).collect()
}

/// Keep the head and tail of an overlong line around [`CLIP_MARKER`].
pub fn clip_line(text: &str) -> String {
    let count = text.chars().count();
    if count <= MAX_LINE_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(CLIP_CONTEXT_CHARS).collect();
    let tail: String = text.chars().skip(count - CLIP_CONTEXT_CHARS).collect();
    format!("{head}{CLIP_MARKER}{tail}")
}
