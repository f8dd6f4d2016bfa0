//! Markdown-aware paragraph chunker.
//!
//! Splits a document into [`Chunk`]s of at most `max_chars` characters so
//! that search hits point at a section rather than a whole page.
//!
//! # Algorithm
//!
//! 1. Split text on `\n\n` paragraph boundaries.
//! 2. A paragraph that opens with an ATX heading (`#`..`######`) always
//!    starts a new chunk and becomes the heading of the chunks that follow.
//! 3. Other paragraphs accumulate into a buffer until adding the next one
//!    would exceed `max_chars`.
//! 4. A single paragraph longer than `max_chars` is hard-split at the
//!    nearest newline or space boundary.
//! 5. Every document yields at least one chunk, even when empty.
//!
//! # Example
//!
//! ```rust
//! use prometheus_mcp_core::chunk::chunk_markdown;
//!
//! let chunks = chunk_markdown("querying/basics.md", "# Basics\n\nSelect series.", 2000);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "querying/basics.md#0");
//! assert_eq!(chunks[0].heading.as_deref(), Some("Basics"));
//! ```

/// Target chunk size in bytes of text.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// A contiguous section of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `<path>#<index>`.
    pub id: String,
    pub path: String,
    pub index: usize,
    /// Nearest preceding heading, without the leading `#`s.
    pub heading: Option<String>,
    pub text: String,
}

/// Split `text` into chunks on paragraph boundaries, respecting `max_chars`.
///
/// Chunk indices are contiguous from 0. `max_chars` of 0 is treated as 1.
pub fn chunk_markdown(path: &str, text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut builder = ChunkBuilder {
        path,
        chunks: Vec::new(),
        heading: None,
    };
    let mut buf = String::new();
    let mut buf_heading: Option<String> = None;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(title) = heading_of(trimmed) {
            builder.flush(&mut buf, buf_heading.take());
            builder.heading = Some(title.to_string());
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            builder.flush(&mut buf, buf_heading.take());
        }

        if trimmed.len() > max_chars {
            builder.flush(&mut buf, buf_heading.take());
            let heading = builder.heading.clone();
            for piece in hard_split(trimmed, max_chars) {
                builder.push(piece, heading.clone());
            }
            continue;
        }

        if buf.is_empty() {
            buf_heading = builder.heading.clone();
        } else {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
    }

    builder.flush(&mut buf, buf_heading);

    if builder.chunks.is_empty() {
        builder.push(text.trim(), None);
    }
    builder.chunks
}

struct ChunkBuilder<'a> {
    path: &'a str,
    chunks: Vec<Chunk>,
    heading: Option<String>,
}

impl ChunkBuilder<'_> {
    fn flush(&mut self, buf: &mut String, heading: Option<String>) {
        if buf.is_empty() {
            return;
        }
        let text = std::mem::take(buf);
        self.push(&text, heading);
    }

    fn push(&mut self, text: &str, heading: Option<String>) {
        let index = self.chunks.len();
        self.chunks.push(Chunk {
            id: format!("{}#{}", self.path, index),
            path: self.path.to_string(),
            index,
            heading,
            text: text.to_string(),
        });
    }
}

/// Title of an ATX heading paragraph (`## Title`), if `para` starts with one.
fn heading_of(para: &str) -> Option<&str> {
    let line = para.lines().next()?;
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim())
}

/// Hard-split an oversized paragraph at newline or space boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = &remaining[split_at..];
    }
    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
