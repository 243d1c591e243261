//! Markdown source coordinates.
//!
//! Every node in the syntax tree carries a [`SourcePos`]: a pair of 1-based
//! `(line, column)` positions, inclusive at both ends. Columns count
//! characters, not bytes, so they line up with the character offsets used by
//! the rich document tree.

use serde::{Deserialize, Serialize};

/// A 1-based `(line, column)` position in the markdown source.
///
/// Ordering is line-major, which matches document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinePos {
    pub line: usize,
    pub col: usize,
}

impl LinePos {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Returns the position `n` columns to the right on the same line.
    #[must_use]
    pub fn shifted(self, n: isize) -> Self {
        let col = (self.col as isize + n).max(1) as usize;
        Self { line: self.line, col }
    }
}

impl std::fmt::Display for LinePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Inclusive start/end source span of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub start: LinePos,
    pub end: LinePos,
}

impl SourcePos {
    pub const fn new(start: LinePos, end: LinePos) -> Self {
        Self { start, end }
    }

    /// Whether `pos` lies inside the span (both ends inclusive).
    pub fn contains(&self, pos: LinePos) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Whether the span touches any line in `first..=last`.
    pub fn overlaps_lines(&self, first: usize, last: usize) -> bool {
        self.start.line <= last && self.end.line >= first
    }
}

/// Byte offset ⇄ [`LinePos`] conversion for one source string.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset at which each line starts. Always non-empty.
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: text.len(),
        }
    }

    /// Number of lines, counting a trailing empty line after a final newline.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset at which `line` (1-based) starts. Lines past the end clamp
    /// to the end of the text.
    pub fn line_start(&self, line: usize) -> usize {
        match line.checked_sub(1).and_then(|i| self.line_starts.get(i)) {
            Some(start) => *start,
            None if line == 0 => 0,
            None => self.len,
        }
    }

    /// Converts a byte offset into a position. `text` must be the string this
    /// index was built from.
    pub fn pos_of(&self, text: &str, offset: usize) -> LinePos {
        let offset = offset.min(self.len);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line_idx];
        let col = text
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        LinePos::new(line_idx + 1, col + 1)
    }

    /// Converts a position back into a byte offset, clamping the line to the
    /// document and the column to the line's end.
    pub fn offset_of(&self, text: &str, pos: LinePos) -> usize {
        let line = pos.line.clamp(1, self.line_count());
        let start = self.line_start(line);
        let end = self
            .line_starts
            .get(line)
            .map_or(self.len, |next| next.saturating_sub(1));
        let line_text = text.get(start..end).unwrap_or_default();
        let byte_col = line_text
            .char_indices()
            .nth(pos.col.saturating_sub(1))
            .map_or(line_text.len(), |(i, _)| i);
        start + byte_col
    }
}
