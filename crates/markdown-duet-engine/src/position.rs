//! Markdown `(line, column)` ⇄ line-document offsets.
//!
//! Line `n` of the markdown source is block `n - 1` of the line document.
//! Inside a line, columns and offsets advance together except across
//! widgets: a widget node is two positions wider than its markdown text (its
//! opening and closing token), so every widget wholly before a column shifts
//! the offset by 2.
//!
//! Positions that fall inside a widget have no exact counterpart and snap to
//! the widget's start. Out-of-range input is clamped.

use markdown_duet_syntax::LinePos;

use crate::rich::{NodeKind, Offset, RichNode};

pub struct PositionMapper<'a> {
    doc: &'a RichNode,
    /// Offset right before each top-level block.
    block_starts: Vec<Offset>,
}

/// One inline child of a line as seen from the markdown side.
enum Run {
    Text { chars: usize },
    Widget { chars: usize },
    Other,
}

fn runs(block: &RichNode) -> impl Iterator<Item = Run> + '_ {
    block.content().iter().map(|child| match child.kind() {
        NodeKind::Text { text } => Run::Text {
            chars: text.chars().count(),
        },
        NodeKind::Widget { .. } => Run::Widget {
            chars: child.content_size(),
        },
        _ => Run::Other,
    })
}

impl Run {
    fn markdown_len(&self) -> usize {
        match self {
            Run::Text { chars } | Run::Widget { chars } => *chars,
            Run::Other => 1,
        }
    }

    fn rich_len(&self) -> usize {
        match self {
            Run::Text { chars } => *chars,
            Run::Widget { chars } => chars + 2,
            Run::Other => 1,
        }
    }
}

impl<'a> PositionMapper<'a> {
    pub fn new(doc: &'a RichNode) -> Self {
        let block_starts = doc.children_with_offsets().map(|(at, _)| at).collect();
        Self { doc, block_starts }
    }

    pub fn block_count(&self) -> usize {
        self.block_starts.len()
    }

    /// Markdown length of line `line` (1-based), in characters.
    pub fn line_len(&self, line: usize) -> usize {
        self.doc
            .child(line.saturating_sub(1))
            .map_or(0, |block| runs(block).map(|r| r.markdown_len()).sum())
    }

    /// Offset right before the block of `line`, clamped to the document.
    pub fn block_start(&self, line: usize) -> Offset {
        if self.block_count() == 0 {
            return 0;
        }
        self.block_starts[self.clamp_line(line) - 1]
    }

    pub(crate) fn clamp_line(&self, line: usize) -> usize {
        let last = self.block_count().max(1);
        let clamped = line.clamp(1, last);
        if clamped != line {
            log::debug!("line {line} clamped to {clamped}");
        }
        clamped
    }

    fn to_offset(&self, pos: LinePos) -> Offset {
        if self.block_count() == 0 {
            return 0;
        }
        let line = self.clamp_line(pos.line);
        let block = &self.doc.content()[line - 1];
        let max_col = self.line_len(line) + 1;
        let col = pos.col.clamp(1, max_col);
        if col != pos.col {
            log::debug!("column {} clamped to {col} on line {line}", pos.col);
        }

        // Walk the runs: `md` is the markdown column index, `rich` the
        // offset inside the block content.
        let target = col - 1;
        let (mut md, mut rich) = (0, 0);
        for run in runs(block) {
            let len = run.markdown_len();
            if target < md + len {
                if matches!(run, Run::Widget { .. }) {
                    // Inside a widget: snap to its start.
                    break;
                }
                rich += target - md;
                md = target;
                break;
            }
            md += len;
            rich += run.rich_len();
        }
        if md < target {
            rich += target - md;
        }
        let offset = self.block_starts[line - 1] + 1 + rich;
        offset.min(self.doc.content_size())
    }

    /// Maps a markdown selection onto the line document.
    pub fn line_pos_to_rich_offset(&self, start: LinePos, end: LinePos) -> (Offset, Offset) {
        let from = self.to_offset(start);
        let to = if start == end {
            from
        } else {
            self.to_offset(end)
        };
        (from, to)
    }

    pub fn rich_offset_to_line_pos(&self, offset: Offset) -> LinePos {
        let size = self.doc.content_size();
        if self.block_count() == 0 {
            return LinePos::new(1, 1);
        }
        if offset >= size {
            if offset > size {
                log::debug!("offset {offset} clamped to document end {size}");
            }
            let line = self.block_count();
            return LinePos::new(line, self.line_len(line) + 1);
        }
        // A block boundary belongs to the block that follows it.
        let index = match self.block_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let block = &self.doc.content()[index];
        let within = offset.saturating_sub(self.block_starts[index] + 1);

        let (mut md, mut rich) = (0, 0);
        for run in runs(block) {
            let len = run.rich_len();
            if within < rich + len {
                if matches!(run, Run::Widget { .. }) {
                    break;
                }
                md += within - rich;
                rich = within;
                break;
            }
            rich += len;
            md += run.markdown_len();
        }
        if rich < within {
            md += within - rich;
        }
        let col = (md + 1).min(self.line_len(index + 1) + 1);
        LinePos::new(index + 1, col)
    }

    pub fn rich_range_to_line_pos(&self, from: Offset, to: Offset) -> (LinePos, LinePos) {
        let start = self.rich_offset_to_line_pos(from);
        let end = if from == to {
            start
        } else {
            self.rich_offset_to_line_pos(to)
        };
        (start, end)
    }
}

pub fn map_markdown_pos_to_rich_offset(
    doc: &RichNode,
    start: LinePos,
    end: LinePos,
) -> (Offset, Offset) {
    PositionMapper::new(doc).line_pos_to_rich_offset(start, end)
}

pub fn map_rich_offset_to_markdown_pos(
    doc: &RichNode,
    from: Offset,
    to: Offset,
) -> (LinePos, LinePos) {
    PositionMapper::new(doc).rich_range_to_line_pos(from, to)
}
