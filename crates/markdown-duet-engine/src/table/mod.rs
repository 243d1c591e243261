//! Table geometry and table editing.
//!
//! Tables carry merged cells through a text prefix on the cell content:
//! `@cols=2:` and/or `@rows=3:`. Both the to-rich builder and the offset index
//! place cells with the same [`SlotGrid`] so they agree on which column each
//! cell starts in.

pub mod cache;
pub mod commands;
pub mod index;

use std::sync::OnceLock;

use regex::Regex;

use crate::rich::{CellAttrs, NodeKind, Offset, RichNode};

pub use cache::TableIndexCache;
pub use commands::{Side, add_column, add_row, remove_columns, remove_rows, set_column_align};
pub use index::{CellRect, TableCellInfo, TableOffsetIndex};

fn span_prefix_regex() -> &'static Regex {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    SPAN.get_or_init(|| Regex::new(r"^@(cols|rows)=(\d+):").expect("Invalid span prefix regex"))
}

/// Reads the merged-cell prefix off the start of a cell's text. Returns
/// `(colspan, rowspan, prefix_len)` where `prefix_len` is in bytes.
pub fn parse_span_prefix(text: &str) -> (usize, usize, usize) {
    let (mut colspan, mut rowspan, mut consumed) = (1, 1, 0);
    for _ in 0..2 {
        let Some(caps) = span_prefix_regex().captures(&text[consumed..]) else {
            break;
        };
        let value = caps[2].parse::<usize>().unwrap_or(1).max(1);
        match &caps[1] {
            "cols" => colspan = value,
            _ => rowspan = value,
        }
        consumed += caps[0].len();
    }
    (colspan, rowspan, consumed)
}

pub fn span_prefix(attrs: &CellAttrs) -> String {
    let mut out = String::new();
    if attrs.colspan > 1 {
        out.push_str(&format!("@cols={}:", attrs.colspan));
    }
    if attrs.rowspan > 1 {
        out.push_str(&format!("@rows={}:", attrs.rowspan));
    }
    out
}

/// Column bookkeeping for placing cells row by row when earlier rows may
/// still cover some columns through a rowspan.
#[derive(Debug, Default, Clone)]
pub struct SlotGrid {
    /// For each column, how many more rows (counting the next one) a cell
    /// from above still covers.
    covered: Vec<usize>,
}

impl SlotGrid {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_covered(&self, col: usize) -> bool {
        self.covered.get(col).is_some_and(|rows| *rows > 0)
    }

    /// Places one row of `(colspan, rowspan)` cells and returns the column
    /// each cell starts in.
    pub fn place_row(&mut self, spans: &[(usize, usize)]) -> Vec<usize> {
        let mut next: Vec<usize> = self.covered.iter().map(|r| r.saturating_sub(1)).collect();
        let mut starts = Vec::with_capacity(spans.len());
        let mut col = 0;
        for &(colspan, rowspan) in spans {
            while self.is_covered(col) {
                col += 1;
            }
            starts.push(col);
            let end = col + colspan.max(1);
            if next.len() < end {
                next.resize(end, 0);
            }
            for slot in &mut next[col..end] {
                *slot = (*slot).max(rowspan.saturating_sub(1));
            }
            col = end;
        }
        self.covered = next;
        starts
    }
}

/// Cells of a row as `(colspan, rowspan)` pairs.
pub fn row_spans(row: &RichNode) -> Vec<(usize, usize)> {
    row.content()
        .iter()
        .map(|cell| {
            let attrs = cell.kind().cell_attrs().unwrap_or_default();
            (attrs.colspan, attrs.rowspan)
        })
        .collect()
}

/// Rows of a table, head rows first, each with the position right before
/// it (relative to the table's content start).
pub fn table_rows(table: &RichNode) -> Vec<(Offset, &RichNode)> {
    let mut rows = Vec::new();
    for (section_at, section) in table.children_with_offsets() {
        if !matches!(section.kind(), NodeKind::TableHead | NodeKind::TableBody) {
            continue;
        }
        for (row_at, row) in section.children_with_offsets() {
            rows.push((section_at + 1 + row_at, row));
        }
    }
    rows
}

/// Innermost table around `pos`: the position right before it and the node.
pub fn find_table(doc: &RichNode, pos: Offset) -> Option<(Offset, &RichNode)> {
    let resolved = doc.resolve(pos);
    let depth = resolved.find_depth(|node| node.kind() == &NodeKind::Table)?;
    if depth == 0 {
        return None;
    }
    Some((resolved.before(depth), resolved.node(depth)))
}
