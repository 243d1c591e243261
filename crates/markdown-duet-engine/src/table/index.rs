//! Row × column cell geometry of one table.

use super::{SlotGrid, row_spans, table_rows};
use crate::rich::{NodeKey, NodeKind, Offset, RichNode};

/// Geometry of one slot of the table grid. Slots covered by a merged cell
/// repeat the merged cell's geometry and record where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCellInfo {
    /// Position right before the cell node.
    pub offset: Offset,
    pub node_size: usize,
    /// `(row, col)` of the cell covering this slot, when that is another slot.
    pub span_origin: Option<(usize, usize)>,
    pub colspan: usize,
    pub rowspan: usize,
}

impl TableCellInfo {
    pub fn end(&self) -> Offset {
        self.offset + self.node_size
    }
}

/// Inclusive rectangle of grid slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl CellRect {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.top..=self.bottom).contains(&row) && (self.left..=self.right).contains(&col)
    }
}

#[derive(Debug, Clone)]
pub struct TableOffsetIndex {
    table: NodeKey,
    /// Position right before the table node.
    table_start: Offset,
    /// Position right before each row.
    row_starts: Vec<Offset>,
    row_sizes: Vec<usize>,
    head_rows: usize,
    start_offset: Offset,
    end_offset: Offset,
    cells: Vec<Vec<TableCellInfo>>,
}

impl TableOffsetIndex {
    /// Indexes `table`, which sits right after position `table_start`.
    pub fn build(table: &RichNode, table_start: Offset) -> Self {
        let start_offset = table_start + 1;
        let rows = table_rows(table);
        let head_rows = table
            .content()
            .iter()
            .filter(|section| section.kind() == &NodeKind::TableHead)
            .map(RichNode::child_count)
            .sum();

        let mut grid = SlotGrid::new();
        let mut slots: Vec<Vec<Option<TableCellInfo>>> = vec![Vec::new(); rows.len()];
        let mut row_starts = Vec::with_capacity(rows.len());
        let mut row_sizes = Vec::with_capacity(rows.len());
        for (r, (row_at, row)) in rows.iter().enumerate() {
            let row_start = start_offset + row_at;
            row_starts.push(row_start);
            row_sizes.push(row.node_size());
            let starts = grid.place_row(&row_spans(row));
            for ((cell_at, cell), col) in row.children_with_offsets().zip(starts) {
                let attrs = cell.kind().cell_attrs().unwrap_or_default();
                let origin = TableCellInfo {
                    offset: row_start + 1 + cell_at,
                    node_size: cell.node_size(),
                    span_origin: None,
                    colspan: attrs.colspan.max(1),
                    rowspan: attrs.rowspan.max(1),
                };
                let last_row = (r + origin.rowspan).min(rows.len());
                for (rr, slot_row) in slots.iter_mut().enumerate().take(last_row).skip(r) {
                    let end = col + origin.colspan;
                    if slot_row.len() < end {
                        slot_row.resize(end, None);
                    }
                    for (cc, slot) in slot_row.iter_mut().enumerate().take(end).skip(col) {
                        let span_origin = (rr != r || cc != col).then_some((r, col));
                        *slot = Some(TableCellInfo {
                            span_origin,
                            ..origin
                        });
                    }
                }
            }
        }
        let cells = slots
            .into_iter()
            .map(|row| row.into_iter().map_while(|slot| slot).collect())
            .collect();

        Self {
            table: table.key(),
            table_start,
            row_starts,
            row_sizes,
            head_rows,
            start_offset,
            end_offset: start_offset + table.content_size(),
            cells,
        }
    }

    /// Identity of the indexed table node.
    pub fn table_key(&self) -> NodeKey {
        self.table
    }

    pub fn table_start(&self) -> Offset {
        self.table_start
    }

    /// Start of the table's content.
    pub fn start_offset(&self) -> Offset {
        self.start_offset
    }

    /// End of the table's content.
    pub fn end_offset(&self) -> Offset {
        self.end_offset
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn head_rows(&self) -> usize {
        self.head_rows
    }

    pub fn col_count(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<TableCellInfo>] {
        &self.cells
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<&TableCellInfo> {
        self.cells.get(row)?.get(col)
    }

    pub fn row_start(&self, row: usize) -> Option<Offset> {
        self.row_starts.get(row).copied()
    }

    /// Position right before the closing token of `row`: where a cell
    /// appended to the row goes.
    pub fn row_end(&self, row: usize) -> Option<Offset> {
        Some(self.row_starts.get(row)? + self.row_sizes.get(row)? - 1)
    }

    /// Position at which a cell for `(row, col)` sits or would be inserted.
    /// Slots covered by cells from earlier rows are skipped; past the last
    /// cell of the row this is the row end.
    pub fn offset_at(&self, row: usize, col: usize) -> Option<Offset> {
        let row_start = self.row_start(row)?;
        let found = self.cells[row]
            .iter()
            .skip(col)
            .find(|cell| cell.offset >= row_start)
            .map(|cell| cell.offset);
        found.or_else(|| self.row_end(row))
    }

    /// First position inside the cell's content.
    pub fn cell_start_offset(&self, row: usize, col: usize) -> Option<Offset> {
        self.cell_at(row, col).map(|cell| cell.offset + 1)
    }

    /// Last position inside the cell's content.
    pub fn cell_end_offset(&self, row: usize, col: usize) -> Option<Offset> {
        self.cell_at(row, col).map(|cell| cell.end() - 1)
    }

    /// Slot whose cell extends past `pos`, scanning row-major.
    pub fn cell_index(&self, pos: Offset) -> Option<(usize, usize)> {
        if pos < self.start_offset || pos >= self.end_offset {
            return None;
        }
        self.cells.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|cell| cell.offset <= pos && cell.end() > pos)
                .map(|c| (r, c))
        })
    }

    /// Rectangle spanned by the cells at `anchor` and `head`.
    pub fn rect_offsets(&self, anchor: Offset, head: Offset) -> Option<CellRect> {
        let (ar, ac) = self.cell_index(anchor)?;
        let (hr, hc) = self.cell_index(head)?;
        Some(CellRect {
            top: ar.min(hr),
            left: ac.min(hc),
            bottom: ar.max(hr),
            right: ac.max(hc),
        })
    }

    /// Grows `rect` until every merged cell it touches lies fully inside.
    pub fn spanned_rect(&self, rect: CellRect) -> CellRect {
        let mut rect = rect;
        loop {
            let mut grown = rect;
            for row in rect.top..=rect.bottom {
                for col in rect.left..=rect.right {
                    let Some(cell) = self.cell_at(row, col) else {
                        continue;
                    };
                    let (top, left) = cell.span_origin.unwrap_or((row, col));
                    grown.top = grown.top.min(top);
                    grown.left = grown.left.min(left);
                    grown.bottom = grown.bottom.max(top + cell.rowspan - 1);
                    grown.right = grown.right.max(left + cell.colspan - 1);
                }
            }
            grown.bottom = grown.bottom.min(self.row_count().saturating_sub(1));
            grown.right = grown.right.min(self.col_count().saturating_sub(1));
            if grown == rect {
                return rect;
            }
            rect = grown;
        }
    }

    /// Distinct cells inside `rect`, in document order.
    pub fn cells_in_rect(&self, rect: CellRect) -> Vec<TableCellInfo> {
        let mut out: Vec<TableCellInfo> = Vec::new();
        for row in rect.top..=rect.bottom {
            for col in rect.left..=rect.right {
                if let Some(cell) = self.cell_at(row, col)
                    && !out.iter().any(|seen| seen.offset == cell.offset)
                {
                    out.push(*cell);
                }
            }
        }
        out.sort_by_key(|cell| cell.offset);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::CellAttrs;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cell(head: bool, text: &str, colspan: usize, rowspan: usize) -> RichNode {
        let attrs = CellAttrs {
            colspan,
            rowspan,
            ..CellAttrs::default()
        };
        let kind = if head {
            NodeKind::TableHeadCell(attrs)
        } else {
            NodeKind::TableBodyCell(attrs)
        };
        RichNode::new(kind, vec![RichNode::text(text, vec![])])
    }

    fn row(cells: Vec<RichNode>) -> RichNode {
        RichNode::new(NodeKind::TableRow, cells)
    }

    fn table(head: RichNode, body: Vec<RichNode>) -> RichNode {
        RichNode::new(
            NodeKind::Table,
            vec![
                RichNode::new(NodeKind::TableHead, vec![head]),
                RichNode::new(NodeKind::TableBody, body),
            ],
        )
    }

    fn grid(rows: usize, cols: usize) -> RichNode {
        let head = row((0..cols).map(|c| cell(true, &format!("h{c}"), 1, 1)).collect());
        let body = (1..rows)
            .map(|r| row((0..cols).map(|c| cell(false, &format!("{r}{c}"), 1, 1)).collect()))
            .collect();
        table(head, body)
    }

    #[rstest]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(5, 1)]
    fn unmerged_tables_have_full_rows_in_increasing_order(
        #[case] rows: usize,
        #[case] cols: usize,
    ) {
        let index = TableOffsetIndex::build(&grid(rows, cols), 7);
        assert_eq!(index.row_count(), rows);
        assert!(index.rows().iter().all(|row| row.len() == cols));
        let offsets: Vec<Offset> = index.rows().iter().flatten().map(|c| c.offset).collect();
        assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn offsets_match_the_tree() {
        // table(8) > head(9) > row(10) > cell "h0" at 11, cell "h1" at 15
        let index = TableOffsetIndex::build(&grid(2, 2), 8);
        assert_eq!(index.start_offset(), 9);
        assert_eq!(index.cell_at(0, 0).map(|c| c.offset), Some(11));
        assert_eq!(index.cell_at(0, 1).map(|c| c.offset), Some(15));
        assert_eq!(index.cell_start_offset(0, 1), Some(16));
        assert_eq!(index.cell_end_offset(0, 1), Some(18));
        // head closes at 21, body opens; row at 22, first body cell at 23
        assert_eq!(index.row_start(1), Some(22));
        assert_eq!(index.cell_at(1, 0).map(|c| c.offset), Some(23));
        assert_eq!(index.offset_at(1, 2), index.row_end(1));
        assert_eq!(index.end_offset(), 9 + grid(2, 2).content_size());
    }

    #[test]
    fn cell_index_and_rect() {
        let index = TableOffsetIndex::build(&grid(3, 3), 0);
        let a = index.cell_start_offset(2, 0).unwrap();
        let b = index.cell_start_offset(1, 2).unwrap();
        assert_eq!(index.cell_index(a), Some((2, 0)));
        assert_eq!(
            index.rect_offsets(a, b),
            Some(CellRect {
                top: 1,
                left: 0,
                bottom: 2,
                right: 2
            })
        );
        assert_eq!(index.cell_index(0), None);
        assert_eq!(index.cell_index(index.end_offset()), None);
    }

    fn merged() -> RichNode {
        // | a | b | c |
        // | x (rows=2) | d (cols=2) |
        // | e | f |
        // | g | h | i |
        table(
            row(vec![cell(true, "a", 1, 1), cell(true, "b", 1, 1), cell(true, "c", 1, 1)]),
            vec![
                row(vec![cell(false, "x", 1, 2), cell(false, "d", 2, 1)]),
                row(vec![cell(false, "e", 1, 1), cell(false, "f", 1, 1)]),
                row(vec![cell(false, "g", 1, 1), cell(false, "h", 1, 1), cell(false, "i", 1, 1)]),
            ],
        )
    }

    #[test]
    fn merged_cells_cover_their_slots() {
        let index = TableOffsetIndex::build(&merged(), 0);
        assert_eq!(index.rows().iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 3, 3]);
        let x = *index.cell_at(1, 0).unwrap();
        assert_eq!(x.span_origin, None);
        assert_eq!(index.cell_at(2, 0).unwrap().span_origin, Some((1, 0)));
        assert_eq!(index.cell_at(2, 0).unwrap().offset, x.offset);
        assert_eq!(index.cell_at(1, 2).unwrap().span_origin, Some((1, 1)));
        // row 2 starts after the covered slot
        let e = index.cell_at(2, 1).unwrap();
        assert_eq!(e.span_origin, None);
        assert_eq!(index.offset_at(2, 0), Some(e.offset));
    }

    #[test]
    fn spanned_rect_grows_over_merged_cells() {
        let index = TableOffsetIndex::build(&merged(), 0);
        let rect = CellRect {
            top: 2,
            left: 0,
            bottom: 2,
            right: 1,
        };
        assert_eq!(
            index.spanned_rect(rect),
            CellRect {
                top: 1,
                left: 0,
                bottom: 2,
                right: 2
            }
        );
        assert_eq!(index.cells_in_rect(index.spanned_rect(rect)).len(), 4);
    }
}
