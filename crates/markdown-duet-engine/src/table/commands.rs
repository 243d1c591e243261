//! Table editing commands.
//!
//! Each command reads the selection from the transaction, builds a new table
//! node and swaps it in. The old node's index is never patched in place: the
//! replacement has a new identity, so the next cache lookup rebuilds.

use std::rc::Rc;

use super::index::{CellRect, TableOffsetIndex};
use super::{TableIndexCache, find_table};
use crate::error::TableError;
use crate::rich::{CellAlign, CellAttrs, NodeKind, RichNode, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// Rows of a table split into its head and body sections.
struct TableRows {
    head: Vec<Vec<RichNode>>,
    body: Vec<Vec<RichNode>>,
}

impl TableRows {
    fn from_table(table: &RichNode) -> Self {
        let mut rows = Self {
            head: Vec::new(),
            body: Vec::new(),
        };
        for section in table.content() {
            let target = match section.kind() {
                NodeKind::TableHead => &mut rows.head,
                NodeKind::TableBody => &mut rows.body,
                _ => continue,
            };
            target.extend(section.content().iter().map(|row| row.content().to_vec()));
        }
        rows
    }

    fn row_mut(&mut self, row: usize) -> Option<&mut Vec<RichNode>> {
        let head = self.head.len();
        if row < head {
            self.head.get_mut(row)
        } else {
            self.body.get_mut(row - head)
        }
    }

    fn into_table(self) -> RichNode {
        let section = |kind: NodeKind, rows: Vec<Vec<RichNode>>| {
            RichNode::new(
                kind,
                rows.into_iter()
                    .map(|cells| RichNode::new(NodeKind::TableRow, cells))
                    .collect(),
            )
        };
        let mut content = vec![section(NodeKind::TableHead, self.head)];
        if !self.body.is_empty() {
            content.push(section(NodeKind::TableBody, self.body));
        }
        RichNode::new(NodeKind::Table, content)
    }
}

struct Target {
    index: Rc<TableOffsetIndex>,
    rect: CellRect,
    rows: TableRows,
}

fn locate(tx: &dyn Transaction, cache: &mut TableIndexCache) -> Result<Target, TableError> {
    let (anchor, head) = tx.selection();
    let index = cache.create(tx.doc(), head).ok_or(TableError::NotInTable)?;
    let rect = index
        .rect_offsets(anchor, head)
        .ok_or(TableError::NotInTable)?;
    let (_, table) = find_table(tx.doc(), head).ok_or(TableError::NotInTable)?;
    Ok(Target {
        rows: TableRows::from_table(table),
        index,
        rect,
    })
}

/// Swaps the new table in and puts the cursor in cell `(row, col)`.
fn commit(
    tx: &mut dyn Transaction,
    index: &TableOffsetIndex,
    table: RichNode,
    (row, col): (usize, usize),
) -> Result<(), TableError> {
    let updated = TableOffsetIndex::build(&table, index.table_start());
    let cursor = updated
        .cell_start_offset(row, col)
        .or_else(|| updated.cell_start_offset(row, 0))
        .unwrap_or(updated.start_offset());
    tx.replace_with(index.table_start(), index.end_offset() + 1, vec![table])?;
    tx.set_selection(cursor, cursor);
    Ok(())
}

/// Position of the cell starting at slot `(row, col)` among its row's nodes.
fn node_index(index: &TableOffsetIndex, row: usize, col: usize) -> usize {
    index.rows()[row]
        .iter()
        .take(col)
        .filter(|cell| cell.span_origin.is_none())
        .count()
}

fn empty_cell(head: bool, align: CellAlign) -> RichNode {
    let attrs = CellAttrs {
        align,
        ..CellAttrs::default()
    };
    let kind = if head {
        NodeKind::TableHeadCell(attrs)
    } else {
        NodeKind::TableBodyCell(attrs)
    };
    RichNode::new(kind, Vec::new())
}

fn with_attrs(cell: &RichNode, update: impl FnOnce(&mut CellAttrs)) -> RichNode {
    match cell.kind() {
        NodeKind::TableHeadCell(attrs) => {
            let mut attrs = *attrs;
            update(&mut attrs);
            cell.with_kind(NodeKind::TableHeadCell(attrs))
        }
        NodeKind::TableBodyCell(attrs) => {
            let mut attrs = *attrs;
            update(&mut attrs);
            cell.with_kind(NodeKind::TableBodyCell(attrs))
        }
        _ => cell.clone(),
    }
}

/// Number of slots in `from..=to` that the span `start..=end` covers.
fn overlap(start: usize, end: usize, from: usize, to: usize) -> usize {
    (end.min(to) + 1).saturating_sub(start.max(from))
}

fn column_align(target: &Target, col: usize) -> CellAlign {
    let Some(cell) = target.index.cell_at(0, col) else {
        return CellAlign::None;
    };
    let (_, origin_col) = cell.span_origin.unwrap_or((0, col));
    let at = node_index(&target.index, 0, origin_col);
    target
        .rows
        .head
        .first()
        .and_then(|row| row.get(at))
        .and_then(|cell| cell.kind().cell_attrs())
        .map_or(CellAlign::None, |attrs| attrs.align)
}

pub fn add_row(
    tx: &mut dyn Transaction,
    cache: &mut TableIndexCache,
    side: Side,
) -> Result<(), TableError> {
    let mut target = locate(tx, cache)?;
    let index = Rc::clone(&target.index);
    let at = match side {
        Side::Before => target.rect.top,
        Side::After => target.rect.bottom + 1,
    };
    if at < index.head_rows() {
        return Err(TableError::HeaderRow);
    }
    if let Some(row) = index.rows().get(at) {
        for cell in row {
            if let Some((r, c)) = cell.span_origin
                && r < at
            {
                return Err(TableError::MergedCell { row: r, col: c });
            }
        }
    }
    let cells = (0..index.col_count())
        .map(|col| empty_cell(false, column_align(&target, col)))
        .collect();
    let body_at = at - index.head_rows();
    target.rows.body.insert(body_at.min(target.rows.body.len()), cells);
    commit(tx, &index, target.rows.into_table(), (at, 0))
}

pub fn add_column(
    tx: &mut dyn Transaction,
    cache: &mut TableIndexCache,
    side: Side,
) -> Result<(), TableError> {
    let mut target = locate(tx, cache)?;
    let index = Rc::clone(&target.index);
    let at = match side {
        Side::Before => target.rect.left,
        Side::After => target.rect.right + 1,
    };
    for row in index.rows() {
        if let Some(cell) = row.get(at)
            && let Some((row, col)) = cell.span_origin
            && col < at
        {
            return Err(TableError::MergedCell { row, col });
        }
    }
    for r in 0..index.row_count() {
        let insert_at = node_index(&index, r, at.min(index.rows()[r].len()));
        let head = r < index.head_rows();
        if let Some(row) = target.rows.row_mut(r) {
            row.insert(insert_at.min(row.len()), empty_cell(head, CellAlign::None));
        }
    }
    commit(tx, &index, target.rows.into_table(), (target.rect.top, at))
}

/// Removes the selected body rows. Cells spanning into them lose the
/// removed rows; a cell starting in them and reaching further down moves
/// to the first row below.
pub fn remove_rows(
    tx: &mut dyn Transaction,
    cache: &mut TableIndexCache,
) -> Result<(), TableError> {
    let mut target = locate(tx, cache)?;
    let index = Rc::clone(&target.index);
    let rect = target.rect;
    if rect.top < index.head_rows() {
        return Err(TableError::HeaderRow);
    }
    let mut moved = Vec::new();
    for (r, cells) in index.rows().iter().enumerate() {
        for (c, cell) in cells.iter().enumerate() {
            if cell.span_origin.is_some() || cell.rowspan == 1 {
                continue;
            }
            let last = (r + cell.rowspan).min(index.row_count()) - 1;
            let lost = overlap(r, last, rect.top, rect.bottom);
            if lost == 0 {
                continue;
            }
            let at = node_index(&index, r, c);
            let Some(row) = target.rows.row_mut(r) else {
                continue;
            };
            let Some(node) = row.get_mut(at) else {
                continue;
            };
            let shrunk = with_attrs(node, |attrs| attrs.rowspan = last + 1 - r - lost);
            if r < rect.top {
                *node = shrunk;
            } else if last > rect.bottom {
                moved.push((c, shrunk));
            }
        }
    }
    let below = rect.bottom + 1;
    moved.sort_by_key(|(c, _)| *c);
    for (c, cell) in moved.into_iter().rev() {
        let at = node_index(&index, below, c);
        if let Some(row) = target.rows.row_mut(below) {
            row.insert(at.min(row.len()), cell);
        }
    }
    let head = index.head_rows();
    target.rows.body.drain(rect.top - head..=rect.bottom - head);
    let remaining = index.row_count() - (rect.bottom - rect.top + 1);
    let row = rect.top.min(remaining.saturating_sub(1));
    commit(tx, &index, target.rows.into_table(), (row, rect.left))
}

/// Removes the selected columns. Cells spanning across them lose the
/// removed columns instead of being split.
pub fn remove_columns(
    tx: &mut dyn Transaction,
    cache: &mut TableIndexCache,
) -> Result<(), TableError> {
    let mut target = locate(tx, cache)?;
    let index = Rc::clone(&target.index);
    let rect = target.rect;
    if rect.left == 0 && rect.right + 1 >= index.col_count() {
        return Err(TableError::WholeTable);
    }
    for (r, cells) in index.rows().iter().enumerate() {
        let mut doomed = Vec::new();
        for (c, cell) in cells.iter().enumerate() {
            if cell.span_origin.is_some() {
                continue;
            }
            let last = c + cell.colspan - 1;
            let lost = overlap(c, last, rect.left, rect.right);
            if lost == 0 {
                continue;
            }
            let at = node_index(&index, r, c);
            if lost == cell.colspan {
                doomed.push(at);
            } else if let Some(row) = target.rows.row_mut(r)
                && let Some(node) = row.get_mut(at)
            {
                *node = with_attrs(node, |attrs| attrs.colspan = cell.colspan - lost);
            }
        }
        if let Some(row) = target.rows.row_mut(r) {
            for at in doomed.into_iter().rev() {
                if at < row.len() {
                    row.remove(at);
                }
            }
        }
    }
    let width = index.col_count() - (rect.right - rect.left + 1);
    let col = rect.left.min(width.saturating_sub(1));
    commit(tx, &index, target.rows.into_table(), (rect.top, col))
}

/// Sets the alignment of every cell starting in the selected columns.
pub fn set_column_align(
    tx: &mut dyn Transaction,
    cache: &mut TableIndexCache,
    align: CellAlign,
) -> Result<(), TableError> {
    let mut target = locate(tx, cache)?;
    let index = Rc::clone(&target.index);
    let rect = target.rect;
    for (r, cells) in index.rows().iter().enumerate() {
        for c in rect.left..=rect.right {
            if !cells.get(c).is_some_and(|cell| cell.span_origin.is_none()) {
                continue;
            }
            let at = node_index(&index, r, c);
            if let Some(row) = target.rows.row_mut(r)
                && let Some(cell) = row.get_mut(at)
            {
                *cell = with_attrs(cell, |attrs| attrs.align = align);
            }
        }
    }
    let (anchor, head) = tx.selection();
    commit(tx, &index, target.rows.into_table(), (rect.top, rect.left))?;
    tx.set_selection(anchor, head);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::{DocTransaction, Offset};
    use crate::table::table_rows;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cell(head: bool, text: &str) -> RichNode {
        let (colspan, rowspan, skip) = crate::table::parse_span_prefix(text);
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
        let text = &text[skip..];
        let content = if text.is_empty() {
            vec![]
        } else {
            vec![RichNode::text(text, vec![])]
        };
        RichNode::new(kind, content)
    }

    /// A paragraph followed by a table; the first row is the header.
    fn doc(rows: &[&[&str]]) -> RichNode {
        let mut table = TableRows {
            head: Vec::new(),
            body: Vec::new(),
        };
        for (r, row) in rows.iter().enumerate() {
            let cells = row.iter().map(|text| cell(r == 0, text)).collect();
            if r == 0 {
                table.head.push(cells);
            } else {
                table.body.push(cells);
            }
        }
        let para = RichNode::new(NodeKind::Paragraph, vec![RichNode::text("p", vec![])]);
        RichNode::new(NodeKind::Doc, vec![para, table.into_table()])
    }

    const TABLE_AT: Offset = 3;

    fn texts(doc: &RichNode) -> Vec<Vec<String>> {
        let table = &doc.content()[1];
        table_rows(table)
            .into_iter()
            .map(|(_, row)| row.content().iter().map(RichNode::text_content).collect())
            .collect()
    }

    fn select(doc: RichNode, anchor: (usize, usize), head: (usize, usize)) -> DocTransaction {
        let index = TableOffsetIndex::build(&doc.content()[1], TABLE_AT);
        let a = index.cell_start_offset(anchor.0, anchor.1).unwrap();
        let h = index.cell_start_offset(head.0, head.1).unwrap();
        let mut tx = DocTransaction::new(doc);
        tx.set_selection(a, h);
        tx
    }

    fn selected_cell(tx: &DocTransaction) -> Option<(usize, usize)> {
        let index = TableOffsetIndex::build(&tx.doc().content()[1], TABLE_AT);
        index.cell_index(tx.selection().1)
    }

    /// `(colspan, rowspan)` of every cell node.
    fn spans(doc: &RichNode) -> Vec<Vec<(usize, usize)>> {
        table_rows(&doc.content()[1])
            .into_iter()
            .map(|(_, row)| {
                row.content()
                    .iter()
                    .filter_map(|cell| cell.kind().cell_attrs())
                    .map(|attrs| (attrs.colspan, attrs.rowspan))
                    .collect()
            })
            .collect()
    }

    /// `x` covers rows 1-2 of column 0; `y` covers columns 1-2 of row 1.
    fn merged() -> RichNode {
        doc(&[&["a", "b", "c"], &["@rows=2:x", "@cols=2:y"], &["z", "w"]])
    }

    fn grid() -> RichNode {
        doc(&[&["a", "b"], &["c", "d"], &["e", "f"]])
    }

    #[test]
    fn add_row_after_moves_cursor_into_new_row() {
        let mut tx = select(grid(), (1, 1), (1, 1));
        let mut cache = TableIndexCache::new();
        add_row(&mut tx, &mut cache, Side::After).unwrap();
        assert_eq!(
            texts(tx.doc()),
            vec![vec!["a", "b"], vec!["c", "d"], vec!["", ""], vec!["e", "f"]]
        );
        assert_eq!(selected_cell(&tx), Some((2, 0)));
    }

    #[test]
    fn add_row_before_header_is_refused() {
        let mut tx = select(grid(), (0, 0), (0, 0));
        let mut cache = TableIndexCache::new();
        assert!(matches!(
            add_row(&mut tx, &mut cache, Side::Before),
            Err(TableError::HeaderRow)
        ));
        assert!(matches!(
            add_row(&mut tx, &mut cache, Side::After),
            Ok(())
        ));
        assert_eq!(texts(tx.doc())[1], vec!["", ""]);
    }

    #[test]
    fn new_rows_take_the_header_alignment() {
        let mut tx = select(grid(), (0, 1), (0, 1));
        let mut cache = TableIndexCache::new();
        set_column_align(&mut tx, &mut cache, CellAlign::Right).unwrap();
        add_row(&mut tx, &mut cache, Side::After).unwrap();
        let table = &tx.doc().content()[1];
        let rows = table_rows(table);
        let aligns: Vec<CellAlign> = rows[1]
            .1
            .content()
            .iter()
            .map(|c| c.kind().cell_attrs().unwrap().align)
            .collect();
        assert_eq!(aligns, vec![CellAlign::None, CellAlign::Right]);
    }

    #[test]
    fn add_column_before_selection() {
        let mut tx = select(grid(), (2, 1), (2, 1));
        let mut cache = TableIndexCache::new();
        add_column(&mut tx, &mut cache, Side::Before).unwrap();
        assert_eq!(
            texts(tx.doc()),
            vec![vec!["a", "", "b"], vec!["c", "", "d"], vec!["e", "", "f"]]
        );
        assert_eq!(selected_cell(&tx), Some((2, 1)));
    }

    #[test]
    fn remove_selected_rows() {
        let mut tx = select(grid(), (1, 0), (2, 1));
        let mut cache = TableIndexCache::new();
        remove_rows(&mut tx, &mut cache).unwrap();
        assert_eq!(texts(tx.doc()), vec![vec!["a", "b"]]);
        assert_eq!(tx.doc().content()[1].child_count(), 1);
        assert_eq!(selected_cell(&tx), Some((0, 0)));
    }

    #[test]
    fn remove_columns_but_never_all() {
        let mut tx = select(grid(), (0, 0), (2, 0));
        let mut cache = TableIndexCache::new();
        remove_columns(&mut tx, &mut cache).unwrap();
        assert_eq!(texts(tx.doc()), vec![vec!["b"], vec!["d"], vec!["f"]]);

        let mut tx = select(grid(), (0, 0), (0, 1));
        assert!(matches!(
            remove_columns(&mut tx, &mut cache),
            Err(TableError::WholeTable)
        ));
    }

    #[test]
    fn merged_cells_block_splitting_inserts() {
        let mut cache = TableIndexCache::new();

        let mut tx = select(merged(), (1, 1), (1, 1));
        assert!(matches!(
            add_row(&mut tx, &mut cache, Side::After),
            Err(TableError::MergedCell { row: 1, col: 0 })
        ));

        let mut tx = select(merged(), (0, 2), (0, 2));
        assert!(matches!(
            add_column(&mut tx, &mut cache, Side::Before),
            Err(TableError::MergedCell { row: 1, col: 1 })
        ));

        let mut tx = select(merged(), (1, 0), (2, 1));
        remove_rows(&mut tx, &mut cache).unwrap();
        assert_eq!(texts(tx.doc()), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn removing_the_last_spanned_row_shrinks_the_span() {
        let mut tx = select(merged(), (2, 1), (2, 1));
        let mut cache = TableIndexCache::new();
        remove_rows(&mut tx, &mut cache).unwrap();
        assert_eq!(texts(tx.doc()), vec![vec!["a", "b", "c"], vec!["x", "y"]]);
        assert_eq!(spans(tx.doc())[1], vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn removing_the_first_spanned_row_moves_the_cell_down() {
        let mut tx = select(merged(), (1, 1), (1, 1));
        let mut cache = TableIndexCache::new();
        remove_rows(&mut tx, &mut cache).unwrap();
        assert_eq!(
            texts(tx.doc()),
            vec![vec!["a", "b", "c"], vec!["x", "z", "w"]]
        );
        assert_eq!(spans(tx.doc())[1], vec![(1, 1), (1, 1), (1, 1)]);
        let index = TableOffsetIndex::build(&tx.doc().content()[1], TABLE_AT);
        assert_eq!(index.col_count(), 3);
    }

    #[rstest]
    #[case::spanned_end((0, 2), vec![vec!["a", "b"], vec!["x", "y"], vec!["z"]])]
    #[case::spanned_start((0, 1), vec![vec!["a", "c"], vec!["x", "y"], vec!["w"]])]
    fn removing_a_spanned_column_shrinks_the_span(
        #[case] at: (usize, usize),
        #[case] expected: Vec<Vec<&str>>,
    ) {
        let mut tx = select(merged(), at, at);
        let mut cache = TableIndexCache::new();
        remove_columns(&mut tx, &mut cache).unwrap();
        assert_eq!(texts(tx.doc()), expected);
        assert_eq!(spans(tx.doc())[1], vec![(1, 2), (1, 1)]);
    }

    #[test]
    fn not_in_table() {
        let mut tx = DocTransaction::new(grid());
        tx.set_selection(1, 1);
        let mut cache = TableIndexCache::new();
        assert!(matches!(
            add_row(&mut tx, &mut cache, Side::After),
            Err(TableError::NotInTable)
        ));
    }
}
