use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::find_table;
use super::index::TableOffsetIndex;
use crate::error::EngineError;
use crate::rich::{NodeKey, NodeKind, Offset, RichNode};

/// Table indexes keyed by table identity. An entry is only served while its
/// table still sits at the position it was built for; entries for tables no
/// longer in the document are dropped whenever a new index is built.
#[derive(Debug, Default)]
pub struct TableIndexCache {
    entries: HashMap<NodeKey, Rc<TableOffsetIndex>>,
}

impl TableIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the table containing `cell_pos`, or `None` when the position
    /// is not inside a table.
    pub fn create(&mut self, doc: &RichNode, cell_pos: Offset) -> Option<Rc<TableOffsetIndex>> {
        let (table_start, table) = find_table(doc, cell_pos)?;
        if let Some(index) = self.entries.get(&table.key()) {
            if index.table_start() == table_start {
                return Some(Rc::clone(index));
            }
            log::debug!("{}", EngineError::StaleTableGeometry(index.table_start()));
        }
        let index = Rc::new(TableOffsetIndex::build(table, table_start));
        self.entries.insert(table.key(), Rc::clone(&index));
        self.retain_live(doc);
        Some(index)
    }

    fn retain_live(&mut self, doc: &RichNode) {
        let mut live = HashSet::new();
        collect_tables(doc, &mut live);
        self.entries.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn collect_tables(node: &RichNode, out: &mut HashSet<NodeKey>) {
    if node.kind() == &NodeKind::Table {
        out.insert(node.key());
    }
    if node.kind().is_textblock() {
        return;
    }
    for child in node.content() {
        collect_tables(child, out);
    }
}
