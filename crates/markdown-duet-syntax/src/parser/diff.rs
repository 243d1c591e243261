//! Works out which top-level blocks an edit replaced.
//!
//! The whole document is reparsed on every edit, so the changed region is
//! recovered by comparison: new blocks touching the edited lines are always
//! reported, and the region grows outwards while neighbouring blocks have no
//! identical counterpart (same kind, same source, same line once shifted) in
//! the old tree.

use crate::edit::{EditResult, RemovedNodeRange};
use crate::node::{MarkdownTree, NodeId};
use crate::pos::LinePos;

/// One side of the comparison: a tree and the lines it was parsed from.
pub(crate) struct Snapshot<'a> {
    pub tree: &'a MarkdownTree,
    pub lines: &'a [String],
}

impl Snapshot<'_> {
    fn blocks(&self) -> Vec<NodeId> {
        self.tree.children(self.tree.root()).collect()
    }

    fn source(&self, id: NodeId) -> String {
        let pos = self.tree.node(id).sourcepos;
        let first = pos.start.line.saturating_sub(1);
        let last = pos.end.line.min(self.lines.len());
        self.lines.get(first..last).unwrap_or_default().join("\n")
    }
}

fn has_twin(old: &Snapshot<'_>, old_blocks: &[NodeId], new: &Snapshot<'_>, id: NodeId, shift: isize) -> bool {
    let node = new.tree.node(id);
    let old_line = node.sourcepos.start.line as isize - shift;
    old_blocks.iter().any(|candidate| {
        let twin = old.tree.node(*candidate);
        twin.sourcepos.start.line as isize == old_line
            && twin.kind == node.kind
            && old.source(*candidate) == new.source(id)
    })
}

/// Result of replacing `start..end` (end exclusive) with `inserted`.
pub(crate) fn edit_result(
    old: &Snapshot<'_>,
    new: &Snapshot<'_>,
    start: LinePos,
    end: LinePos,
    inserted: &str,
) -> EditResult {
    let new_first = start.line;
    let new_last = start.line + inserted.matches('\n').count();
    let shift = new_last as isize - end.line as isize;

    let old_blocks = old.blocks();
    let new_blocks = new.blocks();
    let span = |id: NodeId| new.tree.node(id).sourcepos;

    let mut lo = new_blocks
        .iter()
        .position(|id| span(*id).end.line >= new_first)
        .unwrap_or(new_blocks.len());
    let mut hi = lo
        + new_blocks[lo..]
            .iter()
            .take_while(|id| span(**id).start.line <= new_last)
            .count();
    while lo > 0 && !has_twin(old, &old_blocks, new, new_blocks[lo - 1], 0) {
        lo -= 1;
    }
    while hi < new_blocks.len() && !has_twin(old, &old_blocks, new, new_blocks[hi], shift) {
        hi += 1;
    }

    if lo < hi {
        return EditResult::Added {
            nodes: new_blocks[lo..hi].to_vec(),
        };
    }

    let removed: Vec<NodeId> = old_blocks
        .iter()
        .copied()
        .filter(|id| old.tree.node(*id).sourcepos.overlaps_lines(start.line, end.line))
        .collect();
    let line_range = match (removed.first(), removed.last()) {
        (Some(first), Some(last)) => [
            old.tree.node(*first).sourcepos.start.line,
            old.tree.node(*last).sourcepos.end.line,
        ],
        _ => [start.line, end.line.max(start.line)],
    };
    EditResult::Removed(RemovedNodeRange {
        line_range,
        id_range: removed.first().zip(removed.last()).map(|(a, b)| [*a, *b]),
    })
}
