//! Edits applied to a rich document.
//!
//! [`Transaction`] is the editing interface the core drives; an editor
//! embedding the core supplies its own. [`DocTransaction`] implements it over
//! an owned document: every change rebuilds the touched nodes and their
//! ancestors (fresh identities) and leaves untouched subtrees shared.

use super::mark::Mark;
use super::node::{NodeKind, Offset, RichNode};
use crate::error::EngineError;

pub trait Transaction {
    fn doc(&self) -> &RichNode;

    /// Replaces the children between `from` and `to` with `content`. Both
    /// positions must be child boundaries of the same parent.
    fn replace_with(
        &mut self,
        from: Offset,
        to: Offset,
        content: Vec<RichNode>,
    ) -> Result<(), EngineError>;

    fn add_mark(&mut self, from: Offset, to: Offset, mark: Mark);

    /// Removes marks matching `pred` from inline content in `from..to`.
    fn remove_mark(&mut self, from: Offset, to: Offset, pred: &dyn Fn(&Mark) -> bool);

    /// Changes the kind (attributes) of the node right after `pos`.
    fn set_node_markup(&mut self, pos: Offset, kind: NodeKind) -> Result<(), EngineError>;

    fn set_selection(&mut self, anchor: Offset, head: Offset);

    fn selection(&self) -> (Offset, Offset);
}

#[derive(Debug, Clone)]
pub struct DocTransaction {
    doc: RichNode,
    selection: (Offset, Offset),
    steps: usize,
}

impl DocTransaction {
    pub fn new(doc: RichNode) -> Self {
        Self {
            doc,
            selection: (0, 0),
            steps: 0,
        }
    }

    /// Number of changes that actually modified the document.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn into_doc(self) -> RichNode {
        self.doc
    }

    fn commit(&mut self, doc: RichNode) {
        self.doc = doc;
        self.steps += 1;
    }
}

impl Transaction for DocTransaction {
    fn doc(&self) -> &RichNode {
        &self.doc
    }

    fn replace_with(
        &mut self,
        from: Offset,
        to: Offset,
        content: Vec<RichNode>,
    ) -> Result<(), EngineError> {
        let size = self.doc.content_size();
        if from > to || to > size {
            return Err(EngineError::PositionOutOfRange {
                offset: from.max(to),
                size,
            });
        }
        let start = self.doc.resolve(from);
        let end = self.doc.resolve(to);
        let invalid = |reason: &str| EngineError::InvalidReplace {
            from,
            to,
            reason: reason.to_string(),
        };
        if !start.at_child_boundary() || !end.at_child_boundary() {
            return Err(invalid("positions must fall between nodes"));
        }
        if start.depth() != end.depth() || !start.parent().same_node(end.parent()) {
            return Err(invalid("positions must share a parent"));
        }
        let path = start.path_indices(start.depth());
        let (first, last) = (start.index(start.depth()), end.index(end.depth()));
        let doc = update_at(&self.doc, &path, &mut |parent: &RichNode| {
            let mut children = parent.content()[..first].to_vec();
            children.extend(content.iter().cloned());
            children.extend_from_slice(&parent.content()[last..]);
            parent.with_content(normalize(children))
        });
        self.commit(doc);
        Ok(())
    }

    fn add_mark(&mut self, from: Offset, to: Offset, mark: Mark) {
        let add = |marks: &[Mark]| mark.add_to_set(marks);
        if let Some(doc) = map_inline_marks(&self.doc, 0, from, to, &add) {
            self.commit(doc);
        }
    }

    fn remove_mark(&mut self, from: Offset, to: Offset, pred: &dyn Fn(&Mark) -> bool) {
        let strip = |marks: &[Mark]| -> Vec<Mark> {
            marks.iter().filter(|m| !pred(m)).cloned().collect()
        };
        if let Some(doc) = map_inline_marks(&self.doc, 0, from, to, &strip) {
            self.commit(doc);
        }
    }

    fn set_node_markup(&mut self, pos: Offset, kind: NodeKind) -> Result<(), EngineError> {
        let resolved = self.doc.resolve(pos);
        let depth = resolved.depth();
        let index = resolved.index(depth);
        let target = resolved.parent().child(index);
        let Some(target) = target.filter(|_| resolved.at_child_boundary()) else {
            return Err(EngineError::PositionOutOfRange {
                offset: pos,
                size: self.doc.content_size(),
            });
        };
        if target.kind() == &kind {
            return Ok(());
        }
        let mut path = resolved.path_indices(depth);
        path.push(index);
        let doc = update_at(&self.doc, &path, &mut |node: &RichNode| {
            node.with_kind(kind.clone())
        });
        self.commit(doc);
        Ok(())
    }

    fn set_selection(&mut self, anchor: Offset, head: Offset) {
        let size = self.doc.content_size();
        self.selection = (anchor.min(size), head.min(size));
    }

    fn selection(&self) -> (Offset, Offset) {
        self.selection
    }
}

/// Rebuilds the node at `path` with `f` and every ancestor on the way up.
fn update_at(
    node: &RichNode,
    path: &[usize],
    f: &mut dyn FnMut(&RichNode) -> RichNode,
) -> RichNode {
    let Some((index, rest)) = path.split_first() else {
        return f(node);
    };
    let mut content = node.content().to_vec();
    if let Some(child) = content.get(*index) {
        content[*index] = update_at(child, rest, f);
    }
    node.with_content(content)
}

/// Merges adjacent text nodes that carry the same marks and drops empty ones.
pub(crate) fn normalize(children: Vec<RichNode>) -> Vec<RichNode> {
    let mut out: Vec<RichNode> = Vec::with_capacity(children.len());
    for child in children {
        let Some(text) = child.text_str() else {
            out.push(child);
            continue;
        };
        if text.is_empty() {
            continue;
        }
        if let Some(prev) = out.last_mut()
            && let Some(prev_text) = prev.text_str()
            && prev.marks() == child.marks()
        {
            *prev = RichNode::text(format!("{prev_text}{text}"), child.marks().to_vec());
            continue;
        }
        out.push(child);
    }
    out
}

/// Applies `f` to the marks of inline content overlapping `from..to`.
/// `start` is the offset at which `node`'s content begins. Returns `None`
/// when nothing changed so unchanged subtrees keep their identity.
fn map_inline_marks(
    node: &RichNode,
    start: Offset,
    from: Offset,
    to: Offset,
    f: &dyn Fn(&[Mark]) -> Vec<Mark>,
) -> Option<RichNode> {
    let mut changed = false;
    let mut content = Vec::with_capacity(node.child_count());
    for (offset, child) in node.children_with_offsets() {
        let pos = start + offset;
        let end = pos + child.node_size();
        if end <= from || pos >= to {
            content.push(child.clone());
            continue;
        }
        match child.text_str() {
            Some(text) => {
                let chars: Vec<char> = text.chars().collect();
                let cut_from = from.saturating_sub(pos).min(chars.len());
                let cut_to = (to - pos).min(chars.len());
                let marks = f(child.marks());
                if marks == child.marks() {
                    content.push(child.clone());
                    continue;
                }
                changed = true;
                let piece = |a: usize, b: usize| chars[a..b].iter().collect::<String>();
                content.push(RichNode::text(piece(0, cut_from), child.marks().to_vec()));
                content.push(RichNode::text(piece(cut_from, cut_to), marks));
                content.push(RichNode::text(
                    piece(cut_to, chars.len()),
                    child.marks().to_vec(),
                ));
            }
            None if child.kind().is_leaf() => {
                let marks = f(child.marks());
                if child.kind().is_inline() && marks != child.marks() {
                    changed = true;
                    content.push(child.clone().with_marks(marks));
                } else {
                    content.push(child.clone());
                }
            }
            None => match map_inline_marks(child, pos + 1, from, to, f) {
                Some(updated) => {
                    changed = true;
                    content.push(updated);
                }
                None => content.push(child.clone()),
            },
        }
    }
    changed.then(|| node.with_content(normalize(content)))
}
