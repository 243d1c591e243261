use super::node::{Offset, RichNode};

#[derive(Debug, Clone, Copy)]
struct Step<'a> {
    node: &'a RichNode,
    /// Index of the child the position points into (or before).
    index: usize,
    /// Offset at which `node`'s content starts.
    start: Offset,
}

/// A position resolved against a document: the path of ancestors that
/// contain it.
#[derive(Debug, Clone)]
pub struct ResolvedPos<'a> {
    pub pos: Offset,
    path: Vec<Step<'a>>,
}

impl<'a> ResolvedPos<'a> {
    /// Depth of the innermost ancestor; the document has depth 0.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    pub fn node(&self, depth: usize) -> &'a RichNode {
        self.path[depth].node
    }

    pub fn parent(&self) -> &'a RichNode {
        self.node(self.depth())
    }

    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Start of the content of the ancestor at `depth`.
    pub fn start(&self, depth: usize) -> Offset {
        self.path[depth].start
    }

    /// Position right before the ancestor at `depth` (`depth >= 1`).
    pub fn before(&self, depth: usize) -> Offset {
        self.start(depth).saturating_sub(1)
    }

    /// Position right after the ancestor at `depth` (`depth >= 1`).
    pub fn after(&self, depth: usize) -> Offset {
        self.before(depth) + self.node(depth).node_size()
    }

    /// Offset of the position inside its parent's content.
    pub fn parent_offset(&self) -> Offset {
        self.pos - self.start(self.depth())
    }

    /// Whether the position sits between two children (or at either end) of
    /// its parent rather than inside a text node.
    pub fn at_child_boundary(&self) -> bool {
        let parent = self.parent();
        let offset = self.parent_offset();
        let mut at = 0;
        for child in parent.content() {
            if at == offset {
                return true;
            }
            at += child.node_size();
        }
        at == offset
    }

    /// Innermost ancestor depth whose node matches `pred`.
    pub fn find_depth(&self, pred: impl Fn(&RichNode) -> bool) -> Option<usize> {
        (0..=self.depth()).rev().find(|d| pred(self.node(*d)))
    }

    /// Child indices from the document down to the parent.
    pub fn path_indices(&self, depth: usize) -> Vec<usize> {
        self.path[..depth].iter().map(|step| step.index).collect()
    }
}

impl RichNode {
    /// Resolves `pos` (clamped to the document) into its ancestor path.
    pub fn resolve(&self, pos: Offset) -> ResolvedPos<'_> {
        let pos = pos.min(self.content_size());
        let mut path = Vec::new();
        let mut node = self;
        let mut start = 0;
        loop {
            let rel = pos - start;
            let mut index = node.child_count();
            let mut offset = 0;
            for (i, child) in node.content().iter().enumerate() {
                let end = offset + child.node_size();
                if end == rel {
                    index = i + 1;
                    offset = end;
                    break;
                }
                if end > rel {
                    index = i;
                    break;
                }
                offset = end;
            }
            path.push(Step { node, index, start });
            let Some(child) = node.child(index) else {
                break;
            };
            if rel == offset || child.kind().is_text() || child.kind().is_leaf() {
                break;
            }
            node = child;
            start += offset + 1;
        }
        ResolvedPos { pos, path }
    }
}
