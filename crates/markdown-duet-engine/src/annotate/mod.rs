//! Incremental syntax highlighting of the markdown editing surface.
//!
//! After each edit the parser reports either the fresh blocks covering the
//! edited lines or the lines whose blocks were removed. [`annotate`] brings
//! the line document's syntax marks and line backgrounds in line with that
//! report without touching anything outside the affected lines.
//!
//! Lines that still owe a background reset are tracked in a
//! [`PendingBackgrounds`] set owned by the caller. Removed blocks add to it
//! and every call sweeps it together with the newly desired backgrounds, so
//! a line is written at most once per call.

pub mod highlight;

use std::collections::BTreeSet;

use markdown_duet_syntax::{EditResult, LinePos, MarkdownTree, RawEditResult};

pub use highlight::{Annotations, MarkSpan};

use crate::error::EngineError;
use crate::position::PositionMapper;
use crate::rich::{Mark, NodeKind, Offset, Transaction};

/// 1-based lines whose background must be re-derived on the next sweep.
pub type PendingBackgrounds = BTreeSet<usize>;

/// Applies an edit result to the line document in `tx`.
///
/// `tree` and `lines` describe the markdown after the edit. Returns the
/// lines whose background actually changed.
pub fn annotate<T: Transaction + ?Sized>(
    tx: &mut T,
    tree: &MarkdownTree,
    lines: &[String],
    result: &EditResult,
    pending: &mut PendingBackgrounds,
) -> BTreeSet<usize> {
    match result {
        EditResult::Added { nodes } => {
            let mut annotations = Annotations::default();
            let mut range: Option<(usize, usize)> = None;
            for id in nodes {
                let Some(node) = tree.get(*id) else {
                    log::warn!("edit result names node {} which is not in the tree", id.0);
                    continue;
                };
                let span = node.sourcepos;
                range = Some(match range {
                    Some((first, last)) => (first.min(span.start.line), last.max(span.end.line)),
                    None => (span.start.line, span.end.line),
                });
                annotations.extend(Annotations::collect(tree, lines, *id));
            }
            match range {
                Some((first, last)) => apply(tx, first, last, &annotations, pending),
                None => sweep(tx, &Annotations::default(), pending),
            }
        }
        EditResult::Removed(removed) => {
            let [first, last] = removed.line_range;
            pending.extend(first.min(last)..=first.max(last));
            sweep(tx, &Annotations::default(), pending)
        }
    }
}

/// [`annotate`] for the loose wire form. A result with both or neither
/// field set is rejected before anything is touched.
pub fn annotate_raw<T: Transaction + ?Sized>(
    tx: &mut T,
    tree: &MarkdownTree,
    lines: &[String],
    raw: RawEditResult,
    pending: &mut PendingBackgrounds,
) -> Result<BTreeSet<usize>, EngineError> {
    let result = EditResult::try_from(raw)?;
    Ok(annotate(tx, tree, lines, &result, pending))
}

/// Annotates the whole document, as after loading it.
pub fn annotate_document<T: Transaction + ?Sized>(
    tx: &mut T,
    tree: &MarkdownTree,
    lines: &[String],
) -> BTreeSet<usize> {
    let nodes: Vec<_> = tree.children(tree.root()).collect();
    let mut pending = PendingBackgrounds::new();
    if nodes.is_empty() {
        // Nothing to highlight; still clear whatever was painted before.
        pending.extend(1..=lines.len().max(1));
        return sweep(tx, &Annotations::default(), &mut pending);
    }
    let first = 1;
    let last = lines.len().max(1);
    let mut annotations = Annotations::default();
    for id in nodes {
        annotations.extend(Annotations::collect(tree, lines, id));
    }
    apply(tx, first, last, &annotations, &mut pending)
}

fn apply<T: Transaction + ?Sized>(
    tx: &mut T,
    first: usize,
    last: usize,
    annotations: &Annotations,
    pending: &mut PendingBackgrounds,
) -> BTreeSet<usize> {
    let (clear, marks) = {
        let mapper = PositionMapper::new(tx.doc());
        let line_start = LinePos::new(first, 1);
        let (clear_from, _) = mapper.line_pos_to_rich_offset(line_start, line_start);
        let last_line = mapper.clamp_line(last);
        let line_end = LinePos::new(last_line, mapper.line_len(last_line) + 1);
        let (clear_to, _) = mapper.line_pos_to_rich_offset(line_end, line_end);
        let marks: Vec<(Offset, Offset, Mark)> = annotations
            .marks
            .iter()
            .map(|span| {
                let (from, to) = mapper.line_pos_to_rich_offset(span.start, span.end);
                (from, to, span.mark.clone())
            })
            .filter(|(from, to, _)| from < to)
            .collect();
        ((clear_from, clear_to), marks)
    };

    tx.remove_mark(clear.0, clear.1, &|mark: &Mark| mark.kind.is_syntax());
    for (from, to, mark) in marks {
        tx.add_mark(from, to, mark);
    }

    pending.extend(first..=last);
    sweep(tx, annotations, pending)
}

/// Resets the background of every pending line to what `annotations` wants
/// for it and empties `pending`.
fn sweep<T: Transaction + ?Sized>(
    tx: &mut T,
    annotations: &Annotations,
    pending: &mut PendingBackgrounds,
) -> BTreeSet<usize> {
    let mut changed = BTreeSet::new();
    let lines: BTreeSet<usize> = {
        let mapper = PositionMapper::new(tx.doc());
        if mapper.block_count() == 0 {
            pending.clear();
            return changed;
        }
        std::mem::take(pending)
            .into_iter()
            .map(|line| mapper.clamp_line(line))
            .collect()
    };

    for line in lines {
        let (pos, current) = {
            let doc = tx.doc();
            let mapper = PositionMapper::new(doc);
            let pos = mapper.block_start(line);
            let current = doc.child(line - 1).map(|block| block.kind().clone());
            (pos, current)
        };
        let Some(NodeKind::Line { background }) = current else {
            log::debug!("block {line} is not a line; background left alone");
            continue;
        };
        let desired = annotations.backgrounds.get(&line).copied();
        if background == desired {
            continue;
        }
        match tx.set_node_markup(pos, NodeKind::Line { background: desired }) {
            Ok(()) => {
                changed.insert(line);
            }
            Err(err) => log::warn!("could not update background of line {line}: {err}"),
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::{
        BackgroundKind, DocTransaction, LineBackground, LineDocument, RichNode, SyntaxMark,
    };
    use markdown_duet_syntax::{CmarkParser, MarkdownParser, RemovedNodeRange, parse, split_lines};
    use pretty_assertions::assert_eq;

    fn code_line(code_start: bool, code_end: bool) -> NodeKind {
        NodeKind::Line {
            background: Some(LineBackground {
                kind: BackgroundKind::CodeBlock,
                code_start,
                code_end,
            }),
        }
    }

    fn backgrounds(doc: &RichNode) -> Vec<bool> {
        doc.content()
            .iter()
            .map(|line| matches!(line.kind(), NodeKind::Line { background: Some(_) }))
            .collect()
    }

    /// Records every background write on top of a [`DocTransaction`].
    struct CountingTransaction {
        inner: DocTransaction,
        markups: Vec<Offset>,
    }

    impl Transaction for CountingTransaction {
        fn doc(&self) -> &RichNode {
            self.inner.doc()
        }

        fn replace_with(
            &mut self,
            from: Offset,
            to: Offset,
            content: Vec<RichNode>,
        ) -> Result<(), EngineError> {
            self.inner.replace_with(from, to, content)
        }

        fn add_mark(&mut self, from: Offset, to: Offset, mark: Mark) {
            self.inner.add_mark(from, to, mark);
        }

        fn remove_mark(&mut self, from: Offset, to: Offset, pred: &dyn Fn(&Mark) -> bool) {
            self.inner.remove_mark(from, to, pred);
        }

        fn set_node_markup(&mut self, pos: Offset, kind: NodeKind) -> Result<(), EngineError> {
            self.markups.push(pos);
            self.inner.set_node_markup(pos, kind)
        }

        fn set_selection(&mut self, anchor: Offset, head: Offset) {
            self.inner.set_selection(anchor, head);
        }

        fn selection(&self) -> (Offset, Offset) {
            self.inner.selection()
        }
    }

    #[test]
    fn whole_document_gets_code_backgrounds() {
        let text = "a\n\n```\nx\n```\n";
        let mut tx = DocTransaction::new(LineDocument::build(text));
        let changed = annotate_document(&mut tx, &parse(text), &split_lines(text));
        assert_eq!(changed, BTreeSet::from([3, 4, 5]));
        assert_eq!(tx.doc().content()[2].kind(), &code_line(true, false));
        assert_eq!(tx.doc().content()[4].kind(), &code_line(false, true));
        assert_eq!(
            backgrounds(tx.doc()),
            vec![false, false, true, true, true, false]
        );
    }

    #[test]
    fn pending_lines_merge_with_added_block_lines() {
        let text = "a\n\n```\nx\n```\n";
        let tree = parse(text);
        let fence = tree.children(tree.root()).nth(1).unwrap();
        let mut tx = CountingTransaction {
            inner: DocTransaction::new(LineDocument::build(text)),
            markups: Vec::new(),
        };
        let line_starts: Vec<Offset> = {
            let mapper = PositionMapper::new(tx.doc());
            (1..=6).map(|line| mapper.block_start(line)).collect()
        };

        let mut pending = PendingBackgrounds::from([1, 3, 4]);
        let changed = annotate(
            &mut tx,
            &tree,
            &split_lines(text),
            &EditResult::Added { nodes: vec![fence] },
            &mut pending,
        );

        assert_eq!(changed, BTreeSet::from([3, 4, 5]));
        assert!(pending.is_empty());
        assert_eq!(tx.doc().content()[0].kind(), &NodeKind::Line { background: None });
        assert_eq!(tx.doc().content()[2].kind(), &code_line(true, false));
        assert_eq!(tx.doc().content()[3].kind(), &code_line(false, false));
        assert_eq!(tx.doc().content()[4].kind(), &code_line(false, true));
        assert_eq!(tx.markups, vec![line_starts[2], line_starts[3], line_starts[4]]);
    }

    #[test]
    fn removed_range_clears_only_its_lines() {
        let text = "a\nb\nc\nd\ne\nf\ng\n";
        let mut tx = DocTransaction::new(LineDocument::build(text));
        for line in [3, 4, 5, 7] {
            let pos = PositionMapper::new(tx.doc()).block_start(line);
            tx.set_node_markup(pos, code_line(false, false)).unwrap();
        }

        let result = EditResult::Removed(RemovedNodeRange {
            line_range: [3, 5],
            id_range: None,
        });
        let mut pending = PendingBackgrounds::new();
        let changed = annotate(&mut tx, &parse(text), &split_lines(text), &result, &mut pending);

        assert_eq!(changed, BTreeSet::from([3, 4, 5]));
        assert!(pending.is_empty());
        assert_eq!(
            backgrounds(tx.doc()),
            vec![false, false, false, false, false, false, true, false]
        );
    }

    #[test]
    fn annotating_twice_changes_nothing_more() {
        let text = "# Title\n\nsome **bold** and `code`\n";
        let mut parser = CmarkParser::new(text);
        let result = parser.edit_markdown(LinePos::new(3, 1), LinePos::new(3, 1), "with ");
        let new_text = parser.text().to_string();

        let mut tx = DocTransaction::new(LineDocument::build(&new_text));
        let mut pending = PendingBackgrounds::new();
        annotate(&mut tx, parser.tree(), parser.line_texts(), &result, &mut pending);
        let once = tx.doc().dump();
        assert!(once.contains("strong"), "{once}");

        let changed = annotate(&mut tx, parser.tree(), parser.line_texts(), &result, &mut pending);
        assert_eq!(tx.doc().dump(), once);
        assert!(changed.is_empty());
    }

    #[test]
    fn stale_marks_in_edited_lines_are_replaced() {
        // Line 1 was `**a** b` before the closing delimiter was deleted.
        let text = "**a b\n";
        let mut tx = DocTransaction::new(LineDocument::build(text));
        tx.add_mark(1, 6, Mark::syntax(SyntaxMark::Strong));
        assert!(tx.doc().dump().contains("strong"));

        let tree = parse(text);
        let nodes = tree.children(tree.root()).collect();
        let mut pending = PendingBackgrounds::new();
        annotate(
            &mut tx,
            &tree,
            &split_lines(text),
            &EditResult::Added { nodes },
            &mut pending,
        );
        assert!(!tx.doc().dump().contains("strong"));
    }

    #[test]
    fn malformed_results_are_rejected() {
        let text = "a\n";
        let mut tx = DocTransaction::new(LineDocument::build(text));
        let mut pending = PendingBackgrounds::new();
        let err = annotate_raw(
            &mut tx,
            &parse(text),
            &split_lines(text),
            RawEditResult::default(),
            &mut pending,
        );
        assert!(matches!(err, Err(EngineError::MalformedEditResult(_))));
        assert_eq!(tx.steps(), 0);
    }

    #[test]
    fn lines_past_the_end_clamp_to_the_last_block() {
        let text = "a\n```\nx";
        let mut tx = DocTransaction::new(LineDocument::build(text));
        annotate_document(&mut tx, &parse(text), &split_lines(text));
        let mut pending = PendingBackgrounds::from([2, 3, 40]);
        let changed = sweep(&mut tx, &Annotations::default(), &mut pending);
        assert_eq!(changed, BTreeSet::from([2, 3]));
        assert!(backgrounds(tx.doc()).iter().all(|b| !b));
    }
}
