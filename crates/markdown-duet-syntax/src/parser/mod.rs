//! The parser adapter: an `xi-rope` buffer reparsed with pulldown-cmark.

mod builder;
mod custom_block;
mod diff;

use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::edit::EditResult;
use crate::node::{MarkdownTree, NodeId};
use crate::pos::{LineIndex, LinePos};

pub use builder::options;

/// Parses a whole document.
pub fn parse(text: &str) -> MarkdownTree {
    builder::build_tree(text)
}

/// Splits on `\n`, keeping the empty line after a trailing newline.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// An incremental markdown parser as seen by the editing core.
pub trait MarkdownParser {
    /// Replaces `start..end` (end column exclusive) with `text` and reports
    /// which blocks changed.
    fn edit_markdown(&mut self, start: LinePos, end: LinePos, text: &str) -> EditResult;

    fn find_node_at_position(&self, pos: LinePos) -> Option<NodeId>;

    fn find_first_node_at_line(&self, line: usize) -> Option<NodeId>;

    fn line_texts(&self) -> &[String];

    fn tree(&self) -> &MarkdownTree;
}

pub struct CmarkParser {
    rope: Rope,
    text: String,
    index: LineIndex,
    lines: Vec<String>,
    tree: MarkdownTree,
}

impl CmarkParser {
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from(text),
            text: text.to_string(),
            index: LineIndex::new(text),
            lines: split_lines(text),
            tree: parse(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn clamp(&self, pos: LinePos) -> LinePos {
        let line_count = self.lines.len();
        let line = pos.line.clamp(1, line_count);
        let max_col = self.lines[line - 1].chars().count() + 1;
        let clamped = LinePos::new(line, pos.col.clamp(1, max_col));
        if clamped != pos {
            log::debug!("edit position {pos} clamped to {clamped}");
        }
        clamped
    }
}

impl MarkdownParser for CmarkParser {
    fn edit_markdown(&mut self, start: LinePos, end: LinePos, text: &str) -> EditResult {
        let (start, end) = (self.clamp(start), self.clamp(end));
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let from = self.index.offset_of(&self.text, start);
        let to = self.index.offset_of(&self.text, end);

        let mut builder = Builder::new(self.rope.len());
        builder.replace(from..to, Rope::from(text));
        let rope = builder.build().apply(&self.rope);

        let new_text = rope.to_string();
        let new_lines = split_lines(&new_text);
        let new_tree = parse(&new_text);
        let result = diff::edit_result(
            &diff::Snapshot {
                tree: &self.tree,
                lines: &self.lines,
            },
            &diff::Snapshot {
                tree: &new_tree,
                lines: &new_lines,
            },
            start,
            end,
            text,
        );

        self.index = LineIndex::new(&new_text);
        self.rope = rope;
        self.text = new_text;
        self.lines = new_lines;
        self.tree = new_tree;
        result
    }

    fn find_node_at_position(&self, pos: LinePos) -> Option<NodeId> {
        self.tree.find_node_at_position(pos)
    }

    fn find_first_node_at_line(&self, line: usize) -> Option<NodeId> {
        self.tree.find_first_node_at_line(line)
    }

    fn line_texts(&self) -> &[String] {
        &self.lines
    }

    fn tree(&self) -> &MarkdownTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Align, MdKind};
    use pretty_assertions::assert_eq;

    fn outline(tree: &MarkdownTree) -> String {
        tree.walker(tree.root())
            .filter(|event| event.entering)
            .map(|event| {
                let node = tree.node(event.node);
                let indent = "  ".repeat(tree.depth(event.node));
                format!(
                    "{indent}{} {}-{}",
                    node.kind.name(),
                    node.sourcepos.start,
                    node.sourcepos.end
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn top_level(tree: &MarkdownTree) -> Vec<&MdKind> {
        tree.children(tree.root())
            .map(|id| &tree.node(id).kind)
            .collect()
    }

    #[test]
    fn paragraph_with_strong_and_emph() {
        let tree = parse("**bold** and *em*\n");
        insta::assert_snapshot!(outline(&tree), @r"
        document 1:1-1:17
          paragraph 1:1-1:17
            strong 1:1-1:8
              text 1:3-1:6
            text 1:9-1:13
            emph 1:14-1:17
              text 1:15-1:16
        ");
    }

    #[test]
    fn tight_list_items_get_paragraphs() {
        let tree = parse("- a\n- b\n");
        let list = tree.node(tree.root()).first_child.unwrap();
        let MdKind::List(data) = &tree.node(list).kind else {
            panic!("expected list");
        };
        assert!(data.tight);
        assert_eq!(data.bullet_char, '-');
        assert_eq!(data.padding, 2);
        insta::assert_snapshot!(outline(&tree), @r"
        document 1:1-2:3
          list 1:1-2:3
            item 1:1-1:3
              paragraph 1:3-1:3
                text 1:3-1:3
            item 2:1-2:3
              paragraph 2:3-2:3
                text 2:3-2:3
        ");
    }

    #[test]
    fn loose_list_is_not_tight() {
        let tree = parse("1) a\n\n2) b\n");
        let list = tree.node(tree.root()).first_child.unwrap();
        let MdKind::List(data) = &tree.node(list).kind else {
            panic!("expected list");
        };
        assert!(!data.tight);
        assert!(data.ordered);
        assert_eq!(data.delimiter, ')');
        for item in tree.children(list) {
            assert!(matches!(&tree.node(item).kind, MdKind::Item(d) if !d.tight));
        }
    }

    #[test]
    fn task_items_record_their_state() {
        let tree = parse("- [x] done\n- [ ] todo\n");
        let list = tree.node(tree.root()).first_child.unwrap();
        let states: Vec<_> = tree
            .children(list)
            .map(|item| match &tree.node(item).kind {
                MdKind::Item(d) => (d.task, d.checked),
                _ => (false, false),
            })
            .collect();
        assert_eq!(states, vec![(true, true), (true, false)]);
    }

    #[test]
    fn table_rows_are_grouped() {
        let tree = parse("| a | b |\n| :-- | --: |\n| 1 | 2 |\n");
        let table = tree.node(tree.root()).first_child.unwrap();
        assert_eq!(
            tree.node(table).kind,
            MdKind::Table {
                aligns: vec![Align::Left, Align::Right]
            }
        );
        let shape: Vec<_> = tree
            .walker(table)
            .filter(|e| e.entering)
            .map(|e| tree.node(e.node).kind.name().to_string())
            .filter(|name| name != "text")
            .collect();
        assert_eq!(
            shape,
            vec![
                "table",
                "tableHead",
                "tableRow",
                "tableCell",
                "tableCell",
                "tableBody",
                "tableRow",
                "tableCell",
                "tableCell",
            ]
        );
        let cell = tree.find_node_at_position(LinePos::new(3, 7)).unwrap();
        let cell = tree
            .ancestor(cell, |k| matches!(k, MdKind::TableCell { .. }))
            .unwrap();
        assert_eq!(
            tree.node(cell).kind,
            MdKind::TableCell {
                align: Align::Right,
                header: false
            }
        );
    }

    #[test]
    fn fenced_code_block_keeps_fence_and_literal() {
        let tree = parse("~~~~rust\nfn x() {}\n~~~~\n");
        let code = tree.node(tree.root()).first_child.unwrap();
        let node = tree.node(code);
        let MdKind::CodeBlock(data) = &node.kind else {
            panic!("expected code block");
        };
        assert_eq!(data.info, "rust");
        assert_eq!(data.fence_char, '~');
        assert_eq!(data.fence_length, 4);
        assert_eq!(node.literal.as_deref(), Some("fn x() {}\n"));
        assert_eq!(node.sourcepos.start, LinePos::new(1, 1));
        assert_eq!(node.sourcepos.end, LinePos::new(3, 4));
    }

    #[test]
    fn headings_remember_their_form() {
        let tree = parse("Title\n===\n\n## Sub\n");
        assert_eq!(
            top_level(&tree),
            vec![
                &MdKind::Heading {
                    level: 1,
                    setext: true
                },
                &MdKind::Heading {
                    level: 2,
                    setext: false
                },
            ]
        );
    }

    #[test]
    fn custom_blocks_sit_between_blocks() {
        let tree = parse("a\n\n$$uml\nx\n$$\n\nb\n");
        let names: Vec<_> = top_level(&tree).iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["paragraph", "customBlock", "paragraph"]);
        let custom = tree.find_first_node_at_line(3).unwrap();
        let node = tree.node(custom);
        assert_eq!(node.literal.as_deref(), Some("x\n"));
        assert_eq!(node.sourcepos.end, LinePos::new(5, 2));
    }

    #[test]
    fn front_matter_and_html_blocks_collect_literals() {
        let tree = parse("---\ntitle: x\n---\n\n<div>\nhi\n</div>\n");
        let blocks: Vec<_> = tree.children(tree.root()).collect();
        assert_eq!(tree.node(blocks[0]).kind, MdKind::FrontMatter);
        assert_eq!(
            tree.node(blocks[0]).literal.as_deref().map(str::trim_end),
            Some("title: x")
        );
        assert_eq!(tree.node(blocks[1]).kind, MdKind::HtmlBlock);
        assert_eq!(
            tree.node(blocks[1]).literal.as_deref(),
            Some("<div>\nhi\n</div>\n")
        );
    }

    #[test]
    fn code_span_counts_backticks() {
        let tree = parse("a ``b`c`` d\n");
        let code = tree.find_node_at_position(LinePos::new(1, 5)).unwrap();
        let node = tree.node(code);
        assert_eq!(node.kind, MdKind::Code { tick_count: 2 });
        assert_eq!(node.literal.as_deref(), Some("b`c"));
    }

    #[test]
    fn split_lines_keeps_trailing_empty_line() {
        assert_eq!(split_lines("a\r\nb\n"), vec!["a", "b", ""]);
    }
}
