//! Highlighting derived from markdown nodes.
//!
//! Every span here is in markdown coordinates with an exclusive end column.
//! Mapping onto the line document happens when the spans are applied.

use std::collections::BTreeMap;

use markdown_duet_syntax::{LinePos, MarkdownTree, MdKind, NodeId, SourcePos};

use crate::rich::{BackgroundKind, CodePart, LineBackground, Mark, SyntaxMark};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkSpan {
    pub start: LinePos,
    /// Exclusive.
    pub end: LinePos,
    pub mark: Mark,
}

/// Marks and line backgrounds for a set of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub marks: Vec<MarkSpan>,
    pub backgrounds: BTreeMap<usize, LineBackground>,
}

struct SpanBuilder<'a> {
    tree: &'a MarkdownTree,
    lines: &'a [String],
    out: Annotations,
}

impl Annotations {
    /// Collects the annotations of every node in the subtree at `root`.
    pub fn collect(tree: &MarkdownTree, lines: &[String], root: NodeId) -> Self {
        let mut builder = SpanBuilder {
            tree,
            lines,
            out: Annotations::default(),
        };
        for event in tree.walker(root) {
            if event.entering {
                builder.node(event.node);
            }
        }
        builder.out
    }

    pub fn extend(&mut self, other: Annotations) {
        self.marks.extend(other.marks);
        self.backgrounds.extend(other.backgrounds);
    }
}

impl SpanBuilder<'_> {
    fn line(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map_or("", String::as_str)
    }

    fn line_len(&self, line: usize) -> usize {
        self.line(line).chars().count()
    }

    /// Character at 1-based `col` of `line`.
    fn char_at(&self, line: usize, col: usize) -> Option<char> {
        self.line(line).chars().nth(col.checked_sub(1)?)
    }

    /// Length of the run of `ch` starting at `col`.
    fn run_at(&self, line: usize, col: usize, ch: char) -> usize {
        self.line(line)
            .chars()
            .skip(col.saturating_sub(1))
            .take_while(|c| *c == ch)
            .count()
    }

    fn mark(&mut self, start: LinePos, end: LinePos, mark: SyntaxMark) {
        if end <= start {
            return;
        }
        self.out.marks.push(MarkSpan {
            start,
            end,
            mark: Mark::syntax(mark),
        });
    }

    fn mark_cols(&mut self, line: usize, from: usize, to: usize, mark: SyntaxMark) {
        self.mark(LinePos::new(line, from), LinePos::new(line, to), mark);
    }

    fn mark_line(&mut self, line: usize, mark: SyntaxMark) {
        let end = self.line_len(line) + 1;
        self.mark_cols(line, 1, end, mark);
    }

    /// Whole node span, end made exclusive.
    fn mark_span(&mut self, span: SourcePos, mark: SyntaxMark) {
        let end_col = (span.end.col + 1).min(self.line_len(span.end.line) + 1);
        self.mark(span.start, LinePos::new(span.end.line, end_col), mark);
    }

    /// `len` delimiter characters at each end of the span.
    fn delimiters(&mut self, span: SourcePos, len: usize) {
        let (start, end) = (span.start, span.end);
        self.mark_cols(start.line, start.col, start.col + len, SyntaxMark::Delimiter);
        let close = (end.col + 1).saturating_sub(len).max(1);
        self.mark_cols(end.line, close, end.col + 1, SyntaxMark::Delimiter);
    }

    fn background(&mut self, span: SourcePos, kind: BackgroundKind) {
        for line in span.start.line..=span.end.line {
            self.out.backgrounds.insert(
                line,
                LineBackground {
                    kind,
                    code_start: line == span.start.line,
                    code_end: line == span.end.line,
                },
            );
        }
    }

    /// Opening line, inner lines and (when it closes the block) the closing
    /// line of a fenced construct.
    fn fenced(&mut self, span: SourcePos, closes: bool, part: fn(CodePart) -> SyntaxMark) {
        let (first, last) = (span.start.line, span.end.line);
        self.mark_line(first, part(CodePart::Start));
        let inner_end = if closes && last > first { last - 1 } else { last };
        for line in first + 1..=inner_end {
            self.mark_line(line, part(CodePart::Marked));
        }
        if closes && last > first {
            self.mark_line(last, part(CodePart::End));
        }
    }

    fn node(&mut self, id: NodeId) {
        let tree = self.tree;
        let node = tree.node(id);
        let span = node.sourcepos;
        match &node.kind {
            MdKind::Heading { level, setext } => {
                self.mark_span(span, SyntaxMark::Heading { level: *level });
                if *setext {
                    self.mark_line(span.end.line, SyntaxMark::Delimiter);
                } else {
                    let hashes = self.run_at(span.start.line, span.start.col, '#');
                    self.mark_cols(
                        span.start.line,
                        span.start.col,
                        span.start.col + hashes,
                        SyntaxMark::Delimiter,
                    );
                }
            }
            MdKind::Emph => {
                self.mark_span(span, SyntaxMark::Emph);
                self.delimiters(span, 1);
            }
            MdKind::Strong => {
                self.mark_span(span, SyntaxMark::Strong);
                self.delimiters(span, 2);
            }
            MdKind::Strike => {
                self.mark_span(span, SyntaxMark::Strike);
                let tildes = self.run_at(span.start.line, span.start.col, '~').max(1);
                self.delimiters(span, tildes);
            }
            MdKind::Code { tick_count } => {
                let ticks = *tick_count;
                let (start, end) = (span.start, span.end);
                self.mark_cols(
                    start.line,
                    start.col,
                    start.col + ticks,
                    SyntaxMark::Code(CodePart::Start),
                );
                let close = (end.col + 1).saturating_sub(ticks).max(1);
                self.mark(
                    LinePos::new(start.line, start.col + ticks),
                    LinePos::new(end.line, close),
                    SyntaxMark::Code(CodePart::Marked),
                );
                self.mark_cols(end.line, close, end.col + 1, SyntaxMark::Code(CodePart::End));
            }
            MdKind::CodeBlock(data) => {
                if data.fenced {
                    let closing = self.line(span.end.line).trim_start();
                    let closes = closing.chars().take_while(|c| *c == data.fence_char).count()
                        >= data.fence_length.max(3);
                    self.fenced(span, closes, SyntaxMark::CodeBlock);
                } else {
                    for line in span.start.line..=span.end.line {
                        self.mark_line(line, SyntaxMark::CodeBlock(CodePart::Marked));
                    }
                }
                self.background(span, BackgroundKind::CodeBlock);
            }
            MdKind::CustomBlock { .. } => {
                let closes = self.line(span.end.line).trim() == "$$";
                self.fenced(span, closes, SyntaxMark::CustomBlock);
                self.background(span, BackgroundKind::CustomBlock);
            }
            MdKind::FrontMatter => {
                self.mark_span(span, SyntaxMark::Meta);
                self.background(span, BackgroundKind::FrontMatter);
            }
            MdKind::Link(_) => self.link(id, span, SyntaxMark::Link, 1),
            MdKind::Image(_) => self.link(id, span, SyntaxMark::Image, 2),
            MdKind::Item(data) => {
                let odd =
                    std::iter::successors(Some(id), |n| tree.node(*n).prev).count() % 2 == 1;
                let (line, col) = (span.start.line, span.start.col);
                let marker = self
                    .line(line)
                    .chars()
                    .skip(col.saturating_sub(1))
                    .take_while(|c| !c.is_whitespace())
                    .count();
                self.mark_cols(line, col, col + marker, SyntaxMark::ListItem { odd });
                if data.task {
                    let mut at = col + marker;
                    while self.char_at(line, at) == Some(' ') {
                        at += 1;
                    }
                    if self.char_at(line, at) == Some('[') {
                        self.mark_cols(line, at, at + 3, SyntaxMark::TaskDelimiter);
                    }
                }
            }
            MdKind::BlockQuote => {
                self.mark_span(span, SyntaxMark::BlockQuote);
                for line in span.start.line..=span.end.line {
                    let text: Vec<char> = self.line(line).chars().collect();
                    let from = span.start.col.saturating_sub(1);
                    let quote = text
                        .iter()
                        .enumerate()
                        .skip(from)
                        .find(|(_, c)| **c != ' ')
                        .filter(|(_, c)| **c == '>');
                    if let Some((i, _)) = quote {
                        self.mark_cols(line, i + 1, i + 2, SyntaxMark::Delimiter);
                    }
                }
            }
            MdKind::ThematicBreak => self.mark_span(span, SyntaxMark::ThematicBreak),
            MdKind::Table { .. } => {
                self.mark_span(span, SyntaxMark::Table);
                if span.end.line > span.start.line {
                    self.mark_line(span.start.line + 1, SyntaxMark::TableDelimRow);
                }
            }
            MdKind::HtmlBlock | MdKind::HtmlInline => self.mark_span(span, SyntaxMark::Html),
            MdKind::Document
            | MdKind::Paragraph
            | MdKind::List(_)
            | MdKind::TableHead
            | MdKind::TableBody
            | MdKind::TableRow
            | MdKind::TableCell { .. }
            | MdKind::Text
            | MdKind::SoftBreak
            | MdKind::LineBreak
            | MdKind::Unknown(_) => {}
        }
    }

    /// `[text](url)`: the whole link, its text and its destination.
    fn link(&mut self, id: NodeId, span: SourcePos, mark: SyntaxMark, open: usize) {
        self.mark_span(span, mark);
        let end_line: Vec<char> = self.line(span.end.line).chars().collect();
        let search_from = if span.start.line == span.end.line {
            span.start.col - 1 + open
        } else {
            0
        };
        let last = span.end.col.min(end_line.len());
        let split = (search_from..last.saturating_sub(1))
            .rev()
            .find(|i| end_line.get(*i) == Some(&']') && end_line.get(i + 1) == Some(&'('));
        let Some(split) = split else {
            // Autolinks and reference links: no separate destination.
            if self.tree.node(id).first_child.is_some() {
                self.mark_span(span, SyntaxMark::LinkText);
            }
            return;
        };
        self.mark(
            LinePos::new(span.start.line, span.start.col + open),
            LinePos::new(span.end.line, split + 1),
            SyntaxMark::LinkText,
        );
        self.mark_cols(span.end.line, split + 3, span.end.col, SyntaxMark::LinkUrl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markdown_duet_syntax::{parse, split_lines};
    use pretty_assertions::assert_eq;

    fn annotations(text: &str) -> Annotations {
        let tree = parse(text);
        Annotations::collect(&tree, &split_lines(text), tree.root())
    }

    fn spans(ann: &Annotations) -> Vec<String> {
        ann.marks
            .iter()
            .map(|s| format!("{} {}..{}", s.mark, s.start, s.end))
            .collect()
    }

    #[test]
    fn heading_and_its_hashes() {
        let ann = annotations("## Title\n");
        insta::assert_debug_snapshot!(spans(&ann), @r#"
        [
            "heading2 1:1..1:9",
            "delimiter 1:1..1:3",
        ]
        "#);
    }

    #[test]
    fn emphasis_delimiters_bracket_the_text() {
        let ann = annotations("a **b** c\n");
        let got = spans(&ann);
        assert!(got.contains(&"strong 1:3..1:8".to_string()), "{got:?}");
        assert!(got.contains(&"delimiter 1:3..1:5".to_string()), "{got:?}");
        assert!(got.contains(&"delimiter 1:6..1:8".to_string()), "{got:?}");
    }

    #[test]
    fn fenced_code_block_has_parts_and_backgrounds() {
        let ann = annotations("text\n\n```rs\nlet x;\n```\n");
        let got = spans(&ann);
        assert!(got.contains(&"codeBlock:Start 3:1..3:6".to_string()), "{got:?}");
        assert_eq!(
            ann.backgrounds.keys().copied().collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        let first = ann.backgrounds[&3];
        let last = ann.backgrounds[&5];
        assert!(first.code_start && !first.code_end);
        assert!(last.code_end && !last.code_start);
        assert_eq!(first.kind, BackgroundKind::CodeBlock);
    }

    #[test]
    fn link_text_and_url_are_split() {
        let ann = annotations("[ab](http://x)\n");
        let got = spans(&ann);
        assert!(got.contains(&"linkText 1:2..1:4".to_string()), "{got:?}");
        assert!(got.contains(&"linkUrl 1:6..1:14".to_string()), "{got:?}");
    }

    #[test]
    fn task_items_mark_their_checkbox() {
        let ann = annotations("- [x] done\n");
        let got = spans(&ann);
        assert!(
            got.iter().any(|s| s.starts_with("taskDelimiter") && s.ends_with("1:3..1:6")),
            "{got:?}"
        );
    }
}
