//! Folds the pulldown-cmark event stream into a [`MarkdownTree`].
//!
//! pulldown-cmark's event model differs from the tree shape editors expect in
//! a few places, which the builder papers over:
//!
//! - contiguous `Text` events are merged into one text node;
//! - inline content of tight list items is wrapped in a paragraph;
//! - header cells get a row of their own and body rows a `tableBody`;
//! - code, HTML and front matter blocks collect their text as a literal.

use std::ops::Range;

use pulldown_cmark::{
    Alignment, CodeBlockKind, CowStr, Event, MetadataBlockKind, Options, Parser, Tag, TagEnd,
};

use super::custom_block::{self, CustomBlockSpan};
use crate::node::{Align, CodeBlockData, LinkData, ListData, MarkdownTree, MdKind, NodeId};
use crate::pos::{LineIndex, LinePos, SourcePos};

/// The pulldown-cmark extensions every tree is parsed with.
pub fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

pub(crate) fn build_tree(text: &str) -> MarkdownTree {
    let index = LineIndex::new(text);
    let (masked, custom_blocks) = custom_block::scan(text);
    let mut builder = TreeBuilder::new(text, index, custom_blocks);
    for (event, range) in Parser::new_ext(&masked, options()).into_offset_iter() {
        builder.event(event, range);
    }
    builder.finish()
}

struct TreeBuilder<'a> {
    text: &'a str,
    index: LineIndex,
    tree: MarkdownTree,
    stack: Vec<NodeId>,
    /// Synthetic nodes whose span is derived from their children at the end.
    synthetic: Vec<NodeId>,
    /// Text node that the next `Text` event may extend.
    open_text: Option<NodeId>,
    /// Per open list: whether an item held a real paragraph.
    loose_lists: Vec<bool>,
    custom_blocks: std::iter::Peekable<std::vec::IntoIter<CustomBlockSpan>>,
    table_aligns: Vec<Alignment>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str, index: LineIndex, custom_blocks: Vec<CustomBlockSpan>) -> Self {
        let end = match text.trim_end_matches(['\n', '\r']).len() {
            0 => LinePos::new(1, 1),
            n => index.pos_of(text, floor_boundary(text, n - 1)),
        };
        let tree = MarkdownTree::new(SourcePos::new(LinePos::new(1, 1), end));
        Self {
            text,
            index,
            stack: vec![tree.root()],
            tree,
            synthetic: Vec::new(),
            open_text: None,
            loose_lists: Vec::new(),
            custom_blocks: custom_blocks.into_iter().peekable(),
            table_aligns: Vec::new(),
        }
    }

    fn top(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.tree.root())
    }

    fn top_kind(&self) -> &MdKind {
        &self.tree.node(self.top()).kind
    }

    /// Inclusive source span of a byte range, ignoring trailing line breaks.
    fn span(&self, range: &Range<usize>) -> SourcePos {
        let start = self.index.pos_of(self.text, range.start);
        let mut end = range.end.min(self.text.len());
        let bytes = self.text.as_bytes();
        while end > range.start && matches!(bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        if end <= range.start {
            return SourcePos::new(start, start);
        }
        let last = floor_boundary(self.text, end - 1);
        SourcePos::new(start, self.index.pos_of(self.text, last))
    }

    fn push(&mut self, kind: MdKind, range: &Range<usize>) -> NodeId {
        let span = self.span(range);
        let id = self.tree.append(self.top(), kind, span, None);
        self.stack.push(id);
        id
    }

    fn leaf(&mut self, kind: MdKind, range: &Range<usize>, literal: Option<String>) -> NodeId {
        let span = self.span(range);
        self.tree.append(self.top(), kind, span, literal)
    }

    fn pop(&mut self) -> Option<NodeId> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    fn top_is_synthetic(&self, pred: impl Fn(&MdKind) -> bool) -> bool {
        let top = self.top();
        self.synthetic.last() == Some(&top) && pred(self.top_kind())
    }

    /// Closes the paragraph wrapped around tight list item content.
    fn close_tight_paragraph(&mut self) {
        if self.top_is_synthetic(|k| matches!(k, MdKind::Paragraph)) {
            self.pop();
        }
    }

    /// Opens a paragraph when inline content lands directly in a list item.
    fn ensure_inline_parent(&mut self, at: usize) {
        if matches!(self.top_kind(), MdKind::Item(_)) {
            let id = self.push(MdKind::Paragraph, &(at..at));
            self.synthetic.push(id);
        }
    }

    fn flush_custom_blocks(&mut self, before: usize) {
        if self.stack.len() != 1 {
            return;
        }
        while let Some(block) = self.custom_blocks.next_if(|b| b.range.start < before) {
            self.leaf(
                MdKind::CustomBlock { info: block.info },
                &block.range,
                Some(block.literal),
            );
        }
    }

    fn start_block(&mut self, at: usize) {
        self.close_tight_paragraph();
        self.flush_custom_blocks(at);
    }

    fn list_data(&self, at: usize, ordered: bool, start: u64) -> ListData {
        let line = self.text.get(at..).unwrap_or_default();
        let line = line.split('\n').next().unwrap_or_default();
        let marker = line.trim_start_matches(' ');
        let (marker_len, bullet_char, delimiter) = if ordered {
            let digits = marker.chars().take_while(char::is_ascii_digit).count();
            let delimiter = marker[digits..].chars().next().unwrap_or('.');
            (digits + 1, '\0', delimiter)
        } else {
            (1, marker.chars().next().unwrap_or('-'), '\0')
        };
        let after = marker.get(marker_len..).unwrap_or_default();
        let spaces = after.len() - after.trim_start_matches(' ').len();
        let spaces = if spaces == 0 || spaces > 4 || after.trim().is_empty() {
            1
        } else {
            spaces
        };
        ListData {
            ordered,
            start,
            bullet_char,
            delimiter,
            padding: marker_len + spaces,
            task: false,
            checked: false,
            tight: true,
        }
    }

    fn code_block_data(&self, at: usize, kind: &CodeBlockKind<'_>) -> CodeBlockData {
        match kind {
            CodeBlockKind::Indented => CodeBlockData::default(),
            CodeBlockKind::Fenced(info) => {
                let line = self.text.get(at..).unwrap_or_default();
                let fence = line.trim_start_matches(' ');
                let fence_offset = line.len() - fence.len();
                let fence_char = fence.chars().next().unwrap_or('`');
                let fence_length = fence.chars().take_while(|c| *c == fence_char).count();
                CodeBlockData {
                    info: info.to_string(),
                    fenced: true,
                    fence_char,
                    fence_length: fence_length.max(3),
                    fence_offset,
                }
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        self.open_text = None;
        let inline = matches!(
            tag,
            Tag::Emphasis
                | Tag::Strong
                | Tag::Strikethrough
                | Tag::Link { .. }
                | Tag::Image { .. }
                | Tag::Superscript
                | Tag::Subscript
        );
        if inline {
            self.ensure_inline_parent(range.start);
        } else {
            self.start_block(range.start);
        }
        match tag {
            Tag::Paragraph => {
                if matches!(self.top_kind(), MdKind::Item(_))
                    && let Some(loose) = self.loose_lists.last_mut()
                {
                    *loose = true;
                }
                self.push(MdKind::Paragraph, &range);
            }
            Tag::Heading { level, .. } => {
                let setext = !self
                    .text
                    .get(range.start..)
                    .unwrap_or_default()
                    .trim_start_matches(' ')
                    .starts_with('#');
                self.push(
                    MdKind::Heading {
                        level: level as u8,
                        setext,
                    },
                    &range,
                );
            }
            Tag::BlockQuote(_) => {
                self.push(MdKind::BlockQuote, &range);
            }
            Tag::CodeBlock(kind) => {
                let data = self.code_block_data(range.start, &kind);
                let id = self.push(MdKind::CodeBlock(data), &range);
                self.tree.node_mut(id).literal = Some(String::new());
            }
            Tag::HtmlBlock => {
                let id = self.push(MdKind::HtmlBlock, &range);
                self.tree.node_mut(id).literal = Some(String::new());
            }
            Tag::MetadataBlock(MetadataBlockKind::YamlStyle) => {
                let id = self.push(MdKind::FrontMatter, &range);
                self.tree.node_mut(id).literal = Some(String::new());
            }
            Tag::MetadataBlock(MetadataBlockKind::PlusesStyle) => {
                let id = self.push(MdKind::Unknown("metadataBlock".into()), &range);
                self.tree.node_mut(id).literal = Some(String::new());
            }
            Tag::List(start) => {
                let data = self.list_data(range.start, start.is_some(), start.unwrap_or(1));
                self.loose_lists.push(false);
                self.push(MdKind::List(data), &range);
            }
            Tag::Item => {
                let (ordered, start) = match self.top_kind() {
                    MdKind::List(list) => (list.ordered, list.start),
                    _ => (false, 1),
                };
                let data = self.list_data(range.start, ordered, start);
                self.push(MdKind::Item(data), &range);
            }
            Tag::Table(aligns) => {
                let aligns_out = aligns.iter().map(|a| align_of(*a)).collect();
                self.table_aligns = aligns;
                self.push(MdKind::Table { aligns: aligns_out }, &range);
            }
            Tag::TableHead => {
                self.push(MdKind::TableHead, &range);
                let row = self.push(MdKind::TableRow, &range);
                self.synthetic.push(row);
            }
            Tag::TableRow => {
                if matches!(self.top_kind(), MdKind::Table { .. }) {
                    let body = self.push(MdKind::TableBody, &range);
                    self.synthetic.push(body);
                }
                self.push(MdKind::TableRow, &range);
            }
            Tag::TableCell => {
                let col = self.tree.children(self.top()).count();
                let header = self
                    .tree
                    .ancestor(self.top(), |k| matches!(k, MdKind::TableHead))
                    .is_some();
                let align = self
                    .table_aligns
                    .get(col)
                    .copied()
                    .map_or(Align::None, align_of);
                self.push(MdKind::TableCell { align, header }, &range);
            }
            Tag::Emphasis => {
                self.push(MdKind::Emph, &range);
            }
            Tag::Strong => {
                self.push(MdKind::Strong, &range);
            }
            Tag::Strikethrough => {
                self.push(MdKind::Strike, &range);
            }
            Tag::Link {
                dest_url, title, ..
            } => {
                self.push(MdKind::Link(link_data(dest_url, title)), &range);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.push(MdKind::Image(link_data(dest_url, title)), &range);
            }
            other => {
                let name = unknown_tag_name(&other);
                log::warn!("no dedicated node kind for {name}; keeping it as unknown");
                self.push(MdKind::Unknown(name.to_string()), &range);
            }
        }
    }

    fn end(&mut self, tag: TagEnd) {
        self.open_text = None;
        match tag {
            TagEnd::Item => {
                self.close_tight_paragraph();
                self.pop();
            }
            TagEnd::TableHead => {
                if self.top_is_synthetic(|k| matches!(k, MdKind::TableRow)) {
                    self.pop();
                }
                self.pop();
            }
            TagEnd::Table => {
                if self.top_is_synthetic(|k| matches!(k, MdKind::TableBody)) {
                    self.pop();
                }
                self.pop();
                self.table_aligns.clear();
            }
            TagEnd::List(_) => {
                self.close_tight_paragraph();
                let loose = self.loose_lists.pop().unwrap_or(false);
                if let Some(list) = self.pop() {
                    self.set_tight(list, !loose);
                }
            }
            _ => {
                self.close_tight_paragraph();
                self.pop();
            }
        }
    }

    fn set_tight(&mut self, list: NodeId, tight: bool) {
        if let MdKind::List(data) = &mut self.tree.node_mut(list).kind {
            data.tight = tight;
        }
        let items: Vec<_> = self.tree.children(list).collect();
        for item in items {
            if let MdKind::Item(data) = &mut self.tree.node_mut(item).kind {
                data.tight = tight;
            }
        }
    }

    fn append_literal(&mut self, text: &str) -> bool {
        let top = self.top();
        let node = self.tree.node_mut(top);
        match (&node.kind, &mut node.literal) {
            (
                MdKind::CodeBlock(_)
                | MdKind::HtmlBlock
                | MdKind::FrontMatter
                | MdKind::Unknown(_),
                Some(literal),
            ) => {
                literal.push_str(text);
                true
            }
            _ => false,
        }
    }

    fn text(&mut self, text: CowStr<'_>, range: Range<usize>) {
        if self.append_literal(&text) {
            return;
        }
        self.ensure_inline_parent(range.start);
        if let Some(id) = self.open_text
            && self.tree.node(self.top()).last_child == Some(id)
        {
            let end = self.span(&range).end;
            let node = self.tree.node_mut(id);
            node.literal.get_or_insert_default().push_str(&text);
            node.sourcepos.end = end.max(node.sourcepos.end);
            return;
        }
        let id = self.leaf(MdKind::Text, &range, Some(text.into_string()));
        self.open_text = Some(id);
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(text, range),
            Event::Code(code) => {
                self.open_text = None;
                self.ensure_inline_parent(range.start);
                let tick_count = self
                    .text
                    .get(range.clone())
                    .unwrap_or_default()
                    .chars()
                    .take_while(|c| *c == '`')
                    .count();
                self.leaf(
                    MdKind::Code { tick_count },
                    &range,
                    Some(code.into_string()),
                );
            }
            Event::Html(html) => {
                if !self.append_literal(&html) {
                    self.open_text = None;
                    self.leaf(MdKind::HtmlInline, &range, Some(html.into_string()));
                }
            }
            Event::InlineHtml(html) => {
                self.open_text = None;
                self.ensure_inline_parent(range.start);
                self.leaf(MdKind::HtmlInline, &range, Some(html.into_string()));
            }
            Event::SoftBreak => {
                self.open_text = None;
                self.ensure_inline_parent(range.start);
                self.leaf(MdKind::SoftBreak, &range, None);
            }
            Event::HardBreak => {
                self.open_text = None;
                self.ensure_inline_parent(range.start);
                self.leaf(MdKind::LineBreak, &range, None);
            }
            Event::Rule => {
                self.open_text = None;
                self.start_block(range.start);
                self.leaf(MdKind::ThematicBreak, &range, None);
            }
            Event::TaskListMarker(checked) => {
                if let Some(item) = self
                    .tree
                    .ancestor(self.top(), |k| matches!(k, MdKind::Item(_)))
                    && let MdKind::Item(data) = &mut self.tree.node_mut(item).kind
                {
                    data.task = true;
                    data.checked = checked;
                }
            }
            Event::FootnoteReference(_) | Event::InlineMath(_) | Event::DisplayMath(_) => {
                self.open_text = None;
                let source = self.text.get(range.clone()).unwrap_or_default().to_string();
                log::warn!("no dedicated node kind for {source:?}; keeping it as unknown");
                self.leaf(MdKind::Unknown("inline".into()), &range, Some(source));
            }
        }
    }

    fn finish(mut self) -> MarkdownTree {
        self.stack.truncate(1);
        self.flush_custom_blocks(usize::MAX);
        for id in self.synthetic.iter().rev() {
            let children: Vec<_> = self.tree.children(*id).collect();
            let (Some(first), Some(last)) = (children.first(), children.last()) else {
                continue;
            };
            let start = self.tree.node(*first).sourcepos.start;
            let end = children
                .iter()
                .map(|c| self.tree.node(*c).sourcepos.end)
                .max()
                .unwrap_or(self.tree.node(*last).sourcepos.end);
            self.tree.node_mut(*id).sourcepos = SourcePos::new(start, end);
        }
        self.tree
    }
}

/// Largest char boundary at or below `i`.
fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn align_of(align: Alignment) -> Align {
    match align {
        Alignment::None => Align::None,
        Alignment::Left => Align::Left,
        Alignment::Center => Align::Center,
        Alignment::Right => Align::Right,
    }
}

fn link_data(dest: CowStr<'_>, title: CowStr<'_>) -> LinkData {
    LinkData {
        destination: dest.into_string(),
        title: title.into_string(),
    }
}

fn unknown_tag_name(tag: &Tag<'_>) -> &'static str {
    match tag {
        Tag::FootnoteDefinition(_) => "footnoteDefinition",
        Tag::DefinitionList => "definitionList",
        Tag::DefinitionListTitle => "definitionListTitle",
        Tag::DefinitionListDefinition => "definitionListDefinition",
        Tag::Superscript => "superscript",
        Tag::Subscript => "subscript",
        _ => "unknown",
    }
}
