//! Markdown syntax tree → rich tree.

use markdown_duet_syntax::{Align, MarkdownTree, MdKind, NodeId};

use super::html::{self, HtmlFallback, HtmlTag};
use super::widget::{Piece, WidgetRules, split_widgets, widget_node};
use crate::error::EngineError;
use crate::rich::transaction::normalize;
use crate::rich::{CellAlign, CellAttrs, HeadingType, Mark, MarkKind, NodeKind, Offset, RichNode};
use crate::table::{SlotGrid, parse_span_prefix, row_spans};

struct Frame {
    kind: NodeKind,
    content: Vec<RichNode>,
    /// Set on table cells until their first text has been checked for a
    /// span prefix.
    span_prefix_pending: bool,
}

/// A mark opened by markdown syntax (`tag: None`) or an HTML tag.
struct OpenMark {
    mark: Mark,
    tag: Option<String>,
    /// False when an identical mark was already active.
    added: bool,
    /// Marks the new one replaced, restored when it closes.
    displaced: Vec<Mark>,
}

struct TableFrame {
    columns: usize,
    grid: SlotGrid,
}

pub(crate) struct ToRichState<'a> {
    stack: Vec<Frame>,
    marks: Vec<Mark>,
    /// Innermost last.
    open_marks: Vec<OpenMark>,
    tables: Vec<TableFrame>,
    /// The outermost node once it has been closed.
    root: Option<RichNode>,
    widgets: &'a WidgetRules,
    fallback: &'a dyn HtmlFallback,
}

impl<'a> ToRichState<'a> {
    pub(crate) fn new(widgets: &'a WidgetRules, fallback: &'a dyn HtmlFallback) -> Self {
        Self {
            stack: Vec::new(),
            marks: Vec::new(),
            open_marks: Vec::new(),
            tables: Vec::new(),
            root: None,
            widgets,
            fallback,
        }
    }

    fn top(&mut self) -> Option<&mut Frame> {
        self.stack.last_mut()
    }

    fn in_textblock(&self) -> bool {
        self.stack.last().is_some_and(|f| f.kind.is_textblock())
    }

    /// Position at which the next node would land. The outermost frame's
    /// open token does not count.
    fn pos(&self) -> Offset {
        self.stack
            .iter()
            .enumerate()
            .map(|(depth, frame)| {
                let content: usize = frame.content.iter().map(RichNode::node_size).sum();
                content + usize::from(depth > 0)
            })
            .sum()
    }

    pub(crate) fn open_node(&mut self, kind: NodeKind) {
        let span_prefix_pending = kind.is_table_cell();
        self.stack.push(Frame {
            kind,
            content: Vec::new(),
            span_prefix_pending,
        });
    }

    /// Materializes the top frame and appends it to its parent, or keeps it
    /// as the result when it is the outermost node.
    pub(crate) fn close_node(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if frame.kind.is_textblock() {
            // Unclosed HTML formatting ends with its block.
            self.open_marks.clear();
            self.marks.clear();
        }
        let node = RichNode::new(frame.kind, normalize(frame.content));
        match self.top() {
            Some(parent) => parent.content.push(node),
            None => self.root = Some(node),
        }
    }

    pub(crate) fn open_mark(&mut self, mark: Mark) {
        self.push_mark(mark, None);
    }

    fn push_mark(&mut self, mark: Mark, tag: Option<String>) {
        let displaced = self
            .marks
            .iter()
            .filter(|m| m.excludes(&mark) && **m != mark)
            .cloned()
            .collect();
        let added = !mark.is_in_set(&self.marks);
        self.marks = mark.add_to_set(&self.marks);
        self.open_marks.push(OpenMark {
            mark,
            tag,
            added,
            displaced,
        });
    }

    fn pop_mark(&mut self, at: usize) {
        let open = self.open_marks.remove(at);
        if open.added {
            self.marks = open.mark.remove_from_set(&self.marks);
        }
        for mark in open.displaced {
            self.marks = mark.add_to_set(&self.marks);
        }
    }

    /// Closes the innermost markdown mark of this type; HTML marks of the
    /// same type stay active.
    pub(crate) fn close_mark(&mut self, kind: &MarkKind) {
        let at = self
            .open_marks
            .iter()
            .rposition(|open| open.tag.is_none() && open.mark.kind.same_type(kind));
        if let Some(at) = at {
            self.pop_mark(at);
        }
    }

    /// Closes the innermost HTML mark opened by `tag`, along with HTML marks
    /// left unclosed inside it. Returns false when no such tag is open.
    fn close_html_mark(&mut self, tag: &str) -> bool {
        let Some(at) = self
            .open_marks
            .iter()
            .rposition(|open| open.tag.as_deref() == Some(tag))
        else {
            return false;
        };
        for i in (at..self.open_marks.len()).rev() {
            if self.open_marks[i].tag.is_some() {
                self.pop_mark(i);
            }
        }
        true
    }

    fn push_node(&mut self, node: RichNode) {
        if let Some(frame) = self.top() {
            frame.content.push(node);
        }
    }

    /// Appends text under the active marks, merging with the previous run
    /// when the marks match.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let marks = self.marks.clone();
        let Some(frame) = self.top() else {
            return;
        };
        if let Some(last) = frame.content.last_mut()
            && let Some(prev) = last.text_str()
            && last.marks() == marks.as_slice()
        {
            *last = RichNode::text(format!("{prev}{text}"), marks);
            return;
        }
        frame.content.push(RichNode::text(text, marks));
    }

    /// Adds plain text: configured widget rules are applied and widget
    /// syntax is split out into widget nodes.
    pub(crate) fn add_text(&mut self, text: &str) {
        let text = self.take_span_prefix(text);
        let code = self.marks.iter().any(|m| m.kind == MarkKind::Code);
        if code {
            self.push_text(&text);
            return;
        }
        let wrapped = self.widgets.wrap(&text).into_owned();
        for piece in split_widgets(&wrapped) {
            match piece {
                Piece::Text(plain) => self.push_text(plain),
                Piece::Widget { info, source } => {
                    let node = widget_node(info, source, self.marks.clone());
                    self.push_node(node);
                }
            }
        }
    }

    /// Reads `@cols=N:` / `@rows=N:` off the first text of a table cell.
    fn take_span_prefix(&mut self, text: &str) -> String {
        let Some(frame) = self.stack.last_mut() else {
            return text.to_string();
        };
        if !frame.span_prefix_pending {
            return text.to_string();
        }
        frame.span_prefix_pending = false;
        if !frame.content.is_empty() {
            return text.to_string();
        }
        let (colspan, rowspan, len) = parse_span_prefix(text);
        if len == 0 {
            return text.to_string();
        }
        frame.kind = match &frame.kind {
            NodeKind::TableHeadCell(attrs) => NodeKind::TableHeadCell(CellAttrs {
                colspan,
                rowspan,
                ..*attrs
            }),
            NodeKind::TableBodyCell(attrs) => NodeKind::TableBodyCell(CellAttrs {
                colspan,
                rowspan,
                ..*attrs
            }),
            other => other.clone(),
        };
        text[len..].to_string()
    }

    fn add_inline_html(&mut self, literal: &str) {
        match html::parse_tag(literal) {
            Some(HtmlTag::Open { raw, self_closing }) => {
                if let Some(node) = html::node_for_tag(&raw) {
                    let node = node.with_marks(self.marks.clone());
                    self.push_node(node);
                    return;
                }
                if !self_closing && let Some(kind) = html::mark_for_tag(&raw) {
                    let tag = raw.tag.clone();
                    self.push_mark(Mark::new(kind).with_html(raw), Some(tag));
                    return;
                }
            }
            Some(HtmlTag::Close(tag)) => {
                if self.close_html_mark(&tag) {
                    return;
                }
            }
            None => {}
        }
        let node = self.fallback.inline(literal).with_marks(self.marks.clone());
        self.push_node(node);
    }

    fn add_block_html(&mut self, literal: &str) {
        let html = literal.trim_end_matches('\n');
        let node = if html::is_comment(html) {
            RichNode::leaf(NodeKind::HtmlComment {
                html: html.to_string(),
            })
        } else {
            self.fallback.block(html)
        };
        self.push_node(node);
    }

    /// Adds a text block holding `literal` verbatim.
    fn add_literal_block(&mut self, kind: NodeKind, literal: &str) {
        self.open_node(kind);
        let text = literal.strip_suffix('\n').unwrap_or(literal);
        if let Some(frame) = self.top()
            && !text.is_empty()
        {
            frame.content.push(RichNode::text(text, Vec::new()));
        }
        self.close_node();
    }

    fn close_table_row(&mut self) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        let Some(table) = self.tables.last_mut() else {
            return;
        };
        let row = RichNode::new(NodeKind::TableRow, std::mem::take(&mut frame.content));
        let starts = table.grid.place_row(&row_spans(&row));
        // Cells the parser added to pad a row that merged cells already fill.
        let mut keep = row.content().len();
        while keep > 0
            && starts[keep - 1] >= table.columns
            && row.content()[keep - 1].content_size() == 0
        {
            keep -= 1;
        }
        frame.content = row.content()[..keep].to_vec();
        self.close_node();
    }

    /// Enters or leaves one markdown node.
    pub(crate) fn visit(&mut self, tree: &MarkdownTree, id: NodeId, entering: bool) -> bool {
        let node = tree.node(id);
        let literal = node.literal.as_deref().unwrap_or_default();
        if !entering {
            match &node.kind {
                MdKind::Emph => self.close_mark(&MarkKind::Emph),
                MdKind::Strong => self.close_mark(&MarkKind::Strong),
                MdKind::Strike => self.close_mark(&MarkKind::Strike),
                MdKind::Link(_) => self.close_mark(&MarkKind::Link {
                    url: String::new(),
                    title: None,
                }),
                MdKind::Image(_) | MdKind::Unknown(_) => {}
                MdKind::TableRow => self.close_table_row(),
                MdKind::Table { .. } => {
                    self.tables.pop();
                    self.close_node();
                }
                _ => self.close_node(),
            }
            return false;
        }

        match &node.kind {
            MdKind::Document => self.open_node(NodeKind::Doc),
            MdKind::Paragraph => self.open_node(NodeKind::Paragraph),
            MdKind::Heading { level, setext } => self.open_node(NodeKind::Heading {
                level: *level,
                heading_type: if *setext {
                    HeadingType::Setext
                } else {
                    HeadingType::Atx
                },
            }),
            MdKind::BlockQuote => self.open_node(NodeKind::BlockQuote),
            MdKind::List(data) if data.ordered => self.open_node(NodeKind::OrderedList {
                tight: data.tight,
                order: data.start,
                delimiter: data.delimiter,
            }),
            MdKind::List(data) => self.open_node(NodeKind::BulletList {
                tight: data.tight,
                bullet: data.bullet_char,
            }),
            MdKind::Item(data) => self.open_node(NodeKind::ListItem {
                task: data.task,
                checked: data.checked,
            }),
            MdKind::CodeBlock(data) => {
                let (fence_char, fence_length) = if data.fenced {
                    (data.fence_char, data.fence_length)
                } else {
                    ('`', 3)
                };
                let kind = NodeKind::CodeBlock {
                    language: data.info.clone(),
                    fence_char,
                    fence_length,
                };
                self.add_literal_block(kind, literal);
            }
            MdKind::HtmlBlock => self.add_block_html(literal),
            MdKind::CustomBlock { info } => {
                self.add_literal_block(NodeKind::CustomBlock { info: info.clone() }, literal)
            }
            MdKind::FrontMatter => self.add_literal_block(NodeKind::FrontMatter, literal),
            MdKind::ThematicBreak => self.push_node(RichNode::leaf(NodeKind::ThematicBreak)),
            MdKind::Table { aligns } => {
                self.tables.push(TableFrame {
                    columns: aligns.len(),
                    grid: SlotGrid::new(),
                });
                self.open_node(NodeKind::Table);
            }
            MdKind::TableHead => self.open_node(NodeKind::TableHead),
            MdKind::TableBody => self.open_node(NodeKind::TableBody),
            MdKind::TableRow => self.open_node(NodeKind::TableRow),
            MdKind::TableCell { align, header } => {
                let attrs = CellAttrs {
                    align: cell_align(*align),
                    ..CellAttrs::default()
                };
                self.open_node(if *header {
                    NodeKind::TableHeadCell(attrs)
                } else {
                    NodeKind::TableBodyCell(attrs)
                });
            }
            MdKind::Text => self.add_text(literal),
            MdKind::SoftBreak => self.add_text("\n"),
            MdKind::LineBreak => {
                let node = RichNode::leaf(NodeKind::HardBreak).with_marks(self.marks.clone());
                self.push_node(node);
            }
            MdKind::Emph => self.open_mark(Mark::new(MarkKind::Emph)),
            MdKind::Strong => self.open_mark(Mark::new(MarkKind::Strong)),
            MdKind::Strike => self.open_mark(Mark::new(MarkKind::Strike)),
            MdKind::Code { .. } => {
                self.open_mark(Mark::new(MarkKind::Code));
                self.push_text(literal);
                self.close_mark(&MarkKind::Code);
            }
            MdKind::Link(link) => self.open_mark(Mark::new(MarkKind::Link {
                url: link.destination.clone(),
                title: (!link.title.is_empty()).then(|| link.title.clone()),
            })),
            MdKind::Image(link) => {
                let image = RichNode::leaf(NodeKind::Image {
                    image_url: link.destination.clone(),
                    alt_text: tree.text_content(id),
                    title: (!link.title.is_empty()).then(|| link.title.clone()),
                })
                .with_marks(self.marks.clone());
                self.push_node(image);
                // The alt text is already on the node.
                return true;
            }
            MdKind::HtmlInline => self.add_inline_html(literal),
            MdKind::Unknown(name) => {
                log::warn!("{}", EngineError::UnknownNodeType(name.clone()));
                if node.literal.is_some() {
                    if self.in_textblock() {
                        self.add_text(literal);
                    } else {
                        self.open_node(NodeKind::Paragraph);
                        self.add_text(literal.trim_end_matches('\n'));
                        self.close_node();
                    }
                }
            }
        }
        false
    }

    /// Converts the subtree at `root`. When `anchor` is given, also returns
    /// the position at which that node was placed.
    pub(crate) fn convert(
        mut self,
        tree: &MarkdownTree,
        root: NodeId,
        anchor: Option<NodeId>,
    ) -> (RichNode, Option<Offset>) {
        let wrapped = tree.node(root).kind != MdKind::Document;
        if wrapped {
            self.open_node(NodeKind::Doc);
        }
        let mut anchor_pos = None;
        let mut walker = tree.walker(root);
        while let Some(event) = walker.next() {
            if event.entering && Some(event.node) == anchor {
                anchor_pos = Some(self.pos());
            }
            if self.visit(tree, event.node, event.entering) {
                walker.resume_at(event.node, false);
            }
        }
        while !self.stack.is_empty() {
            self.close_node();
        }
        let mut out = self
            .root
            .take()
            .unwrap_or_else(|| RichNode::new(NodeKind::Doc, Vec::new()));
        if wrapped && out.child_count() == 1 {
            out = out.content()[0].clone();
            anchor_pos = anchor_pos.map(|pos| pos.saturating_sub(1));
        }
        (out, anchor_pos)
    }
}

fn cell_align(align: Align) -> CellAlign {
    match align {
        Align::None => CellAlign::None,
        Align::Left => CellAlign::Left,
        Align::Center => CellAlign::Center,
        Align::Right => CellAlign::Right,
    }
}
