//! Immutable rich document nodes.
//!
//! Positions follow the usual structured-document convention: text counts
//! one unit per character, leaf nodes count one unit, and every other node
//! counts two (its opening and closing token) around its content. The
//! document node itself is not counted, so its content starts at offset 0.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mark::Mark;

pub type Offset = usize;

/// Identity of a node instance. Cloning a node keeps its key; building a new
/// node mints a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(Uuid);

impl NodeKey {
    fn mint() -> Self {
        NodeKey(Uuid::new_v4())
    }
}

/// An HTML tag preserved so it can be written back as it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawHtml {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl RawHtml {
    pub fn new(tag: impl Into<String>, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.into(),
            attrs,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellAlign {
    #[default]
    None,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAttrs {
    pub align: CellAlign,
    pub colspan: usize,
    pub rowspan: usize,
}

impl Default for CellAttrs {
    fn default() -> Self {
        Self {
            align: CellAlign::None,
            colspan: 1,
            rowspan: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeadingType {
    #[default]
    Atx,
    Setext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundKind {
    CodeBlock,
    CustomBlock,
    FrontMatter,
}

/// Per-line background painted behind multi-line blocks in the markdown
/// editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBackground {
    pub kind: BackgroundKind,
    pub code_start: bool,
    pub code_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Doc,
    /// One source line of the markdown editing surface.
    Line {
        background: Option<LineBackground>,
    },
    Paragraph,
    Heading {
        level: u8,
        heading_type: HeadingType,
    },
    CodeBlock {
        language: String,
        fence_char: char,
        fence_length: usize,
    },
    BulletList {
        tight: bool,
        bullet: char,
    },
    OrderedList {
        tight: bool,
        order: u64,
        delimiter: char,
    },
    ListItem {
        task: bool,
        checked: bool,
    },
    BlockQuote,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableHeadCell(CellAttrs),
    TableBodyCell(CellAttrs),
    Image {
        image_url: String,
        alt_text: String,
        title: Option<String>,
    },
    ThematicBreak,
    HardBreak,
    FrontMatter,
    HtmlBlock {
        html: String,
    },
    HtmlInline {
        html: String,
    },
    HtmlComment {
        html: String,
    },
    CustomBlock {
        info: String,
    },
    /// Inline widget; its text is the full `$$info text$$` form.
    Widget {
        info: String,
    },
    Text {
        text: String,
    },
    Unknown {
        type_name: String,
    },
}

impl NodeKind {
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Line { .. } => "line",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::CodeBlock { .. } => "codeBlock",
            NodeKind::BulletList { .. } => "bulletList",
            NodeKind::OrderedList { .. } => "orderedList",
            NodeKind::ListItem { .. } => "listItem",
            NodeKind::BlockQuote => "blockQuote",
            NodeKind::Table => "table",
            NodeKind::TableHead => "tableHead",
            NodeKind::TableBody => "tableBody",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableHeadCell(_) => "tableHeadCell",
            NodeKind::TableBodyCell(_) => "tableBodyCell",
            NodeKind::Image { .. } => "image",
            NodeKind::ThematicBreak => "thematicBreak",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::FrontMatter => "frontMatter",
            NodeKind::HtmlBlock { .. } => "htmlBlock",
            NodeKind::HtmlInline { .. } => "htmlInline",
            NodeKind::HtmlComment { .. } => "htmlComment",
            NodeKind::CustomBlock { .. } => "customBlock",
            NodeKind::Widget { .. } => "widget",
            NodeKind::Text { .. } => "text",
            NodeKind::Unknown { type_name } => type_name,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeKind::Text { .. })
    }

    /// Leaves occupy a single position.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::Image { .. }
                | NodeKind::HardBreak
                | NodeKind::HtmlInline { .. }
                | NodeKind::HtmlBlock { .. }
                | NodeKind::HtmlComment { .. }
                | NodeKind::ThematicBreak
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            NodeKind::Text { .. }
                | NodeKind::Image { .. }
                | NodeKind::HardBreak
                | NodeKind::HtmlInline { .. }
                | NodeKind::Widget { .. }
        )
    }

    /// Blocks whose content is inline nodes.
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeKind::Line { .. }
                | NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::CodeBlock { .. }
                | NodeKind::TableHeadCell(_)
                | NodeKind::TableBodyCell(_)
                | NodeKind::FrontMatter
                | NodeKind::CustomBlock { .. }
        )
    }

    pub fn is_table_cell(&self) -> bool {
        matches!(self, NodeKind::TableHeadCell(_) | NodeKind::TableBodyCell(_))
    }

    pub fn cell_attrs(&self) -> Option<CellAttrs> {
        match self {
            NodeKind::TableHeadCell(attrs) | NodeKind::TableBodyCell(attrs) => Some(*attrs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RichNode {
    key: NodeKey,
    kind: NodeKind,
    content: Vec<RichNode>,
    marks: Vec<Mark>,
    html: Option<RawHtml>,
}

/// Structural equality. Identity is compared with [`RichNode::same_node`].
impl PartialEq for RichNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.marks == other.marks
            && self.html == other.html
            && self.content == other.content
    }
}

impl RichNode {
    pub fn new(kind: NodeKind, content: Vec<RichNode>) -> Self {
        Self {
            key: NodeKey::mint(),
            kind,
            content,
            marks: Vec::new(),
            html: None,
        }
    }

    pub fn leaf(kind: NodeKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            marks,
            ..Self::leaf(NodeKind::Text { text: text.into() })
        }
    }

    pub fn with_marks(self, marks: Vec<Mark>) -> Self {
        Self {
            key: NodeKey::mint(),
            marks,
            ..self
        }
    }

    pub fn with_html(self, html: Option<RawHtml>) -> Self {
        Self {
            key: NodeKey::mint(),
            html,
            ..self
        }
    }

    pub fn with_content(&self, content: Vec<RichNode>) -> Self {
        Self {
            key: NodeKey::mint(),
            kind: self.kind.clone(),
            content,
            marks: self.marks.clone(),
            html: self.html.clone(),
        }
    }

    pub fn with_kind(&self, kind: NodeKind) -> Self {
        Self {
            key: NodeKey::mint(),
            kind,
            content: self.content.clone(),
            marks: self.marks.clone(),
            html: self.html.clone(),
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Whether both values are the same node instance.
    pub fn same_node(&self, other: &RichNode) -> bool {
        self.key == other.key
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn content(&self) -> &[RichNode] {
        &self.content
    }

    pub fn child(&self, index: usize) -> Option<&RichNode> {
        self.content.get(index)
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn html(&self) -> Option<&RawHtml> {
        self.html.as_ref()
    }

    pub fn text_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn node_size(&self) -> usize {
        match &self.kind {
            NodeKind::Text { text } => text.chars().count(),
            kind if kind.is_leaf() => 1,
            _ => self.content_size() + 2,
        }
    }

    pub fn content_size(&self) -> usize {
        self.content.iter().map(RichNode::node_size).sum()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text { text } => out.push_str(text),
            _ => self.content.iter().for_each(|c| c.collect_text(out)),
        }
    }

    /// Children paired with the offset at which each starts, relative to the
    /// start of this node's content.
    pub fn children_with_offsets(&self) -> impl Iterator<Item = (Offset, &RichNode)> {
        self.content.iter().scan(0, |offset, child| {
            let at = *offset;
            *offset += child.node_size();
            Some((at, child))
        })
    }

    /// Indented outline of the subtree, one node per line.
    pub fn dump(&self) -> String {
        let mut lines = Vec::new();
        self.dump_into(0, &mut lines);
        lines.join("\n")
    }

    fn dump_into(&self, depth: usize, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        let mut line = match &self.kind {
            NodeKind::Text { text } => format!("{indent}{text:?}"),
            kind => format!("{indent}{}{}", kind.name(), describe(kind)),
        };
        if !self.marks.is_empty() {
            let marks: Vec<String> = self.marks.iter().map(Mark::to_string).collect();
            line.push_str(&format!(" [{}]", marks.join(", ")));
        }
        if let Some(html) = &self.html {
            line.push_str(&format!(" <{}>", html.tag));
        }
        lines.push(line);
        for child in &self.content {
            child.dump_into(depth + 1, lines);
        }
    }
}

fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Line {
            background: Some(bg),
        } => {
            let mut out = format!(" bg={:?}", bg.kind);
            if bg.code_start {
                out.push_str(" start");
            }
            if bg.code_end {
                out.push_str(" end");
            }
            out
        }
        NodeKind::Heading {
            level,
            heading_type,
        } => format!(" level={level} {heading_type:?}"),
        NodeKind::CodeBlock { language, .. } if !language.is_empty() => {
            format!(" language={language}")
        }
        NodeKind::BulletList { tight, bullet } => format!(" bullet={bullet:?} tight={tight}"),
        NodeKind::OrderedList {
            tight,
            order,
            delimiter,
        } => format!(" order={order}{delimiter} tight={tight}"),
        NodeKind::ListItem {
            task: true,
            checked,
        } => format!(" task checked={checked}"),
        NodeKind::TableHeadCell(attrs) | NodeKind::TableBodyCell(attrs) => {
            let mut out = String::new();
            if attrs.align != CellAlign::None {
                out.push_str(&format!(" align={:?}", attrs.align));
            }
            if attrs.colspan > 1 {
                out.push_str(&format!(" colspan={}", attrs.colspan));
            }
            if attrs.rowspan > 1 {
                out.push_str(&format!(" rowspan={}", attrs.rowspan));
            }
            out
        }
        NodeKind::Image {
            image_url,
            alt_text,
            ..
        } => format!(" {alt_text:?} {image_url}"),
        NodeKind::HtmlBlock { html }
        | NodeKind::HtmlInline { html }
        | NodeKind::HtmlComment { html } => format!(" {html:?}"),
        NodeKind::CustomBlock { info } | NodeKind::Widget { info } => format!(" {info}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::mark::MarkKind;
    use pretty_assertions::assert_eq;

    fn para(text: &str) -> RichNode {
        RichNode::new(NodeKind::Paragraph, vec![RichNode::text(text, vec![])])
    }

    #[test]
    fn sizes_count_open_and_close_tokens() {
        let doc = RichNode::new(
            NodeKind::Doc,
            vec![
                para("héllo"),
                RichNode::leaf(NodeKind::ThematicBreak),
                RichNode::new(NodeKind::Paragraph, vec![]),
            ],
        );
        assert_eq!(doc.content()[0].node_size(), 7);
        assert_eq!(doc.content_size(), 7 + 1 + 2);
    }

    #[test]
    fn equality_ignores_identity() {
        let a = para("x");
        let b = para("x");
        assert_eq!(a, b);
        assert!(!a.same_node(&b));
        assert!(a.same_node(&a.clone()));
        assert!(!a.same_node(&a.with_content(a.content().to_vec())));
    }

    #[test]
    fn dump_shows_marks_and_attributes() {
        let doc = RichNode::new(
            NodeKind::Doc,
            vec![RichNode::new(
                NodeKind::Heading {
                    level: 2,
                    heading_type: HeadingType::Atx,
                },
                vec![RichNode::text("hi", vec![Mark::new(MarkKind::Strong)])],
            )],
        );
        insta::assert_snapshot!(doc.dump(), @r#"
        doc
          heading level=2 Atx
            "hi" [strong]
        "#);
    }
}
