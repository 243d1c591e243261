//! Arena-backed markdown syntax tree.
//!
//! Nodes live in a flat `Vec` and link to each other through [`NodeId`]
//! indices (`parent`, `first_child`, `last_child`, `next`, `prev`). There is
//! no owned children vector: siblings are walked through `next` links, which
//! keeps the tree free of cyclic owning references.

use serde::{Deserialize, Serialize};

use crate::pos::{LinePos, SourcePos};

/// Index of a node inside its [`MarkdownTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Column alignment declared in a table delimiter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Align {
    #[default]
    None,
    Left,
    Center,
    Right,
}

/// List and list item data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListData {
    pub ordered: bool,
    /// First number of an ordered list.
    pub start: u64,
    /// `-`, `*` or `+` for bullet lists.
    pub bullet_char: char,
    /// `.` or `)` for ordered lists.
    pub delimiter: char,
    /// Marker width plus the spaces that follow it.
    pub padding: usize,
    pub task: bool,
    pub checked: bool,
    /// No blank lines between items.
    pub tight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeBlockData {
    pub info: String,
    pub fenced: bool,
    pub fence_char: char,
    pub fence_length: usize,
    pub fence_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkData {
    pub destination: String,
    pub title: String,
}

/// Node type tag with its type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MdKind {
    Document,
    Paragraph,
    Heading { level: u8, setext: bool },
    BlockQuote,
    List(ListData),
    Item(ListData),
    CodeBlock(CodeBlockData),
    HtmlBlock,
    /// `$$info` … `$$` block.
    CustomBlock { info: String },
    /// YAML front matter delimited by `---`.
    FrontMatter,
    ThematicBreak,
    Table { aligns: Vec<Align> },
    TableHead,
    TableBody,
    TableRow,
    TableCell { align: Align, header: bool },
    Text,
    SoftBreak,
    LineBreak,
    Emph,
    Strong,
    Strike,
    Code { tick_count: usize },
    Link(LinkData),
    Image(LinkData),
    HtmlInline,
    /// Syntax the tree has no dedicated kind for (footnotes, math, ...).
    Unknown(String),
}

impl MdKind {
    /// Short type name, used in logs and tree dumps.
    pub fn name(&self) -> &str {
        match self {
            MdKind::Document => "document",
            MdKind::Paragraph => "paragraph",
            MdKind::Heading { .. } => "heading",
            MdKind::BlockQuote => "blockQuote",
            MdKind::List(_) => "list",
            MdKind::Item(_) => "item",
            MdKind::CodeBlock(_) => "codeBlock",
            MdKind::HtmlBlock => "htmlBlock",
            MdKind::CustomBlock { .. } => "customBlock",
            MdKind::FrontMatter => "frontMatter",
            MdKind::ThematicBreak => "thematicBreak",
            MdKind::Table { .. } => "table",
            MdKind::TableHead => "tableHead",
            MdKind::TableBody => "tableBody",
            MdKind::TableRow => "tableRow",
            MdKind::TableCell { .. } => "tableCell",
            MdKind::Text => "text",
            MdKind::SoftBreak => "softbreak",
            MdKind::LineBreak => "linebreak",
            MdKind::Emph => "emph",
            MdKind::Strong => "strong",
            MdKind::Strike => "strike",
            MdKind::Code { .. } => "code",
            MdKind::Link(_) => "link",
            MdKind::Image(_) => "image",
            MdKind::HtmlInline => "htmlInline",
            MdKind::Unknown(name) => name,
        }
    }

    /// Containers produce an entering and a leaving walk event; leaves only
    /// an entering one.
    pub fn is_container(&self) -> bool {
        !matches!(
            self,
            MdKind::Text
                | MdKind::SoftBreak
                | MdKind::LineBreak
                | MdKind::Code { .. }
                | MdKind::CodeBlock(_)
                | MdKind::HtmlBlock
                | MdKind::HtmlInline
                | MdKind::CustomBlock { .. }
                | MdKind::FrontMatter
                | MdKind::ThematicBreak
        )
    }

    /// Block-level kinds. Everything else lives inside a paragraph, heading
    /// or table cell.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            MdKind::Document
                | MdKind::Paragraph
                | MdKind::Heading { .. }
                | MdKind::BlockQuote
                | MdKind::List(_)
                | MdKind::Item(_)
                | MdKind::CodeBlock(_)
                | MdKind::HtmlBlock
                | MdKind::CustomBlock { .. }
                | MdKind::FrontMatter
                | MdKind::ThematicBreak
                | MdKind::Table { .. }
                | MdKind::TableHead
                | MdKind::TableBody
                | MdKind::TableRow
                | MdKind::TableCell { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownNode {
    pub id: NodeId,
    pub kind: MdKind,
    pub sourcepos: SourcePos,
    pub literal: Option<String>,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub next: Option<NodeId>,
    pub prev: Option<NodeId>,
}

/// A parsed markdown document. Node 0 is always the document root.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownTree {
    nodes: Vec<MarkdownNode>,
}

impl MarkdownTree {
    pub fn new(doc_pos: SourcePos) -> Self {
        let root = MarkdownNode {
            id: NodeId(0),
            kind: MdKind::Document,
            sourcepos: doc_pos,
            literal: None,
            parent: None,
            first_child: None,
            last_child: None,
            next: None,
            prev: None,
        };
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].first_child.is_none()
    }

    pub fn get(&self, id: NodeId) -> Option<&MarkdownNode> {
        self.nodes.get(id.index())
    }

    /// Panics when `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &MarkdownNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut MarkdownNode {
        &mut self.nodes[id.index()]
    }

    /// Appends a new last child under `parent` and returns its id.
    pub fn append(
        &mut self,
        parent: NodeId,
        kind: MdKind,
        sourcepos: SourcePos,
        literal: Option<String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let prev = self.nodes[parent.index()].last_child;
        self.nodes.push(MarkdownNode {
            id,
            kind,
            sourcepos,
            literal,
            parent: Some(parent),
            first_child: None,
            last_child: None,
            next: None,
            prev,
        });
        if let Some(prev) = prev {
            self.nodes[prev.index()].next = Some(id);
        } else {
            self.nodes[parent.index()].first_child = Some(id);
        }
        self.nodes[parent.index()].last_child = Some(id);
        id
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.node(id).first_child,
        }
    }

    /// Depth-first walk over the subtree rooted at `id`.
    pub fn walker(&self, id: NodeId) -> Walker<'_> {
        Walker {
            tree: self,
            root: id,
            next: Some(WalkEvent {
                node: id,
                entering: true,
            }),
        }
    }

    /// Concatenated literal text of all text-like descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for event in self.walker(id) {
            if !event.entering {
                continue;
            }
            let node = self.node(event.node);
            match node.kind {
                MdKind::SoftBreak | MdKind::LineBreak => out.push('\n'),
                _ => {
                    if let Some(literal) = &node.literal {
                        out.push_str(literal);
                    }
                }
            }
        }
        out
    }

    /// The deepest node whose span contains `pos`.
    pub fn find_node_at_position(&self, pos: LinePos) -> Option<NodeId> {
        let mut current = self.root();
        let mut found = None;
        'descend: loop {
            for child in self.children(current) {
                if self.node(child).sourcepos.contains(pos) {
                    found = Some(child);
                    current = child;
                    continue 'descend;
                }
            }
            return found;
        }
    }

    /// The top-level block covering `line`, or the first one starting after it.
    pub fn find_first_node_at_line(&self, line: usize) -> Option<NodeId> {
        self.children(self.root())
            .find(|id| self.node(*id).sourcepos.end.line >= line)
    }

    /// Depth of `id` below the root (the root has depth 0).
    pub fn depth(&self, id: NodeId) -> usize {
        std::iter::successors(self.node(id).parent, |p| self.node(*p).parent).count()
    }

    /// Nearest ancestor (including `id` itself) matching `pred`.
    pub fn ancestor(&self, id: NodeId, pred: impl Fn(&MdKind) -> bool) -> Option<NodeId> {
        std::iter::successors(Some(id), |n| self.node(*n).parent)
            .find(|n| pred(&self.node(*n).kind))
    }
}

pub struct Children<'a> {
    tree: &'a MarkdownTree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.node(current).next;
        Some(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkEvent {
    pub node: NodeId,
    pub entering: bool,
}

/// Entering/leaving event stream over a subtree.
pub struct Walker<'a> {
    tree: &'a MarkdownTree,
    root: NodeId,
    next: Option<WalkEvent>,
}

impl Walker<'_> {
    /// Makes the next event `(node, entering)`. Resuming at `(n, false)`
    /// right after entering `n` skips its children.
    pub fn resume_at(&mut self, node: NodeId, entering: bool) {
        self.next = Some(WalkEvent { node, entering });
    }

    fn successor(&self, event: WalkEvent) -> Option<WalkEvent> {
        let node = self.tree.node(event.node);
        if event.entering && node.kind.is_container() {
            return Some(match node.first_child {
                Some(child) => WalkEvent {
                    node: child,
                    entering: true,
                },
                None => WalkEvent {
                    node: event.node,
                    entering: false,
                },
            });
        }
        if event.node == self.root {
            return None;
        }
        match (node.next, node.parent) {
            (Some(next), _) => Some(WalkEvent {
                node: next,
                entering: true,
            }),
            (None, Some(parent)) => Some(WalkEvent {
                node: parent,
                entering: false,
            }),
            (None, None) => None,
        }
    }
}

impl Iterator for Walker<'_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        let event = self.next?;
        self.next = self.successor(event);
        Some(event)
    }
}
