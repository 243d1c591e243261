//! Conversion between the markdown syntax tree and the rich document tree.

pub mod html;
mod to_markdown;
mod to_rich;
pub mod widget;

use markdown_duet_config::{Config, MarkdownStyleConfig};
use markdown_duet_syntax::{MarkdownTree, NodeId};

pub use html::{HtmlFallback, PreserveHtml};
pub use widget::WidgetRules;

use crate::error::EngineError;
use crate::rich::{LineDocument, NodeKind, Offset, RichNode};
use to_markdown::ToMarkdownState;
use to_rich::ToRichState;

/// Choices the writer makes where markdown offers several spellings and
/// the rich tree does not record one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownStyle {
    pub bullet_char: char,
    pub thematic_break: String,
}

impl Default for MarkdownStyle {
    fn default() -> Self {
        Self {
            bullet_char: '-',
            thematic_break: "***".to_string(),
        }
    }
}

impl MarkdownStyle {
    pub fn from_config(config: &MarkdownStyleConfig) -> Self {
        let bullet_char = match config.bullet_char {
            c @ ('-' | '*' | '+') => c,
            other => {
                log::warn!("bullet character {other:?} is not a list marker; using '-'");
                '-'
            }
        };
        Self {
            bullet_char,
            thematic_break: config.thematic_break.clone(),
        }
    }
}

pub struct Convertor {
    widgets: WidgetRules,
    style: MarkdownStyle,
    fallback: Box<dyn HtmlFallback>,
}

impl Default for Convertor {
    fn default() -> Self {
        Self::new(WidgetRules::new(), MarkdownStyle::default())
    }
}

impl Convertor {
    pub fn new(widgets: WidgetRules, style: MarkdownStyle) -> Self {
        Self {
            widgets,
            style,
            fallback: Box::new(PreserveHtml),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        Ok(Self::new(
            WidgetRules::from_config(&config.widgets)?,
            MarkdownStyle::from_config(&config.markdown),
        ))
    }

    /// Replaces the handling of raw HTML that has no rich counterpart.
    pub fn with_html_fallback(mut self, fallback: Box<dyn HtmlFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn widgets(&self) -> &WidgetRules {
        &self.widgets
    }

    pub fn style(&self) -> &MarkdownStyle {
        &self.style
    }

    /// Builds the rich tree for the markdown subtree at `node`. A document
    /// root yields a `doc`; any other node yields that node's rich form.
    pub fn to_rich_model(&self, tree: &MarkdownTree, node: NodeId) -> RichNode {
        ToRichState::new(&self.widgets, self.fallback.as_ref())
            .convert(tree, node, None)
            .0
    }

    /// Like [`Self::to_rich_model`], also reporting the position (relative
    /// to the returned node) at which `anchor` was materialized.
    pub fn to_rich_model_with_anchor(
        &self,
        tree: &MarkdownTree,
        node: NodeId,
        anchor: NodeId,
    ) -> (RichNode, Option<Offset>) {
        ToRichState::new(&self.widgets, self.fallback.as_ref()).convert(tree, node, Some(anchor))
    }

    /// Writes `doc` back as markdown. A line document is joined line by
    /// line without interpretation.
    pub fn to_markdown_text(&self, doc: &RichNode) -> String {
        if is_line_document(doc) {
            return LineDocument::text(doc);
        }
        let mut state = ToMarkdownState::new(&self.style);
        if doc.kind() == &NodeKind::Doc {
            state.render_content(doc);
        } else {
            let wrapper = RichNode::new(NodeKind::Doc, vec![doc.clone()]);
            state.render_content(&wrapper);
        }
        state.finish()
    }
}

fn is_line_document(doc: &RichNode) -> bool {
    doc.kind() == &NodeKind::Doc
        && doc.child_count() > 0
        && doc
            .content()
            .iter()
            .all(|block| matches!(block.kind(), NodeKind::Line { .. }))
}
