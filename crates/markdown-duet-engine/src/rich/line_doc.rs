//! The markdown editing surface: one `line` block per source line.

use super::node::{NodeKind, RichNode};
use crate::convert::widget::{Piece, split_widgets, widget_node};

pub struct LineDocument;

impl LineDocument {
    /// Builds the line document for `text`. A trailing newline yields a
    /// final empty line.
    pub fn build(text: &str) -> RichNode {
        let lines = text
            .split('\n')
            .map(|line| Self::line(line.strip_suffix('\r').unwrap_or(line)))
            .collect();
        RichNode::new(NodeKind::Doc, lines)
    }

    pub fn line(text: &str) -> RichNode {
        let content = split_widgets(text)
            .into_iter()
            .map(|piece| match piece {
                Piece::Text(plain) => RichNode::text(plain, Vec::new()),
                Piece::Widget { info, source } => widget_node(info, source, Vec::new()),
            })
            .collect();
        RichNode::new(NodeKind::Line { background: None }, content)
    }

    /// Markdown source of one line.
    pub fn line_text(line: &RichNode) -> String {
        line.text_content()
    }

    pub fn text(doc: &RichNode) -> String {
        doc.content()
            .iter()
            .map(Self::line_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_block_per_line() {
        let doc = LineDocument::build("# a\n\nb $$widget0 @x$$\n");
        assert_eq!(doc.child_count(), 4);
        insta::assert_snapshot!(doc.dump(), @r##"
        doc
          line
            "# a"
          line
          line
            "b "
            widget widget0
              "$$widget0 @x$$"
          line
        "##);
        assert_eq!(LineDocument::text(&doc), "# a\n\nb $$widget0 @x$$\n");
    }
}
