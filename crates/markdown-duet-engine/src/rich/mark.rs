//! Inline marks and canonical mark sets.
//!
//! A mark set is a `Vec<Mark>` kept sorted by [`MarkKind::rank`]. Marks that
//! [`Mark::excludes`] each other never share a set. A markdown mark and an
//! HTML mark of the same type can, so `**a <b>b</b> c**` keeps both; among
//! equal ranks the earlier (outer) mark comes first. Two runs of text carry
//! the same formatting exactly when their mark sets compare equal, which is
//! what lets adjacent runs be merged.

use serde::{Deserialize, Serialize};

use super::RawHtml;

/// Part of a delimited construct (code span, fenced block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodePart {
    Start,
    Marked,
    End,
}

/// Highlighting marks added by the annotator on the markdown surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntaxMark {
    Heading { level: u8 },
    /// Markup characters: `#`, `**`, `~~`, setext underlines.
    Delimiter,
    Emph,
    Strong,
    Strike,
    Code(CodePart),
    CodeBlock(CodePart),
    CustomBlock(CodePart),
    Link,
    Image,
    LinkText,
    LinkUrl,
    ListItem { odd: bool },
    TaskDelimiter,
    BlockQuote,
    ThematicBreak,
    Table,
    TableDelimRow,
    Html,
    /// Front matter.
    Meta,
}

impl SyntaxMark {
    fn rank(&self) -> u8 {
        match self {
            SyntaxMark::Heading { .. } => 0,
            SyntaxMark::BlockQuote => 1,
            SyntaxMark::ListItem { .. } => 2,
            SyntaxMark::TaskDelimiter => 3,
            SyntaxMark::Table => 4,
            SyntaxMark::TableDelimRow => 5,
            SyntaxMark::Link => 6,
            SyntaxMark::Image => 7,
            SyntaxMark::LinkText => 8,
            SyntaxMark::LinkUrl => 9,
            SyntaxMark::Emph => 10,
            SyntaxMark::Strong => 11,
            SyntaxMark::Strike => 12,
            SyntaxMark::Code(_) => 13,
            SyntaxMark::CodeBlock(_) => 14,
            SyntaxMark::CustomBlock(_) => 15,
            SyntaxMark::Html => 16,
            SyntaxMark::Meta => 17,
            SyntaxMark::ThematicBreak => 18,
            SyntaxMark::Delimiter => 19,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyntaxMark::Heading { .. } => "heading",
            SyntaxMark::Delimiter => "delimiter",
            SyntaxMark::Emph => "emph",
            SyntaxMark::Strong => "strong",
            SyntaxMark::Strike => "strike",
            SyntaxMark::Code(_) => "code",
            SyntaxMark::CodeBlock(_) => "codeBlock",
            SyntaxMark::CustomBlock(_) => "customBlock",
            SyntaxMark::Link => "link",
            SyntaxMark::Image => "image",
            SyntaxMark::LinkText => "linkText",
            SyntaxMark::LinkUrl => "linkUrl",
            SyntaxMark::ListItem { .. } => "listItem",
            SyntaxMark::TaskDelimiter => "taskDelimiter",
            SyntaxMark::BlockQuote => "blockQuote",
            SyntaxMark::ThematicBreak => "thematicBreak",
            SyntaxMark::Table => "table",
            SyntaxMark::TableDelimRow => "tableDelimRow",
            SyntaxMark::Html => "html",
            SyntaxMark::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkKind {
    Emph,
    Strong,
    Strike,
    Link { url: String, title: Option<String> },
    /// `<span>` kept for its attributes.
    Span,
    Code,
    Syntax(SyntaxMark),
}

impl MarkKind {
    /// Canonical position inside a mark set. Code sorts after every other
    /// formatting mark so it is always written innermost.
    pub fn rank(&self) -> (u8, u8) {
        match self {
            MarkKind::Emph => (0, 0),
            MarkKind::Strong => (1, 0),
            MarkKind::Strike => (2, 0),
            MarkKind::Link { .. } => (3, 0),
            MarkKind::Span => (4, 0),
            MarkKind::Code => (5, 0),
            MarkKind::Syntax(syntax) => (10, syntax.rank()),
        }
    }

    /// Marks of the same type exclude each other: adding one replaces the
    /// other.
    pub fn same_type(&self, other: &MarkKind) -> bool {
        self.rank() == other.rank()
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, MarkKind::Syntax(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarkKind::Emph => "emph",
            MarkKind::Strong => "strong",
            MarkKind::Strike => "strike",
            MarkKind::Link { .. } => "link",
            MarkKind::Span => "span",
            MarkKind::Code => "code",
            MarkKind::Syntax(syntax) => syntax.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub kind: MarkKind,
    /// The HTML tag this mark was read from, written back verbatim.
    pub html: Option<RawHtml>,
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Self { kind, html: None }
    }

    pub fn syntax(mark: SyntaxMark) -> Self {
        Self::new(MarkKind::Syntax(mark))
    }

    pub fn with_html(mut self, html: RawHtml) -> Self {
        self.html = Some(html);
        self
    }

    /// Same mark type read from the same syntax: both markdown, or both
    /// the same HTML tag.
    pub fn excludes(&self, other: &Mark) -> bool {
        self.kind.same_type(&other.kind)
            && self.html.as_ref().map(|raw| raw.tag.as_str())
                == other.html.as_ref().map(|raw| raw.tag.as_str())
    }

    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.contains(self)
    }

    /// Returns `set` with this mark added after the marks of lower or equal
    /// rank, replacing any mark it excludes.
    pub fn add_to_set(&self, set: &[Mark]) -> Vec<Mark> {
        if self.is_in_set(set) {
            return set.to_vec();
        }
        let mut out: Vec<Mark> = set
            .iter()
            .filter(|m| !m.excludes(self))
            .cloned()
            .collect();
        let at = out
            .iter()
            .position(|m| m.kind.rank() > self.kind.rank())
            .unwrap_or(out.len());
        out.insert(at, self.clone());
        out
    }

    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| *m != self).cloned().collect()
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            MarkKind::Link { url, .. } => write!(f, "link({url})"),
            MarkKind::Syntax(SyntaxMark::Heading { level }) => write!(f, "heading{level}"),
            MarkKind::Syntax(SyntaxMark::Code(part))
            | MarkKind::Syntax(SyntaxMark::CodeBlock(part))
            | MarkKind::Syntax(SyntaxMark::CustomBlock(part)) => {
                write!(f, "{}:{part:?}", self.kind.name())
            }
            kind => f.write_str(kind.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(set: &[Mark]) -> Vec<&'static str> {
        set.iter().map(|m| m.kind.name()).collect()
    }

    #[test]
    fn marks_are_kept_in_rank_order() {
        let set = Mark::new(MarkKind::Code).add_to_set(&[]);
        let set = Mark::new(MarkKind::Emph).add_to_set(&set);
        let set = Mark::new(MarkKind::Strong).add_to_set(&set);
        assert_eq!(names(&set), vec!["emph", "strong", "code"]);
    }

    #[test]
    fn same_type_replaces() {
        let a = Mark::new(MarkKind::Link {
            url: "a".into(),
            title: None,
        });
        let b = Mark::new(MarkKind::Link {
            url: "b".into(),
            title: None,
        });
        let set = b.add_to_set(&a.add_to_set(&[]));
        assert_eq!(set, vec![b]);
    }

    #[test]
    fn html_and_markdown_marks_of_one_type_coexist() {
        let tag = |name: &str| RawHtml::new(name, vec![]);
        let strong = Mark::new(MarkKind::Strong);
        let bold = Mark::new(MarkKind::Strong).with_html(tag("b"));
        let set = bold.add_to_set(&strong.add_to_set(&[]));
        assert_eq!(set, vec![strong.clone(), bold.clone()]);

        let inverted = strong.add_to_set(&bold.add_to_set(&[]));
        assert_eq!(inverted, vec![bold.clone(), strong]);

        let other_bold = Mark::new(MarkKind::Strong).with_html(RawHtml::new(
            "b",
            vec![("class".into(), "x".into())],
        ));
        assert_eq!(other_bold.add_to_set(&set)[1], other_bold);
        assert_eq!(other_bold.add_to_set(&set).len(), 2);
    }

    #[test]
    fn adding_twice_is_a_no_op() {
        let strong = Mark::new(MarkKind::Strong);
        let once = strong.add_to_set(&[]);
        assert_eq!(strong.add_to_set(&once), once);
        assert!(strong.remove_from_set(&once).is_empty());
    }

    #[test]
    fn syntax_marks_sort_after_formatting() {
        let set = Mark::syntax(SyntaxMark::Delimiter).add_to_set(&[]);
        let set = Mark::syntax(SyntaxMark::Heading { level: 2 }).add_to_set(&set);
        let set = Mark::new(MarkKind::Strike).add_to_set(&set);
        assert_eq!(names(&set), vec!["strike", "heading", "delimiter"]);
    }
}
